// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden
#![warn(missing_docs)]                // All public items should be documented
#![warn(unused_must_use)]             // Must handle Result and Option explicitly

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::redundant_clone)]     // Useless clones warning

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Keyplane
//!
//! A declarative, idempotent reconciliation engine for cloud identity
//! providers.
//!
//! ## Overview
//!
//! Keyplane treats identity resources (IAM roles and users, Okta
//! applications, Google Workspace groups) as code:
//!
//! - Describe every resource in a YAML template, scoped to one account,
//!   a list of accounts, or all of them
//! - Plan shows exactly what would change, per account and per aspect,
//!   before anything is written
//! - Apply converges every in-scope account concurrently and verifies
//!   convergence afterwards
//! - Import generates templates from live state and keeps operator
//!   annotations across refreshes
//!
//! ## Architecture
//!
//! The system is built around **desired state reconciliation**:
//!
//! 1. **Desired State**: templates in the repository, resolved per account
//! 2. **Observed State**: read from the identity provider
//! 3. **Orchestrator**: diffs the two aspect by aspect and executes the
//!    necessary mutations
//!
//! Structural comparison is order-insensitive: two policy documents that
//! differ only in statement ordering are the same document.
//!
//! ## Modules
//!
//! - [`config`]: account configuration
//! - [`template`]: template model, scoping, merge, validation, storage
//! - [`drift`]: order-insensitive structural diffing
//! - [`provider`]: provider client trait, retry policy, local backend
//! - [`apply`]: per-resource orchestration, run lifecycle, import
//! - [`report`]: the JSON change report
//! - [`cli`]: command-line interface
//!
//! ## Example
//!
//! ```yaml
//! template_type: "aws:iam:role"
//! identifier: engineering
//! included_accounts:
//!   - "*"
//! excluded_accounts:
//!   - sandbox
//! properties:
//!   role_name: engineering
//!   tags:
//!     - key: team
//!       value: eng
//!   managed_policies:
//!     - policy_arn: arn:aws:iam::aws:policy/ReadOnlyAccess
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod apply;
pub mod change;
pub mod cli;
pub mod config;
pub mod context;
pub mod drift;
pub mod error;
pub mod provider;
pub mod report;
pub mod template;

// ============================================================================
// Re-exports
// ============================================================================

pub use apply::{import_resources, ResourceOrchestrator, RunDriver};
pub use change::{ChangeType, ProposedChange, TemplateChangeDetails};
pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{AccountConfig, EngineConfig, ProviderKind};
pub use context::ExecutionContext;
pub use drift::{DriftEngine, DriftResult};
pub use error::{KeyplaneError, Result};
pub use provider::{Mutation, ObservedResource, ProviderClient, RetryPolicy, SnapshotProvider};
pub use template::{
    FsTemplateStore, ResourceKind, Template, TemplateStore, TemplateValidator,
};
