//! Execution context for plan and execute modes.
//!
//! The context is an immutable value passed by reference into every
//! orchestrator call. The apply flow builds a fresh context for each pass
//! instead of flipping shared state mid-run.

/// Distinguishes a read-only plan pass from an execute pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionContext {
    /// When true, detected changes are applied to the provider.
    /// When false, changes are computed and reported only.
    pub execute: bool,
}

impl ExecutionContext {
    /// Creates a plan-only context. No provider mutations are issued.
    #[must_use]
    pub const fn plan() -> Self {
        Self { execute: false }
    }

    /// Creates an execute context. Detected changes are applied.
    #[must_use]
    pub const fn apply() -> Self {
        Self { execute: true }
    }
}

impl std::fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.execute {
            write!(f, "execute")
        } else {
            write!(f, "plan")
        }
    }
}
