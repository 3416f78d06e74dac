//! Reconciliation: per-resource orchestration, run lifecycle, and import.

pub mod driver;
pub mod import;
pub mod orchestrator;

pub use driver::RunDriver;
pub use import::import_resources;
pub use orchestrator::ResourceOrchestrator;
