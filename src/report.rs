//! Aggregated change report.
//!
//! Every run writes its proposed (or applied) changes to a JSON file so
//! review tooling and CI gates can inspect what the engine intends to do.
//! The serialized shape is a stable contract.

use std::path::Path;

use tracing::info;

use crate::change::TemplateChangeDetails;
use crate::error::{ReportError, Result};

/// Default report file name, relative to the working directory.
pub const DEFAULT_REPORT_PATH: &str = "proposed_changes.json";

/// Writes a change report to a JSON file.
///
/// An empty run still writes a report (an empty array) so consumers can
/// distinguish "no changes" from "no run".
///
/// # Errors
///
/// Returns an error when serialization or the file write fails.
pub fn write_report(path: &Path, reports: &[TemplateChangeDetails]) -> Result<()> {
    let serialized = serde_json::to_string_pretty(reports).map_err(|e| {
        ReportError::SerializeError {
            message: e.to_string(),
        }
    })?;
    std::fs::write(path, serialized).map_err(|e| ReportError::WriteError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    info!(
        path = %path.display(),
        templates = reports.len(),
        "Change report written"
    );
    Ok(())
}
