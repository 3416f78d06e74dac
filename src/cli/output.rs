//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying change
//! reports and validation results to the user in various formats.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::change::{ChangeType, TemplateChangeDetails};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Change row for table display.
#[derive(Tabled)]
struct ChangeRow {
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Account")]
    account: String,
    #[tabled(rename = "Attribute")]
    attribute: String,
    #[tabled(rename = "Target")]
    target: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a set of per-template change reports for display.
    #[must_use]
    pub fn format_reports(&self, reports: &[TemplateChangeDetails]) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(reports).unwrap_or_default(),
            OutputFormat::Text => Self::format_reports_text(reports),
        }
    }

    fn format_reports_text(reports: &[TemplateChangeDetails]) -> String {
        if reports.is_empty() {
            return format!("{} No changes - templates are converged.\n", "✓".green());
        }

        let mut output = String::new();

        for details in reports {
            let _ = write!(
                output,
                "\n{} [{}]",
                details.resource_id.bold(),
                details.resource_type
            );
            if let Some(path) = &details.template_path {
                let _ = write!(output, " ({path})");
            }
            output.push('\n');

            let rows: Vec<ChangeRow> = details
                .proposed_changes
                .iter()
                .map(|c| ChangeRow {
                    action: Self::format_change_type(c.change_type),
                    account: c.account.clone().unwrap_or_default(),
                    attribute: c.attribute.clone(),
                    target: c.resource_id.clone().unwrap_or_default(),
                })
                .collect();
            if !rows.is_empty() {
                let table = Table::new(rows).to_string();
                output.push_str(&table);
                output.push('\n');
            }

            if !details.exceptions_seen.is_empty() {
                let _ = write!(output, "{} Errors:\n", "⚠".yellow());
                for exception in &details.exceptions_seen {
                    let _ = writeln!(output, "   - {exception}");
                }
            }
        }

        let count = |change_type| {
            reports
                .iter()
                .map(|d| d.count_of(change_type))
                .sum::<usize>()
        };
        let _ = write!(
            output,
            "\nPlan: {} to create, {} to update, {} to attach, {} to detach, {} to delete\n",
            count(ChangeType::Create).to_string().green(),
            count(ChangeType::Update).to_string().yellow(),
            count(ChangeType::Attach).to_string().green(),
            count(ChangeType::Detach).to_string().red(),
            count(ChangeType::Delete).to_string().red(),
        );

        output
    }

    /// Formats a change type with color.
    fn format_change_type(change_type: ChangeType) -> String {
        match change_type {
            ChangeType::Create => "+create".green().to_string(),
            ChangeType::Update => "~update".yellow().to_string(),
            ChangeType::Attach => "+attach".green().to_string(),
            ChangeType::Detach => "-detach".red().to_string(),
            ChangeType::Delete => "-delete".red().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::ProposedChange;

    fn report() -> TemplateChangeDetails {
        let mut details = TemplateChangeDetails::new("engineering", "aws:iam:role");
        details.proposed_changes.push(
            ProposedChange::new(ChangeType::Attach, "managed_policies")
                .with_account("prod")
                .with_resource_id("arn:aws:iam::aws:policy/ReadOnlyAccess"),
        );
        details
    }

    #[test]
    fn test_text_output_names_the_resource() {
        let formatter = OutputFormatter::new(OutputFormat::Text);
        let output = formatter.format_reports(&[report()]);
        assert!(output.contains("engineering"));
        assert!(output.contains("managed_policies"));
        assert!(output.contains("1 to attach"));
    }

    #[test]
    fn test_json_output_is_parseable() {
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let output = formatter.format_reports(&[report()]);
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed[0]["resource_id"], "engineering");
    }

    #[test]
    fn test_empty_reports_say_converged() {
        let formatter = OutputFormatter::new(OutputFormat::Text);
        let output = formatter.format_reports(&[]);
        assert!(output.contains("converged"));
    }
}
