//! Change records produced by reconciliation.
//!
//! A [`ProposedChange`] describes one mutation the engine intends to make
//! (or made, in execute mode). All records for one template aggregate into
//! a [`TemplateChangeDetails`] report. The serialized field names are a
//! stable contract: the JSON report is machine-parsed by review tooling.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::drift::DriftResult;

/// Kind of change being proposed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// A resource or sub-resource is created.
    Create,
    /// An existing value is updated in place.
    Update,
    /// A sub-resource is attached (tag, managed policy, assignment).
    Attach,
    /// A sub-resource is detached.
    Detach,
    /// A resource or sub-resource is deleted.
    Delete,
}

/// One proposed mutation with before/after context.
///
/// Immutable once produced; construction goes through the builder-style
/// `with_*` helpers so call sites only set the fields the aspect needs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProposedChange {
    /// The kind of change.
    pub change_type: ChangeType,
    /// The account the change applies to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    /// Identifier of the touched sub-resource, when narrower than the
    /// template's own identifier (e.g. a policy ARN or tag key).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    /// The attribute this change touches (e.g. "tags", "inline_policies").
    pub attribute: String,
    /// Current (live) value, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_value: Option<Value>,
    /// Desired value, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
    /// Structured field-level diff, when the change was derived from a
    /// drift comparison.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_summary: Option<DriftResult>,
}

impl ProposedChange {
    /// Creates a new change record for an attribute.
    #[must_use]
    pub fn new(change_type: ChangeType, attribute: impl Into<String>) -> Self {
        Self {
            change_type,
            account: None,
            resource_id: None,
            attribute: attribute.into(),
            current_value: None,
            new_value: None,
            change_summary: None,
        }
    }

    /// Sets the account the change applies to.
    #[must_use]
    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    /// Sets the sub-resource identifier.
    #[must_use]
    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    /// Sets the current (live) value.
    #[must_use]
    pub fn with_current_value(mut self, value: Value) -> Self {
        self.current_value = Some(value);
        self
    }

    /// Sets the desired value.
    #[must_use]
    pub fn with_new_value(mut self, value: Value) -> Self {
        self.new_value = Some(value);
        self
    }

    /// Attaches a structured drift summary.
    #[must_use]
    pub fn with_change_summary(mut self, summary: DriftResult) -> Self {
        self.change_summary = Some(summary);
        self
    }
}

/// Aggregated change report for one template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TemplateChangeDetails {
    /// The template's resource identifier.
    pub resource_id: String,
    /// The template's resource type (e.g. "aws:iam:role").
    pub resource_type: String,
    /// Path of the template file, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_path: Option<String>,
    /// All proposed changes, in account-resolution then aspect order.
    pub proposed_changes: Vec<ProposedChange>,
    /// Errors encountered while computing or applying changes, scoped to
    /// the account and operation they occurred on.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub exceptions_seen: Vec<String>,
}

impl TemplateChangeDetails {
    /// Creates an empty report for a template.
    #[must_use]
    pub fn new(resource_id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            resource_type: resource_type.into(),
            template_path: None,
            proposed_changes: vec![],
            exceptions_seen: vec![],
        }
    }

    /// Sets the template file path.
    #[must_use]
    pub fn with_template_path(mut self, path: impl Into<String>) -> Self {
        self.template_path = Some(path.into());
        self
    }

    /// Returns true if the report carries no changes and no exceptions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.proposed_changes.is_empty() && self.exceptions_seen.is_empty()
    }

    /// Returns the number of changes of a given type.
    #[must_use]
    pub fn count_of(&self, change_type: ChangeType) -> usize {
        self.proposed_changes
            .iter()
            .filter(|c| c.change_type == change_type)
            .count()
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Attach => "attach",
            Self::Detach => "detach",
            Self::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for ProposedChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.change_type, self.attribute)?;
        if let Some(id) = &self.resource_id {
            write!(f, " ({id})")?;
        }
        if let Some(account) = &self.account {
            write!(f, " on {account}")?;
        }
        Ok(())
    }
}

impl std::fmt::Display for TemplateChangeDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} [{}]: {} proposed change(s)",
            self.resource_id,
            self.resource_type,
            self.proposed_changes.len()
        )?;
        for change in &self.proposed_changes {
            writeln!(f, "  - {change}")?;
        }
        for exception in &self.exceptions_seen {
            writeln!(f, "  ! {exception}")?;
        }
        Ok(())
    }
}
