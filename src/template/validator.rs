//! Template validation.
//!
//! Validation runs at template-load time, before any provider call is
//! attempted, and blocks only the failing template. It covers field
//! constraints (name presence, tag count), duplicate natural keys, and
//! account-scope conflicts in nested sub-properties.

use std::collections::HashSet;

use tracing::debug;

use crate::config::AccountConfig;
use crate::error::{KeyplaneError, Result, ScopeError, TemplateError};

use super::model::{
    AppProperties, GroupProperties, RoleProperties, Template, UserProperties, MAX_TAGS, WILDCARD,
};
use super::scope;

/// Validator for identity templates.
#[derive(Debug, Default)]
pub struct TemplateValidator;

/// Validation result containing all issues found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl TemplateValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a template against the configured accounts.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first validation failure.
    pub fn validate(
        &self,
        template: &Template,
        accounts: &[AccountConfig],
    ) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        if template.identifier().trim().is_empty() {
            result.errors.push(ValidationError {
                field: String::from("identifier"),
                message: String::from("Template identifier cannot be empty"),
            });
        }

        // A scope pattern naming no configured account is a typo until
        // proven otherwise.
        if !accounts.is_empty() {
            for pattern in template
                .included_accounts()
                .iter()
                .chain(template.excluded_accounts())
            {
                if pattern != WILDCARD && !accounts.iter().any(|a| a.matches(pattern)) {
                    result.errors.push(ValidationError {
                        field: String::from("included_accounts"),
                        message: ScopeError::UnknownAccount {
                            account: pattern.clone(),
                        }
                        .to_string(),
                    });
                }
            }
        }

        match template {
            Template::AwsIamRole(t) => Self::validate_role(&t.properties, &mut result),
            Template::AwsIamUser(t) => Self::validate_user(&t.properties, &mut result),
            Template::OktaApp(t) => Self::validate_app(&t.properties, &mut result),
            Template::GoogleGroup(t) => Self::validate_group(&t.properties, &mut result),
        }

        // Scope conflicts surface here rather than during apply.
        if let Err(e) = scope::resolve(template, accounts) {
            result.errors.push(ValidationError {
                field: String::from("properties"),
                message: e.to_string(),
            });
        }

        if result.errors.is_empty() {
            debug!(identifier = template.identifier(), "Template validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(KeyplaneError::Template(TemplateError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }))
        }
    }

    fn validate_role(properties: &RoleProperties, result: &mut ValidationResult) {
        if properties.role_name.trim().is_empty() {
            result.errors.push(ValidationError {
                field: String::from("properties.role_name"),
                message: String::from("Role name cannot be empty"),
            });
        }
        Self::validate_tag_count(properties.tags.len(), result);
        Self::validate_unique(
            properties.tags.iter().map(|t| t.key.as_str()),
            "properties.tags",
            "tag key",
            result,
        );
        Self::validate_unique(
            properties.inline_policies.iter().map(|p| p.policy_name.as_str()),
            "properties.inline_policies",
            "inline policy name",
            result,
        );
        Self::validate_unique(
            properties.managed_policies.iter().map(|p| p.policy_arn.as_str()),
            "properties.managed_policies",
            "managed policy arn",
            result,
        );
    }

    fn validate_user(properties: &UserProperties, result: &mut ValidationResult) {
        if properties.user_name.trim().is_empty() {
            result.errors.push(ValidationError {
                field: String::from("properties.user_name"),
                message: String::from("User name cannot be empty"),
            });
        }
        Self::validate_tag_count(properties.tags.len(), result);
        Self::validate_unique(
            properties.tags.iter().map(|t| t.key.as_str()),
            "properties.tags",
            "tag key",
            result,
        );
        Self::validate_unique(
            properties.groups.iter().map(|g| g.group_name.as_str()),
            "properties.groups",
            "group name",
            result,
        );
        Self::validate_unique(
            properties.inline_policies.iter().map(|p| p.policy_name.as_str()),
            "properties.inline_policies",
            "inline policy name",
            result,
        );
    }

    fn validate_app(properties: &AppProperties, result: &mut ValidationResult) {
        if properties.name.trim().is_empty() {
            result.errors.push(ValidationError {
                field: String::from("properties.name"),
                message: String::from("App name cannot be empty"),
            });
        }
        for (i, assignment) in properties.assignments.iter().enumerate() {
            let has_user = assignment.user.is_some();
            let has_group = assignment.group.is_some();
            if has_user == has_group {
                result.errors.push(ValidationError {
                    field: format!("properties.assignments[{i}]"),
                    message: String::from(
                        "Assignment must name exactly one of 'user' or 'group'",
                    ),
                });
            }
        }
        Self::validate_unique(
            properties.assignments.iter().map(super::model::AppAssignment::sort_key),
            "properties.assignments",
            "assignment",
            result,
        );
    }

    fn validate_group(properties: &GroupProperties, result: &mut ValidationResult) {
        if properties.email.trim().is_empty() {
            result.errors.push(ValidationError {
                field: String::from("properties.email"),
                message: String::from("Group email cannot be empty"),
            });
        }
        Self::validate_unique(
            properties.members.iter().map(|m| m.email.as_str()),
            "properties.members",
            "member email",
            result,
        );
    }

    fn validate_tag_count(count: usize, result: &mut ValidationResult) {
        if count > MAX_TAGS {
            result.errors.push(ValidationError {
                field: String::from("properties.tags"),
                message: format!("Too many tags: {count} (maximum {MAX_TAGS})"),
            });
        }
    }

    fn validate_unique<K>(
        keys: impl Iterator<Item = K>,
        field: &str,
        what: &str,
        result: &mut ValidationResult,
    ) where
        K: std::hash::Hash + Eq + std::fmt::Display,
    {
        let mut seen = HashSet::new();
        for key in keys {
            if !seen.insert(key.to_string()) {
                result.errors.push(ValidationError {
                    field: field.to_string(),
                    message: format!("Duplicate {what}: {key}"),
                });
            }
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}
