//! Account scope resolution.
//!
//! Computes the concrete set of accounts a template applies to, plus the
//! per-account effective properties after resolving every nested scoped
//! sub-property. Exclusion always wins over inclusion and wildcard, at
//! every scoping level. An explicitly scoped entry beats a wildcard one;
//! two explicit entries resolving to the same account with different
//! values is a hard error, surfaced at validation time rather than
//! silently overwritten.

use serde_json::Value;

use crate::config::AccountConfig;
use crate::error::{Result, ScopeError};

use super::model::{
    AccountScoped, AppProperties, GroupProperties, InlinePolicy, ResourceKind, RoleProperties,
    Tag, Template, UserProperties, WILDCARD,
};

/// Default IAM path when no override matches an account.
const DEFAULT_PATH: &str = "/";

/// Effective desired state for one resource on one account.
///
/// This is the provider-agnostic shape the orchestrator diffs against
/// observed state, aspect by aspect.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredAspects {
    /// The resource name on the provider.
    pub name: String,
    /// The resource kind.
    pub kind: ResourceKind,
    /// Effective IAM path.
    pub path: String,
    /// Effective permissions boundary ARN, if any.
    pub permissions_boundary: Option<String>,
    /// Trust (assume-role) policy document, if the kind carries one.
    pub trust_policy: Option<Value>,
    /// Desired tags.
    pub tags: Vec<Tag>,
    /// Desired managed policy ARNs.
    pub managed_policies: Vec<String>,
    /// Desired inline policies.
    pub inline_policies: Vec<InlinePolicy>,
    /// Attribute name for the kind's membership aspect
    /// ("groups", "assignments", "members"), empty when the kind has none.
    pub assignment_attribute: &'static str,
    /// Desired membership keys for the membership aspect.
    pub assignments: Vec<String>,
}

impl DesiredAspects {
    fn new(name: &str, kind: ResourceKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            path: DEFAULT_PATH.to_string(),
            permissions_boundary: None,
            trust_policy: None,
            tags: vec![],
            managed_policies: vec![],
            inline_policies: vec![],
            assignment_attribute: "",
            assignments: vec![],
        }
    }
}

/// Returns true if an account is in scope for the given rules.
///
/// Exclusion always wins, even when the account is also included or
/// covered by the wildcard.
#[must_use]
pub fn account_in_scope(
    account: &AccountConfig,
    included_accounts: &[String],
    excluded_accounts: &[String],
) -> bool {
    if excluded_accounts.iter().any(|p| account.matches(p)) {
        return false;
    }
    included_accounts
        .iter()
        .any(|p| p == WILDCARD || account.matches(p))
}

/// Selects the most specific scoped entry matching an account.
///
/// Explicit account matches beat wildcard matches. Multiple candidates at
/// the winning specificity with different values are a conflict.
///
/// # Errors
///
/// Returns [`ScopeError::Conflict`] when two equally specific entries
/// carry different values for the same account.
pub fn select_scoped<'t, T, V, F>(
    entries: &'t [T],
    account: &AccountConfig,
    attribute: &str,
    value_of: F,
) -> Result<Option<&'t T>>
where
    T: AccountScoped,
    V: PartialEq,
    F: Fn(&'t T) -> V,
{
    let mut explicit: Vec<&T> = Vec::new();
    let mut wildcard: Vec<&T> = Vec::new();

    for entry in entries {
        if entry
            .excluded_accounts()
            .iter()
            .any(|p| account.matches(p))
        {
            continue;
        }
        if entry.included_accounts().iter().any(|p| account.matches(p)) {
            explicit.push(entry);
        } else if entry.included_accounts().iter().any(|p| p == WILDCARD) {
            wildcard.push(entry);
        }
    }

    let candidates = if explicit.is_empty() { wildcard } else { explicit };

    match candidates.as_slice() {
        [] => Ok(None),
        [single] => Ok(Some(single)),
        [first, rest @ ..] => {
            if rest.iter().all(|e| value_of(e) == value_of(first)) {
                Ok(Some(first))
            } else {
                Err(ScopeError::Conflict {
                    attribute: attribute.to_string(),
                    account: account.account_id.clone(),
                }
                .into())
            }
        }
    }
}

/// Resolves a template to its concrete account set with effective
/// per-account properties.
///
/// The result preserves configured account order. A template naming zero
/// resolvable accounts resolves to an empty list (a no-op, not an error).
///
/// # Errors
///
/// Returns an error when a nested scoped sub-property has conflicting
/// entries for a resolved account.
pub fn resolve<'a>(
    template: &Template,
    accounts: &'a [AccountConfig],
) -> Result<Vec<(&'a AccountConfig, DesiredAspects)>> {
    let mut resolved = Vec::new();

    for account in accounts {
        if !account_in_scope(
            account,
            template.included_accounts(),
            template.excluded_accounts(),
        ) {
            continue;
        }

        let aspects = match template {
            Template::AwsIamRole(t) => resolve_role(&t.properties, account)?,
            Template::AwsIamUser(t) => resolve_user(&t.properties, account)?,
            Template::OktaApp(t) => resolve_app(&t.properties),
            Template::GoogleGroup(t) => resolve_group(&t.properties),
        };
        resolved.push((account, aspects));
    }

    Ok(resolved)
}

fn resolve_role(properties: &RoleProperties, account: &AccountConfig) -> Result<DesiredAspects> {
    let mut aspects = DesiredAspects::new(&properties.role_name, ResourceKind::AwsIamRole);

    if let Some(entry) = select_scoped(&properties.path, account, "path", |e| &e.path)? {
        aspects.path.clone_from(&entry.path);
    }
    if let Some(entry) = select_scoped(
        &properties.permissions_boundary,
        account,
        "permissions_boundary",
        |e| &e.policy_arn,
    )? {
        aspects.permissions_boundary = Some(entry.policy_arn.clone());
    }
    aspects.trust_policy.clone_from(&properties.assume_role_policy_document);
    aspects.tags.clone_from(&properties.tags);
    aspects.managed_policies = properties
        .managed_policies
        .iter()
        .map(|p| p.policy_arn.clone())
        .collect();
    aspects.inline_policies.clone_from(&properties.inline_policies);

    Ok(aspects)
}

fn resolve_user(properties: &UserProperties, account: &AccountConfig) -> Result<DesiredAspects> {
    let mut aspects = DesiredAspects::new(&properties.user_name, ResourceKind::AwsIamUser);

    if let Some(entry) = select_scoped(&properties.path, account, "path", |e| &e.path)? {
        aspects.path.clone_from(&entry.path);
    }
    if let Some(entry) = select_scoped(
        &properties.permissions_boundary,
        account,
        "permissions_boundary",
        |e| &e.policy_arn,
    )? {
        aspects.permissions_boundary = Some(entry.policy_arn.clone());
    }
    // Credentials are not reconciled as an aspect, but conflicting scoped
    // entries still have to surface at validation time.
    select_scoped(&properties.credentials, account, "credentials", |e| {
        &e.access_keys
    })?;
    aspects.tags.clone_from(&properties.tags);
    aspects.managed_policies = properties
        .managed_policies
        .iter()
        .map(|p| p.policy_arn.clone())
        .collect();
    aspects.inline_policies.clone_from(&properties.inline_policies);
    aspects.assignment_attribute = "groups";
    aspects.assignments = properties
        .groups
        .iter()
        .map(|g| g.group_name.clone())
        .collect();

    Ok(aspects)
}

fn resolve_app(properties: &AppProperties) -> DesiredAspects {
    let mut aspects = DesiredAspects::new(&properties.name, ResourceKind::OktaApp);
    aspects.assignment_attribute = "assignments";
    aspects.assignments = properties
        .assignments
        .iter()
        .map(super::model::AppAssignment::sort_key)
        .collect();
    aspects
}

fn resolve_group(properties: &GroupProperties) -> DesiredAspects {
    let mut aspects = DesiredAspects::new(&properties.email, ResourceKind::GoogleGroup);
    aspects.assignment_attribute = "members";
    aspects.assignments = properties.members.iter().map(|m| m.email.clone()).collect();
    aspects
}
