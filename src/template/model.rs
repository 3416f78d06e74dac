//! Template data model for identity resources.
//!
//! A template is the desired-state description of one identity resource,
//! portable across accounts. Templates are a closed set of kind-tagged
//! variants, each with its own typed property schema. Every sortable
//! collection has a natural key and a deterministic ordering so repeated
//! loads, merges, and writes of logically-equal data produce byte-identical
//! output.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The scope wildcard: matches every configured account.
pub const WILDCARD: &str = "*";

/// Maximum number of tags a resource may carry.
pub const MAX_TAGS: usize = 50;

/// The closed set of resource kinds the engine reconciles.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    /// An AWS IAM role.
    #[serde(rename = "aws:iam:role")]
    AwsIamRole,
    /// An AWS IAM user.
    #[serde(rename = "aws:iam:user")]
    AwsIamUser,
    /// An Okta application.
    #[serde(rename = "okta:app")]
    OktaApp,
    /// A Google Workspace group.
    #[serde(rename = "google:group")]
    GoogleGroup,
}

impl ResourceKind {
    /// Returns the stable string form used in reports and file names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AwsIamRole => "aws:iam:role",
            Self::AwsIamUser => "aws:iam:user",
            Self::OktaApp => "okta:app",
            Self::GoogleGroup => "google:group",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named, versioned description of one identity resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "template_type")]
pub enum Template {
    /// AWS IAM role template.
    #[serde(rename = "aws:iam:role")]
    AwsIamRole(ResourceTemplate<RoleProperties>),
    /// AWS IAM user template.
    #[serde(rename = "aws:iam:user")]
    AwsIamUser(ResourceTemplate<UserProperties>),
    /// Okta application template.
    #[serde(rename = "okta:app")]
    OktaApp(ResourceTemplate<AppProperties>),
    /// Google Workspace group template.
    #[serde(rename = "google:group")]
    GoogleGroup(ResourceTemplate<GroupProperties>),
}

/// Common template envelope shared by every resource kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceTemplate<P> {
    /// Resource identifier, unique within the kind.
    pub identifier: String,
    /// Accounts this template applies to, or the wildcard `*`.
    #[serde(default = "default_included_accounts")]
    pub included_accounts: Vec<String>,
    /// Accounts excluded from this template. Exclusion always wins.
    #[serde(default)]
    pub excluded_accounts: Vec<String>,
    /// Operator-owned expiry annotation. Never produced by discovery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    /// When true, the resource is removed from every resolved account.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
    /// Kind-specific property payload.
    pub properties: P,
    /// Source file path, when loaded from disk.
    #[serde(skip)]
    pub file_path: Option<PathBuf>,
}

fn default_included_accounts() -> Vec<String> {
    vec![WILDCARD.to_string()]
}

/// A sub-property carrying its own account scoping.
///
/// Implementors resolve per-account via the scope resolver; the most
/// specific matching entry wins (explicit account beats wildcard).
pub trait AccountScoped {
    /// Accounts this entry applies to.
    fn included_accounts(&self) -> &[String];
    /// Accounts this entry never applies to.
    fn excluded_accounts(&self) -> &[String];
}

macro_rules! impl_account_scoped {
    ($($ty:ty),+) => {
        $(impl AccountScoped for $ty {
            fn included_accounts(&self) -> &[String] {
                &self.included_accounts
            }
            fn excluded_accounts(&self) -> &[String] {
                &self.excluded_accounts
            }
        })+
    };
}

/// A per-account path override.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PathOverride {
    /// Accounts this path applies to.
    #[serde(default = "default_included_accounts")]
    pub included_accounts: Vec<String>,
    /// Accounts this path never applies to.
    #[serde(default)]
    pub excluded_accounts: Vec<String>,
    /// The IAM path.
    pub path: String,
}

/// A per-account permissions boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PermissionsBoundary {
    /// Accounts this boundary applies to.
    #[serde(default = "default_included_accounts")]
    pub included_accounts: Vec<String>,
    /// Accounts this boundary never applies to.
    #[serde(default)]
    pub excluded_accounts: Vec<String>,
    /// ARN of the boundary policy.
    pub policy_arn: String,
}

/// A per-account credential set for an IAM user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    /// Accounts these credentials apply to.
    #[serde(default = "default_included_accounts")]
    pub included_accounts: Vec<String>,
    /// Accounts these credentials never apply to.
    #[serde(default)]
    pub excluded_accounts: Vec<String>,
    /// Access keys, sorted by id.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_keys: Vec<AccessKey>,
}

impl_account_scoped!(PathOverride, PermissionsBoundary, Credentials);

/// One access key on an IAM user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessKey {
    /// The access key id.
    pub id: String,
    /// Whether the key is active.
    #[serde(default)]
    pub enabled: bool,
    /// Last-used marker reported by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<String>,
}

/// A resource tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tag {
    /// Tag key.
    pub key: String,
    /// Tag value.
    #[serde(default)]
    pub value: String,
    /// Operator-owned expiry annotation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

/// A managed policy attachment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManagedPolicyRef {
    /// ARN of the managed policy.
    pub policy_arn: String,
    /// Operator-owned expiry annotation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

/// An inline policy document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InlinePolicy {
    /// Policy name, unique within the resource.
    pub policy_name: String,
    /// The policy document.
    pub policy_document: Value,
    /// Operator-owned expiry annotation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

/// A group membership on an IAM user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserGroup {
    /// Name of the group.
    pub group_name: String,
    /// Operator-owned expiry annotation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

/// A member of a Google Workspace group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupMember {
    /// Member email address.
    pub email: String,
    /// Membership role (OWNER, MANAGER, MEMBER).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Operator-owned expiry annotation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

/// A user or group assignment on an Okta application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppAssignment {
    /// Assigned user login, if a user assignment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Assigned group name, if a group assignment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Operator-owned expiry annotation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

impl AppAssignment {
    /// Stable natural key: user assignments sort before group assignments.
    #[must_use]
    pub fn sort_key(&self) -> String {
        match (&self.user, &self.group) {
            (Some(user), _) => format!("user:{user}"),
            (None, Some(group)) => format!("group:{group}"),
            (None, None) => String::new(),
        }
    }
}

/// Properties of an AWS IAM role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoleProperties {
    /// The role name.
    pub role_name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Per-account path overrides. Empty means the kind default `/`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<PathOverride>,
    /// Per-account permissions boundaries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions_boundary: Vec<PermissionsBoundary>,
    /// Maximum session duration in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_session_duration: Option<u32>,
    /// The trust (assume-role) policy document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assume_role_policy_document: Option<Value>,
    /// Resource tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
    /// Managed policy attachments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub managed_policies: Vec<ManagedPolicyRef>,
    /// Inline policies.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inline_policies: Vec<InlinePolicy>,
}

/// Properties of an AWS IAM user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProperties {
    /// The user name.
    pub user_name: String,
    /// Per-account path overrides. Empty means the kind default `/`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<PathOverride>,
    /// Per-account permissions boundaries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions_boundary: Vec<PermissionsBoundary>,
    /// Group memberships.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<UserGroup>,
    /// Per-account credential sets.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub credentials: Vec<Credentials>,
    /// Resource tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
    /// Managed policy attachments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub managed_policies: Vec<ManagedPolicyRef>,
    /// Inline policies.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inline_policies: Vec<InlinePolicy>,
}

/// Properties of an Okta application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppProperties {
    /// The application label.
    pub name: String,
    /// Application status reported by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// User and group assignments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assignments: Vec<AppAssignment>,
}

/// Properties of a Google Workspace group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupProperties {
    /// The group name.
    pub name: String,
    /// The group email address.
    pub email: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Group members.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<GroupMember>,
}

/// Sorts a scoped-entry list by its first included account, so authored
/// order never leaks into written output.
fn sort_scoped<T: AccountScoped>(entries: &mut [T]) {
    entries.sort_by(|a, b| {
        let a_key = a.included_accounts().first().map(String::as_str).unwrap_or("");
        let b_key = b.included_accounts().first().map(String::as_str).unwrap_or("");
        a_key.cmp(b_key)
    });
}

impl RoleProperties {
    /// Reorders every sortable collection by its natural key.
    pub fn normalize(&mut self) {
        sort_scoped(&mut self.path);
        sort_scoped(&mut self.permissions_boundary);
        self.tags.sort_by(|a, b| a.key.cmp(&b.key));
        self.managed_policies.sort_by(|a, b| a.policy_arn.cmp(&b.policy_arn));
        self.inline_policies.sort_by(|a, b| a.policy_name.cmp(&b.policy_name));
    }
}

impl UserProperties {
    /// Reorders every sortable collection by its natural key.
    pub fn normalize(&mut self) {
        sort_scoped(&mut self.path);
        sort_scoped(&mut self.permissions_boundary);
        sort_scoped(&mut self.credentials);
        for credentials in &mut self.credentials {
            credentials.access_keys.sort_by(|a, b| a.id.cmp(&b.id));
        }
        self.groups.sort_by(|a, b| a.group_name.cmp(&b.group_name));
        self.tags.sort_by(|a, b| a.key.cmp(&b.key));
        self.managed_policies.sort_by(|a, b| a.policy_arn.cmp(&b.policy_arn));
        self.inline_policies.sort_by(|a, b| a.policy_name.cmp(&b.policy_name));
    }
}

impl AppProperties {
    /// Reorders every sortable collection by its natural key.
    pub fn normalize(&mut self) {
        self.assignments.sort_by_key(AppAssignment::sort_key);
    }
}

impl GroupProperties {
    /// Reorders every sortable collection by its natural key.
    pub fn normalize(&mut self) {
        self.members.sort_by(|a, b| a.email.cmp(&b.email));
    }
}

impl Template {
    /// Returns the resource kind of this template.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::AwsIamRole(_) => ResourceKind::AwsIamRole,
            Self::AwsIamUser(_) => ResourceKind::AwsIamUser,
            Self::OktaApp(_) => ResourceKind::OktaApp,
            Self::GoogleGroup(_) => ResourceKind::GoogleGroup,
        }
    }

    /// Returns the template's resource identifier.
    #[must_use]
    pub fn identifier(&self) -> &str {
        match self {
            Self::AwsIamRole(t) => &t.identifier,
            Self::AwsIamUser(t) => &t.identifier,
            Self::OktaApp(t) => &t.identifier,
            Self::GoogleGroup(t) => &t.identifier,
        }
    }

    /// Returns the accounts this template includes.
    #[must_use]
    pub fn included_accounts(&self) -> &[String] {
        match self {
            Self::AwsIamRole(t) => &t.included_accounts,
            Self::AwsIamUser(t) => &t.included_accounts,
            Self::OktaApp(t) => &t.included_accounts,
            Self::GoogleGroup(t) => &t.included_accounts,
        }
    }

    /// Returns the accounts this template excludes.
    #[must_use]
    pub fn excluded_accounts(&self) -> &[String] {
        match self {
            Self::AwsIamRole(t) => &t.excluded_accounts,
            Self::AwsIamUser(t) => &t.excluded_accounts,
            Self::OktaApp(t) => &t.excluded_accounts,
            Self::GoogleGroup(t) => &t.excluded_accounts,
        }
    }

    /// Returns true if this template marks its resource for deletion.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        match self {
            Self::AwsIamRole(t) => t.deleted,
            Self::AwsIamUser(t) => t.deleted,
            Self::OktaApp(t) => t.deleted,
            Self::GoogleGroup(t) => t.deleted,
        }
    }

    /// Marks this template's resource for deletion.
    pub const fn set_deleted(&mut self, deleted: bool) {
        match self {
            Self::AwsIamRole(t) => t.deleted = deleted,
            Self::AwsIamUser(t) => t.deleted = deleted,
            Self::OktaApp(t) => t.deleted = deleted,
            Self::GoogleGroup(t) => t.deleted = deleted,
        }
    }

    /// Returns the template's operator-owned expiry annotation.
    #[must_use]
    pub fn expires_at(&self) -> Option<&str> {
        match self {
            Self::AwsIamRole(t) => t.expires_at.as_deref(),
            Self::AwsIamUser(t) => t.expires_at.as_deref(),
            Self::OktaApp(t) => t.expires_at.as_deref(),
            Self::GoogleGroup(t) => t.expires_at.as_deref(),
        }
    }

    /// Returns the source file path, when loaded from disk.
    #[must_use]
    pub fn file_path(&self) -> Option<&PathBuf> {
        match self {
            Self::AwsIamRole(t) => t.file_path.as_ref(),
            Self::AwsIamUser(t) => t.file_path.as_ref(),
            Self::OktaApp(t) => t.file_path.as_ref(),
            Self::GoogleGroup(t) => t.file_path.as_ref(),
        }
    }

    /// Sets the source file path.
    pub fn set_file_path(&mut self, path: PathBuf) {
        match self {
            Self::AwsIamRole(t) => t.file_path = Some(path),
            Self::AwsIamUser(t) => t.file_path = Some(path),
            Self::OktaApp(t) => t.file_path = Some(path),
            Self::GoogleGroup(t) => t.file_path = Some(path),
        }
    }

    /// Reorders every sortable collection by its natural key, recursively.
    pub fn normalize(&mut self) {
        match self {
            Self::AwsIamRole(t) => {
                t.included_accounts.sort();
                t.excluded_accounts.sort();
                t.properties.normalize();
            }
            Self::AwsIamUser(t) => {
                t.included_accounts.sort();
                t.excluded_accounts.sort();
                t.properties.normalize();
            }
            Self::OktaApp(t) => {
                t.included_accounts.sort();
                t.excluded_accounts.sort();
                t.properties.normalize();
            }
            Self::GoogleGroup(t) => {
                t.included_accounts.sort();
                t.excluded_accounts.sort();
                t.properties.normalize();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_round_trip_tagged_by_kind() {
        let yaml = r#"
template_type: "aws:iam:role"
identifier: engineering
included_accounts:
  - "*"
excluded_accounts:
  - sandbox
properties:
  role_name: engineering
  tags:
    - key: team
      value: eng
"#;
        let template: Template = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(template.kind(), ResourceKind::AwsIamRole);
        assert_eq!(template.identifier(), "engineering");
        assert_eq!(template.excluded_accounts(), ["sandbox"]);
        assert!(!template.is_deleted());
    }

    #[test]
    fn test_kind_keys_ordered_maps() {
        use std::collections::BTreeMap;
        let mut templates: BTreeMap<(ResourceKind, String), u32> = BTreeMap::new();
        templates.insert((ResourceKind::OktaApp, String::from("portal")), 1);
        templates.insert((ResourceKind::AwsIamRole, String::from("engineering")), 2);
        assert_eq!(
            templates.get(&(ResourceKind::AwsIamRole, String::from("engineering"))),
            Some(&2)
        );
        assert_eq!(templates.len(), 2);
    }

    #[test]
    fn test_included_accounts_default_to_wildcard() {
        let yaml = r#"
template_type: "google:group"
identifier: everyone
properties:
  name: everyone
  email: everyone@example.com
"#;
        let template: Template = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(template.included_accounts(), [WILDCARD]);
    }

    #[test]
    fn test_access_keys_sorted_by_id() {
        let mut properties = UserProperties {
            user_name: String::from("foo"),
            path: vec![],
            permissions_boundary: vec![],
            groups: vec![],
            credentials: vec![Credentials {
                included_accounts: vec![WILDCARD.to_string()],
                excluded_accounts: vec![],
                access_keys: vec![
                    AccessKey {
                        id: String::from("ABC"),
                        enabled: true,
                        last_used: Some(String::from("Never")),
                    },
                    AccessKey {
                        id: String::from("123"),
                        enabled: true,
                        last_used: Some(String::from("Never")),
                    },
                ],
            }],
            tags: vec![],
            managed_policies: vec![],
            inline_policies: vec![],
        };
        properties.normalize();
        // 123 sorts before ABC.
        assert_eq!(properties.credentials[0].access_keys[0].id, "123");
        assert_eq!(properties.credentials[0].access_keys[1].id, "ABC");
    }

    #[test]
    fn test_credentials_sorted_by_scope() {
        let mut properties = UserProperties {
            user_name: String::from("foo"),
            path: vec![],
            permissions_boundary: vec![],
            groups: vec![],
            credentials: vec![
                Credentials {
                    included_accounts: vec![String::from("account_b")],
                    excluded_accounts: vec![],
                    access_keys: vec![],
                },
                Credentials {
                    included_accounts: vec![String::from("account_a")],
                    excluded_accounts: vec![],
                    access_keys: vec![],
                },
            ],
            tags: vec![],
            managed_policies: vec![],
            inline_policies: vec![],
        };
        properties.normalize();
        assert_eq!(properties.credentials[0].included_accounts, ["account_a"]);
        assert_eq!(properties.credentials[1].included_accounts, ["account_b"]);
    }

    #[test]
    fn test_groups_sorted_by_name() {
        let mut properties = UserProperties {
            user_name: String::from("foo"),
            path: vec![],
            permissions_boundary: vec![],
            groups: vec![
                UserGroup {
                    group_name: String::from("baz"),
                    expires_at: None,
                },
                UserGroup {
                    group_name: String::from("bar"),
                    expires_at: None,
                },
            ],
            credentials: vec![],
            tags: vec![],
            managed_policies: vec![],
            inline_policies: vec![],
        };
        properties.normalize();
        assert_eq!(properties.groups[0].group_name, "bar");
        assert_eq!(properties.groups[1].group_name, "baz");
    }

    #[test]
    fn test_path_override_reordering_is_deterministic() {
        let mut properties = RoleProperties {
            role_name: String::from("foo"),
            description: None,
            path: vec![
                PathOverride {
                    included_accounts: vec![String::from("account_3")],
                    excluded_accounts: vec![],
                    path: String::from("/finance"),
                },
                PathOverride {
                    included_accounts: vec![String::from("account_1"), String::from("account_2")],
                    excluded_accounts: vec![],
                    path: String::from("/engineering"),
                },
            ],
            permissions_boundary: vec![],
            max_session_duration: None,
            assume_role_policy_document: None,
            tags: vec![],
            managed_policies: vec![],
            inline_policies: vec![],
        };
        properties.normalize();
        assert_eq!(properties.path[0].path, "/engineering");
        assert_eq!(properties.path[1].path, "/finance");
    }
}
