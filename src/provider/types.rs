//! Provider-facing data types.
//!
//! [`ObservedResource`] is the provider-agnostic snapshot of a live
//! resource, shaped to line up aspect-for-aspect with the resolved
//! desired state. [`Mutation`] is the closed set of write operations the
//! orchestrator may request; providers translate each into their own API
//! calls.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::template::model::ResourceKind;

/// A tag observed on a live resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObservedTag {
    /// Tag key.
    pub key: String,
    /// Tag value.
    pub value: String,
}

/// An inline policy observed on a live resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObservedInlinePolicy {
    /// Policy name.
    pub policy_name: String,
    /// The policy document.
    pub policy_document: Value,
}

/// Snapshot of one live resource on one account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObservedResource {
    /// Resource name on the provider.
    pub name: String,
    /// Resource kind.
    pub kind: ResourceKind,
    /// IAM path, for kinds that carry one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Permissions boundary ARN, if attached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions_boundary: Option<String>,
    /// Trust (assume-role) policy document, if the kind carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_policy: Option<Value>,
    /// Observed tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<ObservedTag>,
    /// Attached managed policy ARNs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub managed_policies: Vec<String>,
    /// Inline policies.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inline_policies: Vec<ObservedInlinePolicy>,
    /// Instance profiles the resource belongs to (roles only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instance_profiles: Vec<String>,
    /// Membership keys (user groups, app assignments, group members).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assignments: Vec<String>,
}

impl ObservedResource {
    /// Creates an empty snapshot for a named resource.
    #[must_use]
    pub fn new(name: &str, kind: ResourceKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            path: None,
            permissions_boundary: None,
            trust_policy: None,
            tags: vec![],
            managed_policies: vec![],
            inline_policies: vec![],
            instance_profiles: vec![],
            assignments: vec![],
        }
    }
}

/// A single write operation against a provider.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Creates the resource itself.
    CreateResource {
        /// Resource kind.
        kind: ResourceKind,
        /// Resource name.
        name: String,
        /// IAM path, for kinds that carry one.
        path: Option<String>,
        /// Trust policy, for kinds that carry one.
        trust_policy: Option<Value>,
    },
    /// Replaces the trust policy document.
    UpdateTrustPolicy {
        /// Resource name.
        name: String,
        /// The new policy document.
        trust_policy: Value,
    },
    /// Sets or replaces the permissions boundary.
    SetPermissionsBoundary {
        /// Resource name.
        name: String,
        /// ARN of the boundary policy.
        policy_arn: String,
    },
    /// Sets one tag (create or overwrite).
    TagResource {
        /// Resource name.
        name: String,
        /// Tag key.
        key: String,
        /// Tag value.
        value: String,
    },
    /// Removes tags by key.
    UntagResource {
        /// Resource name.
        name: String,
        /// Keys to remove.
        keys: Vec<String>,
    },
    /// Attaches a managed policy.
    AttachManagedPolicy {
        /// Resource name.
        name: String,
        /// Policy ARN.
        policy_arn: String,
    },
    /// Detaches a managed policy.
    DetachManagedPolicy {
        /// Resource name.
        name: String,
        /// Policy ARN.
        policy_arn: String,
    },
    /// Creates or replaces an inline policy.
    PutInlinePolicy {
        /// Resource name.
        name: String,
        /// Policy name.
        policy_name: String,
        /// The policy document.
        policy_document: Value,
    },
    /// Deletes an inline policy.
    DeleteInlinePolicy {
        /// Resource name.
        name: String,
        /// Policy name.
        policy_name: String,
    },
    /// Adds a membership (user group, app assignment, group member).
    AddAssignment {
        /// Resource name.
        name: String,
        /// Membership key.
        key: String,
    },
    /// Removes a membership.
    RemoveAssignment {
        /// Resource name.
        name: String,
        /// Membership key.
        key: String,
    },
    /// Removes a role from an instance profile.
    RemoveFromInstanceProfile {
        /// Role name.
        name: String,
        /// Instance profile name.
        instance_profile: String,
    },
    /// Deletes an instance profile.
    DeleteInstanceProfile {
        /// Instance profile name.
        instance_profile: String,
    },
    /// Deletes the resource itself.
    DeleteResource {
        /// Resource kind.
        kind: ResourceKind,
        /// Resource name.
        name: String,
    },
}

impl Mutation {
    /// Returns the name of the resource this mutation targets.
    #[must_use]
    pub fn resource_name(&self) -> &str {
        match self {
            Self::CreateResource { name, .. }
            | Self::UpdateTrustPolicy { name, .. }
            | Self::SetPermissionsBoundary { name, .. }
            | Self::TagResource { name, .. }
            | Self::UntagResource { name, .. }
            | Self::AttachManagedPolicy { name, .. }
            | Self::DetachManagedPolicy { name, .. }
            | Self::PutInlinePolicy { name, .. }
            | Self::DeleteInlinePolicy { name, .. }
            | Self::AddAssignment { name, .. }
            | Self::RemoveAssignment { name, .. }
            | Self::RemoveFromInstanceProfile { name, .. }
            | Self::DeleteResource { name, .. } => name,
            Self::DeleteInstanceProfile { instance_profile } => instance_profile,
        }
    }
}

/// Applies one mutation to a set of observed resources on one account.
///
/// This is the reference semantics of each [`Mutation`], used by local
/// provider backends. Mutations against an absent resource are ignored;
/// the orchestrator only emits them after observing the resource.
pub fn apply_mutation(resources: &mut Vec<ObservedResource>, mutation: &Mutation) {
    match mutation {
        Mutation::CreateResource {
            kind,
            name,
            path,
            trust_policy,
        } => {
            resources.retain(|r| !(r.kind == *kind && &r.name == name));
            let mut resource = ObservedResource::new(name, *kind);
            resource.path.clone_from(path);
            resource.trust_policy.clone_from(trust_policy);
            resources.push(resource);
        }
        Mutation::DeleteResource { kind, name } => {
            resources.retain(|r| !(r.kind == *kind && &r.name == name));
        }
        other => {
            let name = other.resource_name();
            let Some(resource) = resources.iter_mut().find(|r| r.name == name) else {
                return;
            };
            match other {
                Mutation::UpdateTrustPolicy { trust_policy, .. } => {
                    resource.trust_policy = Some(trust_policy.clone());
                }
                Mutation::SetPermissionsBoundary { policy_arn, .. } => {
                    resource.permissions_boundary = Some(policy_arn.clone());
                }
                Mutation::TagResource { key, value, .. } => {
                    resource.tags.retain(|t| &t.key != key);
                    resource.tags.push(ObservedTag {
                        key: key.clone(),
                        value: value.clone(),
                    });
                }
                Mutation::UntagResource { keys, .. } => {
                    resource.tags.retain(|t| !keys.contains(&t.key));
                }
                Mutation::AttachManagedPolicy { policy_arn, .. } => {
                    resource.managed_policies.push(policy_arn.clone());
                }
                Mutation::DetachManagedPolicy { policy_arn, .. } => {
                    resource.managed_policies.retain(|p| p != policy_arn);
                }
                Mutation::PutInlinePolicy {
                    policy_name,
                    policy_document,
                    ..
                } => {
                    resource
                        .inline_policies
                        .retain(|p| &p.policy_name != policy_name);
                    resource.inline_policies.push(ObservedInlinePolicy {
                        policy_name: policy_name.clone(),
                        policy_document: policy_document.clone(),
                    });
                }
                Mutation::DeleteInlinePolicy { policy_name, .. } => {
                    resource
                        .inline_policies
                        .retain(|p| &p.policy_name != policy_name);
                }
                Mutation::AddAssignment { key, .. } => {
                    resource.assignments.push(key.clone());
                }
                Mutation::RemoveAssignment { key, .. } => {
                    resource.assignments.retain(|a| a != key);
                }
                Mutation::RemoveFromInstanceProfile {
                    instance_profile, ..
                } => {
                    resource.instance_profiles.retain(|p| p != instance_profile);
                }
                _ => {}
            }
        }
    }
}

impl std::fmt::Display for Mutation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreateResource { kind, name, .. } => {
                write!(f, "create {kind} '{name}'")
            }
            Self::UpdateTrustPolicy { name, .. } => {
                write!(f, "update trust policy on '{name}'")
            }
            Self::SetPermissionsBoundary { name, policy_arn } => {
                write!(f, "set permissions boundary '{policy_arn}' on '{name}'")
            }
            Self::TagResource { name, key, .. } => {
                write!(f, "tag '{name}' with '{key}'")
            }
            Self::UntagResource { name, keys } => {
                write!(f, "untag '{name}' ({})", keys.join(", "))
            }
            Self::AttachManagedPolicy { name, policy_arn } => {
                write!(f, "attach '{policy_arn}' to '{name}'")
            }
            Self::DetachManagedPolicy { name, policy_arn } => {
                write!(f, "detach '{policy_arn}' from '{name}'")
            }
            Self::PutInlinePolicy { name, policy_name, .. } => {
                write!(f, "put inline policy '{policy_name}' on '{name}'")
            }
            Self::DeleteInlinePolicy { name, policy_name } => {
                write!(f, "delete inline policy '{policy_name}' from '{name}'")
            }
            Self::AddAssignment { name, key } => {
                write!(f, "add '{key}' to '{name}'")
            }
            Self::RemoveAssignment { name, key } => {
                write!(f, "remove '{key}' from '{name}'")
            }
            Self::RemoveFromInstanceProfile { name, instance_profile } => {
                write!(f, "remove '{name}' from instance profile '{instance_profile}'")
            }
            Self::DeleteInstanceProfile { instance_profile } => {
                write!(f, "delete instance profile '{instance_profile}'")
            }
            Self::DeleteResource { kind, name } => {
                write!(f, "delete {kind} '{name}'")
            }
        }
    }
}
