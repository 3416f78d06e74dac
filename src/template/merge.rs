//! Template merge engine.
//!
//! Reconciles a newly generated (discovered) template with a previously
//! persisted template of the same kind. Discovery is authoritative for
//! membership and provider-observable values; operator-authored
//! annotations with no provider counterpart (expiry dates) are carried
//! forward from the existing template. After merging, every sortable
//! collection is reordered by its natural key so repeated merges of
//! logically-equal data produce byte-identical output.

use crate::config::AccountConfig;

use super::model::{
    AppAssignment, AppProperties, Credentials, GroupMember, GroupProperties, InlinePolicy,
    ManagedPolicyRef, PathOverride, PermissionsBoundary, ResourceTemplate, RoleProperties, Tag,
    Template, UserGroup, UserProperties,
};

/// Merges a keyed collection element-wise by natural key.
///
/// Elements present in both carry forward existing annotations via
/// `carry`; elements only in `new` are kept as-is; elements only in
/// `existing` are dropped.
fn merge_keyed<T, K, FK, FC>(new: Vec<T>, existing: &[T], key_of: FK, carry: FC) -> Vec<T>
where
    K: PartialEq,
    FK: Fn(&T) -> K,
    FC: Fn(&mut T, &T),
{
    new.into_iter()
        .map(|mut item| {
            if let Some(matched) = existing.iter().find(|e| key_of(e) == key_of(&item)) {
                carry(&mut item, matched);
            }
            item
        })
        .collect()
}

/// Preserves an operator-owned optional field when the new value is unset.
fn keep_existing_if_unset(new: &mut Option<String>, existing: Option<&String>) {
    if new.is_none() {
        *new = existing.cloned();
    }
}

fn merge_tags(new: Vec<Tag>, existing: &[Tag]) -> Vec<Tag> {
    merge_keyed(new, existing, |t| t.key.clone(), |item, matched| {
        keep_existing_if_unset(&mut item.expires_at, matched.expires_at.as_ref());
    })
}

fn merge_managed_policies(
    new: Vec<ManagedPolicyRef>,
    existing: &[ManagedPolicyRef],
) -> Vec<ManagedPolicyRef> {
    merge_keyed(new, existing, |p| p.policy_arn.clone(), |item, matched| {
        keep_existing_if_unset(&mut item.expires_at, matched.expires_at.as_ref());
    })
}

fn merge_inline_policies(new: Vec<InlinePolicy>, existing: &[InlinePolicy]) -> Vec<InlinePolicy> {
    merge_keyed(new, existing, |p| p.policy_name.clone(), |item, matched| {
        keep_existing_if_unset(&mut item.expires_at, matched.expires_at.as_ref());
    })
}

fn merge_user_groups(new: Vec<UserGroup>, existing: &[UserGroup]) -> Vec<UserGroup> {
    merge_keyed(new, existing, |g| g.group_name.clone(), |item, matched| {
        keep_existing_if_unset(&mut item.expires_at, matched.expires_at.as_ref());
    })
}

fn merge_members(new: Vec<GroupMember>, existing: &[GroupMember]) -> Vec<GroupMember> {
    merge_keyed(new, existing, |m| m.email.clone(), |item, matched| {
        keep_existing_if_unset(&mut item.expires_at, matched.expires_at.as_ref());
    })
}

fn merge_assignments(new: Vec<AppAssignment>, existing: &[AppAssignment]) -> Vec<AppAssignment> {
    merge_keyed(new, existing, AppAssignment::sort_key, |item, matched| {
        keep_existing_if_unset(&mut item.expires_at, matched.expires_at.as_ref());
    })
}

/// Natural key of an account-scoped entry: its scope rules.
fn scope_key<T: super::model::AccountScoped>(entry: &T) -> (Vec<String>, Vec<String>) {
    (
        entry.included_accounts().to_vec(),
        entry.excluded_accounts().to_vec(),
    )
}

fn merge_paths(new: Vec<PathOverride>, existing: &[PathOverride]) -> Vec<PathOverride> {
    merge_keyed(new, existing, scope_key, |_, _| {})
}

fn merge_boundaries(
    new: Vec<PermissionsBoundary>,
    existing: &[PermissionsBoundary],
) -> Vec<PermissionsBoundary> {
    merge_keyed(new, existing, scope_key, |_, _| {})
}

fn merge_credentials(new: Vec<Credentials>, existing: &[Credentials]) -> Vec<Credentials> {
    merge_keyed(new, existing, scope_key, |_, _| {})
}

fn merge_role_properties(new: RoleProperties, existing: &RoleProperties) -> RoleProperties {
    RoleProperties {
        role_name: new.role_name,
        description: new.description,
        path: merge_paths(new.path, &existing.path),
        permissions_boundary: merge_boundaries(
            new.permissions_boundary,
            &existing.permissions_boundary,
        ),
        max_session_duration: new.max_session_duration,
        assume_role_policy_document: new.assume_role_policy_document,
        tags: merge_tags(new.tags, &existing.tags),
        managed_policies: merge_managed_policies(new.managed_policies, &existing.managed_policies),
        inline_policies: merge_inline_policies(new.inline_policies, &existing.inline_policies),
    }
}

fn merge_user_properties(new: UserProperties, existing: &UserProperties) -> UserProperties {
    UserProperties {
        user_name: new.user_name,
        path: merge_paths(new.path, &existing.path),
        permissions_boundary: merge_boundaries(
            new.permissions_boundary,
            &existing.permissions_boundary,
        ),
        groups: merge_user_groups(new.groups, &existing.groups),
        credentials: merge_credentials(new.credentials, &existing.credentials),
        tags: merge_tags(new.tags, &existing.tags),
        managed_policies: merge_managed_policies(new.managed_policies, &existing.managed_policies),
        inline_policies: merge_inline_policies(new.inline_policies, &existing.inline_policies),
    }
}

fn merge_app_properties(new: AppProperties, existing: &AppProperties) -> AppProperties {
    AppProperties {
        name: new.name,
        status: new.status,
        assignments: merge_assignments(new.assignments, &existing.assignments),
    }
}

fn merge_group_properties(new: GroupProperties, existing: &GroupProperties) -> GroupProperties {
    GroupProperties {
        name: new.name,
        email: new.email,
        description: new.description,
        members: merge_members(new.members, &existing.members),
    }
}

fn merge_envelope<P>(
    mut new: ResourceTemplate<P>,
    existing: &ResourceTemplate<P>,
) -> ResourceTemplate<P> {
    keep_existing_if_unset(&mut new.expires_at, existing.expires_at.as_ref());
    if new.file_path.is_none() {
        new.file_path.clone_from(&existing.file_path);
    }
    new
}

/// Merges a newly generated template into a previously persisted one.
///
/// When the kinds differ the new template wins outright: discovery is
/// authoritative for what the resource is. `_accounts` is accepted for
/// parity with the resolver contract; scoped entries merge by their scope
/// rules, which already name accounts.
#[must_use]
pub fn merge_template(
    new: Template,
    existing: &Template,
    _accounts: &[AccountConfig],
) -> Template {
    let mut merged = match (new, existing) {
        (Template::AwsIamRole(new_t), Template::AwsIamRole(existing_t)) => {
            let mut envelope = merge_envelope(new_t, existing_t);
            envelope.properties =
                merge_role_properties(envelope.properties, &existing_t.properties);
            Template::AwsIamRole(envelope)
        }
        (Template::AwsIamUser(new_t), Template::AwsIamUser(existing_t)) => {
            let mut envelope = merge_envelope(new_t, existing_t);
            envelope.properties =
                merge_user_properties(envelope.properties, &existing_t.properties);
            Template::AwsIamUser(envelope)
        }
        (Template::OktaApp(new_t), Template::OktaApp(existing_t)) => {
            let mut envelope = merge_envelope(new_t, existing_t);
            envelope.properties = merge_app_properties(envelope.properties, &existing_t.properties);
            Template::OktaApp(envelope)
        }
        (Template::GoogleGroup(new_t), Template::GoogleGroup(existing_t)) => {
            let mut envelope = merge_envelope(new_t, existing_t);
            envelope.properties =
                merge_group_properties(envelope.properties, &existing_t.properties);
            Template::GoogleGroup(envelope)
        }
        (new, _) => new,
    };
    merged.normalize();
    merged
}
