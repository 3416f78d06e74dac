//! Import: generate templates from live provider state.
//!
//! Import walks every configured account, lists the resources of each
//! kind, and materializes one template per resource. When a template for
//! the same resource already exists in the repository, the generated
//! template is merged into it so operator annotations survive the
//! refresh. A resource present on every account of its provider is
//! scoped with the wildcard; otherwise the accounts it was found on are
//! listed explicitly.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::provider::types::ObservedResource;
use crate::provider::ProviderClient;
use crate::template::merge::merge_template;
use crate::template::model::{
    AppAssignment, AppProperties, GroupMember, GroupProperties, InlinePolicy, ManagedPolicyRef,
    PathOverride, ResourceKind, ResourceTemplate, RoleProperties, Tag, Template, UserGroup,
    UserProperties, WILDCARD,
};
use crate::template::store::{template_path, TemplateStore};

use super::driver::provider_for_kind;

const ALL_KINDS: [ResourceKind; 4] = [
    ResourceKind::AwsIamRole,
    ResourceKind::AwsIamUser,
    ResourceKind::OktaApp,
    ResourceKind::GoogleGroup,
];

/// Generates or refreshes templates from live provider state.
///
/// Returns the number of templates written.
///
/// # Errors
///
/// Returns an error when listing fails for an account or a template
/// cannot be written. Individual accounts that fail to list are skipped
/// with a logged warning.
pub async fn import_resources<P, S>(
    config: &EngineConfig,
    provider: &P,
    store: &S,
    repo_dir: &Path,
) -> Result<usize>
where
    P: ProviderClient,
    S: TemplateStore,
{
    let existing = load_existing(store, repo_dir).await?;
    let mut written = 0;

    for kind in ALL_KINDS {
        let accounts = config.accounts_for(provider_for_kind(kind));
        if accounts.is_empty() {
            continue;
        }

        // resource name -> accounts found on, with the first observation.
        let mut discovered: BTreeMap<String, (Vec<String>, ObservedResource)> = BTreeMap::new();
        for account in &accounts {
            let resources = match provider.list_resources(account, kind).await {
                Ok(resources) => resources,
                Err(err) => {
                    warn!(account = %account, %kind, error = %err, "Skipping unlistable account");
                    continue;
                }
            };
            for resource in resources {
                discovered
                    .entry(resource.name.clone())
                    .or_insert_with(|| (Vec::new(), resource))
                    .0
                    .push(account.account_id.clone());
            }
        }

        for (name, (found_on, observed)) in discovered {
            let included = if found_on.len() == accounts.len() {
                vec![WILDCARD.to_string()]
            } else {
                found_on
            };

            let mut template = template_from_observed(kind, &observed, included);
            let key = (kind, name.clone());
            if let Some(current) = existing.get(&key) {
                template = merge_template(template, current, &config.accounts);
            }
            if template.file_path().is_none() {
                let path = template_path(repo_dir, &template);
                template.set_file_path(path);
            }
            template.normalize();
            store.write(&template).await?;
            written += 1;
        }
    }

    info!(written, "Import complete");
    Ok(written)
}

async fn load_existing<S: TemplateStore>(
    store: &S,
    repo_dir: &Path,
) -> Result<BTreeMap<(ResourceKind, String), Template>> {
    let mut existing = BTreeMap::new();
    for path in store.gather(repo_dir).await? {
        match store.load(&path).await {
            Ok(template) => {
                existing.insert(
                    (template.kind(), template.identifier().to_string()),
                    template,
                );
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Skipping unloadable template during import");
            }
        }
    }
    Ok(existing)
}

fn envelope<P>(name: &str, included_accounts: Vec<String>, properties: P) -> ResourceTemplate<P> {
    ResourceTemplate {
        identifier: name.to_string(),
        included_accounts,
        excluded_accounts: vec![],
        expires_at: None,
        deleted: false,
        properties,
        file_path: None,
    }
}

fn imported_tags(observed: &ObservedResource) -> Vec<Tag> {
    observed
        .tags
        .iter()
        .map(|t| Tag {
            key: t.key.clone(),
            value: t.value.clone(),
            expires_at: None,
        })
        .collect()
}

fn imported_managed(observed: &ObservedResource) -> Vec<ManagedPolicyRef> {
    observed
        .managed_policies
        .iter()
        .map(|arn| ManagedPolicyRef {
            policy_arn: arn.clone(),
            expires_at: None,
        })
        .collect()
}

fn imported_inline(observed: &ObservedResource) -> Vec<InlinePolicy> {
    observed
        .inline_policies
        .iter()
        .map(|p| InlinePolicy {
            policy_name: p.policy_name.clone(),
            policy_document: p.policy_document.clone(),
            expires_at: None,
        })
        .collect()
}

fn imported_path(observed: &ObservedResource) -> Vec<PathOverride> {
    match observed.path.as_deref() {
        Some(path) if path != "/" => vec![PathOverride {
            included_accounts: vec![WILDCARD.to_string()],
            excluded_accounts: vec![],
            path: path.to_string(),
        }],
        _ => vec![],
    }
}

fn template_from_observed(
    kind: ResourceKind,
    observed: &ObservedResource,
    included_accounts: Vec<String>,
) -> Template {
    match kind {
        ResourceKind::AwsIamRole => Template::AwsIamRole(envelope(
            &observed.name,
            included_accounts,
            RoleProperties {
                role_name: observed.name.clone(),
                description: None,
                path: imported_path(observed),
                permissions_boundary: vec![],
                max_session_duration: None,
                assume_role_policy_document: observed.trust_policy.clone(),
                tags: imported_tags(observed),
                managed_policies: imported_managed(observed),
                inline_policies: imported_inline(observed),
            },
        )),
        ResourceKind::AwsIamUser => Template::AwsIamUser(envelope(
            &observed.name,
            included_accounts,
            UserProperties {
                user_name: observed.name.clone(),
                path: imported_path(observed),
                permissions_boundary: vec![],
                groups: observed
                    .assignments
                    .iter()
                    .map(|g| UserGroup {
                        group_name: g.clone(),
                        expires_at: None,
                    })
                    .collect(),
                credentials: vec![],
                tags: imported_tags(observed),
                managed_policies: imported_managed(observed),
                inline_policies: imported_inline(observed),
            },
        )),
        ResourceKind::OktaApp => Template::OktaApp(envelope(
            &observed.name,
            included_accounts,
            AppProperties {
                name: observed.name.clone(),
                status: None,
                assignments: observed
                    .assignments
                    .iter()
                    .map(|key| assignment_from_key(key))
                    .collect(),
            },
        )),
        ResourceKind::GoogleGroup => Template::GoogleGroup(envelope(
            &observed.name,
            included_accounts,
            GroupProperties {
                name: observed.name.clone(),
                email: observed.name.clone(),
                description: None,
                members: observed
                    .assignments
                    .iter()
                    .map(|email| GroupMember {
                        email: email.clone(),
                        role: None,
                        expires_at: None,
                    })
                    .collect(),
            },
        )),
    }
}

/// Inverse of [`AppAssignment::sort_key`].
fn assignment_from_key(key: &str) -> AppAssignment {
    let (user, group) = key.strip_prefix("user:").map_or_else(
        || (None, Some(key.strip_prefix("group:").unwrap_or(key))),
        |user| (Some(user), None),
    );
    AppAssignment {
        user: user.map(String::from),
        group: group.map(String::from),
        expires_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AccountConfig, ProviderKind};
    use crate::provider::testing::FakeProvider;
    use crate::provider::types::ObservedTag;
    use crate::template::FsTemplateStore;

    fn aws_account(id: &str) -> AccountConfig {
        AccountConfig {
            account_id: id.to_string(),
            account_name: id.to_string(),
            alias: None,
            provider: ProviderKind::Aws,
            credentials: None,
        }
    }

    fn config(ids: &[&str]) -> EngineConfig {
        EngineConfig {
            accounts: ids.iter().map(|id| aws_account(id)).collect(),
        }
    }

    fn tagged_role(name: &str) -> ObservedResource {
        let mut observed = ObservedResource::new(name, ResourceKind::AwsIamRole);
        observed.path = Some(String::from("/"));
        observed.tags = vec![ObservedTag {
            key: String::from("team"),
            value: String::from("eng"),
        }];
        observed
    }

    #[tokio::test]
    async fn test_import_writes_one_template_per_resource() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&["prod"]);
        let provider = FakeProvider::new();
        provider.seed(&config.accounts[0], tagged_role("engineering"));
        provider.seed(&config.accounts[0], tagged_role("finance"));

        let store = FsTemplateStore::new();
        let written = import_resources(&config, &provider, &store, dir.path())
            .await
            .unwrap();

        assert_eq!(written, 2);
        let paths = store.gather(dir.path()).await.unwrap();
        assert_eq!(paths.len(), 2);
        let template = store.load(&paths[0]).await.unwrap();
        assert_eq!(template.identifier(), "engineering");
    }

    #[tokio::test]
    async fn test_resource_on_every_account_gets_the_wildcard() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&["prod", "dev"]);
        let provider = FakeProvider::new();
        provider.seed(&config.accounts[0], tagged_role("everywhere"));
        provider.seed(&config.accounts[1], tagged_role("everywhere"));
        provider.seed(&config.accounts[0], tagged_role("prod-only"));

        let store = FsTemplateStore::new();
        import_resources(&config, &provider, &store, dir.path())
            .await
            .unwrap();

        let load = |name: &str| {
            let path = dir.path().join(format!("aws/iam/role/{name}.yaml"));
            let raw = std::fs::read_to_string(path).unwrap();
            serde_yaml::from_str::<Template>(&raw).unwrap()
        };
        assert_eq!(load("everywhere").included_accounts(), [WILDCARD]);
        assert_eq!(load("prod-only").included_accounts(), ["prod"]);
    }

    #[tokio::test]
    async fn test_reimport_preserves_operator_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&["prod"]);
        let provider = FakeProvider::new();
        provider.seed(&config.accounts[0], tagged_role("engineering"));
        let store = FsTemplateStore::new();

        import_resources(&config, &provider, &store, dir.path())
            .await
            .unwrap();

        // Operator annotates the tag with an expiry.
        let path = dir.path().join("aws/iam/role/engineering.yaml");
        let mut template = store.load(&path).await.unwrap();
        if let Template::AwsIamRole(t) = &mut template {
            t.properties.tags[0].expires_at = Some(String::from("2030-01-01"));
        }
        store.write(&template).await.unwrap();

        import_resources(&config, &provider, &store, dir.path())
            .await
            .unwrap();
        let reimported = store.load(&path).await.unwrap();
        let Template::AwsIamRole(t) = reimported else {
            panic!("kind changed");
        };
        assert_eq!(t.properties.tags[0].expires_at.as_deref(), Some("2030-01-01"));
    }

    #[tokio::test]
    async fn test_import_is_idempotent_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&["prod"]);
        let provider = FakeProvider::new();
        provider.seed(&config.accounts[0], tagged_role("engineering"));
        let store = FsTemplateStore::new();

        import_resources(&config, &provider, &store, dir.path())
            .await
            .unwrap();
        let path = dir.path().join("aws/iam/role/engineering.yaml");
        let first = std::fs::read_to_string(&path).unwrap();
        import_resources(&config, &provider, &store, dir.path())
            .await
            .unwrap();
        let second = std::fs::read_to_string(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_assignment_key_round_trip() {
        let user = assignment_from_key("user:ada@example.com");
        assert_eq!(user.user.as_deref(), Some("ada@example.com"));
        assert_eq!(user.group, None);
        let group = assignment_from_key("group:engineers");
        assert_eq!(group.group.as_deref(), Some("engineers"));
        assert_eq!(user.sort_key(), "user:ada@example.com");
        assert_eq!(group.sort_key(), "group:engineers");
    }
}
