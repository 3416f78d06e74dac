//! Per-resource reconciliation across accounts.
//!
//! For each template, the orchestrator resolves the account scope, fans
//! out across the resolved accounts concurrently, and reconciles each
//! aspect of the resource in a fixed order: tags, trust policy,
//! permissions boundary, managed policies, inline policies, memberships. Plan mode computes and records
//! changes without touching the provider; execute mode additionally runs
//! the mutations, in order, per account. A failing account never blocks
//! the others; its errors land in the report's `exceptions_seen`.

use futures::future::join_all;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::change::{ChangeType, ProposedChange, TemplateChangeDetails};
use crate::config::AccountConfig;
use crate::context::ExecutionContext;
use crate::drift::DriftEngine;
use crate::provider::retry::RetryPolicy;
use crate::provider::types::{Mutation, ObservedResource};
use crate::provider::ProviderClient;
use crate::template::model::{ResourceKind, Template};
use crate::template::scope::{self, DesiredAspects};

/// Reconciles one template at a time against every in-scope account.
#[derive(Debug)]
pub struct ResourceOrchestrator<P> {
    provider: P,
    retry: RetryPolicy,
    drift: DriftEngine,
}

/// Changes and mutations planned for one account.
#[derive(Debug, Default)]
struct AccountPlan {
    changes: Vec<ProposedChange>,
    mutations: Vec<Mutation>,
}

/// Result of reconciling one account, failures folded in.
#[derive(Debug, Default)]
struct AccountOutcome {
    changes: Vec<ProposedChange>,
    exceptions: Vec<String>,
}

impl<P: ProviderClient> ResourceOrchestrator<P> {
    /// Creates an orchestrator with the default retry policy.
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            retry: RetryPolicy::default(),
            drift: DriftEngine::new(),
        }
    }

    /// Overrides the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Reconciles a template against every account it resolves to.
    ///
    /// Accounts are processed concurrently; the returned changes keep
    /// account-resolution order regardless of completion order.
    pub async fn apply(
        &self,
        template: &Template,
        accounts: &[AccountConfig],
        ctx: ExecutionContext,
    ) -> TemplateChangeDetails {
        let mut details =
            TemplateChangeDetails::new(template.identifier(), template.kind().as_str());
        if let Some(path) = template.file_path() {
            details = details.with_template_path(path.display().to_string());
        }

        let resolved = match scope::resolve(template, accounts) {
            Ok(resolved) => resolved,
            Err(err) => {
                details.exceptions_seen.push(err.to_string());
                return details;
            }
        };

        let outcomes = join_all(
            resolved
                .iter()
                .map(|(account, aspects)| self.apply_to_account(account, aspects, template, ctx)),
        )
        .await;

        for outcome in outcomes {
            details.proposed_changes.extend(outcome.changes);
            details.exceptions_seen.extend(outcome.exceptions);
        }

        if !details.is_empty() {
            info!(
                resource = template.identifier(),
                kind = %template.kind(),
                mode = %ctx,
                changes = details.proposed_changes.len(),
                exceptions = details.exceptions_seen.len(),
                "Template reconciled"
            );
        }
        details
    }

    async fn apply_to_account(
        &self,
        account: &AccountConfig,
        aspects: &DesiredAspects,
        template: &Template,
        ctx: ExecutionContext,
    ) -> AccountOutcome {
        let mut outcome = AccountOutcome::default();

        let observed = match self
            .retry
            .run("get_resource", || {
                self.provider
                    .get_resource(account, aspects.kind, &aspects.name)
            })
            .await
        {
            Ok(observed) => observed,
            Err(err) => {
                warn!(account = %account, error = %err, "Failed to read resource state");
                outcome
                    .exceptions
                    .push(format!("{}: {err}", account.account_id));
                return outcome;
            }
        };

        let plan = if template.is_deleted() {
            observed.map_or_else(AccountPlan::default, |obs| plan_delete(aspects, &obs))
        } else {
            match observed {
                Some(obs) => plan_reconcile(self.drift, aspects, &obs),
                None => plan_create(self.drift, aspects),
            }
        };

        outcome.changes = plan
            .changes
            .into_iter()
            .map(|c| c.with_account(&account.account_id))
            .collect();

        if ctx.execute {
            // Mutations within one account run in order: cascades and
            // creates have strict dependencies.
            for mutation in plan.mutations {
                let result = self
                    .retry
                    .run("mutate", || self.provider.mutate(account, mutation.clone()))
                    .await;
                if let Err(err) = result {
                    warn!(account = %account, mutation = %mutation, error = %err, "Mutation failed");
                    outcome
                        .exceptions
                        .push(format!("{}: {mutation}: {err}", account.account_id));
                    break;
                }
            }
        }

        outcome
    }
}

/// Whether a kind carries an IAM path and trust policy.
const fn is_iam_kind(kind: ResourceKind) -> bool {
    matches!(kind, ResourceKind::AwsIamRole | ResourceKind::AwsIamUser)
}

fn plan_create(drift: DriftEngine, aspects: &DesiredAspects) -> AccountPlan {
    let mut plan = AccountPlan::default();

    plan.changes.push(
        ProposedChange::new(ChangeType::Create, "resource")
            .with_resource_id(&aspects.name)
            .with_new_value(json!({
                "name": aspects.name,
                "kind": aspects.kind.as_str(),
            })),
    );
    plan.mutations.push(Mutation::CreateResource {
        kind: aspects.kind,
        name: aspects.name.clone(),
        path: is_iam_kind(aspects.kind).then(|| aspects.path.clone()),
        trust_policy: aspects.trust_policy.clone(),
    });

    // Remaining aspects diff against the just-created shell, so the
    // trust policy handed to the create is not re-applied.
    let mut shell = ObservedResource::new(&aspects.name, aspects.kind);
    shell.path = is_iam_kind(aspects.kind).then(|| aspects.path.clone());
    shell.trust_policy.clone_from(&aspects.trust_policy);

    let aspect_plan = plan_reconcile(drift, aspects, &shell);
    plan.changes.extend(aspect_plan.changes);
    plan.mutations.extend(aspect_plan.mutations);
    plan
}

/// Diffs every aspect of an existing resource, in fixed order.
fn plan_reconcile(
    drift: DriftEngine,
    aspects: &DesiredAspects,
    observed: &ObservedResource,
) -> AccountPlan {
    let mut plan = AccountPlan::default();
    plan_tags(aspects, observed, &mut plan);
    plan_trust_policy(drift, aspects, observed, &mut plan);
    plan_permissions_boundary(aspects, observed, &mut plan);
    plan_managed_policies(aspects, observed, &mut plan);
    plan_inline_policies(drift, aspects, observed, &mut plan);
    plan_assignments(aspects, observed, &mut plan);
    plan
}

fn plan_tags(aspects: &DesiredAspects, observed: &ObservedResource, plan: &mut AccountPlan) {
    for tag in &aspects.tags {
        let live = observed.tags.iter().find(|t| t.key == tag.key);
        match live {
            Some(live) if live.value == tag.value => {}
            Some(live) => {
                plan.changes.push(
                    ProposedChange::new(ChangeType::Update, "tags")
                        .with_resource_id(&tag.key)
                        .with_current_value(json!(live.value))
                        .with_new_value(json!(tag.value)),
                );
                plan.mutations.push(Mutation::TagResource {
                    name: aspects.name.clone(),
                    key: tag.key.clone(),
                    value: tag.value.clone(),
                });
            }
            None => {
                plan.changes.push(
                    ProposedChange::new(ChangeType::Attach, "tags")
                        .with_resource_id(&tag.key)
                        .with_new_value(json!(tag.value)),
                );
                plan.mutations.push(Mutation::TagResource {
                    name: aspects.name.clone(),
                    key: tag.key.clone(),
                    value: tag.value.clone(),
                });
            }
        }
    }

    let stale: Vec<String> = observed
        .tags
        .iter()
        .filter(|live| !aspects.tags.iter().any(|t| t.key == live.key))
        .map(|live| live.key.clone())
        .collect();
    for key in &stale {
        plan.changes.push(
            ProposedChange::new(ChangeType::Detach, "tags").with_resource_id(key),
        );
    }
    if !stale.is_empty() {
        plan.mutations.push(Mutation::UntagResource {
            name: aspects.name.clone(),
            keys: stale,
        });
    }
}

fn plan_trust_policy(
    drift: DriftEngine,
    aspects: &DesiredAspects,
    observed: &ObservedResource,
    plan: &mut AccountPlan,
) {
    // An unset desired trust policy leaves the live one unmanaged.
    let Some(desired) = &aspects.trust_policy else {
        return;
    };
    let existing = observed.trust_policy.clone().unwrap_or(Value::Null);
    let summary = drift.diff(&existing, desired);
    if summary.is_empty() {
        return;
    }
    plan.changes.push(
        ProposedChange::new(ChangeType::Update, "assume_role_policy_document")
            .with_current_value(existing)
            .with_new_value(desired.clone())
            .with_change_summary(summary),
    );
    plan.mutations.push(Mutation::UpdateTrustPolicy {
        name: aspects.name.clone(),
        trust_policy: desired.clone(),
    });
}

fn plan_permissions_boundary(
    aspects: &DesiredAspects,
    observed: &ObservedResource,
    plan: &mut AccountPlan,
) {
    // An unset desired boundary leaves the live one unmanaged.
    let Some(desired) = &aspects.permissions_boundary else {
        return;
    };
    if observed.permissions_boundary.as_deref() == Some(desired.as_str()) {
        return;
    }
    let mut change = ProposedChange::new(
        if observed.permissions_boundary.is_some() {
            ChangeType::Update
        } else {
            ChangeType::Attach
        },
        "permissions_boundary",
    )
    .with_resource_id(desired)
    .with_new_value(json!(desired));
    if let Some(existing) = &observed.permissions_boundary {
        change = change.with_current_value(json!(existing));
    }
    plan.changes.push(change);
    plan.mutations.push(Mutation::SetPermissionsBoundary {
        name: aspects.name.clone(),
        policy_arn: desired.clone(),
    });
}

fn plan_managed_policies(
    aspects: &DesiredAspects,
    observed: &ObservedResource,
    plan: &mut AccountPlan,
) {
    for arn in &aspects.managed_policies {
        if !observed.managed_policies.contains(arn) {
            plan.changes.push(
                ProposedChange::new(ChangeType::Attach, "managed_policies").with_resource_id(arn),
            );
            plan.mutations.push(Mutation::AttachManagedPolicy {
                name: aspects.name.clone(),
                policy_arn: arn.clone(),
            });
        }
    }
    for arn in &observed.managed_policies {
        if !aspects.managed_policies.contains(arn) {
            plan.changes.push(
                ProposedChange::new(ChangeType::Detach, "managed_policies").with_resource_id(arn),
            );
            plan.mutations.push(Mutation::DetachManagedPolicy {
                name: aspects.name.clone(),
                policy_arn: arn.clone(),
            });
        }
    }
}

fn plan_inline_policies(
    drift: DriftEngine,
    aspects: &DesiredAspects,
    observed: &ObservedResource,
    plan: &mut AccountPlan,
) {
    for policy in &aspects.inline_policies {
        let live = observed
            .inline_policies
            .iter()
            .find(|p| p.policy_name == policy.policy_name);
        match live {
            Some(live) => {
                let summary = drift.diff(&live.policy_document, &policy.policy_document);
                if summary.is_empty() {
                    continue;
                }
                plan.changes.push(
                    ProposedChange::new(ChangeType::Update, "inline_policies")
                        .with_resource_id(&policy.policy_name)
                        .with_change_summary(summary),
                );
            }
            None => {
                plan.changes.push(
                    ProposedChange::new(ChangeType::Create, "inline_policies")
                        .with_resource_id(&policy.policy_name)
                        .with_new_value(policy.policy_document.clone()),
                );
            }
        }
        plan.mutations.push(Mutation::PutInlinePolicy {
            name: aspects.name.clone(),
            policy_name: policy.policy_name.clone(),
            policy_document: policy.policy_document.clone(),
        });
    }

    for live in &observed.inline_policies {
        if !aspects
            .inline_policies
            .iter()
            .any(|p| p.policy_name == live.policy_name)
        {
            plan.changes.push(
                ProposedChange::new(ChangeType::Delete, "inline_policies")
                    .with_resource_id(&live.policy_name)
                    .with_current_value(live.policy_document.clone()),
            );
            plan.mutations.push(Mutation::DeleteInlinePolicy {
                name: aspects.name.clone(),
                policy_name: live.policy_name.clone(),
            });
        }
    }
}

fn plan_assignments(aspects: &DesiredAspects, observed: &ObservedResource, plan: &mut AccountPlan) {
    if aspects.assignment_attribute.is_empty() {
        return;
    }
    for key in &aspects.assignments {
        if !observed.assignments.contains(key) {
            plan.changes.push(
                ProposedChange::new(ChangeType::Attach, aspects.assignment_attribute)
                    .with_resource_id(key),
            );
            plan.mutations.push(Mutation::AddAssignment {
                name: aspects.name.clone(),
                key: key.clone(),
            });
        }
    }
    for key in &observed.assignments {
        if !aspects.assignments.contains(key) {
            plan.changes.push(
                ProposedChange::new(ChangeType::Detach, aspects.assignment_attribute)
                    .with_resource_id(key),
            );
            plan.mutations.push(Mutation::RemoveAssignment {
                name: aspects.name.clone(),
                key: key.clone(),
            });
        }
    }
}

/// Plans deletion of a live resource with its dependents, in dependency
/// order: instance profiles first, then policy detachments, then the
/// resource itself.
fn plan_delete(aspects: &DesiredAspects, observed: &ObservedResource) -> AccountPlan {
    let mut plan = AccountPlan::default();

    plan.changes.push(
        ProposedChange::new(ChangeType::Delete, "resource")
            .with_resource_id(&aspects.name)
            .with_current_value(json!({
                "name": observed.name,
                "kind": observed.kind.as_str(),
            })),
    );

    for instance_profile in &observed.instance_profiles {
        plan.mutations.push(Mutation::RemoveFromInstanceProfile {
            name: aspects.name.clone(),
            instance_profile: instance_profile.clone(),
        });
        plan.mutations.push(Mutation::DeleteInstanceProfile {
            instance_profile: instance_profile.clone(),
        });
    }
    for arn in &observed.managed_policies {
        plan.mutations.push(Mutation::DetachManagedPolicy {
            name: aspects.name.clone(),
            policy_arn: arn.clone(),
        });
    }
    for policy in &observed.inline_policies {
        plan.mutations.push(Mutation::DeleteInlinePolicy {
            name: aspects.name.clone(),
            policy_name: policy.policy_name.clone(),
        });
    }
    plan.mutations.push(Mutation::DeleteResource {
        kind: aspects.kind,
        name: aspects.name.clone(),
    });

    plan
}
