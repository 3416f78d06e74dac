//! Run driver: the plan/apply lifecycle over a template repository.
//!
//! A run loads every template from the repository, flags expired ones,
//! validates them, and reconciles the valid set through the orchestrator.
//! Apply runs in three passes: a plan pass whose report gates a
//! confirmation, the execute pass, and a final plan pass that verifies
//! convergence. Invalid templates are skipped and logged, never fatal to
//! the rest of the run.

use std::path::Path;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::change::TemplateChangeDetails;
use crate::config::{AccountConfig, EngineConfig, ProviderKind};
use crate::context::ExecutionContext;
use crate::error::{ApplyError, Result};
use crate::provider::ProviderClient;
use crate::report;
use crate::template::expiry;
use crate::template::model::{ResourceKind, Template};
use crate::template::{TemplateStore, TemplateValidator};

use super::orchestrator::ResourceOrchestrator;

/// The provider a resource kind lives on.
#[must_use]
pub const fn provider_for_kind(kind: ResourceKind) -> ProviderKind {
    match kind {
        ResourceKind::AwsIamRole | ResourceKind::AwsIamUser => ProviderKind::Aws,
        ResourceKind::OktaApp => ProviderKind::Okta,
        ResourceKind::GoogleGroup => ProviderKind::Google,
    }
}

/// Drives full plan and apply runs over a template repository.
#[derive(Debug)]
pub struct RunDriver<P, S> {
    config: EngineConfig,
    provider: P,
    store: S,
    validator: TemplateValidator,
}

impl<P: ProviderClient, S: TemplateStore> RunDriver<P, S> {
    /// Creates a driver over the configured accounts.
    pub const fn new(config: EngineConfig, provider: P, store: S) -> Self {
        Self {
            config,
            provider,
            store,
            validator: TemplateValidator::new(),
        }
    }

    /// Returns the template store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Returns the provider client.
    pub const fn provider(&self) -> &P {
        &self.provider
    }

    /// Returns the engine configuration.
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the configured accounts.
    #[must_use]
    pub fn accounts(&self) -> &[AccountConfig] {
        &self.config.accounts
    }

    fn accounts_for_template(&self, template: &Template) -> Vec<AccountConfig> {
        let provider = provider_for_kind(template.kind());
        self.config
            .accounts
            .iter()
            .filter(|a| a.provider == provider)
            .cloned()
            .collect()
    }

    /// Loads, expiry-flags, and validates every template under `repo_dir`.
    ///
    /// Templates flagged by expiry are rewritten in place so the
    /// repository reflects what the run is about to do. Templates that
    /// fail to load or validate are skipped with a logged error.
    ///
    /// # Errors
    ///
    /// Returns an error only on repository-level failures (unreadable
    /// directory); per-template failures are skipped.
    pub async fn load_templates(&self, repo_dir: &Path) -> Result<Vec<Template>> {
        let paths = self.store.gather(repo_dir).await?;
        let mut templates = Vec::with_capacity(paths.len());
        let now = Utc::now();

        for path in paths {
            let mut template = match self.store.load(&path).await {
                Ok(template) => template,
                Err(err) => {
                    error!(path = %path.display(), error = %err, "Skipping unloadable template");
                    continue;
                }
            };

            match expiry::flag_expired(&mut template, now) {
                Ok(true) => {
                    if let Err(err) = self.store.write(&template).await {
                        error!(path = %path.display(), error = %err, "Skipping template whose expiry rewrite failed");
                        continue;
                    }
                }
                Ok(false) => {}
                Err(err) => {
                    error!(path = %path.display(), error = %err, "Skipping template with bad expiry");
                    continue;
                }
            }

            let accounts = self.accounts_for_template(&template);
            if let Err(err) = self.validator.validate(&template, &accounts) {
                error!(path = %path.display(), error = %err, "Skipping invalid template");
                continue;
            }
            templates.push(template);
        }

        info!(count = templates.len(), "Templates loaded");
        Ok(templates)
    }

    /// Reconciles every template once, in repository order.
    ///
    /// Returns only the non-empty per-template reports.
    pub async fn run(
        &self,
        templates: &[Template],
        ctx: ExecutionContext,
    ) -> Vec<TemplateChangeDetails> {
        let orchestrator = ResourceOrchestrator::new(&self.provider);
        let mut reports = Vec::new();
        for template in templates {
            let accounts = self.accounts_for_template(template);
            let details = orchestrator.apply(template, &accounts, ctx).await;
            if !details.is_empty() {
                reports.push(details);
            }
        }
        reports
    }

    /// Runs a plan pass and writes the report.
    ///
    /// # Errors
    ///
    /// Returns an error when templates cannot be gathered or the report
    /// cannot be written.
    pub async fn run_plan(
        &self,
        repo_dir: &Path,
        report_path: &Path,
    ) -> Result<Vec<TemplateChangeDetails>> {
        let templates = self.load_templates(repo_dir).await?;
        let reports = self.run(&templates, ExecutionContext::plan()).await;
        report::write_report(report_path, &reports)?;
        Ok(reports)
    }

    /// Runs the full apply lifecycle: plan, confirm, execute, verify.
    ///
    /// `confirm` is called with the plan-pass reports; returning false
    /// aborts before anything is written to a provider. After the execute
    /// pass, a final plan pass checks convergence and logs any residual
    /// drift.
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError::Aborted`] when the confirmation declines,
    /// or an error when the repository or report cannot be accessed.
    pub async fn run_apply<F>(
        &self,
        repo_dir: &Path,
        report_path: &Path,
        confirm: F,
    ) -> Result<Vec<TemplateChangeDetails>>
    where
        F: FnOnce(&[TemplateChangeDetails]) -> bool,
    {
        let templates = self.load_templates(repo_dir).await?;

        let plan = self.run(&templates, ExecutionContext::plan()).await;
        report::write_report(report_path, &plan)?;
        if plan.is_empty() {
            info!("No changes to apply");
            return Ok(plan);
        }

        if !confirm(&plan) {
            return Err(ApplyError::Aborted {
                reason: String::from("confirmation declined"),
            }
            .into());
        }

        let applied = self.run(&templates, ExecutionContext::apply()).await;
        report::write_report(report_path, &applied)?;

        let residual = self.run(&templates, ExecutionContext::plan()).await;
        if residual.is_empty() {
            info!("All templates converged");
        } else {
            for details in &residual {
                warn!(
                    resource = details.resource_id,
                    kind = details.resource_type,
                    "Residual drift after apply"
                );
            }
        }

        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KeyplaneError;
    use crate::provider::testing::FakeProvider;
    use crate::template::FsTemplateStore;

    fn config() -> EngineConfig {
        EngineConfig {
            accounts: vec![
                AccountConfig {
                    account_id: String::from("111111111111"),
                    account_name: String::from("prod"),
                    alias: None,
                    provider: ProviderKind::Aws,
                    credentials: None,
                },
                AccountConfig {
                    account_id: String::from("example-org"),
                    account_name: String::from("Example Okta"),
                    alias: None,
                    provider: ProviderKind::Okta,
                    credentials: None,
                },
            ],
        }
    }

    const ROLE_YAML: &str = r#"
template_type: "aws:iam:role"
identifier: engineering
properties:
  role_name: engineering
  tags:
    - key: team
      value: eng
"#;

    fn write_template(dir: &Path, name: &str, yaml: &str) {
        std::fs::write(dir.join(name), yaml).unwrap();
    }

    #[tokio::test]
    async fn test_run_apply_mutates_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        write_template(dir.path(), "engineering.yaml", ROLE_YAML);
        let report_path = dir.path().join("proposed_changes.json");

        let driver = RunDriver::new(config(), FakeProvider::new(), FsTemplateStore::new());
        let applied = driver
            .run_apply(dir.path(), &report_path, |_| true)
            .await
            .unwrap();

        assert_eq!(applied.len(), 1);
        assert!(applied[0].exceptions_seen.is_empty());
        // The role only targets the AWS account.
        assert!(!driver.provider().mutations_for("111111111111").is_empty());
        assert!(driver.provider().mutations_for("example-org").is_empty());
        assert!(report_path.exists());
    }

    #[tokio::test]
    async fn test_declined_confirmation_aborts_without_mutations() {
        let dir = tempfile::tempdir().unwrap();
        write_template(dir.path(), "engineering.yaml", ROLE_YAML);
        let report_path = dir.path().join("proposed_changes.json");

        let driver = RunDriver::new(config(), FakeProvider::new(), FsTemplateStore::new());
        let err = driver
            .run_apply(dir.path(), &report_path, |_| false)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            KeyplaneError::Apply(ApplyError::Aborted { .. })
        ));
        assert_eq!(driver.provider().mutation_count(), 0);
        // The plan report was still written before the abort.
        assert!(report_path.exists());
    }

    #[tokio::test]
    async fn test_invalid_template_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_template(dir.path(), "engineering.yaml", ROLE_YAML);
        write_template(
            dir.path(),
            "broken.yaml",
            r#"
template_type: "aws:iam:role"
identifier: ""
properties:
  role_name: ""
"#,
        );

        let driver = RunDriver::new(config(), FakeProvider::new(), FsTemplateStore::new());
        let templates = driver.load_templates(dir.path()).await.unwrap();
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].identifier(), "engineering");
    }

    #[tokio::test]
    async fn test_expired_template_is_rewritten_as_deleted() {
        let dir = tempfile::tempdir().unwrap();
        write_template(
            dir.path(),
            "stale.yaml",
            r#"
template_type: "aws:iam:role"
identifier: stale
expires_at: "2001-01-01"
properties:
  role_name: stale
"#,
        );

        let driver = RunDriver::new(config(), FakeProvider::new(), FsTemplateStore::new());
        let templates = driver.load_templates(dir.path()).await.unwrap();
        assert!(templates[0].is_deleted());
        let rewritten = std::fs::read_to_string(dir.path().join("stale.yaml")).unwrap();
        assert!(rewritten.contains("deleted: true"));
    }

    #[tokio::test]
    async fn test_failed_expiry_rewrite_skips_only_that_template() {
        use std::path::PathBuf;

        use async_trait::async_trait;

        /// A store whose rewrites always fail.
        struct ReadOnlyStore(FsTemplateStore);

        #[async_trait]
        impl TemplateStore for ReadOnlyStore {
            async fn load(&self, path: &Path) -> Result<Template> {
                self.0.load(path).await
            }

            async fn write(&self, _template: &Template) -> Result<()> {
                Err(KeyplaneError::internal("read-only repository"))
            }

            async fn gather(&self, dir: &Path) -> Result<Vec<PathBuf>> {
                self.0.gather(dir).await
            }

            async fn remove(&self, path: &Path) -> Result<()> {
                self.0.remove(path).await
            }
        }

        let dir = tempfile::tempdir().unwrap();
        write_template(dir.path(), "engineering.yaml", ROLE_YAML);
        write_template(
            dir.path(),
            "stale.yaml",
            r#"
template_type: "aws:iam:role"
identifier: stale
expires_at: "2001-01-01"
properties:
  role_name: stale
"#,
        );

        let driver = RunDriver::new(
            config(),
            FakeProvider::new(),
            ReadOnlyStore(FsTemplateStore::new()),
        );
        let templates = driver.load_templates(dir.path()).await.unwrap();
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].identifier(), "engineering");
    }

    #[tokio::test]
    async fn test_plan_run_never_mutates() {
        let dir = tempfile::tempdir().unwrap();
        write_template(dir.path(), "engineering.yaml", ROLE_YAML);
        let report_path = dir.path().join("proposed_changes.json");

        let driver = RunDriver::new(config(), FakeProvider::new(), FsTemplateStore::new());
        let reports = driver.run_plan(dir.path(), &report_path).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(driver.provider().mutation_count(), 0);
    }
}
