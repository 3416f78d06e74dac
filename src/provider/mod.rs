//! Provider abstraction: client trait, wire types, local snapshot
//! backend, and retry policy.

pub mod client;
pub mod retry;
pub mod snapshot;
pub mod types;

pub use client::ProviderClient;
pub use retry::RetryPolicy;
pub use snapshot::SnapshotProvider;
pub use types::{Mutation, ObservedInlinePolicy, ObservedResource, ObservedTag};

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory provider used by orchestrator and driver tests.

    use std::collections::{BTreeMap, HashSet};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::config::AccountConfig;
    use crate::error::{ProviderError, Result};
    use crate::template::model::ResourceKind;

    use super::types::{apply_mutation, Mutation, ObservedResource};
    use super::ProviderClient;

    /// An in-memory provider that applies mutations to its own state and
    /// records every mutation in call order.
    #[derive(Debug, Default)]
    pub struct FakeProvider {
        resources: Mutex<BTreeMap<String, Vec<ObservedResource>>>,
        mutations: Mutex<Vec<(String, Mutation)>>,
        failing_accounts: Mutex<HashSet<String>>,
    }

    impl FakeProvider {
        pub fn new() -> Self {
            Self::default()
        }

        /// Seeds a live resource on an account.
        pub fn seed(&self, account: &AccountConfig, resource: ObservedResource) {
            self.resources
                .lock()
                .unwrap()
                .entry(account.account_id.clone())
                .or_default()
                .push(resource);
        }

        /// Makes every call against an account fail.
        pub fn fail_account(&self, account_id: &str) {
            self.failing_accounts
                .lock()
                .unwrap()
                .insert(account_id.to_string());
        }

        /// Returns the recorded mutations for one account, in call order.
        pub fn mutations_for(&self, account_id: &str) -> Vec<Mutation> {
            self.mutations
                .lock()
                .unwrap()
                .iter()
                .filter(|(a, _)| a == account_id)
                .map(|(_, m)| m.clone())
                .collect()
        }

        pub fn mutation_count(&self) -> usize {
            self.mutations.lock().unwrap().len()
        }

        fn check_account(&self, account: &AccountConfig) -> Result<()> {
            if self
                .failing_accounts
                .lock()
                .unwrap()
                .contains(&account.account_id)
            {
                return Err(ProviderError::AuthenticationFailed {
                    account: account.account_id.clone(),
                    message: String::from("credentials revoked"),
                }
                .into());
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ProviderClient for FakeProvider {
        async fn get_resource(
            &self,
            account: &AccountConfig,
            kind: ResourceKind,
            name: &str,
        ) -> Result<Option<ObservedResource>> {
            self.check_account(account)?;
            Ok(self
                .resources
                .lock()
                .unwrap()
                .get(&account.account_id)
                .and_then(|list| list.iter().find(|r| r.kind == kind && r.name == name))
                .cloned())
        }

        async fn list_resources(
            &self,
            account: &AccountConfig,
            kind: ResourceKind,
        ) -> Result<Vec<ObservedResource>> {
            self.check_account(account)?;
            let mut found: Vec<ObservedResource> = self
                .resources
                .lock()
                .unwrap()
                .get(&account.account_id)
                .map(|list| list.iter().filter(|r| r.kind == kind).cloned().collect())
                .unwrap_or_default();
            found.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(found)
        }

        async fn mutate(&self, account: &AccountConfig, mutation: Mutation) -> Result<()> {
            self.check_account(account)?;
            apply_mutation(
                self.resources
                    .lock()
                    .unwrap()
                    .entry(account.account_id.clone())
                    .or_default(),
                &mutation,
            );
            self.mutations
                .lock()
                .unwrap()
                .push((account.account_id.clone(), mutation));
            Ok(())
        }
    }
}
