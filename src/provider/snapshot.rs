//! File-backed provider snapshot.
//!
//! Holds the observed state of every account in a single JSON file and
//! applies mutations to it. This is the local backend used for dry runs,
//! demos, and tests of the full lifecycle; SDK-backed clients implement
//! the same [`ProviderClient`] trait against the real provider APIs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AccountConfig;
use crate::error::{KeyplaneError, ProviderError, Result};
use crate::template::model::ResourceKind;

use super::types::{apply_mutation, Mutation, ObservedResource};
use super::ProviderClient;

#[derive(Debug, Default, Serialize, Deserialize)]
struct SnapshotState {
    /// Observed resources keyed by account id.
    #[serde(default)]
    accounts: BTreeMap<String, Vec<ObservedResource>>,
}

/// A provider whose state lives in a local JSON snapshot file.
#[derive(Debug)]
pub struct SnapshotProvider {
    path: PathBuf,
    state: Mutex<SnapshotState>,
}

impl SnapshotProvider {
    /// Opens a snapshot file, creating an empty state when it is absent.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn open(path: &Path) -> Result<Self> {
        let state = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            serde_json::from_str(&raw).map_err(|e| {
                KeyplaneError::internal(format!(
                    "corrupt snapshot file {}: {e}",
                    path.display()
                ))
            })?
        } else {
            debug!(path = %path.display(), "Snapshot file absent, starting empty");
            SnapshotState::default()
        };
        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(state),
        })
    }

    fn persist(&self, state: &SnapshotState) -> Result<()> {
        let raw = serde_json::to_string_pretty(state)
            .map_err(|e| KeyplaneError::internal(format!("snapshot serialization: {e}")))?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}

#[async_trait]
impl ProviderClient for SnapshotProvider {
    async fn get_resource(
        &self,
        account: &AccountConfig,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Option<ObservedResource>> {
        let state = self.state.lock().map_err(|_| poisoned())?;
        Ok(state
            .accounts
            .get(&account.account_id)
            .and_then(|list| list.iter().find(|r| r.kind == kind && r.name == name))
            .cloned())
    }

    async fn list_resources(
        &self,
        account: &AccountConfig,
        kind: ResourceKind,
    ) -> Result<Vec<ObservedResource>> {
        let state = self.state.lock().map_err(|_| poisoned())?;
        let mut found: Vec<ObservedResource> = state
            .accounts
            .get(&account.account_id)
            .map(|list| list.iter().filter(|r| r.kind == kind).cloned().collect())
            .unwrap_or_default();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    async fn mutate(&self, account: &AccountConfig, mutation: Mutation) -> Result<()> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        let resources = state.accounts.entry(account.account_id.clone()).or_default();
        // Deletes must cascade first; a delete with live dependents is
        // rejected the way the real APIs reject it.
        if let Mutation::DeleteResource { kind, name } = &mutation {
            let has_dependents = resources.iter().any(|r| {
                r.kind == *kind
                    && &r.name == name
                    && !(r.managed_policies.is_empty()
                        && r.inline_policies.is_empty()
                        && r.instance_profiles.is_empty())
            });
            if has_dependents {
                return Err(ProviderError::DeleteConflict {
                    resource: name.clone(),
                    message: String::from(
                        "managed policies, inline policies, or instance profiles still attached",
                    ),
                }
                .into());
            }
        }
        apply_mutation(resources, &mutation);
        self.persist(&state)
    }
}

fn poisoned() -> KeyplaneError {
    KeyplaneError::internal("snapshot state lock poisoned")
}
