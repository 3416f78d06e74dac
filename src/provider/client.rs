//! Provider client interface.
//!
//! Every identity provider (AWS IAM, Okta, Google Workspace) implements
//! this trait. The orchestrator only ever speaks this interface, so
//! per-kind reconciliation logic stays provider-agnostic.

use async_trait::async_trait;

use crate::config::AccountConfig;
use crate::error::Result;
use crate::template::model::ResourceKind;

use super::types::{Mutation, ObservedResource};

/// Read and write access to one identity provider.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Fetches the current state of one resource, or `None` if absent.
    async fn get_resource(
        &self,
        account: &AccountConfig,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Option<ObservedResource>>;

    /// Lists all resources of a kind on an account.
    async fn list_resources(
        &self,
        account: &AccountConfig,
        kind: ResourceKind,
    ) -> Result<Vec<ObservedResource>>;

    /// Applies one write operation.
    async fn mutate(&self, account: &AccountConfig, mutation: Mutation) -> Result<()>;
}

#[async_trait]
impl<P: ProviderClient + ?Sized> ProviderClient for &P {
    async fn get_resource(
        &self,
        account: &AccountConfig,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Option<ObservedResource>> {
        (**self).get_resource(account, kind, name).await
    }

    async fn list_resources(
        &self,
        account: &AccountConfig,
        kind: ResourceKind,
    ) -> Result<Vec<ObservedResource>> {
        (**self).list_resources(account, kind).await
    }

    async fn mutate(&self, account: &AccountConfig, mutation: Mutation) -> Result<()> {
        (**self).mutate(account, mutation).await
    }
}

#[async_trait]
impl ProviderClient for Box<dyn ProviderClient> {
    async fn get_resource(
        &self,
        account: &AccountConfig,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Option<ObservedResource>> {
        (**self).get_resource(account, kind, name).await
    }

    async fn list_resources(
        &self,
        account: &AccountConfig,
        kind: ResourceKind,
    ) -> Result<Vec<ObservedResource>> {
        (**self).list_resources(account, kind).await
    }

    async fn mutate(&self, account: &AccountConfig, mutation: Mutation) -> Result<()> {
        (**self).mutate(account, mutation).await
    }
}
