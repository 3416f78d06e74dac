//! Engine configuration: the set of provider accounts under management.
//!
//! The config file lists every account/organization the engine reconciles
//! against. Credentials are never stored here; each account carries an
//! opaque credentials handle (an environment variable name or named
//! profile) that the provider collaborator resolves itself.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{KeyplaneError, Result, TemplateError};

/// The identity provider an account belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// An AWS account.
    Aws,
    /// An Okta organization.
    Okta,
    /// A Google Workspace domain.
    Google,
}

/// One provider account/organization. Immutable for the duration of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountConfig {
    /// Provider-assigned account identifier (AWS account id, Okta org
    /// name, Google domain).
    pub account_id: String,
    /// Human-readable display name.
    pub account_name: String,
    /// Optional local alias usable in template scope rules.
    #[serde(default)]
    pub alias: Option<String>,
    /// The provider this account belongs to.
    pub provider: ProviderKind,
    /// Opaque credentials handle resolved by the provider collaborator.
    #[serde(default)]
    pub credentials: Option<String>,
}

impl AccountConfig {
    /// Returns true if the given scope pattern names this account.
    ///
    /// Matching is case-insensitive against the account id, name, and
    /// alias. The wildcard is handled by the scope resolver, not here.
    #[must_use]
    pub fn matches(&self, pattern: &str) -> bool {
        self.account_id.eq_ignore_ascii_case(pattern)
            || self.account_name.eq_ignore_ascii_case(pattern)
            || self
                .alias
                .as_deref()
                .is_some_and(|alias| alias.eq_ignore_ascii_case(pattern))
    }
}

impl std::fmt::Display for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.account_name, self.account_id)
    }
}

/// Root engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    /// All accounts under management, in configured order.
    pub accounts: Vec<AccountConfig>,
}

impl EngineConfig {
    /// Loads the engine configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or cannot be parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(KeyplaneError::Template(TemplateError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }
        let raw = std::fs::read_to_string(path)?;
        let config: Self =
            serde_yaml::from_str(&raw).map_err(|e| TemplateError::ParseError {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        Ok(config)
    }

    /// Returns the accounts belonging to one provider.
    #[must_use]
    pub fn accounts_for(&self, provider: ProviderKind) -> Vec<&AccountConfig> {
        self.accounts
            .iter()
            .filter(|a| a.provider == provider)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(id: &str, alias: Option<&str>) -> AccountConfig {
        AccountConfig {
            account_id: id.to_string(),
            account_name: format!("{id}-name"),
            alias: alias.map(String::from),
            provider: ProviderKind::Aws,
            credentials: None,
        }
    }

    #[test]
    fn test_matches_id_case_insensitive() {
        let acct = account("123456789012", None);
        assert!(acct.matches("123456789012"));
        assert!(!acct.matches("999999999999"));
    }

    #[test]
    fn test_matches_alias() {
        let acct = account("123456789012", Some("prod"));
        assert!(acct.matches("prod"));
        assert!(acct.matches("PROD"));
        assert!(!acct.matches("staging"));
    }

    #[test]
    fn test_parse_config() {
        let yaml = r"
accounts:
  - account_id: '123456789012'
    account_name: prod
    provider: aws
  - account_id: example-org
    account_name: Example Okta
    provider: okta
    credentials: OKTA_API_TOKEN
";
        let config: EngineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.accounts.len(), 2);
        assert_eq!(config.accounts_for(ProviderKind::Okta).len(), 1);
        assert_eq!(
            config.accounts_for(ProviderKind::Okta)[0].credentials.as_deref(),
            Some("OKTA_API_TOKEN")
        );
    }
}
