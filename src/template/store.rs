//! Template repository access.
//!
//! Defines the common interface for loading, writing, and discovering
//! template files, plus the filesystem implementation used by the CLI.
//! Written output is always normalized first so logically-equal templates
//! serialize byte-identically.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{KeyplaneError, Result, TemplateError};

use super::model::Template;

/// Trait for template repositories.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Loads a template from a path.
    async fn load(&self, path: &Path) -> Result<Template>;

    /// Writes a template back to its source path.
    async fn write(&self, template: &Template) -> Result<()>;

    /// Discovers all template file paths under a directory, sorted.
    async fn gather(&self, dir: &Path) -> Result<Vec<PathBuf>>;

    /// Removes a template file.
    async fn remove(&self, path: &Path) -> Result<()>;
}

#[async_trait]
impl TemplateStore for Box<dyn TemplateStore> {
    async fn load(&self, path: &Path) -> Result<Template> {
        (**self).load(path).await
    }

    async fn write(&self, template: &Template) -> Result<()> {
        (**self).write(template).await
    }

    async fn gather(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        (**self).gather(dir).await
    }

    async fn remove(&self, path: &Path) -> Result<()> {
        (**self).remove(path).await
    }
}

/// Filesystem-backed template repository (YAML files).
#[derive(Debug, Default, Clone, Copy)]
pub struct FsTemplateStore;

impl FsTemplateStore {
    /// Creates a new filesystem store.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn gather_into(dir: &Path, paths: &mut Vec<PathBuf>) -> Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                Self::gather_into(&path, paths)?;
            } else if path
                .extension()
                .is_some_and(|ext| ext == "yaml" || ext == "yml")
            {
                paths.push(path);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TemplateStore for FsTemplateStore {
    async fn load(&self, path: &Path) -> Result<Template> {
        if !path.exists() {
            return Err(KeyplaneError::Template(TemplateError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }
        let raw = std::fs::read_to_string(path)?;
        let mut template: Template =
            serde_yaml::from_str(&raw).map_err(|e| TemplateError::ParseError {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        template.set_file_path(path.to_path_buf());
        Ok(template)
    }

    async fn write(&self, template: &Template) -> Result<()> {
        let Some(path) = template.file_path() else {
            return Err(KeyplaneError::Template(TemplateError::SerializeError {
                identifier: template.identifier().to_string(),
                message: String::from("template has no file path"),
            }));
        };

        let mut normalized = template.clone();
        normalized.normalize();

        let raw =
            serde_yaml::to_string(&normalized).map_err(|e| TemplateError::SerializeError {
                identifier: template.identifier().to_string(),
                message: e.to_string(),
            })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Skip the write when nothing changed, keeping mtimes stable.
        if std::fs::read_to_string(path).is_ok_and(|current| current == raw) {
            debug!(path = %path.display(), "Template unchanged, skipping write");
            return Ok(());
        }
        std::fs::write(path, raw)?;
        debug!(path = %path.display(), "Template written");
        Ok(())
    }

    async fn gather(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        if dir.exists() {
            Self::gather_into(dir, &mut paths)?;
        }
        paths.sort();
        Ok(paths)
    }

    async fn remove(&self, path: &Path) -> Result<()> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// Returns the conventional relative path for a template file.
#[must_use]
pub fn template_path(root: &Path, template: &Template) -> PathBuf {
    let kind_dir = template.kind().as_str().replace(':', "/");
    let file_name = format!("{}.yaml", template.identifier().to_lowercase());
    root.join(kind_dir).join(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::model::{ResourceKind, ResourceTemplate, RoleProperties, Tag};

    fn role_template(dir: &Path) -> Template {
        let mut template = Template::AwsIamRole(ResourceTemplate {
            identifier: String::from("engineering"),
            included_accounts: vec![String::from("*")],
            excluded_accounts: vec![],
            expires_at: None,
            deleted: false,
            properties: RoleProperties {
                role_name: String::from("engineering"),
                description: None,
                path: vec![],
                permissions_boundary: vec![],
                max_session_duration: None,
                assume_role_policy_document: None,
                tags: vec![
                    Tag {
                        key: String::from("zeta"),
                        value: String::from("1"),
                        expires_at: None,
                    },
                    Tag {
                        key: String::from("alpha"),
                        value: String::from("2"),
                        expires_at: None,
                    },
                ],
                managed_policies: vec![],
                inline_policies: vec![],
            },
            file_path: None,
        });
        template.set_file_path(template_path(dir, &template));
        template
    }

    #[tokio::test]
    async fn test_write_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsTemplateStore::new();
        let template = role_template(dir.path());

        store.write(&template).await.unwrap();
        let path = template.file_path().unwrap().clone();
        let loaded = store.load(&path).await.unwrap();

        assert_eq!(loaded.identifier(), "engineering");
        assert_eq!(loaded.kind(), ResourceKind::AwsIamRole);
    }

    #[tokio::test]
    async fn test_write_is_deterministic_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsTemplateStore::new();
        let template = role_template(dir.path());
        let path = template.file_path().unwrap().clone();

        store.write(&template).await.unwrap();
        let first = std::fs::read_to_string(&path).unwrap();
        store.write(&template).await.unwrap();
        let second = std::fs::read_to_string(&path).unwrap();

        assert_eq!(first, second);
        // Tags were authored zeta-first but serialize alpha-first.
        let alpha = first.find("alpha").unwrap();
        let zeta = first.find("zeta").unwrap();
        assert!(alpha < zeta);
    }

    #[tokio::test]
    async fn test_gather_finds_nested_templates() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsTemplateStore::new();
        let template = role_template(dir.path());
        store.write(&template).await.unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let paths = store.gather(dir.path()).await.unwrap();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].ends_with("aws/iam/role/engineering.yaml"));
    }

    #[tokio::test]
    async fn test_load_missing_file_errors() {
        let store = FsTemplateStore::new();
        let err = store.load(Path::new("/nonexistent/role.yaml")).await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
