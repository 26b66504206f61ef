//! YAML configuration.
//!
//! ```yaml
//! database:
//!   path: data/rbac.db
//!   max-connections: 5
//! permission:
//!   rbac:
//!     admin:
//!       users:
//!         - name: user:default/alice
//!     policies-csv-file: rbac-policy.csv
//!     policy-file-reload: true
//! role-cache:
//!   max-entries: 100
//!   max-age-seconds: 3600
//! directory:
//!   static:
//!     - name: team-a
//!       parent: org
//!       members: [user:default/tom]
//! ```
//!
//! Every key is optional. `directory.catalog.base-url` takes precedence over a
//! static group list. Relative paths are resolved against the directory of the
//! configuration file when it is loaded with [`RbacConfig::load`].

use database::{DatabaseConfig, DEFAULT_MAX_CONNECTIONS};
use hierarchy::{CatalogDirectory, GroupDirectory, RoleCache, StaticDirectory, StaticGroup};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::{ReconcilerError, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RbacConfig {
    pub database: DatabaseSection,
    pub permission: PermissionSection,
    pub role_cache: RoleCacheSection,
    pub directory: DirectorySection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DatabaseSection {
    pub path: PathBuf,
    pub max_connections: u32,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data").join("rbac.db"),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionSection {
    pub rbac: RbacSection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RbacSection {
    pub admin: AdminSection,
    pub policies_csv_file: Option<PathBuf>,
    pub policy_file_reload: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminSection {
    pub users: Vec<AdminUser>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminUser {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RoleCacheSection {
    pub max_entries: usize,
    pub max_age_seconds: u64,
}

impl Default for RoleCacheSection {
    fn default() -> Self {
        Self {
            max_entries: RoleCache::DEFAULT_MAX_ENTRIES,
            max_age_seconds: RoleCache::DEFAULT_MAX_AGE.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DirectorySection {
    pub catalog: Option<CatalogSection>,
    #[serde(rename = "static")]
    pub static_groups: Vec<StaticGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CatalogSection {
    pub base_url: String,
    #[serde(default)]
    pub token: Option<String>,
}

impl RbacConfig {
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: RbacConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads the file at `path` and resolves relative paths against its directory.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ReconcilerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.database.max_connections == 0 {
            return Err(ReconcilerError::Config(
                "database.max-connections must be at least 1".to_string(),
            ));
        }
        if let Some(catalog) = &self.directory.catalog {
            if catalog.base_url.trim().is_empty() {
                return Err(ReconcilerError::Config(
                    "directory.catalog.base-url must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        if self.database.path.is_relative() {
            self.database.path = base.join(&self.database.path);
        }
        if let Some(file) = &self.permission.rbac.policies_csv_file {
            if file.is_relative() {
                self.permission.rbac.policies_csv_file = Some(base.join(file));
            }
        }
    }

    pub fn admin_users(&self) -> Vec<String> {
        self.permission
            .rbac
            .admin
            .users
            .iter()
            .map(|u| u.name.clone())
            .collect()
    }

    pub fn policies_csv_file(&self) -> Option<&Path> {
        self.permission.rbac.policies_csv_file.as_deref()
    }

    pub fn policy_file_reload(&self) -> bool {
        self.permission.rbac.policy_file_reload
    }

    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig::new_with_path(self.database.path.clone())
            .with_max_connections(self.database.max_connections)
    }

    pub fn role_cache(&self) -> RoleCache {
        RoleCache::new(
            self.role_cache.max_entries,
            Duration::from_secs(self.role_cache.max_age_seconds),
        )
    }

    pub fn group_directory(&self) -> Result<Arc<dyn GroupDirectory>> {
        match &self.directory.catalog {
            Some(catalog) => Ok(Arc::new(CatalogDirectory::new(
                catalog.base_url.clone(),
                catalog.token.clone(),
            )?)),
            None => Ok(Arc::new(StaticDirectory::new(
                self.directory.static_groups.clone(),
            ))),
        }
    }
}
