//! Startup reconciliation.
//!
//! Builds the policy store from [`RbacConfig`] and brings it in line with
//! configuration before requests are served: first the predefined policy
//! file, then the admin users. Both passes can be rerun without changing a
//! store that is already in line.

pub mod admin;
pub mod config;
pub mod error;
pub mod policy_file;
pub mod policy_sync;
pub mod validation;
mod watcher;

use authz::{PolicyStoreDelegate, RuleEngine};
use hierarchy::HierarchyRoleManager;
use metadata::{MetadataStore, SqliteMetadataStore};
use std::sync::Arc;
use tracing::info;

pub use admin::{reconcile_admins, AdminReport, ADMIN_ROLE};
pub use config::RbacConfig;
pub use error::{ReconcilerError, Result};
pub use policy_file::PolicyFile;
pub use policy_sync::{apply_policy_file, reconcile_policy_file, FileReport};
pub use validation::validate_policy_file;
pub use watcher::PolicyFileWatcher;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub file: FileReport,
    pub admins: AdminReport,
}

/// Opens the SQLite store named in `config` and loads the persisted rules.
pub async fn open_delegate(config: &RbacConfig) -> Result<Arc<PolicyStoreDelegate>> {
    let db = database::initialize_database(config.database_config()).await?;
    let store: Arc<dyn MetadataStore> = Arc::new(SqliteMetadataStore::new(&db));
    delegate_with_store(config, store).await
}

/// Wires the role manager and rule engine described by `config` over `store`.
pub async fn delegate_with_store(
    config: &RbacConfig,
    store: Arc<dyn MetadataStore>,
) -> Result<Arc<PolicyStoreDelegate>> {
    let role_manager = HierarchyRoleManager::new(
        config.group_directory()?,
        Arc::new(config.role_cache()),
    );
    let engine = Arc::new(RuleEngine::new(Arc::new(role_manager)));
    Ok(Arc::new(PolicyStoreDelegate::load(engine, store).await?))
}

/// Runs the policy file pass and then the admin pass.
///
/// An unreadable or invalid policy file fails the whole run before the admin
/// pass starts.
pub async fn reconcile(delegate: &PolicyStoreDelegate, config: &RbacConfig) -> Result<ReconcileReport> {
    let file = reconcile_policy_file(delegate, config.policies_csv_file()).await?;
    let admins = reconcile_admins(delegate, &config.admin_users()).await?;
    info!("Startup reconciliation finished");
    Ok(ReconcileReport { file, admins })
}

#[cfg(test)]
pub(crate) mod test_support {
    use authz::{PolicyStoreDelegate, RuleEngine};
    use hierarchy::{HierarchyRoleManager, RoleCache, StaticDirectory};
    use metadata::{MemoryMetadataStore, MetadataStore};
    use std::sync::Arc;

    pub async fn delegate() -> PolicyStoreDelegate {
        delegate_over(Arc::new(MemoryMetadataStore::new())).await
    }

    pub async fn delegate_over(store: Arc<dyn MetadataStore>) -> PolicyStoreDelegate {
        let role_manager = HierarchyRoleManager::new(
            Arc::new(StaticDirectory::default()),
            Arc::new(RoleCache::default()),
        );
        PolicyStoreDelegate::load(Arc::new(RuleEngine::new(Arc::new(role_manager))), store)
            .await
            .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use authz::{PolicyRule, Source};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reconcile_from_config_over_sqlite() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("rbac-policy.csv"),
            "p, role:default/dev, catalog-entity, read, allow\n\
             g, group:default/team-a, role:default/dev\n",
        )
        .unwrap();
        let config_path = dir.path().join("rbac.yaml");
        std::fs::write(
            &config_path,
            "database:\n  path: rbac.db\n\
             permission:\n  rbac:\n    admin:\n      users:\n        - name: user:default/alice\n    policies-csv-file: rbac-policy.csv\n\
             directory:\n  static:\n    - name: team-a\n      members: [user:default/tom]\n",
        )
        .unwrap();
        let config = RbacConfig::load(&config_path).unwrap();

        let delegate = open_delegate(&config).await.unwrap();
        let report = reconcile(&delegate, &config).await.unwrap();
        assert_eq!(report.file.added_policies, 1);
        assert_eq!(report.admins.added, vec!["user:default/alice"]);
        assert!(delegate
            .enforce("user:default/tom", "catalog-entity", "read")
            .await
            .unwrap());

        // A fresh process sees the same state and has nothing to do
        drop(delegate);
        let delegate = open_delegate(&config).await.unwrap();
        assert!(delegate
            .has_policy(
                &PolicyRule::allow("role:default/dev", "catalog-entity", "read"),
                Source::CsvFile
            )
            .await);
        let report = reconcile(&delegate, &config).await.unwrap();
        assert_eq!(report, ReconcileReport::default());
    }
}
