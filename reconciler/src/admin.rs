//! Admin users from configuration.
//!
//! Configured admins are members of [`ADMIN_ROLE`] under the `configuration`
//! source, and the role holds full rights on `policy-entity`. Admins dropped
//! from configuration lose the role on the next run.

use authz::{EntityRef, PolicyRule, PolicyStoreDelegate, RoleAssignment, Source};
use metadata::{metadata_string_to_policy, RoleMetadata};
use tracing::{debug, info};

use crate::error::{ReconcilerError, Result};

pub const ADMIN_ROLE: &str = "role:default/rbac_admin";

/// Resource type of the policy management API.
pub const POLICY_ENTITY: &str = "policy-entity";

const ADMIN_ACTIONS: [&str; 4] = ["read", "create", "delete", "update"];

/// Author and modifier recorded on metadata this pass writes.
const CONFIGURATION_AUTHOR: &str = "configuration";

fn admin_metadata() -> RoleMetadata {
    RoleMetadata::new(ADMIN_ROLE, Source::Configuration, CONFIGURATION_AUTHOR)
        .with_description("Administrators of role-based access control")
}

pub fn admin_policies() -> Vec<PolicyRule> {
    ADMIN_ACTIONS
        .iter()
        .map(|action| PolicyRule::allow(ADMIN_ROLE, POLICY_ENTITY, *action))
        .collect()
}

fn validate_admin(admin: &str) -> Result<()> {
    let entity: EntityRef = admin.parse()?;
    if !(entity.is_user() || entity.is_group()) {
        return Err(ReconcilerError::Config(format!(
            "admin '{}' must be a user or group reference",
            admin
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

pub async fn reconcile_admins(delegate: &PolicyStoreDelegate, admins: &[String]) -> Result<AdminReport> {
    for admin in admins {
        validate_admin(admin)?;
    }
    let metadata = admin_metadata();
    let mut report = AdminReport::default();

    if delegate.replace_legacy_role_metadata(&metadata).await? {
        info!("Moved legacy metadata of {} to configuration", ADMIN_ROLE);
    }

    for admin in admins {
        let assignment = RoleAssignment::new(admin.clone(), ADMIN_ROLE);
        if !delegate
            .has_grouping_policy(&assignment, Source::Configuration)
            .await
        {
            report.added.push(admin.clone());
        }
        delegate
            .add_or_update_grouping_policy(&assignment, &metadata)
            .await?;
    }

    for shadow in delegate
        .get_filtered_policy_metadata(Source::Configuration)
        .await?
    {
        let fields = metadata_string_to_policy(&shadow.policy);
        let [member, role] = fields.as_slice() else {
            continue;
        };
        if role != ADMIN_ROLE || admins.contains(member) {
            continue;
        }
        let stale = RoleAssignment::new(member.clone(), ADMIN_ROLE);
        if !delegate
            .has_grouping_policy(&stale, Source::Configuration)
            .await
        {
            debug!("Skipping shadow row without a rule: {}", shadow.policy);
            continue;
        }
        delegate
            .remove_grouping_policy(&stale, &metadata, false)
            .await?;
        report.removed.push(member.clone());
    }

    for policy in admin_policies() {
        delegate
            .add_or_update_policy(&policy, Source::Configuration, false)
            .await?;
    }

    info!(
        "Admin reconciliation added {} and removed {} members of {}",
        report.added.len(),
        report.removed.len(),
        ADMIN_ROLE
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::delegate;

    fn admins(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn test_admins_get_role_and_rights() {
        let d = delegate().await;
        let report = reconcile_admins(&d, &admins(&["user:default/alice"]))
            .await
            .unwrap();
        assert_eq!(report.added, vec!["user:default/alice"]);

        for policy in admin_policies() {
            assert!(d.has_policy(&policy, Source::Configuration).await);
        }
        assert!(d
            .enforce("user:default/alice", POLICY_ENTITY, "delete")
            .await
            .unwrap());
        assert!(!d
            .enforce("user:default/bob", POLICY_ENTITY, "read")
            .await
            .unwrap());

        let stored = d.get_role_metadata(ADMIN_ROLE).await.unwrap().unwrap();
        assert_eq!(stored.source, Source::Configuration);
        // Admin rights are not tracked as policy metadata
        let shadows = d
            .get_filtered_policy_metadata(Source::Configuration)
            .await
            .unwrap();
        assert_eq!(shadows.len(), 1);
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent_and_drops_removed_admins() {
        let d = delegate().await;
        reconcile_admins(&d, &admins(&["user:default/alice", "user:default/bob"]))
            .await
            .unwrap();
        let again = reconcile_admins(&d, &admins(&["user:default/alice", "user:default/bob"]))
            .await
            .unwrap();
        assert!(again.added.is_empty());
        assert!(again.removed.is_empty());
        assert_eq!(d.get_filtered_grouping_policy(1, &[ADMIN_ROLE]).await.len(), 2);
        assert_eq!(d.get_filtered_policy(0, &[ADMIN_ROLE]).await.len(), 4);

        let report = reconcile_admins(&d, &admins(&["user:default/alice"]))
            .await
            .unwrap();
        assert_eq!(report.removed, vec!["user:default/bob"]);
        assert!(!d
            .enforce("user:default/bob", POLICY_ENTITY, "read")
            .await
            .unwrap());
        assert!(d.get_role_metadata(ADMIN_ROLE).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_legacy_admin_metadata_is_replaced() {
        let d = delegate().await;
        d.add_grouping_policy(
            &RoleAssignment::new("user:default/alice", ADMIN_ROLE),
            &RoleMetadata::new(ADMIN_ROLE, Source::Legacy, "user:default/old"),
        )
        .await
        .unwrap();

        reconcile_admins(&d, &admins(&["user:default/alice"]))
            .await
            .unwrap();

        let stored = d.get_role_metadata(ADMIN_ROLE).await.unwrap().unwrap();
        assert_eq!(stored.source, Source::Configuration);
        assert_eq!(stored.author, CONFIGURATION_AUTHOR);
        assert_eq!(
            d.get_filtered_grouping_policy(0, &["user:default/alice"]).await,
            vec![RoleAssignment::new("user:default/alice", ADMIN_ROLE)
                .with_source(Source::Configuration)]
        );
    }

    #[tokio::test]
    async fn test_invalid_admin_reference_is_rejected() {
        let d = delegate().await;
        assert!(reconcile_admins(&d, &admins(&["alice"])).await.is_err());
        assert!(reconcile_admins(&d, &admins(&["role:default/x"])).await.is_err());
        assert!(d.get_grouping_policy().await.is_empty());
    }
}
