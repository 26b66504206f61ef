//! Checks a predefined policy file before any of it is applied.

use authz::{PolicyStoreDelegate, Source};
use std::collections::BTreeSet;

use crate::error::{ReconcilerError, Result};
use crate::policy_file::PolicyFile;

/// Structural problems in the file, one message per offending rule.
pub fn validate_entries(file: &PolicyFile) -> Vec<String> {
    let mut errors = Vec::new();
    for policy in &file.policies {
        if let Err(err) = policy.validate() {
            errors.push(format!("policy [{}]: {}", policy, err));
        }
    }
    for assignment in &file.assignments {
        if let Err(err) = assignment.validate() {
            errors.push(format!("role assignment [{}]: {}", assignment, err));
        }
    }
    errors
}

/// Roles in the file whose stored metadata belongs to another writer.
pub async fn check_role_sources(
    delegate: &PolicyStoreDelegate,
    file: &PolicyFile,
) -> Result<Vec<String>> {
    let roles: BTreeSet<&str> = file.assignments.iter().map(|a| a.role.as_str()).collect();
    let mut errors = Vec::new();
    for role in roles {
        if let Some(metadata) = delegate.get_role_metadata(role).await? {
            if metadata.source != Source::CsvFile && !metadata.source.is_legacy() {
                errors.push(format!(
                    "source does not match originating role {}, consider making changes to the '{}'",
                    role,
                    metadata.source.as_str().to_uppercase()
                ));
            }
        }
    }
    Ok(errors)
}

/// Fails with every problem found, so one run reports them all.
pub async fn validate_policy_file(delegate: &PolicyStoreDelegate, file: &PolicyFile) -> Result<()> {
    let mut errors = validate_entries(file);
    errors.extend(check_role_sources(delegate, file).await?);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ReconcilerError::Validation {
            path: file.path.clone(),
            errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::delegate;
    use authz::{PolicyRule, RoleAssignment};
    use metadata::RoleMetadata;
    use std::path::Path;

    fn file(content: &str) -> PolicyFile {
        PolicyFile::parse(Path::new("rbac-policy.csv"), content).unwrap()
    }

    #[test]
    fn test_entries_report_each_bad_rule() {
        let errors = validate_entries(&file(
            "p, role:default/dev, catalog-entity, read, allow\n\
             p, component:default/x, catalog-entity, read, allow\n\
             g, user:default/tom, group:default/dev\n",
        ));
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("component:default/x"));
        assert!(errors[1].contains("group:default/dev"));
    }

    #[tokio::test]
    async fn test_role_owned_by_rest_is_rejected() {
        let delegate = delegate().await;
        delegate
            .add_grouping_policy(
                &RoleAssignment::new("user:default/amy", "role:default/dev"),
                &RoleMetadata::new("role:default/dev", Source::Rest, "user:default/admin"),
            )
            .await
            .unwrap();

        let bad = file("g, user:default/tom, role:default/dev\n");
        let err = validate_policy_file(&delegate, &bad).await.unwrap_err();
        match err {
            ReconcilerError::Validation { errors, .. } => {
                assert_eq!(errors.len(), 1);
                assert!(errors[0].contains("'REST'"));
            }
            other => panic!("expected a validation error, got {:?}", other),
        }

        // Policies alone do not touch role metadata
        delegate
            .add_policy(
                &PolicyRule::allow("role:default/dev", "catalog-entity", "read"),
                Source::Rest,
            )
            .await
            .unwrap();
        let ok = file("p, role:default/dev, catalog-entity, read, allow\n");
        assert!(validate_policy_file(&delegate, &ok).await.is_ok());
    }

    #[tokio::test]
    async fn test_legacy_role_is_accepted() {
        let delegate = delegate().await;
        delegate
            .add_grouping_policy(
                &RoleAssignment::new("user:default/amy", "role:default/dev"),
                &RoleMetadata::new("role:default/dev", Source::Legacy, "user:default/admin"),
            )
            .await
            .unwrap();

        let ok = file("g, user:default/tom, role:default/dev\n");
        assert!(validate_policy_file(&delegate, &ok).await.is_ok());
    }
}
