//! In-process rule engine.
//!
//! Holds the active policy and grouping rules and answers
//! `enforce(subject, key, action)`. A request is allowed when at least one
//! matching policy allows it and none denies it.
//!
//! A policy with subject `S` matches a request subject `R` when:
//! - `R == S`,
//! - `S` is a group and `R` is a transitive member of it, or
//! - `S` is a role and `R` is assigned to it, directly or through a group
//!   that is assigned to it.
//!
//! Group membership comes from the [`RoleManager`]. The rule lock is never
//! held while waiting on it.

use hierarchy::RoleManager;
use metadata::{RuleKind, RuleRecord};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

use crate::error::Result;
use crate::types::{
    is_group_ref, Effect, PolicyRule, RoleAssignment, Source, SourcedAssignment, SourcedPolicy,
};

#[derive(Debug, Clone, Default)]
struct RuleSet {
    policies: Vec<SourcedPolicy>,
    assignments: Vec<SourcedAssignment>,
}

/// A batch of rule mutations applied under one write lock.
///
/// Removals are applied before additions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleChanges {
    pub remove_policies: Vec<SourcedPolicy>,
    pub add_policies: Vec<SourcedPolicy>,
    pub remove_assignments: Vec<SourcedAssignment>,
    pub add_assignments: Vec<SourcedAssignment>,
}

impl RuleChanges {
    pub fn is_empty(&self) -> bool {
        self.remove_policies.is_empty()
            && self.add_policies.is_empty()
            && self.remove_assignments.is_empty()
            && self.add_assignments.is_empty()
    }
}

/// Matches `values` against `fields` starting at `field_index`. Empty values
/// match anything.
pub fn matches_filter(fields: &[String], field_index: usize, values: &[&str]) -> bool {
    values.iter().enumerate().all(|(offset, value)| {
        value.is_empty()
            || fields
                .get(field_index + offset)
                .map(|f| f == value)
                .unwrap_or(false)
    })
}

pub struct RuleEngine {
    rules: RwLock<RuleSet>,
    role_manager: Arc<dyn RoleManager>,
}

impl RuleEngine {
    pub fn new(role_manager: Arc<dyn RoleManager>) -> Self {
        Self {
            rules: RwLock::new(RuleSet::default()),
            role_manager,
        }
    }

    pub fn role_manager(&self) -> &Arc<dyn RoleManager> {
        &self.role_manager
    }

    /// Replaces the active rules with persisted rows.
    pub fn load(&self, records: &[RuleRecord]) -> Result<()> {
        let mut loaded = RuleSet::default();
        for record in records {
            match record.kind {
                RuleKind::Policy => loaded.policies.push(SourcedPolicy::from_record(record)?),
                RuleKind::Grouping => loaded
                    .assignments
                    .push(SourcedAssignment::from_record(record)?),
            }
        }
        debug!(
            "Loaded {} policies and {} role assignments",
            loaded.policies.len(),
            loaded.assignments.len()
        );
        *self.rules.write() = loaded;
        Ok(())
    }

    pub fn has_policy(&self, policy: &SourcedPolicy) -> bool {
        self.rules.read().policies.contains(policy)
    }

    pub fn has_assignment(&self, assignment: &SourcedAssignment) -> bool {
        self.rules.read().assignments.contains(assignment)
    }

    pub fn policies(&self) -> Vec<SourcedPolicy> {
        self.rules.read().policies.clone()
    }

    pub fn assignments(&self) -> Vec<SourcedAssignment> {
        self.rules.read().assignments.clone()
    }

    /// Field order: subject, permission, action, effect, source.
    pub fn filtered_policies(&self, field_index: usize, values: &[&str]) -> Vec<SourcedPolicy> {
        self.rules
            .read()
            .policies
            .iter()
            .filter(|p| matches_filter(&p.fields(), field_index, values))
            .cloned()
            .collect()
    }

    /// Field order: member, role, source.
    pub fn filtered_assignments(
        &self,
        field_index: usize,
        values: &[&str],
    ) -> Vec<SourcedAssignment> {
        self.rules
            .read()
            .assignments
            .iter()
            .filter(|a| matches_filter(&a.fields(), field_index, values))
            .cloned()
            .collect()
    }

    /// Sources currently holding `rule`.
    pub fn policy_sources(&self, rule: &PolicyRule) -> Vec<Source> {
        self.rules
            .read()
            .policies
            .iter()
            .filter(|p| &p.rule == rule)
            .map(|p| p.source)
            .collect()
    }

    /// Sources currently holding `assignment`.
    pub fn assignment_sources(&self, assignment: &RoleAssignment) -> Vec<Source> {
        self.rules
            .read()
            .assignments
            .iter()
            .filter(|a| &a.assignment == assignment)
            .map(|a| a.source)
            .collect()
    }

    pub fn assignments_for_role(&self, role: &str) -> Vec<SourcedAssignment> {
        self.filtered_assignments(1, &[role])
    }

    pub fn apply(&self, changes: &RuleChanges) {
        if changes.is_empty() {
            return;
        }
        {
            let mut rules = self.rules.write();
            rules
                .policies
                .retain(|p| !changes.remove_policies.contains(p));
            rules
                .assignments
                .retain(|a| !changes.remove_assignments.contains(a));
            for policy in &changes.add_policies {
                if !rules.policies.contains(policy) {
                    rules.policies.push(policy.clone());
                }
            }
            for assignment in &changes.add_assignments {
                if !rules.assignments.contains(assignment) {
                    rules.assignments.push(assignment.clone());
                }
            }
        }

        for assignment in changes
            .remove_assignments
            .iter()
            .chain(&changes.add_assignments)
        {
            self.role_manager.invalidate(&assignment.assignment.member);
        }
    }

    pub async fn enforce(&self, subject: &str, key: &str, action: &str) -> Result<bool> {
        let (candidates, assignments) = {
            let rules = self.rules.read();
            let candidates: Vec<PolicyRule> = rules
                .policies
                .iter()
                .filter(|p| p.rule.permission == key && p.rule.action == action)
                .map(|p| p.rule.clone())
                .collect();
            let assignments: Vec<RoleAssignment> = rules
                .assignments
                .iter()
                .map(|a| a.assignment.clone())
                .collect();
            (candidates, assignments)
        };

        // Deny overrides, so check denials first.
        for policy in candidates.iter().filter(|p| p.effect == Effect::Deny) {
            if self.subject_matches(subject, &policy.subject, &assignments).await? {
                debug!("Denied {} {} {} by {}", subject, key, action, policy);
                return Ok(false);
            }
        }
        for policy in candidates.iter().filter(|p| p.effect == Effect::Allow) {
            if self.subject_matches(subject, &policy.subject, &assignments).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn subject_matches(
        &self,
        subject: &str,
        policy_subject: &str,
        assignments: &[RoleAssignment],
    ) -> Result<bool> {
        if subject == policy_subject {
            return Ok(true);
        }
        if is_group_ref(policy_subject)
            && self.role_manager.has_link(subject, policy_subject, None).await?
        {
            return Ok(true);
        }
        for assignment in assignments.iter().filter(|a| a.role == policy_subject) {
            if assignment.member == subject {
                return Ok(true);
            }
            if is_group_ref(&assignment.member)
                && self
                    .role_manager
                    .has_link(subject, &assignment.member, None)
                    .await?
            {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hierarchy::{HierarchyRoleManager, RoleCache, StaticDirectory, StaticGroup};

    fn engine() -> RuleEngine {
        let directory = StaticDirectory::new(vec![
            StaticGroup {
                name: "team-a".into(),
                namespace: None,
                parent: Some("org".into()),
                members: vec!["user:default/tom".into()],
            },
            StaticGroup {
                name: "org".into(),
                namespace: None,
                parent: None,
                members: vec![],
            },
        ]);
        RuleEngine::new(Arc::new(HierarchyRoleManager::new(
            Arc::new(directory),
            Arc::new(RoleCache::default()),
        )))
    }

    fn add(engine: &RuleEngine, policies: Vec<PolicyRule>, assignments: Vec<RoleAssignment>) {
        engine.apply(&RuleChanges {
            add_policies: policies
                .into_iter()
                .map(|p| p.with_source(Source::Rest))
                .collect(),
            add_assignments: assignments
                .into_iter()
                .map(|a| a.with_source(Source::Rest))
                .collect(),
            ..Default::default()
        });
    }

    #[tokio::test]
    async fn test_direct_subject_match() {
        let engine = engine();
        add(
            &engine,
            vec![PolicyRule::allow("user:default/tom", "catalog-entity", "read")],
            vec![],
        );

        assert!(engine.enforce("user:default/tom", "catalog-entity", "read").await.unwrap());
        assert!(!engine.enforce("user:default/tom", "catalog-entity", "delete").await.unwrap());
        assert!(!engine.enforce("user:default/amy", "catalog-entity", "read").await.unwrap());
    }

    #[tokio::test]
    async fn test_role_through_direct_and_group_assignment() {
        let engine = engine();
        add(
            &engine,
            vec![PolicyRule::allow("role:default/dev", "catalog-entity", "read")],
            vec![
                RoleAssignment::new("user:default/amy", "role:default/dev"),
                RoleAssignment::new("group:default/org", "role:default/dev"),
            ],
        );

        assert!(engine.enforce("user:default/amy", "catalog-entity", "read").await.unwrap());
        // tom is in team-a, whose parent org holds the role
        assert!(engine.enforce("user:default/tom", "catalog-entity", "read").await.unwrap());
        assert!(!engine.enforce("user:default/bob", "catalog-entity", "read").await.unwrap());
    }

    #[tokio::test]
    async fn test_group_subject_policy() {
        let engine = engine();
        add(
            &engine,
            vec![PolicyRule::allow("group:default/team-a", "scaffolder", "use")],
            vec![],
        );
        assert!(engine.enforce("user:default/tom", "scaffolder", "use").await.unwrap());
    }

    #[tokio::test]
    async fn test_deny_overrides_allow() {
        let engine = engine();
        add(
            &engine,
            vec![
                PolicyRule::allow("role:default/dev", "catalog-entity", "delete"),
                PolicyRule::new(
                    "user:default/amy",
                    "catalog-entity",
                    "delete",
                    Effect::Deny,
                ),
            ],
            vec![RoleAssignment::new("user:default/amy", "role:default/dev")],
        );
        assert!(!engine.enforce("user:default/amy", "catalog-entity", "delete").await.unwrap());
    }

    #[test]
    fn test_apply_and_filters() {
        let engine = engine();
        let first = PolicyRule::allow("role:default/dev", "catalog-entity", "read");
        add(&engine, vec![first.clone()], vec![]);
        engine.apply(&RuleChanges {
            add_policies: vec![first.clone().with_source(Source::CsvFile)],
            ..Default::default()
        });

        assert_eq!(engine.policies().len(), 2);
        assert_eq!(
            engine.policy_sources(&first),
            vec![Source::Rest, Source::CsvFile]
        );
        assert_eq!(engine.filtered_policies(4, &["csv-file"]).len(), 1);
        assert_eq!(engine.filtered_policies(0, &["role:default/dev", "", "read"]).len(), 2);
        assert!(engine.filtered_policies(1, &["other"]).is_empty());

        engine.apply(&RuleChanges {
            remove_policies: vec![first.clone().with_source(Source::Rest)],
            ..Default::default()
        });
        assert_eq!(engine.policy_sources(&first), vec![Source::CsvFile]);
    }

    #[test]
    fn test_load_replaces_rules() {
        let engine = engine();
        add(
            &engine,
            vec![PolicyRule::allow("user:default/x", "p", "read")],
            vec![],
        );
        let record = RoleAssignment::new("user:default/tom", "role:default/dev")
            .with_source(Source::Legacy)
            .record()
            .unwrap();
        engine.load(&[record]).unwrap();

        assert!(engine.policies().is_empty());
        assert_eq!(engine.assignments_for_role("role:default/dev").len(), 1);
    }

    #[test]
    fn test_matches_filter() {
        let fields: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        assert!(matches_filter(&fields, 0, &["a"]));
        assert!(matches_filter(&fields, 1, &["b", "c"]));
        assert!(matches_filter(&fields, 0, &["", "b"]));
        assert!(!matches_filter(&fields, 2, &["c", "d"]));
        assert!(matches_filter(&fields, 0, &[]));
    }
}
