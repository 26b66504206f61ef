//! Policy store delegate.
//!
//! The only writer of both the rule engine and the metadata store. Every
//! mutating operation runs in one store transaction that persists the rule
//! rows, their policy metadata shadows and the role metadata together. The
//! in-memory engine is updated only after that transaction commits, so a
//! failed operation leaves both sides as they were.

use metadata::{
    modified_after, MetadataStore, MetadataTransaction, PolicyMetadata, RoleMetadata,
    RoleMetadataWrite,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::audit::{log_role_event, Operation};
use crate::engine::{RuleChanges, RuleEngine};
use crate::error::{AuthzError, Result};
use crate::types::{
    PolicyRule, RoleAssignment, Source, SourcedAssignment, SourcedPolicy,
};

#[derive(Default)]
struct Staged {
    changes: RuleChanges,
    audit: Vec<(Operation, RoleMetadata, Vec<String>)>,
}

impl Staged {
    fn record(&mut self, operation: Operation, metadata: RoleMetadata, members: Vec<String>) {
        self.audit.push((operation, metadata, members));
    }
}

pub struct PolicyStoreDelegate {
    engine: Arc<RuleEngine>,
    store: Arc<dyn MetadataStore>,
}

impl PolicyStoreDelegate {
    /// Loads persisted rules into `engine` and wraps both.
    pub async fn load(engine: Arc<RuleEngine>, store: Arc<dyn MetadataStore>) -> Result<Self> {
        let records = store.load_rules().await?;
        engine.load(&records)?;
        info!(
            "Loaded {} rules from the {} store",
            records.len(),
            store.backend_name()
        );
        Ok(Self { engine, store })
    }

    pub fn engine(&self) -> &Arc<RuleEngine> {
        &self.engine
    }

    pub fn store(&self) -> &Arc<dyn MetadataStore> {
        &self.store
    }

    pub async fn has_policy(&self, rule: &PolicyRule, source: Source) -> bool {
        self.engine.has_policy(&rule.clone().with_source(source))
    }

    pub async fn has_grouping_policy(&self, assignment: &RoleAssignment, source: Source) -> bool {
        self.engine
            .has_assignment(&assignment.clone().with_source(source))
    }

    pub async fn get_policy(&self) -> Vec<SourcedPolicy> {
        self.engine.policies()
    }

    pub async fn get_grouping_policy(&self) -> Vec<SourcedAssignment> {
        self.engine.assignments()
    }

    /// See [`RuleEngine::filtered_policies`] for the field order.
    pub async fn get_filtered_policy(
        &self,
        field_index: usize,
        values: &[&str],
    ) -> Vec<SourcedPolicy> {
        self.engine.filtered_policies(field_index, values)
    }

    /// See [`RuleEngine::filtered_assignments`] for the field order.
    pub async fn get_filtered_grouping_policy(
        &self,
        field_index: usize,
        values: &[&str],
    ) -> Vec<SourcedAssignment> {
        self.engine.filtered_assignments(field_index, values)
    }

    pub async fn get_role_metadata(&self, role_entity_ref: &str) -> Result<Option<RoleMetadata>> {
        Ok(self.store.find_role_metadata(role_entity_ref).await?)
    }

    pub async fn list_role_metadata(&self) -> Result<Vec<RoleMetadata>> {
        Ok(self.store.list_role_metadata().await?)
    }

    pub async fn get_filtered_policy_metadata(&self, source: Source) -> Result<Vec<PolicyMetadata>> {
        Ok(self.store.find_policy_metadata_by_source(source).await?)
    }

    pub async fn enforce(&self, subject: &str, key: &str, action: &str) -> Result<bool> {
        self.engine.enforce(subject, key, action).await
    }

    pub async fn add_policy(&self, rule: &PolicyRule, source: Source) -> Result<()> {
        self.add_policies(std::slice::from_ref(rule), source).await
    }

    pub async fn add_policies(&self, rules: &[PolicyRule], source: Source) -> Result<()> {
        if rules.is_empty() {
            return Ok(());
        }
        let mut tx = self.store.begin().await?;
        let mut staged = Staged::default();
        let outcome = self
            .stage_policies_added(tx.as_mut(), &mut staged, rules, source)
            .await;
        self.finish(tx, staged, outcome).await
    }

    pub async fn add_grouping_policy(
        &self,
        assignment: &RoleAssignment,
        metadata: &RoleMetadata,
    ) -> Result<()> {
        self.add_grouping_policies(std::slice::from_ref(assignment), metadata)
            .await
    }

    /// Adds assignments of one role and creates or updates its metadata.
    pub async fn add_grouping_policies(
        &self,
        assignments: &[RoleAssignment],
        metadata: &RoleMetadata,
    ) -> Result<()> {
        if assignments.is_empty() {
            return Ok(());
        }
        check_role(assignments, &metadata.role_entity_ref)?;

        let mut tx = self.store.begin().await?;
        let mut staged = Staged::default();
        let outcome = self
            .stage_grouping_added(tx.as_mut(), &mut staged, assignments, metadata)
            .await;
        self.finish(tx, staged, outcome).await
    }

    /// Removes `old_rules` and adds `new_rules`, both under `source`.
    pub async fn update_policies(
        &self,
        old_rules: &[PolicyRule],
        new_rules: &[PolicyRule],
        source: Source,
    ) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let mut staged = Staged::default();
        let outcome = self
            .stage_policies_updated(tx.as_mut(), &mut staged, old_rules, new_rules, source)
            .await;
        self.finish(tx, staged, outcome).await
    }

    /// Replaces the assignments of a role and retargets its metadata.
    ///
    /// The role named by `old_assignments` may differ from
    /// `metadata.role_entity_ref`; the metadata row is then renamed. The
    /// stored author and creation time are kept, the description is replaced
    /// only when `metadata` carries one, and `last_modified` moves past
    /// `created_at`.
    pub async fn update_grouping_policies(
        &self,
        old_assignments: &[RoleAssignment],
        new_assignments: &[RoleAssignment],
        metadata: &RoleMetadata,
    ) -> Result<()> {
        let old_role = old_assignments
            .first()
            .map(|a| a.role.clone())
            .unwrap_or_else(|| metadata.role_entity_ref.clone());
        check_role(old_assignments, &old_role)?;
        check_role(new_assignments, &metadata.role_entity_ref)?;

        let mut tx = self.store.begin().await?;
        let mut staged = Staged::default();
        let outcome = self
            .stage_grouping_updated(
                tx.as_mut(),
                &mut staged,
                &old_role,
                old_assignments,
                new_assignments,
                metadata,
            )
            .await;
        self.finish(tx, staged, outcome).await
    }

    pub async fn remove_policy(&self, rule: &PolicyRule, source: Source) -> Result<()> {
        self.remove_policies(std::slice::from_ref(rule), source).await
    }

    pub async fn remove_policies(&self, rules: &[PolicyRule], source: Source) -> Result<()> {
        if rules.is_empty() {
            return Ok(());
        }
        let mut tx = self.store.begin().await?;
        let mut staged = Staged::default();
        let outcome = self
            .stage_policies_removed(tx.as_mut(), &mut staged, rules, source)
            .await;
        self.finish(tx, staged, outcome).await
    }

    pub async fn remove_grouping_policy(
        &self,
        assignment: &RoleAssignment,
        metadata: &RoleMetadata,
        is_role_update: bool,
    ) -> Result<()> {
        self.remove_grouping_policies(std::slice::from_ref(assignment), metadata, is_role_update)
            .await
    }

    /// Removes assignments tagged `metadata.source`.
    ///
    /// Unless `is_role_update` is set, the role metadata is deleted when no
    /// assignment of the role remains, and otherwise stamped with
    /// `metadata.modified_by`. With `is_role_update` the role metadata is left
    /// untouched for the caller to handle.
    pub async fn remove_grouping_policies(
        &self,
        assignments: &[RoleAssignment],
        metadata: &RoleMetadata,
        is_role_update: bool,
    ) -> Result<()> {
        if assignments.is_empty() {
            return Ok(());
        }
        let mut tx = self.store.begin().await?;
        let mut staged = Staged::default();
        let outcome = self
            .stage_grouping_removed(tx.as_mut(), &mut staged, assignments, metadata, is_role_update)
            .await;
        self.finish(tx, staged, outcome).await
    }

    /// Ensures `rule` exists under `source`, taking it over from any other
    /// source that holds it. A no-op when `source` already holds it.
    pub async fn add_or_update_policy(
        &self,
        rule: &PolicyRule,
        source: Source,
        track_metadata: bool,
    ) -> Result<()> {
        rule.validate()?;
        if self.engine.policy_sources(rule).contains(&source) {
            debug!("Policy [{}] already held by {}", rule, source);
            return Ok(());
        }

        let mut tx = self.store.begin().await?;
        let mut staged = Staged::default();
        let outcome = self
            .stage_policy_override(tx.as_mut(), &mut staged, rule, source, track_metadata)
            .await;
        self.finish(tx, staged, outcome).await
    }

    /// Ensures `assignment` exists under `metadata.source`, taking it over from
    /// any other source, and keeps the role metadata in step.
    ///
    /// When the source already holds the assignment nothing changes, apart
    /// from creating role metadata if it is missing.
    pub async fn add_or_update_grouping_policy(
        &self,
        assignment: &RoleAssignment,
        metadata: &RoleMetadata,
    ) -> Result<()> {
        check_role(std::slice::from_ref(assignment), &metadata.role_entity_ref)?;
        assignment.validate()?;

        let mut tx = self.store.begin().await?;
        let mut staged = Staged::default();
        let outcome = self
            .stage_grouping_override(tx.as_mut(), &mut staged, assignment, metadata)
            .await;
        self.finish(tx, staged, outcome).await
    }

    /// Replaces legacy metadata for a role with `metadata`, resetting its
    /// author and timestamps. Returns false when the stored row is not legacy.
    pub async fn replace_legacy_role_metadata(&self, metadata: &RoleMetadata) -> Result<bool> {
        let mut tx = self.store.begin().await?;
        let mut staged = Staged::default();
        let outcome = self
            .stage_legacy_replaced(tx.as_mut(), &mut staged, metadata)
            .await;
        self.finish(tx, staged, outcome).await
    }

    async fn finish<T>(
        &self,
        tx: Box<dyn MetadataTransaction>,
        staged: Staged,
        outcome: Result<T>,
    ) -> Result<T> {
        match outcome {
            Ok(value) => {
                tx.commit().await?;
                self.engine.apply(&staged.changes);
                for (operation, metadata, members) in staged.audit {
                    log_role_event(operation, &metadata, members);
                }
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    error!("Failed to roll back policy transaction: {}", rollback_err);
                }
                debug!("Policy operation rolled back: {}", err);
                Err(err)
            }
        }
    }

    fn policy_present(&self, staged: &Staged, policy: &SourcedPolicy) -> bool {
        staged.changes.add_policies.contains(policy)
            || (self.engine.has_policy(policy) && !staged.changes.remove_policies.contains(policy))
    }

    fn assignment_present(&self, staged: &Staged, assignment: &SourcedAssignment) -> bool {
        staged.changes.add_assignments.contains(assignment)
            || (self.engine.has_assignment(assignment)
                && !staged.changes.remove_assignments.contains(assignment))
    }

    /// Sources holding `rule` once the staged changes are applied.
    fn policy_sources(&self, staged: &Staged, rule: &PolicyRule) -> Vec<Source> {
        let mut sources: Vec<Source> = self
            .engine
            .policy_sources(rule)
            .into_iter()
            .filter(|source| {
                !staged
                    .changes
                    .remove_policies
                    .iter()
                    .any(|p| &p.rule == rule && p.source == *source)
            })
            .collect();
        sources.extend(
            staged
                .changes
                .add_policies
                .iter()
                .filter(|p| &p.rule == rule)
                .map(|p| p.source),
        );
        sources
    }

    /// Sources holding `assignment` once the staged changes are applied.
    fn assignment_sources(&self, staged: &Staged, assignment: &RoleAssignment) -> Vec<Source> {
        let mut sources: Vec<Source> = self
            .engine
            .assignment_sources(assignment)
            .into_iter()
            .filter(|source| {
                !staged
                    .changes
                    .remove_assignments
                    .iter()
                    .any(|a| &a.assignment == assignment && a.source == *source)
            })
            .collect();
        sources.extend(
            staged
                .changes
                .add_assignments
                .iter()
                .filter(|a| &a.assignment == assignment)
                .map(|a| a.source),
        );
        sources
    }

    /// Members of `role` once the staged changes are applied.
    fn remaining_members(&self, staged: &Staged, role: &str) -> Vec<String> {
        let mut members: Vec<String> = self
            .engine
            .assignments_for_role(role)
            .into_iter()
            .filter(|a| !staged.changes.remove_assignments.contains(a))
            .map(|a| a.assignment.member)
            .collect();
        members.extend(
            staged
                .changes
                .add_assignments
                .iter()
                .filter(|a| a.assignment.role == role)
                .map(|a| a.assignment.member.clone()),
        );
        members
    }

    async fn add_policy_row(
        &self,
        tx: &mut dyn MetadataTransaction,
        staged: &mut Staged,
        policy: SourcedPolicy,
        track_metadata: bool,
    ) -> Result<()> {
        policy.rule.validate()?;
        if self.policy_present(staged, &policy) {
            return Err(AuthzError::Conflict(format!(
                "policy [{}] from source '{}' already exists",
                policy.rule, policy.source
            )));
        }
        tx.insert_rule(&policy.record()?).await?;
        if track_metadata {
            tx.create_policy_metadata(policy.source, &policy.rule.fields())
                .await?;
        }
        staged.changes.add_policies.push(policy);
        Ok(())
    }

    async fn remove_policy_row(
        &self,
        tx: &mut dyn MetadataTransaction,
        staged: &mut Staged,
        policy: SourcedPolicy,
    ) -> Result<()> {
        if !self.policy_present(staged, &policy) {
            return Err(AuthzError::NotFound(format!(
                "policy [{}] from source '{}'",
                policy.rule, policy.source
            )));
        }
        tx.delete_rule(&policy.record()?).await?;
        tx.remove_policy_metadata(policy.source, &policy.rule.fields())
            .await?;
        staged.changes.add_policies.retain(|p| p != &policy);
        staged.changes.remove_policies.push(policy);
        Ok(())
    }

    async fn add_assignment_row(
        &self,
        tx: &mut dyn MetadataTransaction,
        staged: &mut Staged,
        assignment: SourcedAssignment,
    ) -> Result<()> {
        assignment.assignment.validate()?;
        if self.assignment_present(staged, &assignment) {
            return Err(AuthzError::Conflict(format!(
                "role assignment [{}] from source '{}' already exists",
                assignment.assignment, assignment.source
            )));
        }
        tx.insert_rule(&assignment.record()?).await?;
        tx.create_policy_metadata(assignment.source, &assignment.assignment.fields())
            .await?;
        staged.changes.add_assignments.push(assignment);
        Ok(())
    }

    async fn remove_assignment_row(
        &self,
        tx: &mut dyn MetadataTransaction,
        staged: &mut Staged,
        assignment: SourcedAssignment,
    ) -> Result<()> {
        if !self.assignment_present(staged, &assignment) {
            return Err(AuthzError::NotFound(format!(
                "role assignment [{}] from source '{}'",
                assignment.assignment, assignment.source
            )));
        }
        tx.delete_rule(&assignment.record()?).await?;
        tx.remove_policy_metadata(assignment.source, &assignment.assignment.fields())
            .await?;
        staged.changes.add_assignments.retain(|a| a != &assignment);
        staged.changes.remove_assignments.push(assignment);
        Ok(())
    }

    async fn upsert_role(
        &self,
        tx: &mut dyn MetadataTransaction,
        staged: &mut Staged,
        metadata: &RoleMetadata,
    ) -> Result<()> {
        let write = tx.upsert_role_metadata(metadata).await?;
        let members = self.remaining_members(staged, &metadata.role_entity_ref);
        match write {
            RoleMetadataWrite::Created(stored) => staged.record(Operation::Create, stored, members),
            RoleMetadataWrite::Updated(stored) => staged.record(Operation::Update, stored, members),
        }
        Ok(())
    }

    async fn stage_policies_added(
        &self,
        tx: &mut dyn MetadataTransaction,
        staged: &mut Staged,
        rules: &[PolicyRule],
        source: Source,
    ) -> Result<()> {
        for rule in rules {
            self.add_policy_row(tx, staged, rule.clone().with_source(source), true)
                .await?;
        }
        Ok(())
    }

    async fn stage_policies_removed(
        &self,
        tx: &mut dyn MetadataTransaction,
        staged: &mut Staged,
        rules: &[PolicyRule],
        source: Source,
    ) -> Result<()> {
        for rule in rules {
            self.remove_policy_row(tx, staged, rule.clone().with_source(source))
                .await?;
        }
        Ok(())
    }

    async fn stage_policies_updated(
        &self,
        tx: &mut dyn MetadataTransaction,
        staged: &mut Staged,
        old_rules: &[PolicyRule],
        new_rules: &[PolicyRule],
        source: Source,
    ) -> Result<()> {
        self.stage_policies_removed(tx, staged, old_rules, source)
            .await?;
        self.stage_policies_added(tx, staged, new_rules, source)
            .await
    }

    async fn stage_grouping_added(
        &self,
        tx: &mut dyn MetadataTransaction,
        staged: &mut Staged,
        assignments: &[RoleAssignment],
        metadata: &RoleMetadata,
    ) -> Result<()> {
        for assignment in assignments {
            self.add_assignment_row(tx, staged, assignment.clone().with_source(metadata.source))
                .await?;
        }
        self.upsert_role(tx, staged, metadata).await
    }

    async fn stage_grouping_updated(
        &self,
        tx: &mut dyn MetadataTransaction,
        staged: &mut Staged,
        old_role: &str,
        old_assignments: &[RoleAssignment],
        new_assignments: &[RoleAssignment],
        metadata: &RoleMetadata,
    ) -> Result<()> {
        let current = tx
            .find_role_metadata(old_role)
            .await?
            .ok_or_else(|| AuthzError::NotFound(format!("metadata for role '{}'", old_role)))?;

        for assignment in old_assignments {
            let sources = self.assignment_sources(staged, assignment);
            if sources.is_empty() {
                return Err(AuthzError::NotFound(format!(
                    "role assignment [{}]",
                    assignment
                )));
            }
            for source in sources {
                self.remove_assignment_row(tx, staged, assignment.clone().with_source(source))
                    .await?;
            }
        }
        for assignment in new_assignments {
            self.add_assignment_row(tx, staged, assignment.clone().with_source(metadata.source))
                .await?;
        }

        let merged = RoleMetadata {
            role_entity_ref: metadata.role_entity_ref.clone(),
            source: metadata.source,
            author: current.author.clone(),
            modified_by: metadata.modified_by.clone(),
            description: metadata
                .description
                .clone()
                .or_else(|| current.description.clone()),
            created_at: current.created_at,
            last_modified: modified_after(current.created_at),
        };
        tx.update_role_metadata(&merged, old_role).await?;

        let members = new_assignments.iter().map(|a| a.member.clone()).collect();
        staged.record(Operation::Update, merged, members);
        Ok(())
    }

    async fn stage_grouping_removed(
        &self,
        tx: &mut dyn MetadataTransaction,
        staged: &mut Staged,
        assignments: &[RoleAssignment],
        metadata: &RoleMetadata,
        is_role_update: bool,
    ) -> Result<()> {
        for assignment in assignments {
            self.remove_assignment_row(tx, staged, assignment.clone().with_source(metadata.source))
                .await?;
        }
        if is_role_update {
            return Ok(());
        }

        let roles: BTreeSet<&str> = assignments.iter().map(|a| a.role.as_str()).collect();
        for role in roles {
            let Some(current) = tx.find_role_metadata(role).await? else {
                continue;
            };
            let remaining = self.remaining_members(staged, role);
            if remaining.is_empty() {
                tx.remove_role_metadata(role).await?;
                let removed = assignments
                    .iter()
                    .filter(|a| a.role == role)
                    .map(|a| a.member.clone())
                    .collect();
                staged.record(Operation::Delete, current, removed);
            } else {
                let updated = RoleMetadata {
                    modified_by: metadata.modified_by.clone(),
                    last_modified: modified_after(current.created_at),
                    ..current
                };
                tx.update_role_metadata(&updated, role).await?;
                staged.record(Operation::Update, updated, remaining);
            }
        }
        Ok(())
    }

    async fn stage_policy_override(
        &self,
        tx: &mut dyn MetadataTransaction,
        staged: &mut Staged,
        rule: &PolicyRule,
        source: Source,
        track_metadata: bool,
    ) -> Result<()> {
        let sources = self.policy_sources(staged, rule);
        if sources.contains(&source) {
            return Ok(());
        }
        for previous in sources {
            self.remove_policy_row(tx, staged, rule.clone().with_source(previous))
                .await?;
        }
        self.add_policy_row(tx, staged, rule.clone().with_source(source), track_metadata)
            .await
    }

    async fn stage_grouping_override(
        &self,
        tx: &mut dyn MetadataTransaction,
        staged: &mut Staged,
        assignment: &RoleAssignment,
        metadata: &RoleMetadata,
    ) -> Result<()> {
        let sources = self.assignment_sources(staged, assignment);
        if sources.contains(&metadata.source) {
            if tx
                .find_role_metadata(&metadata.role_entity_ref)
                .await?
                .is_none()
            {
                tx.create_role_metadata(metadata).await?;
                let members = self.remaining_members(staged, &metadata.role_entity_ref);
                staged.record(Operation::Create, metadata.clone(), members);
            }
            return Ok(());
        }

        for previous in sources {
            self.remove_assignment_row(tx, staged, assignment.clone().with_source(previous))
                .await?;
        }
        self.add_assignment_row(tx, staged, assignment.clone().with_source(metadata.source))
            .await?;
        self.upsert_role(tx, staged, metadata).await
    }

    async fn stage_legacy_replaced(
        &self,
        tx: &mut dyn MetadataTransaction,
        staged: &mut Staged,
        metadata: &RoleMetadata,
    ) -> Result<bool> {
        match tx.find_role_metadata(&metadata.role_entity_ref).await? {
            Some(current) if current.source.is_legacy() => {
                tx.remove_role_metadata(&metadata.role_entity_ref).await?;
                tx.create_role_metadata(metadata).await?;
                let members = self.remaining_members(staged, &metadata.role_entity_ref);
                staged.record(Operation::Update, metadata.clone(), members);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Several delegate writes that commit, and reach the engine, together.
///
/// Dropping a batch without [`commit`](Self::commit) discards its writes.
pub struct PolicyBatch<'a> {
    delegate: &'a PolicyStoreDelegate,
    tx: Box<dyn MetadataTransaction>,
    staged: Staged,
}

impl PolicyStoreDelegate {
    pub async fn batch(&self) -> Result<PolicyBatch<'_>> {
        Ok(PolicyBatch {
            delegate: self,
            tx: self.store.begin().await?,
            staged: Staged::default(),
        })
    }
}

impl PolicyBatch<'_> {
    pub fn has_policy(&self, rule: &PolicyRule, source: Source) -> bool {
        self.delegate
            .policy_present(&self.staged, &rule.clone().with_source(source))
    }

    pub fn has_grouping_policy(&self, assignment: &RoleAssignment, source: Source) -> bool {
        self.delegate
            .assignment_present(&self.staged, &assignment.clone().with_source(source))
    }

    pub async fn remove_policies(&mut self, rules: &[PolicyRule], source: Source) -> Result<()> {
        self.delegate
            .stage_policies_removed(self.tx.as_mut(), &mut self.staged, rules, source)
            .await
    }

    pub async fn remove_grouping_policies(
        &mut self,
        assignments: &[RoleAssignment],
        metadata: &RoleMetadata,
        is_role_update: bool,
    ) -> Result<()> {
        if assignments.is_empty() {
            return Ok(());
        }
        self.delegate
            .stage_grouping_removed(
                self.tx.as_mut(),
                &mut self.staged,
                assignments,
                metadata,
                is_role_update,
            )
            .await
    }

    pub async fn add_or_update_policy(
        &mut self,
        rule: &PolicyRule,
        source: Source,
        track_metadata: bool,
    ) -> Result<()> {
        rule.validate()?;
        self.delegate
            .stage_policy_override(self.tx.as_mut(), &mut self.staged, rule, source, track_metadata)
            .await
    }

    pub async fn add_or_update_grouping_policy(
        &mut self,
        assignment: &RoleAssignment,
        metadata: &RoleMetadata,
    ) -> Result<()> {
        check_role(std::slice::from_ref(assignment), &metadata.role_entity_ref)?;
        assignment.validate()?;
        self.delegate
            .stage_grouping_override(self.tx.as_mut(), &mut self.staged, assignment, metadata)
            .await
    }

    pub async fn commit(self) -> Result<()> {
        self.delegate.finish(self.tx, self.staged, Ok(())).await
    }

    pub async fn rollback(self) {
        if let Err(err) = self.tx.rollback().await {
            error!("Failed to roll back policy batch: {}", err);
        }
    }
}

fn check_role(assignments: &[RoleAssignment], role: &str) -> Result<()> {
    match assignments.iter().find(|a| a.role != role) {
        Some(other) => Err(AuthzError::Validation(format!(
            "role assignment [{}] does not belong to role '{}'",
            other, role
        ))),
        None => Ok(()),
    }
}
