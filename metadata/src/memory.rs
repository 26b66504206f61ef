//! In-memory implementation of the metadata store.
//!
//! # Durability and consistency
//! - **Not durable**: all state is lost on process restart.
//! - A transaction works on a private copy of the tables taken at `begin`.
//!   `commit` publishes the copy only if no other transaction committed writes
//!   in the meantime; otherwise it fails with [`MetadataError::Conflict`].
//!   The second of two concurrent writers therefore has to retry.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use crate::error::{MetadataError, Result};
use crate::types::{
    policy_to_string, PolicyMetadata, RoleMetadata, RoleMetadataWrite, RuleRecord, Source,
};
use crate::{MetadataStore, MetadataTransaction};

#[derive(Debug, Clone, Default)]
struct Tables {
    version: u64,
    next_id: i64,
    roles: Vec<(i64, RoleMetadata)>,
    policies: Vec<PolicyMetadata>,
    rules: Vec<RuleRecord>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn role(&self, role_entity_ref: &str) -> Option<&RoleMetadata> {
        self.roles
            .iter()
            .map(|(_, m)| m)
            .find(|m| m.role_entity_ref == role_entity_ref)
    }

    fn role_mut(&mut self, role_entity_ref: &str) -> Option<&mut RoleMetadata> {
        self.roles
            .iter_mut()
            .map(|(_, m)| m)
            .find(|m| m.role_entity_ref == role_entity_ref)
    }

    fn create_role(&mut self, metadata: &RoleMetadata) -> Result<i64> {
        if self.role(&metadata.role_entity_ref).is_some() {
            return Err(MetadataError::Conflict(format!(
                "metadata for role '{}' already exists",
                metadata.role_entity_ref
            )));
        }
        let mut stored = metadata.clone();
        stored.last_modified = stored.last_modified.max(stored.created_at);
        let id = self.next_id();
        self.roles.push((id, stored));
        Ok(id)
    }

    fn update_role(&mut self, metadata: &RoleMetadata, old_role_entity_ref: &str) -> Result<()> {
        let current = self
            .role(old_role_entity_ref)
            .ok_or_else(|| MetadataError::RoleNotFound(old_role_entity_ref.to_string()))?;
        current.check_source(metadata.source)?;
        let created_at = current.created_at;

        if metadata.role_entity_ref != old_role_entity_ref
            && self.role(&metadata.role_entity_ref).is_some()
        {
            return Err(MetadataError::Conflict(format!(
                "metadata for role '{}' already exists",
                metadata.role_entity_ref
            )));
        }

        if let Some(stored) = self.role_mut(old_role_entity_ref) {
            *stored = RoleMetadata {
                created_at,
                last_modified: metadata.last_modified.max(created_at),
                ..metadata.clone()
            };
        }
        Ok(())
    }

    fn upsert_role(&mut self, metadata: &RoleMetadata) -> Result<RoleMetadataWrite> {
        match self.role_mut(&metadata.role_entity_ref) {
            Some(stored) => {
                stored.check_source(metadata.source)?;
                stored.source = metadata.source;
                stored.modified_by = metadata.modified_by.clone();
                if metadata.description.is_some() {
                    stored.description = metadata.description.clone();
                }
                stored.last_modified = metadata
                    .last_modified
                    .max(stored.created_at + chrono::Duration::milliseconds(1));
                Ok(RoleMetadataWrite::Updated(stored.clone()))
            }
            None => {
                self.create_role(metadata)?;
                let stored = self
                    .role(&metadata.role_entity_ref)
                    .cloned()
                    .ok_or_else(|| MetadataError::RoleNotFound(metadata.role_entity_ref.clone()))?;
                Ok(RoleMetadataWrite::Created(stored))
            }
        }
    }
}

/// Metadata store kept entirely in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryMetadataStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn begin(&self) -> Result<Box<dyn MetadataTransaction>> {
        let working = self.tables.lock().clone();
        Ok(Box::new(MemoryTransaction {
            shared: Arc::clone(&self.tables),
            base_version: working.version,
            working,
            dirty: false,
        }))
    }

    async fn find_role_metadata(&self, role_entity_ref: &str) -> Result<Option<RoleMetadata>> {
        Ok(self.tables.lock().role(role_entity_ref).cloned())
    }

    async fn list_role_metadata(&self) -> Result<Vec<RoleMetadata>> {
        let mut roles: Vec<RoleMetadata> = self
            .tables
            .lock()
            .roles
            .iter()
            .map(|(_, m)| m.clone())
            .collect();
        roles.sort_by(|a, b| a.role_entity_ref.cmp(&b.role_entity_ref));
        Ok(roles)
    }

    async fn find_policy_metadata(&self, policy: &[String]) -> Result<Vec<PolicyMetadata>> {
        let key = policy_to_string(policy);
        Ok(self
            .tables
            .lock()
            .policies
            .iter()
            .filter(|p| p.policy == key)
            .cloned()
            .collect())
    }

    async fn find_policy_metadata_by_source(&self, source: Source) -> Result<Vec<PolicyMetadata>> {
        Ok(self
            .tables
            .lock()
            .policies
            .iter()
            .filter(|p| p.source == source)
            .cloned()
            .collect())
    }

    async fn load_rules(&self) -> Result<Vec<RuleRecord>> {
        Ok(self.tables.lock().rules.clone())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

struct MemoryTransaction {
    shared: Arc<Mutex<Tables>>,
    base_version: u64,
    working: Tables,
    dirty: bool,
}

impl MemoryTransaction {
    fn write(&mut self) -> &mut Tables {
        self.dirty = true;
        &mut self.working
    }
}

#[async_trait]
impl MetadataTransaction for MemoryTransaction {
    async fn find_role_metadata(&mut self, role_entity_ref: &str) -> Result<Option<RoleMetadata>> {
        Ok(self.working.role(role_entity_ref).cloned())
    }

    async fn create_role_metadata(&mut self, metadata: &RoleMetadata) -> Result<i64> {
        self.write().create_role(metadata)
    }

    async fn update_role_metadata(
        &mut self,
        metadata: &RoleMetadata,
        old_role_entity_ref: &str,
    ) -> Result<()> {
        self.write().update_role(metadata, old_role_entity_ref)
    }

    async fn upsert_role_metadata(&mut self, metadata: &RoleMetadata) -> Result<RoleMetadataWrite> {
        self.write().upsert_role(metadata)
    }

    async fn remove_role_metadata(&mut self, role_entity_ref: &str) -> Result<()> {
        self.write()
            .roles
            .retain(|(_, m)| m.role_entity_ref != role_entity_ref);
        Ok(())
    }

    async fn create_policy_metadata(&mut self, source: Source, policy: &[String]) -> Result<i64> {
        let key = policy_to_string(policy);
        let tables = self.write();
        if tables
            .policies
            .iter()
            .any(|p| p.policy == key && p.source == source)
        {
            return Err(MetadataError::Conflict(format!(
                "metadata for policy {} from '{}' already exists",
                key, source
            )));
        }
        let id = tables.next_id();
        tables.policies.push(PolicyMetadata {
            id,
            policy: key,
            source,
        });
        Ok(id)
    }

    async fn remove_policy_metadata(&mut self, source: Source, policy: &[String]) -> Result<()> {
        let key = policy_to_string(policy);
        self.write()
            .policies
            .retain(|p| !(p.policy == key && p.source == source));
        Ok(())
    }

    async fn insert_rule(&mut self, rule: &RuleRecord) -> Result<()> {
        let tables = self.write();
        if tables.rules.contains(rule) {
            return Err(MetadataError::Conflict(format!("rule {} already exists", rule)));
        }
        tables.rules.push(rule.clone());
        Ok(())
    }

    async fn delete_rule(&mut self, rule: &RuleRecord) -> Result<()> {
        let tables = self.write();
        let before = tables.rules.len();
        tables.rules.retain(|r| r != rule);
        if tables.rules.len() == before {
            return Err(MetadataError::RuleNotFound(rule.to_string()));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTransaction {
            shared,
            base_version,
            mut working,
            dirty,
        } = *self;
        if !dirty {
            return Ok(());
        }
        let mut tables = shared.lock();
        if tables.version != base_version {
            return Err(MetadataError::Conflict(
                "the in-memory store was modified by a concurrent transaction".to_string(),
            ));
        }
        working.version = base_version + 1;
        *tables = working;
        debug!("Committed in-memory transaction (version={})", tables.version);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RuleKind;

    fn role(name: &str, source: Source) -> RoleMetadata {
        RoleMetadata::new(format!("role:default/{}", name), source, "user:default/author")
    }

    #[tokio::test]
    async fn test_writes_are_invisible_until_commit() {
        let store = MemoryMetadataStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.create_role_metadata(&role("dev", Source::Rest)).await.unwrap();

        assert!(tx.find_role_metadata("role:default/dev").await.unwrap().is_some());
        assert!(store.find_role_metadata("role:default/dev").await.unwrap().is_none());

        tx.commit().await.unwrap();
        assert!(store.find_role_metadata("role:default/dev").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let store = MemoryMetadataStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.create_policy_metadata(Source::Rest, &["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        tx.rollback().await.unwrap();
        assert!(store
            .find_policy_metadata_by_source(Source::Rest)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_second_concurrent_writer_conflicts() {
        let store = MemoryMetadataStore::new();
        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();

        first.upsert_role_metadata(&role("dev", Source::Rest)).await.unwrap();
        second.upsert_role_metadata(&role("dev", Source::Rest)).await.unwrap();

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();
        assert!(matches!(err, MetadataError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_read_only_transaction_commits_after_concurrent_write() {
        let store = MemoryMetadataStore::new();
        let mut reader = store.begin().await.unwrap();
        let mut writer = store.begin().await.unwrap();
        writer.create_role_metadata(&role("dev", Source::Rest)).await.unwrap();
        writer.commit().await.unwrap();

        assert!(reader.find_role_metadata("role:default/dev").await.unwrap().is_none());
        reader.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_upsert_source_rules() {
        let store = MemoryMetadataStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.create_role_metadata(&role("old", Source::Legacy).with_description("kept"))
            .await
            .unwrap();
        tx.create_role_metadata(&role("cfg", Source::Configuration))
            .await
            .unwrap();

        let claimed = tx.upsert_role_metadata(&role("old", Source::Rest)).await.unwrap();
        assert!(!claimed.is_created());
        assert_eq!(claimed.metadata().source, Source::Rest);
        assert_eq!(claimed.metadata().description.as_deref(), Some("kept"));
        assert!(claimed.metadata().last_modified > claimed.metadata().created_at);

        let err = tx
            .upsert_role_metadata(&role("cfg", Source::Rest))
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::SourceReadOnly { .. }));
    }

    #[tokio::test]
    async fn test_update_rename_keeps_created_at() {
        let store = MemoryMetadataStore::new();
        let original = role("dev", Source::Rest);
        let mut tx = store.begin().await.unwrap();
        tx.create_role_metadata(&original).await.unwrap();

        let mut renamed = role("developers", Source::Rest);
        renamed.author = "user:default/someone".to_string();
        tx.update_role_metadata(&renamed, "role:default/dev").await.unwrap();
        tx.commit().await.unwrap();

        let stored = store
            .find_role_metadata("role:default/developers")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.created_at, original.created_at);
        assert!(store.find_role_metadata("role:default/dev").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rules_keep_insertion_order() {
        let store = MemoryMetadataStore::new();
        let rules: Vec<RuleRecord> = ["a", "b", "c"]
            .iter()
            .map(|m| {
                RuleRecord::new(
                    RuleKind::Grouping,
                    vec![format!("user:default/{}", m), "role:default/r".into(), "rest".into()],
                )
                .unwrap()
            })
            .collect();

        let mut tx = store.begin().await.unwrap();
        for rule in &rules {
            tx.insert_rule(rule).await.unwrap();
        }
        assert!(tx.insert_rule(&rules[0]).await.is_err());
        tx.delete_rule(&rules[1]).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(
            store.load_rules().await.unwrap(),
            vec![rules[0].clone(), rules[2].clone()]
        );
    }
}
