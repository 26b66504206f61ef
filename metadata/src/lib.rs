//! Role and policy metadata store.
//!
//! The store keeps three tables: the persisted rule rows loaded into the rule
//! engine at startup, one metadata row per role, and one shadow row per
//! tracked rule. All writes go through a [`MetadataTransaction`] so a rule and
//! the metadata describing it are committed together.
//!
//! Two backends are provided:
//! - [`SqliteMetadataStore`], durable and transactional.
//! - [`MemoryMetadataStore`], for tests and ephemeral deployments. Its
//!   transactions work on a private copy that is published on commit.

use async_trait::async_trait;

pub mod error;
pub mod memory;
pub mod sqlite;
pub mod types;

pub use error::{MetadataError, Result};
pub use memory::MemoryMetadataStore;
pub use sqlite::SqliteMetadataStore;
pub use types::{
    metadata_string_to_policy, modified_after, now_millis, policy_to_string, PolicyMetadata,
    RoleMetadata, POLICY_FIELD_SEPARATOR, RoleMetadataWrite, RuleKind, RuleRecord, Source,
};

/// Read access plus a way to open a transaction.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn MetadataTransaction>>;

    async fn find_role_metadata(&self, role_entity_ref: &str) -> Result<Option<RoleMetadata>>;

    async fn list_role_metadata(&self) -> Result<Vec<RoleMetadata>>;

    /// Shadow rows for one rule, one per source that holds it.
    async fn find_policy_metadata(&self, policy: &[String]) -> Result<Vec<PolicyMetadata>>;

    async fn find_policy_metadata_by_source(&self, source: Source) -> Result<Vec<PolicyMetadata>>;

    /// Every persisted rule in insertion order.
    async fn load_rules(&self) -> Result<Vec<RuleRecord>>;

    fn backend_name(&self) -> &'static str;
}

/// A unit of work over the store. Dropping it without [`commit`](Self::commit)
/// discards its writes.
#[async_trait]
pub trait MetadataTransaction: Send {
    async fn find_role_metadata(&mut self, role_entity_ref: &str) -> Result<Option<RoleMetadata>>;

    /// Fails with [`MetadataError::Conflict`] when the role already has metadata.
    async fn create_role_metadata(&mut self, metadata: &RoleMetadata) -> Result<i64>;

    /// Replaces the row stored under `old_role_entity_ref`, which may rename it.
    ///
    /// `created_at` is never rewritten and `last_modified` never drops below it.
    /// Fails when the row is missing or its source refuses `metadata.source`.
    async fn update_role_metadata(
        &mut self,
        metadata: &RoleMetadata,
        old_role_entity_ref: &str,
    ) -> Result<()>;

    /// Inserts, or updates when the stored source accepts `metadata.source`.
    ///
    /// An update keeps the stored author, `created_at` and (when the new value
    /// is `None`) description.
    async fn upsert_role_metadata(&mut self, metadata: &RoleMetadata) -> Result<RoleMetadataWrite>;

    async fn remove_role_metadata(&mut self, role_entity_ref: &str) -> Result<()>;

    async fn create_policy_metadata(&mut self, source: Source, policy: &[String]) -> Result<i64>;

    async fn remove_policy_metadata(&mut self, source: Source, policy: &[String]) -> Result<()>;

    async fn insert_rule(&mut self, rule: &RuleRecord) -> Result<()>;

    /// Fails with [`MetadataError::RuleNotFound`] when no row matches.
    async fn delete_rule(&mut self, rule: &RuleRecord) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
