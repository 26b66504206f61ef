use async_trait::async_trait;
use database::Database;
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite, SqlitePool, Transaction};
use tracing::debug;

use crate::error::{MetadataError, Result};
use crate::types::{
    from_millis, policy_to_string, PolicyMetadata, RoleMetadata, RoleMetadataWrite, RuleKind,
    RuleRecord, Source,
};
use crate::{MetadataStore, MetadataTransaction};

const SELECT_ROLE: &str = r#"
    SELECT role_entity_ref, source, author, modified_by, description, created_at, last_modified
    FROM role_metadata
    WHERE role_entity_ref = ?
"#;

// The WHERE clause on the conflict branch is the read-only source guard: a
// row owned by another non-legacy source is left untouched and nothing is
// returned.
const UPSERT_ROLE: &str = r#"
    INSERT INTO role_metadata
        (role_entity_ref, source, author, modified_by, description, created_at, last_modified)
    VALUES (?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT (role_entity_ref) DO UPDATE SET
        source = excluded.source,
        modified_by = excluded.modified_by,
        description = COALESCE(excluded.description, role_metadata.description),
        last_modified = MAX(excluded.last_modified, role_metadata.created_at + 1)
    WHERE role_metadata.source = 'legacy' OR role_metadata.source = excluded.source
    RETURNING role_entity_ref, source, author, modified_by, description, created_at, last_modified
"#;

/// SQLite backed metadata store.
#[derive(Debug, Clone)]
pub struct SqliteMetadataStore {
    pool: SqlitePool,
}

impl SqliteMetadataStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.get_pool(),
        }
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn role_from_row(row: &SqliteRow) -> Result<RoleMetadata> {
    let source: String = row.try_get("source")?;
    Ok(RoleMetadata {
        role_entity_ref: row.try_get("role_entity_ref")?,
        source: source.parse()?,
        author: row.try_get("author")?,
        modified_by: row.try_get("modified_by")?,
        description: row.try_get("description")?,
        created_at: from_millis(row.try_get("created_at")?),
        last_modified: from_millis(row.try_get("last_modified")?),
    })
}

fn policy_from_row(row: &SqliteRow) -> Result<PolicyMetadata> {
    let source: String = row.try_get("source")?;
    Ok(PolicyMetadata {
        id: row.try_get("id")?,
        policy: row.try_get("policy")?,
        source: source.parse()?,
    })
}

fn rule_from_row(row: &SqliteRow) -> Result<RuleRecord> {
    let ptype: String = row.try_get("ptype")?;
    let kind: RuleKind = ptype.parse()?;
    let mut values = Vec::with_capacity(kind.arity());
    for index in 0..kind.arity() {
        let column = format!("v{}", index);
        values.push(row.try_get::<String, _>(column.as_str())?);
    }
    RuleRecord::new(kind, values)
}

async fn select_role<'e, E>(executor: E, role_entity_ref: &str) -> Result<Option<RoleMetadata>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(SELECT_ROLE)
        .bind(role_entity_ref)
        .fetch_optional(executor)
        .await?;
    row.as_ref().map(role_from_row).transpose()
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn begin(&self) -> Result<Box<dyn MetadataTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteTransaction { tx }))
    }

    async fn find_role_metadata(&self, role_entity_ref: &str) -> Result<Option<RoleMetadata>> {
        select_role(&self.pool, role_entity_ref).await
    }

    async fn list_role_metadata(&self) -> Result<Vec<RoleMetadata>> {
        let rows = sqlx::query(
            r#"
            SELECT role_entity_ref, source, author, modified_by, description, created_at, last_modified
            FROM role_metadata
            ORDER BY role_entity_ref
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(role_from_row).collect()
    }

    async fn find_policy_metadata(&self, policy: &[String]) -> Result<Vec<PolicyMetadata>> {
        let rows = sqlx::query("SELECT id, policy, source FROM policy_metadata WHERE policy = ? ORDER BY id")
            .bind(policy_to_string(policy))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(policy_from_row).collect()
    }

    async fn find_policy_metadata_by_source(&self, source: Source) -> Result<Vec<PolicyMetadata>> {
        let rows = sqlx::query("SELECT id, policy, source FROM policy_metadata WHERE source = ? ORDER BY id")
            .bind(source.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(policy_from_row).collect()
    }

    async fn load_rules(&self) -> Result<Vec<RuleRecord>> {
        let rows = sqlx::query("SELECT ptype, v0, v1, v2, v3, v4 FROM rbac_rules ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        let rules = rows
            .iter()
            .map(rule_from_row)
            .collect::<Result<Vec<_>>>()?;
        debug!("Loaded {} rule rows", rules.len());
        Ok(rules)
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

/// An open SQLite transaction. Rolled back on drop unless committed.
pub struct SqliteTransaction {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl MetadataTransaction for SqliteTransaction {
    async fn find_role_metadata(&mut self, role_entity_ref: &str) -> Result<Option<RoleMetadata>> {
        select_role(&mut *self.tx, role_entity_ref).await
    }

    async fn create_role_metadata(&mut self, metadata: &RoleMetadata) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO role_metadata
                (role_entity_ref, source, author, modified_by, description, created_at, last_modified)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&metadata.role_entity_ref)
        .bind(metadata.source.as_str())
        .bind(&metadata.author)
        .bind(&metadata.modified_by)
        .bind(metadata.description.as_deref())
        .bind(metadata.created_at.timestamp_millis())
        .bind(metadata.last_modified.max(metadata.created_at).timestamp_millis())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            MetadataError::from_write(e, || {
                format!("metadata for role '{}'", metadata.role_entity_ref)
            })
        })?;
        Ok(result.last_insert_rowid())
    }

    async fn update_role_metadata(
        &mut self,
        metadata: &RoleMetadata,
        old_role_entity_ref: &str,
    ) -> Result<()> {
        let current = select_role(&mut *self.tx, old_role_entity_ref)
            .await?
            .ok_or_else(|| MetadataError::RoleNotFound(old_role_entity_ref.to_string()))?;
        current.check_source(metadata.source)?;

        let last_modified = metadata.last_modified.max(current.created_at);
        sqlx::query(
            r#"
            UPDATE role_metadata
            SET role_entity_ref = ?, source = ?, author = ?, modified_by = ?,
                description = ?, last_modified = ?
            WHERE role_entity_ref = ?
            "#,
        )
        .bind(&metadata.role_entity_ref)
        .bind(metadata.source.as_str())
        .bind(&metadata.author)
        .bind(&metadata.modified_by)
        .bind(metadata.description.as_deref())
        .bind(last_modified.timestamp_millis())
        .bind(old_role_entity_ref)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            MetadataError::from_write(e, || {
                format!("metadata for role '{}'", metadata.role_entity_ref)
            })
        })?;
        Ok(())
    }

    async fn upsert_role_metadata(&mut self, metadata: &RoleMetadata) -> Result<RoleMetadataWrite> {
        let existing = select_role(&mut *self.tx, &metadata.role_entity_ref).await?;
        if let Some(current) = &existing {
            current.check_source(metadata.source)?;
        }

        let row = sqlx::query(UPSERT_ROLE)
            .bind(&metadata.role_entity_ref)
            .bind(metadata.source.as_str())
            .bind(&metadata.author)
            .bind(&metadata.modified_by)
            .bind(metadata.description.as_deref())
            .bind(metadata.created_at.timestamp_millis())
            .bind(metadata.last_modified.max(metadata.created_at).timestamp_millis())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| {
                MetadataError::from_write(e, || {
                    format!("metadata for role '{}'", metadata.role_entity_ref)
                })
            })?
            .ok_or_else(|| {
                MetadataError::Conflict(format!(
                    "metadata for role '{}' changed during upsert",
                    metadata.role_entity_ref
                ))
            })?;

        let stored = role_from_row(&row)?;
        debug!(
            "Upserted metadata for role={} source={}",
            stored.role_entity_ref, stored.source
        );
        if existing.is_some() {
            Ok(RoleMetadataWrite::Updated(stored))
        } else {
            Ok(RoleMetadataWrite::Created(stored))
        }
    }

    async fn remove_role_metadata(&mut self, role_entity_ref: &str) -> Result<()> {
        sqlx::query("DELETE FROM role_metadata WHERE role_entity_ref = ?")
            .bind(role_entity_ref)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                MetadataError::from_write(e, || format!("metadata for role '{}'", role_entity_ref))
            })?;
        Ok(())
    }

    async fn create_policy_metadata(&mut self, source: Source, policy: &[String]) -> Result<i64> {
        let key = policy_to_string(policy);
        let result = sqlx::query("INSERT INTO policy_metadata (policy, source) VALUES (?, ?)")
            .bind(&key)
            .bind(source.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                MetadataError::from_write(e, || format!("metadata for policy {} from '{}'", key, source))
            })?;
        Ok(result.last_insert_rowid())
    }

    async fn remove_policy_metadata(&mut self, source: Source, policy: &[String]) -> Result<()> {
        let key = policy_to_string(policy);
        sqlx::query("DELETE FROM policy_metadata WHERE policy = ? AND source = ?")
            .bind(&key)
            .bind(source.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                MetadataError::from_write(e, || format!("metadata for policy {} from '{}'", key, source))
            })?;
        Ok(())
    }

    async fn insert_rule(&mut self, rule: &RuleRecord) -> Result<()> {
        let [v0, v1, v2, v3, v4] = rule.columns();
        sqlx::query("INSERT INTO rbac_rules (ptype, v0, v1, v2, v3, v4) VALUES (?, ?, ?, ?, ?, ?)")
            .bind(rule.kind.as_str())
            .bind(v0)
            .bind(v1)
            .bind(v2)
            .bind(v3)
            .bind(v4)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| MetadataError::from_write(e, || format!("rule {}", rule)))?;
        Ok(())
    }

    async fn delete_rule(&mut self, rule: &RuleRecord) -> Result<()> {
        let [v0, v1, v2, v3, v4] = rule.columns();
        let result = sqlx::query(
            r#"
            DELETE FROM rbac_rules
            WHERE ptype = ? AND v0 = ? AND v1 = ? AND v2 = ? AND v3 = ? AND v4 = ?
            "#,
        )
        .bind(rule.kind.as_str())
        .bind(v0)
        .bind(v1)
        .bind(v2)
        .bind(v3)
        .bind(v4)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| MetadataError::from_write(e, || format!("rule {}", rule)))?;

        if result.rows_affected() == 0 {
            return Err(MetadataError::RuleNotFound(rule.to_string()));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| MetadataError::from_write(e, || "transaction".to_string()))?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
