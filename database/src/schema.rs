//! Table definitions for the rule and metadata store.
//!
//! Timestamps are stored as milliseconds since the Unix epoch. Rule rows keep
//! up to five positional values; unused trailing columns hold an empty string
//! so the uniqueness constraint covers every rule shape.

pub const CREATE_RBAC_RULES: &str = r#"
    CREATE TABLE IF NOT EXISTS rbac_rules (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        ptype TEXT NOT NULL,
        v0 TEXT NOT NULL DEFAULT '',
        v1 TEXT NOT NULL DEFAULT '',
        v2 TEXT NOT NULL DEFAULT '',
        v3 TEXT NOT NULL DEFAULT '',
        v4 TEXT NOT NULL DEFAULT '',
        UNIQUE (ptype, v0, v1, v2, v3, v4)
    )
"#;

pub const CREATE_ROLE_METADATA: &str = r#"
    CREATE TABLE IF NOT EXISTS role_metadata (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        role_entity_ref TEXT NOT NULL UNIQUE,
        source TEXT NOT NULL,
        author TEXT NOT NULL,
        modified_by TEXT NOT NULL,
        description TEXT,
        created_at INTEGER NOT NULL,
        last_modified INTEGER NOT NULL
    )
"#;

pub const CREATE_POLICY_METADATA: &str = r#"
    CREATE TABLE IF NOT EXISTS policy_metadata (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        policy TEXT NOT NULL,
        source TEXT NOT NULL,
        UNIQUE (policy, source)
    )
"#;

pub const CREATE_POLICY_METADATA_SOURCE_INDEX: &str = r#"
    CREATE INDEX IF NOT EXISTS idx_policy_metadata_source
    ON policy_metadata (source)
"#;

/// Statements run in order by [`crate::Database::migrate`].
pub const STATEMENTS: [&str; 4] = [
    CREATE_RBAC_RULES,
    CREATE_ROLE_METADATA,
    CREATE_POLICY_METADATA,
    CREATE_POLICY_METADATA_SOURCE_INDEX,
];
