use thiserror::Error;

use crate::types::Source;

pub type Result<T> = std::result::Result<T, MetadataError>;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("The RoleMetadata.source field is 'read-only': role '{role}' belongs to '{current}' and cannot be written by '{requested}'")]
    SourceReadOnly {
        role: String,
        current: Source,
        requested: Source,
    },

    #[error("A metadata for role '{0}' was not found")]
    RoleNotFound(String),

    #[error("Rule not found: {0}")]
    RuleNotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

impl MetadataError {
    /// Maps a failed write inside a transaction.
    ///
    /// Unique-constraint failures and lost write races (`SQLITE_BUSY`,
    /// `SQLITE_LOCKED` and their extended codes such as `BUSY_SNAPSHOT`)
    /// become [`MetadataError::Conflict`]; everything else stays a database
    /// error.
    pub(crate) fn from_write(err: sqlx::Error, what: impl FnOnce() -> String) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                MetadataError::Conflict(format!("{} already exists", what()))
            }
            sqlx::Error::Database(db) if is_write_contention(db.code().as_deref()) => {
                MetadataError::Conflict(format!(
                    "{} was changed by a concurrent transaction",
                    what()
                ))
            }
            _ => MetadataError::Database(err),
        }
    }
}

/// SQLite result codes carry the primary code in the low byte.
fn is_write_contention(code: Option<&str>) -> bool {
    const SQLITE_BUSY: i32 = 5;
    const SQLITE_LOCKED: i32 = 6;

    code.and_then(|c| c.parse::<i32>().ok())
        .map(|c| matches!(c & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
        .unwrap_or(false)
}
