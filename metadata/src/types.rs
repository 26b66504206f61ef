//! Records kept alongside the rule engine.
//!
//! Every role that appears in a grouping fact owns exactly one [`RoleMetadata`]
//! row. Individual permission and grouping facts get a [`PolicyMetadata`] shadow
//! row naming the source that wrote them, keyed by the canonical
//! `"[a, b, c, d]"` rendering of the fact.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{MetadataError, Result};

/// Origin of a rule or role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    /// Written through the administrative API.
    Rest,
    /// Loaded from the predefined policy file.
    CsvFile,
    /// Derived from the service configuration (admin users).
    Configuration,
    /// Created before sources were tracked. Any other source may claim it.
    Legacy,
}

impl Source {
    pub const ALL: [Source; 4] = [
        Source::Rest,
        Source::CsvFile,
        Source::Configuration,
        Source::Legacy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Rest => "rest",
            Source::CsvFile => "csv-file",
            Source::Configuration => "configuration",
            Source::Legacy => "legacy",
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, Source::Legacy)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = MetadataError;

    fn from_str(s: &str) -> Result<Self> {
        Source::ALL
            .into_iter()
            .find(|source| source.as_str() == s)
            .ok_or_else(|| MetadataError::InvalidRecord(format!("unknown source '{}'", s)))
    }
}

/// Current time truncated to the millisecond precision the store keeps.
pub fn now_millis() -> DateTime<Utc> {
    from_millis(Utc::now().timestamp_millis())
}

pub(crate) fn from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_default()
}

/// A modification time that is strictly later than `created_at`.
pub fn modified_after(created_at: DateTime<Utc>) -> DateTime<Utc> {
    now_millis().max(created_at + Duration::milliseconds(1))
}

/// Descriptive record for a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleMetadata {
    pub role_entity_ref: String,
    pub source: Source,
    pub author: String,
    pub modified_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl RoleMetadata {
    /// Metadata for a role created now by `author`.
    pub fn new(role_entity_ref: impl Into<String>, source: Source, author: impl Into<String>) -> Self {
        let author = author.into();
        let now = now_millis();
        Self {
            role_entity_ref: role_entity_ref.into(),
            source,
            modified_by: author.clone(),
            author,
            description: None,
            created_at: now,
            last_modified: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_modified_by(mut self, modified_by: impl Into<String>) -> Self {
        self.modified_by = modified_by.into();
        self
    }

    /// Whether a writer tagged `source` may take this role over.
    pub fn accepts_source(&self, source: Source) -> bool {
        self.source.is_legacy() || self.source == source
    }

    /// Rejects a write from `source` unless [`Self::accepts_source`] allows it.
    pub fn check_source(&self, source: Source) -> Result<()> {
        if self.accepts_source(source) {
            Ok(())
        } else {
            Err(MetadataError::SourceReadOnly {
                role: self.role_entity_ref.clone(),
                current: self.source,
                requested: source,
            })
        }
    }
}

/// Shadow row tagging one rule with the source that wrote it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyMetadata {
    pub id: i64,
    pub policy: String,
    pub source: Source,
}

impl PolicyMetadata {
    /// The positional fields encoded in [`Self::policy`].
    pub fn fields(&self) -> Vec<String> {
        metadata_string_to_policy(&self.policy)
    }
}

/// Joins the fields of a canonical policy key. Fields containing it do not
/// survive [`metadata_string_to_policy`], so rules carrying one are rejected
/// before they are written.
pub const POLICY_FIELD_SEPARATOR: &str = ", ";

/// Canonical `"[a, b, c]"` key for a rule's fields.
pub fn policy_to_string(fields: &[String]) -> String {
    format!("[{}]", fields.join(POLICY_FIELD_SEPARATOR))
}

/// Inverse of [`policy_to_string`].
pub fn metadata_string_to_policy(policy: &str) -> Vec<String> {
    let inner = policy
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']');
    if inner.is_empty() {
        return Vec::new();
    }
    inner
        .split(POLICY_FIELD_SEPARATOR)
        .map(str::to_string)
        .collect()
}

/// Kind of persisted rule row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    /// `(subject, permission, action, effect, source)`
    Policy,
    /// `(member, role, source)`
    Grouping,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::Policy => "p",
            RuleKind::Grouping => "g",
        }
    }

    /// Number of positional values a row of this kind carries.
    pub fn arity(&self) -> usize {
        match self {
            RuleKind::Policy => 5,
            RuleKind::Grouping => 3,
        }
    }
}

impl FromStr for RuleKind {
    type Err = MetadataError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "p" => Ok(RuleKind::Policy),
            "g" => Ok(RuleKind::Grouping),
            other => Err(MetadataError::InvalidRecord(format!(
                "unknown rule type '{}'",
                other
            ))),
        }
    }
}

/// A persisted rule, source included as the trailing value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleRecord {
    pub kind: RuleKind,
    pub values: Vec<String>,
}

impl RuleRecord {
    pub fn new(kind: RuleKind, values: Vec<String>) -> Result<Self> {
        if values.len() != kind.arity() {
            return Err(MetadataError::InvalidRecord(format!(
                "rule type '{}' takes {} values, got {}",
                kind.as_str(),
                kind.arity(),
                values.len()
            )));
        }
        Ok(Self { kind, values })
    }

    /// Values padded to the five storage columns.
    pub(crate) fn columns(&self) -> [&str; 5] {
        let mut columns = [""; 5];
        for (slot, value) in columns.iter_mut().zip(&self.values) {
            *slot = value.as_str();
        }
        columns
    }
}

impl fmt::Display for RuleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.as_str(), policy_to_string(&self.values))
    }
}

/// Result of [`crate::MetadataTransaction::upsert_role_metadata`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleMetadataWrite {
    Created(RoleMetadata),
    Updated(RoleMetadata),
}

impl RoleMetadataWrite {
    pub fn metadata(&self) -> &RoleMetadata {
        match self {
            RoleMetadataWrite::Created(m) | RoleMetadataWrite::Updated(m) => m,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, RoleMetadataWrite::Created(_))
    }
}
