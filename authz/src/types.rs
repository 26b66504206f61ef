//! Core rule types.
//!
//! A [`PolicyRule`] grants or denies `action` on a permission (or resource
//! type) to a subject. A [`RoleAssignment`] makes a user or group a member of
//! a role. Both are stored together with the [`Source`] that wrote them; the
//! same tuple may exist once per source.
//!
//! # Entity references
//! Subjects, members and roles are entity references of the form
//! `kind:namespace/name`. The namespace defaults to `default` when omitted.
//! Policy subjects and assignment members must be `user` or `group`
//! references (policy subjects may also be `role` references), and assignment
//! roles must be `role` references.

use metadata::{RuleKind, RuleRecord, POLICY_FIELD_SEPARATOR};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{AuthzError, Result};

pub use metadata::Source;

/// Action assumed when a permission does not declare one.
pub const USE_ACTION: &str = "use";

/// Effect of a matching policy rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Effect::Allow => "allow",
            Effect::Deny => "deny",
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Effect {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "allow" => Ok(Effect::Allow),
            "deny" => Ok(Effect::Deny),
            other => Err(AuthzError::Validation(format!(
                "'effect' has invalid value: '{}'. It should be: 'allow' or 'deny'",
                other
            ))),
        }
    }
}

/// A parsed `kind:namespace/name` reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityRef {
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl EntityRef {
    pub fn is_user(&self) -> bool {
        self.kind == "user"
    }

    pub fn is_group(&self) -> bool {
        self.kind == "group"
    }

    pub fn is_role(&self) -> bool {
        self.kind == "role"
    }
}

impl FromStr for EntityRef {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().is_empty() {
            return Err(AuthzError::Validation(
                "'entityReference' must not be empty".to_string(),
            ));
        }
        let (kind, rest) = s.split_once(':').ok_or_else(|| {
            AuthzError::Validation(format!(
                "Entity reference \"{}\" had missing or empty kind (e.g. did not start with \"component:\" or similar)",
                s
            ))
        })?;
        let (namespace, name) = rest.split_once('/').unwrap_or(("default", rest));

        if kind.is_empty() || namespace.is_empty() || name.is_empty() || name.contains('/') {
            return Err(AuthzError::Validation(format!(
                "Entity reference \"{}\" was not on the form [<kind>:][<namespace>/]<name>",
                s
            )));
        }
        Ok(Self {
            kind: kind.to_lowercase(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.kind, self.namespace, self.name)
    }
}

/// True if `reference` names a group.
pub fn is_group_ref(reference: &str) -> bool {
    reference.starts_with("group:")
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AuthzError::Validation(format!(
            "'{}' field must not be empty",
            field
        )));
    }
    storable(field, value)
}

fn storable(field: &str, value: &str) -> Result<()> {
    if value.contains(POLICY_FIELD_SEPARATOR) {
        return Err(AuthzError::Validation(format!(
            "'{}' field must not contain '{}'",
            field, POLICY_FIELD_SEPARATOR
        )));
    }
    Ok(())
}

/// `(subject, permission, action, effect)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyRule {
    pub subject: String,
    pub permission: String,
    pub action: String,
    pub effect: Effect,
}

impl PolicyRule {
    pub fn new(
        subject: impl Into<String>,
        permission: impl Into<String>,
        action: impl Into<String>,
        effect: Effect,
    ) -> Self {
        Self {
            subject: subject.into(),
            permission: permission.into(),
            action: action.into(),
            effect,
        }
    }

    pub fn allow(
        subject: impl Into<String>,
        permission: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self::new(subject, permission, action, Effect::Allow)
    }

    pub fn from_fields(fields: &[String]) -> Result<Self> {
        match fields {
            [subject, permission, action, effect] => Ok(Self::new(
                subject.clone(),
                permission.clone(),
                action.clone(),
                effect.parse()?,
            )),
            _ => Err(AuthzError::Validation(format!(
                "a policy takes 4 fields, got {}",
                fields.len()
            ))),
        }
    }

    pub fn fields(&self) -> Vec<String> {
        vec![
            self.subject.clone(),
            self.permission.clone(),
            self.action.clone(),
            self.effect.as_str().to_string(),
        ]
    }

    pub fn validate(&self) -> Result<()> {
        let subject: EntityRef = self.subject.parse()?;
        if !(subject.is_user() || subject.is_group() || subject.is_role()) {
            return Err(AuthzError::Validation(format!(
                "policy subject '{}' must be a user, group or role reference",
                self.subject
            )));
        }
        storable("subject", &self.subject)?;
        require("permission", &self.permission)?;
        require("action", &self.action)
    }

    pub fn with_source(self, source: Source) -> SourcedPolicy {
        SourcedPolicy { rule: self, source }
    }
}

impl fmt::Display for PolicyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}, {}, {}",
            self.subject, self.permission, self.action, self.effect
        )
    }
}

/// `(member, role)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub member: String,
    pub role: String,
}

impl RoleAssignment {
    pub fn new(member: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            member: member.into(),
            role: role.into(),
        }
    }

    pub fn from_fields(fields: &[String]) -> Result<Self> {
        match fields {
            [member, role] => Ok(Self::new(member.clone(), role.clone())),
            _ => Err(AuthzError::Validation(format!(
                "a role assignment takes 2 fields, got {}",
                fields.len()
            ))),
        }
    }

    pub fn fields(&self) -> Vec<String> {
        vec![self.member.clone(), self.role.clone()]
    }

    pub fn validate(&self) -> Result<()> {
        let member: EntityRef = self.member.parse()?;
        if !(member.is_user() || member.is_group()) {
            return Err(AuthzError::Validation(format!(
                "role member '{}' must be a user or group reference",
                self.member
            )));
        }
        let role: EntityRef = self.role.parse()?;
        if !role.is_role() {
            return Err(AuthzError::Validation(format!(
                "'{}' must be a role reference (role:<namespace>/<name>)",
                self.role
            )));
        }
        storable("member", &self.member)?;
        storable("role", &self.role)
    }

    pub fn with_source(self, source: Source) -> SourcedAssignment {
        SourcedAssignment {
            assignment: self,
            source,
        }
    }
}

impl fmt::Display for RoleAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.member, self.role)
    }
}

/// A policy rule as stored, with its source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourcedPolicy {
    #[serde(flatten)]
    pub rule: PolicyRule,
    pub source: Source,
}

impl SourcedPolicy {
    /// Rule fields followed by the source.
    pub fn fields(&self) -> Vec<String> {
        let mut fields = self.rule.fields();
        fields.push(self.source.as_str().to_string());
        fields
    }

    pub fn record(&self) -> Result<RuleRecord> {
        RuleRecord::new(RuleKind::Policy, self.fields()).map_err(Into::into)
    }

    pub fn from_record(record: &RuleRecord) -> Result<Self> {
        match record.values.split_last() {
            Some((source, fields)) if record.kind == RuleKind::Policy => Ok(Self {
                rule: PolicyRule::from_fields(fields)?,
                source: source.parse()?,
            }),
            _ => Err(AuthzError::Validation(format!(
                "'{}' is not a policy row",
                record
            ))),
        }
    }
}

/// A role assignment as stored, with its source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourcedAssignment {
    #[serde(flatten)]
    pub assignment: RoleAssignment,
    pub source: Source,
}

impl SourcedAssignment {
    /// Assignment fields followed by the source.
    pub fn fields(&self) -> Vec<String> {
        let mut fields = self.assignment.fields();
        fields.push(self.source.as_str().to_string());
        fields
    }

    pub fn record(&self) -> Result<RuleRecord> {
        RuleRecord::new(RuleKind::Grouping, self.fields()).map_err(Into::into)
    }

    pub fn from_record(record: &RuleRecord) -> Result<Self> {
        match record.values.split_last() {
            Some((source, fields)) if record.kind == RuleKind::Grouping => Ok(Self {
                assignment: RoleAssignment::from_fields(fields)?,
                source: source.parse()?,
            }),
            _ => Err(AuthzError::Validation(format!(
                "'{}' is not a grouping row",
                record
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("user:default/tom", "user", "default", "tom")]
    #[case("group:team-a", "group", "default", "team-a")]
    #[case("role:ops/admins", "role", "ops", "admins")]
    fn test_entity_ref_parsing(
        #[case] input: &str,
        #[case] kind: &str,
        #[case] namespace: &str,
        #[case] name: &str,
    ) {
        let entity: EntityRef = input.parse().unwrap();
        assert_eq!(entity.kind, kind);
        assert_eq!(entity.namespace, namespace);
        assert_eq!(entity.name, name);
    }

    #[rstest]
    #[case("")]
    #[case("tom")]
    #[case(":default/tom")]
    #[case("user:default/")]
    #[case("user:/tom")]
    #[case("user:a/b/c")]
    fn test_invalid_entity_refs(#[case] input: &str) {
        assert!(input.parse::<EntityRef>().is_err());
    }

    #[test]
    fn test_effect_is_lowercase_only() {
        assert_eq!("allow".parse::<Effect>().unwrap(), Effect::Allow);
        assert_eq!("deny".parse::<Effect>().unwrap(), Effect::Deny);
        assert!("Allow".parse::<Effect>().is_err());
    }

    #[test]
    fn test_policy_validation() {
        assert!(PolicyRule::allow("role:default/dev", "catalog-entity", "read")
            .validate()
            .is_ok());
        assert!(PolicyRule::allow("component:default/x", "catalog-entity", "read")
            .validate()
            .is_err());
        assert!(PolicyRule::allow("user:default/tom", "", "read")
            .validate()
            .is_err());
        let err = PolicyRule::allow("user:default/tom", "catalog-entity", " ")
            .validate()
            .unwrap_err();
        assert_eq!(err.to_string(), "Validation failed: 'action' field must not be empty");
    }

    #[rstest]
    #[case(PolicyRule::allow("user:default/tom, jerry", "catalog-entity", "read"), "subject")]
    #[case(PolicyRule::allow("user:default/tom", "catalog-entity, policy-entity", "read"), "permission")]
    #[case(PolicyRule::allow("user:default/tom", "catalog-entity", "read, delete"), "action")]
    fn test_policy_fields_must_survive_metadata_keys(#[case] rule: PolicyRule, #[case] field: &str) {
        let err = rule.validate().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
        assert!(err.to_string().contains(&format!("'{}' field must not contain", field)), "{}", err);
    }

    #[test]
    fn test_assignment_validation() {
        assert!(RoleAssignment::new("user:default/tom", "role:default/dev")
            .validate()
            .is_ok());
        assert!(RoleAssignment::new("group:default/team", "role:default/dev")
            .validate()
            .is_ok());
        assert!(RoleAssignment::new("role:default/x", "role:default/dev")
            .validate()
            .is_err());
        assert!(RoleAssignment::new("user:default/tom", "group:default/dev")
            .validate()
            .is_err());
        assert!(RoleAssignment::new("user:default/tom, jerry", "role:default/dev")
            .validate()
            .is_err());
    }

    #[test]
    fn test_sourced_records() {
        let policy = PolicyRule::allow("role:default/dev", "catalog-entity", "read")
            .with_source(Source::CsvFile);
        let record = policy.record().unwrap();
        assert_eq!(record.values.last().map(String::as_str), Some("csv-file"));
        assert_eq!(SourcedPolicy::from_record(&record).unwrap(), policy);
        assert!(SourcedAssignment::from_record(&record).is_err());

        let assignment =
            RoleAssignment::new("user:default/tom", "role:default/dev").with_source(Source::Rest);
        let record = assignment.record().unwrap();
        assert_eq!(SourcedAssignment::from_record(&record).unwrap(), assignment);
    }
}
