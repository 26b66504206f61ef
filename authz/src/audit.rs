//! Role lifecycle audit events.
//!
//! Events are emitted as `tracing` records on the `audit` target so a
//! subscriber can route them separately from diagnostics.

use metadata::RoleMetadata;
use serde::Serialize;
use tracing::info;

pub const AUDIT_TARGET: &str = "audit";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn event_name(&self) -> &'static str {
        match self {
            Operation::Create => "CreateRole",
            Operation::Update => "UpdateRole",
            Operation::Delete => "DeleteRole",
        }
    }

    fn verb(&self) -> &'static str {
        match self {
            Operation::Create => "Created",
            Operation::Update => "Updated",
            Operation::Delete => "Deleted",
        }
    }
}

/// Payload recorded for one role change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAuditInfo {
    pub role_entity_ref: String,
    pub description: String,
    pub members: Vec<String>,
    pub source: String,
    pub operation: Operation,
}

impl RoleAuditInfo {
    pub fn new(operation: Operation, metadata: &RoleMetadata, members: Vec<String>) -> Self {
        Self {
            role_entity_ref: metadata.role_entity_ref.clone(),
            description: metadata.description.clone().unwrap_or_default(),
            members,
            source: metadata.source.to_string(),
            operation,
        }
    }

    pub fn message(&self) -> String {
        format!("{} '{}'", self.operation.verb(), self.role_entity_ref)
    }
}

pub fn log_role_event(operation: Operation, metadata: &RoleMetadata, members: Vec<String>) {
    let audit = RoleAuditInfo::new(operation, metadata, members);
    info!(
        target: AUDIT_TARGET,
        event = operation.event_name(),
        stage = "metadata",
        actor = %metadata.modified_by,
        role = %audit.role_entity_ref,
        source = %audit.source,
        members = ?audit.members,
        "{}",
        audit.message()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use metadata::Source;

    #[test]
    fn test_audit_info() {
        let metadata = RoleMetadata::new("role:default/dev", Source::Rest, "user:default/tom");
        let info = RoleAuditInfo::new(
            Operation::Delete,
            &metadata,
            vec!["user:default/amy".to_string()],
        );

        assert_eq!(info.message(), "Deleted 'role:default/dev'");
        assert_eq!(info.operation.event_name(), "DeleteRole");
        assert_eq!(info.description, "");

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["roleEntityRef"], "role:default/dev");
        assert_eq!(json["operation"], "DELETE");
        assert_eq!(json["source"], "rest");
    }
}
