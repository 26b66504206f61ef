//! Request and decision shapes for the decision handler.

use serde::{Deserialize, Serialize};

use crate::conditional::ConditionalDecision;
use crate::types::USE_ACTION;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

/// A permission being checked. Resource permissions carry the resource type
/// their rules are written against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub name: String,
    #[serde(default)]
    pub attributes: PermissionAttributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
}

impl Permission {
    pub fn basic(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: PermissionAttributes::default(),
            resource_type: None,
        }
    }

    pub fn resource(name: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: Some(resource_type.into()),
            ..Self::basic(name)
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.attributes.action = Some(action.into());
        self
    }

    pub fn is_resource(&self) -> bool {
        self.resource_type.is_some()
    }

    /// Declared action, or `use` when there is none.
    pub fn action(&self) -> &str {
        self.attributes.action.as_deref().unwrap_or(USE_ACTION)
    }

    /// The value matched against the permission field of policy rules.
    pub fn key(&self) -> &str {
        self.resource_type.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyQuery {
    pub permission: Permission,
}

impl PolicyQuery {
    pub fn new(permission: Permission) -> Self {
        Self { permission }
    }
}

/// The resolved caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_entity_ref: String,
    #[serde(default)]
    pub ownership_entity_refs: Vec<String>,
}

impl Identity {
    pub fn new(user_entity_ref: impl Into<String>) -> Self {
        let user_entity_ref = user_entity_ref.into();
        Self {
            ownership_entity_refs: vec![user_entity_ref.clone()],
            user_entity_ref,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuthorizeResult {
    Allow,
    Deny,
    Conditional,
}

/// Outcome of a decision. Serialises as `{"result": "ALLOW"}` and so on, with
/// the conditional decision's fields inlined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "UPPERCASE")]
pub enum PolicyDecision {
    Allow,
    Deny,
    Conditional(ConditionalDecision),
}

impl PolicyDecision {
    pub fn result(&self) -> AuthorizeResult {
        match self {
            PolicyDecision::Allow => AuthorizeResult::Allow,
            PolicyDecision::Deny => AuthorizeResult::Deny,
            PolicyDecision::Conditional(_) => AuthorizeResult::Conditional,
        }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, PolicyDecision::Allow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_permission_key_and_action() {
        let basic = Permission::basic("policy.entity.read");
        assert_eq!(basic.key(), "policy.entity.read");
        assert_eq!(basic.action(), "use");
        assert!(!basic.is_resource());

        let resource = Permission::resource("catalog.entity.read", "catalog-entity")
            .with_action("read");
        assert_eq!(resource.key(), "catalog-entity");
        assert_eq!(resource.action(), "read");
        assert!(resource.is_resource());
    }

    #[test]
    fn test_permission_from_json() {
        let permission: Permission = serde_json::from_value(json!({
            "name": "catalog.entity.delete",
            "attributes": { "action": "delete" },
            "resourceType": "catalog-entity"
        }))
        .unwrap();
        assert_eq!(permission.key(), "catalog-entity");
        assert_eq!(permission.action(), "delete");

        let bare: Permission = serde_json::from_value(json!({ "name": "x" })).unwrap();
        assert_eq!(bare.action(), USE_ACTION);
    }

    #[test]
    fn test_decision_serialisation() {
        assert_eq!(
            serde_json::to_value(PolicyDecision::Allow).unwrap(),
            json!({ "result": "ALLOW" })
        );
        let conditional = PolicyDecision::Conditional(ConditionalDecision {
            plugin_id: "catalog".into(),
            resource_type: "catalog-entity".into(),
            conditions: json!({ "rule": "IS_ENTITY_OWNER" }),
        });
        let value = serde_json::to_value(&conditional).unwrap();
        assert_eq!(value["result"], "CONDITIONAL");
        assert_eq!(value["pluginId"], "catalog");
        assert_eq!(conditional.result(), AuthorizeResult::Conditional);
        assert!(!conditional.is_allow());
        assert!(PolicyDecision::Allow.is_allow());
    }
}
