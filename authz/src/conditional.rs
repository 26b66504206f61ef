//! Conditional-decision store.
//!
//! A conditional decision replaces a plain allow for a resource type with a
//! set of conditions the calling plugin evaluates itself.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalDecision {
    pub plugin_id: String,
    pub resource_type: String,
    pub conditions: serde_json::Value,
}

#[async_trait]
pub trait ConditionalStorage: Send + Sync {
    async fn find_condition(&self, resource_type: &str) -> Result<Option<ConditionalDecision>>;
}

/// Keeps one decision per resource type.
#[derive(Default)]
pub struct MemoryConditionalStorage {
    conditions: RwLock<HashMap<String, ConditionalDecision>>,
}

impl MemoryConditionalStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `decision`, returning the one it replaced.
    pub fn insert(&self, decision: ConditionalDecision) -> Option<ConditionalDecision> {
        self.conditions
            .write()
            .insert(decision.resource_type.clone(), decision)
    }

    pub fn remove(&self, resource_type: &str) -> Option<ConditionalDecision> {
        self.conditions.write().remove(resource_type)
    }
}

#[async_trait]
impl ConditionalStorage for MemoryConditionalStorage {
    async fn find_condition(&self, resource_type: &str) -> Result<Option<ConditionalDecision>> {
        Ok(self.conditions.read().get(resource_type).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_storage() {
        let storage = MemoryConditionalStorage::new();
        assert!(storage.find_condition("catalog-entity").await.unwrap().is_none());

        let decision = ConditionalDecision {
            plugin_id: "catalog".into(),
            resource_type: "catalog-entity".into(),
            conditions: json!({ "rule": "IS_ENTITY_OWNER", "params": { "claims": [] } }),
        };
        assert!(storage.insert(decision.clone()).is_none());
        assert_eq!(
            storage.find_condition("catalog-entity").await.unwrap(),
            Some(decision.clone())
        );
        assert_eq!(storage.remove("catalog-entity"), Some(decision));
        assert!(storage.find_condition("catalog-entity").await.unwrap().is_none());
    }
}
