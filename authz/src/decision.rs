//! Authorization decision handler.
//!
//! Turns a permission query and an optional identity into a decision. Every
//! error raised while deciding is logged and answered with a deny.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info};

use crate::conditional::ConditionalStorage;
use crate::delegate::PolicyStoreDelegate;
use crate::engine::RuleEngine;
use crate::error::Result;
use crate::permission::{Identity, PolicyDecision, PolicyQuery};

/// Answers `enforce(subject, key, action)`.
#[async_trait]
pub trait PolicyEnforcer: Send + Sync {
    async fn enforce(&self, subject: &str, key: &str, action: &str) -> Result<bool>;
}

#[async_trait]
impl PolicyEnforcer for PolicyStoreDelegate {
    async fn enforce(&self, subject: &str, key: &str, action: &str) -> Result<bool> {
        PolicyStoreDelegate::enforce(self, subject, key, action).await
    }
}

#[async_trait]
impl PolicyEnforcer for RuleEngine {
    async fn enforce(&self, subject: &str, key: &str, action: &str) -> Result<bool> {
        RuleEngine::enforce(self, subject, key, action).await
    }
}

pub struct PermissionPolicy {
    enforcer: Arc<dyn PolicyEnforcer>,
    conditions: Arc<dyn ConditionalStorage>,
}

impl PermissionPolicy {
    pub fn new(enforcer: Arc<dyn PolicyEnforcer>, conditions: Arc<dyn ConditionalStorage>) -> Self {
        Self {
            enforcer,
            conditions,
        }
    }

    pub async fn handle(&self, query: &PolicyQuery, identity: Option<&Identity>) -> PolicyDecision {
        let user = identity
            .map(|i| i.user_entity_ref.as_str())
            .unwrap_or("<unidentified>");
        info!(
            "Policy check for {} for permission {}",
            user, query.permission.name
        );

        match self.evaluate(query, identity).await {
            Ok(decision) => {
                info!(
                    "{} is {:?} for permission {} and action {}",
                    user,
                    decision.result(),
                    query.permission.name,
                    query.permission.action()
                );
                decision
            }
            Err(err) => {
                error!("Policy check failed with {}", err);
                PolicyDecision::Deny
            }
        }
    }

    async fn evaluate(&self, query: &PolicyQuery, identity: Option<&Identity>) -> Result<PolicyDecision> {
        let Some(identity) = identity else {
            return Ok(PolicyDecision::Deny);
        };
        let permission = &query.permission;

        let allowed = self
            .enforcer
            .enforce(&identity.user_entity_ref, permission.key(), permission.action())
            .await?;
        if !allowed {
            return Ok(PolicyDecision::Deny);
        }

        if permission.is_resource() {
            if let Some(decision) = self.conditions.find_condition(permission.key()).await? {
                return Ok(PolicyDecision::Conditional(decision));
            }
        }
        Ok(PolicyDecision::Allow)
    }
}
