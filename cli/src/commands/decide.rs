use crate::context::CliContext;
use anyhow::Result;
use authz::{
    Identity, MemoryConditionalStorage, Permission, PermissionPolicy, PolicyDecision, PolicyQuery,
};
use colored::*;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

/// Evaluate one permission for one user
pub async fn execute(
    config_path: &Path,
    user: String,
    permission: String,
    resource_type: Option<String>,
    action: Option<String>,
    format: String,
) -> Result<()> {
    let ctx = CliContext::open(config_path).await?;

    let mut permission = match resource_type {
        Some(resource_type) => Permission::resource(permission, resource_type),
        None => Permission::basic(permission),
    };
    if let Some(action) = action {
        permission = permission.with_action(action);
    }
    let query = PolicyQuery::new(permission);

    let handler = PermissionPolicy::new(ctx.delegate.clone(), Arc::new(MemoryConditionalStorage::new()));
    let identity = Identity::new(user);
    let decision = handler.handle(&query, Some(&identity)).await;

    match format.as_str() {
        "json" => {
            let output = json!({
                "user": identity.user_entity_ref,
                "permission": query.permission,
                "allowed": decision.is_allow(),
                "decision": decision,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => print_decision(&identity, &query, &decision),
    }
    Ok(())
}

fn print_decision(identity: &Identity, query: &PolicyQuery, decision: &PolicyDecision) {
    let permission = &query.permission;
    println!("{}: {}", "User".bold(), identity.user_entity_ref.cyan());
    println!("{}: {}", "Permission".bold(), permission.name);
    println!("{}: {}", "Key".bold(), permission.key());
    println!("{}: {}", "Action".bold(), permission.action());
    let result = match decision {
        PolicyDecision::Allow => "ALLOW".green().bold(),
        PolicyDecision::Deny => "DENY".red().bold(),
        PolicyDecision::Conditional(_) => "CONDITIONAL".yellow().bold(),
    };
    println!("{}: {}", "Decision".bold(), result);
}
