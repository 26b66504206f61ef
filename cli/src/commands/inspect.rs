use crate::context::CliContext;
use anyhow::Result;
use authz::{SourcedAssignment, SourcedPolicy};
use colored::*;
use metadata::RoleMetadata;
use serde_json::json;
use std::path::Path;

/// List policies and role assignments, optionally for one subject
pub async fn policies(config_path: &Path, subject: Option<String>, format: String) -> Result<()> {
    let ctx = CliContext::open(config_path).await?;
    let delegate = &ctx.delegate;

    let (policies, assignments) = match &subject {
        Some(subject) => (
            delegate.get_filtered_policy(0, &[subject.as_str()]).await,
            delegate.get_filtered_grouping_policy(0, &[subject.as_str()]).await,
        ),
        None => (
            delegate.get_policy().await,
            delegate.get_grouping_policy().await,
        ),
    };

    match format.as_str() {
        "json" => {
            let output = json!({
                "policies": policies,
                "roleAssignments": assignments,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => print_policies(&policies, &assignments),
    }
    Ok(())
}

/// List role metadata
pub async fn roles(config_path: &Path, format: String) -> Result<()> {
    let ctx = CliContext::open(config_path).await?;
    let roles = ctx.delegate.list_role_metadata().await?;

    match format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&roles)?),
        _ => print_roles(&roles),
    }
    Ok(())
}

fn print_policies(policies: &[SourcedPolicy], assignments: &[SourcedAssignment]) {
    println!("{}", "=== Policies ===".bold());
    println!();
    if policies.is_empty() {
        println!("{}", "No policies".yellow());
    }
    for p in policies {
        println!("  {} {}", p.rule, format!("({})", p.source).dimmed());
    }
    println!();

    println!("{}", "=== Role Assignments ===".bold());
    println!();
    if assignments.is_empty() {
        println!("{}", "No role assignments".yellow());
    }
    for a in assignments {
        println!("  {} {}", a.assignment, format!("({})", a.source).dimmed());
    }
    println!();
    println!(
        "{}",
        format!(
            "Total: {} policies, {} role assignments",
            policies.len(),
            assignments.len()
        )
        .green()
    );
}

fn print_roles(roles: &[RoleMetadata]) {
    println!("{}", "=== Roles ===".bold());
    println!();
    if roles.is_empty() {
        println!("{}", "No roles".yellow());
        return;
    }

    for role in roles {
        println!("{}", role.role_entity_ref.cyan().bold());
        println!("  {}: {}", "Source".bold(), role.source);
        println!("  {}: {}", "Author".bold(), role.author);
        println!("  {}: {}", "Modified by".bold(), role.modified_by);
        if let Some(description) = &role.description {
            println!("  {}: {}", "Description".bold(), description);
        }
        println!(
            "  {}: {}",
            "Last modified".bold(),
            role.last_modified.to_rfc3339()
        );
        println!();
    }
    println!("{}", format!("Total roles: {}", roles.len()).green());
}
