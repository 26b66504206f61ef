use crate::context::CliContext;
use anyhow::{Context, Result};
use colored::*;
use reconciler::{PolicyFileWatcher, ReconcileReport};
use std::path::Path;
use tracing::{info, warn};

/// Run startup reconciliation, optionally watching the policy file afterwards
pub async fn execute(config_path: &Path, watch: bool) -> Result<()> {
    let ctx = CliContext::open(config_path).await?;

    let report = reconciler::reconcile(&ctx.delegate, &ctx.config)
        .await
        .context("Startup reconciliation failed")?;
    print_report(&report);

    if !watch {
        return Ok(());
    }
    let Some(file) = ctx.config.policies_csv_file() else {
        warn!("--watch given but no policies-csv-file is configured");
        return Ok(());
    };
    if !ctx.config.policy_file_reload() {
        warn!("--watch given but policy-file-reload is disabled in configuration");
        return Ok(());
    }

    let _watcher = PolicyFileWatcher::start(ctx.delegate.clone(), file.to_path_buf())?;
    println!("{}", "Watching the policy file, press Ctrl-C to stop".cyan());
    tokio::signal::ctrl_c().await?;
    info!("Stopped watching {:?}", file);
    Ok(())
}

fn print_report(report: &ReconcileReport) {
    println!("{}", "=== Reconciliation ===".bold());
    println!();
    println!("{}", "[policy file]".cyan().bold());
    println!("  policies added: {}", report.file.added_policies);
    println!("  policies removed: {}", report.file.removed_policies);
    println!("  role assignments added: {}", report.file.added_assignments);
    println!("  role assignments removed: {}", report.file.removed_assignments);
    println!();
    println!("{}", "[admins]".cyan().bold());
    println!("  added: {}", join_or_none(&report.admins.added));
    println!("  removed: {}", join_or_none(&report.admins.removed));
    println!();
    println!("{}", "Reconciliation complete".green());
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}
