use anyhow::{bail, Result};
use colored::*;
use reconciler::{validation::validate_entries, PolicyFile};
use std::path::Path;

/// Parse and check a policy file offline.
///
/// Role ownership is only checked by `bootstrap`, which has the store.
pub fn execute(file: &Path) -> Result<()> {
    let parsed = PolicyFile::load(file)?;
    let errors = validate_entries(&parsed);

    if !errors.is_empty() {
        for error in &errors {
            eprintln!("  {} {}", "-".red(), error);
        }
        bail!("{} invalid rule(s) in {}", errors.len(), file.display());
    }

    println!(
        "{} {} policies and {} role assignments in {}",
        "Valid:".green().bold(),
        parsed.policies.len(),
        parsed.assignments.len(),
        file.display()
    );
    Ok(())
}
