//! Keeps `csv-file` rules in step with the predefined policy file.

use authz::{PolicyBatch, PolicyRule, PolicyStoreDelegate, RoleAssignment, Source};
use metadata::RoleMetadata;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use crate::error::Result;
use crate::policy_file::PolicyFile;
use crate::validation::validate_policy_file;

const FILE_AUTHOR: &str = "csv-file";

fn file_metadata(role: &str) -> RoleMetadata {
    RoleMetadata::new(role, Source::CsvFile, FILE_AUTHOR)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileReport {
    pub added_policies: usize,
    pub removed_policies: usize,
    pub added_assignments: usize,
    pub removed_assignments: usize,
}

/// Applies the file at `path`, or removes every `csv-file` rule when there is
/// none. The file is parsed and validated before anything is written, and the
/// whole pass commits as one store transaction.
pub async fn reconcile_policy_file(
    delegate: &PolicyStoreDelegate,
    path: Option<&Path>,
) -> Result<FileReport> {
    match path {
        Some(path) => {
            let file = PolicyFile::load(path)?;
            apply_policy_file(delegate, &file).await
        }
        None => {
            let mut batch = delegate.batch().await?;
            let outcome = remove_stale(delegate, &mut batch, None).await;
            finish(batch, outcome).await
        }
    }
}

pub async fn apply_policy_file(delegate: &PolicyStoreDelegate, file: &PolicyFile) -> Result<FileReport> {
    validate_policy_file(delegate, file).await?;

    let mut batch = delegate.batch().await?;
    let outcome = stage_file(delegate, &mut batch, file).await;
    let report = finish(batch, outcome).await?;

    info!(
        "Applied {:?}: {} policies and {} role assignments added, {} and {} removed",
        file.path,
        report.added_policies,
        report.added_assignments,
        report.removed_policies,
        report.removed_assignments
    );
    Ok(report)
}

async fn finish(batch: PolicyBatch<'_>, outcome: Result<FileReport>) -> Result<FileReport> {
    match outcome {
        Ok(report) => {
            batch.commit().await?;
            Ok(report)
        }
        Err(err) => {
            batch.rollback().await;
            Err(err)
        }
    }
}

async fn stage_file(
    delegate: &PolicyStoreDelegate,
    batch: &mut PolicyBatch<'_>,
    file: &PolicyFile,
) -> Result<FileReport> {
    let mut report = remove_stale(delegate, batch, Some(file)).await?;

    for policy in &file.policies {
        if !batch.has_policy(policy, Source::CsvFile) {
            report.added_policies += 1;
        }
        batch
            .add_or_update_policy(policy, Source::CsvFile, true)
            .await?;
    }
    for assignment in &file.assignments {
        if !batch.has_grouping_policy(assignment, Source::CsvFile) {
            report.added_assignments += 1;
        }
        batch
            .add_or_update_grouping_policy(assignment, &file_metadata(&assignment.role))
            .await?;
    }
    Ok(report)
}

/// Removes `csv-file` rules that are not in `file`; all of them without one.
async fn remove_stale(
    delegate: &PolicyStoreDelegate,
    batch: &mut PolicyBatch<'_>,
    file: Option<&PolicyFile>,
) -> Result<FileReport> {
    let stale_policies: Vec<PolicyRule> = delegate
        .get_filtered_policy(4, &[Source::CsvFile.as_str()])
        .await
        .into_iter()
        .map(|p| p.rule)
        .filter(|rule| file.map_or(true, |f| !f.policies.contains(rule)))
        .collect();

    let mut stale_by_role: BTreeMap<String, Vec<RoleAssignment>> = BTreeMap::new();
    for sourced in delegate
        .get_filtered_grouping_policy(2, &[Source::CsvFile.as_str()])
        .await
    {
        let assignment = sourced.assignment;
        if file.map_or(true, |f| !f.assignments.contains(&assignment)) {
            stale_by_role
                .entry(assignment.role.clone())
                .or_default()
                .push(assignment);
        }
    }

    let mut report = FileReport {
        removed_policies: stale_policies.len(),
        ..Default::default()
    };
    batch
        .remove_policies(&stale_policies, Source::CsvFile)
        .await?;
    for (role, assignments) in stale_by_role {
        report.removed_assignments += assignments.len();
        batch
            .remove_grouping_policies(&assignments, &file_metadata(&role), false)
            .await?;
    }
    Ok(report)
}
