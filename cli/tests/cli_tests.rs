use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const POLICY_FILE: &str = "\
# development team
p, role:default/dev, catalog-entity, read, allow
p, role:default/dev, catalog-entity, delete, deny
g, group:default/org, role:default/dev
g, user:default/amy, role:default/dev
";

/// Helper to create a project with configuration, policy file and groups
fn create_project() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();

    fs::write(root.join("rbac-policy.csv"), POLICY_FILE).unwrap();
    fs::write(
        root.join("rbac.yaml"),
        r#"database:
  path: data/rbac.db
permission:
  rbac:
    admin:
      users:
        - name: user:default/alice
    policies-csv-file: rbac-policy.csv
directory:
  static:
    - name: team-a
      parent: org
      members: [user:default/tom]
    - name: org
"#,
    )
    .unwrap();

    temp_dir
}

fn rbacctl(root: &Path) -> Command {
    let mut cmd = Command::cargo_bin("rbacctl").unwrap();
    cmd.current_dir(root)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .env_remove("RBAC_CONFIG")
        .env_remove("RBAC_LOG_DIR")
        .arg("--config")
        .arg(root.join("rbac.yaml"));
    cmd
}

fn bootstrap(root: &Path) {
    rbacctl(root)
        .arg("bootstrap")
        .assert()
        .success()
        .stdout(predicate::str::contains("Reconciliation complete"));
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("rbacctl").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("role-based access control"))
        .stdout(predicate::str::contains("bootstrap"));
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("rbacctl").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("rbacctl"));
}

#[test]
fn test_missing_config() {
    let temp_dir = TempDir::new().unwrap();

    rbacctl(temp_dir.path())
        .arg("roles")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
}

#[test]
fn test_bootstrap_reports_changes() {
    let project = create_project();

    rbacctl(project.path())
        .arg("bootstrap")
        .assert()
        .success()
        .stdout(predicate::str::contains("policies added: 2"))
        .stdout(predicate::str::contains("role assignments added: 2"))
        .stdout(predicate::str::contains("added: user:default/alice"));

    // Second run has nothing to do
    rbacctl(project.path())
        .arg("bootstrap")
        .assert()
        .success()
        .stdout(predicate::str::contains("policies added: 0"))
        .stdout(predicate::str::contains("added: none"));
}

#[test]
fn test_bootstrap_fails_on_invalid_policy_file() {
    let project = create_project();
    fs::write(
        project.path().join("rbac-policy.csv"),
        "g, user:default/tom, group:default/not-a-role\n",
    )
    .unwrap();

    rbacctl(project.path())
        .arg("bootstrap")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Startup reconciliation failed"));
}

#[test]
fn test_decide_allows_through_group_hierarchy() {
    let project = create_project();
    bootstrap(project.path());

    // tom is in team-a, whose parent org holds role:default/dev
    rbacctl(project.path())
        .args([
            "decide",
            "user:default/tom",
            "catalog.entity.read",
            "--resource-type",
            "catalog-entity",
            "--action",
            "read",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("ALLOW"));

    rbacctl(project.path())
        .args([
            "decide",
            "user:default/tom",
            "catalog.entity.delete",
            "--resource-type",
            "catalog-entity",
            "--action",
            "delete",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("DENY"));

    rbacctl(project.path())
        .args([
            "decide",
            "user:default/bob",
            "catalog.entity.read",
            "--resource-type",
            "catalog-entity",
            "--action",
            "read",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("DENY"));
}

#[test]
fn test_decide_json_for_admin() {
    let project = create_project();
    bootstrap(project.path());

    rbacctl(project.path())
        .args([
            "decide",
            "user:default/alice",
            "policy.entity.create",
            "--resource-type",
            "policy-entity",
            "--action",
            "create",
            "--format",
            "json",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"result\": \"ALLOW\""))
        .stdout(predicate::str::contains("\"allowed\": true"))
        .stdout(predicate::str::contains("\"user\": \"user:default/alice\""));
}

#[test]
fn test_policies_and_roles() {
    let project = create_project();
    bootstrap(project.path());

    rbacctl(project.path())
        .args(["policies", "--subject", "role:default/dev"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "role:default/dev, catalog-entity, read, allow (csv-file)",
        ))
        .stdout(predicate::str::contains("Total: 2 policies, 0 role assignments"));

    rbacctl(project.path())
        .args(["policies", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"roleAssignments\""))
        .stdout(predicate::str::contains("\"source\": \"configuration\""));

    rbacctl(project.path())
        .args(["roles", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"roleEntityRef\": \"role:default/dev\""))
        .stdout(predicate::str::contains("\"roleEntityRef\": \"role:default/rbac_admin\""));
}

#[test]
fn test_validate_policy_file() {
    let project = create_project();

    rbacctl(project.path())
        .args(["validate", "rbac-policy.csv"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 policies and 2 role assignments"));

    fs::write(
        project.path().join("broken.csv"),
        "p, component:default/x, catalog-entity, read, allow\n",
    )
    .unwrap();
    rbacctl(project.path())
        .args(["validate", "broken.csv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("1 invalid rule(s)"));

    fs::write(project.path().join("garbled.csv"), "p, a, b\n").unwrap();
    rbacctl(project.path())
        .args(["validate", "garbled.csv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("line 1"));
}
