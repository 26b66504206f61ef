//! Predefined policy file.
//!
//! One rule per line in CSV form:
//!
//! ```text
//! # comment
//! p, role:default/dev, catalog-entity, read, allow
//! g, user:default/tom, role:default/dev
//! ```
//!
//! Blank lines and `#` comments are skipped. Repeated lines are kept once.

use authz::{Effect, PolicyRule, RoleAssignment};
use std::path::{Path, PathBuf};

use crate::error::{ReconcilerError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyFile {
    pub path: PathBuf,
    pub policies: Vec<PolicyRule>,
    pub assignments: Vec<RoleAssignment>,
}

impl PolicyFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ReconcilerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &content)
    }

    /// `path` is only used for error messages.
    pub fn parse(path: &Path, content: &str) -> Result<Self> {
        let mut file = PolicyFile {
            path: path.to_path_buf(),
            ..Default::default()
        };

        for (index, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parse_error = |message: String| ReconcilerError::Parse {
                path: path.to_path_buf(),
                line: index + 1,
                message,
            };

            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            match fields.as_slice() {
                ["p", subject, permission, action, effect] => {
                    let effect: Effect = effect.parse().map_err(|e: authz::AuthzError| {
                        parse_error(e.to_string())
                    })?;
                    let rule = PolicyRule::new(*subject, *permission, *action, effect);
                    if !file.policies.contains(&rule) {
                        file.policies.push(rule);
                    }
                }
                ["g", member, role] => {
                    let assignment = RoleAssignment::new(*member, *role);
                    if !file.assignments.contains(&assignment) {
                        file.assignments.push(assignment);
                    }
                }
                ["p", ..] => {
                    return Err(parse_error(format!(
                        "a policy line takes 4 values after 'p', got {}",
                        fields.len() - 1
                    )))
                }
                ["g", ..] => {
                    return Err(parse_error(format!(
                        "a grouping line takes 2 values after 'g', got {}",
                        fields.len() - 1
                    )))
                }
                [kind, ..] => {
                    return Err(parse_error(format!(
                        "unknown rule type '{}', expected 'p' or 'g'",
                        kind
                    )))
                }
                [] => {}
            }
        }
        Ok(file)
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty() && self.assignments.is_empty()
    }
}
