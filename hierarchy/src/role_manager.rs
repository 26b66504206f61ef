use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::RoleCache;
use crate::directory::{GroupDirectory, GroupRelation};
use crate::error::{HierarchyError, Result};

/// Default bound on group nesting followed by [`HierarchyRoleManager`].
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Role-link oracle consulted by the rule engine.
///
/// Only [`RoleManager::has_link`] is backed by data. The mutation and listing
/// operations exist so callers get an explicit error rather than a silent
/// no-op.
#[async_trait]
pub trait RoleManager: Send + Sync {
    /// True if `name1` is `name2` or a transitive member of group `name2`.
    async fn has_link(&self, name1: &str, name2: &str, domain: Option<&str>) -> Result<bool>;

    async fn add_link(&self, name1: &str, name2: &str, domain: Option<&str>) -> Result<()>;

    async fn delete_link(&self, name1: &str, name2: &str, domain: Option<&str>) -> Result<()>;

    async fn get_roles(&self, name: &str, domain: Option<&str>) -> Result<Vec<String>>;

    async fn get_users(&self, name: &str, domain: Option<&str>) -> Result<Vec<String>>;

    fn clear(&self);

    fn print_roles(&self);

    /// Forgets anything resolved for `subject`. Returns true if an entry was dropped.
    fn invalidate(&self, _subject: &str) -> bool {
        false
    }
}

/// Resolves group ancestry through a [`GroupDirectory`], caching each
/// subject's ancestor set.
pub struct HierarchyRoleManager {
    directory: Arc<dyn GroupDirectory>,
    cache: Arc<RoleCache>,
    max_depth: usize,
}

impl HierarchyRoleManager {
    pub fn new(directory: Arc<dyn GroupDirectory>, cache: Arc<RoleCache>) -> Self {
        Self {
            directory,
            cache,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    pub fn cache(&self) -> &RoleCache {
        &self.cache
    }

    /// Every group `subject` belongs to, directly or through nested groups.
    pub async fn ancestors(&self, subject: &str) -> Result<HashSet<String>> {
        if let Some(cached) = self.cache.get(subject) {
            if !self.cache.should_update(subject) {
                return Ok(cached);
            }
            self.cache.delete(subject);
        }

        let ancestors = self.find_ancestor_groups(subject).await?;
        self.cache.put(subject, ancestors.clone());
        Ok(ancestors)
    }

    // Breadth-first walk: direct groups first, then parents level by level.
    // Only groups that declare a parent are expanded further.
    async fn find_ancestor_groups(&self, subject: &str) -> Result<HashSet<String>> {
        let mut found = HashSet::new();
        let mut frontier = vec![subject.to_string()];
        let mut relation = GroupRelation::HasMember;
        let mut depth = 0;

        while !frontier.is_empty() {
            if depth >= self.max_depth {
                warn!(
                    "Stopped ancestor search for {} at depth {}",
                    subject, self.max_depth
                );
                return Err(HierarchyError::DepthExceeded {
                    subject: subject.to_string(),
                    max_depth: self.max_depth,
                });
            }

            let groups = self.directory.find_groups(&frontier, relation).await?;
            let mut next = Vec::new();
            for group in groups {
                let entity_ref = group.entity_ref();
                if found.insert(entity_ref.clone()) && group.parent.is_some() {
                    next.push(entity_ref);
                }
            }

            frontier = next;
            relation = GroupRelation::ParentOf;
            depth += 1;
        }

        debug!("Resolved {} ancestor groups for {}", found.len(), subject);
        Ok(found)
    }
}

fn reject_domain(domain: Option<&str>) -> Result<()> {
    match domain {
        Some(domain) => Err(HierarchyError::Unsupported(format!(
            "domain argument '{}' is not supported",
            domain
        ))),
        None => Ok(()),
    }
}

#[async_trait]
impl RoleManager for HierarchyRoleManager {
    async fn has_link(&self, name1: &str, name2: &str, domain: Option<&str>) -> Result<bool> {
        reject_domain(domain)?;
        if name1 == name2 {
            return Ok(true);
        }
        Ok(self.ancestors(name1).await?.contains(name2))
    }

    async fn add_link(&self, _name1: &str, _name2: &str, _domain: Option<&str>) -> Result<()> {
        Err(HierarchyError::Unsupported("add_link".to_string()))
    }

    async fn delete_link(&self, _name1: &str, _name2: &str, _domain: Option<&str>) -> Result<()> {
        Err(HierarchyError::Unsupported("delete_link".to_string()))
    }

    async fn get_roles(&self, _name: &str, _domain: Option<&str>) -> Result<Vec<String>> {
        Err(HierarchyError::Unsupported("get_roles".to_string()))
    }

    async fn get_users(&self, _name: &str, _domain: Option<&str>) -> Result<Vec<String>> {
        Err(HierarchyError::Unsupported("get_users".to_string()))
    }

    fn clear(&self) {}

    fn print_roles(&self) {}

    fn invalidate(&self, subject: &str) -> bool {
        self.cache.delete(subject)
    }
}
