use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Relation used to look up groups in the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupRelation {
    /// Groups that list one of the references as a direct member.
    HasMember,
    /// Groups that are the direct parent of one of the referenced groups.
    ParentOf,
}

impl GroupRelation {
    /// Relation name as used in catalog filters.
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupRelation::HasMember => "hasMember",
            GroupRelation::ParentOf => "parentOf",
        }
    }
}

/// A group as returned by the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEntity {
    pub name: String,
    pub namespace: Option<String>,
    /// Entity reference of the parent group, if any.
    pub parent: Option<String>,
}

impl GroupEntity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            parent: None,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// `group:<namespace>/<name>`, lowercased, namespace defaulting to `default`.
    pub fn entity_ref(&self) -> String {
        format!(
            "group:{}/{}",
            self.namespace.as_deref().unwrap_or("default"),
            self.name
        )
        .to_lowercase()
    }
}

/// External source of group membership.
#[async_trait]
pub trait GroupDirectory: Send + Sync {
    /// Groups related to any of `entity_refs` by `relation`.
    async fn find_groups(
        &self,
        entity_refs: &[String],
        relation: GroupRelation,
    ) -> Result<Vec<GroupEntity>>;
}

/// Expands a short group reference (`team-a`, `default/team-a`) to
/// `group:default/team-a`.
pub fn normalize_group_ref(reference: &str) -> String {
    let reference = reference.trim().to_lowercase();
    let (kind, rest) = match reference.split_once(':') {
        Some((kind, rest)) => (kind.to_string(), rest.to_string()),
        None => ("group".to_string(), reference),
    };
    if rest.contains('/') {
        format!("{}:{}", kind, rest)
    } else {
        format!("{}:default/{}", kind, rest)
    }
}

/// A group defined in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticGroup {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
    /// Entity references of direct members.
    #[serde(default)]
    pub members: Vec<String>,
}

impl StaticGroup {
    fn entity(&self) -> GroupEntity {
        GroupEntity {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            parent: self.parent.as_deref().map(normalize_group_ref),
        }
    }
}

/// Directory backed by a fixed list of groups.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    groups: Vec<StaticGroup>,
}

impl StaticDirectory {
    pub fn new(groups: Vec<StaticGroup>) -> Self {
        Self { groups }
    }

    pub fn groups(&self) -> &[StaticGroup] {
        &self.groups
    }
}

#[async_trait]
impl GroupDirectory for StaticDirectory {
    async fn find_groups(
        &self,
        entity_refs: &[String],
        relation: GroupRelation,
    ) -> Result<Vec<GroupEntity>> {
        let wanted: Vec<String> = entity_refs.iter().map(|r| r.to_lowercase()).collect();
        let entities: Vec<GroupEntity> = self.groups.iter().map(StaticGroup::entity).collect();

        let found = match relation {
            GroupRelation::HasMember => self
                .groups
                .iter()
                .zip(entities)
                .filter(|(group, _)| {
                    group
                        .members
                        .iter()
                        .any(|m| wanted.contains(&m.to_lowercase()))
                })
                .map(|(_, entity)| entity)
                .collect(),
            GroupRelation::ParentOf => {
                let parents: Vec<String> = entities
                    .iter()
                    .filter(|child| wanted.contains(&child.entity_ref()))
                    .filter_map(|child| child.parent.clone())
                    .collect();
                entities
                    .into_iter()
                    .filter(|group| parents.contains(&group.entity_ref()))
                    .collect()
            }
        };
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn directory() -> StaticDirectory {
        StaticDirectory::new(vec![
            StaticGroup {
                name: "team-a".into(),
                namespace: None,
                parent: Some("org".into()),
                members: vec!["user:default/tom".into()],
            },
            StaticGroup {
                name: "org".into(),
                namespace: None,
                parent: None,
                members: vec![],
            },
        ])
    }

    #[rstest]
    #[case("team-a", "group:default/team-a")]
    #[case("default/team-a", "group:default/team-a")]
    #[case("group:ops/Team-B", "group:ops/team-b")]
    fn test_normalize_group_ref(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_group_ref(input), expected);
    }

    #[test]
    fn test_entity_ref_lowercases_and_defaults_namespace() {
        let group = GroupEntity::new("Team-A");
        assert_eq!(group.entity_ref(), "group:default/team-a");
    }

    #[tokio::test]
    async fn test_has_member_lookup() {
        let groups = directory()
            .find_groups(&["user:default/tom".into()], GroupRelation::HasMember)
            .await
            .unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].entity_ref(), "group:default/team-a");
        assert_eq!(groups[0].parent.as_deref(), Some("group:default/org"));
    }

    #[tokio::test]
    async fn test_parent_of_lookup() {
        let groups = directory()
            .find_groups(&["group:default/team-a".into()], GroupRelation::ParentOf)
            .await
            .unwrap();
        assert_eq!(groups, vec![GroupEntity::new("org")]);
    }
}
