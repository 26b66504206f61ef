use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::directory::{GroupDirectory, GroupEntity, GroupRelation};
use crate::error::{HierarchyError, Result};

const ENTITY_FIELDS: &str = "kind,metadata.name,metadata.namespace,spec.parent";

#[derive(Debug, Deserialize)]
struct CatalogEntity {
    metadata: CatalogMetadata,
    #[serde(default)]
    spec: Option<CatalogGroupSpec>,
}

#[derive(Debug, Deserialize)]
struct CatalogMetadata {
    name: String,
    #[serde(default)]
    namespace: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CatalogGroupSpec {
    #[serde(default)]
    parent: Option<String>,
}

impl From<CatalogEntity> for GroupEntity {
    fn from(entity: CatalogEntity) -> Self {
        GroupEntity {
            name: entity.metadata.name,
            namespace: entity.metadata.namespace,
            parent: entity
                .spec
                .and_then(|s| s.parent)
                .map(|p| crate::directory::normalize_group_ref(&p)),
        }
    }
}

/// Group directory backed by a catalog `GET /entities` endpoint.
///
/// Each reference becomes one `filter` parameter; the catalog ORs repeated
/// filters and ANDs the comma separated conditions inside one.
#[derive(Debug, Clone)]
pub struct CatalogDirectory {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl CatalogDirectory {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn entities_url(&self) -> String {
        format!("{}/entities", self.base_url)
    }
}

fn parse_entities(body: &[u8]) -> Result<Vec<GroupEntity>> {
    let entities: Vec<CatalogEntity> = serde_json::from_slice(body).map_err(|e| {
        HierarchyError::Unavailable(format!("malformed catalog response: {}", e))
    })?;
    Ok(entities.into_iter().map(GroupEntity::from).collect())
}

/// Query pairs selecting groups related to `entity_refs`.
pub fn catalog_query(entity_refs: &[String], relation: GroupRelation) -> Vec<(String, String)> {
    let mut query: Vec<(String, String)> = entity_refs
        .iter()
        .map(|r| {
            (
                "filter".to_string(),
                format!("kind=group,relations.{}={}", relation.as_str(), r),
            )
        })
        .collect();
    query.push(("fields".to_string(), ENTITY_FIELDS.to_string()));
    query
}

#[async_trait]
impl GroupDirectory for CatalogDirectory {
    async fn find_groups(
        &self,
        entity_refs: &[String],
        relation: GroupRelation,
    ) -> Result<Vec<GroupEntity>> {
        if entity_refs.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            "Querying catalog: relation={}, refs={}",
            relation.as_str(),
            entity_refs.len()
        );

        let mut request = self
            .client
            .get(self.entities_url())
            .query(&catalog_query(entity_refs, relation));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| HierarchyError::Unavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(HierarchyError::Unavailable(format!(
                "catalog returned status {}",
                response.status()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| HierarchyError::Unavailable(e.to_string()))?;
        parse_entities(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_has_one_filter_per_reference() {
        let query = catalog_query(
            &["user:default/tom".to_string(), "user:default/amy".to_string()],
            GroupRelation::HasMember,
        );
        assert_eq!(
            query,
            vec![
                (
                    "filter".to_string(),
                    "kind=group,relations.hasMember=user:default/tom".to_string()
                ),
                (
                    "filter".to_string(),
                    "kind=group,relations.hasMember=user:default/amy".to_string()
                ),
                ("fields".to_string(), ENTITY_FIELDS.to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_catalog_response() {
        let body = r#"[
            {"kind": "Group", "metadata": {"name": "team-a", "namespace": "default"}, "spec": {"parent": "org"}},
            {"kind": "Group", "metadata": {"name": "org"}}
        ]"#;
        let groups = parse_entities(body.as_bytes()).unwrap();

        assert_eq!(groups[0].entity_ref(), "group:default/team-a");
        assert_eq!(groups[0].parent.as_deref(), Some("group:default/org"));
        assert_eq!(groups[1].parent, None);
    }

    #[test]
    fn test_malformed_catalog_response_is_unavailable() {
        let err = parse_entities(b"<html>502 Bad Gateway</html>").unwrap_err();
        assert!(matches!(err, HierarchyError::Unavailable(ref m) if m.contains("malformed")), "{:?}", err);

        let err = parse_entities(br#"[{"kind": "Group"}]"#).unwrap_err();
        assert!(matches!(err, HierarchyError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_unreachable_catalog_is_unavailable() {
        let directory = CatalogDirectory::new("http://127.0.0.1:9", None).unwrap();
        let err = directory
            .find_groups(&["user:default/tom".to_string()], GroupRelation::HasMember)
            .await
            .unwrap_err();
        assert!(matches!(err, HierarchyError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_empty_lookup_skips_request() {
        let directory = CatalogDirectory::new("http://127.0.0.1:9", None).unwrap();
        let groups = directory
            .find_groups(&[], GroupRelation::ParentOf)
            .await
            .unwrap();
        assert!(groups.is_empty());
    }
}
