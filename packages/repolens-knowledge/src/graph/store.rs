//! Graph store capability and its in-memory reference implementation.
//!
//! Entities, relationships and patterns live in flat tables keyed by stable
//! string ids; traversal is an explicit query, never an in-memory object
//! cycle.

use std::collections::HashSet;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use petgraph::algo::all_simple_paths;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

use repolens_core::error::{Error, Result};
use repolens_core::models::{
    ArchitecturalPattern, CodeEntity, CodeRelationship, EntityKind, KnowledgeGraph,
};

/// CRUD + path queries over the knowledge graph, keyed by stable ids.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn upsert_entities(&self, entities: &[CodeEntity]) -> Result<usize>;
    async fn upsert_relationships(&self, relationships: &[CodeRelationship]) -> Result<usize>;
    async fn replace_patterns(
        &self,
        repository_id: &str,
        patterns: &[ArchitecturalPattern],
    ) -> Result<usize>;

    async fn save_graph(&self, graph: &KnowledgeGraph) -> Result<()>;
    async fn get_graph(&self, graph_id: &str) -> Result<KnowledgeGraph>;
    async fn graph_for_repository(&self, repository_id: &str) -> Result<Option<KnowledgeGraph>>;

    async fn get_entity(&self, entity_id: &str) -> Result<CodeEntity>;
    async fn entities_by_repository(&self, repository_id: &str) -> Result<Vec<CodeEntity>>;
    async fn entities_by_kind(
        &self,
        repository_id: &str,
        kind: EntityKind,
    ) -> Result<Vec<CodeEntity>>;
    /// Case-insensitive name/qualified-name search across repositories.
    async fn search_entities(
        &self,
        repository_ids: &[String],
        term: &str,
        limit: usize,
    ) -> Result<Vec<CodeEntity>>;

    async fn relationships_by_repository(
        &self,
        repository_id: &str,
    ) -> Result<Vec<CodeRelationship>>;
    async fn relationships_from(&self, entity_id: &str) -> Result<Vec<CodeRelationship>>;

    async fn patterns_by_repository(
        &self,
        repository_id: &str,
    ) -> Result<Vec<ArchitecturalPattern>>;

    /// Simple paths between two entities, bounded by `max_depth` edges.
    async fn find_paths(
        &self,
        from_entity_id: &str,
        to_entity_id: &str,
        max_depth: usize,
    ) -> Result<Vec<Vec<String>>>;

    /// Tombstone entities of a repository that are absent from `keep`;
    /// returns the number removed. Dangling relationships go with them.
    async fn remove_missing_entities(
        &self,
        repository_id: &str,
        keep: &HashSet<String>,
    ) -> Result<usize>;

    /// Cascade delete of everything belonging to a repository.
    async fn delete_repository(&self, repository_id: &str) -> Result<()>;
}

fn relationship_key(rel: &CodeRelationship) -> String {
    format!(
        "{}|{}|{}",
        rel.source_entity_id,
        rel.target_entity_id,
        rel.kind.as_str()
    )
}

/// Process-scoped in-memory store. Graph writes are serialized by a single
/// write lock; entity/relationship tables are concurrent.
pub struct InMemoryGraphStore {
    entities: DashMap<String, CodeEntity>,
    relationships: DashMap<String, CodeRelationship>,
    patterns: DashMap<String, Vec<ArchitecturalPattern>>,
    graphs: DashMap<String, KnowledgeGraph>,
    graph_write: Mutex<()>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self {
            entities: DashMap::new(),
            relationships: DashMap::new(),
            patterns: DashMap::new(),
            graphs: DashMap::new(),
            graph_write: Mutex::new(()),
        }
    }

    fn repository_of(&self, entity_id: &str) -> Option<String> {
        self.entities.get(entity_id).map(|e| e.repository_id.clone())
    }
}

impl Default for InMemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn upsert_entities(&self, entities: &[CodeEntity]) -> Result<usize> {
        for entity in entities {
            self.entities.insert(entity.entity_id.clone(), entity.clone());
        }
        Ok(entities.len())
    }

    async fn upsert_relationships(&self, relationships: &[CodeRelationship]) -> Result<usize> {
        for rel in relationships {
            self.relationships.insert(relationship_key(rel), rel.clone());
        }
        Ok(relationships.len())
    }

    async fn replace_patterns(
        &self,
        repository_id: &str,
        patterns: &[ArchitecturalPattern],
    ) -> Result<usize> {
        self.patterns
            .insert(repository_id.to_string(), patterns.to_vec());
        Ok(patterns.len())
    }

    async fn save_graph(&self, graph: &KnowledgeGraph) -> Result<()> {
        let _write = self.graph_write.lock();
        self.graphs.insert(graph.id.clone(), graph.clone());
        Ok(())
    }

    async fn get_graph(&self, graph_id: &str) -> Result<KnowledgeGraph> {
        self.graphs
            .get(graph_id)
            .map(|g| g.clone())
            .ok_or_else(|| Error::not_found(format!("graph {graph_id}")))
    }

    async fn graph_for_repository(&self, repository_id: &str) -> Result<Option<KnowledgeGraph>> {
        Ok(self
            .graphs
            .iter()
            .find(|g| g.repository_ids.iter().any(|r| r == repository_id))
            .map(|g| g.clone()))
    }

    async fn get_entity(&self, entity_id: &str) -> Result<CodeEntity> {
        self.entities
            .get(entity_id)
            .map(|e| e.clone())
            .ok_or_else(|| Error::not_found(format!("entity {entity_id}")))
    }

    async fn entities_by_repository(&self, repository_id: &str) -> Result<Vec<CodeEntity>> {
        let mut out: Vec<CodeEntity> = self
            .entities
            .iter()
            .filter(|e| e.repository_id == repository_id)
            .map(|e| e.clone())
            .collect();
        out.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        Ok(out)
    }

    async fn entities_by_kind(
        &self,
        repository_id: &str,
        kind: EntityKind,
    ) -> Result<Vec<CodeEntity>> {
        let mut out: Vec<CodeEntity> = self
            .entities
            .iter()
            .filter(|e| e.repository_id == repository_id && e.kind == kind)
            .map(|e| e.clone())
            .collect();
        out.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        Ok(out)
    }

    async fn search_entities(
        &self,
        repository_ids: &[String],
        term: &str,
        limit: usize,
    ) -> Result<Vec<CodeEntity>> {
        let needle = term.to_lowercase();
        let mut out: Vec<CodeEntity> = self
            .entities
            .iter()
            .filter(|e| {
                (repository_ids.is_empty() || repository_ids.contains(&e.repository_id))
                    && (e.name.to_lowercase().contains(&needle)
                        || e.full_name.to_lowercase().contains(&needle))
            })
            .map(|e| e.clone())
            .collect();
        out.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        out.truncate(limit);
        Ok(out)
    }

    async fn relationships_by_repository(
        &self,
        repository_id: &str,
    ) -> Result<Vec<CodeRelationship>> {
        let mut out: Vec<CodeRelationship> = self
            .relationships
            .iter()
            .filter(|r| {
                self.repository_of(&r.source_entity_id)
                    .is_some_and(|repo| repo == repository_id)
            })
            .map(|r| r.clone())
            .collect();
        out.sort_by(|a, b| {
            a.source_entity_id
                .cmp(&b.source_entity_id)
                .then_with(|| a.target_entity_id.cmp(&b.target_entity_id))
                .then_with(|| a.kind.cmp(&b.kind))
        });
        Ok(out)
    }

    async fn relationships_from(&self, entity_id: &str) -> Result<Vec<CodeRelationship>> {
        let mut out: Vec<CodeRelationship> = self
            .relationships
            .iter()
            .filter(|r| r.source_entity_id == entity_id)
            .map(|r| r.clone())
            .collect();
        out.sort_by(|a, b| a.target_entity_id.cmp(&b.target_entity_id));
        Ok(out)
    }

    async fn patterns_by_repository(
        &self,
        repository_id: &str,
    ) -> Result<Vec<ArchitecturalPattern>> {
        Ok(self
            .patterns
            .get(repository_id)
            .map(|p| p.clone())
            .unwrap_or_default())
    }

    async fn find_paths(
        &self,
        from_entity_id: &str,
        to_entity_id: &str,
        max_depth: usize,
    ) -> Result<Vec<Vec<String>>> {
        let mut graph: DiGraph<String, ()> = DiGraph::new();
        let mut indices: HashMap<String, NodeIndex> = HashMap::new();

        let mut node = |graph: &mut DiGraph<String, ()>,
                        indices: &mut HashMap<String, NodeIndex>,
                        id: &str| {
            *indices
                .entry(id.to_string())
                .or_insert_with(|| graph.add_node(id.to_string()))
        };

        for rel in self.relationships.iter() {
            let from = node(&mut graph, &mut indices, &rel.source_entity_id);
            let to = node(&mut graph, &mut indices, &rel.target_entity_id);
            graph.update_edge(from, to, ());
        }

        let (Some(&from), Some(&to)) = (indices.get(from_entity_id), indices.get(to_entity_id))
        else {
            return Ok(Vec::new());
        };

        // max_depth edges = max_depth - 1 intermediate nodes
        let max_intermediate = max_depth.saturating_sub(1);
        let mut paths: Vec<Vec<String>> =
            all_simple_paths::<Vec<_>, _>(&graph, from, to, 0, Some(max_intermediate))
                .map(|path: Vec<NodeIndex>| {
                    path.into_iter().map(|ix| graph[ix].clone()).collect()
                })
                .collect();
        paths.sort();
        Ok(paths)
    }

    async fn remove_missing_entities(
        &self,
        repository_id: &str,
        keep: &HashSet<String>,
    ) -> Result<usize> {
        let stale: Vec<String> = self
            .entities
            .iter()
            .filter(|e| e.repository_id == repository_id && !keep.contains(&e.entity_id))
            .map(|e| e.entity_id.clone())
            .collect();

        for id in &stale {
            self.entities.remove(id);
        }
        self.relationships.retain(|_, rel| {
            !stale.contains(&rel.source_entity_id) && !stale.contains(&rel.target_entity_id)
        });
        Ok(stale.len())
    }

    async fn delete_repository(&self, repository_id: &str) -> Result<()> {
        let owned: Vec<String> = self
            .entities
            .iter()
            .filter(|e| e.repository_id == repository_id)
            .map(|e| e.entity_id.clone())
            .collect();

        for id in &owned {
            self.entities.remove(id);
        }
        self.relationships.retain(|_, rel| {
            !owned.contains(&rel.source_entity_id) && !owned.contains(&rel.target_entity_id)
        });
        self.patterns.remove(repository_id);
        self.graphs
            .retain(|_, g| !g.repository_ids.iter().any(|r| r == repository_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repolens_core::models::{EntityLocation, RelationshipKind};

    fn entity(repo: &str, name: &str) -> CodeEntity {
        CodeEntity::new(
            repo,
            "f.rs",
            "rust",
            name,
            name,
            EntityKind::Function,
            EntityLocation::default(),
            format!("fn {name}() {{}}"),
        )
    }

    fn rel(from: &CodeEntity, to: &CodeEntity) -> CodeRelationship {
        CodeRelationship::new(
            from.entity_id.clone(),
            to.entity_id.clone(),
            RelationshipKind::Calls,
            0.8,
            80.0,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_upsert_idempotent() {
        let store = InMemoryGraphStore::new();
        let e = entity("r", "f");
        store.upsert_entities(&[e.clone()]).await.unwrap();
        store.upsert_entities(&[e.clone()]).await.unwrap();

        let all = store.entities_by_repository("r").await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_query_by_kind_and_search() {
        let store = InMemoryGraphStore::new();
        store
            .upsert_entities(&[entity("r", "login"), entity("r", "logout")])
            .await
            .unwrap();

        let functions = store
            .entities_by_kind("r", EntityKind::Function)
            .await
            .unwrap();
        assert_eq!(functions.len(), 2);

        let hits = store
            .search_entities(&["r".to_string()], "LOGIN", 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "login");
    }

    #[tokio::test]
    async fn test_path_query_depth_bound() {
        let store = InMemoryGraphStore::new();
        let a = entity("r", "a");
        let b = entity("r", "b");
        let c = entity("r", "c");
        let d = entity("r", "d");
        store
            .upsert_entities(&[a.clone(), b.clone(), c.clone(), d.clone()])
            .await
            .unwrap();
        store
            .upsert_relationships(&[rel(&a, &b), rel(&b, &c), rel(&c, &d)])
            .await
            .unwrap();

        // a -> d needs 3 edges
        let paths = store
            .find_paths(&a.entity_id, &d.entity_id, 3)
            .await
            .unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].len(), 4);

        let too_shallow = store
            .find_paths(&a.entity_id, &d.entity_id, 2)
            .await
            .unwrap();
        assert!(too_shallow.is_empty());
    }

    #[tokio::test]
    async fn test_tombstoning_removes_stale_and_dangling() {
        let store = InMemoryGraphStore::new();
        let a = entity("r", "a");
        let b = entity("r", "b");
        store.upsert_entities(&[a.clone(), b.clone()]).await.unwrap();
        store.upsert_relationships(&[rel(&a, &b)]).await.unwrap();

        let keep: HashSet<String> = [a.entity_id.clone()].into_iter().collect();
        let removed = store.remove_missing_entities("r", &keep).await.unwrap();
        assert_eq!(removed, 1);

        assert!(store.get_entity(&b.entity_id).await.is_err());
        assert!(store
            .relationships_from(&a.entity_id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_delete_repository_cascades() {
        let store = InMemoryGraphStore::new();
        let a = entity("r1", "a");
        let b = entity("r2", "b");
        store.upsert_entities(&[a.clone(), b.clone()]).await.unwrap();

        let graph = KnowledgeGraph::new(vec!["r1".to_string()]).unwrap();
        store.save_graph(&graph).await.unwrap();

        store.delete_repository("r1").await.unwrap();
        assert!(store.get_entity(&a.entity_id).await.is_err());
        assert!(store.get_entity(&b.entity_id).await.is_ok());
        assert!(store.graph_for_repository("r1").await.unwrap().is_none());
    }
}
