//! Chunk/entity knowledge graph and its builder.
//!
//! The graph is undirected with two node kinds. Chunk nodes are keyed by
//! `CHUNK_<id>` and carry the chunk text; entity nodes are keyed by their
//! normalized surface form. Edges are either `appears_in` (chunk ↔ entity,
//! unweighted) or `co_occurs` (entity ↔ entity, weighted by the number of
//! chunks in which both entities were extracted).
//!
//! Once built, a [`KnowledgeGraph`] is never mutated on the serving path:
//! search components hold a shared reference to a finished snapshot.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::chunker::{Chunk, CHUNK_KEY_PREFIX};
use super::entity_extractor::{normalize_entity, EntityExtractor};
use crate::metrics::{self, Collaborator};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Chunk,
    Entity,
}

/// Graph node as persisted and returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    /// Chunk text; absent for entity nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Node {
    pub fn chunk(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: NodeKind::Chunk,
            text: Some(text.into()),
        }
    }

    pub fn entity(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: NodeKind::Entity,
            text: None,
        }
    }

    pub fn is_chunk(&self) -> bool {
        self.kind == NodeKind::Chunk
    }

    pub fn is_entity(&self) -> bool {
        self.kind == NodeKind::Entity
    }
}

/// Edge semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    AppearsIn,
    CoOccurs { weight: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    AppearsIn,
    CoOccurs,
}

/// Edge in node-link form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub source: String,
    pub target: String,
    pub relation: RelationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
}

/// Node-link document: the persisted form of a graph and the shape of every
/// subgraph handed to callers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphData {
    pub nodes: Vec<Node>,
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, PartialEq)]
struct Edge {
    a: usize,
    b: usize,
    relation: Relation,
}

/// Undirected chunk/entity graph.
///
/// Nodes and per-node neighbor lists keep insertion order, so traversal is
/// reproducible across runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GraphData", into = "GraphData")]
pub struct KnowledgeGraph {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
    edges: Vec<Edge>,
    edge_index: HashMap<(usize, usize), usize>,
    adjacency: Vec<Vec<usize>>,
}

fn edge_key(a: usize, b: usize) -> (usize, usize) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn entities(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.is_entity())
    }

    pub fn chunk_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.is_chunk())
    }

    /// Insert a node, or return the index of the existing node with that id.
    pub fn add_node(&mut self, node: Node) -> usize {
        if let Some(&i) = self.index.get(&node.id) {
            return i;
        }
        let i = self.nodes.len();
        self.index.insert(node.id.clone(), i);
        self.nodes.push(node);
        self.adjacency.push(Vec::new());
        i
    }

    /// Add an `appears_in` edge; a repeated link is a no-op.
    pub fn link_appears_in(&mut self, chunk: &str, entity: &str) -> Result<()> {
        let (a, b) = self.endpoints(chunk, entity)?;
        if !self.edge_index.contains_key(&edge_key(a, b)) {
            self.push_edge(a, b, Relation::AppearsIn);
        }
        Ok(())
    }

    /// Bump the co-occurrence weight between two entities, creating the edge
    /// at weight 1. Weights only ever grow.
    pub fn increment_co_occurrence(&mut self, left: &str, right: &str) -> Result<()> {
        let (a, b) = self.endpoints(left, right)?;
        if a == b {
            return Err(Error::InvalidArgument(format!(
                "co-occurrence of '{}' with itself",
                left
            )));
        }
        match self.edge_index.get(&edge_key(a, b)) {
            Some(&e) => match &mut self.edges[e].relation {
                Relation::CoOccurs { weight } => *weight += 1,
                Relation::AppearsIn => {
                    return Err(Error::InvalidArgument(format!(
                        "'{}' and '{}' are already linked by appears_in",
                        left, right
                    )))
                }
            },
            None => self.push_edge(a, b, Relation::CoOccurs { weight: 1 }),
        }
        Ok(())
    }

    fn endpoints(&self, left: &str, right: &str) -> Result<(usize, usize)> {
        let lookup = |id: &str| {
            self.index
                .get(id)
                .copied()
                .ok_or_else(|| Error::InvalidArgument(format!("unknown graph node '{}'", id)))
        };
        Ok((lookup(left)?, lookup(right)?))
    }

    fn push_edge(&mut self, a: usize, b: usize, relation: Relation) {
        let e = self.edges.len();
        self.edges.push(Edge { a, b, relation });
        self.edge_index.insert(edge_key(a, b), e);
        self.adjacency[a].push(e);
        if a != b {
            self.adjacency[b].push(e);
        }
    }

    /// Co-occurrence weight between two entities, if they ever co-occurred.
    pub fn co_occurrence_weight(&self, left: &str, right: &str) -> Option<u32> {
        let (a, b) = self.endpoints(left, right).ok()?;
        let &e = self.edge_index.get(&edge_key(a, b))?;
        match self.edges[e].relation {
            Relation::CoOccurs { weight } => Some(weight),
            Relation::AppearsIn => None,
        }
    }

    /// All edges in insertion order as `(source, target, relation)`.
    pub fn edges(&self) -> impl Iterator<Item = (&Node, &Node, Relation)> {
        self.edges
            .iter()
            .map(|e| (&self.nodes[e.a], &self.nodes[e.b], e.relation))
    }

    /// Neighbors of `id` in edge insertion order; empty for unknown ids.
    pub fn neighbors<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a Node> + 'a {
        let edges = self
            .index
            .get(id)
            .map(|&i| (i, self.adjacency[i].as_slice()));
        edges
            .into_iter()
            .flat_map(move |(i, edges)| {
                edges.iter().map(move |&e| {
                    let edge = &self.edges[e];
                    if edge.a == i {
                        edge.b
                    } else {
                        edge.a
                    }
                })
            })
            .map(move |n| &self.nodes[n])
    }

    pub fn degree(&self, id: &str) -> usize {
        self.index
            .get(id)
            .map(|&i| self.adjacency[i].len())
            .unwrap_or(0)
    }

    /// Node-link form of the whole graph.
    pub fn to_data(&self) -> GraphData {
        GraphData {
            nodes: self.nodes.clone(),
            links: self.edges.iter().map(|e| self.link(e)).collect(),
        }
    }

    fn link(&self, edge: &Edge) -> Link {
        let (relation, weight) = match edge.relation {
            Relation::AppearsIn => (RelationKind::AppearsIn, None),
            Relation::CoOccurs { weight } => (RelationKind::CoOccurs, Some(weight)),
        };
        Link {
            source: self.nodes[edge.a].id.clone(),
            target: self.nodes[edge.b].id.clone(),
            relation,
            weight,
        }
    }

    /// Induced subgraph over the given ids. Unknown ids are ignored; nodes
    /// keep graph insertion order.
    pub fn subgraph<'a, I>(&self, ids: I) -> GraphData
    where
        I: IntoIterator<Item = &'a str>,
    {
        let keep: HashSet<usize> = ids
            .into_iter()
            .filter_map(|id| self.index.get(id).copied())
            .collect();
        self.induced(&keep)
    }

    /// Subgraph of the `limit` highest-degree nodes (ties by insertion order).
    pub fn top_degree_subgraph(&self, limit: usize) -> GraphData {
        let mut order: Vec<usize> = (0..self.nodes.len()).collect();
        order.sort_by(|&x, &y| self.adjacency[y].len().cmp(&self.adjacency[x].len()));
        order.truncate(limit);
        let keep: HashSet<usize> = order.into_iter().collect();
        self.induced(&keep)
    }

    fn induced(&self, keep: &HashSet<usize>) -> GraphData {
        let nodes = (0..self.nodes.len())
            .filter(|i| keep.contains(i))
            .map(|i| self.nodes[i].clone())
            .collect();
        let links = self
            .edges
            .iter()
            .filter(|e| keep.contains(&e.a) && keep.contains(&e.b))
            .map(|e| self.link(e))
            .collect();
        GraphData { nodes, links }
    }
}

impl From<KnowledgeGraph> for GraphData {
    fn from(graph: KnowledgeGraph) -> Self {
        graph.to_data()
    }
}

impl TryFrom<GraphData> for KnowledgeGraph {
    type Error = Error;

    fn try_from(data: GraphData) -> Result<Self> {
        let mut graph = KnowledgeGraph::new();
        for node in data.nodes {
            if graph.contains(&node.id) {
                return Err(Error::SerializationError(format!(
                    "duplicate node '{}'",
                    node.id
                )));
            }
            graph.add_node(node);
        }
        for link in data.links {
            let (a, b) = graph.endpoints(&link.source, &link.target)?;
            let relation = match link.relation {
                RelationKind::AppearsIn => Relation::AppearsIn,
                RelationKind::CoOccurs => Relation::CoOccurs {
                    weight: link.weight.unwrap_or(1),
                },
            };
            graph.push_edge(a, b, relation);
        }
        Ok(graph)
    }
}

/// Builds a [`KnowledgeGraph`] from sealed chunks.
pub struct GraphBuilder<E> {
    extractor: E,
}

impl<E: EntityExtractor> GraphBuilder<E> {
    pub fn new(extractor: E) -> Self {
        Self { extractor }
    }

    /// Normalized, deduplicated entities for one chunk. Extraction failure
    /// yields an empty set.
    fn entities_for(&self, chunk: &Chunk) -> BTreeSet<String> {
        let raw = match self.extractor.extract(&chunk.text) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(chunk = chunk.id, "Entity extraction failed, keeping chunk without entities: {}", err);
                metrics::record_degraded(Collaborator::EntityExtractor);
                return BTreeSet::new();
            }
        };

        raw.iter()
            .map(|e| normalize_entity(e))
            .filter(|e| !e.is_empty())
            .filter(|e| {
                let collides = e.starts_with(CHUNK_KEY_PREFIX);
                if collides {
                    debug!(entity = %e, "Dropping entity in chunk key namespace");
                }
                !collides
            })
            .collect()
    }

    /// Build the graph from chunks in input order.
    pub fn build(&self, chunks: &[Chunk]) -> Result<KnowledgeGraph> {
        let mut graph = KnowledgeGraph::new();

        for chunk in chunks {
            let key = chunk.key();
            if graph.contains(&key) {
                return Err(Error::InvalidArgument(format!(
                    "duplicate chunk id {}",
                    chunk.id
                )));
            }
            graph.add_node(Node::chunk(key.clone(), chunk.text.clone()));

            let entities: Vec<String> = self.entities_for(chunk).into_iter().collect();
            for entity in &entities {
                graph.add_node(Node::entity(entity.clone()));
                graph.link_appears_in(&key, entity)?;
            }

            for (i, left) in entities.iter().enumerate() {
                for right in &entities[i + 1..] {
                    graph.increment_co_occurrence(left, right)?;
                }
            }
        }

        info!(
            chunks = chunks.len(),
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "Knowledge graph built"
        );
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Returns canned entity sets keyed by chunk text.
    struct MapExtractor(HashMap<String, Vec<String>>);

    impl MapExtractor {
        fn new(entries: &[(&str, Vec<&str>)]) -> Self {
            Self(
                entries
                    .iter()
                    .map(|(text, ents)| {
                        (text.to_string(), ents.iter().map(|e| e.to_string()).collect())
                    })
                    .collect(),
            )
        }
    }

    impl EntityExtractor for MapExtractor {
        fn extract(&self, text: &str) -> Result<BTreeSet<String>> {
            match self.0.get(text) {
                Some(ents) => Ok(ents.iter().cloned().collect()),
                None => Err(Error::Extraction(format!("no entry for '{}'", text))),
            }
        }
    }

    fn chunk(id: usize, text: &str) -> Chunk {
        Chunk {
            id,
            text: text.to_string(),
            token_count: text.split_whitespace().count(),
            embedding: vec![1.0],
        }
    }

    #[test]
    fn builds_chunk_and_entity_nodes() {
        let extractor = MapExtractor::new(&[
            ("first", vec!["Caste", "Society"]),
            ("second", vec!["Caste"]),
        ]);
        let graph = GraphBuilder::new(extractor)
            .build(&[chunk(0, "first"), chunk(1, "second")])
            .unwrap();

        assert_eq!(graph.chunk_nodes().count(), 2);
        assert_eq!(graph.entities().count(), 2);
        assert_eq!(graph.node("CHUNK_0").unwrap().text.as_deref(), Some("first"));
        assert!(graph.node("Caste").unwrap().is_entity());

        let caste_neighbors: Vec<&str> = graph.neighbors("Caste").map(|n| n.id.as_str()).collect();
        assert_eq!(caste_neighbors, vec!["CHUNK_0", "Society", "CHUNK_1"]);
        assert_eq!(graph.co_occurrence_weight("Caste", "Society"), Some(1));
        assert_eq!(graph.co_occurrence_weight("Caste", "CHUNK_0"), None);
    }

    #[test]
    fn co_occurrence_weight_counts_shared_chunks() {
        let extractor = MapExtractor::new(&[
            ("a", vec!["X", "Y", "Z"]),
            ("b", vec!["Y", "X"]),
            ("c", vec!["X", "Y"]),
            ("d", vec!["Z"]),
        ]);
        let graph = GraphBuilder::new(extractor)
            .build(&[chunk(0, "a"), chunk(1, "b"), chunk(2, "c"), chunk(3, "d")])
            .unwrap();

        assert_eq!(graph.co_occurrence_weight("X", "Y"), Some(3));
        assert_eq!(graph.co_occurrence_weight("Y", "X"), Some(3));
        assert_eq!(graph.co_occurrence_weight("X", "Z"), Some(1));
        assert_eq!(graph.co_occurrence_weight("Y", "Z"), Some(1));
    }

    #[test]
    fn chunk_order_does_not_change_weights_or_degrees() {
        let entries = [
            ("a", vec!["Caste", "Society", "Endogamy"]),
            ("b", vec!["Caste", "Society"]),
            ("c", vec!["Society", "Endogamy"]),
        ];
        let forward = [chunk(0, "a"), chunk(1, "b"), chunk(2, "c")];
        let reversed = [chunk(2, "c"), chunk(1, "b"), chunk(0, "a")];

        let g1 = GraphBuilder::new(MapExtractor::new(&entries)).build(&forward).unwrap();
        let g2 = GraphBuilder::new(MapExtractor::new(&entries)).build(&reversed).unwrap();

        assert_eq!(g1.co_occurrence_weight("Caste", "Society"), Some(2));
        assert_eq!(g1.co_occurrence_weight("Society", "Endogamy"), Some(2));
        assert_eq!(g1.co_occurrence_weight("Caste", "Endogamy"), Some(1));
        for (l, r) in [("Caste", "Society"), ("Society", "Endogamy"), ("Endogamy", "Caste")] {
            assert_eq!(g1.co_occurrence_weight(l, r), g2.co_occurrence_weight(l, r));
        }

        assert_eq!(g1.node_count(), g2.node_count());
        assert_eq!(g1.edge_count(), g2.edge_count());
        for id in ["Caste", "Society", "Endogamy", "CHUNK_0", "CHUNK_1", "CHUNK_2"] {
            assert_eq!(g1.degree(id), g2.degree(id), "degree of {id}");
        }
    }

    #[test]
    fn extraction_failure_keeps_chunk_without_entities() {
        let extractor = MapExtractor::new(&[("good", vec!["Caste"])]);
        let graph = GraphBuilder::new(extractor)
            .build(&[chunk(0, "good"), chunk(1, "broken")])
            .unwrap();

        assert!(graph.contains("CHUNK_1"));
        assert_eq!(graph.degree("CHUNK_1"), 0);
        assert_eq!(graph.degree("CHUNK_0"), 1);
    }

    #[test]
    fn entities_are_normalized_before_dedup() {
        let extractor = MapExtractor::new(&[("a", vec!["  Hindu   Society ", "Hindu Society", ""])]);
        let graph = GraphBuilder::new(extractor).build(&[chunk(0, "a")]).unwrap();

        let entities: Vec<&str> = graph.entities().map(|n| n.id.as_str()).collect();
        assert_eq!(entities, vec!["Hindu Society"]);
    }

    #[test]
    fn drops_entities_in_chunk_namespace() {
        let extractor = MapExtractor::new(&[("a", vec!["CHUNK_7", "Caste"])]);
        let graph = GraphBuilder::new(extractor).build(&[chunk(0, "a")]).unwrap();

        assert!(!graph.contains("CHUNK_7"));
        assert!(graph.contains("Caste"));
    }

    #[test]
    fn rejects_duplicate_chunk_ids() {
        let extractor = MapExtractor::new(&[("a", vec![])]);
        let err = GraphBuilder::new(extractor)
            .build(&[chunk(0, "a"), chunk(0, "a")])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn neighbors_of_unknown_node_is_empty() {
        let graph = KnowledgeGraph::new();
        assert_eq!(graph.neighbors("missing").count(), 0);
        assert_eq!(graph.degree("missing"), 0);
    }

    #[test]
    fn node_link_json_roundtrip_preserves_weights() {
        let extractor = MapExtractor::new(&[("a", vec!["X", "Y"]), ("b", vec!["X", "Y"])]);
        let graph = GraphBuilder::new(extractor)
            .build(&[chunk(0, "a"), chunk(1, "b")])
            .unwrap();

        let json = serde_json::to_value(&graph).unwrap();
        assert!(json["nodes"].is_array());
        let co = json["links"]
            .as_array()
            .unwrap()
            .iter()
            .find(|l| l["relation"] == "co_occurs")
            .unwrap();
        assert_eq!(co["weight"], 2);

        let restored: KnowledgeGraph = serde_json::from_value(json).unwrap();
        assert_eq!(restored, graph);
        assert_eq!(restored.co_occurrence_weight("X", "Y"), Some(2));
    }

    #[test]
    fn rejects_links_to_unknown_nodes() {
        let json = serde_json::json!({
            "nodes": [{"id": "X", "kind": "entity"}],
            "links": [{"source": "X", "target": "Y", "relation": "co_occurs", "weight": 1}]
        });
        assert!(serde_json::from_value::<KnowledgeGraph>(json).is_err());
    }

    #[test]
    fn subgraph_keeps_induced_links_only() {
        let extractor = MapExtractor::new(&[("a", vec!["X", "Y"]), ("b", vec!["Z"])]);
        let graph = GraphBuilder::new(extractor)
            .build(&[chunk(0, "a"), chunk(1, "b")])
            .unwrap();

        let sub = graph.subgraph(["X", "Y", "nope"]);
        assert_eq!(sub.nodes.len(), 2);
        assert_eq!(sub.links.len(), 1);
        assert_eq!(sub.links[0].relation, RelationKind::CoOccurs);
    }

    #[test]
    fn top_degree_subgraph_prefers_hubs() {
        let extractor = MapExtractor::new(&[
            ("a", vec!["Hub", "P"]),
            ("b", vec!["Hub", "Q"]),
            ("c", vec!["Hub", "R"]),
        ]);
        let chunks = [chunk(0, "a"), chunk(1, "b"), chunk(2, "c")];
        let graph = GraphBuilder::new(extractor).build(&chunks).unwrap();

        let top = graph.top_degree_subgraph(1);
        assert_eq!(top.nodes.len(), 1);
        assert_eq!(top.nodes[0].id, "Hub");
        assert!(top.links.is_empty());

        let all = graph.top_degree_subgraph(300);
        assert_eq!(all.nodes.len(), graph.node_count());
        assert_eq!(all.links.len(), graph.edge_count());
    }
}
