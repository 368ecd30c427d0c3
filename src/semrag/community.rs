//! Community detection over the knowledge graph.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info, warn};

use super::graph::{KnowledgeGraph, Relation};
use crate::config::CommunityConfig;
use crate::metrics::{self, Collaborator};
use crate::Result;

/// Community id → member node ids (graph insertion order).
pub type CommunityPartition = BTreeMap<usize, Vec<String>>;

/// Graph → flat node → community-id assignment.
pub trait CommunityDetector: Send + Sync {
    fn detect(&self, graph: &KnowledgeGraph) -> Result<HashMap<String, usize>>;
}

/// Weighted, deterministic label propagation.
///
/// Every node starts in its own community. Nodes are visited in graph
/// insertion order and adopt the label with the largest summed edge weight
/// among their neighbors (`appears_in` counts 1, `co_occurs` its weight).
/// A node keeps its current label when that label is among the best; other
/// ties go to the smallest label. Sweeps stop when nothing changes or after
/// `max_iterations`. Labels are renumbered 0.. in order of first appearance.
#[derive(Debug, Clone)]
pub struct LabelPropagation {
    max_iterations: usize,
}

impl Default for LabelPropagation {
    fn default() -> Self {
        Self::new(CommunityConfig::default().max_iterations)
    }
}

impl LabelPropagation {
    pub fn new(max_iterations: usize) -> Self {
        Self { max_iterations }
    }

    pub fn from_config(config: &CommunityConfig) -> Self {
        Self::new(config.max_iterations)
    }

    fn weighted_adjacency(graph: &KnowledgeGraph) -> (Vec<&str>, Vec<Vec<(usize, u64)>>) {
        let ids: Vec<&str> = graph.nodes().map(|n| n.id.as_str()).collect();
        let position: HashMap<&str, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let mut adjacency = vec![Vec::new(); ids.len()];

        for (source, target, relation) in graph.edges() {
            let weight = match relation {
                Relation::AppearsIn => 1,
                Relation::CoOccurs { weight } => u64::from(weight),
            };
            let (a, b) = (position[source.id.as_str()], position[target.id.as_str()]);
            adjacency[a].push((b, weight));
            if a != b {
                adjacency[b].push((a, weight));
            }
        }

        (ids, adjacency)
    }
}

impl CommunityDetector for LabelPropagation {
    fn detect(&self, graph: &KnowledgeGraph) -> Result<HashMap<String, usize>> {
        let (ids, adjacency) = Self::weighted_adjacency(graph);
        let mut labels: Vec<usize> = (0..ids.len()).collect();

        for sweep in 0..self.max_iterations {
            let mut changed = false;

            for node in 0..ids.len() {
                if adjacency[node].is_empty() {
                    continue;
                }

                let mut votes: BTreeMap<usize, u64> = BTreeMap::new();
                for &(neighbor, weight) in &adjacency[node] {
                    *votes.entry(labels[neighbor]).or_insert(0) += weight;
                }

                let best = votes.values().copied().max().unwrap_or(0);
                let current = labels[node];
                if votes.get(&current) == Some(&best) {
                    continue;
                }
                // BTreeMap iterates labels ascending: first hit is the smallest.
                if let Some((&label, _)) = votes.iter().find(|(_, &w)| w == best) {
                    labels[node] = label;
                    changed = true;
                }
            }

            if !changed {
                debug!(sweeps = sweep + 1, "Label propagation converged");
                break;
            }
        }

        let mut renumber: HashMap<usize, usize> = HashMap::new();
        let assignment = ids
            .iter()
            .zip(&labels)
            .map(|(id, label)| {
                let next = renumber.len();
                let community = *renumber.entry(*label).or_insert(next);
                (id.to_string(), community)
            })
            .collect();

        Ok(assignment)
    }
}

/// Run the detector once and invert its output into community → members.
///
/// A failing detector yields an empty partition: global search then has
/// nothing to offer, but the build carries on.
pub fn partition<D: CommunityDetector + ?Sized>(
    detector: &D,
    graph: &KnowledgeGraph,
) -> CommunityPartition {
    let assignment = match detector.detect(graph) {
        Ok(assignment) => assignment,
        Err(err) => {
            warn!("Community detection failed, continuing without communities: {}", err);
            metrics::record_degraded(Collaborator::CommunityDetector);
            return CommunityPartition::new();
        }
    };

    let mut communities = CommunityPartition::new();
    for node in graph.nodes() {
        if let Some(&community) = assignment.get(&node.id) {
            communities
                .entry(community)
                .or_default()
                .push(node.id.clone());
        }
    }

    info!(
        communities = communities.len(),
        nodes = graph.node_count(),
        "Graph partitioned"
    );
    communities
}
