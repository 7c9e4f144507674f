// crates/trustgate-reputation/src/trust_graph.rs
//
// Trust graph: directed source -> target edges carrying (r, s) counters.
//
// The edge set is fixed when the graph is seeded from the base topology.
// Later updates can only change counters on edges that already exist, so a
// store cannot fabricate a trust link the topology never declared.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use trustgate_core::{BrokerId, StoreLine};
use trustgate_store::MapLine;

use crate::score::{counters_from_score, score};

/// Observation counters on one directed edge. The score is always derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustEdge {
    pub r: i64,
    pub s: i64,
}

impl TrustEdge {
    pub fn new(r: i64, s: i64) -> Self {
        Self { r, s }
    }

    pub fn score(&self, delta: f64) -> f64 {
        score(self.r, self.s, delta)
    }
}

/// Directed trust graph restricted to a base topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustGraph {
    /// Base rate used to derive edge scores.
    delta: f64,
    /// source -> target -> counters. Ordered so iteration is deterministic.
    edges: BTreeMap<BrokerId, BTreeMap<BrokerId, TrustEdge>>,
}

impl TrustGraph {
    /// An empty graph (no topology).
    pub fn empty(delta: f64) -> Self {
        Self {
            delta,
            edges: BTreeMap::new(),
        }
    }

    /// Seed every topology edge with zero counters, i.e. the base-rate score.
    pub fn seeded(topology: &[(BrokerId, BrokerId)], delta: f64) -> Self {
        let mut edges: BTreeMap<BrokerId, BTreeMap<BrokerId, TrustEdge>> = BTreeMap::new();
        for (source, target) in topology {
            edges
                .entry(source.clone())
                .or_default()
                .insert(target.clone(), TrustEdge::default());
        }
        Self { delta, edges }
    }

    /// Rebuild a graph from a published network map, inverting each score
    /// back to counters.
    pub fn from_map_lines(lines: &[MapLine], delta: f64) -> Self {
        let mut edges: BTreeMap<BrokerId, BTreeMap<BrokerId, TrustEdge>> = BTreeMap::new();
        for line in lines {
            let (r, s) = counters_from_score(line.score, delta);
            edges.entry(line.source.clone()).or_default().insert(
                line.target.clone(),
                TrustEdge::new(r as i64, s as i64),
            );
        }
        Self { delta, edges }
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }

    pub fn contains_edge(&self, source: &BrokerId, target: &BrokerId) -> bool {
        self.edge(source, target).is_some()
    }

    pub fn edge(&self, source: &BrokerId, target: &BrokerId) -> Option<&TrustEdge> {
        self.edges.get(source).and_then(|row| row.get(target))
    }

    /// Derived score of an existing edge.
    pub fn edge_score(&self, source: &BrokerId, target: &BrokerId) -> Option<f64> {
        self.edge(source, target).map(|e| e.score(self.delta))
    }

    /// Score used for evaluation: an absent edge counts as unobserved.
    pub fn trust(&self, source: &BrokerId, target: &BrokerId) -> f64 {
        self.edge_score(source, target)
            .unwrap_or_else(|| score(0, 0, self.delta))
    }

    /// Overwrite the counters of an existing edge. Returns `false` (and
    /// changes nothing) if the edge is not part of the topology.
    pub fn set_counters(&mut self, source: &BrokerId, target: &BrokerId, r: i64, s: i64) -> bool {
        match self.edges.get_mut(source).and_then(|row| row.get_mut(target)) {
            Some(edge) => {
                *edge = TrustEdge::new(r, s);
                true
            }
            None => false,
        }
    }

    /// Apply one broker's store to the edges that target it.
    ///
    /// Returns the number of lines applied and the lines that named an edge
    /// outside the topology.
    pub fn apply_store(&mut self, owner: &BrokerId, lines: &[StoreLine]) -> (usize, Vec<StoreLine>) {
        let mut applied = 0;
        let mut rejected = Vec::new();
        for line in lines {
            if self.set_counters(&line.source, owner, line.r, line.s) {
                applied += 1;
            } else {
                rejected.push(line.clone());
            }
        }
        (applied, rejected)
    }

    /// Iterate edges in (source, target) order.
    pub fn edges(&self) -> impl Iterator<Item = (&BrokerId, &BrokerId, &TrustEdge)> {
        self.edges
            .iter()
            .flat_map(|(source, row)| row.iter().map(move |(target, edge)| (source, target, edge)))
    }

    /// The (source, target) pairs of this graph, usable as a topology.
    pub fn topology(&self) -> Vec<(BrokerId, BrokerId)> {
        self.edges()
            .map(|(s, t, _)| (s.clone(), t.clone()))
            .collect()
    }

    /// Every broker that is the target of at least one edge, sorted.
    pub fn targets(&self) -> BTreeSet<BrokerId> {
        self.edges().map(|(_, t, _)| t.clone()).collect()
    }

    /// Every broker that appears on either end of an edge, sorted.
    pub fn brokers(&self) -> BTreeSet<BrokerId> {
        self.edges()
            .flat_map(|(s, t, _)| [s.clone(), t.clone()])
            .collect()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(|row| row.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.edge_count() == 0
    }

    /// Network-map lines with derived scores.
    pub fn to_map_lines(&self) -> Vec<MapLine> {
        self.edges()
            .map(|(source, target, edge)| MapLine {
                source: source.clone(),
                target: target.clone(),
                score: edge.score(self.delta),
            })
            .collect()
    }
}
