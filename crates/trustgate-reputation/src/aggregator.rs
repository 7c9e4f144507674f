// crates/trustgate-reputation/src/aggregator.rs
//
// Trust aggregation: merge every broker's reputation store into the base
// topology and publish one authoritative network map.
//
// Each store holds its owner's opinions about other brokers, so a line
// `source,r,s` in B1's store sets the counters of edge `source -> B1`.
// Stores are visited in sorted broker order and the map is rendered sorted,
// so identical inputs always produce the same graph and the same map body.
// A missing store is skipped; a missing topology aborts the run before
// anything is written.

use std::path::Path;

use chrono::{DateTime, Utc};
use trustgate_core::{BrokerId, StoreSource, TrustGateError};
use trustgate_store::{read_topology, write_network_map};

use crate::score::validate_base_rate;
use crate::trust_graph::TrustGraph;

/// Counts from one aggregation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregationReport {
    /// Edges in the resulting graph.
    pub edges: usize,
    /// Stores that were read.
    pub stores_read: usize,
    /// Stores that were missing or unreadable and skipped.
    pub stores_skipped: usize,
    /// Store lines applied to a topology edge.
    pub lines_applied: usize,
    /// Store lines naming an edge outside the topology.
    pub lines_discarded: usize,
}

/// Merge `stores` into `topology`.
pub fn aggregate(
    topology: &[(BrokerId, BrokerId)],
    stores: &dyn StoreSource,
    delta: f64,
) -> TrustGraph {
    aggregate_with_report(topology, stores, delta).0
}

/// Merge `stores` into `topology`, also returning per-run counts.
pub fn aggregate_with_report(
    topology: &[(BrokerId, BrokerId)],
    stores: &dyn StoreSource,
    delta: f64,
) -> (TrustGraph, AggregationReport) {
    let mut graph = TrustGraph::seeded(topology, delta);
    let mut report = AggregationReport::default();

    for owner in graph.targets() {
        let lines = match stores.load_store(&owner) {
            Ok(lines) => lines,
            Err(e) => {
                tracing::warn!("Skipping store for {}: {}", owner, e);
                report.stores_skipped += 1;
                continue;
            }
        };
        report.stores_read += 1;

        let (applied, rejected) = graph.apply_store(&owner, &lines);
        report.lines_applied += applied;
        report.lines_discarded += rejected.len();
        for line in &rejected {
            tracing::warn!(
                "Store of {} reports link {}->{} which is not in the base topology; ignoring",
                owner,
                line.source,
                owner
            );
        }
        tracing::debug!("Applied {} lines from store of {}", applied, owner);
    }

    report.edges = graph.edge_count();
    (graph, report)
}

/// One full aggregator invocation: read the topology, merge the stores,
/// atomically replace the network map.
///
/// Returns `TopologyUnavailable` without touching the existing map when the
/// topology file is missing.
pub fn run_aggregation(
    topology_path: &Path,
    stores: &dyn StoreSource,
    network_map_path: &Path,
    delta: f64,
    now: DateTime<Utc>,
) -> Result<(TrustGraph, AggregationReport), TrustGateError> {
    validate_base_rate(delta)?;
    tracing::info!("Starting trust map aggregation from {}", topology_path.display());
    let topology = read_topology(topology_path)?;
    tracing::info!("Loaded base topology with {} edges", topology.len());

    let (graph, report) = aggregate_with_report(&topology, stores, delta);
    write_network_map(network_map_path, &graph.to_map_lines(), now)?;

    tracing::info!(
        "Aggregation complete: {} edges, {} stores read, {} skipped, {} lines discarded",
        report.edges,
        report.stores_read,
        report.stores_skipped,
        report.lines_discarded
    );
    Ok((graph, report))
}
