// crates/trustgate-daemon/src/scheduler.rs
//
// Periodic trust refresh.
//
// Every interval the daemon (optionally) runs the aggregator, then rebuilds
// its working graph: the published network map first, then its own store
// on top, since the broker is authoritative for edges that target it. The
// result is published as a new snapshot; frames already being verified keep
// the snapshot they started with. File work runs on the blocking pool.

use std::path::Path;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use trustgate_core::TrustGateError;
use trustgate_reputation::{run_aggregation, TrustGraph};
use trustgate_store::{read_network_map, ReputationStore, StoreDirectory};

use crate::feedback::flush_pending_feedback;
use crate::shared::DaemonSharedState;

/// Build the working graph from the map at `map_path` overlaid with `store`.
pub fn rebuild_graph(
    map_path: &Path,
    store: &ReputationStore,
    delta: f64,
) -> Result<TrustGraph, TrustGateError> {
    let lines = read_network_map(map_path)?;
    let mut graph = TrustGraph::from_map_lines(&lines, delta);
    let (applied, rejected) = graph.apply_store(store.owner(), &store.lines());
    tracing::debug!(
        "Overlaid {} local entries ({} not in map) onto {} edges",
        applied,
        rejected.len(),
        graph.edge_count()
    );
    Ok(graph)
}

/// One refresh round on the blocking pool. Errors leave the current
/// snapshot in place.
pub async fn refresh_once(shared: &DaemonSharedState, run_aggregator: bool) {
    let state = shared.clone();
    let task = tokio::task::spawn_blocking(move || refresh_blocking(&state, run_aggregator));
    if let Err(e) = task.await {
        tracing::error!("Refresh task failed: {}", e);
    }
}

/// Aggregate (optionally), rebuild from the map and the local store, and
/// publish. Blocking: file I/O and the store lock.
fn refresh_blocking(shared: &DaemonSharedState, run_aggregator: bool) {
    if run_aggregator {
        let stores = StoreDirectory::new(&shared.paths.store_dir);
        if let Err(e) = run_aggregation(
            &shared.paths.topology,
            &stores,
            &shared.paths.network_map,
            shared.delta,
            Utc::now(),
        ) {
            tracing::error!("Aggregation failed, keeping previous map: {}", e);
        }
    }

    // Held through publish so a concurrent feedback update is not lost.
    let store = shared.store.blocking_lock();
    match rebuild_graph(&shared.paths.network_map, &store, shared.delta) {
        Ok(graph) => {
            let snapshot = shared.snapshots.publish(graph);
            shared.feedback_publisher.clear_pending();
            tracing::debug!(
                "Published trust snapshot v{} ({} edges)",
                snapshot.version(),
                snapshot.graph().edge_count()
            );
        }
        Err(e) => tracing::warn!("Map reload skipped: {}", e),
    }
}

/// Publish deferred feedback, if any, on the blocking pool.
pub async fn flush_feedback(shared: &DaemonSharedState) {
    if !shared.feedback_publisher.is_pending() {
        return;
    }
    let state = shared.clone();
    let task = tokio::task::spawn_blocking(move || flush_pending_feedback(&state, Instant::now()));
    match task.await {
        Ok(Some(version)) => tracing::debug!("Published deferred feedback as snapshot v{}", version),
        Ok(None) => {}
        Err(e) => tracing::error!("Feedback flush task failed: {}", e),
    }
}

/// Run refresh rounds every `interval_secs`, and flush deferred feedback
/// every feedback gap, until shutdown.
pub async fn run_refresh_loop(shared: DaemonSharedState, interval_secs: u64, run_aggregator: bool) {
    tracing::info!(
        "Trust refresh loop started (interval={}s, aggregator={})",
        interval_secs,
        run_aggregator
    );
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    let feedback_gap = shared.feedback_publisher.min_gap().max(Duration::from_millis(10));
    let mut feedback_tick = tokio::time::interval(feedback_gap);
    feedback_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Trust refresh loop received shutdown signal");
                break;
            }
            _ = interval.tick() => {
                refresh_once(&shared, run_aggregator).await;
            }
            _ = feedback_tick.tick() => {
                flush_feedback(&shared).await;
            }
        }
    }
}

/// Initial graph at startup: the map plus the local store if a map exists,
/// otherwise the topology with the local store, otherwise empty.
pub fn initial_graph(
    map_path: &Path,
    topology_path: &Path,
    store: &ReputationStore,
    delta: f64,
) -> TrustGraph {
    match rebuild_graph(map_path, store, delta) {
        Ok(graph) => return graph,
        Err(e) => tracing::warn!("No usable network map yet: {}", e),
    }
    match trustgate_store::read_topology(topology_path) {
        Ok(topology) => {
            let mut graph = TrustGraph::seeded(&topology, delta);
            graph.apply_store(store.owner(), &store.lines());
            graph
        }
        Err(e) => {
            tracing::warn!("Starting with an empty trust graph: {}", e);
            TrustGraph::empty(delta)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use trustgate_core::{BrokerId, Outcome};
    use uuid::Uuid;

    fn id(s: &str) -> BrokerId {
        BrokerId::from(s)
    }

    #[test]
    fn local_store_overrides_map_for_own_edges() {
        let dir = std::env::temp_dir().join(format!("trustgate_test_reload_{}", Uuid::now_v7()));
        fs::create_dir_all(&dir).unwrap();
        let map = dir.join("network_map.txt");
        fs::write(&map, "# header\nB0,B1,0.500\nB1,B2,0.750\nB3,B1,0.500\n").unwrap();

        let mut store = ReputationStore::open(&dir, id("B1")).unwrap();
        for _ in 0..8 {
            store.record(&id("B1"), &id("B0"), Outcome::Positive).unwrap();
        }
        // Not an edge in the map: must not be introduced.
        store.record(&id("B1"), &id("B9"), Outcome::Positive).unwrap();

        let graph = rebuild_graph(&map, &store, 0.5).unwrap();
        assert!((graph.edge_score(&id("B0"), &id("B1")).unwrap() - 0.9).abs() < 1e-12);
        assert!((graph.edge_score(&id("B1"), &id("B2")).unwrap() - 0.75).abs() < 1e-12);
        assert!(!graph.contains_edge(&id("B9"), &id("B1")));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn initial_graph_falls_back_to_topology() {
        let dir = std::env::temp_dir().join(format!("trustgate_test_init_{}", Uuid::now_v7()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("topology.txt"), "B0,B1\n").unwrap();
        let store = ReputationStore::open(&dir, id("B1")).unwrap();

        let graph = initial_graph(&dir.join("missing_map.txt"), &dir.join("topology.txt"), &store, 0.5);
        assert_eq!(graph.edge_count(), 1);

        let empty = initial_graph(&dir.join("a"), &dir.join("b"), &store, 0.5);
        assert!(empty.is_empty());
        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn refresh_publishes_aggregated_map_and_clears_deferred_feedback() {
        let (shared, dir) = crate::shared::test_state_with(
            "B1",
            "refresh",
            trustgate_admission::AdmissionConfig::default(),
            Duration::from_secs(60),
        );
        fs::write(&shared.paths.topology, "B0,B1\nB2,B1\nB1,B2\n").unwrap();
        {
            let mut store = shared.store.lock().await;
            for _ in 0..6 {
                store.record(&id("B1"), &id("B0"), Outcome::Positive).unwrap();
            }
        }
        assert!(shared.feedback_publisher.claim(Instant::now()));
        assert!(!shared.feedback_publisher.claim(Instant::now()));
        assert!(shared.feedback_publisher.is_pending());
        let before = shared.snapshots.version();

        refresh_once(&shared, true).await;

        assert!(shared.paths.network_map.exists());
        let snap = shared.snapshots.current();
        assert_eq!(snap.version(), before + 1);
        assert!((snap.graph().edge_score(&id("B0"), &id("B1")).unwrap() - 0.875).abs() < 1e-12);
        assert!(!shared.feedback_publisher.is_pending());
        let _ = fs::remove_dir_all(&dir);
    }
}
