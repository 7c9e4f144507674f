// crates/trustgate-daemon/src/shared.rs
//
// DaemonSharedState: everything the daemon's tasks share.
//
// Constructed once in main.rs, then cloned into the reload scheduler, the
// ingress listener and every per-frame task.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;

use trustgate_admission::AdmissionGate;
use trustgate_core::BrokerId;
use trustgate_reputation::SnapshotCell;
use trustgate_store::ReputationStore;

use crate::feedback::FeedbackPublisher;

/// File locations with `~/` already expanded.
#[derive(Debug, Clone)]
pub struct DaemonPaths {
    pub topology: PathBuf,
    pub store_dir: PathBuf,
    pub network_map: PathBuf,
}

#[derive(Clone)]
pub struct DaemonSharedState {
    pub broker_id: BrokerId,
    pub paths: DaemonPaths,
    /// Base rate used to derive and invert scores.
    pub delta: f64,
    /// Current trust snapshot; replaced on reload and on (coalesced) feedback.
    pub snapshots: Arc<SnapshotCell>,
    /// Admission pipeline shared by every ingress task.
    pub gate: Arc<AdmissionGate>,
    /// This broker's own reputation store. Single writer: this daemon.
    pub store: Arc<Mutex<ReputationStore>>,
    pub feedback_topic: String,
    pub negative_multiplier: u64,
    /// Spaces out snapshots published because of feedback.
    pub feedback_publisher: Arc<FeedbackPublisher>,
    /// Daemon start time for uptime reporting.
    pub start_time: Instant,
}

/// Daemon state over a fresh temp directory. Topology: B0->B1, B2->B1,
/// B1->B2, all at the base rate. Client "C1" may publish. Every feedback
/// report publishes at once.
#[cfg(test)]
pub(crate) fn test_state(broker: &str, tag: &str) -> (DaemonSharedState, PathBuf) {
    test_state_with(
        broker,
        tag,
        trustgate_admission::AdmissionConfig::default(),
        std::time::Duration::ZERO,
    )
}

#[cfg(test)]
pub(crate) fn test_state_with(
    broker: &str,
    tag: &str,
    admission: trustgate_admission::AdmissionConfig,
    feedback_gap: std::time::Duration,
) -> (DaemonSharedState, PathBuf) {
    use trustgate_core::MessageAuthenticator;
    use trustgate_reputation::TrustGraph;
    use trustgate_verify::{SignerChainVerifier, VerifierConfig};

    let dir = std::env::temp_dir().join(format!("trustgate_test_{}_{}", tag, uuid::Uuid::now_v7()));
    std::fs::create_dir_all(&dir).unwrap();

    let topology = vec![
        (BrokerId::from("B0"), BrokerId::from("B1")),
        (BrokerId::from("B2"), BrokerId::from("B1")),
        (BrokerId::from("B1"), BrokerId::from("B2")),
    ];
    let snapshots = Arc::new(SnapshotCell::new(TrustGraph::seeded(&topology, 0.5), 1024));
    let gate = AdmissionGate::new(
        MessageAuthenticator::new("test-secret").unwrap(),
        SignerChainVerifier::new(VerifierConfig::new(broker).with_clients(["C1"])).unwrap(),
        Arc::clone(&snapshots),
        &admission,
    )
    .unwrap();
    let store = ReputationStore::open(&dir, BrokerId::from(broker)).unwrap();

    let state = DaemonSharedState {
        broker_id: BrokerId::from(broker),
        paths: DaemonPaths {
            topology: dir.join("topology.txt"),
            store_dir: dir.clone(),
            network_map: dir.join("network_map.txt"),
        },
        delta: 0.5,
        snapshots,
        gate: Arc::new(gate),
        store: Arc::new(Mutex::new(store)),
        feedback_topic: "internal/feedback".to_string(),
        negative_multiplier: 5,
        feedback_publisher: Arc::new(FeedbackPublisher::new(feedback_gap)),
        start_time: Instant::now(),
    };
    (state, dir)
}
