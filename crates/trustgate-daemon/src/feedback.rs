// crates/trustgate-daemon/src/feedback.rs
//
// Feedback observations published on the feedback topic.
//
// A broker only records feedback about edges that end at itself and that
// exist in its current trust graph. Positive feedback adds one to `r`;
// negative feedback adds `negative_multiplier` to `s`. The store is
// persisted at once. Snapshot publishes are coalesced: at most one per
// `min_gap`, with anything recorded in between published by the refresh
// loop's feedback tick, so a stream of feedback cannot keep discarding the
// evaluator memo.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use trustgate_core::{BrokerId, Outcome, ReasonCode, TrustGateError};
use trustgate_reputation::TrustSnapshot;
use trustgate_store::ReputationStore;

use crate::shared::DaemonSharedState;

/// Body of a feedback frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackMessage {
    pub source: String,
    pub target: String,
    pub feedback: String,
}

/// What happened to one feedback frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackOutcome {
    Recorded,
    RateLimited,
    Overloaded,
    Malformed,
    /// Addressed to another broker.
    NotForThisBroker,
    /// The `source -> self` edge is not in the trust graph.
    UnknownEdge,
    UnknownFeedback,
    StoreError,
}

/// Topic a processed feedback frame is re-published under.
pub fn processed_topic(feedback_topic: &str) -> String {
    format!("{}/processed", feedback_topic.trim_end_matches('/'))
}

#[derive(Debug, Default)]
struct PublishState {
    last: Option<Instant>,
    pending: bool,
}

/// Rate limit on snapshots published because of feedback.
#[derive(Debug)]
pub struct FeedbackPublisher {
    min_gap: Duration,
    state: Mutex<PublishState>,
}

impl FeedbackPublisher {
    pub fn new(min_gap: Duration) -> Self {
        Self {
            min_gap,
            state: Mutex::new(PublishState::default()),
        }
    }

    pub fn min_gap(&self) -> Duration {
        self.min_gap
    }

    /// True when recorded feedback is waiting for a publish.
    pub fn is_pending(&self) -> bool {
        self.lock().pending
    }

    /// Claim a publish for feedback recorded at `now`. Within `min_gap` of
    /// the previous feedback publish the update is only marked pending.
    pub fn claim(&self, now: Instant) -> bool {
        let mut state = self.lock();
        if self.too_soon(&state, now) {
            state.pending = true;
            return false;
        }
        state.last = Some(now);
        state.pending = false;
        true
    }

    /// Claim the publish of pending feedback once `min_gap` has passed.
    pub fn claim_pending(&self, now: Instant) -> bool {
        let mut state = self.lock();
        if !state.pending || self.too_soon(&state, now) {
            return false;
        }
        state.last = Some(now);
        state.pending = false;
        true
    }

    /// A full rebuild already carried the store into a snapshot.
    pub fn clear_pending(&self) {
        self.lock().pending = false;
    }

    fn too_soon(&self, state: &PublishState, now: Instant) -> bool {
        state
            .last
            .is_some_and(|last| now.saturating_duration_since(last) < self.min_gap)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PublishState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Apply one feedback frame from `sender`.
///
/// Feedback frames pass the rate limit and take an in-flight permit like
/// any other frame but skip tag and trust checks.
pub async fn handle_feedback(
    shared: &DaemonSharedState,
    sender: &str,
    payload: &[u8],
) -> FeedbackOutcome {
    let _slot = match shared.gate.enter(sender) {
        Ok(slot) => slot,
        Err(ReasonCode::Overloaded) => return FeedbackOutcome::Overloaded,
        Err(_) => return FeedbackOutcome::RateLimited,
    };

    let msg: FeedbackMessage = match serde_json::from_slice(payload) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!("Discarding malformed feedback from {}: {}", sender, e);
            return FeedbackOutcome::Malformed;
        }
    };

    let target = BrokerId::new(msg.target.trim());
    if target != shared.broker_id {
        tracing::debug!("Ignoring feedback for {} (this broker is {})", target, shared.broker_id);
        return FeedbackOutcome::NotForThisBroker;
    }

    let outcome = match Outcome::parse(msg.feedback.trim()) {
        Some(o) => o,
        None => {
            tracing::warn!("Unknown feedback value {:?} from {}", msg.feedback, sender);
            return FeedbackOutcome::UnknownFeedback;
        }
    };

    let source = BrokerId::new(msg.source.trim());
    if !shared.snapshots.current().graph().contains_edge(&source, &shared.broker_id) {
        tracing::warn!("Ignoring feedback on unknown edge {}->{}", source, shared.broker_id);
        return FeedbackOutcome::UnknownEdge;
    }

    let weight = match outcome {
        Outcome::Positive => 1,
        Outcome::Negative => shared.negative_multiplier,
    };

    let state = shared.clone();
    let edge_source = source.clone();
    let applied = tokio::task::spawn_blocking(move || {
        record_feedback(&state, &edge_source, outcome, weight, Instant::now())
    })
    .await;

    match applied {
        Ok(Ok(Some(version))) => tracing::info!(
            "Feedback {:?} on {}->{} applied, snapshot v{}",
            outcome,
            source,
            shared.broker_id,
            version
        ),
        Ok(Ok(None)) => tracing::debug!(
            "Feedback {:?} on {}->{} stored, publish deferred",
            outcome,
            source,
            shared.broker_id
        ),
        Ok(Err(e)) => {
            tracing::error!("Failed to record feedback {}->{}: {}", source, shared.broker_id, e);
            return FeedbackOutcome::StoreError;
        }
        Err(e) => {
            tracing::error!("Feedback task failed: {}", e);
            return FeedbackOutcome::StoreError;
        }
    }
    FeedbackOutcome::Recorded
}

/// Record feedback and publish it if no feedback publish happened within
/// the last `min_gap`. Blocking: file I/O under the store lock.
///
/// Returns the published snapshot version, or `None` when deferred.
fn record_feedback(
    shared: &DaemonSharedState,
    source: &BrokerId,
    outcome: Outcome,
    weight: u64,
    now: Instant,
) -> Result<Option<u64>, TrustGateError> {
    let mut store = shared.store.blocking_lock();
    store.record_weighted(&shared.broker_id, source, outcome, weight)?;
    if !shared.feedback_publisher.claim(now) {
        return Ok(None);
    }
    Ok(Some(publish_store_overlay(shared, &store).version()))
}

/// Publish feedback deferred by `record_feedback`, if any is due at `now`.
/// Blocking: takes the store lock.
pub fn flush_pending_feedback(shared: &DaemonSharedState, now: Instant) -> Option<u64> {
    let store = shared.store.blocking_lock();
    if !shared.feedback_publisher.claim_pending(now) {
        return None;
    }
    Some(publish_store_overlay(shared, &store).version())
}

/// Current graph with the local store laid over the edges into this broker.
fn publish_store_overlay(shared: &DaemonSharedState, store: &ReputationStore) -> Arc<TrustSnapshot> {
    let mut graph = shared.snapshots.current().graph().clone();
    graph.apply_store(store.owner(), &store.lines());
    shared.snapshots.publish(graph)
}
