// crates/trustgate-reputation/src/snapshot.rs
//
// Versioned, immutable trust snapshots and the single mutable pointer to the
// current one.
//
// Readers clone the `Arc` out of the cell and keep using that snapshot until
// they finish, even if a newer one is published in the meantime. Publishing
// builds the new snapshot outside the lock and swaps the pointer under a
// brief write lock.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use trustgate_core::{BrokerId, TrustGateError};

use crate::evaluator::{CacheStats, EvaluationPolicy, TrustEvaluator};
use crate::trust_graph::TrustGraph;

/// One published version of the trust graph with its own evaluation memo.
#[derive(Debug)]
pub struct TrustSnapshot {
    version: u64,
    published_at: DateTime<Utc>,
    evaluator: TrustEvaluator,
}

impl TrustSnapshot {
    pub fn new(version: u64, graph: TrustGraph, cache_capacity: usize) -> Self {
        Self {
            version,
            published_at: Utc::now(),
            evaluator: TrustEvaluator::new(graph, cache_capacity),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }

    pub fn graph(&self) -> &TrustGraph {
        self.evaluator.graph()
    }

    pub fn evaluator(&self) -> &TrustEvaluator {
        &self.evaluator
    }

    /// Score `chain` for `signer` under `policy` against this snapshot.
    pub fn evaluate(&self, signer: &BrokerId, chain: &[BrokerId], policy: EvaluationPolicy) -> f64 {
        self.evaluator.evaluate(signer, chain, policy)
    }

    /// Length-checked evaluation.
    pub fn evaluate_checked(
        &self,
        signer: &BrokerId,
        chain: &[BrokerId],
        policy: EvaluationPolicy,
        max_chain_length: usize,
    ) -> Result<f64, TrustGateError> {
        self.evaluator
            .evaluate_checked(signer, chain, policy, max_chain_length)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.evaluator.stats()
    }
}

/// Holder of the current snapshot.
#[derive(Debug)]
pub struct SnapshotCell {
    current: RwLock<Arc<TrustSnapshot>>,
    cache_capacity: usize,
}

impl SnapshotCell {
    /// Start at version 1 with `graph`.
    pub fn new(graph: TrustGraph, cache_capacity: usize) -> Self {
        Self {
            current: RwLock::new(Arc::new(TrustSnapshot::new(1, graph, cache_capacity))),
            cache_capacity,
        }
    }

    /// The snapshot in force right now.
    pub fn current(&self) -> Arc<TrustSnapshot> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    pub fn version(&self) -> u64 {
        self.current().version()
    }

    /// Publish `graph` as the next version and return it.
    pub fn publish(&self, graph: TrustGraph) -> Arc<TrustSnapshot> {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        let next = Arc::new(TrustSnapshot::new(
            guard.version() + 1,
            graph,
            self.cache_capacity,
        ));
        *guard = Arc::clone(&next);
        drop(guard);
        tracing::info!(
            "Published trust snapshot v{} ({} edges)",
            next.version(),
            next.graph().edge_count()
        );
        next
    }
}
