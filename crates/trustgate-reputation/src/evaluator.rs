// crates/trustgate-reputation/src/evaluator.rs
//
// Trust evaluator: score a message's signer chain against one trust graph.
//
// Two policies select how the chain is reduced to one number:
//   - best-signer: the highest trust from the original signer to any hop.
//   - neighbour-signer: the trust from the original signer to the immediate
//     relayer only, which is the newest (last) entry of the chain.
//
// An evaluator belongs to exactly one snapshot, and so does its memo. When a
// newer snapshot is published the old evaluator and all of its cached
// results are dropped together. Both memo tables are bounded; once full,
// results are still computed but no longer inserted.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use trustgate_core::{BrokerId, TrustGateError};

use crate::trust_graph::TrustGraph;

/// How a signer chain is reduced to a single trust score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvaluationPolicy {
    #[default]
    BestSigner,
    NeighbourSigner,
}

impl fmt::Display for EvaluationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluationPolicy::BestSigner => f.write_str("best-signer"),
            EvaluationPolicy::NeighbourSigner => f.write_str("neighbour-signer"),
        }
    }
}

impl FromStr for EvaluationPolicy {
    type Err = TrustGateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "best-signer" => Ok(EvaluationPolicy::BestSigner),
            "neighbour-signer" | "neighbor-signer" => Ok(EvaluationPolicy::NeighbourSigner),
            other => Err(TrustGateError::Config(format!(
                "Unknown policy '{}': expected best-signer or neighbour-signer",
                other
            ))),
        }
    }
}

/// Reject chains longer than `max` before any trust lookup.
pub fn check_chain_length(chain: &[BrokerId], max: usize) -> Result<(), TrustGateError> {
    if chain.len() > max {
        return Err(TrustGateError::ChainTooLong {
            len: chain.len(),
            max,
        });
    }
    Ok(())
}

/// Memo hit/miss counters for one evaluator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub pair_entries: usize,
    pub chain_entries: usize,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Memo key for a reduced chain: the original signer, the policy, and the
/// distinct hops the policy looks at, in sorted order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ChainKey {
    signer: BrokerId,
    policy: EvaluationPolicy,
    hops: Vec<BrokerId>,
}

/// Read-only evaluator over one trust graph, with a bounded memo.
pub struct TrustEvaluator {
    graph: TrustGraph,
    capacity: usize,
    pairs: DashMap<(BrokerId, BrokerId), f64>,
    chains: DashMap<ChainKey, f64>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl fmt::Debug for TrustEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustEvaluator")
            .field("edges", &self.graph.edge_count())
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}

impl TrustEvaluator {
    /// Wrap `graph`; each memo table holds at most `capacity` entries.
    pub fn new(graph: TrustGraph, capacity: usize) -> Self {
        Self {
            graph,
            capacity,
            pairs: DashMap::new(),
            chains: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn graph(&self) -> &TrustGraph {
        &self.graph
    }

    /// Trust from `signer` to `hop`, memoized.
    pub fn pair_trust(&self, signer: &BrokerId, hop: &BrokerId) -> f64 {
        let key = (signer.clone(), hop.clone());
        if let Some(v) = self.pairs.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return *v;
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let value = self.graph.trust(signer, hop);
        if self.pairs.len() < self.capacity {
            self.pairs.insert(key, value);
        }
        value
    }

    /// Score `chain` for `signer` under `policy`. An empty chain scores 0.0.
    ///
    /// Does not check the chain length; see `evaluate_checked`.
    pub fn evaluate(&self, signer: &BrokerId, chain: &[BrokerId], policy: EvaluationPolicy) -> f64 {
        let hops: Vec<BrokerId> = match policy {
            EvaluationPolicy::BestSigner => {
                let distinct: BTreeSet<&BrokerId> = chain.iter().collect();
                distinct.into_iter().cloned().collect()
            }
            EvaluationPolicy::NeighbourSigner => chain.last().cloned().into_iter().collect(),
        };
        if hops.is_empty() {
            return 0.0;
        }

        let key = ChainKey {
            signer: signer.clone(),
            policy,
            hops,
        };
        if let Some(v) = self.chains.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return *v;
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let value = key
            .hops
            .iter()
            .map(|hop| self.pair_trust(signer, hop))
            .fold(0.0_f64, f64::max);
        tracing::trace!(
            "Evaluated {} over {} hops ({}): {:.3}",
            signer,
            key.hops.len(),
            policy,
            value
        );
        if self.chains.len() < self.capacity {
            self.chains.insert(key, value);
        }
        value
    }

    /// Reject over-long chains without a lookup, then evaluate.
    pub fn evaluate_checked(
        &self,
        signer: &BrokerId,
        chain: &[BrokerId],
        policy: EvaluationPolicy,
        max_chain_length: usize,
    ) -> Result<f64, TrustGateError> {
        check_chain_length(chain, max_chain_length)?;
        Ok(self.evaluate(signer, chain, policy))
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            pair_entries: self.pairs.len(),
            chain_entries: self.chains.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> BrokerId {
        BrokerId::from(s)
    }

    fn ids(v: &[&str]) -> Vec<BrokerId> {
        v.iter().map(|s| id(s)).collect()
    }

    /// B0 -> B1 strongly trusted, B0 -> B2 distrusted, B0 -> B3 unobserved.
    fn graph() -> TrustGraph {
        let topology = vec![
            (id("B0"), id("B1")),
            (id("B0"), id("B2")),
            (id("B0"), id("B3")),
        ];
        let mut g = TrustGraph::seeded(&topology, 0.5);
        g.set_counters(&id("B0"), &id("B1"), 8, 0);
        g.set_counters(&id("B0"), &id("B2"), 0, 8);
        g
    }

    #[test]
    fn best_signer_takes_most_favourable_hop() {
        let ev = TrustEvaluator::new(graph(), 64);
        let t = ev.evaluate(&id("B0"), &ids(&["B2", "B1"]), EvaluationPolicy::BestSigner);
        assert!((t - 0.9).abs() < 1e-12);
    }

    #[test]
    fn neighbour_signer_uses_only_immediate_relayer() {
        let ev = TrustEvaluator::new(graph(), 64);
        let low = ev.evaluate(&id("B0"), &ids(&["B1", "B2"]), EvaluationPolicy::NeighbourSigner);
        assert!((low - 0.1).abs() < 1e-12);
        let high = ev.evaluate(&id("B0"), &ids(&["B2", "B1"]), EvaluationPolicy::NeighbourSigner);
        assert!((high - 0.9).abs() < 1e-12);
    }

    #[test]
    fn unknown_link_scores_base_rate() {
        let ev = TrustEvaluator::new(graph(), 64);
        let t = ev.evaluate(&id("B5"), &ids(&["B6"]), EvaluationPolicy::BestSigner);
        assert!((t - 0.5).abs() < 1e-12);
    }

    #[test]
    fn empty_chain_scores_zero() {
        let ev = TrustEvaluator::new(graph(), 64);
        assert_eq!(ev.evaluate(&id("B0"), &[], EvaluationPolicy::BestSigner), 0.0);
        assert_eq!(ev.evaluate(&id("B0"), &[], EvaluationPolicy::NeighbourSigner), 0.0);
    }

    #[test]
    fn over_long_chain_rejected_before_lookup() {
        let ev = TrustEvaluator::new(graph(), 64);
        let chain = ids(&["B1"; 9]);
        let err = ev
            .evaluate_checked(&id("B0"), &chain, EvaluationPolicy::BestSigner, 8)
            .unwrap_err();
        assert!(matches!(err, TrustGateError::ChainTooLong { len: 9, max: 8 }));
        let stats = ev.stats();
        assert_eq!(stats.hits + stats.misses, 0);
    }

    #[test]
    fn flood_pattern_is_served_from_cache() {
        // 21 entries drawn from a 7-identity pool, repeated many times.
        let pool = ["B0", "B1", "B2", "B3", "B5", "B6", "B7"];
        let chain: Vec<BrokerId> = (0..21).map(|i| id(pool[i % pool.len()])).collect();
        let ev = TrustEvaluator::new(graph(), 64);

        let first = ev.evaluate(&id("B0"), &chain, EvaluationPolicy::BestSigner);
        let after_first = ev.stats();
        // One chain miss plus one miss per distinct hop, not per entry.
        assert_eq!(after_first.misses, 1 + pool.len() as u64);

        for _ in 0..1000 {
            let again = ev.evaluate(&id("B0"), &chain, EvaluationPolicy::BestSigner);
            assert_eq!(again, first);
        }
        let stats = ev.stats();
        assert_eq!(stats.misses, after_first.misses);
        assert_eq!(stats.hits, after_first.hits + 1000);
        assert!(stats.hit_ratio() > 0.99);
    }

    #[test]
    fn memo_is_bounded() {
        let ev = TrustEvaluator::new(graph(), 4);
        for i in 0..50 {
            let signer = id(&format!("X{}", i));
            ev.evaluate(&signer, &ids(&["B1"]), EvaluationPolicy::BestSigner);
        }
        let stats = ev.stats();
        assert!(stats.pair_entries <= 4);
        assert!(stats.chain_entries <= 4);
    }

    #[test]
    fn policy_parses_and_serializes_kebab_case() {
        assert_eq!(
            "neighbour-signer".parse::<EvaluationPolicy>().unwrap(),
            EvaluationPolicy::NeighbourSigner
        );
        assert!("fastest".parse::<EvaluationPolicy>().is_err());
        let json = serde_json::to_string(&EvaluationPolicy::BestSigner).unwrap();
        assert_eq!(json, "\"best-signer\"");
    }
}
