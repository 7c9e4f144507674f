// crates/trustgate-reputation/src/lib.rs
//
// trustgate-reputation: Trust scoring, aggregation, and chain evaluation
// for TrustGate.
//
// Local (r, s) observation counters are merged with a fixed base topology
// into an authoritative trust graph. Each published graph becomes an
// immutable, versioned snapshot carrying its own evaluation cache; brokers
// consult the current snapshot to score a message's signer chain.

pub mod aggregator;
pub mod evaluator;
pub mod score;
pub mod snapshot;
pub mod trust_graph;

pub use aggregator::{aggregate, aggregate_with_report, run_aggregation, AggregationReport};
pub use evaluator::{check_chain_length, CacheStats, EvaluationPolicy, TrustEvaluator};
pub use score::{counters_from_score, score, validate_base_rate, DEFAULT_BASE_RATE_DELTA};
pub use snapshot::{SnapshotCell, TrustSnapshot};
pub use trust_graph::{TrustEdge, TrustGraph};
