// crates/trustgate-core/src/traits.rs

use crate::broker::BrokerId;
use crate::error::TrustGateError;
use crate::observation::StoreLine;

/// Read access to the per-broker reputation stores consumed by aggregation.
///
/// Implemented by trustgate-store (one text file per broker) and by
/// in-memory fixtures in tests.
pub trait StoreSource: Send + Sync {
    /// Load every line of `owner`'s store.
    ///
    /// Returns `Err(TrustGateError::StoreUnavailable)` when the store does not
    /// exist or cannot be read; the aggregator skips that broker and continues.
    fn load_store(&self, owner: &BrokerId) -> Result<Vec<StoreLine>, TrustGateError>;
}
