use thiserror::Error;

/// Error taxonomy shared by every TrustGate crate.
///
/// Per-message variants (`MalformedMessage` through `TrustBelowThreshold`) are
/// folded into a verdict by the admission gate; they never take a broker down.
/// `TopologyUnavailable` is the only fatal aggregation error.
#[derive(Debug, Error)]
pub enum TrustGateError {
    /// Schema or parse failure of an inbound message.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Tag field absent or not a hex-encoded tag of the right length.
    #[error("Invalid tag: {0}")]
    InvalidTag(String),

    /// Tag does not match the canonical bytes under the shared secret.
    #[error("Authentication failure: {0}")]
    Authentication(String),

    /// Signer chain exceeds the configured maximum.
    #[error("Signer chain too long: {len} > {max}")]
    ChainTooLong { len: usize, max: usize },

    /// Client is not on the allowlist (or lacks a publish rule for the topic).
    #[error("Unauthorized client: {0}")]
    UnauthorizedClient(String),

    /// Computed trust is below the applicable threshold.
    #[error("Trust below threshold: {score:.3} < {threshold:.3}")]
    TrustBelowThreshold { score: f64, threshold: f64 },

    /// A broker's reputation store could not be read during aggregation.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The base topology could not be read; aggregation cannot proceed.
    #[error("Topology unavailable: {0}")]
    TopologyUnavailable(String),

    /// Filesystem or persistence error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Keyed-hash setup error.
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Invalid configuration value.
    #[error("Config error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for TrustGateError {
    fn from(e: serde_json::Error) -> Self {
        TrustGateError::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for TrustGateError {
    fn from(e: std::io::Error) -> Self {
        TrustGateError::Storage(e.to_string())
    }
}
