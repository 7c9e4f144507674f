// crates/trustgate-core/src/verdict.rs
//
// Accept/reject decisions produced by the verifier and the admission gate.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TrustGateError;

/// Why a message was accepted or rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    Accepted,
    /// Claimed signer is the evaluating broker; trust evaluation skipped.
    LocalOrigin,
    MalformedMessage,
    /// Tag field missing or not a well-formed tag.
    InvalidTag,
    AuthenticationFailure,
    ChainTooLong,
    UnauthorizedClient,
    TrustBelowThreshold,
    /// Sender exceeded its verification budget or is banned.
    RateLimited,
    /// No verification capacity left; message shed, not queued.
    Overloaded,
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReasonCode::Accepted => "accepted",
            ReasonCode::LocalOrigin => "local_origin",
            ReasonCode::MalformedMessage => "malformed_message",
            ReasonCode::InvalidTag => "invalid_tag",
            ReasonCode::AuthenticationFailure => "authentication_failure",
            ReasonCode::ChainTooLong => "chain_too_long",
            ReasonCode::UnauthorizedClient => "unauthorized_client",
            ReasonCode::TrustBelowThreshold => "trust_below_threshold",
            ReasonCode::RateLimited => "rate_limited",
            ReasonCode::Overloaded => "overloaded",
        };
        f.write_str(s)
    }
}

/// Final decision for one message.
///
/// `score` is the computed trust when evaluation ran, otherwise 0.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VerificationVerdict {
    pub accepted: bool,
    pub score: f64,
    pub reason: ReasonCode,
}

impl VerificationVerdict {
    pub fn accept(score: f64, reason: ReasonCode) -> Self {
        Self {
            accepted: true,
            score,
            reason,
        }
    }

    pub fn reject(reason: ReasonCode) -> Self {
        Self {
            accepted: false,
            score: 0.0,
            reason,
        }
    }

    pub fn reject_with_score(score: f64, reason: ReasonCode) -> Self {
        Self {
            accepted: false,
            score,
            reason,
        }
    }

    /// Fold a per-message error into a rejection.
    pub fn from_error(err: &TrustGateError) -> Self {
        match err {
            TrustGateError::MalformedMessage(_) | TrustGateError::Serialization(_) => {
                Self::reject(ReasonCode::MalformedMessage)
            }
            TrustGateError::InvalidTag(_) => Self::reject(ReasonCode::InvalidTag),
            TrustGateError::ChainTooLong { .. } => Self::reject(ReasonCode::ChainTooLong),
            TrustGateError::UnauthorizedClient(_) => Self::reject(ReasonCode::UnauthorizedClient),
            TrustGateError::TrustBelowThreshold { score, .. } => {
                Self::reject_with_score(*score, ReasonCode::TrustBelowThreshold)
            }
            _ => Self::reject(ReasonCode::AuthenticationFailure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_threshold_keeps_score() {
        let err = TrustGateError::TrustBelowThreshold {
            score: 0.25,
            threshold: 0.5,
        };
        let verdict = VerificationVerdict::from_error(&err);
        assert!(!verdict.accepted);
        assert_eq!(verdict.reason, ReasonCode::TrustBelowThreshold);
        assert!((verdict.score - 0.25).abs() < 1e-12);
    }

    #[test]
    fn chain_too_long_maps_to_reason() {
        let err = TrustGateError::ChainTooLong { len: 21, max: 8 };
        assert_eq!(VerificationVerdict::from_error(&err).reason, ReasonCode::ChainTooLong);
    }

    #[test]
    fn serializes_reason_in_snake_case() {
        let json = serde_json::to_string(&VerificationVerdict::reject(ReasonCode::InvalidTag)).unwrap();
        assert_eq!(json, r#"{"accepted":false,"score":0.0,"reason":"invalid_tag"}"#);
    }
}
