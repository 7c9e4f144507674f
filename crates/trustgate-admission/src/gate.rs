// crates/trustgate-admission/src/gate.rs
//
// Admission gate: the final accept/reject decision for one inbound frame.
//
// Pipeline, cheapest first, stopping at the first rejection:
//   1. per-sender token bucket (banned senders are refused here)
//   2. global in-flight permit, taken with try_acquire (never waits)
//   3. schema parse
//   4. tag presence and shape
//   5. tag check in constant time (a mismatch is a sender violation)
//   6. signer-chain verification against the current snapshot
//   7. relay: re-tag with this broker appended to the chain
//
// `admit` is synchronous and lock-free on the hot path apart from sharded
// map entries, so callers can run it directly inside one task per message.
// Callers that need the in-flight permit to outlive the verdict (until the
// reply is queued) split it into `enter` and `AdmissionSlot::admit`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, SemaphorePermit};
use trustgate_core::{
    MessageAuthenticator, ReasonCode, SignedMessage, TrustGateError, VerificationVerdict,
    WireMessage,
};
use trustgate_reputation::SnapshotCell;
use trustgate_verify::SignerChainVerifier;

use crate::rate_limiter::{RateLimitConfig, RateLimiter};

pub const DEFAULT_MAX_IN_FLIGHT: usize = 256;

/// Resource bounds for the gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    pub per_sender_rate: u32,
    pub burst_multiplier: u32,
    pub violations_before_ban: u32,
    pub ban_duration_secs: u64,
    pub max_in_flight: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        let rl = RateLimitConfig::default();
        Self {
            per_sender_rate: rl.per_sender_rate,
            burst_multiplier: rl.burst_multiplier,
            violations_before_ban: rl.violations_before_ban,
            ban_duration_secs: rl.ban_duration_secs,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

impl AdmissionConfig {
    fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig::default()
            .with_per_sender_rate(self.per_sender_rate)
            .with_burst_multiplier(self.burst_multiplier)
            .with_violations_before_ban(self.violations_before_ban)
            .with_ban_duration_secs(self.ban_duration_secs)
    }
}

/// Outcome of admitting one frame.
#[derive(Debug, Clone)]
pub struct Admission {
    pub verdict: VerificationVerdict,
    /// The message to forward, present only when accepted.
    pub relayed: Option<SignedMessage>,
    /// Snapshot version the verdict was computed against, if one was used.
    pub snapshot_version: Option<u64>,
}

impl Admission {
    fn rejected(verdict: VerificationVerdict) -> Self {
        Self {
            verdict,
            relayed: None,
            snapshot_version: None,
        }
    }
}

/// A frame that passed the rate limit and holds one in-flight permit.
///
/// Dropping the slot returns the permit.
pub struct AdmissionSlot<'a> {
    gate: &'a AdmissionGate,
    sender: &'a str,
    _permit: SemaphorePermit<'a>,
}

impl AdmissionSlot<'_> {
    /// Parse, authenticate and verify the frame. The permit stays held
    /// until the slot itself is dropped.
    pub fn admit(&self, topic: &str, raw: &[u8]) -> Admission {
        let admission = self.gate.verify_frame(self.sender, topic, raw);
        self.gate.count(admission.verdict.reason);
        admission
    }
}

impl std::fmt::Debug for AdmissionSlot<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionSlot").field("sender", &self.sender).finish()
    }
}

pub struct AdmissionGate {
    authenticator: MessageAuthenticator,
    verifier: SignerChainVerifier,
    snapshots: Arc<SnapshotCell>,
    limiter: RateLimiter,
    permits: Semaphore,
    max_in_flight: usize,
    outcomes: DashMap<ReasonCode, u64>,
    admitted: AtomicU64,
}

impl std::fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("local_broker", &self.verifier.config().local_broker)
            .field("max_in_flight", &self.max_in_flight)
            .field("admitted", &self.admitted.load(Ordering::Relaxed))
            .finish()
    }
}

impl AdmissionGate {
    pub fn new(
        authenticator: MessageAuthenticator,
        verifier: SignerChainVerifier,
        snapshots: Arc<SnapshotCell>,
        config: &AdmissionConfig,
    ) -> Result<Self, TrustGateError> {
        if config.max_in_flight == 0 {
            return Err(TrustGateError::Config("max_in_flight must be at least 1".to_string()));
        }
        if config.per_sender_rate == 0 {
            return Err(TrustGateError::Config("per_sender_rate must be at least 1".to_string()));
        }
        Ok(Self {
            authenticator,
            verifier,
            snapshots,
            limiter: RateLimiter::new(config.rate_limit()),
            permits: Semaphore::new(config.max_in_flight),
            max_in_flight: config.max_in_flight,
            outcomes: DashMap::new(),
            admitted: AtomicU64::new(0),
        })
    }

    pub fn snapshots(&self) -> &Arc<SnapshotCell> {
        &self.snapshots
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn verifier(&self) -> &SignerChainVerifier {
        &self.verifier
    }

    /// Frames currently holding a verification permit.
    pub fn in_flight(&self) -> usize {
        self.max_in_flight - self.permits.available_permits()
    }

    /// Admit one raw frame from `sender` published on `topic`.
    pub fn admit(&self, sender: &str, topic: &str, raw: &[u8]) -> Admission {
        match self.enter(sender) {
            Ok(slot) => slot.admit(topic, raw),
            Err(reason) => Admission::rejected(VerificationVerdict::reject(reason)),
        }
    }

    /// Run the two pre-parse stages for `sender`: the rate limit, then an
    /// in-flight permit. Neither waits. The permit is held until the returned
    /// slot is dropped.
    ///
    /// Rejections are counted here; the reason is `RateLimited` or
    /// `Overloaded`.
    pub fn enter<'a>(&'a self, sender: &'a str) -> Result<AdmissionSlot<'a>, ReasonCode> {
        if !self.limiter.check(sender) {
            tracing::debug!("Rate limited {}", sender);
            self.count(ReasonCode::RateLimited);
            return Err(ReasonCode::RateLimited);
        }

        let Ok(permit) = self.permits.try_acquire() else {
            tracing::debug!("Shedding frame from {}: no verification capacity", sender);
            self.count(ReasonCode::Overloaded);
            return Err(ReasonCode::Overloaded);
        };

        Ok(AdmissionSlot {
            gate: self,
            sender,
            _permit: permit,
        })
    }

    fn count(&self, reason: ReasonCode) {
        self.admitted.fetch_add(1, Ordering::Relaxed);
        *self.outcomes.entry(reason).or_insert(0) += 1;
    }

    fn verify_frame(&self, sender: &str, topic: &str, raw: &[u8]) -> Admission {
        let message = match WireMessage::parse(raw).and_then(WireMessage::into_signed) {
            Ok(m) => m,
            Err(e) => {
                if matches!(e, TrustGateError::InvalidTag(_)) {
                    self.limiter.record_violation(sender);
                }
                tracing::debug!("Rejected frame from {}: {}", sender, e);
                return Admission::rejected(VerificationVerdict::from_error(&e));
            }
        };

        match self.authenticator.verify_tag(&message) {
            Ok(true) => {}
            Ok(false) => {
                self.limiter.record_violation(sender);
                tracing::warn!(
                    "Tag mismatch from {} (signer {}, client {})",
                    sender,
                    message.claimed_signer(),
                    message.client_id()
                );
                return Admission::rejected(VerificationVerdict::reject(
                    ReasonCode::AuthenticationFailure,
                ));
            }
            Err(e) => {
                tracing::warn!("Could not check tag from {}: {}", sender, e);
                return Admission::rejected(VerificationVerdict::from_error(&e));
            }
        }

        let snapshot = self.snapshots.current();
        let verdict = self.verifier.verify(&message, topic, &snapshot);
        let mut admission = Admission {
            verdict,
            relayed: None,
            snapshot_version: Some(snapshot.version()),
        };
        if !verdict.accepted {
            return admission;
        }

        let local = &self.verifier.config().local_broker;
        match self.authenticator.relay(message, local) {
            Ok(relayed) => admission.relayed = Some(relayed),
            Err(e) => {
                tracing::warn!("Failed to re-tag accepted message: {}", e);
                admission.verdict = VerificationVerdict::from_error(&e);
            }
        }
        admission
    }

    /// Per-reason counts since start, sorted by reason name.
    pub fn outcome_counts(&self) -> BTreeMap<String, u64> {
        self.outcomes
            .iter()
            .map(|e| (e.key().to_string(), *e.value()))
            .collect()
    }

    /// Frames seen since start.
    pub fn admitted_total(&self) -> u64 {
        self.admitted.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trustgate_core::{BrokerId, MessageBody};
    use trustgate_reputation::TrustGraph;
    use trustgate_verify::VerifierConfig;

    const SECRET: &str = "4c1c4d7e2b9f7a0e8b6d3e5f1a2c7b4d";

    fn id(s: &str) -> BrokerId {
        BrokerId::from(s)
    }

    fn gate_with(config: AdmissionConfig) -> AdmissionGate {
        let mut graph = TrustGraph::seeded(&[(id("B0"), id("B1")), (id("B0"), id("B2"))], 0.5);
        graph.set_counters(&id("B0"), &id("B1"), 8, 0);
        graph.set_counters(&id("B0"), &id("B2"), 0, 8);
        let cell = Arc::new(SnapshotCell::new(graph, 128));
        let verifier =
            SignerChainVerifier::new(VerifierConfig::new("B4").with_clients(["C8"])).unwrap();
        AdmissionGate::new(
            MessageAuthenticator::new(SECRET).unwrap(),
            verifier,
            cell,
            &config,
        )
        .unwrap()
    }

    fn gate() -> AdmissionGate {
        gate_with(AdmissionConfig::default())
    }

    fn frame(signer: &str, chain: &[&str]) -> Vec<u8> {
        let auth = MessageAuthenticator::new(SECRET).unwrap();
        let signed = auth
            .sign(MessageBody::new(
                signer,
                "C8",
                json!("hello"),
                chain.iter().map(|s| id(s)).collect(),
            ))
            .unwrap();
        signed.to_wire().to_bytes().unwrap()
    }

    #[test]
    fn accepts_and_relays() {
        let gate = gate();
        let admission = gate.admit("peer", "t", &frame("B0", &["B0", "B1"]));
        assert!(admission.verdict.accepted);
        let relayed = admission.relayed.unwrap();
        assert_eq!(relayed.signer_chain(), &[id("B0"), id("B1"), id("B4")]);
        let auth = MessageAuthenticator::new(SECRET).unwrap();
        assert!(auth.verify_tag(&relayed).unwrap());
        assert_eq!(admission.snapshot_version, Some(1));
    }

    #[test]
    fn malformed_input_rejected() {
        let gate = gate();
        let inputs: [&[u8]; 4] = [b"not json", b"[1,2]", b"{\"b\":\"B0\"}", b""];
        for raw in inputs {
            let a = gate.admit("peer", "t", raw);
            assert_eq!(a.verdict.reason, ReasonCode::MalformedMessage);
            assert!(a.relayed.is_none());
        }
    }

    #[test]
    fn missing_tag_rejected_before_authentication() {
        let gate = gate();
        let raw = br#"{"b":"B0","c":"C8","message":"x","S":["B1"]}"#;
        let a = gate.admit("peer", "t", raw);
        assert_eq!(a.verdict.reason, ReasonCode::InvalidTag);
        assert_eq!(a.snapshot_version, None);
    }

    #[test]
    fn tampered_payload_is_authentication_failure() {
        let gate = gate();
        let raw = String::from_utf8(frame("B0", &["B1"])).unwrap();
        let tampered = raw.replace("hello", "MITM was here!");
        let a = gate.admit("peer", "t", tampered.as_bytes());
        assert_eq!(a.verdict.reason, ReasonCode::AuthenticationFailure);
        assert_eq!(gate.rate_limiter().violation_count("peer"), 1);
    }

    #[test]
    fn repeated_forgeries_ban_the_sender() {
        let gate = gate_with(AdmissionConfig {
            violations_before_ban: 3,
            ..AdmissionConfig::default()
        });
        let raw = String::from_utf8(frame("B0", &["B1"])).unwrap();
        let tampered = raw.replace("hello", "forged");
        for _ in 0..3 {
            gate.admit("mallory", "t", tampered.as_bytes());
        }
        let a = gate.admit("mallory", "t", &frame("B0", &["B1"]));
        assert_eq!(a.verdict.reason, ReasonCode::RateLimited);
        // Other senders are unaffected.
        assert!(gate.admit("alice", "t", &frame("B0", &["B1"])).verdict.accepted);
    }

    #[test]
    fn untrusted_chain_rejected_with_score() {
        let gate = gate();
        let a = gate.admit("peer", "t", &frame("B0", &["B2"]));
        assert_eq!(a.verdict.reason, ReasonCode::TrustBelowThreshold);
        assert!((a.verdict.score - 0.1).abs() < 1e-12);
        assert!(a.relayed.is_none());
    }

    #[test]
    fn sender_budget_exhausts() {
        let gate = gate_with(AdmissionConfig {
            per_sender_rate: 2,
            burst_multiplier: 1,
            ..AdmissionConfig::default()
        });
        let raw = frame("B0", &["B1"]);
        assert!(gate.admit("peer", "t", &raw).verdict.accepted);
        assert!(gate.admit("peer", "t", &raw).verdict.accepted);
        assert_eq!(gate.admit("peer", "t", &raw).verdict.reason, ReasonCode::RateLimited);
    }

    #[test]
    fn permits_are_returned() {
        let gate = gate();
        for _ in 0..10 {
            gate.admit("peer", "t", &frame("B0", &["B1"]));
        }
        assert_eq!(gate.in_flight(), 0);
        assert_eq!(gate.admitted_total(), 10);
        assert_eq!(gate.outcome_counts().get("accepted"), Some(&10));
    }

    #[test]
    fn excess_beyond_capacity_is_overloaded() {
        let gate = gate_with(AdmissionConfig {
            max_in_flight: 1,
            ..AdmissionConfig::default()
        });
        let held = gate.enter("alice").unwrap();
        assert_eq!(gate.in_flight(), 1);

        assert_eq!(gate.enter("bob").unwrap_err(), ReasonCode::Overloaded);
        let shed = gate.admit("bob", "t", &frame("B0", &["B1"]));
        assert_eq!(shed.verdict.reason, ReasonCode::Overloaded);
        assert!(shed.relayed.is_none());

        // The held slot still completes, and keeps its permit until dropped.
        assert!(held.admit("t", &frame("B0", &["B1"])).verdict.accepted);
        assert_eq!(gate.in_flight(), 1);
        drop(held);
        assert_eq!(gate.in_flight(), 0);
        assert!(gate.admit("bob", "t", &frame("B0", &["B1"])).verdict.accepted);
        assert_eq!(gate.outcome_counts().get("overloaded"), Some(&2));
    }
}
