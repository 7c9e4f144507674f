// crates/trustgate-verify/src/verifier.rs
//
// Signer-chain verifier.
//
// Order of checks for an authenticated message:
//   1. chain length (no graph lookup for over-long chains)
//   2. client allowlist, namespace and ACL
//   3. local origin: the claimed signer is this broker, so no trust lookup
//   4. trust score under the policy against the snapshot, compared with the
//      applicable threshold
// The outcome depends only on (snapshot, message, topic, config).

use trustgate_core::{ReasonCode, SignedMessage, TrustGateError, VerificationVerdict};
use trustgate_reputation::{check_chain_length, TrustSnapshot};

use crate::acl::AclAccess;
use crate::config::VerifierConfig;

#[derive(Debug, Clone)]
pub struct SignerChainVerifier {
    config: VerifierConfig,
}

impl SignerChainVerifier {
    pub fn new(config: VerifierConfig) -> Result<Self, TrustGateError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Verify and fold any rejection into a verdict.
    pub fn verify(
        &self,
        message: &SignedMessage,
        topic: &str,
        snapshot: &TrustSnapshot,
    ) -> VerificationVerdict {
        match self.check(message, topic, snapshot) {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::debug!(
                    "Rejected message from {} via {:?}: {}",
                    message.claimed_signer(),
                    message.signer_chain(),
                    e
                );
                VerificationVerdict::from_error(&e)
            }
        }
    }

    /// Verify, returning the rejection as an error.
    pub fn check(
        &self,
        message: &SignedMessage,
        topic: &str,
        snapshot: &TrustSnapshot,
    ) -> Result<VerificationVerdict, TrustGateError> {
        let chain = message.signer_chain();
        check_chain_length(chain, self.config.max_chain_length)?;
        self.authorize_client(message.client_id(), topic)?;

        let signer = message.claimed_signer();
        if signer == &self.config.local_broker {
            tracing::debug!("Local-origin message from client {}", message.client_id());
            return Ok(VerificationVerdict::accept(1.0, ReasonCode::LocalOrigin));
        }

        let score = snapshot.evaluate(signer, chain, self.config.policy);
        let threshold = self.config.threshold_for(topic, message.client_id());
        if score >= threshold {
            tracing::debug!(
                "Accepted {} on {} (v{}): {:.3} >= {:.3}",
                signer,
                topic,
                snapshot.version(),
                score,
                threshold
            );
            Ok(VerificationVerdict::accept(score, ReasonCode::Accepted))
        } else {
            Err(TrustGateError::TrustBelowThreshold { score, threshold })
        }
    }

    fn authorize_client(&self, client_id: &str, topic: &str) -> Result<(), TrustGateError> {
        if !self.config.authorized_clients.contains(client_id) {
            return Err(TrustGateError::UnauthorizedClient(format!(
                "{} is not on the allowlist",
                client_id
            )));
        }
        if !self.config.in_namespace(topic) {
            return Err(TrustGateError::UnauthorizedClient(format!(
                "{} may not publish outside the topic namespace ({})",
                client_id, topic
            )));
        }
        if let Some(acl) = &self.config.acl {
            if !acl.allows(client_id, topic, AclAccess::Pub) {
                return Err(TrustGateError::UnauthorizedClient(format!(
                    "{} has no publish rule for {}",
                    client_id, topic
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trustgate_core::{BrokerId, MessageAuthenticator, MessageBody};
    use trustgate_reputation::{EvaluationPolicy, TrustGraph};

    use crate::acl::{AclRule, AclTable};

    fn id(s: &str) -> BrokerId {
        BrokerId::from(s)
    }

    /// B0 -> B1 trusted (0.9), B0 -> B2 distrusted (0.1).
    fn snapshot() -> TrustSnapshot {
        let mut g = TrustGraph::seeded(&[(id("B0"), id("B1")), (id("B0"), id("B2"))], 0.5);
        g.set_counters(&id("B0"), &id("B1"), 8, 0);
        g.set_counters(&id("B0"), &id("B2"), 0, 8);
        TrustSnapshot::new(1, g, 64)
    }

    fn message(signer: &str, client: &str, chain: &[&str]) -> SignedMessage {
        let auth = MessageAuthenticator::new("k").unwrap();
        auth.sign(MessageBody::new(
            signer,
            client,
            json!("hello"),
            chain.iter().map(|s| id(s)).collect(),
        ))
        .unwrap()
    }

    fn verifier(policy: EvaluationPolicy) -> SignerChainVerifier {
        SignerChainVerifier::new(
            VerifierConfig::new("B4")
                .with_clients(["C1"])
                .with_policy(policy),
        )
        .unwrap()
    }

    #[test]
    fn accepts_trusted_chain() {
        let v = verifier(EvaluationPolicy::BestSigner);
        let verdict = v.verify(&message("B0", "C1", &["B2", "B1"]), "t", &snapshot());
        assert!(verdict.accepted);
        assert_eq!(verdict.reason, ReasonCode::Accepted);
        assert!((verdict.score - 0.9).abs() < 1e-12);
    }

    #[test]
    fn neighbour_policy_rejects_with_score() {
        let v = verifier(EvaluationPolicy::NeighbourSigner);
        let verdict = v.verify(&message("B0", "C1", &["B1", "B2"]), "t", &snapshot());
        assert!(!verdict.accepted);
        assert_eq!(verdict.reason, ReasonCode::TrustBelowThreshold);
        assert!((verdict.score - 0.1).abs() < 1e-12);
    }

    #[test]
    fn chain_too_long_checked_first() {
        let v = verifier(EvaluationPolicy::BestSigner);
        let snap = snapshot();
        let chain = ["B1"; 9];
        // Unknown client too, but length wins.
        let verdict = v.verify(&message("B0", "C9", &chain), "t", &snap);
        assert_eq!(verdict.reason, ReasonCode::ChainTooLong);
        let stats = snap.cache_stats();
        assert_eq!(stats.hits + stats.misses, 0);
    }

    #[test]
    fn unknown_client_rejected() {
        let v = verifier(EvaluationPolicy::BestSigner);
        let verdict = v.verify(&message("B0", "C9", &["B1"]), "t", &snapshot());
        assert_eq!(verdict.reason, ReasonCode::UnauthorizedClient);
    }

    #[test]
    fn acl_requires_publish_rule() {
        let mut cfg = VerifierConfig::new("B4").with_clients(["C1"]);
        cfg.acl = Some(AclTable::new(vec![AclRule::parse("C1,pub,allowed").unwrap()]));
        let v = SignerChainVerifier::new(cfg).unwrap();
        let snap = snapshot();
        assert!(v.verify(&message("B0", "C1", &["B1"]), "allowed", &snap).accepted);
        assert_eq!(
            v.verify(&message("B0", "C1", &["B1"]), "denied", &snap).reason,
            ReasonCode::UnauthorizedClient
        );
    }

    #[test]
    fn local_origin_skips_trust() {
        let v = verifier(EvaluationPolicy::BestSigner);
        let snap = snapshot();
        let verdict = v.verify(&message("B4", "C1", &["B2"]), "t", &snap);
        assert!(verdict.accepted);
        assert_eq!(verdict.reason, ReasonCode::LocalOrigin);
        assert_eq!(snap.cache_stats().misses, 0);
    }

    #[test]
    fn per_topic_threshold_applies() {
        let mut cfg = VerifierConfig::new("B4").with_clients(["C1"]);
        cfg.topic_thresholds.insert("strict".to_string(), 0.95);
        let v = SignerChainVerifier::new(cfg).unwrap();
        let snap = snapshot();
        assert!(v.verify(&message("B0", "C1", &["B1"]), "lenient", &snap).accepted);
        let strict = v.verify(&message("B0", "C1", &["B1"]), "strict", &snap);
        assert_eq!(strict.reason, ReasonCode::TrustBelowThreshold);
    }

    #[test]
    fn verdict_is_deterministic() {
        let v = verifier(EvaluationPolicy::BestSigner);
        let snap = snapshot();
        let msg = message("B0", "C1", &["B2", "B1", "B2"]);
        let first = v.verify(&msg, "t", &snap);
        for _ in 0..10 {
            assert_eq!(v.verify(&msg, "t", &snap), first);
        }
    }
}
