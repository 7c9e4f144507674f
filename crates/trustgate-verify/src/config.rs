// crates/trustgate-verify/src/config.rs
//
// Authorization settings consulted by the signer-chain verifier.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use trustgate_core::{BrokerId, TrustGateError};
use trustgate_reputation::EvaluationPolicy;

use crate::acl::AclTable;

/// Default maximum signer-chain length.
pub const DEFAULT_MAX_CHAIN_LENGTH: usize = 8;

/// Default acceptance threshold.
pub const DEFAULT_TRUST_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// The broker doing the verifying.
    pub local_broker: BrokerId,
    /// Clients allowed to publish. Empty means nobody is.
    pub authorized_clients: BTreeSet<String>,
    /// Optional per-topic publish rules on top of the allowlist.
    pub acl: Option<AclTable>,
    /// When set, topics must be this prefix or lie under `<prefix>/`.
    pub topic_namespace: Option<String>,
    pub max_chain_length: usize,
    pub policy: EvaluationPolicy,
    pub default_threshold: f64,
    pub topic_thresholds: HashMap<String, f64>,
    pub client_thresholds: HashMap<String, f64>,
}

impl VerifierConfig {
    /// Defaults for `local_broker`: chain length 8, threshold 0.5,
    /// best-signer, no ACL, no namespace, empty allowlist.
    pub fn new(local_broker: impl Into<BrokerId>) -> Self {
        Self {
            local_broker: local_broker.into(),
            authorized_clients: BTreeSet::new(),
            acl: None,
            topic_namespace: None,
            max_chain_length: DEFAULT_MAX_CHAIN_LENGTH,
            policy: EvaluationPolicy::default(),
            default_threshold: DEFAULT_TRUST_THRESHOLD,
            topic_thresholds: HashMap::new(),
            client_thresholds: HashMap::new(),
        }
    }

    pub fn with_clients<I, S>(mut self, clients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authorized_clients = clients.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_policy(mut self, policy: EvaluationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Threshold for a message: topic override, then client override, then
    /// the default.
    pub fn threshold_for(&self, topic: &str, client_id: &str) -> f64 {
        self.topic_thresholds
            .get(topic)
            .or_else(|| self.client_thresholds.get(client_id))
            .copied()
            .unwrap_or(self.default_threshold)
    }

    /// True if `topic` is inside the configured namespace (or none is set).
    pub fn in_namespace(&self, topic: &str) -> bool {
        match self.topic_namespace.as_deref() {
            None | Some("") => true,
            Some(ns) => {
                let ns = ns.trim_end_matches('/');
                topic == ns
                    || topic
                        .strip_prefix(ns)
                        .is_some_and(|rest| rest.starts_with('/'))
            }
        }
    }

    /// Reject settings the verifier cannot honour.
    pub fn validate(&self) -> Result<(), TrustGateError> {
        if !self.local_broker.is_well_formed() {
            return Err(TrustGateError::Config(format!(
                "Invalid local broker id: {:?}",
                self.local_broker.as_str()
            )));
        }
        if self.max_chain_length == 0 {
            return Err(TrustGateError::Config("max_chain_length must be at least 1".to_string()));
        }
        let thresholds = std::iter::once(("default", &self.default_threshold))
            .chain(self.topic_thresholds.iter().map(|(k, v)| (k.as_str(), v)))
            .chain(self.client_thresholds.iter().map(|(k, v)| (k.as_str(), v)));
        for (name, t) in thresholds {
            if !(0.0..=1.0).contains(t) {
                return Err(TrustGateError::Config(format!(
                    "Threshold for '{}' must be within [0, 1], got {}",
                    name, t
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_lookup_order() {
        let mut cfg = VerifierConfig::new("B4");
        cfg.topic_thresholds.insert("alerts".to_string(), 0.8);
        cfg.client_thresholds.insert("C1".to_string(), 0.6);

        assert_eq!(cfg.threshold_for("alerts", "C1"), 0.8);
        assert_eq!(cfg.threshold_for("other", "C1"), 0.6);
        assert_eq!(cfg.threshold_for("other", "C2"), 0.5);
    }

    #[test]
    fn namespace_matching() {
        let mut cfg = VerifierConfig::new("B4");
        assert!(cfg.in_namespace("anything"));
        cfg.topic_namespace = Some("plant/".to_string());
        assert!(cfg.in_namespace("plant"));
        assert!(cfg.in_namespace("plant/line1"));
        assert!(!cfg.in_namespace("plantation/line1"));
        assert!(!cfg.in_namespace("other"));
    }

    #[test]
    fn validate_rejects_out_of_range() {
        let mut cfg = VerifierConfig::new("B4");
        assert!(cfg.validate().is_ok());
        cfg.client_thresholds.insert("C1".to_string(), 1.5);
        assert!(cfg.validate().is_err());

        let mut cfg = VerifierConfig::new("B4");
        cfg.max_chain_length = 0;
        assert!(cfg.validate().is_err());
    }
}
