// crates/trustgate-daemon/src/config.rs
//
// Runtime configuration for the TrustGate daemon.
// Loaded from a TOML file or populated with defaults.

use std::collections::HashMap;
use std::fs;

use serde::Deserialize;
use trustgate_admission::AdmissionConfig;
use trustgate_core::TrustGateError;
use trustgate_reputation::{validate_base_rate, EvaluationPolicy};
use trustgate_verify::{AclTable, VerifierConfig};

/// Runtime configuration for the daemon.
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    /// This broker's identity (e.g. "B4").
    #[serde(default = "default_broker_id")]
    pub broker_id: String,

    /// Address the line-protocol ingress listens on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Base topology file (`source,target` per line).
    #[serde(default = "default_topology_path")]
    pub topology_path: String,

    /// Directory holding `trust_store_<broker>.txt` files.
    #[serde(default = "default_store_dir")]
    pub store_dir: String,

    /// Authoritative network map written by the aggregator.
    #[serde(default = "default_network_map_path")]
    pub network_map_path: String,

    /// Log level used when RUST_LOG is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Shared secret for message tags. Must be set.
    #[serde(default)]
    pub shared_secret: String,

    /// Clients allowed to publish.
    #[serde(default)]
    pub authorized_clients: Vec<String>,

    /// Optional ACL file (`client,pub|sub,topic`).
    #[serde(default)]
    pub acl_path: Option<String>,

    /// Optional topic prefix that every published topic must fall under.
    #[serde(default)]
    pub topic_namespace: Option<String>,

    #[serde(default = "default_max_chain_length")]
    pub max_chain_length: usize,

    #[serde(default = "default_trust_threshold")]
    pub trust_threshold: f64,

    #[serde(default)]
    pub topic_thresholds: HashMap<String, f64>,

    #[serde(default)]
    pub client_thresholds: HashMap<String, f64>,

    #[serde(default = "default_base_rate_delta")]
    pub base_rate_delta: f64,

    /// Seconds between map reloads (and aggregation runs, if enabled).
    #[serde(default = "default_aggregation_interval_secs")]
    pub aggregation_interval_secs: u64,

    /// Whether this daemon also runs the aggregator on each tick.
    #[serde(default = "default_run_aggregator")]
    pub run_aggregator: bool,

    #[serde(default)]
    pub policy: EvaluationPolicy,

    /// Weight of one negative feedback report.
    #[serde(default = "default_negative_multiplier")]
    pub negative_multiplier: u64,

    #[serde(default = "default_per_sender_rate")]
    pub per_sender_rate: u32,

    #[serde(default = "default_burst_multiplier")]
    pub burst_multiplier: u32,

    #[serde(default = "default_violations_before_ban")]
    pub violations_before_ban: u32,

    #[serde(default = "default_ban_duration_secs")]
    pub ban_duration_secs: u64,

    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Entries per evaluation memo table, per snapshot.
    #[serde(default = "default_evaluator_cache_capacity")]
    pub evaluator_cache_capacity: usize,

    #[serde(default = "default_feedback_topic")]
    pub feedback_topic: String,

    /// Minimum gap between snapshots published because of feedback.
    /// Feedback arriving sooner is stored at once and published together.
    #[serde(default = "default_feedback_publish_interval_ms")]
    pub feedback_publish_interval_ms: u64,
}

fn default_broker_id() -> String {
    "B0".to_string()
}

fn default_listen_addr() -> String {
    "127.0.0.1:7883".to_string()
}

fn default_topology_path() -> String {
    "~/.trustgate/topology.txt".to_string()
}

fn default_store_dir() -> String {
    "~/.trustgate/trust_history".to_string()
}

fn default_network_map_path() -> String {
    "~/.trustgate/network_map.txt".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_chain_length() -> usize {
    8
}

fn default_trust_threshold() -> f64 {
    0.5
}

fn default_base_rate_delta() -> f64 {
    0.5
}

fn default_aggregation_interval_secs() -> u64 {
    10
}

fn default_run_aggregator() -> bool {
    true
}

fn default_negative_multiplier() -> u64 {
    5
}

fn default_per_sender_rate() -> u32 {
    50
}

fn default_burst_multiplier() -> u32 {
    2
}

fn default_violations_before_ban() -> u32 {
    20
}

fn default_ban_duration_secs() -> u64 {
    60
}

fn default_max_in_flight() -> usize {
    256
}

fn default_evaluator_cache_capacity() -> usize {
    4096
}

fn default_feedback_topic() -> String {
    "internal/feedback".to_string()
}

fn default_feedback_publish_interval_ms() -> u64 {
    1000
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            broker_id: default_broker_id(),
            listen_addr: default_listen_addr(),
            topology_path: default_topology_path(),
            store_dir: default_store_dir(),
            network_map_path: default_network_map_path(),
            log_level: default_log_level(),
            shared_secret: String::new(),
            authorized_clients: Vec::new(),
            acl_path: None,
            topic_namespace: None,
            max_chain_length: default_max_chain_length(),
            trust_threshold: default_trust_threshold(),
            topic_thresholds: HashMap::new(),
            client_thresholds: HashMap::new(),
            base_rate_delta: default_base_rate_delta(),
            aggregation_interval_secs: default_aggregation_interval_secs(),
            run_aggregator: default_run_aggregator(),
            policy: EvaluationPolicy::default(),
            negative_multiplier: default_negative_multiplier(),
            per_sender_rate: default_per_sender_rate(),
            burst_multiplier: default_burst_multiplier(),
            violations_before_ban: default_violations_before_ban(),
            ban_duration_secs: default_ban_duration_secs(),
            max_in_flight: default_max_in_flight(),
            evaluator_cache_capacity: default_evaluator_cache_capacity(),
            feedback_topic: default_feedback_topic(),
            feedback_publish_interval_ms: default_feedback_publish_interval_ms(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from a TOML file at the given path.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)?;
        let config: DaemonConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Check values that serde cannot: ranges and non-zero counts.
    /// Verifier settings are checked separately by the verifier itself.
    pub fn validate(&self) -> Result<(), TrustGateError> {
        validate_base_rate(self.base_rate_delta)?;
        if self.negative_multiplier == 0 {
            return Err(TrustGateError::Config("negative_multiplier must be at least 1".to_string()));
        }
        if self.feedback_topic.trim().is_empty() {
            return Err(TrustGateError::Config("feedback_topic must not be empty".to_string()));
        }
        Ok(())
    }

    /// Verifier settings derived from this config and an optional ACL.
    pub fn verifier_config(&self, acl: Option<AclTable>) -> VerifierConfig {
        let mut cfg = VerifierConfig::new(self.broker_id.as_str())
            .with_clients(self.authorized_clients.iter().cloned())
            .with_policy(self.policy);
        cfg.acl = acl;
        cfg.topic_namespace = self.topic_namespace.clone();
        cfg.max_chain_length = self.max_chain_length;
        cfg.default_threshold = self.trust_threshold;
        cfg.topic_thresholds = self.topic_thresholds.clone();
        cfg.client_thresholds = self.client_thresholds.clone();
        cfg
    }

    pub fn admission_config(&self) -> AdmissionConfig {
        AdmissionConfig {
            per_sender_rate: self.per_sender_rate,
            burst_multiplier: self.burst_multiplier,
            violations_before_ban: self.violations_before_ban,
            ban_duration_secs: self.ban_duration_secs,
            max_in_flight: self.max_in_flight,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let cfg: DaemonConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.max_chain_length, 8);
        assert_eq!(cfg.trust_threshold, 0.5);
        assert_eq!(cfg.aggregation_interval_secs, 10);
        assert_eq!(cfg.negative_multiplier, 5);
        assert_eq!(cfg.feedback_topic, "internal/feedback");
        assert_eq!(cfg.policy, EvaluationPolicy::BestSigner);
    }

    #[test]
    fn parses_policy_and_overrides() {
        let cfg: DaemonConfig = toml::from_str(
            r#"
            broker_id = "B4"
            shared_secret = "s3cret"
            authorized_clients = ["C1", "C8"]
            policy = "neighbour-signer"
            max_chain_length = 4

            [topic_thresholds]
            "alerts/critical" = 0.9
            "#,
        )
        .unwrap();
        assert_eq!(cfg.broker_id, "B4");
        assert_eq!(cfg.policy, EvaluationPolicy::NeighbourSigner);

        let verifier = cfg.verifier_config(None);
        assert_eq!(verifier.max_chain_length, 4);
        assert!(verifier.authorized_clients.contains("C8"));
        assert_eq!(verifier.threshold_for("alerts/critical", "C1"), 0.9);
        assert_eq!(verifier.threshold_for("other", "C1"), 0.5);
    }

    #[test]
    fn validate_checks_base_rate() {
        assert!(DaemonConfig::default().validate().is_ok());
        let cfg: DaemonConfig = toml::from_str("base_rate_delta = 1.2").unwrap();
        assert!(matches!(cfg.validate(), Err(TrustGateError::Config(_))));
        let cfg: DaemonConfig = toml::from_str("negative_multiplier = 0").unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_unknown_policy() {
        assert!(toml::from_str::<DaemonConfig>("policy = \"fastest\"").is_err());
    }
}
