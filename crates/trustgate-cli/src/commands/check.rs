// crates/trustgate-cli/src/commands/check.rs
//
// `trustgate check`: run the admission pipeline offline over
// newline-delimited wire messages and print one verdict per line.
//
// Rate limiting is effectively disabled here: every line comes from the
// same local sender and none should be shed.

use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use serde::Serialize;
use tabled::Tabled;
use trustgate_admission::{AdmissionConfig, AdmissionGate};
use trustgate_core::{MessageAuthenticator, TrustGateError};
use trustgate_reputation::{EvaluationPolicy, SnapshotCell, TrustGraph, DEFAULT_BASE_RATE_DELTA};
use trustgate_store::read_network_map;
use trustgate_verify::{load_acl_file, SignerChainVerifier, VerifierConfig};

use crate::expand_path;
use crate::output::{format_score, render, OutputFormat};

const CHECK_SENDER: &str = "trustgate-check";

/// Arguments for `trustgate check`.
#[derive(Debug, Args)]
pub struct CheckCmd {
    /// Shared secret for message tags.
    #[arg(long, env = "TRUSTGATE_SECRET", hide_env_values = true)]
    pub secret: String,

    /// Broker doing the verification.
    #[arg(long)]
    pub broker: String,

    /// Comma-separated authorized client ids.
    #[arg(long, value_delimiter = ',')]
    pub clients: Vec<String>,

    /// Network map to evaluate against.
    #[arg(long, default_value = "~/.trustgate/network_map.txt")]
    pub map: PathBuf,

    /// Optional ACL file (`client,pub|sub,topic`).
    #[arg(long)]
    pub acl: Option<PathBuf>,

    /// Topic every message is treated as published on.
    #[arg(long, default_value = "test/topic")]
    pub topic: String,

    #[arg(long, default_value_t = 0.5)]
    pub threshold: f64,

    #[arg(long, default_value_t = 8)]
    pub max_chain_length: usize,

    /// best-signer or neighbour-signer.
    #[arg(long, default_value = "best-signer")]
    pub policy: EvaluationPolicy,

    #[arg(long, default_value_t = DEFAULT_BASE_RATE_DELTA, value_parser = super::parse_base_rate)]
    pub delta: f64,

    /// Input file; reads stdin when absent.
    #[arg(long)]
    pub input: Option<PathBuf>,
}

/// A row in the verdict table.
#[derive(Debug, Tabled, Serialize)]
pub struct VerdictRow {
    #[tabled(rename = "Line")]
    pub line: usize,
    #[tabled(rename = "Accepted")]
    pub accepted: bool,
    #[tabled(rename = "Score")]
    pub score: String,
    #[tabled(rename = "Reason")]
    pub reason: String,
}

/// Build an offline gate for `cmd`.
pub fn build_gate(cmd: &CheckCmd) -> Result<AdmissionGate, TrustGateError> {
    let lines = read_network_map(&expand_path(&cmd.map))?;
    let graph = TrustGraph::from_map_lines(&lines, cmd.delta);

    let mut config = VerifierConfig::new(cmd.broker.as_str())
        .with_clients(cmd.clients.iter().map(|c| c.trim().to_string()))
        .with_policy(cmd.policy);
    config.default_threshold = cmd.threshold;
    config.max_chain_length = cmd.max_chain_length;
    if let Some(acl) = &cmd.acl {
        config.acl = Some(load_acl_file(&expand_path(acl))?);
    }

    AdmissionGate::new(
        MessageAuthenticator::new(cmd.secret.as_bytes())?,
        SignerChainVerifier::new(config)?,
        Arc::new(SnapshotCell::new(graph, 4096)),
        &AdmissionConfig {
            per_sender_rate: u32::MAX,
            burst_multiplier: 1,
            violations_before_ban: u32::MAX,
            ban_duration_secs: 0,
            max_in_flight: 1,
        },
    )
}

/// Admit every non-blank line, numbering lines from 1.
pub fn check_lines<I>(gate: &AdmissionGate, topic: &str, lines: I) -> Vec<VerdictRow>
where
    I: IntoIterator<Item = String>,
{
    lines
        .into_iter()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, l)| {
            let admission = gate.admit(CHECK_SENDER, topic, l.trim().as_bytes());
            VerdictRow {
                line: i + 1,
                accepted: admission.verdict.accepted,
                score: format_score(admission.verdict.score),
                reason: admission.verdict.reason.to_string(),
            }
        })
        .collect()
}

/// Run the check command.
pub fn run(cmd: &CheckCmd, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let gate = build_gate(cmd)?;
    let reader: Box<dyn BufRead> = match &cmd.input {
        Some(path) => Box::new(BufReader::new(std::fs::File::open(expand_path(path))?)),
        None => Box::new(BufReader::new(io::stdin())),
    };
    let lines = reader.lines().collect::<Result<Vec<_>, _>>()?;
    let rows = check_lines(&gate, &cmd.topic, lines);

    println!("{}", render(&rows, format));
    if format == OutputFormat::Table {
        let accepted = rows.iter().filter(|r| r.accepted).count();
        println!();
        println!("{} of {} messages accepted", accepted, rows.len());
        for (reason, count) in gate.outcome_counts() {
            println!("  {:<24} {}", reason, count);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trustgate_core::{BrokerId, MessageBody};

    const SECRET: &str = "check-secret";

    fn cmd(dir: &std::path::Path) -> CheckCmd {
        CheckCmd {
            secret: SECRET.to_string(),
            broker: "B1".to_string(),
            clients: vec!["C1".to_string()],
            map: dir.join("network_map.txt"),
            acl: None,
            topic: "test/topic".to_string(),
            threshold: 0.8,
            max_chain_length: 8,
            policy: EvaluationPolicy::BestSigner,
            delta: 0.5,
            input: None,
        }
    }

    fn wire(signer: &str, chain: &[&str]) -> String {
        let auth = MessageAuthenticator::new(SECRET).unwrap();
        let chain = chain.iter().map(|s| BrokerId::from(*s)).collect();
        let bytes = auth
            .sign(MessageBody::new(signer, "C1", json!("x"), chain))
            .unwrap()
            .to_wire()
            .to_bytes()
            .unwrap();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn verdicts_follow_map_scores() {
        let dir = std::env::temp_dir().join(format!("trustgate_test_cli_check_{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("network_map.txt"), "# map\nB0,B1,0.875\nB2,B1,0.143\n").unwrap();

        let gate = build_gate(&cmd(&dir)).unwrap();
        let long_chain: Vec<&str> = std::iter::repeat("B0").take(9).collect();
        let lines = vec![
            wire("B0", &["B1"]),
            String::new(),
            wire("B2", &["B1"]),
            "{}".to_string(),
            wire("B0", &long_chain),
        ];
        let rows = check_lines(&gate, "test/topic", lines);

        assert_eq!(rows.len(), 4);
        assert!(rows[0].accepted);
        assert_eq!(rows[0].score, "0.875");
        assert_eq!(rows[1].line, 3);
        assert_eq!(rows[1].reason, "trust_below_threshold");
        assert_eq!(rows[2].reason, "malformed_message");
        assert_eq!(rows[3].reason, "chain_too_long");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_map_is_an_error() {
        let dir = std::env::temp_dir().join(format!("trustgate_test_cli_nomap_{}", uuid::Uuid::now_v7()));
        assert!(build_gate(&cmd(&dir)).is_err());
    }
}
