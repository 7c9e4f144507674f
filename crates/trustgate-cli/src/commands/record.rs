// crates/trustgate-cli/src/commands/record.rs
//
// `trustgate record`: append one observation to a broker's own store.

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;
use tabled::Tabled;
use trustgate_core::{BrokerId, Outcome};
use trustgate_reputation::{score, DEFAULT_BASE_RATE_DELTA};
use trustgate_store::ReputationStore;

use crate::expand_path;
use crate::output::{format_score, render, OutputFormat};

/// Arguments for `trustgate record`.
#[derive(Debug, Args)]
pub struct RecordCmd {
    /// Directory holding `trust_store_<broker>.txt` files.
    #[arg(long, default_value = "~/.trustgate/trust_history")]
    pub store_dir: PathBuf,

    /// Broker recording the observation (owner of the store).
    #[arg(long)]
    pub observer: String,

    /// Broker the observation is about.
    #[arg(long)]
    pub subject: String,

    /// positive or negative.
    #[arg(long, value_parser = parse_outcome)]
    pub outcome: Outcome,

    /// How many observations this counts as.
    #[arg(long, default_value_t = 1)]
    pub weight: u64,
}

fn parse_outcome(s: &str) -> Result<Outcome, String> {
    Outcome::parse(s).ok_or_else(|| format!("expected positive or negative, got '{}'", s))
}

#[derive(Tabled, Serialize)]
struct CountersRow {
    #[tabled(rename = "Edge")]
    edge: String,
    #[tabled(rename = "r")]
    r: u64,
    #[tabled(rename = "s")]
    s: u64,
    #[tabled(rename = "Score")]
    score: String,
}

/// Run the record command.
pub fn run(cmd: &RecordCmd, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let observer = BrokerId::new(cmd.observer.as_str());
    let subject = BrokerId::new(cmd.subject.as_str());
    let mut store = ReputationStore::open(&expand_path(&cmd.store_dir), observer.clone())?;
    let counters = store.record_weighted(&observer, &subject, cmd.outcome, cmd.weight.max(1))?;

    let r = i64::try_from(counters.r).unwrap_or(i64::MAX);
    let s = i64::try_from(counters.s).unwrap_or(i64::MAX);
    let row = CountersRow {
        edge: format!("{}->{}", subject, observer),
        r: counters.r,
        s: counters.s,
        score: format_score(score(r, s, DEFAULT_BASE_RATE_DELTA)),
    };
    println!("{}", render(&[row], format));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_parser_is_strict() {
        assert_eq!(parse_outcome("negative").unwrap(), Outcome::Negative);
        assert!(parse_outcome("meh").is_err());
    }

    #[test]
    fn records_into_observer_store() {
        let dir = std::env::temp_dir().join(format!("trustgate_test_cli_rec_{}", uuid::Uuid::now_v7()));
        let cmd = RecordCmd {
            store_dir: dir.clone(),
            observer: "B1".to_string(),
            subject: "B0".to_string(),
            outcome: Outcome::Negative,
            weight: 5,
        };
        run(&cmd, OutputFormat::Json).unwrap();
        run(&cmd, OutputFormat::Json).unwrap();

        let store = ReputationStore::open(&dir, BrokerId::from("B1")).unwrap();
        assert_eq!(store.counters(&BrokerId::from("B0")).s, 10);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
