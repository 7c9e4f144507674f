// crates/trustgate-cli/src/commands/aggregate.rs
//
// `trustgate aggregate`: one aggregation run.
//
// Exit status: 0 when the map was written, 2 when the topology is missing
// (the previous map is left untouched), 1 for any other failure.

use std::path::PathBuf;

use chrono::Utc;
use clap::Args;
use serde::Serialize;
use tabled::Tabled;
use trustgate_core::TrustGateError;
use trustgate_reputation::{run_aggregation, AggregationReport, DEFAULT_BASE_RATE_DELTA};
use trustgate_store::StoreDirectory;

use crate::expand_path;
use crate::output::{render, OutputFormat};

/// Arguments for `trustgate aggregate`.
#[derive(Debug, Args)]
pub struct AggregateCmd {
    /// Base topology file (`source,target` per line).
    #[arg(long, default_value = "~/.trustgate/topology.txt")]
    pub topology: PathBuf,

    /// Directory holding `trust_store_<broker>.txt` files.
    #[arg(long, default_value = "~/.trustgate/trust_history")]
    pub store_dir: PathBuf,

    /// Network map to write.
    #[arg(long, default_value = "~/.trustgate/network_map.txt")]
    pub output: PathBuf,

    /// Base rate used for edges without observations.
    #[arg(long, default_value_t = DEFAULT_BASE_RATE_DELTA, value_parser = super::parse_base_rate)]
    pub delta: f64,
}

#[derive(Tabled, Serialize)]
struct ReportRow {
    #[tabled(rename = "Edges")]
    edges: usize,
    #[tabled(rename = "Stores Read")]
    stores_read: usize,
    #[tabled(rename = "Stores Skipped")]
    stores_skipped: usize,
    #[tabled(rename = "Lines Applied")]
    lines_applied: usize,
    #[tabled(rename = "Lines Discarded")]
    lines_discarded: usize,
}

impl From<&AggregationReport> for ReportRow {
    fn from(r: &AggregationReport) -> Self {
        Self {
            edges: r.edges,
            stores_read: r.stores_read,
            stores_skipped: r.stores_skipped,
            lines_applied: r.lines_applied,
            lines_discarded: r.lines_discarded,
        }
    }
}

/// Process exit status for an aggregation error.
pub fn exit_code(err: &TrustGateError) -> i32 {
    match err {
        TrustGateError::TopologyUnavailable(_) => 2,
        _ => 1,
    }
}

/// Run the aggregate command.
pub fn run(cmd: &AggregateCmd, format: OutputFormat) -> Result<(), TrustGateError> {
    let topology = expand_path(&cmd.topology);
    let output = expand_path(&cmd.output);
    let stores = StoreDirectory::new(expand_path(&cmd.store_dir));

    let (_, report) = run_aggregation(&topology, &stores, &output, cmd.delta, Utc::now())?;

    if format == OutputFormat::Table {
        println!("Network map written to {}", output.display());
        println!();
    }
    println!("{}", render(&[ReportRow::from(&report)], format));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_distinguish_missing_topology() {
        assert_eq!(exit_code(&TrustGateError::TopologyUnavailable("gone".into())), 2);
        assert_eq!(exit_code(&TrustGateError::Storage("disk".into())), 1);
    }

    #[test]
    fn missing_topology_maps_to_exit_two() {
        let dir = std::env::temp_dir().join(format!("trustgate_test_cli_agg_{}", uuid::Uuid::now_v7()));
        let cmd = AggregateCmd {
            topology: dir.join("topology.txt"),
            store_dir: dir.clone(),
            output: dir.join("network_map.txt"),
            delta: 0.5,
        };
        let err = run(&cmd, OutputFormat::Json).unwrap_err();
        assert_eq!(exit_code(&err), 2);
        assert!(!cmd.output.exists());
    }
}
