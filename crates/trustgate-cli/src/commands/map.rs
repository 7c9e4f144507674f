// crates/trustgate-cli/src/commands/map.rs
//
// `trustgate map`: display the network map with the counters each score
// inverts to.

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;
use tabled::Tabled;
use trustgate_reputation::{counters_from_score, DEFAULT_BASE_RATE_DELTA};
use trustgate_store::{read_network_map, MapLine};

use crate::expand_path;
use crate::output::{format_score, render, OutputFormat};

/// Arguments for `trustgate map`.
#[derive(Debug, Args)]
pub struct MapCmd {
    /// Network map to read.
    #[arg(long, default_value = "~/.trustgate/network_map.txt")]
    pub path: PathBuf,

    /// Only show edges into this broker.
    #[arg(long)]
    pub target: Option<String>,

    /// Base rate used to invert scores.
    #[arg(long, default_value_t = DEFAULT_BASE_RATE_DELTA, value_parser = super::parse_base_rate)]
    pub delta: f64,
}

/// A row in the network map table.
#[derive(Tabled, Serialize)]
struct MapRow {
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "r")]
    r: u64,
    #[tabled(rename = "s")]
    s: u64,
}

fn rows(lines: &[MapLine], target: Option<&str>, delta: f64) -> Vec<MapRow> {
    lines
        .iter()
        .filter(|l| target.map_or(true, |t| l.target.as_str() == t))
        .map(|l| {
            let (r, s) = counters_from_score(l.score, delta);
            MapRow {
                source: l.source.to_string(),
                target: l.target.to_string(),
                score: format_score(l.score),
                r,
                s,
            }
        })
        .collect()
}

/// Run the map command.
pub fn run(cmd: &MapCmd, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let path = expand_path(&cmd.path);
    let lines = read_network_map(&path)?;
    let rows = rows(&lines, cmd.target.as_deref(), cmd.delta);

    if format == OutputFormat::Table {
        println!("Network map: {} ({} edges)", path.display(), rows.len());
        println!();
    }
    println!("{}", render(&rows, format));
    Ok(())
}
