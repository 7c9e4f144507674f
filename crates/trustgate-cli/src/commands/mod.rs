// crates/trustgate-cli/src/commands/mod.rs
//
// Command module declarations for the TrustGate CLI.

pub mod aggregate;
pub mod check;
pub mod map;
pub mod record;
pub mod sign;

/// Parse a `--delta` value, refusing base rates outside [0, 1].
pub(crate) fn parse_base_rate(raw: &str) -> Result<f64, String> {
    let delta: f64 = raw.trim().parse().map_err(|e| format!("{}", e))?;
    trustgate_reputation::validate_base_rate(delta).map_err(|e| e.to_string())?;
    Ok(delta)
}
