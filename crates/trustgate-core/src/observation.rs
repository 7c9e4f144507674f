// crates/trustgate-core/src/observation.rs
//
// Reputation observations and the persisted store line they accumulate into.

use serde::{Deserialize, Serialize};

use crate::broker::BrokerId;

/// Outcome of one interaction a broker observed with a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Positive,
    Negative,
}

impl Outcome {
    /// Parse the feedback wording used on the wire ("positive" / "negative").
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "positive" => Some(Outcome::Positive),
            "negative" => Some(Outcome::Negative),
            _ => None,
        }
    }
}

/// One `source_id,r_value,s_value` line of a broker's reputation store.
///
/// The store's owner is the edge target: a line in `B1`'s store about `B0`
/// describes the edge `B0 -> B1`. Counters are signed so that corrupt
/// negative values survive parsing and score as zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLine {
    pub source: BrokerId,
    pub r: i64,
    pub s: i64,
}

impl StoreLine {
    /// Parse a single store line. Returns `None` for comments, blank lines,
    /// and anything that does not have exactly three well-formed fields.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        let mut parts = line.split(',');
        let source = BrokerId::new(parts.next()?.trim());
        let r = parts.next()?.trim().parse::<i64>().ok()?;
        let s = parts.next()?.trim().parse::<i64>().ok()?;
        if parts.next().is_some() || !source.is_well_formed() {
            return None;
        }
        Some(Self { source, r, s })
    }

    /// Render as a store line (no trailing newline).
    pub fn render(&self) -> String {
        format!("{},{},{}", self.source, self.r, self.s)
    }
}
