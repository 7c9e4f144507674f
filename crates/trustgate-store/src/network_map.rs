// crates/trustgate-store/src/network_map.rs
//
// Topology and network-map file codecs.
//
// Both files share one line format, `source,target[,score]`, with `#`
// comments and blank lines ignored. The topology only contributes its
// (source, target) pairs; the network map written by the aggregator always
// carries a score formatted to three decimals under a timestamp header.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use chrono::{DateTime, Utc};
use trustgate_core::{BrokerId, TrustGateError};

use crate::atomic::write_atomic;

/// One `source,target,score` line of the authoritative network map.
#[derive(Debug, Clone, PartialEq)]
pub struct MapLine {
    pub source: BrokerId,
    pub target: BrokerId,
    pub score: f64,
}

impl MapLine {
    pub fn render(&self) -> String {
        format!("{},{},{:.3}", self.source, self.target, self.score)
    }
}

fn data_lines(contents: &str) -> impl Iterator<Item = (usize, &str)> {
    contents
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty() && !l.starts_with('#'))
}

fn parse_pair(line: &str) -> Option<(BrokerId, BrokerId, Option<&str>)> {
    let mut parts = line.split(',');
    let source = BrokerId::new(parts.next()?.trim());
    let target = BrokerId::new(parts.next()?.trim());
    let score = parts.next().map(str::trim);
    if !source.is_well_formed() || !target.is_well_formed() {
        return None;
    }
    Some((source, target, score))
}

/// Read the base topology: the declared (source, target) edges.
///
/// A missing file is `TopologyUnavailable`, the one fatal condition for
/// aggregation. Duplicate edges are collapsed; unparseable lines are skipped
/// with a warning.
pub fn read_topology(path: &Path) -> Result<Vec<(BrokerId, BrokerId)>, TrustGateError> {
    let contents = fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => {
            TrustGateError::TopologyUnavailable(format!("{} not found", path.display()))
        }
        _ => TrustGateError::TopologyUnavailable(format!("{}: {}", path.display(), e)),
    })?;

    let mut edges = Vec::new();
    for (lineno, line) in data_lines(&contents) {
        match parse_pair(line) {
            Some((source, target, _)) => edges.push((source, target)),
            None => tracing::warn!(
                "Topology {}: skipping malformed line {}: {:?}",
                path.display(),
                lineno,
                line
            ),
        }
    }
    edges.sort();
    edges.dedup();
    Ok(edges)
}

/// Read an authoritative network map. Lines without a parseable score are
/// skipped with a warning.
pub fn read_network_map(path: &Path) -> Result<Vec<MapLine>, TrustGateError> {
    let contents = fs::read_to_string(path).map_err(|e| {
        TrustGateError::Storage(format!("Failed to read network map {}: {}", path.display(), e))
    })?;

    let mut lines = Vec::new();
    for (lineno, line) in data_lines(&contents) {
        let parsed = parse_pair(line).and_then(|(source, target, score)| {
            let score = score?.parse::<f64>().ok()?;
            score.is_finite().then_some(MapLine {
                source,
                target,
                score,
            })
        });
        match parsed {
            Some(l) => lines.push(l),
            None => tracing::warn!(
                "Network map {}: skipping malformed line {}: {:?}",
                path.display(),
                lineno,
                line
            ),
        }
    }
    Ok(lines)
}

/// Render the map body. Lines are sorted by (source, target) so the body is
/// byte-identical for identical inputs; only the header timestamp varies.
pub fn render_network_map(lines: &[MapLine], aggregated_at: DateTime<Utc>) -> String {
    let mut sorted: Vec<&MapLine> = lines.iter().collect();
    sorted.sort_by(|a, b| (&a.source, &a.target).cmp(&(&b.source, &b.target)));

    let mut out = format!(
        "# Network Topology - Last aggregated at {}\n",
        aggregated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    for line in sorted {
        out.push_str(&line.render());
        out.push('\n');
    }
    out
}

/// Render and atomically replace the network map at `path`.
pub fn write_network_map(
    path: &Path,
    lines: &[MapLine],
    aggregated_at: DateTime<Utc>,
) -> Result<(), TrustGateError> {
    write_atomic(path, render_network_map(lines, aggregated_at).as_bytes())?;
    tracing::info!("Wrote {} edges to {}", lines.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn temp_dir(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("trustgate_test_{}_{}", label, Uuid::now_v7()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn line(s: &str, t: &str, score: f64) -> MapLine {
        MapLine {
            source: BrokerId::from(s),
            target: BrokerId::from(t),
            score,
        }
    }

    #[test]
    fn topology_ignores_scores_and_comments() {
        let dir = temp_dir("topology");
        let path = dir.join("topology.txt");
        fs::write(
            &path,
            "# Network Topology\nB1,B2,0.900\nB0,B1\n\nB0,B1,0.1\nbroken\n",
        )
        .unwrap();
        let edges = read_topology(&path).unwrap();
        assert_eq!(
            edges,
            vec![
                (BrokerId::from("B0"), BrokerId::from("B1")),
                (BrokerId::from("B1"), BrokerId::from("B2")),
            ]
        );
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_topology_is_fatal_error() {
        let path = std::env::temp_dir().join(format!("no_topology_{}.txt", Uuid::now_v7()));
        let err = read_topology(&path).unwrap_err();
        assert!(matches!(err, TrustGateError::TopologyUnavailable(_)));
    }

    #[test]
    fn render_is_sorted_with_three_decimals() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let body = render_network_map(
            &[line("B1", "B2", 0.5), line("B0", "B1", 2.0 / 3.0)],
            at,
        );
        assert_eq!(
            body,
            "# Network Topology - Last aggregated at 2025-03-01 12:00:00 UTC\n\
             B0,B1,0.667\n\
             B1,B2,0.500\n"
        );
    }

    #[test]
    fn written_map_reads_back() {
        let dir = temp_dir("map");
        let path = dir.join("network_map.txt");
        write_network_map(&path, &[line("B3", "B4", 0.25)], Utc::now()).unwrap();
        let lines = read_network_map(&path).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].source.as_str(), "B3");
        assert!((lines[0].score - 0.25).abs() < 1e-9);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn map_lines_without_score_are_skipped() {
        let dir = temp_dir("map_partial");
        let path = dir.join("network_map.txt");
        fs::write(&path, "B0,B1\nB1,B2,abc\nB2,B3,0.800\n").unwrap();
        let lines = read_network_map(&path).unwrap();
        assert_eq!(lines, vec![line("B2", "B3", 0.8)]);
        let _ = fs::remove_dir_all(&dir);
    }
}
