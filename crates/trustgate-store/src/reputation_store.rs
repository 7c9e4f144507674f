// crates/trustgate-store/src/reputation_store.rs
//
// A broker's own reputation store: positive (r) / negative (s) observation
// counters for every peer it has an opinion about.
//
// File format (one file per broker, see `store_file_name`):
//   # Local trust data held by <owner>
//   # Format: source_broker,r_value,s_value
//   B0,3,1
//
// Exactly one process writes a given broker's store, so there is no
// cross-writer locking. Counters only ever grow; each record is persisted by
// rewriting the file through `write_atomic`.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use trustgate_core::{BrokerId, Outcome, StoreLine, TrustGateError};

use crate::atomic::write_atomic;
use crate::store_dir::store_file_name;

/// Observation counters for one (subject -> owner) edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub r: u64,
    pub s: u64,
}

/// Durable, single-writer reputation store for one broker.
#[derive(Debug)]
pub struct ReputationStore {
    owner: BrokerId,
    path: PathBuf,
    counters: BTreeMap<BrokerId, Counters>,
}

impl ReputationStore {
    /// Open (or start) `owner`'s store inside `dir`.
    ///
    /// A missing file is an empty store. Malformed lines are skipped with a
    /// warning; negative counters are read as zero.
    pub fn open(dir: &Path, owner: BrokerId) -> Result<Self, TrustGateError> {
        if !owner.is_well_formed() {
            return Err(TrustGateError::Config(format!("Invalid broker id: {:?}", owner.as_str())));
        }
        let path = dir.join(store_file_name(&owner));
        let mut counters = BTreeMap::new();

        match fs::read_to_string(&path) {
            Ok(contents) => {
                for (lineno, raw) in contents.lines().enumerate() {
                    let trimmed = raw.trim();
                    if trimmed.is_empty() || trimmed.starts_with('#') {
                        continue;
                    }
                    match StoreLine::parse(trimmed) {
                        Some(line) => {
                            counters.insert(
                                line.source,
                                Counters {
                                    r: line.r.max(0) as u64,
                                    s: line.s.max(0) as u64,
                                },
                            );
                        }
                        None => tracing::warn!(
                            "Store {}: skipping malformed line {}: {:?}",
                            path.display(),
                            lineno + 1,
                            raw
                        ),
                    }
                }
                tracing::debug!("Loaded {} entries from {}", counters.len(), path.display());
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("No store at {}, starting empty", path.display());
            }
            Err(e) => {
                return Err(TrustGateError::Storage(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        }

        Ok(Self {
            owner,
            path,
            counters,
        })
    }

    pub fn owner(&self) -> &BrokerId {
        &self.owner
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current counters for `subject` (zero if never observed).
    pub fn counters(&self, subject: &BrokerId) -> Counters {
        self.counters.get(subject).copied().unwrap_or_default()
    }

    /// Record one observation by `observer` of `subject` and persist.
    ///
    /// Positive adds one to `r`, negative adds one to `s`. Only the store's
    /// owner may record into it.
    pub fn record(
        &mut self,
        observer: &BrokerId,
        subject: &BrokerId,
        outcome: Outcome,
    ) -> Result<Counters, TrustGateError> {
        self.record_weighted(observer, subject, outcome, 1)
    }

    /// Like `record`, adding `weight` to the chosen counter.
    ///
    /// Used for feedback where a negative report counts several times.
    pub fn record_weighted(
        &mut self,
        observer: &BrokerId,
        subject: &BrokerId,
        outcome: Outcome,
        weight: u64,
    ) -> Result<Counters, TrustGateError> {
        if observer != &self.owner {
            return Err(TrustGateError::Storage(format!(
                "{} cannot write to the store owned by {}",
                observer, self.owner
            )));
        }
        if !subject.is_well_formed() {
            return Err(TrustGateError::Storage(format!("Invalid subject id: {:?}", subject.as_str())));
        }

        let entry = self.counters.entry(subject.clone()).or_default();
        match outcome {
            Outcome::Positive => entry.r = entry.r.saturating_add(weight),
            Outcome::Negative => entry.s = entry.s.saturating_add(weight),
        }
        let updated = *entry;
        self.persist()?;

        tracing::info!(
            "Recorded {:?} x{} for {}->{}: r={}, s={}",
            outcome,
            weight,
            subject,
            self.owner,
            updated.r,
            updated.s
        );
        Ok(updated)
    }

    /// Store contents as lines, sorted by subject.
    pub fn lines(&self) -> Vec<StoreLine> {
        self.counters
            .iter()
            .map(|(source, c)| StoreLine {
                source: source.clone(),
                r: i64::try_from(c.r).unwrap_or(i64::MAX),
                s: i64::try_from(c.s).unwrap_or(i64::MAX),
            })
            .collect()
    }

    /// Render the file body.
    pub fn render(&self) -> String {
        let mut out = format!(
            "# Local trust data held by {}\n# Format: source_broker,r_value,s_value\n",
            self.owner
        );
        for line in self.lines() {
            out.push_str(&line.render());
            out.push('\n');
        }
        out
    }

    /// Rewrite the file atomically with the current counters.
    pub fn persist(&self) -> Result<(), TrustGateError> {
        write_atomic(&self.path, self.render().as_bytes())
    }
}
