// crates/trustgate-store/src/store_dir.rs
//
// Directory of per-broker store files, read by the aggregator.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use trustgate_core::{BrokerId, StoreLine, StoreSource, TrustGateError};

/// File name of `owner`'s store: `trust_store_<owner>.txt`.
pub fn store_file_name(owner: &BrokerId) -> String {
    format!("trust_store_{}.txt", owner)
}

/// A directory holding `trust_store_<broker>.txt` files.
#[derive(Debug, Clone)]
pub struct StoreDirectory {
    dir: PathBuf,
}

impl StoreDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, owner: &BrokerId) -> PathBuf {
        self.dir.join(store_file_name(owner))
    }
}

impl StoreSource for StoreDirectory {
    fn load_store(&self, owner: &BrokerId) -> Result<Vec<StoreLine>, TrustGateError> {
        if !owner.is_well_formed() {
            return Err(TrustGateError::StoreUnavailable(format!(
                "refusing store path for id {:?}",
                owner.as_str()
            )));
        }
        let path = self.path_for(owner);
        let contents = fs::read_to_string(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                TrustGateError::StoreUnavailable(format!("{} not found", path.display()))
            }
            _ => TrustGateError::StoreUnavailable(format!("{}: {}", path.display(), e)),
        })?;

        let mut lines = Vec::new();
        for (lineno, raw) in contents.lines().enumerate() {
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            match StoreLine::parse(trimmed) {
                Some(line) => lines.push(line),
                None => tracing::warn!(
                    "Store {}: ignoring malformed line {}: {:?}",
                    path.display(),
                    lineno + 1,
                    raw
                ),
            }
        }
        Ok(lines)
    }
}
