// crates/trustgate-core/src/broker.rs

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a broker on the federated network (e.g. "B0").
///
/// Opaque to the engine: two ids are the same broker iff their strings are
/// equal. Ordering is lexicographic, which is what makes aggregation output
/// independent of input order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BrokerId(String);

impl BrokerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if the id is usable in the line-oriented file formats.
    ///
    /// Ids must be non-empty, may not start with the comment marker, and
    /// may not contain field separators, whitespace or path separators.
    /// Ids name store files, so `.` and `..` are refused too.
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty()
            && !self.0.starts_with('#')
            && self.0 != "."
            && self.0 != ".."
            && !self
                .0
                .chars()
                .any(|c| c == ',' || c == '/' || c == '\\' || c == '\0' || c.is_whitespace())
    }
}

impl fmt::Display for BrokerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BrokerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for BrokerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for BrokerId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for BrokerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_ids() {
        assert!(BrokerId::from("B0").is_well_formed());
        assert!(BrokerId::from("broker-west.7").is_well_formed());
        assert!(!BrokerId::from("").is_well_formed());
        assert!(!BrokerId::from("B0,B1").is_well_formed());
        assert!(!BrokerId::from("# B0").is_well_formed());
        assert!(!BrokerId::from("B 0").is_well_formed());
    }

    #[test]
    fn path_like_ids_rejected() {
        for raw in ["a/../../x", "..", ".", "B0\\..\\x", "/etc/passwd", "B\01"] {
            assert!(!BrokerId::from(raw).is_well_formed(), "{:?}", raw);
        }
    }

    #[test]
    fn ordering_is_lexicographic() {
        let mut ids = vec![BrokerId::from("B2"), BrokerId::from("B10"), BrokerId::from("B1")];
        ids.sort();
        let names: Vec<&str> = ids.iter().map(|b| b.as_str()).collect();
        assert_eq!(names, vec!["B1", "B10", "B2"]);
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&BrokerId::from("B3")).unwrap();
        assert_eq!(json, "\"B3\"");
    }
}
