// crates/trustgate-verify/src/acl.rs
//
// Topic access-control list.
//
// File format, one rule per line:
//   C1,pub,sensors/temperature
//   C2,sub,sensors/#
// Blank lines and `#` comments are ignored. Topics match exactly.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use trustgate_core::TrustGateError;

/// Direction a rule grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AclAccess {
    Pub,
    Sub,
}

impl FromStr for AclAccess {
    type Err = TrustGateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pub" => Ok(AclAccess::Pub),
            "sub" => Ok(AclAccess::Sub),
            other => Err(TrustGateError::Config(format!("Unknown ACL access '{}'", other))),
        }
    }
}

impl fmt::Display for AclAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AclAccess::Pub => f.write_str("pub"),
            AclAccess::Sub => f.write_str("sub"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclRule {
    pub client_id: String,
    pub access: AclAccess,
    pub topic: String,
}

impl AclRule {
    /// Parse one `client,access,topic` line.
    pub fn parse(line: &str) -> Result<Self, TrustGateError> {
        let mut parts = line.trim().splitn(3, ',');
        let (Some(client), Some(access), Some(topic)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(TrustGateError::Config(format!("ACL line needs 3 fields: {:?}", line)));
        };
        let client_id = client.trim().to_string();
        let topic = topic.trim().to_string();
        if client_id.is_empty() || topic.is_empty() {
            return Err(TrustGateError::Config(format!("ACL line has empty field: {:?}", line)));
        }
        Ok(Self {
            client_id,
            access: access.trim().parse()?,
            topic,
        })
    }
}

/// An ordered set of ACL rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclTable {
    rules: Vec<AclRule>,
}

impl AclTable {
    pub fn new(rules: Vec<AclRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[AclRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// True if some rule grants `client_id` the `access` on `topic`.
    pub fn allows(&self, client_id: &str, topic: &str, access: AclAccess) -> bool {
        self.rules
            .iter()
            .any(|r| r.client_id == client_id && r.access == access && r.topic == topic)
    }
}

/// Load an ACL file. Unparseable lines are skipped with a warning.
pub fn load_acl_file(path: &Path) -> Result<AclTable, TrustGateError> {
    let contents = fs::read_to_string(path).map_err(|e| {
        TrustGateError::Config(format!("Failed to read ACL file {}: {}", path.display(), e))
    })?;
    let mut rules = Vec::new();
    for (lineno, raw) in contents.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match AclRule::parse(line) {
            Ok(rule) => rules.push(rule),
            Err(e) => tracing::warn!("ACL {}:{}: {}", path.display(), lineno + 1, e),
        }
    }
    tracing::info!("Loaded {} ACL rules from {}", rules.len(), path.display());
    Ok(AclTable::new(rules))
}
