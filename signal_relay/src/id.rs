//! Peer identifier generation

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of hex characters kept from a random UUID.
const PEER_ID_LEN: usize = 12;

/// Identifier assigned to a connection for as long as it is live.
///
/// Identifiers are short random tokens, not secrets. Twelve hex characters
/// carry 48 bits of randomness, so two live peers colliding is unlikely but
/// possible; the relay does not detect it. A collision would make a targeted
/// message reach the wrong peer or merge two registry entries, which is a
/// correctness risk rather than a security one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Produce a fresh identifier from a v4 UUID.
    pub fn generate() -> Self {
        let mut id = uuid::Uuid::new_v4().simple().to_string();
        id.truncate(PEER_ID_LEN);
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for PeerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for PeerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
