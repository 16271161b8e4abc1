//! Common types for the queue core.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The address of a queue node, `host:port` by convention.
///
/// Node addresses are the identity used for ring placement, backup-store
/// routing, and peer iteration; two nodes with the same address are the
/// same node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeAddr(String);

impl NodeAddr {
    /// Creates a node address.
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a filesystem-safe form of the address.
    ///
    /// Used to name per-owner backup store directories.
    #[must_use]
    pub fn dir_name(&self) -> String {
        self.0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeAddr {
    fn from(addr: &str) -> Self {
        Self::new(addr)
    }
}

impl From<String> for NodeAddr {
    fn from(addr: String) -> Self {
        Self(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_name_is_filesystem_safe() {
        let addr = NodeAddr::new("10.0.0.7:6090");
        assert_eq!(addr.dir_name(), "10.0.0.7_6090");
    }

    #[test]
    fn display_round_trip() {
        let addr = NodeAddr::new("worker-3:6090");
        assert_eq!(addr.to_string(), "worker-3:6090");
        assert_eq!(addr.as_str(), "worker-3:6090");
    }
}
