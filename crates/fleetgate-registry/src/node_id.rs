use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque non-empty identifier for a registered node. Uniqueness itself is
/// enforced by the registry, not by this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

/// Returned when a candidate node id fails the non-empty invariant.
#[derive(Debug, thiserror::Error)]
#[error("node id must not be empty")]
pub struct EmptyNodeId;

impl NodeId {
    pub fn new(raw: impl Into<String>) -> Result<Self, EmptyNodeId> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(EmptyNodeId);
        }
        Ok(Self(raw))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty() {
        assert!(NodeId::new("").is_err());
    }

    #[test]
    fn accepts_non_empty() {
        let id = NodeId::new("agent-1").unwrap();
        assert_eq!(id.as_str(), "agent-1");
    }
}
