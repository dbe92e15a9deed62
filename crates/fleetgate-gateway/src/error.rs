//! Orchestrator-level error taxonomy. Per-crate collaborators keep their
//! own typed errors (`fleetgate_registry::Error`, `fleetgate_routing::Error`,
//! ...); this enum is the seam the orchestrator's public methods surface to
//! callers, while the binary entry point wraps everything crossing the
//! process boundary in `anyhow`.

use fleetgate_registry::NodeId;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Registry(#[from] fleetgate_registry::Error),

    #[error(transparent)]
    Routing(#[from] fleetgate_routing::Error),

    #[error(transparent)]
    InvalidNodeId(#[from] fleetgate_registry::EmptyNodeId),

    #[error("node {0} presented an invalid registration token")]
    InvalidToken(NodeId),
}

pub type Result<T> = std::result::Result<T, Error>;
