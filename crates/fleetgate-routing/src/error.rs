use fleetgate_registry::NodeId;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),
}

pub type Result<T> = std::result::Result<T, Error>;
