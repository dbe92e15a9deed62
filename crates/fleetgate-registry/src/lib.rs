//! Membership set and capability-filtered lookup for connected nodes.

mod node_id;

use std::{collections::HashMap, time::Instant};

pub use node_id::{EmptyNodeId, NodeId};

use fleetgate_protocol::{CapabilityRequirements, Capabilities};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("node already registered: {0}")]
    NodeAlreadyRegistered(NodeId),
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),
}

pub type Result<T> = std::result::Result<T, Error>;

/// One entry per registered node. Created on `node.register`, destroyed
/// on deregister or reap.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub node_id: NodeId,
    pub capabilities: Capabilities,
    pub is_alive: bool,
    pub registered_at: Instant,
    pub last_heartbeat_at: Option<Instant>,
}

impl RegistryEntry {
    #[must_use]
    pub fn new(node_id: NodeId, capabilities: Capabilities) -> Self {
        Self {
            node_id,
            capabilities,
            is_alive: true,
            registered_at: Instant::now(),
            last_heartbeat_at: None,
        }
    }
}

/// Membership set of connected nodes, keyed by [`NodeId`].
///
/// All mutations here are synchronous and cheap; the orchestrator holds
/// this behind a single `std::sync::Mutex` and never across an `.await`.
#[derive(Debug, Default)]
pub struct Registry {
    entries: HashMap<NodeId, RegistryEntry>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: RegistryEntry) -> Result<()> {
        if self.entries.contains_key(&entry.node_id) {
            return Err(Error::NodeAlreadyRegistered(entry.node_id));
        }
        self.entries.insert(entry.node_id.clone(), entry);
        Ok(())
    }

    /// Bulk-insert, used when restoring from a checkpoint. Unlike
    /// [`Registry::insert`] this overwrites rather than erroring, since
    /// restore always starts from an empty registry.
    pub fn insert_all(&mut self, entries: impl IntoIterator<Item = RegistryEntry>) {
        for entry in entries {
            self.entries.insert(entry.node_id.clone(), entry);
        }
    }

    /// Idempotent; no-op if absent.
    pub fn remove(&mut self, node_id: &NodeId) -> Option<RegistryEntry> {
        self.entries.remove(node_id)
    }

    #[must_use]
    pub fn get(&self, node_id: &NodeId) -> Option<&RegistryEntry> {
        self.entries.get(node_id)
    }

    #[must_use]
    pub fn has(&self, node_id: &NodeId) -> bool {
        self.entries.contains_key(node_id)
    }

    pub fn mark_alive(&mut self, node_id: &NodeId, alive: bool) {
        if let Some(entry) = self.entries.get_mut(node_id) {
            entry.is_alive = alive;
            if alive {
                entry.last_heartbeat_at = Some(Instant::now());
            }
        }
    }

    #[must_use]
    pub fn find_by_requirements(&self, requirements: &CapabilityRequirements) -> Vec<&RegistryEntry> {
        self.entries
            .values()
            .filter(|e| e.capabilities.satisfies(requirements))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn list(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.values()
    }
}
