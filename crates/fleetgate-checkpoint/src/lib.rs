//! Point-in-time snapshots of the registry, session, router and delivery
//! stores, with cross-store invariant checking and restore.

pub mod error;
pub mod invariants;
pub mod store_file;
pub mod store_memory;

use std::collections::HashMap;

use async_trait::async_trait;
pub use error::{Error, Result};
use fleetgate_protocol::{Capabilities, LaneMessage};
use fleetgate_registry::{NodeId, RegistryEntry};
use fleetgate_routing::{ChannelBindingSnapshot, ConversationBindingSnapshot};
use fleetgate_sessions::SessionSnapshot;
pub use invariants::{InvariantReport, Violation, check_invariants};
use serde::{Deserialize, Serialize};
pub use store_file::FileCheckpointStore;
pub use store_memory::InMemoryCheckpointStore;

/// Schema version of the on-disk/in-memory `Checkpoint` record. Bump when
/// the shape changes incompatibly.
pub const CHECKPOINT_VERSION: u32 = 1;

/// A frozen, serializable snapshot of the three core state stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    pub checkpoint_id: String,
    pub created_at_ms: u64,
    pub sessions: Vec<SessionSnapshot>,
    pub conversation_bindings: Vec<ConversationBindingSnapshot>,
    pub channel_bindings: Vec<ChannelBindingSnapshot>,
    pub pending_deliveries: HashMap<NodeId, Vec<LaneMessage>>,
}

impl Checkpoint {
    #[must_use]
    pub fn registry_node_ids(&self) -> std::collections::HashSet<NodeId> {
        self.sessions.iter().map(|s| s.node_id.clone()).collect()
    }
}

/// Persistence backend for checkpoints. Storage format is opaque to the
/// orchestrator; the only contract is round-trip fidelity of the
/// `Checkpoint` record.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()>;
    async fn load(&self) -> Result<Option<Checkpoint>>;
}

/// `Capabilities` are not part of the checkpoint record — a node's
/// advertised capabilities are meaningless until it reconnects and
/// re-registers. On restore, every node id named by a restored session gets
/// a minimal placeholder registry entry (default capabilities, not alive)
/// so the other stores' cross-references resolve; the real entry replaces
/// it on the node's next `node.register`.
#[must_use]
pub fn synthesize_registry_entries(sessions: &[SessionSnapshot]) -> Vec<RegistryEntry> {
    sessions
        .iter()
        .map(|session| {
            let mut entry = RegistryEntry::new(session.node_id.clone(), Capabilities::default());
            entry.is_alive = false;
            entry
        })
        .collect()
}
