use std::{collections::HashMap, time::Instant};

use fleetgate_registry::NodeId;

use crate::fingerprint::ConversationKey;

/// `channelId → nodeId`, consulted when a lane message carries no
/// `routingContext`.
#[derive(Debug, Default)]
pub struct ChannelBindings {
    table: HashMap<String, NodeId>,
}

impl ChannelBindings {
    pub fn bind(&mut self, channel_id: String, node_id: NodeId) {
        self.table.insert(channel_id, node_id);
    }

    #[must_use]
    pub fn get(&self, channel_id: &str) -> Option<&NodeId> {
        self.table.get(channel_id)
    }

    pub fn remove_for_node(&mut self, node_id: &NodeId) {
        self.table.retain(|_, target| target != node_id);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &NodeId)> {
        self.table.iter()
    }

    pub fn clear(&mut self) {
        self.table.clear();
    }

    pub fn insert_raw(&mut self, channel_id: String, node_id: NodeId) {
        self.table.insert(channel_id, node_id);
    }
}

#[derive(Debug, Clone)]
pub struct ConversationBindingRecord {
    pub node_id: NodeId,
    pub created_at: Instant,
    pub last_active_at: Instant,
}

/// `conversationKey → (nodeId, timestamps)`. At most one binding per key;
/// many keys may target the same node.
#[derive(Debug, Default)]
pub struct ConversationBindings {
    table: HashMap<ConversationKey, ConversationBindingRecord>,
}

impl ConversationBindings {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ConversationBindingRecord> {
        self.table.get(key)
    }

    pub fn touch(&mut self, key: &str) {
        if let Some(record) = self.table.get_mut(key) {
            record.last_active_at = Instant::now();
        }
    }

    pub fn create(&mut self, key: ConversationKey, node_id: NodeId) {
        let now = Instant::now();
        self.table.insert(key, ConversationBindingRecord {
            node_id,
            created_at: now,
            last_active_at: now,
        });
    }

    pub fn remove_for_node(&mut self, node_id: &NodeId) {
        self.table.retain(|_, record| &record.node_id != node_id);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ConversationKey, &ConversationBindingRecord)> {
        self.table.iter()
    }

    pub fn clear(&mut self) {
        self.table.clear();
    }

    pub fn insert_raw(&mut self, key: ConversationKey, record: ConversationBindingRecord) {
        self.table.insert(key, record);
    }
}
