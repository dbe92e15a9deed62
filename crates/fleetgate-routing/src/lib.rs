//! Conversation/channel binding tables plus per-node lane-priority dispatch
//! queues.

pub mod bindings;
pub mod error;
pub mod fingerprint;
pub mod queue;

use fleetgate_protocol::LaneMessage;
use fleetgate_registry::{NodeId, Registry};
use serde::{Deserialize, Serialize};

pub use bindings::ConversationBindingRecord;
pub use error::{Error, Result};
pub use fingerprint::ConversationKey;

use bindings::{ChannelBindings, ConversationBindings};
use queue::LaneQueues;

/// Timerless capture of one channel binding, for checkpointing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelBindingSnapshot {
    pub channel_id: String,
    pub node_id: NodeId,
}

/// Timerless capture of one conversation binding, for checkpointing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationBindingSnapshot {
    pub conversation_key: ConversationKey,
    pub node_id: NodeId,
}

/// Binding tables and dispatch queues for every connected node.
#[derive(Debug, Default)]
pub struct Router {
    channel_bindings: ChannelBindings,
    conversation_bindings: ConversationBindings,
    queues: LaneQueues,
}

impl Router {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails with `NodeNotFound` if `node_id` is not currently registered.
    pub fn bind_channel(&mut self, channel_id: String, node_id: NodeId, registry: &Registry) -> Result<()> {
        if !registry.has(&node_id) {
            return Err(Error::NodeNotFound(node_id));
        }
        self.channel_bindings.bind(channel_id, node_id);
        Ok(())
    }

    #[must_use]
    pub fn get_binding(&self, channel_id: &str) -> Option<NodeId> {
        self.channel_bindings.get(channel_id).cloned()
    }

    /// Resolves the node owning `message`'s conversation, creating a binding
    /// on first contact by falling back to the channel binding for
    /// `message.channel_id`. Returns `None` if neither a conversation
    /// binding nor a channel fallback exists.
    pub fn route_with_scope(&mut self, message: &LaneMessage, bot_id: &str) -> Option<NodeId> {
        let ctx = message.routing_context.as_ref()?;
        let key = fingerprint::fingerprint(bot_id, ctx);

        if let Some(record) = self.conversation_bindings.get(&key) {
            let node_id = record.node_id.clone();
            self.conversation_bindings.touch(&key);
            return Some(node_id);
        }

        let fallback = self.channel_bindings.get(&message.channel_id)?.clone();
        self.conversation_bindings.create(key, fallback.clone());
        Some(fallback)
    }

    /// Removes every channel and conversation binding targeting `node_id`.
    pub fn remove_for_node(&mut self, node_id: &NodeId) {
        self.channel_bindings.remove_for_node(node_id);
        self.conversation_bindings.remove_for_node(node_id);
        self.queues.remove_for_node(node_id);
    }

    pub fn enqueue(&mut self, node_id: NodeId, message: LaneMessage) {
        self.queues.enqueue(node_id, message);
    }

    /// Removes and returns everything enqueued for `node_id`, in
    /// `steer > collect > followup` priority order, FIFO within lane.
    pub fn drain_node(&mut self, node_id: &NodeId) -> Vec<LaneMessage> {
        self.queues.drain_node(node_id)
    }

    /// Timerless capture for checkpointing.
    #[must_use]
    pub fn snapshot(&self) -> (Vec<ChannelBindingSnapshot>, Vec<ConversationBindingSnapshot>) {
        let channels = self
            .channel_bindings
            .iter()
            .map(|(channel_id, node_id)| ChannelBindingSnapshot {
                channel_id: channel_id.clone(),
                node_id: node_id.clone(),
            })
            .collect();
        let conversations = self
            .conversation_bindings
            .iter()
            .map(|(key, record)| ConversationBindingSnapshot {
                conversation_key: key.clone(),
                node_id: record.node_id.clone(),
            })
            .collect();
        (channels, conversations)
    }

    /// Restore bindings from a checkpoint. Dispatch queues are never
    /// persisted (in-flight messages are not durable across restart) and
    /// are left empty.
    pub fn from_snapshot(
        &mut self,
        channels: Vec<ChannelBindingSnapshot>,
        conversations: Vec<ConversationBindingSnapshot>,
    ) {
        self.channel_bindings.clear();
        for snap in channels {
            self.channel_bindings.insert_raw(snap.channel_id, snap.node_id);
        }
        self.conversation_bindings.clear();
        let now = std::time::Instant::now();
        for snap in conversations {
            self.conversation_bindings.insert_raw(snap.conversation_key, ConversationBindingRecord {
                node_id: snap.node_id,
                created_at: now,
                last_active_at: now,
            });
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use fleetgate_protocol::{Lane, RoutingContext};
    use fleetgate_registry::RegistryEntry;

    use super::*;

    fn id(s: &str) -> NodeId {
        NodeId::new(s).unwrap()
    }

    fn registry_with(node: &str) -> Registry {
        let mut reg = Registry::new();
        reg.insert(RegistryEntry::new(id(node), fleetgate_protocol::Capabilities::default()))
            .unwrap();
        reg
    }

    fn msg_with_ctx(channel_id: &str, peer_id: &str, message_type: &str) -> LaneMessage {
        LaneMessage {
            id: "msg-1".to_string(),
            lane: Lane::Steer,
            channel_id: channel_id.to_string(),
            payload: serde_json::Value::Null,
            timestamp: 0,
            routing_context: Some(RoutingContext {
                peer_id: peer_id.to_string(),
                message_type: message_type.to_string(),
            }),
        }
    }

    #[test]
    fn bind_channel_rejects_unknown_node() {
        let reg = Registry::new();
        let mut router = Router::new();
        let err = router.bind_channel("ch-1".to_string(), id("agent-1"), &reg).unwrap_err();
        assert!(matches!(err, Error::NodeNotFound(_)));
    }

    #[test]
    fn route_with_scope_falls_back_to_channel_binding_on_first_contact() {
        let reg = registry_with("agent-1");
        let mut router = Router::new();
        router.bind_channel("ch-1".to_string(), id("agent-1"), &reg).unwrap();

        let message = msg_with_ctx("ch-1", "peer-1", "dm");
        let node = router.route_with_scope(&message, "bot-1");
        assert_eq!(node, Some(id("agent-1")));
    }

    #[test]
    fn route_with_scope_reuses_existing_binding() {
        let reg = registry_with("agent-1");
        let mut router = Router::new();
        router.bind_channel("ch-1".to_string(), id("agent-1"), &reg).unwrap();

        let message = msg_with_ctx("ch-1", "peer-1", "dm");
        router.route_with_scope(&message, "bot-1");

        // Remove the channel fallback; the conversation binding created on
        // first contact still resolves the same node.
        router.channel_bindings.remove_for_node(&id("agent-1"));
        let second = router.route_with_scope(&message, "bot-1");
        assert_eq!(second, Some(id("agent-1")));
    }

    #[test]
    fn route_with_scope_returns_none_without_fallback() {
        let mut router = Router::new();
        let message = msg_with_ctx("ch-unbound", "peer-1", "dm");
        assert_eq!(router.route_with_scope(&message, "bot-1"), None);
    }

    #[test]
    fn route_with_scope_returns_none_without_routing_context() {
        let mut router = Router::new();
        let message = LaneMessage {
            id: "msg-1".to_string(),
            lane: Lane::Steer,
            channel_id: "ch-1".to_string(),
            payload: serde_json::Value::Null,
            timestamp: 0,
            routing_context: None,
        };
        assert_eq!(router.route_with_scope(&message, "bot-1"), None);
    }

    #[test]
    fn remove_for_node_clears_bindings_and_queues() {
        let reg = registry_with("agent-1");
        let mut router = Router::new();
        router.bind_channel("ch-1".to_string(), id("agent-1"), &reg).unwrap();
        router.enqueue(id("agent-1"), msg_with_ctx("ch-1", "peer-1", "dm"));

        router.remove_for_node(&id("agent-1"));

        assert_eq!(router.get_binding("ch-1"), None);
        assert!(router.drain_node(&id("agent-1")).is_empty());
    }

    #[test]
    fn snapshot_round_trips_bindings() {
        let reg = registry_with("agent-1");
        let mut router = Router::new();
        router.bind_channel("ch-1".to_string(), id("agent-1"), &reg).unwrap();
        router.route_with_scope(&msg_with_ctx("ch-1", "peer-1", "dm"), "bot-1");

        let (channels, conversations) = router.snapshot();
        assert_eq!(channels.len(), 1);
        assert_eq!(conversations.len(), 1);

        let mut restored = Router::new();
        restored.from_snapshot(channels, conversations);
        assert_eq!(restored.get_binding("ch-1"), Some(id("agent-1")));
    }
}
