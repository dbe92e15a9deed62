//! Per-node outstanding-delivery set used for at-least-once retry across an
//! unclean restart. This is a set keyed by message id, not a queue: ordering
//! within the pending set is not preserved, and retry order is left to the
//! replay caller.

use std::collections::HashMap;

use fleetgate_protocol::LaneMessage;
use fleetgate_registry::NodeId;

/// One message handed to a node but not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDelivery {
    pub node_id: NodeId,
    pub message: LaneMessage,
}

#[derive(Debug, Default)]
pub struct DeliveryTracker {
    by_node: HashMap<NodeId, HashMap<String, LaneMessage>>,
}

impl DeliveryTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `message` into `node_id`'s pending set, keyed by
    /// `message.id`. A duplicate id overwrites the prior entry.
    pub fn track(&mut self, node_id: NodeId, message: LaneMessage) {
        self.by_node.entry(node_id).or_default().insert(message.id.clone(), message);
    }

    /// Idempotent; no-op if absent.
    pub fn ack(&mut self, node_id: &NodeId, message_id: &str) {
        if let Some(pending) = self.by_node.get_mut(node_id) {
            pending.remove(message_id);
            if pending.is_empty() {
                self.by_node.remove(node_id);
            }
        }
    }

    /// Removes and returns the full pending set for `node_id`. Used when
    /// the node deregisters.
    pub fn drain_for_node(&mut self, node_id: &NodeId) -> Vec<LaneMessage> {
        self.by_node.remove(node_id).map(|m| m.into_values().collect()).unwrap_or_default()
    }

    #[must_use]
    pub fn pending_count(&self, node_id: &NodeId) -> usize {
        self.by_node.get(node_id).map_or(0, HashMap::len)
    }

    /// Timerless capture for checkpointing: `nodeId → pending messages`.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<NodeId, Vec<LaneMessage>> {
        self.by_node
            .iter()
            .map(|(node_id, pending)| (node_id.clone(), pending.values().cloned().collect()))
            .collect()
    }

    pub fn from_snapshot(&mut self, snapshot: HashMap<NodeId, Vec<LaneMessage>>) {
        self.by_node.clear();
        for (node_id, messages) in snapshot {
            let pending: HashMap<String, LaneMessage> =
                messages.into_iter().map(|m| (m.id.clone(), m)).collect();
            if !pending.is_empty() {
                self.by_node.insert(node_id, pending);
            }
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use fleetgate_protocol::Lane;
    use fleetgate_registry::NodeId;

    use super::*;

    fn id(s: &str) -> NodeId {
        NodeId::new(s).unwrap()
    }

    fn msg(id: &str) -> LaneMessage {
        LaneMessage {
            id: id.to_string(),
            lane: Lane::Steer,
            channel_id: "ch-1".to_string(),
            payload: serde_json::Value::Null,
            timestamp: 0,
            routing_context: None,
        }
    }

    #[test]
    fn track_then_ack_removes() {
        let mut tracker = DeliveryTracker::new();
        tracker.track(id("agent-1"), msg("m1"));
        assert_eq!(tracker.pending_count(&id("agent-1")), 1);
        tracker.ack(&id("agent-1"), "m1");
        assert_eq!(tracker.pending_count(&id("agent-1")), 0);
    }

    #[test]
    fn ack_is_idempotent() {
        let mut tracker = DeliveryTracker::new();
        tracker.ack(&id("agent-1"), "missing");
    }

    #[test]
    fn duplicate_id_overwrites() {
        let mut tracker = DeliveryTracker::new();
        tracker.track(id("agent-1"), msg("m1"));
        tracker.track(id("agent-1"), msg("m1"));
        assert_eq!(tracker.pending_count(&id("agent-1")), 1);
    }

    #[test]
    fn drain_for_node_removes_everything() {
        let mut tracker = DeliveryTracker::new();
        tracker.track(id("agent-1"), msg("m1"));
        tracker.track(id("agent-1"), msg("m2"));
        let drained = tracker.drain_for_node(&id("agent-1"));
        assert_eq!(drained.len(), 2);
        assert_eq!(tracker.pending_count(&id("agent-1")), 0);
    }

    #[test]
    fn snapshot_round_trip() {
        let mut tracker = DeliveryTracker::new();
        tracker.track(id("agent-1"), msg("m1"));
        let snap = tracker.snapshot();

        let mut restored = DeliveryTracker::new();
        restored.from_snapshot(snap);
        assert_eq!(restored.pending_count(&id("agent-1")), 1);
    }
}
