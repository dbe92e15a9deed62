use std::collections::{HashMap, VecDeque};

use fleetgate_protocol::{Lane, LaneMessage};
use fleetgate_registry::NodeId;

#[derive(Debug, Default)]
struct NodeQueues {
    steer: VecDeque<LaneMessage>,
    collect: VecDeque<LaneMessage>,
    followup: VecDeque<LaneMessage>,
}

impl NodeQueues {
    fn queue_for(&mut self, lane: Lane) -> &mut VecDeque<LaneMessage> {
        match lane {
            Lane::Steer => &mut self.steer,
            Lane::Collect => &mut self.collect,
            Lane::Followup => &mut self.followup,
        }
    }

    fn is_empty(&self) -> bool {
        self.steer.is_empty() && self.collect.is_empty() && self.followup.is_empty()
    }

    fn drain_in_priority_order(&mut self) -> Vec<LaneMessage> {
        let mut out = Vec::with_capacity(self.steer.len() + self.collect.len() + self.followup.len());
        for lane in Lane::IN_PRIORITY_ORDER {
            out.extend(self.queue_for(lane).drain(..));
        }
        out
    }
}

/// Per-node lane-priority dispatch queues: `O(1)` enqueue, drain in
/// `steer > collect > followup` order with FIFO inside each lane.
#[derive(Debug, Default)]
pub struct LaneQueues {
    by_node: HashMap<NodeId, NodeQueues>,
}

impl LaneQueues {
    pub fn enqueue(&mut self, node_id: NodeId, message: LaneMessage) {
        let lane = message.lane;
        self.by_node.entry(node_id).or_default().queue_for(lane).push_back(message);
    }

    /// Removes and returns everything enqueued for `node_id`, in priority
    /// order.
    pub fn drain_node(&mut self, node_id: &NodeId) -> Vec<LaneMessage> {
        self.by_node
            .remove(node_id)
            .map(|mut q| q.drain_in_priority_order())
            .unwrap_or_default()
    }

    pub fn remove_for_node(&mut self, node_id: &NodeId) {
        self.by_node.remove(node_id);
    }

    #[must_use]
    pub fn is_empty_for(&self, node_id: &NodeId) -> bool {
        self.by_node.get(node_id).is_none_or(NodeQueues::is_empty)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> NodeId {
        NodeId::new(s).unwrap()
    }

    fn msg(id: &str, lane: Lane) -> LaneMessage {
        LaneMessage {
            id: id.to_string(),
            lane,
            channel_id: "ch-1".to_string(),
            payload: serde_json::Value::Null,
            timestamp: 0,
            routing_context: None,
        }
    }

    #[test]
    fn drains_in_priority_order_regardless_of_enqueue_order() {
        let mut q = LaneQueues::default();
        let node = id("agent-1");
        q.enqueue(node.clone(), msg("m1", Lane::Followup));
        q.enqueue(node.clone(), msg("m2", Lane::Collect));
        q.enqueue(node.clone(), msg("m3", Lane::Steer));

        let drained = q.drain_node(&node);
        let ids: Vec<_> = drained.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m3", "m2", "m1"]);
    }

    #[test]
    fn fifo_within_a_lane() {
        let mut q = LaneQueues::default();
        let node = id("agent-1");
        q.enqueue(node.clone(), msg("a", Lane::Steer));
        q.enqueue(node.clone(), msg("b", Lane::Steer));
        q.enqueue(node.clone(), msg("c", Lane::Steer));

        let drained = q.drain_node(&node);
        let ids: Vec<_> = drained.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn drain_is_destructive() {
        let mut q = LaneQueues::default();
        let node = id("agent-1");
        q.enqueue(node.clone(), msg("a", Lane::Steer));
        assert_eq!(q.drain_node(&node).len(), 1);
        assert_eq!(q.drain_node(&node).len(), 0);
    }

    #[test]
    fn queues_are_independent_per_node() {
        let mut q = LaneQueues::default();
        q.enqueue(id("agent-1"), msg("a", Lane::Steer));
        q.enqueue(id("agent-2"), msg("b", Lane::Steer));
        assert_eq!(q.drain_node(&id("agent-1")).len(), 1);
        assert_eq!(q.drain_node(&id("agent-2")).len(), 1);
    }
}
