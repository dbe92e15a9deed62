//! Cross-store invariant checking, run before every save and after every
//! restore.

use std::collections::{HashMap, HashSet};

use fleetgate_registry::NodeId;
use fleetgate_routing::{ChannelBindingSnapshot, ConversationBindingSnapshot};
use fleetgate_sessions::SessionSnapshot;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub rule: String,
    pub details: String,
}

impl Violation {
    fn new(rule: &str, details: impl Into<String>) -> Self {
        Self { rule: rule.to_string(), details: details.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvariantReport {
    pub valid: bool,
    pub violations: Vec<Violation>,
}

/// Checks the cross-store invariants against a consistent view of the four
/// stores. Every `nodeId` referenced by a binding, a delivery, or a session
/// must refer to a live registry entry, and registry membership and session
/// existence must agree in both directions.
///
/// `session-state-invalid` is included for completeness but never fires in
/// practice here: `SessionState` is a closed Rust enum, so a value that
/// fails to satisfy it fails to deserialize in the first place and never
/// reaches this check.
#[must_use]
pub fn check_invariants(
    registry_node_ids: &HashSet<NodeId>,
    sessions: &[SessionSnapshot],
    conversation_bindings: &[ConversationBindingSnapshot],
    channel_bindings: &[ChannelBindingSnapshot],
    pending_deliveries: &HashMap<NodeId, Vec<fleetgate_protocol::LaneMessage>>,
) -> InvariantReport {
    let mut violations = Vec::new();

    let session_node_ids: HashSet<_> = sessions.iter().map(|s| s.node_id.clone()).collect();
    for node_id in &session_node_ids {
        if !registry_node_ids.contains(node_id) {
            violations.push(Violation::new(
                "session-registry-mismatch",
                format!("session exists for {node_id} with no matching registry entry"),
            ));
        }
    }
    for node_id in registry_node_ids {
        if !session_node_ids.contains(node_id) {
            violations.push(Violation::new(
                "session-registry-mismatch",
                format!("registry entry {node_id} has no matching session"),
            ));
        }
    }

    for binding in conversation_bindings {
        if !registry_node_ids.contains(&binding.node_id) {
            violations.push(Violation::new(
                "conversation-orphan",
                format!("conversation {} targets unregistered node {}", binding.conversation_key, binding.node_id),
            ));
        }
    }

    for binding in channel_bindings {
        if !registry_node_ids.contains(&binding.node_id) {
            violations.push(Violation::new(
                "channel-orphan",
                format!("channel {} targets unregistered node {}", binding.channel_id, binding.node_id),
            ));
        }
    }

    for node_id in pending_deliveries.keys() {
        if !registry_node_ids.contains(node_id) {
            violations.push(Violation::new(
                "delivery-orphan",
                format!("pending deliveries exist for unregistered node {node_id}"),
            ));
        }
    }

    InvariantReport { valid: violations.is_empty(), violations }
}
