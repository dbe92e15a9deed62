//! Wire protocol for the fleet gateway: frame envelope, lane priorities and
//! the handful of constants both sides of a node connection must agree on.
//!
//! One bidirectional byte stream carries framed, typed messages per node.
//! Every frame is a tagged JSON record with a mandatory `kind`
//! discriminator; [`Frame::decode`] is total — it never panics and never
//! terminates the process on malformed input, it just returns a
//! [`DecodeError`].

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

pub mod frame;
pub mod lane;

pub use frame::{Frame, DecodeError};
pub use lane::Lane;

/// Maximum size, in bytes, of a single encoded frame. Frames larger than
/// this are rejected by the orchestrator without being decoded.
pub const MAX_FRAME_BYTES: usize = 1_048_576; // 1 MiB

/// Capability record advertised by a node at registration time. Immutable
/// after registration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default, rename = "agentTypes")]
    pub agent_types: HashSet<String>,
    #[serde(default)]
    pub tools: HashSet<String>,
    #[serde(default)]
    pub channels: HashSet<String>,
    #[serde(default, rename = "maxConcurrency")]
    pub max_concurrency: u32,
}

impl Capabilities {
    /// True if `self` is a superset of every requirement in `requirements`.
    /// An absent requirement field is always satisfied.
    #[must_use]
    pub fn satisfies(&self, requirements: &CapabilityRequirements) -> bool {
        if let Some(ref agent_type) = requirements.agent_type
            && !self.agent_types.contains(agent_type)
        {
            return false;
        }
        if let Some(ref tools) = requirements.tools
            && !tools.iter().all(|t| self.tools.contains(t))
        {
            return false;
        }
        if let Some(ref channel) = requirements.channel
            && !self.channels.contains(channel)
        {
            return false;
        }
        true
    }
}

/// Query shape for [`fleetgate_registry::Registry::find_by_requirements`].
#[derive(Debug, Clone, Default)]
pub struct CapabilityRequirements {
    pub agent_type: Option<String>,
    pub tools: Option<Vec<String>>,
    pub channel: Option<String>,
}

/// Opaque routing context attached to a [`LaneMessage`] when the sender
/// expects scoped conversation binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingContext {
    #[serde(rename = "peerId")]
    pub peer_id: String,
    #[serde(rename = "messageType")]
    pub message_type: String,
}

/// A message enqueued on one of a node's three lane queues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneMessage {
    pub id: String,
    pub lane: Lane,
    #[serde(rename = "channelId")]
    pub channel_id: String,
    pub payload: serde_json::Value,
    pub timestamp: u64,
    #[serde(default, rename = "routingContext", skip_serializing_if = "Option::is_none")]
    pub routing_context: Option<RoutingContext>,
}
