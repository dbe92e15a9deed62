//! Frame envelope: the tagged records exchanged on a node's byte stream.

use serde::{Deserialize, Serialize};

use crate::{Capabilities, Lane, LaneMessage};

/// Total, never-panicking decode errors. Carries enough context for a
/// single `warn!` log line at the call site without leaking one bad
/// connection's garbage into the rest of the gateway.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("frame exceeds {0} bytes")]
    TooLarge(usize),
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("malformed frame: missing 'kind' field")]
    MissingKind,
    #[error("unknown frame kind: {0}")]
    UnknownKind(String),
}

/// The discriminated union of frame kinds exchanged between the gateway
/// and a node.
///
/// An unrecognized `kind` yields [`DecodeError::UnknownKind`] rather than a
/// panic or a generic serde error, so the orchestrator can log and drop a
/// single bad frame without tearing down the connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Frame {
    #[serde(rename = "node.register")]
    NodeRegister {
        #[serde(rename = "nodeId")]
        node_id: String,
        capabilities: Capabilities,
        token: String,
    },
    #[serde(rename = "node.register.ack")]
    NodeRegisterAck {
        #[serde(rename = "nodeId")]
        node_id: String,
    },
    #[serde(rename = "node.deregister")]
    NodeDeregister {
        #[serde(rename = "nodeId")]
        node_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    #[serde(rename = "heartbeat.ping")]
    HeartbeatPing { timestamp: u64 },
    #[serde(rename = "heartbeat.pong")]
    HeartbeatPong { timestamp: u64 },
    #[serde(rename = "lane.message")]
    LaneMessageFrame { lane: Lane, message: LaneMessage },
    #[serde(rename = "lane.message.ack")]
    LaneMessageAck {
        #[serde(rename = "messageId")]
        message_id: String,
    },
}

impl Frame {
    /// Decode a single text frame. Total: returns `Err` instead of
    /// panicking on any malformed or oversized input.
    pub fn decode(text: &str) -> Result<Frame, DecodeError> {
        if text.len() > crate::MAX_FRAME_BYTES {
            return Err(DecodeError::TooLarge(crate::MAX_FRAME_BYTES));
        }
        // Peek the `kind` field ourselves so an unrecognized kind produces a
        // dedicated error instead of a generic serde "unknown variant" message.
        let value: serde_json::Value = serde_json::from_str(text)?;
        let kind = value
            .get("kind")
            .and_then(|k| k.as_str())
            .ok_or(DecodeError::MissingKind)?;
        match serde_json::from_value::<Frame>(value.clone()) {
            Ok(frame) => Ok(frame),
            Err(e) => {
                const KNOWN_KINDS: &[&str] = &[
                    "node.register",
                    "node.register.ack",
                    "node.deregister",
                    "heartbeat.ping",
                    "heartbeat.pong",
                    "lane.message",
                    "lane.message.ack",
                ];
                if KNOWN_KINDS.contains(&kind) {
                    Err(DecodeError::Malformed(e))
                } else {
                    Err(DecodeError::UnknownKind(kind.to_string()))
                }
            },
        }
    }

    /// Encode to its wire representation. `Frame` has no non-serializable
    /// field, so this only returns an empty string in the unreachable case
    /// serialization fails.
    #[must_use]
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_total_on_garbage() {
        let err = Frame::decode("not valid json").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn decode_unknown_kind_is_non_fatal() {
        let err = Frame::decode(r#"{"kind":"future.kind","foo":1}"#).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownKind(k) if k == "future.kind"));
    }

    #[test]
    fn decode_missing_kind() {
        let err = Frame::decode(r#"{"foo":1}"#).unwrap_err();
        assert!(matches!(err, DecodeError::MissingKind));
    }

    #[test]
    fn register_round_trip() {
        let frame = Frame::NodeRegister {
            node_id: "agent-1".into(),
            capabilities: Capabilities {
                agent_types: ["high".to_string(), "low".to_string()].into(),
                tools: ["search".to_string()].into(),
                channels: ["chat".to_string()].into(),
                max_concurrency: 8,
            },
            token: "test-key".into(),
        };
        let text = frame.encode();
        let back = Frame::decode(&text).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn oversized_frame_rejected() {
        let huge = "x".repeat(crate::MAX_FRAME_BYTES + 1);
        let err = Frame::decode(&huge).unwrap_err();
        assert!(matches!(err, DecodeError::TooLarge(_)));
    }

    #[test]
    fn lane_message_round_trip() {
        let frame = Frame::LaneMessageFrame {
            lane: Lane::Steer,
            message: LaneMessage {
                id: "msg-1".into(),
                lane: Lane::Steer,
                channel_id: "ch-1".into(),
                payload: serde_json::json!({"text": "hi"}),
                timestamp: 1,
                routing_context: None,
            },
        };
        let text = frame.encode();
        let back = Frame::decode(&text).unwrap();
        assert_eq!(back, frame);
    }
}
