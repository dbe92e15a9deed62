//! Deterministic conversation-key derivation.
//!
//! The wire-level contract only says `conversationKey = fingerprint(botId,
//! routingContext)`; it does not fix canonicalization. This implementation
//! picks one and holds to it:
//!
//! - `peerId` is taken verbatim — exact, case-sensitive match. Two peer ids
//!   that differ only in case are two different conversations.
//! - `messageType` is lowercased and trimmed of leading/trailing whitespace
//!   before hashing, so `"DM"`, `" dm "` and `"dm"` collapse to one
//!   conversation.
//!
//! Both fields are joined with a byte that cannot appear in either (`\x1f`,
//! ASCII unit separator) before hashing, so `("a", "b")` and `("a\x1fb", "")`
//! cannot collide.

use sha2::{Digest, Sha256};

use fleetgate_protocol::RoutingContext;

/// A conversation identity derived from a bot id and routing context. Opaque
/// to callers beyond equality and use as a map key.
pub type ConversationKey = String;

#[must_use]
pub fn fingerprint(bot_id: &str, ctx: &RoutingContext) -> ConversationKey {
    let normalized_message_type = ctx.message_type.trim().to_lowercase();
    let mut hasher = Sha256::new();
    hasher.update(bot_id.as_bytes());
    hasher.update([0x1f]);
    hasher.update(ctx.peer_id.as_bytes());
    hasher.update([0x1f]);
    hasher.update(normalized_message_type.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(peer_id: &str, message_type: &str) -> RoutingContext {
        RoutingContext {
            peer_id: peer_id.to_string(),
            message_type: message_type.to_string(),
        }
    }

    #[test]
    fn deterministic_across_calls() {
        let a = fingerprint("bot-1", &ctx("peer-1", "dm"));
        let b = fingerprint("bot-1", &ctx("peer-1", "dm"));
        assert_eq!(a, b);
    }

    #[test]
    fn message_type_case_and_whitespace_insensitive() {
        let a = fingerprint("bot-1", &ctx("peer-1", "DM"));
        let b = fingerprint("bot-1", &ctx("peer-1", " dm "));
        assert_eq!(a, b);
    }

    #[test]
    fn peer_id_is_case_sensitive() {
        let a = fingerprint("bot-1", &ctx("Peer-1", "dm"));
        let b = fingerprint("bot-1", &ctx("peer-1", "dm"));
        assert_ne!(a, b);
    }

    #[test]
    fn distinct_bot_ids_do_not_collide() {
        let a = fingerprint("bot-1", &ctx("peer-1", "dm"));
        let b = fingerprint("bot-2", &ctx("peer-1", "dm"));
        assert_ne!(a, b);
    }

    #[test]
    fn field_boundary_does_not_collide() {
        let a = fingerprint("a", &ctx("b", ""));
        let b = fingerprint("a\u{1f}b", &ctx("", ""));
        assert_ne!(a, b);
    }
}

#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use super::*;

    proptest! {
        #[test]
        fn deterministic_for_any_input(bot_id in ".*", peer_id in ".*", message_type in ".*") {
            let ctx = RoutingContext { peer_id, message_type };
            let a = fingerprint(&bot_id, &ctx);
            let b = fingerprint(&bot_id, &ctx);
            prop_assert_eq!(a, b);
        }

        #[test]
        fn always_produces_a_64_char_hex_digest(bot_id in ".*", peer_id in ".*", message_type in ".*") {
            let ctx = RoutingContext { peer_id, message_type };
            let key = fingerprint(&bot_id, &ctx);
            prop_assert_eq!(key.len(), 64);
            prop_assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }
}
