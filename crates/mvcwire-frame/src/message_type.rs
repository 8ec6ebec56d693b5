//! Registered message types and their size policies.
//!
//! The registry is built once on first use and shared by reference between
//! all connections.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::config::{NetConfig, PeerSendLimits, LEGACY_MAX_PROTOCOL_PAYLOAD_LENGTH};
use crate::error::{FrameError, Result};

/// Command names for every registered message type.
pub mod command {
    pub const VERSION: &str = "version";
    pub const VERACK: &str = "verack";
    pub const ADDR: &str = "addr";
    pub const INV: &str = "inv";
    pub const GETDATA: &str = "getdata";
    pub const MERKLEBLOCK: &str = "merkleblock";
    pub const GETBLOCKS: &str = "getblocks";
    pub const GETHEADERS: &str = "getheaders";
    pub const TX: &str = "tx";
    pub const HEADERS: &str = "headers";
    pub const BLOCK: &str = "block";
    pub const GETADDR: &str = "getaddr";
    pub const MEMPOOL: &str = "mempool";
    pub const PING: &str = "ping";
    pub const PONG: &str = "pong";
    pub const NOTFOUND: &str = "notfound";
    pub const FILTERLOAD: &str = "filterload";
    pub const FILTERADD: &str = "filteradd";
    pub const FILTERCLEAR: &str = "filterclear";
    pub const REJECT: &str = "reject";
    pub const SENDHEADERS: &str = "sendheaders";
    pub const FEEFILTER: &str = "feefilter";
    pub const SENDCMPCT: &str = "sendcmpct";
    pub const CMPCTBLOCK: &str = "cmpctblock";
    pub const GETBLOCKTXN: &str = "getblocktxn";
    pub const BLOCKTXN: &str = "blocktxn";
    pub const PROTOCONF: &str = "protoconf";
    pub const CREATESTREAM: &str = "createstream";
    pub const STREAMACK: &str = "streamack";
    pub const DSDETECTED: &str = "dsdetected";
    pub const EXTMSG: &str = "extmsg";
}

/// How the payload ceiling of a message type is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizePolicy {
    /// Bounded by the negotiated receive limit.
    Negotiated,
    /// Carries block content; bounded by the absolute block ceiling only.
    BlockLike,
    /// Fixed ceiling independent of configuration.
    Fixed(u64),
}

impl SizePolicy {
    /// Ceiling for an incoming payload under `config`.
    pub fn max_recv_length(self, config: &NetConfig) -> u64 {
        match self {
            SizePolicy::Negotiated => config.max_recv_payload_length,
            SizePolicy::BlockLike => config.max_block_message_length,
            SizePolicy::Fixed(max) => max,
        }
    }

    /// Ceiling for an outgoing payload to a peer with `peer` limits.
    pub fn max_send_length(self, config: &NetConfig, peer: &PeerSendLimits) -> u64 {
        match self {
            SizePolicy::Negotiated => peer
                .peer_max_recv_payload_length
                .min(config.max_send_payload_length()),
            SizePolicy::BlockLike => config.max_block_message_length,
            SizePolicy::Fixed(max) => max,
        }
    }
}

/// Metadata for one registered command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageType {
    name: &'static str,
    policy: SizePolicy,
}

impl MessageType {
    const fn new(name: &'static str, policy: SizePolicy) -> Self {
        Self { name, policy }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn policy(&self) -> SizePolicy {
        self.policy
    }

    /// Whether this message transmits block content.
    pub fn is_block_like(&self) -> bool {
        self.policy == SizePolicy::BlockLike
    }

    pub fn max_recv_length(&self, config: &NetConfig) -> u64 {
        self.policy.max_recv_length(config)
    }

    pub fn max_send_length(&self, config: &NetConfig, peer: &PeerSendLimits) -> u64 {
        self.policy.max_send_length(config, peer)
    }
}

const MESSAGE_TYPES: &[MessageType] = &[
    MessageType::new(command::VERSION, SizePolicy::Negotiated),
    MessageType::new(command::VERACK, SizePolicy::Negotiated),
    MessageType::new(command::ADDR, SizePolicy::Negotiated),
    MessageType::new(command::INV, SizePolicy::Negotiated),
    MessageType::new(command::GETDATA, SizePolicy::Negotiated),
    MessageType::new(command::MERKLEBLOCK, SizePolicy::BlockLike),
    MessageType::new(command::GETBLOCKS, SizePolicy::Negotiated),
    MessageType::new(command::GETHEADERS, SizePolicy::Negotiated),
    MessageType::new(command::TX, SizePolicy::Negotiated),
    MessageType::new(command::HEADERS, SizePolicy::Negotiated),
    MessageType::new(command::BLOCK, SizePolicy::BlockLike),
    MessageType::new(command::GETADDR, SizePolicy::Negotiated),
    MessageType::new(command::MEMPOOL, SizePolicy::Negotiated),
    MessageType::new(command::PING, SizePolicy::Negotiated),
    MessageType::new(command::PONG, SizePolicy::Negotiated),
    MessageType::new(command::NOTFOUND, SizePolicy::Negotiated),
    MessageType::new(command::FILTERLOAD, SizePolicy::Negotiated),
    MessageType::new(command::FILTERADD, SizePolicy::Negotiated),
    MessageType::new(command::FILTERCLEAR, SizePolicy::Negotiated),
    MessageType::new(command::REJECT, SizePolicy::Negotiated),
    MessageType::new(command::SENDHEADERS, SizePolicy::Negotiated),
    MessageType::new(command::FEEFILTER, SizePolicy::Negotiated),
    MessageType::new(command::SENDCMPCT, SizePolicy::Negotiated),
    MessageType::new(command::CMPCTBLOCK, SizePolicy::BlockLike),
    MessageType::new(command::GETBLOCKTXN, SizePolicy::Negotiated),
    MessageType::new(command::BLOCKTXN, SizePolicy::BlockLike),
    // Sent before the peer knows our limits, so it must fit the legacy one.
    MessageType::new(
        command::PROTOCONF,
        SizePolicy::Fixed(LEGACY_MAX_PROTOCOL_PAYLOAD_LENGTH),
    ),
    MessageType::new(command::CREATESTREAM, SizePolicy::Negotiated),
    MessageType::new(command::STREAMACK, SizePolicy::Negotiated),
    MessageType::new(command::DSDETECTED, SizePolicy::Negotiated),
    MessageType::new(command::EXTMSG, SizePolicy::Negotiated),
];

static REGISTRY: LazyLock<MessageTypeRegistry> = LazyLock::new(MessageTypeRegistry::build);

/// The process-wide registry.
pub fn registry() -> &'static MessageTypeRegistry {
    &REGISTRY
}

/// Command-keyed table of message types.
#[derive(Debug)]
pub struct MessageTypeRegistry {
    by_name: HashMap<&'static str, &'static MessageType>,
}

impl MessageTypeRegistry {
    fn build() -> Self {
        let by_name = MESSAGE_TYPES
            .iter()
            .map(|message_type| (message_type.name, message_type))
            .collect();
        Self { by_name }
    }

    /// Look up a command.
    pub fn lookup(&self, command: &str) -> Result<&'static MessageType> {
        self.by_name
            .get(command)
            .copied()
            .ok_or_else(|| FrameError::UnknownCommand(command.to_string()))
    }

    pub fn contains(&self, command: &str) -> bool {
        self.by_name.contains_key(command)
    }

    /// Whether `command` carries block content. Unknown commands are not.
    pub fn is_block_like(&self, command: &str) -> bool {
        self.lookup(command)
            .map(MessageType::is_block_like)
            .unwrap_or(false)
    }

    /// Ceiling for an incoming payload of `command`.
    ///
    /// Unknown commands still have to be framed before dispatch can drop
    /// them, so they fall under the negotiated receive limit.
    pub fn max_recv_length(&self, command: &str, config: &NetConfig) -> u64 {
        self.policy_for(command).max_recv_length(config)
    }

    /// Ceiling for an outgoing payload of `command`.
    pub fn max_send_length(&self, command: &str, config: &NetConfig, peer: &PeerSendLimits) -> u64 {
        self.policy_for(command).max_send_length(config, peer)
    }

    /// All registered types in protocol order.
    pub fn iter(&self) -> impl Iterator<Item = &'static MessageType> {
        MESSAGE_TYPES.iter()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    fn policy_for(&self, command: &str) -> SizePolicy {
        self.lookup(command)
            .map(MessageType::policy)
            .unwrap_or(SizePolicy::Negotiated)
    }
}

/// Names of every registered message type.
pub fn all_message_types() -> impl Iterator<Item = &'static str> {
    MESSAGE_TYPES.iter().map(MessageType::name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_MAX_PROTOCOL_RECV_PAYLOAD_LENGTH;

    #[test]
    fn every_type_is_registered_once() {
        let registry = registry();
        assert_eq!(registry.len(), MESSAGE_TYPES.len());
        for name in all_message_types() {
            assert_eq!(registry.lookup(name).unwrap().name(), name);
            assert!(name.len() <= crate::header::COMMAND_SIZE);
        }
    }

    #[test]
    fn unknown_command_is_distinct_outcome() {
        let err = registry().lookup("bogus").unwrap_err();
        assert!(matches!(err, FrameError::UnknownCommand(ref cmd) if cmd == "bogus"));
        assert!(!err.should_ban());
        assert!(!registry().contains("bogus"));
    }

    #[test]
    fn block_like_classification() {
        let registry = registry();
        for name in [
            command::BLOCK,
            command::CMPCTBLOCK,
            command::BLOCKTXN,
            command::MERKLEBLOCK,
        ] {
            assert!(registry.is_block_like(name), "{name} should be block-like");
        }
        for name in [command::TX, command::INV, command::PROTOCONF, "bogus"] {
            assert!(!registry.is_block_like(name), "{name} should not be block-like");
        }
    }

    #[test]
    fn recv_ceilings_follow_policy() {
        let config = NetConfig::default();
        let registry = registry();

        assert_eq!(
            registry.max_recv_length(command::INV, &config),
            DEFAULT_MAX_PROTOCOL_RECV_PAYLOAD_LENGTH
        );
        assert_eq!(
            registry.max_recv_length(command::BLOCK, &config),
            config.max_block_message_length
        );
        assert_eq!(
            registry.max_recv_length(command::PROTOCONF, &config),
            LEGACY_MAX_PROTOCOL_PAYLOAD_LENGTH
        );
        assert_eq!(
            registry.max_recv_length("bogus", &config),
            DEFAULT_MAX_PROTOCOL_RECV_PAYLOAD_LENGTH
        );
    }

    #[test]
    fn raised_recv_limit_does_not_touch_block_ceiling() {
        let config = NetConfig {
            max_recv_payload_length: 64 * 1024 * 1024,
            ..NetConfig::default()
        };
        assert_eq!(
            registry().max_recv_length(command::TX, &config),
            64 * 1024 * 1024
        );
        assert_eq!(
            registry().max_recv_length(command::BLOCK, &config),
            config.max_block_message_length
        );
    }

    #[test]
    fn send_ceiling_is_min_of_peer_and_factor() {
        let config = NetConfig::default();
        let legacy_peer = PeerSendLimits::default();
        assert_eq!(
            registry().max_send_length(command::INV, &config, &legacy_peer),
            LEGACY_MAX_PROTOCOL_PAYLOAD_LENGTH
        );

        let generous_peer = PeerSendLimits {
            peer_max_recv_payload_length: u64::from(u32::MAX),
            extended_messages: true,
        };
        assert_eq!(
            registry().max_send_length(command::INV, &config, &generous_peer),
            config.max_send_payload_length()
        );
        assert_eq!(
            registry().max_send_length(command::BLOCK, &config, &legacy_peer),
            config.max_block_message_length
        );
    }
}
