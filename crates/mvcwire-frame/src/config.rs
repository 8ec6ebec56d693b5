//! Network identity and negotiated size limits.

use std::fmt;
use std::str::FromStr;

use crate::error::{FrameError, Result};

/// Network magic: the first four bytes of every message.
pub type Magic = [u8; 4];

/// One gigabyte, in the decimal sense used for protocol limits.
pub const ONE_GIGABYTE: u64 = 1000 * 1000 * 1000;

/// Default maximum incoming payload length (2 MiB).
///
/// Block-carrying messages are not subject to this limit.
pub const DEFAULT_MAX_PROTOCOL_RECV_PAYLOAD_LENGTH: u64 = 2 * 1024 * 1024;

/// Assumed receive limit of a peer that never sent a protoconf (1 MiB).
pub const LEGACY_MAX_PROTOCOL_PAYLOAD_LENGTH: u64 = 1024 * 1024;

/// Largest receive limit that may be configured locally.
pub const MAX_PROTOCOL_RECV_PAYLOAD_LENGTH: u64 = ONE_GIGABYTE;

/// Outgoing messages may be this many times larger than our own receive limit.
pub const MAX_PROTOCOL_SEND_PAYLOAD_FACTOR: u64 = 4;

/// Default absolute ceiling for block-like messages.
pub const DEFAULT_MAX_BLOCK_MESSAGE_LENGTH: u64 = 10 * ONE_GIGABYTE;

/// Number of full-size inventory messages queued at once.
pub const DEFAULT_RECV_INV_QUEUE_FACTOR: u32 = 3;
pub const MIN_RECV_INV_QUEUE_FACTOR: u32 = 1;
pub const MAX_RECV_INV_QUEUE_FACTOR: u32 = 10;

/// Maximum number of named stream policies a peer may advertise.
pub const MAX_NUM_STREAM_POLICIES: usize = 10;

/// Maximum length of a single stream policy name.
pub const MAX_STREAM_POLICY_NAME_LENGTH: usize = 64;

/// Chains this crate knows the magic bytes for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    Main,
    Test,
    Regtest,
}

impl Network {
    pub const ALL: [Network; 3] = [Network::Main, Network::Test, Network::Regtest];

    /// Magic bytes as they appear on the wire.
    pub const fn magic(self) -> Magic {
        match self {
            Network::Main => [0xe3, 0xe1, 0xf3, 0xe8],
            Network::Test => [0xf4, 0xe5, 0xf3, 0xf4],
            Network::Regtest => [0xda, 0xb5, 0xbf, 0xfa],
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Network::Main => "main",
            Network::Test => "test",
            Network::Regtest => "regtest",
        }
    }

    /// Resolve the network a message belongs to from its magic.
    pub fn from_magic(magic: &Magic) -> Option<Self> {
        Self::ALL.into_iter().find(|network| &network.magic() == magic)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Network {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "main" | "mainnet" => Ok(Network::Main),
            "test" | "testnet" => Ok(Network::Test),
            "regtest" => Ok(Network::Regtest),
            other => Err(FrameError::InvalidConfig(format!("unknown network '{other}'"))),
        }
    }
}

/// Node-wide framing configuration.
///
/// Shared read-only between connections, typically behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetConfig {
    /// Magic expected on every incoming header and written on every outgoing one.
    pub magic: Magic,
    /// Largest non-block payload we accept. Advertised to peers in our protoconf.
    pub max_recv_payload_length: u64,
    /// Absolute ceiling for block-like messages.
    pub max_block_message_length: u64,
    /// Maximum number of stream policies accepted in a protoconf.
    pub max_stream_policy_count: usize,
    /// Maximum length of one stream policy name.
    pub max_stream_policy_name_length: usize,
    /// Number of full-size inventory messages queued per peer.
    pub recv_inv_queue_factor: u32,
}

impl NetConfig {
    /// Default limits for the given network.
    pub fn for_network(network: Network) -> Self {
        Self {
            magic: network.magic(),
            ..Self::default()
        }
    }

    /// Check that every limit is inside its permitted range.
    pub fn validate(&self) -> Result<()> {
        if self.max_recv_payload_length < LEGACY_MAX_PROTOCOL_PAYLOAD_LENGTH
            || self.max_recv_payload_length > MAX_PROTOCOL_RECV_PAYLOAD_LENGTH
        {
            return Err(FrameError::InvalidConfig(format!(
                "max receive payload length {} outside [{}, {}]",
                self.max_recv_payload_length,
                LEGACY_MAX_PROTOCOL_PAYLOAD_LENGTH,
                MAX_PROTOCOL_RECV_PAYLOAD_LENGTH
            )));
        }
        if self.max_block_message_length < self.max_recv_payload_length {
            return Err(FrameError::InvalidConfig(format!(
                "block message ceiling {} below receive limit {}",
                self.max_block_message_length, self.max_recv_payload_length
            )));
        }
        if self.max_stream_policy_count == 0 || self.max_stream_policy_name_length == 0 {
            return Err(FrameError::InvalidConfig(
                "stream policy limits must be non-zero".to_string(),
            ));
        }
        if !(MIN_RECV_INV_QUEUE_FACTOR..=MAX_RECV_INV_QUEUE_FACTOR)
            .contains(&self.recv_inv_queue_factor)
        {
            return Err(FrameError::InvalidConfig(format!(
                "inventory queue factor {} outside [{}, {}]",
                self.recv_inv_queue_factor, MIN_RECV_INV_QUEUE_FACTOR, MAX_RECV_INV_QUEUE_FACTOR
            )));
        }
        Ok(())
    }

    /// Upper bound on any non-block payload we send, regardless of what the peer advertises.
    pub fn max_send_payload_length(&self) -> u64 {
        self.max_recv_payload_length
            .saturating_mul(MAX_PROTOCOL_SEND_PAYLOAD_FACTOR)
    }

    /// Bound on the encoded stream policy list of a protoconf.
    pub fn max_stream_policies_length(&self) -> usize {
        self.max_stream_policy_name_length
            .saturating_add(1)
            .saturating_mul(self.max_stream_policy_count)
    }
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            magic: Network::Main.magic(),
            max_recv_payload_length: DEFAULT_MAX_PROTOCOL_RECV_PAYLOAD_LENGTH,
            max_block_message_length: DEFAULT_MAX_BLOCK_MESSAGE_LENGTH,
            max_stream_policy_count: MAX_NUM_STREAM_POLICIES,
            max_stream_policy_name_length: MAX_STREAM_POLICY_NAME_LENGTH,
            recv_inv_queue_factor: DEFAULT_RECV_INV_QUEUE_FACTOR,
        }
    }
}

/// What we know about a peer's ability to receive.
///
/// Starts at the legacy limits and is raised once the peer's protoconf
/// arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerSendLimits {
    /// Largest non-block payload the peer told us it accepts.
    pub peer_max_recv_payload_length: u64,
    /// Whether the peer understands extended headers.
    pub extended_messages: bool,
}

impl Default for PeerSendLimits {
    fn default() -> Self {
        Self {
            peer_max_recv_payload_length: LEGACY_MAX_PROTOCOL_PAYLOAD_LENGTH,
            extended_messages: false,
        }
    }
}
