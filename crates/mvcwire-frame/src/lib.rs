//! Message framing for the peer-to-peer wire protocol.
//!
//! Every message is framed with:
//! - A 4-byte network magic for stream synchronization
//! - A 12-byte NUL-padded command name
//! - A 4-byte little-endian payload length
//! - A 4-byte checksum (first bytes of the payload's double SHA-256)
//!
//! Payloads of 4 GiB or more use an extended header that appends a second
//! command and a 64-bit length. Headers are checked against a per-command
//! size policy before any payload byte is buffered.

pub mod codec;
pub mod config;
pub mod error;
pub mod hash;
pub mod header;
pub mod message;
pub mod message_type;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_codec;

#[cfg(feature = "async")]
pub use async_codec::NetMessageCodec;
pub use codec::{decode_message, encode_message, OutgoingMessage};
pub use config::{Magic, NetConfig, Network, PeerSendLimits};
pub use error::{FrameError, Result};
pub use hash::{checksum, double_sha256, Hash256, PayloadHasher};
pub use header::{
    header_size_for_payload, max_payload_length, Checksum, CommandName, HeaderKind,
    MessageHeader, BASIC_HEADER_SIZE, EXTENDED_HEADER_SIZE,
};
pub use message::{AssemblyState, NetMessage, ReceivedMessage};
pub use message_type::{all_message_types, command, registry, MessageType, SizePolicy};
pub use reader::MessageReader;
pub use writer::MessageWriter;
