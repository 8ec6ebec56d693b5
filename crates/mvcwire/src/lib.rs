//! P2P wire protocol framing and validation.
//!
//! # Crate Structure
//!
//! - [`frame`]: Basic/extended headers, size policy, incremental message assembly
//! - [`protocol`]: Payload codecs for inventory, protoconf and address messages

/// Re-export frame types.
pub mod frame {
    pub use mvcwire_frame::*;
}

/// Re-export protocol types.
pub mod protocol {
    pub use mvcwire_protocol::*;
}

pub use mvcwire_frame::{
    encode_message, FrameError, MessageHeader, MessageReader, MessageWriter, NetConfig,
    NetMessage, Network, ReceivedMessage,
};
pub use mvcwire_protocol::{Protoconf, ProtoconfNegotiator, ProtocolError};
