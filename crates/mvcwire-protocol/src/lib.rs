//! Payload codecs for the messages that shape a connection.
//!
//! Framing lives in `mvcwire-frame`; this crate decodes the payloads whose
//! contents feed back into framing limits (`protoconf`, inventory sizing) and
//! the address records exchanged during peer discovery.

pub mod address;
pub mod error;
pub mod inventory;
pub mod protoconf;
pub mod serialize;

pub use address::{
    decode_addresses, encode_addresses, AddressRecord, NetAddress, ServiceFlags,
    CADDR_TIME_VERSION, MAX_ADDR_TO_SEND,
};
pub use error::{ProtocolError, Result};
pub use inventory::{
    decode_inventory, encode_inventory, estimate_max_inv_elements, InventoryItem,
    InventoryKind, INVENTORY_ITEM_SIZE, MSG_TYPE_MASK,
};
pub use protoconf::{PeerLimits, Protoconf, ProtoconfNegotiator, DEFAULT_STREAM_POLICY};
