//! Inventory descriptors carried by `inv`, `getdata` and `notfound`.

use std::fmt;

use bytes::{Buf, BufMut};
use mvcwire_frame::{command, Hash256};

use crate::error::{ProtocolError, Result};
use crate::serialize::{ensure, read_compact_size, write_compact_size};

/// Encoded size of one inventory item.
pub const INVENTORY_ITEM_SIZE: usize = 4 + 32;

/// Bits of the raw kind that identify the object type; the upper bits are flags.
pub const MSG_TYPE_MASK: u32 = 0xffff_ffff >> 3;

/// Bytes reserved for the element count when sizing an inventory message.
const MAX_COUNT_PREFIX_SIZE: u64 = 8;

/// Known inventory object types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum InventoryKind {
    Undefined = 0,
    Tx = 1,
    Block = 2,
    /// Only valid in `getdata`.
    FilteredBlock = 3,
    /// Only valid in `getdata`.
    CompactBlock = 4,
}

impl InventoryKind {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw & MSG_TYPE_MASK {
            0 => Some(Self::Undefined),
            1 => Some(Self::Tx),
            2 => Some(Self::Block),
            3 => Some(Self::FilteredBlock),
            4 => Some(Self::CompactBlock),
            _ => None,
        }
    }
}

/// One inventory entry.
///
/// The raw kind is kept as received so that unknown kinds and flag bits
/// survive a decode/encode cycle. Items order by raw kind, then by hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InventoryItem {
    pub kind: u32,
    pub hash: Hash256,
}

impl InventoryItem {
    pub fn new(kind: InventoryKind, hash: Hash256) -> Self {
        Self {
            kind: kind as u32,
            hash,
        }
    }

    /// Object type with the flag bits masked off.
    pub fn masked_kind(&self) -> u32 {
        self.kind & MSG_TYPE_MASK
    }

    pub fn known_kind(&self) -> Option<InventoryKind> {
        InventoryKind::from_raw(self.kind)
    }

    pub fn is_tx(&self) -> bool {
        self.masked_kind() == InventoryKind::Tx as u32
    }

    pub fn is_some_block(&self) -> bool {
        matches!(
            self.known_kind(),
            Some(InventoryKind::Block | InventoryKind::FilteredBlock | InventoryKind::CompactBlock)
        )
    }

    /// Command of the message that answers a `getdata` for this item.
    pub fn command(&self) -> Result<&'static str> {
        match self.known_kind() {
            Some(InventoryKind::Tx) => Ok(command::TX),
            Some(InventoryKind::Block) => Ok(command::BLOCK),
            Some(InventoryKind::FilteredBlock) => Ok(command::MERKLEBLOCK),
            Some(InventoryKind::CompactBlock) => Ok(command::CMPCTBLOCK),
            _ => Err(mvcwire_frame::FrameError::UnknownCommand(format!(
                "inventory kind {}",
                self.kind
            ))
            .into()),
        }
    }

    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u32_le(self.kind);
        dst.put_slice(self.hash.as_bytes());
    }

    pub fn decode(src: &mut impl Buf) -> Result<Self> {
        ensure(src, INVENTORY_ITEM_SIZE)?;
        let kind = src.get_u32_le();
        let mut hash = [0u8; 32];
        src.copy_to_slice(&mut hash);
        Ok(Self {
            kind,
            hash: Hash256::from_bytes(hash),
        })
    }
}

impl fmt::Display for InventoryItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.command() {
            Ok(name) => write!(f, "{name} {}", self.hash),
            Err(_) => write!(f, "0x{:08x} {}", self.kind, self.hash),
        }
    }
}

/// Upper bound on how many items fit in a payload of `max_payload_length` bytes.
///
/// Pessimistic: the element count is assumed to take its widest encoding.
pub fn estimate_max_inv_elements(max_payload_length: u64) -> u64 {
    max_payload_length.saturating_sub(MAX_COUNT_PREFIX_SIZE) / INVENTORY_ITEM_SIZE as u64
}

pub fn encode_inventory(items: &[InventoryItem], dst: &mut impl BufMut) {
    write_compact_size(dst, items.len() as u64);
    for item in items {
        item.encode(dst);
    }
}

/// Decode a compact-size counted inventory list of at most `max_items` entries.
pub fn decode_inventory(src: &mut impl Buf, max_items: u64) -> Result<Vec<InventoryItem>> {
    let count = read_compact_size(src)?;
    if count > max_items {
        return Err(ProtocolError::TooManyInventoryItems {
            count,
            max: max_items,
        });
    }
    (0..count).map(|_| InventoryItem::decode(src)).collect()
}
