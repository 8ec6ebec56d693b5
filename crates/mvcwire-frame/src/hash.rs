//! Double SHA-256 helpers and the streaming payload hasher.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::header::{Checksum, CHECKSUM_SIZE};

/// Size of a 256-bit hash in bytes.
pub const HASH_SIZE: usize = 32;

/// A 256-bit hash in internal (little-endian) byte order.
///
/// Ordering compares bytes from index 0 upwards.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash256([u8; HASH_SIZE]);

impl Hash256 {
    pub const ZERO: Hash256 = Hash256([0; HASH_SIZE]);

    pub const fn from_bytes(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    pub const fn to_bytes(self) -> [u8; HASH_SIZE] {
        self.0
    }
}

impl From<[u8; HASH_SIZE]> for Hash256 {
    fn from(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }
}

// Hashes are displayed byte-reversed, the way block explorers show them.
impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0.iter().rev() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({self})")
    }
}

/// SHA-256 applied twice.
pub fn double_sha256(data: &[u8]) -> Hash256 {
    Hash256(Sha256::digest(Sha256::digest(data)).into())
}

/// Header checksum for a payload.
pub fn checksum(payload: &[u8]) -> Checksum {
    checksum_of(&double_sha256(payload))
}

/// Header checksum derived from an already computed payload hash.
pub fn checksum_of(hash: &Hash256) -> Checksum {
    let mut out = [0u8; CHECKSUM_SIZE];
    out.copy_from_slice(&hash.0[..CHECKSUM_SIZE]);
    out
}

/// Incremental double SHA-256 over payload bytes as they arrive.
#[derive(Clone, Default)]
pub struct PayloadHasher {
    engine: Sha256,
    len: u64,
}

impl PayloadHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extend the running hash.
    pub fn update(&mut self, bytes: &[u8]) {
        self.engine.update(bytes);
        self.len += bytes.len() as u64;
    }

    /// Number of bytes hashed so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Double hash of everything fed so far. The running state is left intact.
    pub fn finalize(&self) -> Hash256 {
        let first = self.engine.clone().finalize();
        Hash256(Sha256::digest(first).into())
    }
}

impl fmt::Debug for PayloadHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadHasher")
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_payload_checksum() {
        // Well-known checksum of an empty payload (verack, getaddr, ...).
        assert_eq!(checksum(b""), [0x5d, 0xf6, 0xe0, 0xe2]);
    }

    #[test]
    fn incremental_matches_one_shot() {
        let data: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let mut hasher = PayloadHasher::new();
        for chunk in data.chunks(7) {
            hasher.update(chunk);
        }
        assert_eq!(hasher.len(), data.len() as u64);
        assert_eq!(hasher.finalize(), double_sha256(&data));
    }

    #[test]
    fn finalize_does_not_consume_state() {
        let mut hasher = PayloadHasher::new();
        hasher.update(b"abc");
        let first = hasher.finalize();
        assert_eq!(hasher.finalize(), first);
        hasher.update(b"def");
        assert_eq!(hasher.finalize(), double_sha256(b"abcdef"));
    }

    #[test]
    fn display_is_byte_reversed() {
        let mut bytes = [0u8; HASH_SIZE];
        bytes[0] = 0xab;
        bytes[31] = 0x01;
        let shown = Hash256::from_bytes(bytes).to_string();
        assert!(shown.starts_with("01"));
        assert!(shown.ends_with("ab"));
        assert_eq!(shown.len(), 64);
    }

    #[test]
    fn ordering_is_lexicographic_from_first_byte() {
        let mut low = [0u8; HASH_SIZE];
        let mut high = [0u8; HASH_SIZE];
        low[0] = 1;
        high[0] = 2;
        low[31] = 0xff;
        assert!(Hash256::from_bytes(low) < Hash256::from_bytes(high));
    }
}
