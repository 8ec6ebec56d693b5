//! Primitive payload encodings: compact sizes and length-prefixed strings.

use bytes::{Buf, BufMut};

use crate::error::{ProtocolError, Result};

/// Largest value a compact size may carry in a payload.
pub const MAX_SIZE: u64 = 0x0200_0000;

/// Encoded width of `value` as a compact size.
pub fn compact_size_len(value: u64) -> usize {
    match value {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

pub fn write_compact_size(dst: &mut impl BufMut, value: u64) {
    match value {
        0..=0xfc => dst.put_u8(value as u8),
        0xfd..=0xffff => {
            dst.put_u8(0xfd);
            dst.put_u16_le(value as u16);
        }
        0x1_0000..=0xffff_ffff => {
            dst.put_u8(0xfe);
            dst.put_u32_le(value as u32);
        }
        _ => {
            dst.put_u8(0xff);
            dst.put_u64_le(value);
        }
    }
}

/// Read a canonically encoded compact size no larger than [`MAX_SIZE`].
pub fn read_compact_size(src: &mut impl Buf) -> Result<u64> {
    ensure(src, 1)?;
    let value = match src.get_u8() {
        0xfd => {
            ensure(src, 2)?;
            let value = u64::from(src.get_u16_le());
            if value < 0xfd {
                return Err(ProtocolError::NonCanonicalCompactSize);
            }
            value
        }
        0xfe => {
            ensure(src, 4)?;
            let value = u64::from(src.get_u32_le());
            if value < 0x1_0000 {
                return Err(ProtocolError::NonCanonicalCompactSize);
            }
            value
        }
        0xff => {
            ensure(src, 8)?;
            let value = src.get_u64_le();
            if value < 0x1_0000_0000 {
                return Err(ProtocolError::NonCanonicalCompactSize);
            }
            value
        }
        small => u64::from(small),
    };
    if value > MAX_SIZE {
        return Err(ProtocolError::CompactSizeTooLarge(value));
    }
    Ok(value)
}

/// Write a compact-size prefixed string.
pub fn write_string(dst: &mut impl BufMut, value: &str) {
    write_compact_size(dst, value.len() as u64);
    dst.put_slice(value.as_bytes());
}

/// Read a compact-size prefixed string of at most `max` bytes.
///
/// An over-long string is an error; it is never truncated.
pub fn read_limited_string(src: &mut impl Buf, max: usize) -> Result<String> {
    let len = read_compact_size(src)?;
    if len > max as u64 {
        return Err(ProtocolError::StringTooLong { len, max });
    }
    let len = len as usize;
    ensure(src, len)?;
    let mut raw = vec![0u8; len];
    src.copy_to_slice(&mut raw);
    String::from_utf8(raw).map_err(|_| ProtocolError::InvalidString)
}

pub(crate) fn ensure(src: &impl Buf, needed: usize) -> Result<()> {
    if src.remaining() < needed {
        return Err(ProtocolError::UnexpectedEof {
            needed: needed - src.remaining(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(value: u64) -> Vec<u8> {
        let mut buf = Vec::new();
        write_compact_size(&mut buf, value);
        buf
    }

    #[test]
    fn compact_size_widths() {
        for (value, width) in [
            (0u64, 1usize),
            (0xfc, 1),
            (0xfd, 3),
            (0xffff, 3),
            (0x1_0000, 5),
            (0xffff_ffff, 5),
            (0x1_0000_0000, 9),
        ] {
            assert_eq!(encoded(value).len(), width, "value {value:#x}");
            assert_eq!(compact_size_len(value), width, "value {value:#x}");
        }
    }

    #[test]
    fn compact_size_reads_back() {
        for value in [0u64, 1, 0xfc, 0xfd, 0x1234, 0xffff, 0x1_0000, MAX_SIZE] {
            let buf = encoded(value);
            assert_eq!(read_compact_size(&mut buf.as_slice()).unwrap(), value);
        }
    }

    #[test]
    fn non_canonical_rejected() {
        let mut buf: &[u8] = &[0xfd, 0x10, 0x00];
        assert!(matches!(
            read_compact_size(&mut buf),
            Err(ProtocolError::NonCanonicalCompactSize)
        ));
        let mut buf: &[u8] = &[0xfe, 0xff, 0xff, 0x00, 0x00];
        assert!(matches!(
            read_compact_size(&mut buf),
            Err(ProtocolError::NonCanonicalCompactSize)
        ));
    }

    #[test]
    fn above_max_size_rejected() {
        let buf = encoded(MAX_SIZE + 1);
        assert!(matches!(
            read_compact_size(&mut buf.as_slice()),
            Err(ProtocolError::CompactSizeTooLarge(v)) if v == MAX_SIZE + 1
        ));
    }

    #[test]
    fn truncated_input() {
        let mut buf: &[u8] = &[0xfe, 0x01];
        assert!(matches!(
            read_compact_size(&mut buf),
            Err(ProtocolError::UnexpectedEof { needed: 3 })
        ));
        let mut empty: &[u8] = &[];
        assert!(read_compact_size(&mut empty).is_err());
    }

    #[test]
    fn limited_string_bounds() {
        let mut buf = Vec::new();
        write_string(&mut buf, "BlockPriority,Default");

        let read = read_limited_string(&mut buf.as_slice(), 21).unwrap();
        assert_eq!(read, "BlockPriority,Default");

        assert!(matches!(
            read_limited_string(&mut buf.as_slice(), 20),
            Err(ProtocolError::StringTooLong { len: 21, max: 20 })
        ));
    }

    #[test]
    fn limited_string_needs_all_bytes() {
        let mut buf = Vec::new();
        write_string(&mut buf, "Default");
        buf.pop();
        assert!(matches!(
            read_limited_string(&mut buf.as_slice(), 64),
            Err(ProtocolError::UnexpectedEof { needed: 1 })
        ));
    }
}
