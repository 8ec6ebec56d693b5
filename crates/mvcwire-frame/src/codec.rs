use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::config::{Magic, NetConfig};
use crate::error::{FrameError, Result};
use crate::header::{header_size_for_payload, CommandName, MessageHeader};
use crate::message::{NetMessage, ReceivedMessage};

/// A message queued for sending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Command name, at most 12 printable ASCII bytes.
    pub command: String,
    /// The message payload.
    pub payload: Bytes,
}

impl OutgoingMessage {
    pub fn new(command: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            command: command.into(),
            payload: payload.into(),
        }
    }

    /// The total wire size of this message (header + payload).
    pub fn wire_size(&self) -> usize {
        header_size_for_payload(self.payload.len() as u64) + self.payload.len()
    }
}

/// Encode a message into the wire format.
///
/// Payloads of `u32::MAX` bytes or more get an extended header; whether the
/// peer may receive one is the caller's decision (see
/// [`MessageWriter`](crate::MessageWriter)).
pub fn encode_message(
    magic: &Magic,
    command: &str,
    payload: &[u8],
    dst: &mut BytesMut,
) -> Result<()> {
    let command = CommandName::new(command)?;
    let header = MessageHeader::for_payload(*magic, command, payload);
    dst.reserve(header.header_size() + payload.len());
    header.encode(dst);
    dst.put_slice(payload);
    Ok(())
}

/// Decode one message from the front of a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete message yet;
/// the buffer is left untouched in that case. On success, consumes the
/// message bytes from the buffer.
pub fn decode_message(src: &mut BytesMut, config: &Arc<NetConfig>) -> Result<Option<ReceivedMessage>> {
    let Some((header, header_size)) = MessageHeader::decode(src, &config.magic)? else {
        return Ok(None);
    };
    header.validate(config)?;

    let total = u64::try_from(header_size)
        .ok()
        .and_then(|size| size.checked_add(header.payload_length()))
        .and_then(|total| usize::try_from(total).ok())
        .ok_or(FrameError::LengthOverflow(header.payload_length()))?;
    if src.len() < total {
        return Ok(None);
    }

    let mut message = NetMessage::new(Arc::clone(config));
    let mut consumed = 0;
    while !message.is_complete() {
        consumed += message.feed(&src[consumed..total])?;
    }
    src.advance(consumed);
    message.finish().map(Some)
}
