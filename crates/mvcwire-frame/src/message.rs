//! Incremental assembly of one incoming message.

use std::cell::OnceCell;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace, warn};

use crate::config::NetConfig;
use crate::error::{FrameError, Result};
use crate::hash::{checksum_of, Hash256, PayloadHasher};
use crate::header::{MessageHeader, BASIC_HEADER_SIZE, BASIC_LENGTH_OFFSET, EXTENDED_HEADER_SIZE};
use crate::message_type::{registry, MessageType};

/// Payload capacity reserved up front; larger payloads grow as bytes arrive.
const INITIAL_PAYLOAD_RESERVE: usize = 256 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyState {
    AwaitingHeader,
    AwaitingPayload,
    Complete,
}

/// A message being received on one connection.
///
/// Bytes are pushed in with [`NetMessage::feed`] in chunks of any size. The
/// header is checked as soon as it is complete, before payload space is
/// reserved, and payload bytes are hashed as they arrive.
pub struct NetMessage {
    config: Arc<NetConfig>,
    header_buf: [u8; EXTENDED_HEADER_SIZE],
    header_len: usize,
    header: Option<MessageHeader>,
    payload: BytesMut,
    hasher: PayloadHasher,
    hash: OnceCell<Hash256>,
    received_at: Option<SystemTime>,
}

impl NetMessage {
    pub fn new(config: Arc<NetConfig>) -> Self {
        Self {
            config,
            header_buf: [0; EXTENDED_HEADER_SIZE],
            header_len: 0,
            header: None,
            payload: BytesMut::new(),
            hasher: PayloadHasher::new(),
            hash: OnceCell::new(),
            received_at: None,
        }
    }

    /// Consume bytes from `bytes` and return how many were used.
    ///
    /// Never consumes past the end of this message, so leftover bytes belong
    /// to the next one. Errors from a rejected header signal that the peer
    /// should be banned (see [`FrameError::should_ban`]); nothing of the
    /// payload is buffered in that case.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<usize> {
        match self.state() {
            AssemblyState::AwaitingHeader => self.read_header(bytes),
            AssemblyState::AwaitingPayload => Ok(self.read_payload(bytes)),
            AssemblyState::Complete => Err(FrameError::MessageComplete),
        }
    }

    pub fn state(&self) -> AssemblyState {
        match &self.header {
            None => AssemblyState::AwaitingHeader,
            Some(header) if (self.payload.len() as u64) < header.payload_length() => {
                AssemblyState::AwaitingPayload
            }
            Some(_) => AssemblyState::Complete,
        }
    }

    /// No byte of this message has been fed yet.
    pub fn is_empty(&self) -> bool {
        self.header.is_none() && self.header_len == 0
    }

    /// Header parsed and the full declared payload buffered.
    pub fn is_complete(&self) -> bool {
        self.state() == AssemblyState::Complete
    }

    pub fn header(&self) -> Option<&MessageHeader> {
        self.header.as_ref()
    }

    /// Payload bytes received so far.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Double SHA-256 of the payload bytes received so far.
    ///
    /// Once the message is complete the value is computed once and cached.
    pub fn message_hash(&self) -> Hash256 {
        if self.is_complete() {
            *self.hash.get_or_init(|| self.hasher.finalize())
        } else {
            self.hasher.finalize()
        }
    }

    /// Header plus payload size, for traffic accounting.
    pub fn total_length(&self) -> u64 {
        match &self.header {
            Some(header) => header.total_length(),
            None => self.header_len as u64,
        }
    }

    /// When the last payload byte arrived.
    pub fn received_at(&self) -> Option<SystemTime> {
        self.received_at
    }

    pub fn set_received_at(&mut self, time: SystemTime) {
        self.received_at = Some(time);
    }

    /// Registered type of the command, once the header is known.
    pub fn message_type(&self) -> Option<Result<&'static MessageType>> {
        self.header
            .as_ref()
            .map(|header| registry().lookup(&header.command().as_str()))
    }

    /// Verify the checksum and hand the payload over.
    ///
    /// A checksum mismatch drops the payload; the connection may carry on
    /// with the next message.
    pub fn finish(self) -> Result<ReceivedMessage> {
        let Some(header) = self.header else {
            return Err(FrameError::MessageIncomplete {
                received: 0,
                expected: 0,
            });
        };
        if (self.payload.len() as u64) < header.payload_length() {
            return Err(FrameError::MessageIncomplete {
                received: self.payload.len() as u64,
                expected: header.payload_length(),
            });
        }

        let hash = *self.hash.get_or_init(|| self.hasher.finalize());
        let actual = checksum_of(&hash);
        if &actual != header.checksum() {
            let command = header.command().as_str().into_owned();
            warn!(%command, size = header.payload_length(), "payload checksum mismatch");
            return Err(FrameError::ChecksumMismatch {
                command,
                size: header.payload_length(),
                extended: header.is_extended(),
                expected: *header.checksum(),
                actual,
            });
        }

        Ok(ReceivedMessage {
            header,
            payload: self.payload.freeze(),
            received_at: self.received_at.unwrap_or_else(SystemTime::now),
            hash,
        })
    }

    /// Take the current message out and leave a fresh one in its place.
    pub fn take(&mut self) -> NetMessage {
        let fresh = NetMessage::new(Arc::clone(&self.config));
        std::mem::replace(self, fresh)
    }

    fn read_header(&mut self, bytes: &[u8]) -> Result<usize> {
        let mut consumed = 0;
        loop {
            let target = self.header_target();
            let take = (target - self.header_len).min(bytes.len() - consumed);
            self.header_buf[self.header_len..self.header_len + take]
                .copy_from_slice(&bytes[consumed..consumed + take]);
            self.header_len += take;
            consumed += take;

            if self.header_len < target {
                return Ok(consumed);
            }

            match MessageHeader::decode(&self.header_buf[..self.header_len], &self.config.magic) {
                Ok(Some((header, _))) => {
                    self.accept_header(header)?;
                    return Ok(consumed);
                }
                // Sentinel length: the extended fields are still missing.
                Ok(None) => continue,
                Err(err) => {
                    warn!(error = %err, "rejecting message header");
                    return Err(err);
                }
            }
        }
    }

    fn header_target(&self) -> usize {
        if self.header_len < BASIC_HEADER_SIZE {
            return BASIC_HEADER_SIZE;
        }
        let length = &self.header_buf[BASIC_LENGTH_OFFSET..BASIC_LENGTH_OFFSET + 4];
        if length == [0xff; 4] {
            EXTENDED_HEADER_SIZE
        } else {
            BASIC_HEADER_SIZE
        }
    }

    fn accept_header(&mut self, header: MessageHeader) -> Result<()> {
        if let Err(err) = header.validate(&self.config) {
            warn!(error = %err, command = %header.command(), "rejecting message header");
            return Err(err);
        }

        let length = header.payload_length();
        let length = usize::try_from(length).map_err(|_| FrameError::LengthOverflow(length))?;
        debug!(
            command = %header.command(),
            size = length,
            extended = header.is_extended(),
            "message header accepted"
        );

        self.payload = BytesMut::with_capacity(length.min(INITIAL_PAYLOAD_RESERVE));
        self.header = Some(header);
        if length == 0 {
            self.received_at = Some(SystemTime::now());
        }
        Ok(())
    }

    fn read_payload(&mut self, bytes: &[u8]) -> usize {
        let Some(header) = &self.header else {
            return 0;
        };
        let remaining = header.payload_length() - self.payload.len() as u64;
        let take = usize::try_from(remaining)
            .unwrap_or(usize::MAX)
            .min(bytes.len());

        let chunk = &bytes[..take];
        self.payload.extend_from_slice(chunk);
        self.hasher.update(chunk);
        trace!(
            received = self.payload.len(),
            expected = header.payload_length(),
            "payload chunk"
        );

        if self.payload.len() as u64 == header.payload_length() {
            self.received_at = Some(SystemTime::now());
        }
        take
    }
}

impl fmt::Debug for NetMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetMessage")
            .field("state", &self.state())
            .field("header", &self.header)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

/// A complete message whose checksum has been verified.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub header: MessageHeader,
    pub payload: Bytes,
    pub received_at: SystemTime,
    pub hash: Hash256,
}

impl ReceivedMessage {
    pub fn command(&self) -> String {
        self.header.command().as_str().into_owned()
    }

    /// Registered type, or [`FrameError::UnknownCommand`] for messages dispatch should ignore.
    pub fn message_type(&self) -> Result<&'static MessageType> {
        registry().lookup(&self.header.command().as_str())
    }

    pub fn total_length(&self) -> u64 {
        self.header.total_length()
    }
}

#[cfg(test)]
mod tests {
    use bytes::BufMut;

    use super::*;
    use crate::config::Network;
    use crate::hash::{checksum, double_sha256};
    use crate::header::{CommandName, CHECKSUM_OFFSET};

    fn config() -> Arc<NetConfig> {
        Arc::new(NetConfig::default())
    }

    fn frame(config: &NetConfig, command: &str, payload: &[u8]) -> Vec<u8> {
        let mut wire = BytesMut::new();
        crate::codec::encode_message(&config.magic, command, payload, &mut wire).unwrap();
        wire.to_vec()
    }

    fn feed_in_chunks(msg: &mut NetMessage, wire: &[u8], chunk: usize) -> usize {
        let mut offset = 0;
        while offset < wire.len() && !msg.is_complete() {
            let end = (offset + chunk).min(wire.len());
            offset += msg.feed(&wire[offset..end]).unwrap();
        }
        offset
    }

    #[test]
    fn whole_message_in_one_feed() {
        let config = config();
        let payload = b"\x01\x02\x03\x04\x05\x06\x07\x08";
        let wire = frame(&config, "ping", payload);

        let mut msg = NetMessage::new(Arc::clone(&config));
        let mut consumed = msg.feed(&wire).unwrap();
        assert_eq!(msg.state(), AssemblyState::AwaitingPayload);
        consumed += msg.feed(&wire[consumed..]).unwrap();

        assert_eq!(consumed, wire.len());
        assert!(msg.is_complete());
        assert_eq!(msg.total_length(), wire.len() as u64);
        assert_eq!(msg.message_hash(), double_sha256(payload));

        let received = msg.finish().unwrap();
        assert_eq!(received.command(), "ping");
        assert_eq!(received.payload.as_ref(), payload);
        assert_eq!(received.message_type().unwrap().name(), "ping");
    }

    #[test]
    fn chunking_does_not_change_result() {
        let config = config();
        let payload: Vec<u8> = (0..5000u32).map(|i| (i * 7) as u8).collect();
        let wire = frame(&config, "tx", &payload);

        let mut reference = NetMessage::new(Arc::clone(&config));
        feed_in_chunks(&mut reference, &wire, wire.len());
        let expected_hash = reference.message_hash();
        let expected_total = reference.total_length();

        for chunk in [1, 2, 3, 23, 24, 25, 999, 4096] {
            let mut msg = NetMessage::new(Arc::clone(&config));
            let consumed = feed_in_chunks(&mut msg, &wire, chunk);
            assert_eq!(consumed, wire.len(), "chunk size {chunk}");
            assert!(msg.is_complete(), "chunk size {chunk}");
            assert_eq!(msg.message_hash(), expected_hash, "chunk size {chunk}");
            assert_eq!(msg.total_length(), expected_total, "chunk size {chunk}");
            assert!(msg.finish().is_ok());
        }
    }

    #[test]
    fn empty_payload_completes_with_header() {
        let config = config();
        let wire = frame(&config, "verack", b"");

        let mut msg = NetMessage::new(Arc::clone(&config));
        assert_eq!(msg.feed(&wire).unwrap(), BASIC_HEADER_SIZE);
        assert!(msg.is_complete());
        assert!(msg.received_at().is_some());
        assert_eq!(msg.total_length(), BASIC_HEADER_SIZE as u64);

        let received = msg.finish().unwrap();
        assert!(received.payload.is_empty());
    }

    #[test]
    fn does_not_consume_next_message() {
        let config = config();
        let mut wire = frame(&config, "ping", &[7; 8]);
        let first_len = wire.len();
        wire.extend(frame(&config, "pong", &[7; 8]));

        let mut msg = NetMessage::new(Arc::clone(&config));
        let consumed = feed_in_chunks(&mut msg, &wire, wire.len());
        assert_eq!(consumed, first_len);
        assert!(matches!(
            msg.feed(&wire[consumed..]),
            Err(FrameError::MessageComplete)
        ));

        let first = msg.take();
        assert_eq!(first.finish().unwrap().command(), "ping");
        assert_eq!(msg.state(), AssemblyState::AwaitingHeader);
        feed_in_chunks(&mut msg, &wire[consumed..], 5);
        assert_eq!(msg.finish().unwrap().command(), "pong");
    }

    #[test]
    fn bad_magic_is_rejected_before_payload() {
        let config = config();
        let foreign = NetConfig::for_network(Network::Regtest);
        let wire = frame(&foreign, "ping", &[1; 8]);

        let mut msg = NetMessage::new(Arc::clone(&config));
        let err = msg.feed(&wire).unwrap_err();
        assert!(matches!(err, FrameError::BadMagic { .. }));
        assert!(err.should_ban());
        assert!(msg.header().is_none());
        assert!(msg.payload().is_empty());
    }

    #[test]
    fn bad_magic_detected_with_byte_feeding() {
        let config = config();
        let foreign = NetConfig::for_network(Network::Test);
        let wire = frame(&foreign, "ping", &[1; 8]);

        let mut msg = NetMessage::new(Arc::clone(&config));
        for byte in &wire[..BASIC_HEADER_SIZE - 1] {
            assert_eq!(msg.feed(std::slice::from_ref(byte)).unwrap(), 1);
        }
        assert!(matches!(
            msg.feed(&wire[BASIC_HEADER_SIZE - 1..]),
            Err(FrameError::BadMagic { .. })
        ));
        assert!(msg.payload().is_empty());
    }

    #[test]
    fn one_byte_over_ceiling_is_rejected_before_payload() {
        let config = config();
        let limit = config.max_recv_payload_length;
        let header = MessageHeader::new(
            config.magic,
            CommandName::new("inv").unwrap(),
            limit + 1,
            [0; 4],
        );
        let mut wire = BytesMut::new();
        header.encode(&mut wire);
        wire.put_slice(&[0u8; 64]);

        let mut msg = NetMessage::new(Arc::clone(&config));
        let err = msg.feed(&wire).unwrap_err();
        assert!(matches!(err, FrameError::Oversized { size, max, .. } if size == limit + 1 && max == limit));
        assert!(err.should_ban());
        assert!(msg.payload().is_empty());
        assert_eq!(msg.payload.capacity(), 0);
    }

    #[test]
    fn block_is_exempt_from_receive_cap() {
        let config = config();
        let size = config.max_recv_payload_length + 1;
        let header = MessageHeader::new(config.magic, CommandName::new("block").unwrap(), size, [0; 4]);
        let mut wire = BytesMut::new();
        header.encode(&mut wire);

        let mut msg = NetMessage::new(Arc::clone(&config));
        assert_eq!(msg.feed(&wire).unwrap(), BASIC_HEADER_SIZE);
        assert_eq!(msg.state(), AssemblyState::AwaitingPayload);
        assert!(msg.payload().is_empty());
    }

    #[test]
    fn malformed_command_is_ban_worthy() {
        let config = config();
        let mut wire = frame(&config, "ping", &[0; 8]);
        wire[5] = 0x01;

        let mut msg = NetMessage::new(Arc::clone(&config));
        let err = msg.feed(&wire).unwrap_err();
        assert!(matches!(err, FrameError::MalformedCommand(_)));
        assert!(err.should_ban());
    }

    #[test]
    fn unknown_command_is_framed_but_flagged() {
        let config = config();
        let wire = frame(&config, "madeup", b"abc");

        let mut msg = NetMessage::new(Arc::clone(&config));
        feed_in_chunks(&mut msg, &wire, 2);
        assert!(msg.is_complete());
        assert!(matches!(
            msg.message_type(),
            Some(Err(FrameError::UnknownCommand(_)))
        ));

        let received = msg.finish().unwrap();
        let err = received.message_type().unwrap_err();
        assert!(matches!(err, FrameError::UnknownCommand(ref cmd) if cmd == "madeup"));
        assert!(!err.should_ban());
    }

    #[test]
    fn checksum_mismatch_reported_on_finish() {
        let config = config();
        let mut wire = frame(&config, "ping", &[3; 8]);
        wire[CHECKSUM_OFFSET] ^= 0xff;

        let mut msg = NetMessage::new(Arc::clone(&config));
        let consumed = feed_in_chunks(&mut msg, &wire, 3);
        assert_eq!(consumed, wire.len());
        assert!(msg.is_complete());

        let err = msg.finish().unwrap_err();
        assert!(matches!(
            err,
            FrameError::ChecksumMismatch { ref command, size: 8, extended: false, actual, .. }
                if command == "ping" && actual == checksum(&[3; 8])
        ));
        assert!(!err.should_ban());
    }

    #[test]
    fn extended_header_is_parsed_across_chunks() {
        let config = config();
        let size = u64::from(u32::MAX) + 10;
        let header = MessageHeader::new(config.magic, CommandName::new("block").unwrap(), size, [0; 4]);
        let mut wire = BytesMut::new();
        header.encode(&mut wire);
        wire.put_slice(b"first payload bytes");

        let mut msg = NetMessage::new(Arc::clone(&config));
        let mut offset = 0;
        while msg.header().is_none() {
            offset += msg.feed(&wire[offset..offset + 1]).unwrap();
        }
        assert_eq!(offset, EXTENDED_HEADER_SIZE);
        let parsed = msg.header().unwrap();
        assert!(parsed.is_extended());
        assert_eq!(parsed.payload_length(), size);
        assert_eq!(msg.total_length(), EXTENDED_HEADER_SIZE as u64 + size);

        let consumed = msg.feed(&wire[offset..]).unwrap();
        assert_eq!(consumed, wire.len() - offset);
        assert!(!msg.is_complete());
    }

    #[test]
    fn finish_before_complete_fails() {
        let config = config();
        let wire = frame(&config, "ping", &[1; 8]);

        let mut msg = NetMessage::new(Arc::clone(&config));
        msg.feed(&wire[..BASIC_HEADER_SIZE + 2]).unwrap();
        assert!(matches!(
            msg.finish(),
            Err(FrameError::MessageIncomplete {
                received: 2,
                expected: 8
            })
        ));
    }

    #[test]
    fn explicit_receipt_time_is_kept() {
        let config = config();
        let wire = frame(&config, "verack", b"");
        let when = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_700_000_000);

        let mut msg = NetMessage::new(Arc::clone(&config));
        msg.feed(&wire).unwrap();
        msg.set_received_at(when);
        assert_eq!(msg.finish().unwrap().received_at, when);
    }
}
