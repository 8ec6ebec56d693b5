use std::io::{ErrorKind, Write};
use std::sync::Arc;

use bytes::BytesMut;
use tracing::{debug, trace};

use crate::codec::{encode_message, OutgoingMessage};
use crate::config::{NetConfig, PeerSendLimits};
use crate::error::{FrameError, Result};
use crate::header::is_extended_length;
use crate::message_type::registry;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete messages to any `Write` stream.
///
/// Every payload is checked against the send ceiling of its command before
/// anything is written. The ceiling depends on what the peer advertised, so
/// call [`MessageWriter::set_peer_limits`] once its protoconf has arrived.
pub struct MessageWriter<T> {
    inner: T,
    buf: BytesMut,
    config: Arc<NetConfig>,
    peer: PeerSendLimits,
}

impl<T: Write> MessageWriter<T> {
    /// Create a new message writer with default configuration and legacy peer limits.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, Arc::new(NetConfig::default()))
    }

    /// Create a new message writer with explicit configuration.
    pub fn with_config(inner: T, config: Arc<NetConfig>) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
            peer: PeerSendLimits::default(),
        }
    }

    /// Write a complete message (blocking).
    pub fn write_message(&mut self, message: &OutgoingMessage) -> Result<()> {
        self.send(&message.command, message.payload.as_ref())
    }

    /// Encode and send a payload under `command`.
    pub fn send(&mut self, command: &str, payload: &[u8]) -> Result<()> {
        self.check_send_size(command, payload.len() as u64)?;

        self.buf.clear();
        encode_message(&self.config.magic, command, payload, &mut self.buf)?;
        trace!(command, size = payload.len(), "sending message");

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Largest payload `command` may carry to this peer.
    pub fn max_send_length(&self, command: &str) -> u64 {
        registry().max_send_length(command, &self.config, &self.peer)
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Apply limits learned from the peer.
    pub fn set_peer_limits(&mut self, peer: PeerSendLimits) {
        debug!(
            max_recv = peer.peer_max_recv_payload_length,
            extended = peer.extended_messages,
            "peer send limits updated"
        );
        self.peer = peer;
    }

    pub fn peer_limits(&self) -> &PeerSendLimits {
        &self.peer
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current configuration.
    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    fn check_send_size(&self, command: &str, size: u64) -> Result<()> {
        let max = self.max_send_length(command);
        if size > max {
            return Err(FrameError::PayloadTooLarge { size, max });
        }
        if is_extended_length(size) && !self.peer.extended_messages {
            return Err(FrameError::PayloadTooLarge {
                size,
                max: u64::from(u32::MAX) - 1,
            });
        }
        Ok(())
    }
}
