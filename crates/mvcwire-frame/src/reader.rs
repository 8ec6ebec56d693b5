use std::io::{ErrorKind, Read};
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use tracing::trace;

use crate::config::NetConfig;
use crate::error::{FrameError, Result};
use crate::message::{NetMessage, ReceivedMessage};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete messages from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete messages.
/// A checksum mismatch drops only the offending message, so reading may
/// continue. Header errors leave the stream in an undefined position and the
/// connection should be closed.
pub struct MessageReader<T> {
    inner: T,
    buf: BytesMut,
    message: NetMessage,
    config: Arc<NetConfig>,
}

impl<T: Read> MessageReader<T> {
    /// Create a new message reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, Arc::new(NetConfig::default()))
    }

    /// Create a new message reader with explicit configuration.
    pub fn with_config(inner: T, config: Arc<NetConfig>) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            message: NetMessage::new(Arc::clone(&config)),
            config,
        }
    }

    /// Read the next complete message (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_message(&mut self) -> Result<ReceivedMessage> {
        loop {
            if !self.buf.is_empty() {
                let used = self.message.feed(&self.buf)?;
                self.buf.advance(used);
            }
            if self.message.is_complete() {
                return self.message.take().finish();
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }
            trace!(read, "read chunk");

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// The message currently being assembled.
    pub fn pending(&self) -> &NetMessage {
        &self.message
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current configuration.
    pub fn config(&self) -> &NetConfig {
        &self.config
    }
}
