//! `tokio_util` codec for use with `Framed` streams.

use std::sync::Arc;

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::OutgoingMessage;
use crate::config::{NetConfig, PeerSendLimits};
use crate::error::{FrameError, Result};
use crate::header::is_extended_length;
use crate::message::{NetMessage, ReceivedMessage};
use crate::message_type::registry;

/// Decodes [`ReceivedMessage`]s and encodes [`OutgoingMessage`]s.
///
/// Incoming bytes are moved into the assembler as they arrive, so the read
/// buffer never holds more than one chunk.
#[derive(Debug)]
pub struct NetMessageCodec {
    config: Arc<NetConfig>,
    peer: PeerSendLimits,
    message: NetMessage,
}

impl NetMessageCodec {
    pub fn new(config: Arc<NetConfig>) -> Self {
        Self {
            message: NetMessage::new(Arc::clone(&config)),
            config,
            peer: PeerSendLimits::default(),
        }
    }

    pub fn set_peer_limits(&mut self, peer: PeerSendLimits) {
        self.peer = peer;
    }

    pub fn config(&self) -> &NetConfig {
        &self.config
    }
}

impl Decoder for NetMessageCodec {
    type Item = ReceivedMessage;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<ReceivedMessage>> {
        if !src.is_empty() {
            let used = self.message.feed(src)?;
            src.advance(used);
        }
        if self.message.is_complete() {
            return self.message.take().finish().map(Some);
        }
        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<ReceivedMessage>> {
        match self.decode(src)? {
            Some(message) => Ok(Some(message)),
            None if self.message.is_empty() && src.is_empty() => Ok(None),
            None => Err(FrameError::ConnectionClosed),
        }
    }
}

impl Encoder<OutgoingMessage> for NetMessageCodec {
    type Error = FrameError;

    fn encode(&mut self, item: OutgoingMessage, dst: &mut BytesMut) -> Result<()> {
        let size = item.payload.len() as u64;
        let max = registry().max_send_length(&item.command, &self.config, &self.peer);
        if size > max || (is_extended_length(size) && !self.peer.extended_messages) {
            return Err(FrameError::PayloadTooLarge { size, max });
        }
        crate::codec::encode_message(&self.config.magic, &item.command, &item.payload, dst)
    }
}
