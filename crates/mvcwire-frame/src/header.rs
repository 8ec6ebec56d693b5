//! Basic and extended message headers.
//!
//! Wire format (integers little-endian):
//! ```text
//! ┌───────────┬──────────────┬─────────────┬──────────────┐
//! │ Magic (4) │ Command (12) │ Length (4)  │ Checksum (4) │   basic, 24 bytes
//! └───────────┴──────────────┴─────────────┴──────────────┘
//! ┌───────────────────────┬────────────────────┐
//! │ Extended command (12) │ Extended length (8) │            iff Length == 0xFFFFFFFF
//! └───────────────────────┴────────────────────┘
//! ```
//!
//! The sentinel never leaves this module: callers see [`HeaderKind`].

use std::borrow::Cow;
use std::fmt;

use bytes::{Buf, BufMut};
use tracing::debug;

use crate::config::{Magic, NetConfig};
use crate::error::{FrameError, Result};
use crate::hash;
use crate::message_type::{command, registry};

pub const MESSAGE_START_SIZE: usize = 4;
pub const COMMAND_SIZE: usize = 12;
pub const CHECKSUM_SIZE: usize = 4;
pub const BASIC_LENGTH_SIZE: usize = 4;
pub const EXTENDED_LENGTH_SIZE: usize = 8;

pub const BASIC_LENGTH_OFFSET: usize = MESSAGE_START_SIZE + COMMAND_SIZE;
pub const CHECKSUM_OFFSET: usize = BASIC_LENGTH_OFFSET + BASIC_LENGTH_SIZE;

pub const BASIC_HEADER_SIZE: usize =
    MESSAGE_START_SIZE + COMMAND_SIZE + BASIC_LENGTH_SIZE + CHECKSUM_SIZE;
pub const EXTENDED_HEADER_SIZE: usize = BASIC_HEADER_SIZE + COMMAND_SIZE + EXTENDED_LENGTH_SIZE;

/// Basic length value announcing extended fields.
const EXTENDED_LENGTH_SENTINEL: u32 = u32::MAX;

/// First protocol version able to receive extended headers.
pub const EXTENDED_PAYLOAD_VERSION: i32 = 70016;

/// First four bytes of the payload's double SHA-256.
pub type Checksum = [u8; CHECKSUM_SIZE];

/// Fixed-width, NUL-padded command field.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CommandName([u8; COMMAND_SIZE]);

impl CommandName {
    /// Build a command from a printable ASCII token of at most 12 bytes.
    pub fn new(name: &str) -> Result<Self> {
        let bytes = name.as_bytes();
        if bytes.is_empty() || bytes.len() > COMMAND_SIZE || !bytes.iter().all(is_printable) {
            return Err(FrameError::MalformedCommand(name.to_string()));
        }
        let mut raw = [0u8; COMMAND_SIZE];
        raw[..bytes.len()].copy_from_slice(bytes);
        Ok(Self(raw))
    }

    /// Wrap raw wire bytes without checking them.
    pub const fn from_bytes(raw: [u8; COMMAND_SIZE]) -> Self {
        Self(raw)
    }

    pub const fn as_bytes(&self) -> &[u8; COMMAND_SIZE] {
        &self.0
    }

    /// A NUL-terminated printable token: printable bytes, then only NULs.
    pub fn is_well_formed(&self) -> bool {
        let end = self.token_len();
        end > 0 && self.0[..end].iter().all(is_printable) && self.0[end..].iter().all(|b| *b == 0)
    }

    /// Token up to the first NUL. Non-UTF-8 bytes are replaced.
    pub fn as_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0[..self.token_len()])
    }

    fn token_len(&self) -> usize {
        self.0.iter().position(|b| *b == 0).unwrap_or(COMMAND_SIZE)
    }
}

fn is_printable(byte: &u8) -> bool {
    (b' '..=0x7e).contains(byte)
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

impl fmt::Debug for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommandName({:?})", self.as_str())
    }
}

/// Fields appended after a basic header whose length is the sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtendedFields {
    pub command: CommandName,
    pub payload_length: u64,
}

/// Header representation with the sentinel decoded away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    Basic {
        command: CommandName,
        payload_length: u32,
    },
    Extended {
        /// Command in the basic part; `extmsg` for well-formed headers.
        marker: CommandName,
        fields: ExtendedFields,
    },
}

/// A fully parsed message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    magic: Magic,
    kind: HeaderKind,
    checksum: Checksum,
}

impl MessageHeader {
    /// Header for a payload of `payload_length` bytes.
    ///
    /// Extended framing is chosen iff the length does not fit below the sentinel.
    pub fn new(magic: Magic, command: CommandName, payload_length: u64, checksum: Checksum) -> Self {
        let kind = match u32::try_from(payload_length) {
            Ok(length) if length != EXTENDED_LENGTH_SENTINEL => HeaderKind::Basic {
                command,
                payload_length: length,
            },
            _ => HeaderKind::Extended {
                marker: extmsg_marker(),
                fields: ExtendedFields {
                    command,
                    payload_length,
                },
            },
        };
        Self {
            magic,
            kind,
            checksum,
        }
    }

    /// Header for `payload`, with a freshly computed checksum.
    pub fn for_payload(magic: Magic, command: CommandName, payload: &[u8]) -> Self {
        Self::new(
            magic,
            command,
            payload.len() as u64,
            hash::checksum(payload),
        )
    }

    pub fn magic(&self) -> &Magic {
        &self.magic
    }

    pub fn kind(&self) -> &HeaderKind {
        &self.kind
    }

    pub fn checksum(&self) -> &Checksum {
        &self.checksum
    }

    pub fn is_extended(&self) -> bool {
        matches!(self.kind, HeaderKind::Extended { .. })
    }

    /// The command that names the message type.
    pub fn command(&self) -> &CommandName {
        match &self.kind {
            HeaderKind::Basic { command, .. } => command,
            HeaderKind::Extended { fields, .. } => &fields.command,
        }
    }

    /// Authoritative payload length.
    pub fn payload_length(&self) -> u64 {
        match self.kind {
            HeaderKind::Basic { payload_length, .. } => u64::from(payload_length),
            HeaderKind::Extended { fields, .. } => fields.payload_length,
        }
    }

    /// Encoded size of this header.
    pub fn header_size(&self) -> usize {
        if self.is_extended() {
            EXTENDED_HEADER_SIZE
        } else {
            BASIC_HEADER_SIZE
        }
    }

    /// Header plus payload size.
    pub fn total_length(&self) -> u64 {
        (self.header_size() as u64).saturating_add(self.payload_length())
    }

    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_slice(&self.magic);
        match &self.kind {
            HeaderKind::Basic {
                command,
                payload_length,
            } => {
                dst.put_slice(command.as_bytes());
                dst.put_u32_le(*payload_length);
                dst.put_slice(&self.checksum);
            }
            HeaderKind::Extended { marker, fields } => {
                dst.put_slice(marker.as_bytes());
                dst.put_u32_le(EXTENDED_LENGTH_SENTINEL);
                dst.put_slice(&self.checksum);
                dst.put_slice(fields.command.as_bytes());
                dst.put_u64_le(fields.payload_length);
            }
        }
    }

    /// Decode a header from the front of `src`.
    ///
    /// Returns `Ok(None)` while not enough bytes are available, and the
    /// header with the number of bytes it occupies otherwise. Only the magic
    /// is checked here; see [`MessageHeader::validate`] for the rest.
    pub fn decode(src: &[u8], expected_magic: &Magic) -> Result<Option<(Self, usize)>> {
        if src.len() < BASIC_HEADER_SIZE {
            return Ok(None);
        }

        let mut buf = src;
        let mut magic = [0u8; MESSAGE_START_SIZE];
        buf.copy_to_slice(&mut magic);
        if &magic != expected_magic {
            return Err(FrameError::BadMagic {
                expected: *expected_magic,
                actual: magic,
            });
        }

        let mut command = [0u8; COMMAND_SIZE];
        buf.copy_to_slice(&mut command);
        let payload_length = buf.get_u32_le();
        let mut checksum = [0u8; CHECKSUM_SIZE];
        buf.copy_to_slice(&mut checksum);

        if payload_length != EXTENDED_LENGTH_SENTINEL {
            let header = Self {
                magic,
                kind: HeaderKind::Basic {
                    command: CommandName(command),
                    payload_length,
                },
                checksum,
            };
            return Ok(Some((header, BASIC_HEADER_SIZE)));
        }

        if src.len() < EXTENDED_HEADER_SIZE {
            return Ok(None);
        }

        let mut extended_command = [0u8; COMMAND_SIZE];
        buf.copy_to_slice(&mut extended_command);
        let extended_length = buf.get_u64_le();

        let header = Self {
            magic,
            kind: HeaderKind::Extended {
                marker: CommandName(command),
                fields: ExtendedFields {
                    command: CommandName(extended_command),
                    payload_length: extended_length,
                },
            },
            checksum,
        };
        Ok(Some((header, EXTENDED_HEADER_SIZE)))
    }

    /// Magic matches and every command field is a well-formed token.
    pub fn is_valid(&self, config: &NetConfig) -> bool {
        self.check_magic_and_command(&config.magic).is_ok()
    }

    /// Declared length exceeds the registry ceiling for this command.
    pub fn is_oversized(&self, config: &NetConfig) -> bool {
        self.check_size(config).is_err()
    }

    /// Full acceptance check, run before any payload byte is buffered.
    pub fn validate(&self, config: &NetConfig) -> Result<()> {
        self.check_magic_and_command(&config.magic)?;
        self.check_size(config)
    }

    fn check_magic_and_command(&self, magic: &Magic) -> Result<()> {
        if &self.magic != magic {
            return Err(FrameError::BadMagic {
                expected: *magic,
                actual: self.magic,
            });
        }
        match &self.kind {
            HeaderKind::Basic { command, .. } => check_command(command),
            HeaderKind::Extended { marker, fields } => {
                if marker.as_bytes() != extmsg_marker().as_bytes() {
                    return Err(FrameError::MalformedExtendedHeader(
                        "basic command is not extmsg",
                    ));
                }
                check_command(&fields.command)
            }
        }
    }

    fn check_size(&self, config: &NetConfig) -> Result<()> {
        let command = self.command().as_str();
        let max = registry().max_recv_length(&command, config);
        let size = self.payload_length();
        if size > max {
            debug!(%command, size, max, "oversized message header");
            return Err(FrameError::Oversized {
                command: command.into_owned(),
                size,
                max,
            });
        }
        Ok(())
    }
}

fn check_command(command: &CommandName) -> Result<()> {
    if command.is_well_formed() {
        Ok(())
    } else {
        Err(FrameError::MalformedCommand(command.as_str().into_owned()))
    }
}

fn extmsg_marker() -> CommandName {
    let mut raw = [0u8; COMMAND_SIZE];
    raw[..command::EXTMSG.len()].copy_from_slice(command::EXTMSG.as_bytes());
    CommandName(raw)
}

/// Whether a payload of this length needs extended framing.
pub fn is_extended_length(payload_length: u64) -> bool {
    payload_length >= u64::from(EXTENDED_LENGTH_SENTINEL)
}

/// Header size used for a payload of this length.
pub fn header_size_for_payload(payload_length: u64) -> usize {
    if is_extended_length(payload_length) {
        EXTENDED_HEADER_SIZE
    } else {
        BASIC_HEADER_SIZE
    }
}

/// Largest payload that can be framed for a peer speaking `protocol_version`.
pub fn max_payload_length(protocol_version: i32) -> u64 {
    if supports_extended_messages(protocol_version) {
        u64::MAX
    } else {
        u64::from(EXTENDED_LENGTH_SENTINEL) - 1
    }
}

pub fn supports_extended_messages(protocol_version: i32) -> bool {
    protocol_version >= EXTENDED_PAYLOAD_VERSION
}
