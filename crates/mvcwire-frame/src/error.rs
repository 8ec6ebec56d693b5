use crate::config::Magic;
use crate::header::Checksum;

/// Errors that can occur during message framing.
///
/// Ban-worthy failures are reported through [`FrameError::should_ban`] rather
/// than acted on here; the connection layer owns the policy.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The header carries another network's magic bytes.
    #[error("invalid network magic {actual:02x?} (expected {expected:02x?})")]
    BadMagic { expected: Magic, actual: Magic },

    /// The command field is not a NUL-padded printable ASCII token.
    #[error("malformed command {0:?}")]
    MalformedCommand(String),

    /// The extended header fields are inconsistent.
    #[error("malformed extended header: {0}")]
    MalformedExtendedHeader(&'static str),

    /// The command is well formed but not a registered message type.
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// The declared payload length exceeds the ceiling for this command.
    #[error("oversized '{command}' message ({size} bytes, max {max})")]
    Oversized { command: String, size: u64, max: u64 },

    /// The payload does not hash to the checksum in its header.
    #[error("checksum mismatch for '{command}' (header {expected:02x?}, payload {actual:02x?})")]
    ChecksumMismatch {
        command: String,
        /// Declared payload size of the dropped message.
        size: u64,
        /// The dropped message used an extended header.
        extended: bool,
        expected: Checksum,
        actual: Checksum,
    },

    /// The declared payload length cannot be buffered on this platform.
    #[error("payload length {0} overflows the address space")]
    LengthOverflow(u64),

    /// An outgoing payload exceeds what the peer accepts.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: u64, max: u64 },

    /// `feed` was called on a message that already holds its full payload.
    #[error("message already complete")]
    MessageComplete,

    /// `finish` was called before the payload was fully received.
    #[error("message incomplete ({received} of {expected} payload bytes)")]
    MessageIncomplete { received: u64, expected: u64 },

    /// Configuration values are out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An I/O error occurred while reading or writing messages.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete message was received.
    #[error("connection closed (incomplete message)")]
    ConnectionClosed,
}

impl FrameError {
    /// Whether the peer that produced this error should be banned.
    pub fn should_ban(&self) -> bool {
        matches!(
            self,
            FrameError::BadMagic { .. }
                | FrameError::MalformedCommand(_)
                | FrameError::MalformedExtendedHeader(_)
                | FrameError::Oversized { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
