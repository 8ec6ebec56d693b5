/// Errors that can occur while decoding or negotiating message payloads.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] mvcwire_frame::FrameError),

    /// The payload ended before a field was complete.
    #[error("unexpected end of payload (needed {needed} more bytes)")]
    UnexpectedEof { needed: usize },

    /// A compact size used more bytes than its value requires.
    #[error("non-canonical compact size")]
    NonCanonicalCompactSize,

    /// A compact size exceeds the serialization limit.
    #[error("compact size {0} too large")]
    CompactSizeTooLarge(u64),

    /// A length-prefixed string exceeds its bound.
    #[error("string too long ({len} bytes, max {max})")]
    StringTooLong { len: u64, max: usize },

    /// A string field is not valid UTF-8.
    #[error("string is not valid UTF-8")]
    InvalidString,

    /// The protoconf payload cannot be decoded.
    #[error("malformed protoconf: {0}")]
    MalformedProtoconf(String),

    /// The peer advertised more stream policies than allowed.
    #[error("too many stream policies ({count}, max {max})")]
    TooManyStreamPolicies { count: usize, max: usize },

    /// A stream policy name exceeds the allowed length.
    #[error("stream policy name '{name}' too long (max {max})")]
    StreamPolicyNameTooLong { name: String, max: usize },

    /// The peer advertised a receive limit below the legacy minimum.
    #[error("advertised receive limit {advertised} below legacy minimum {min}")]
    ProtoconfBelowLegacy { advertised: u64, min: u64 },

    /// A second protoconf arrived on the same connection.
    #[error("duplicate protoconf")]
    DuplicateProtoconf,

    /// An inventory list holds more items than the payload budget allows.
    #[error("too many inventory items ({count}, max {max})")]
    TooManyInventoryItems { count: u64, max: u64 },

    /// An address list holds more entries than allowed.
    #[error("too many addresses ({count}, max {max})")]
    TooManyAddresses { count: u64, max: u64 },
}

impl ProtocolError {
    /// Whether the peer that produced this error should be banned.
    pub fn should_ban(&self) -> bool {
        match self {
            ProtocolError::Frame(err) => err.should_ban(),
            ProtocolError::ProtoconfBelowLegacy { .. } => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
