//! The `protoconf` message and per-connection limit negotiation.
//!
//! Each side sends one protoconf right after `verack`, advertising the largest
//! non-block payload it accepts and the stream policies it supports. Until it
//! arrives, the peer is assumed to accept only the legacy limit.

use bytes::{Buf, BufMut};
use mvcwire_frame::config::{LEGACY_MAX_PROTOCOL_PAYLOAD_LENGTH, MAX_PROTOCOL_SEND_PAYLOAD_FACTOR};
use mvcwire_frame::{NetConfig, PeerSendLimits};
use tracing::{debug, warn};

use crate::error::{ProtocolError, Result};
use crate::inventory::estimate_max_inv_elements;
use crate::serialize::{ensure, read_compact_size, read_limited_string, write_compact_size, write_string};

/// Number of fields written by this implementation.
pub const PROTOCONF_FIELD_COUNT: u64 = 2;

/// Name of the policy every peer supports.
pub const DEFAULT_STREAM_POLICY: &str = "Default";

/// Decoded protoconf payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Protoconf {
    pub max_recv_payload_length: u32,
    /// Comma-separated policy names, or `None` when the field was absent.
    pub stream_policies: Option<String>,
}

impl Protoconf {
    pub fn new(max_recv_payload_length: u32, stream_policies: impl Into<String>) -> Self {
        Self {
            max_recv_payload_length,
            stream_policies: Some(stream_policies.into()),
        }
    }

    /// Protoconf advertising the limits of `config`.
    pub fn from_config(config: &NetConfig) -> Self {
        let advertised = u32::try_from(config.max_recv_payload_length).unwrap_or(u32::MAX);
        Self::new(advertised, DEFAULT_STREAM_POLICY)
    }

    /// Always writes both fields.
    pub fn encode(&self, dst: &mut impl BufMut) {
        write_compact_size(dst, PROTOCONF_FIELD_COUNT);
        dst.put_u32_le(self.max_recv_payload_length);
        write_string(dst, self.stream_policies.as_deref().unwrap_or(""));
    }

    /// Decode a protoconf payload.
    ///
    /// The policy list is held to the count and name-length bounds of
    /// `config`. Fields beyond the ones known here are left unread.
    pub fn decode(src: &mut impl Buf, config: &NetConfig) -> Result<Self> {
        let field_count = read_compact_size(src)?;
        if field_count == 0 {
            return Err(ProtocolError::MalformedProtoconf(
                "number of fields is zero".to_string(),
            ));
        }

        ensure(src, 4)?;
        let max_recv_payload_length = src.get_u32_le();
        let stream_policies = if field_count >= 2 {
            Some(read_limited_string(src, config.max_stream_policies_length())?)
        } else {
            None
        };

        let protoconf = Self {
            max_recv_payload_length,
            stream_policies,
        };
        protoconf.policy_names(config)?;
        Ok(protoconf)
    }

    /// Policy names in the order the peer listed them.
    ///
    /// An absent field means the peer supports only the default policy.
    pub fn policy_names(&self, config: &NetConfig) -> Result<Vec<String>> {
        let Some(list) = self.stream_policies.as_deref() else {
            return Ok(vec![DEFAULT_STREAM_POLICY.to_string()]);
        };
        let names: Vec<String> = list
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();

        if names.len() > config.max_stream_policy_count {
            return Err(ProtocolError::TooManyStreamPolicies {
                count: names.len(),
                max: config.max_stream_policy_count,
            });
        }
        if let Some(name) = names
            .iter()
            .find(|name| name.len() > config.max_stream_policy_name_length)
        {
            return Err(ProtocolError::StreamPolicyNameTooLong {
                name: name.clone(),
                max: config.max_stream_policy_name_length,
            });
        }
        Ok(names)
    }
}

/// Limits that apply to one peer after its protoconf was accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerLimits {
    /// Ceiling for non-block payloads sent to the peer.
    pub max_send_payload_length: u64,
    /// Inventory entries that fit in one message to the peer.
    pub max_inv_elements: u64,
    /// Stream policies advertised by the peer.
    pub stream_policies: Vec<String>,
}

impl PeerLimits {
    /// Limits assumed for a peer that has not sent a protoconf.
    pub fn legacy() -> Self {
        Self {
            max_send_payload_length: LEGACY_MAX_PROTOCOL_PAYLOAD_LENGTH,
            max_inv_elements: estimate_max_inv_elements(LEGACY_MAX_PROTOCOL_PAYLOAD_LENGTH),
            stream_policies: vec![DEFAULT_STREAM_POLICY.to_string()],
        }
    }

    /// Frame-level send limits, given whether the peer's version supports extended headers.
    pub fn send_limits(&self, extended_messages: bool) -> PeerSendLimits {
        PeerSendLimits {
            peer_max_recv_payload_length: self.max_send_payload_length,
            extended_messages,
        }
    }
}

impl Default for PeerLimits {
    fn default() -> Self {
        Self::legacy()
    }
}

/// Protoconf state of one connection.
#[derive(Debug)]
pub struct ProtoconfNegotiator {
    own_max_recv_payload_length: u64,
    accepted: Option<PeerLimits>,
}

impl ProtoconfNegotiator {
    pub fn new(config: &NetConfig) -> Self {
        Self {
            own_max_recv_payload_length: config.max_recv_payload_length,
            accepted: None,
        }
    }

    /// Apply the peer's protoconf.
    ///
    /// A second protoconf is a non-ban protocol violation and leaves the
    /// accepted limits unchanged. A receive limit below the legacy one is
    /// ban-worthy.
    pub fn receive(&mut self, protoconf: &Protoconf, config: &NetConfig) -> Result<&PeerLimits> {
        if self.accepted.is_some() {
            warn!("peer sent protoconf more than once");
            return Err(ProtocolError::DuplicateProtoconf);
        }

        let advertised = u64::from(protoconf.max_recv_payload_length);
        if advertised < LEGACY_MAX_PROTOCOL_PAYLOAD_LENGTH {
            warn!(advertised, "peer advertised receive limit below legacy minimum");
            return Err(ProtocolError::ProtoconfBelowLegacy {
                advertised,
                min: LEGACY_MAX_PROTOCOL_PAYLOAD_LENGTH,
            });
        }

        let ceiling = self
            .own_max_recv_payload_length
            .saturating_mul(MAX_PROTOCOL_SEND_PAYLOAD_FACTOR);
        let max_send_payload_length = advertised.min(ceiling);
        let limits = PeerLimits {
            max_send_payload_length,
            max_inv_elements: estimate_max_inv_elements(max_send_payload_length),
            stream_policies: protoconf.policy_names(config)?,
        };
        debug!(
            max_send = limits.max_send_payload_length,
            max_inv = limits.max_inv_elements,
            policies = ?limits.stream_policies,
            "protoconf accepted"
        );

        Ok(self.accepted.insert(limits))
    }

    /// Limits in force for the peer: the accepted ones or the legacy defaults.
    pub fn limits(&self) -> PeerLimits {
        self.accepted.clone().unwrap_or_default()
    }

    pub fn has_received(&self) -> bool {
        self.accepted.is_some()
    }
}

#[cfg(test)]
mod tests {
    use mvcwire_frame::config::DEFAULT_MAX_PROTOCOL_RECV_PAYLOAD_LENGTH;

    use super::*;

    fn encoded(protoconf: &Protoconf) -> Vec<u8> {
        let mut buf = Vec::new();
        protoconf.encode(&mut buf);
        buf
    }

    #[test]
    fn encode_always_writes_two_fields() {
        let buf = encoded(&Protoconf::new(2_097_152, "Default"));
        assert_eq!(buf[0], 2);
        assert_eq!(&buf[1..5], &2_097_152u32.to_le_bytes());
        assert_eq!(buf[5], 7);
        assert_eq!(&buf[6..], b"Default");

        let decoded = Protoconf::decode(&mut buf.as_slice(), &NetConfig::default()).unwrap();
        assert_eq!(decoded, Protoconf::new(2_097_152, "Default"));
    }

    #[test]
    fn zero_fields_is_malformed() {
        let mut buf = Vec::new();
        write_compact_size(&mut buf, 0);
        buf.extend_from_slice(&1_048_576u32.to_le_bytes());

        let err = Protoconf::decode(&mut buf.as_slice(), &NetConfig::default()).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedProtoconf(_)));
        assert!(!err.should_ban());
    }

    #[test]
    fn one_field_has_no_policies() {
        let mut buf = Vec::new();
        write_compact_size(&mut buf, 1);
        buf.extend_from_slice(&4_000_000u32.to_le_bytes());

        let decoded = Protoconf::decode(&mut buf.as_slice(), &NetConfig::default()).unwrap();
        assert_eq!(decoded.max_recv_payload_length, 4_000_000);
        assert_eq!(decoded.stream_policies, None);
        assert_eq!(
            decoded.policy_names(&NetConfig::default()).unwrap(),
            vec!["Default".to_string()]
        );
    }

    #[test]
    fn extra_fields_are_ignored() {
        let mut buf = Vec::new();
        write_compact_size(&mut buf, 5);
        buf.extend_from_slice(&3_000_000u32.to_le_bytes());
        write_string(&mut buf, "Default");
        buf.extend_from_slice(b"future fields");

        let mut src = buf.as_slice();
        let decoded = Protoconf::decode(&mut src, &NetConfig::default()).unwrap();
        assert_eq!(decoded, Protoconf::new(3_000_000, "Default"));
        assert_eq!(src, b"future fields");
    }

    #[test]
    fn policy_string_bound_is_enforced() {
        let config = NetConfig::default();
        let max = config.max_stream_policies_length();
        assert_eq!(max, 650);

        let name = "a".repeat(config.max_stream_policy_name_length);
        let at_bound = vec![name.as_str(); config.max_stream_policy_count].join(",");
        assert_eq!(at_bound.len(), max - 1);
        assert!(Protoconf::decode(&mut encoded(&Protoconf::new(1 << 20, at_bound)).as_slice(), &config).is_ok());

        let over = "a".repeat(max + 1);
        let err = Protoconf::decode(&mut encoded(&Protoconf::new(1 << 20, over)).as_slice(), &config)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::StringTooLong { .. }));
    }

    #[test]
    fn decode_rejects_too_many_policies() {
        let config = NetConfig::default();
        let many = vec!["p"; config.max_stream_policy_count + 1].join(",");
        let err = Protoconf::decode(&mut encoded(&Protoconf::new(1 << 20, many)).as_slice(), &config)
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::TooManyStreamPolicies { count: 11, max: 10 }
        ));

        let fifteen = vec!["p"; 15].join(",");
        assert!(Protoconf::decode(&mut encoded(&Protoconf::new(1 << 20, fifteen)).as_slice(), &config).is_err());
    }

    #[test]
    fn decode_rejects_long_policy_name() {
        let config = NetConfig::default();
        let long = format!("Default,{}", "n".repeat(config.max_stream_policy_name_length + 1));
        let err = Protoconf::decode(&mut encoded(&Protoconf::new(1 << 20, long)).as_slice(), &config)
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::StreamPolicyNameTooLong { max: 64, .. }
        ));

        let fits = "n".repeat(config.max_stream_policy_name_length);
        assert!(Protoconf::decode(&mut encoded(&Protoconf::new(1 << 20, fits)).as_slice(), &config).is_ok());
    }

    #[test]
    fn policy_names_are_validated() {
        let config = NetConfig::default();
        let names = Protoconf::new(1 << 20, "BlockPriority, Default")
            .policy_names(&config)
            .unwrap();
        assert_eq!(names, vec!["BlockPriority", "Default"]);

        let many = vec!["p"; config.max_stream_policy_count + 1].join(",");
        assert!(matches!(
            Protoconf::new(1 << 20, many).policy_names(&config),
            Err(ProtocolError::TooManyStreamPolicies { .. })
        ));

        let long = "n".repeat(config.max_stream_policy_name_length + 1);
        assert!(matches!(
            Protoconf::new(1 << 20, long).policy_names(&config),
            Err(ProtocolError::StreamPolicyNameTooLong { .. })
        ));
    }

    #[test]
    fn negotiation_caps_at_send_factor() {
        let config = NetConfig::default();
        let mut negotiator = ProtoconfNegotiator::new(&config);
        assert!(!negotiator.has_received());
        assert_eq!(negotiator.limits(), PeerLimits::legacy());

        let limits = negotiator
            .receive(&Protoconf::new(u32::MAX, "Default"), &config)
            .unwrap()
            .clone();
        assert_eq!(
            limits.max_send_payload_length,
            DEFAULT_MAX_PROTOCOL_RECV_PAYLOAD_LENGTH * MAX_PROTOCOL_SEND_PAYLOAD_FACTOR
        );
        assert_eq!(
            limits.max_inv_elements,
            estimate_max_inv_elements(limits.max_send_payload_length)
        );
        assert!(negotiator.has_received());
        assert_eq!(negotiator.limits(), limits);

        let send = limits.send_limits(true);
        assert_eq!(send.peer_max_recv_payload_length, limits.max_send_payload_length);
        assert!(send.extended_messages);
    }

    #[test]
    fn negotiation_uses_smaller_peer_limit() {
        let config = NetConfig::default();
        let mut negotiator = ProtoconfNegotiator::new(&config);
        let limits = negotiator
            .receive(&Protoconf::new(3_000_000, "Default"), &config)
            .unwrap();
        assert_eq!(limits.max_send_payload_length, 3_000_000);
    }

    #[test]
    fn below_legacy_is_ban_worthy() {
        let config = NetConfig::default();
        let mut negotiator = ProtoconfNegotiator::new(&config);
        let err = negotiator
            .receive(&Protoconf::new(1000, "Default"), &config)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::ProtoconfBelowLegacy { advertised: 1000, .. }));
        assert!(err.should_ban());
        assert!(!negotiator.has_received());
    }

    #[test]
    fn duplicate_protoconf_keeps_first_limits() {
        let config = NetConfig::default();
        let mut negotiator = ProtoconfNegotiator::new(&config);
        negotiator
            .receive(&Protoconf::new(2_000_000, "Default"), &config)
            .unwrap();

        let err = negotiator
            .receive(&Protoconf::new(4_000_000, "Default"), &config)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::DuplicateProtoconf));
        assert!(!err.should_ban());
        assert_eq!(negotiator.limits().max_send_payload_length, 2_000_000);
    }

    #[test]
    fn advertised_limit_follows_config() {
        let config = NetConfig {
            max_recv_payload_length: 8 * 1024 * 1024,
            ..NetConfig::default()
        };
        let protoconf = Protoconf::from_config(&config);
        assert_eq!(protoconf.max_recv_payload_length, 8 * 1024 * 1024);
        assert_eq!(protoconf.stream_policies.as_deref(), Some(DEFAULT_STREAM_POLICY));
    }
}
