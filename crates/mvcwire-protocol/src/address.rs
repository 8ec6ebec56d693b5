//! Network address records carried by `addr` and `version`.

use std::fmt;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};

use bitflags::bitflags;
use bytes::{Buf, BufMut};

use crate::error::{ProtocolError, Result};
use crate::serialize::{ensure, read_compact_size, write_compact_size};

/// First protocol version whose address records carry a timestamp.
pub const CADDR_TIME_VERSION: i32 = 31402;

/// Maximum number of records in one `addr` message.
pub const MAX_ADDR_TO_SEND: u64 = 1000;

/// Timestamp given to records that never carried one.
pub const DEFAULT_ADDRESS_TIME: u32 = 100_000_000;

bitflags! {
    /// Services a node advertises.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ServiceFlags: u64 {
        /// Serves the full block chain.
        const NODE_NETWORK = 1 << 0;
        const NODE_GETUTXO = 1 << 1;
        /// Accepts bloom-filtered connections.
        const NODE_BLOOM = 1 << 2;
        const NODE_XTHIN = 1 << 4;
        /// Follows this chain's consensus rules.
        const NODE_MVC_CASH = 1 << 5;
    }
}

/// Endpoint as it appears on the wire: 16-byte IPv6 (IPv4-mapped for v4) and a big-endian port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NetAddress {
    ip: Ipv6Addr,
    port: u16,
}

impl NetAddress {
    pub const WIRE_SIZE: usize = 16 + 2;

    pub fn new(ip: IpAddr, port: u16) -> Self {
        let ip = match ip {
            IpAddr::V4(v4) => v4.to_ipv6_mapped(),
            IpAddr::V6(v6) => v6,
        };
        Self { ip, port }
    }

    /// IPv4 addresses come back as V4.
    pub fn ip(&self) -> IpAddr {
        match self.ip.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(self.ip),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_ipv4(&self) -> bool {
        self.ip.to_ipv4_mapped().is_some()
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip(), self.port)
    }

    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_slice(&self.ip.octets());
        dst.put_u16(self.port);
    }

    pub fn decode(src: &mut impl Buf) -> Result<Self> {
        ensure(src, Self::WIRE_SIZE)?;
        let mut octets = [0u8; 16];
        src.copy_to_slice(&mut octets);
        let port = src.get_u16();
        Ok(Self {
            ip: Ipv6Addr::from(octets),
            port,
        })
    }
}

impl From<SocketAddr> for NetAddress {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip(), addr.port())
    }
}

impl fmt::Display for NetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.socket_addr(), f)
    }
}

/// A known peer address with its advertised services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRecord {
    pub services: ServiceFlags,
    /// Unix time the address was last seen.
    pub time: u32,
    pub address: NetAddress,
}

impl AddressRecord {
    pub fn new(address: NetAddress, services: ServiceFlags) -> Self {
        Self {
            services,
            time: DEFAULT_ADDRESS_TIME,
            address,
        }
    }

    pub fn wire_size(protocol_version: i32) -> usize {
        let time = if has_time(protocol_version) { 4 } else { 0 };
        time + 8 + NetAddress::WIRE_SIZE
    }

    pub fn encode(&self, dst: &mut impl BufMut, protocol_version: i32) {
        if has_time(protocol_version) {
            dst.put_u32_le(self.time);
        }
        dst.put_u64_le(self.services.bits());
        self.address.encode(dst);
    }

    /// Unknown service bits are kept.
    pub fn decode(src: &mut impl Buf, protocol_version: i32) -> Result<Self> {
        ensure(src, Self::wire_size(protocol_version))?;
        let time = if has_time(protocol_version) {
            src.get_u32_le()
        } else {
            DEFAULT_ADDRESS_TIME
        };
        let services = ServiceFlags::from_bits_retain(src.get_u64_le());
        let address = NetAddress::decode(src)?;
        Ok(Self {
            services,
            time,
            address,
        })
    }
}

fn has_time(protocol_version: i32) -> bool {
    protocol_version >= CADDR_TIME_VERSION
}

/// Encode an `addr` payload.
pub fn encode_addresses(records: &[AddressRecord], dst: &mut impl BufMut, protocol_version: i32) {
    write_compact_size(dst, records.len() as u64);
    for record in records {
        record.encode(dst, protocol_version);
    }
}

/// Decode an `addr` payload of at most [`MAX_ADDR_TO_SEND`] records.
pub fn decode_addresses(src: &mut impl Buf, protocol_version: i32) -> Result<Vec<AddressRecord>> {
    let count = read_compact_size(src)?;
    if count > MAX_ADDR_TO_SEND {
        return Err(ProtocolError::TooManyAddresses {
            count,
            max: MAX_ADDR_TO_SEND,
        });
    }
    (0..count)
        .map(|_| AddressRecord::decode(src, protocol_version))
        .collect()
}
