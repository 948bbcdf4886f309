//! Outbound packet filter
//!
//! Packets read from the TUN device are only forwarded when they are IPv4
//! and carry the session's own address as source. Anything else is normal
//! background noise on a TUN device and is dropped without error.

use std::fmt;
use std::net::Ipv4Addr;

/// Length of an IPv4 header without options
pub const IPV4_HEADER_LEN: usize = 20;

/// Why a packet was not forwarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Shorter than a minimal IPv4 header
    TooShort(usize),
    /// Version nibble other than 4
    NotIpv4(u8),
    /// Source address differs from the session address
    ForeignSource(Ipv4Addr),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort(len) => write!(f, "too short ({} bytes)", len),
            Self::NotIpv4(version) => write!(f, "not IPv4 (version {})", version),
            Self::ForeignSource(addr) => write!(f, "foreign source {}", addr),
        }
    }
}

/// Source address of an IPv4 packet, read from network order.
pub fn source_address(packet: &[u8]) -> Result<Ipv4Addr, Rejection> {
    if packet.len() < IPV4_HEADER_LEN {
        return Err(Rejection::TooShort(packet.len()));
    }
    let version = packet[0] >> 4;
    if version != 4 {
        return Err(Rejection::NotIpv4(version));
    }
    Ok(Ipv4Addr::new(packet[12], packet[13], packet[14], packet[15]))
}

/// Anti-spoof filter bound to the session's effective address
#[derive(Debug, Clone, Copy)]
pub struct PacketFilter {
    local: Ipv4Addr,
}

impl PacketFilter {
    pub fn new(local: Ipv4Addr) -> Self {
        Self { local }
    }

    pub fn check(&self, packet: &[u8]) -> Result<(), Rejection> {
        let source = source_address(packet)?;
        if source != self.local {
            return Err(Rejection::ForeignSource(source));
        }
        Ok(())
    }
}
