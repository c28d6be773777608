use std::fmt;
use std::net::SocketAddr;

use byteorder::{BigEndian, ByteOrder};
use sha2::{Digest, Sha256};

use super::EndpointId;

const HOST_TYPE_PREF: u32 = 126;
const MAX_LOCAL_PREF: u16 = u16::MAX;
const TYPE_PREF_SHIFT: u32 = 24;
const LOCAL_PREF_SHIFT: u32 = 8;
const COMPONENT_OFFSET: u32 = 256;

/// Data channels ride on a single component.
const DATA_COMPONENT: u8 = 1;

/// A trickled connectivity hint. Immutable once created.
///
/// `seq` orders candidates from one origin; `(origin, seq)` is the
/// de-duplication key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCandidate {
    pub candidate: String,
    pub origin: EndpointId,
    pub seq: u64,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>, origin: impl Into<EndpointId>, seq: u64) -> Self {
        Self {
            candidate: candidate.into(),
            origin: origin.into(),
            seq,
        }
    }

    /// Host candidate line for `address`:
    /// `candidate:{foundation} {component} udp {priority} {ip} {port} typ host`.
    pub fn host(address: SocketAddr, origin: impl Into<EndpointId>, seq: u64) -> Self {
        let foundation = host_foundation(&address);
        let priority = host_priority(MAX_LOCAL_PREF, DATA_COMPONENT);
        let line = format!(
            "candidate:{} {} udp {} {} {} typ host",
            foundation,
            DATA_COMPONENT,
            priority,
            address.ip(),
            address.port()
        );
        Self::new(line, origin, seq)
    }

    /// Address carried by the candidate line, if it parses.
    pub fn address(&self) -> Option<SocketAddr> {
        let mut parts = self.candidate.split_whitespace().skip(4);
        let ip = parts.next()?.parse().ok()?;
        let port = parts.next()?.parse().ok()?;
        Some(SocketAddr::new(ip, port))
    }
}

impl fmt::Display for IceCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} from {}: {}", self.seq, self.origin, self.candidate)
    }
}

/// Leading 32 bits of SHA-256 over the base type, transport and IP, so the
/// foundation is the same on every build and platform.
fn host_foundation(address: &SocketAddr) -> String {
    let digest = Sha256::digest(format!("Host-udp-{}", address.ip()).as_bytes());
    format!("{:x}", BigEndian::read_u32(&digest[..4]))
}

// RFC 8445 §5.1.2.1
const fn host_priority(local_pref: u16, component_id: u8) -> u32 {
    (HOST_TYPE_PREF << TYPE_PREF_SHIFT)
        | ((local_pref as u32) << LOCAL_PREF_SHIFT)
        | (COMPONENT_OFFSET - component_id as u32)
}
