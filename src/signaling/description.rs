use std::fmt;

use super::EndpointId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SdpType {
    Offer,
    Answer,
}

impl SdpType {
    pub fn as_str(self) -> &'static str {
        match self {
            SdpType::Offer => "offer",
            SdpType::Answer => "answer",
        }
    }
}

impl fmt::Display for SdpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An offer or answer produced by one endpoint.
///
/// `version` increases monotonically per originating endpoint, starting at 1.
/// The `sdp` body is opaque to the negotiation state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub sdp_type: SdpType,
    pub version: u64,
    pub origin: EndpointId,
    pub sdp: String,
}

impl SessionDescription {
    pub fn new(sdp_type: SdpType, version: u64, origin: impl Into<EndpointId>, sdp: String) -> Self {
        Self {
            sdp_type,
            version,
            origin: origin.into(),
            sdp,
        }
    }

    pub fn is_offer(&self) -> bool {
        self.sdp_type == SdpType::Offer
    }
}

impl fmt::Display for SessionDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{} from {}", self.sdp_type, self.version, self.origin)
    }
}
