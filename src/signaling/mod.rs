pub mod candidate;
pub mod description;
pub mod protocol;
pub mod transport;

/// Identifier of one negotiating endpoint.
pub type EndpointId = String;

pub use candidate::IceCandidate;
pub use description::{SdpType, SessionDescription};
pub use transport::{LoopbackSignaling, SignalingTransport, StreamSignaling};
