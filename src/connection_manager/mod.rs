pub mod connection_error;
pub mod connection_state;
pub mod endpoint;
pub mod ice_phase;
pub mod negotiator;

pub use connection_error::{ErrorKind, PeerError};
pub use connection_state::ConnectionState;
pub use endpoint::Endpoint;
pub use ice_phase::IcePhase;
pub use negotiator::{CandidateDisposition, NegotiationEvent, Negotiator, Role};
