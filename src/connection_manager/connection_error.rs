use std::fmt;

use crate::data_channel::ChannelId;
use crate::signaling::protocol::{FrameError, ProtoError};
use crate::transfer::TransferId;

/// Errors surfaced by endpoints, channels and transfers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerError {
    /// The operation is not valid in the current state.
    InvalidState(String),
    StaleDescription { version: u64, latest: u64 },
    ProtocolViolation(String),
    ChannelClosed,
    TransferCancelled,
    NegotiationFailed(String),
    UnknownChannel(ChannelId),
    UnknownTransfer(TransferId),
    MessageTooLarge { size: usize, max: usize },
    Signaling(ProtoError),
}

/// Coarse classification reported alongside error events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidState,
    StaleDescription,
    ProtocolViolation,
    ChannelClosed,
    TransferCancelled,
    NegotiationFailed,
}

impl PeerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PeerError::InvalidState(_)
            | PeerError::UnknownChannel(_)
            | PeerError::UnknownTransfer(_)
            | PeerError::MessageTooLarge { .. } => ErrorKind::InvalidState,
            PeerError::StaleDescription { .. } => ErrorKind::StaleDescription,
            PeerError::ProtocolViolation(_) | PeerError::Signaling(_) => {
                ErrorKind::ProtocolViolation
            }
            PeerError::ChannelClosed => ErrorKind::ChannelClosed,
            PeerError::TransferCancelled => ErrorKind::TransferCancelled,
            PeerError::NegotiationFailed(_) => ErrorKind::NegotiationFailed,
        }
    }

    pub(crate) fn invalid_state(what: impl Into<String>) -> Self {
        PeerError::InvalidState(what.into())
    }
}

impl fmt::Display for PeerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerError::InvalidState(what) => write!(f, "Invalid state: {what}"),
            PeerError::StaleDescription { version, latest } => write!(
                f,
                "Stale description: version {version} is not newer than {latest}"
            ),
            PeerError::ProtocolViolation(what) => write!(f, "Protocol violation: {what}"),
            PeerError::ChannelClosed => write!(f, "Channel closed"),
            PeerError::TransferCancelled => write!(f, "Transfer cancelled"),
            PeerError::NegotiationFailed(why) => write!(f, "Negotiation failed: {why}"),
            PeerError::UnknownChannel(id) => write!(f, "Unknown channel {id}"),
            PeerError::UnknownTransfer(id) => write!(f, "Unknown transfer {id}"),
            PeerError::MessageTooLarge { size, max } => {
                write!(f, "Message of {size} bytes exceeds the {max} byte limit")
            }
            PeerError::Signaling(e) => write!(f, "Signaling error: {e}"),
        }
    }
}

impl std::error::Error for PeerError {}

impl From<ProtoError> for PeerError {
    fn from(e: ProtoError) -> Self {
        PeerError::Signaling(e)
    }
}

impl From<FrameError> for PeerError {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::Proto(p) => PeerError::Signaling(p),
            FrameError::Io(io) => PeerError::NegotiationFailed(format!("signaling transport: {io}")),
        }
    }
}
