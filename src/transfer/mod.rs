pub mod protocol;
pub mod receiver;
pub mod sender;

use std::fmt;

pub use protocol::TransferMessage;
pub use receiver::ChunkReceiver;
pub use sender::ChunkSender;

/// Identifies one transfer on a channel. Chosen at random by the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransferId(pub u32);

impl TransferId {
    pub fn random() -> Self {
        Self(rand::random())
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}
