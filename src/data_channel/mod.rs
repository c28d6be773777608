pub mod channel_manager;
pub mod channel_state;
pub mod data_channel;
pub mod frame;

use std::fmt;

pub use channel_manager::ChannelManager;
pub use channel_state::ChannelState;
pub use data_channel::DataChannel;
pub use frame::{DataFrame, PayloadKind};

/// Stream id of a data channel. Even ids belong to the offerer, odd ids to
/// the answerer, so both sides can allocate without colliding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u16);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
