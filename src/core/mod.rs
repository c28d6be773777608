pub mod events;

pub use events::{PeerEvent, TransferDirection};
