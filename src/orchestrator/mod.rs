pub mod pair;

pub use pair::{ConnectionPair, Side, connect_pair};
