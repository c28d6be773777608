use bytes::Bytes;

use crate::connection_manager::{ConnectionState, IcePhase, PeerError};
use crate::data_channel::{ChannelId, PayloadKind};
use crate::transfer::TransferId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    Send,
    Receive,
}

/// Everything an endpoint reports to its owner.
#[derive(Debug, Clone)]
pub enum PeerEvent {
    ConnectionStateChanged(ConnectionState),
    IcePhaseChanged(IcePhase),
    ChannelOpened {
        channel: ChannelId,
        label: String,
    },
    /// The peer opened a channel; emitted before its `ChannelOpened`.
    RemoteChannel {
        channel: ChannelId,
        label: String,
    },
    ChannelClosed {
        channel: ChannelId,
    },
    BufferedAmountLow {
        channel: ChannelId,
        buffered: usize,
    },
    Message {
        channel: ChannelId,
        kind: PayloadKind,
        payload: Bytes,
    },
    TransferProgress {
        channel: ChannelId,
        id: TransferId,
        direction: TransferDirection,
        bytes_transferred: u64,
        total_len: u64,
    },
    /// The last chunk of an outbound transfer left the send queue.
    TransferSent {
        channel: ChannelId,
        id: TransferId,
    },
    TransferComplete {
        channel: ChannelId,
        id: TransferId,
        name: String,
        payload: Bytes,
    },
    TransferError {
        channel: ChannelId,
        id: TransferId,
        direction: TransferDirection,
        error: PeerError,
    },
    Error(PeerError),
}
