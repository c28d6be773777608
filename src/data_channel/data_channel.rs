use bytes::Bytes;
use std::collections::VecDeque;

use super::{ChannelId, ChannelState, DataFrame, PayloadKind};
use crate::connection_manager::PeerError;
use crate::core::{PeerEvent, TransferDirection};
use crate::transfer::{ChunkReceiver, ChunkSender, TransferId};

/// Receive callback registered with `on_message`.
pub type MessageHandler = Box<dyn FnMut(ChannelId, PayloadKind, &Bytes) + Send>;

/// An encoded frame waiting in a channel's send queue.
#[derive(Debug)]
pub(crate) struct Outgoing {
    pub wire: Vec<u8>,
    /// Message payload bytes counted in the buffered amount.
    pub payload_len: usize,
    pub transfer: Option<TransferId>,
    /// Last frame of the tagged transfer.
    pub completes_transfer: bool,
}

/// One logical duplex pipe and the transfers running over it.
pub struct DataChannel {
    id: ChannelId,
    label: String,
    ordered: bool,
    state: ChannelState,
    locally_initiated: bool,
    open_requested: bool,
    queue: VecDeque<Outgoing>,
    buffered_amount: usize,
    pub(crate) outbound: Option<ChunkSender>,
    pub(crate) inbound: Option<ChunkReceiver>,
    handler: Option<MessageHandler>,
}

impl DataChannel {
    pub(crate) fn new_local(id: ChannelId, label: String, ordered: bool) -> Self {
        Self::new(id, label, ordered, ChannelState::Connecting, true)
    }

    pub(crate) fn new_remote(id: ChannelId, label: String, ordered: bool) -> Self {
        Self::new(id, label, ordered, ChannelState::Open, false)
    }

    fn new(
        id: ChannelId,
        label: String,
        ordered: bool,
        state: ChannelState,
        locally_initiated: bool,
    ) -> Self {
        Self {
            id,
            label,
            ordered,
            state,
            locally_initiated,
            open_requested: !locally_initiated,
            queue: VecDeque::new(),
            buffered_amount: 0,
            outbound: None,
            inbound: None,
            handler: None,
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_ordered(&self) -> bool {
        self.ordered
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn is_locally_initiated(&self) -> bool {
        self.locally_initiated
    }

    /// Queued message payload bytes not yet handed to the transport.
    pub fn buffered_amount(&self) -> usize {
        self.buffered_amount
    }

    pub(crate) fn open_requested(&self) -> bool {
        self.open_requested
    }

    pub(crate) fn mark_open_requested(&mut self) {
        self.open_requested = true;
    }

    pub(crate) fn set_state(&mut self, state: ChannelState) {
        self.state = state;
    }

    pub(crate) fn set_handler(&mut self, handler: MessageHandler) {
        self.handler = Some(handler);
    }

    /// Rejects sends unless the channel is open.
    pub(crate) fn ensure_open(&self) -> Result<(), PeerError> {
        match self.state {
            ChannelState::Open => Ok(()),
            ChannelState::Connecting => Err(PeerError::invalid_state(format!(
                "channel {} is still connecting",
                self.id
            ))),
            ChannelState::Closing | ChannelState::Closed => Err(PeerError::ChannelClosed),
        }
    }

    pub(crate) fn enqueue_message(
        &mut self,
        kind: PayloadKind,
        payload: Bytes,
        transfer: Option<TransferId>,
        completes_transfer: bool,
    ) -> Result<(), PeerError> {
        let payload_len = payload.len();
        let frame = DataFrame::Message {
            stream: self.id.0,
            kind,
            payload,
        };
        let wire = frame
            .serialize()
            .map_err(|e| PeerError::invalid_state(format!("cannot frame message: {e}")))?;
        self.buffered_amount += payload_len;
        self.queue.push_back(Outgoing {
            wire,
            payload_len,
            transfer,
            completes_transfer,
        });
        Ok(())
    }

    /// Queues a non-message frame behind any pending messages.
    pub(crate) fn enqueue_frame(&mut self, frame: &DataFrame) -> Result<(), PeerError> {
        let wire = frame
            .serialize()
            .map_err(|e| PeerError::invalid_state(format!("cannot frame {frame:?}: {e}")))?;
        self.queue.push_back(Outgoing {
            wire,
            payload_len: 0,
            transfer: None,
            completes_transfer: false,
        });
        Ok(())
    }

    pub(crate) fn has_queued(&self) -> bool {
        !self.queue.is_empty()
    }

    pub(crate) fn pop_front(&mut self) -> Option<Outgoing> {
        let out = self.queue.pop_front()?;
        self.buffered_amount -= out.payload_len;
        Some(out)
    }

    /// Drops every queued frame of `id`.
    pub(crate) fn purge_transfer(&mut self, id: TransferId) -> usize {
        let before = self.queue.len();
        let mut freed = 0;
        self.queue.retain(|out| {
            let keep = out.transfer != Some(id);
            if !keep {
                freed += out.payload_len;
            }
            keep
        });
        self.buffered_amount -= freed;
        before - self.queue.len()
    }

    pub(crate) fn clear_queue(&mut self) {
        self.queue.clear();
        self.buffered_amount = 0;
    }

    pub(crate) fn deliver(&mut self, kind: PayloadKind, payload: &Bytes) {
        if let Some(handler) = self.handler.as_mut() {
            handler(self.id, kind, payload);
        }
    }

    /// Terminates both transfer directions with `error`, purging queued chunks.
    /// Returns the error events to report.
    pub(crate) fn abort_transfers(&mut self, error: &PeerError) -> Vec<PeerEvent> {
        let mut events = Vec::new();
        if let Some(mut sender) = self.outbound.take() {
            sender.cancel();
            self.purge_transfer(sender.id());
            events.push(PeerEvent::TransferError {
                channel: self.id,
                id: sender.id(),
                direction: TransferDirection::Send,
                error: error.clone(),
            });
        }
        if let Some(mut receiver) = self.inbound.take() {
            receiver.discard();
            events.push(PeerEvent::TransferError {
                channel: self.id,
                id: receiver.id(),
                direction: TransferDirection::Receive,
                error: error.clone(),
            });
        }
        events
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn buffered_amount_tracks_message_payloads_only() {
        let mut chan = DataChannel::new_remote(ChannelId(1), "chat".into(), true);
        chan.enqueue_message(PayloadKind::Text, Bytes::from_static(b"hello"), None, false)
            .expect("queue");
        chan.enqueue_frame(&DataFrame::Close { stream: 1 })
            .expect("queue");
        assert_eq!(chan.buffered_amount(), 5);

        chan.pop_front().expect("message");
        assert_eq!(chan.buffered_amount(), 0);
        chan.pop_front().expect("close");
        assert!(!chan.has_queued());
    }

    #[test]
    fn purge_only_touches_the_tagged_transfer() {
        let mut chan = DataChannel::new_remote(ChannelId(3), "files".into(), true);
        let (a, b) = (TransferId(1), TransferId(2));
        chan.enqueue_message(PayloadKind::Transfer, Bytes::from(vec![0u8; 10]), Some(a), false)
            .expect("queue");
        chan.enqueue_message(PayloadKind::Transfer, Bytes::from(vec![0u8; 20]), Some(b), false)
            .expect("queue");
        chan.enqueue_message(PayloadKind::Transfer, Bytes::from(vec![0u8; 30]), Some(a), true)
            .expect("queue");

        assert_eq!(chan.purge_transfer(a), 2);
        assert_eq!(chan.buffered_amount(), 20);
    }

    #[test]
    fn sends_depend_on_state() {
        let mut chan = DataChannel::new_local(ChannelId(0), "x".into(), true);
        assert!(matches!(chan.ensure_open(), Err(PeerError::InvalidState(_))));
        chan.set_state(ChannelState::Open);
        assert!(chan.ensure_open().is_ok());
        chan.set_state(ChannelState::Closing);
        assert_eq!(chan.ensure_open(), Err(PeerError::ChannelClosed));
    }
}
