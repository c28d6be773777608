use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use std::sync::mpsc::Sender;

use super::data_channel::MessageHandler;
use super::{ChannelId, ChannelState, DataChannel, DataFrame, PayloadKind};
use crate::config::PeerConfig;
use crate::connection_manager::{PeerError, Role};
use crate::core::{PeerEvent, TransferDirection};
use crate::log::log_sink::LogSink;
use crate::signaling::EndpointId;
use crate::transfer::{ChunkReceiver, ChunkSender, TransferId, TransferMessage};
use crate::{sink_debug, sink_error, sink_info, sink_trace, sink_warn};

/// Callback invoked when the peer opens a channel.
pub type RemoteChannelHandler = Box<dyn FnMut(ChannelId, &str) + Send>;

/// Owns the data channels of one endpoint and schedules their frames.
///
/// Control frames (open/close handshakes) leave first; channel queues are
/// then served round-robin, one frame per turn. Outbound transfers are
/// refilled whenever their channel's buffered amount is at or below the
/// low-water mark, so a channel never buffers more than the mark plus one
/// chunk message.
///
/// Streams that finished closing are remembered so later calls on them
/// fail with `ChannelClosed` rather than `UnknownChannel`.
pub struct ChannelManager {
    owner: EndpointId,
    channels: BTreeMap<u16, DataChannel>,
    closed: BTreeSet<u16>,
    control: VecDeque<Vec<u8>>,
    role: Option<Role>,
    next_index: u16,
    last_served: Option<u16>,
    connected: bool,
    chunk_size: usize,
    low_water_mark: usize,
    max_message_size: usize,
    remote_handler: Option<RemoteChannelHandler>,
    events: Sender<PeerEvent>,
    log_sink: Arc<dyn LogSink>,
}

fn emit(events: &Sender<PeerEvent>, event: PeerEvent) {
    // A dropped receiver only means nobody is listening.
    let _ = events.send(event);
}

fn lookup<'a>(
    channels: &'a mut BTreeMap<u16, DataChannel>,
    closed: &BTreeSet<u16>,
    id: ChannelId,
) -> Result<&'a mut DataChannel, PeerError> {
    match channels.get_mut(&id.0) {
        Some(chan) => Ok(chan),
        None if closed.contains(&id.0) => Err(PeerError::ChannelClosed),
        None => Err(PeerError::UnknownChannel(id)),
    }
}

impl ChannelManager {
    pub fn new(
        owner: impl Into<EndpointId>,
        config: &PeerConfig,
        events: Sender<PeerEvent>,
        log_sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            owner: owner.into(),
            channels: BTreeMap::new(),
            closed: BTreeSet::new(),
            control: VecDeque::new(),
            role: None,
            next_index: 0,
            last_served: None,
            connected: false,
            chunk_size: config.chunk_size,
            low_water_mark: config.low_water_mark,
            max_message_size: config.max_message_size,
            remote_handler: None,
            events,
            log_sink,
        }
    }

    pub fn channel(&self, id: ChannelId) -> Option<&DataChannel> {
        self.channels.get(&id.0)
    }

    pub fn channel_ids(&self) -> Vec<ChannelId> {
        self.channels.values().map(DataChannel::id).collect()
    }

    pub fn channel_state(&self, id: ChannelId) -> Option<ChannelState> {
        self.channel(id)
            .map(DataChannel::state)
            .or_else(|| self.closed.contains(&id.0).then_some(ChannelState::Closed))
    }

    pub fn buffered_amount(&self, id: ChannelId) -> Option<usize> {
        self.channel(id).map(DataChannel::buffered_amount)
    }

    pub fn low_water_mark(&self) -> usize {
        self.low_water_mark
    }

    /// Channel ids of this side have the parity of its role.
    pub fn create_channel(
        &mut self,
        label: &str,
        ordered: bool,
        role: Role,
    ) -> Result<ChannelId, PeerError> {
        if label.len() > u16::MAX as usize {
            return Err(PeerError::invalid_state("channel label too long"));
        }
        if self.channels.values().any(|c| c.label() == label) {
            return Err(PeerError::invalid_state(format!(
                "a channel labelled {label:?} already exists"
            )));
        }
        let stream = self.allocate_stream(role)?;
        let id = ChannelId(stream);
        self.role = Some(role);
        self.channels
            .insert(stream, DataChannel::new_local(id, label.to_owned(), ordered));
        sink_debug!(
            self.log_sink,
            "[CHANNELS] {} created channel {} {:?} (ordered={})",
            self.owner,
            id,
            label,
            ordered
        );
        if self.connected {
            self.request_open(stream)?;
        }
        Ok(id)
    }

    fn allocate_stream(&mut self, role: Role) -> Result<u16, PeerError> {
        let parity = role_parity(role);
        loop {
            let stream = self
                .next_index
                .checked_mul(2)
                .and_then(|s| s.checked_add(parity))
                .ok_or_else(|| PeerError::invalid_state("stream ids exhausted"))?;
            self.next_index += 1;
            if !self.channels.contains_key(&stream) {
                return Ok(stream);
            }
        }
    }

    fn request_open(&mut self, stream: u16) -> Result<(), PeerError> {
        let Some(chan) = self.channels.get_mut(&stream) else {
            return Ok(());
        };
        let frame = DataFrame::Open {
            stream,
            ordered: chan.is_ordered(),
            label: chan.label().to_owned(),
        };
        let wire = frame
            .serialize()
            .map_err(|e| PeerError::invalid_state(format!("cannot frame open request: {e}")))?;
        chan.mark_open_requested();
        self.control.push_back(wire);
        Ok(())
    }

    fn queue_control(&mut self, frame: &DataFrame) {
        match frame.serialize() {
            Ok(wire) => self.control.push_back(wire),
            Err(e) => sink_error!(self.log_sink, "[CHANNELS] cannot frame {:?}: {}", frame, e),
        }
    }

    /// The connection is up: send the open requests held back so far.
    pub fn on_connected(&mut self, role: Role) {
        self.connected = true;
        self.role = Some(role);
        let pending: Vec<u16> = self
            .channels
            .iter()
            .filter(|(_, c)| c.is_locally_initiated() && !c.open_requested())
            .map(|(s, _)| *s)
            .collect();
        for stream in pending {
            if let Err(e) = self.request_open(stream) {
                sink_error!(self.log_sink, "[CHANNELS] {} open #{}: {}", self.owner, stream, e);
            }
        }
    }

    /// Drops channels whose open request never left, e.g. after a rollback.
    pub fn drop_unopened(&mut self) {
        let unopened: Vec<u16> = self
            .channels
            .iter()
            .filter(|(_, c)| !c.open_requested())
            .map(|(s, _)| *s)
            .collect();
        for stream in unopened {
            self.channels.remove(&stream);
            self.closed.insert(stream);
            emit(
                &self.events,
                PeerEvent::ChannelClosed {
                    channel: ChannelId(stream),
                },
            );
        }
    }

    /// Closes every channel at once; no frames are sent.
    pub fn shutdown(&mut self) {
        self.connected = false;
        self.control.clear();
        for (stream, mut chan) in std::mem::take(&mut self.channels) {
            self.closed.insert(stream);
            for event in chan.abort_transfers(&PeerError::ChannelClosed) {
                emit(&self.events, event);
            }
            chan.clear_queue();
            chan.set_state(ChannelState::Closed);
            emit(&self.events, PeerEvent::ChannelClosed { channel: chan.id() });
        }
        sink_debug!(self.log_sink, "[CHANNELS] {} shut down all channels", self.owner);
    }

    pub fn on_remote_channel(&mut self, handler: RemoteChannelHandler) {
        self.remote_handler = Some(handler);
    }

    pub fn on_message(&mut self, id: ChannelId, handler: MessageHandler) -> Result<(), PeerError> {
        let chan = lookup(&mut self.channels, &self.closed, id)?;
        chan.set_handler(handler);
        Ok(())
    }

    pub fn send(&mut self, id: ChannelId, kind: PayloadKind, payload: Bytes) -> Result<(), PeerError> {
        let chan = lookup(&mut self.channels, &self.closed, id)?;
        chan.ensure_open()?;
        if payload.len() > self.max_message_size {
            return Err(PeerError::MessageTooLarge {
                size: payload.len(),
                max: self.max_message_size,
            });
        }
        sink_trace!(self.log_sink, "[CHANNELS] {} queue {} bytes on {}", self.owner, payload.len(), id);
        chan.enqueue_message(kind, payload, None, false)
    }

    pub fn start_transfer(
        &mut self,
        id: ChannelId,
        name: &str,
        payload: Bytes,
    ) -> Result<TransferId, PeerError> {
        let chan = lookup(&mut self.channels, &self.closed, id)?;
        chan.ensure_open()?;
        if !chan.is_ordered() {
            return Err(PeerError::invalid_state(format!(
                "transfers need an ordered channel, {id} is unordered"
            )));
        }
        if chan.outbound.is_some() {
            return Err(PeerError::invalid_state(format!(
                "channel {id} already has an outbound transfer"
            )));
        }

        let transfer = TransferId::random();
        let sender = ChunkSender::new(transfer, name, payload, self.chunk_size);
        let header = sender
            .header()
            .serialize()
            .map_err(|e| PeerError::invalid_state(format!("cannot encode transfer header: {e}")))?;
        if header.len() > self.max_message_size {
            return Err(PeerError::MessageTooLarge {
                size: header.len(),
                max: self.max_message_size,
            });
        }
        let total = sender.total_len();
        chan.enqueue_message(
            PayloadKind::Transfer,
            Bytes::from(header),
            Some(transfer),
            sender.is_finished(),
        )?;
        chan.outbound = Some(sender);
        sink_info!(
            self.log_sink,
            "[CHANNELS] {} transfer {} started on {}: {:?}, {} bytes",
            self.owner,
            transfer,
            id,
            name,
            total
        );
        self.refill(id.0);
        Ok(transfer)
    }

    /// Queues chunks of the channel's outbound transfer while the buffered
    /// amount is at or below the low-water mark.
    fn refill(&mut self, stream: u16) {
        let Some(chan) = self.channels.get_mut(&stream) else {
            return;
        };
        let channel = chan.id();
        while chan.buffered_amount() <= self.low_water_mark {
            let Some(sender) = chan.outbound.as_mut() else {
                return;
            };
            let Some(chunk) = sender.next_chunk() else {
                return;
            };
            let (transfer, sent, total) = (sender.id(), sender.bytes_transferred(), sender.total_len());
            let last = sender.is_finished();
            let queued = chunk
                .serialize()
                .map_err(|e| PeerError::invalid_state(format!("cannot encode chunk: {e}")))
                .and_then(|wire| {
                    chan.enqueue_message(PayloadKind::Transfer, Bytes::from(wire), Some(transfer), last)
                });
            if let Err(error) = queued {
                sink_error!(self.log_sink, "[CHANNELS] transfer {} aborted: {}", transfer, error);
                for event in chan.abort_transfers(&error) {
                    emit(&self.events, event);
                }
                return;
            }
            emit(
                &self.events,
                PeerEvent::TransferProgress {
                    channel,
                    id: transfer,
                    direction: TransferDirection::Send,
                    bytes_transferred: sent,
                    total_len: total,
                },
            );
        }
    }

    /// Cancels a transfer in either direction and tells the peer.
    pub fn cancel_transfer(&mut self, transfer: TransferId) -> Result<(), PeerError> {
        let Some(chan) = self.channels.values_mut().find(|c| {
            c.outbound.as_ref().is_some_and(|s| s.id() == transfer)
                || c.inbound.as_ref().is_some_and(|r| r.id() == transfer)
        }) else {
            return Err(PeerError::UnknownTransfer(transfer));
        };
        let channel = chan.id();

        let direction = if let Some(mut sender) = chan
            .outbound
            .take_if(|s| s.id() == transfer)
        {
            sender.cancel();
            let purged = chan.purge_transfer(transfer);
            sink_info!(
                self.log_sink,
                "[CHANNELS] {} cancelled outbound {} after {} bytes ({} frames purged)",
                self.owner,
                transfer,
                sender.bytes_transferred(),
                purged
            );
            TransferDirection::Send
        } else {
            if let Some(mut receiver) = chan.inbound.take() {
                receiver.discard();
            }
            sink_info!(self.log_sink, "[CHANNELS] {} cancelled inbound {}", self.owner, transfer);
            TransferDirection::Receive
        };

        send_cancel(chan, transfer, &self.log_sink);
        emit(
            &self.events,
            PeerEvent::TransferError {
                channel,
                id: transfer,
                direction,
                error: PeerError::TransferCancelled,
            },
        );
        Ok(())
    }

    /// Starts the close handshake. Queued messages still go out before the
    /// close request; transfers end immediately.
    pub fn close_channel(&mut self, id: ChannelId) -> Result<(), PeerError> {
        if self.closed.contains(&id.0) {
            return Ok(());
        }
        let chan = lookup(&mut self.channels, &self.closed, id)?;
        match chan.state() {
            ChannelState::Closing | ChannelState::Closed => return Ok(()),
            ChannelState::Connecting if !chan.open_requested() => {
                self.channels.remove(&id.0);
                self.closed.insert(id.0);
                emit(&self.events, PeerEvent::ChannelClosed { channel: id });
                return Ok(());
            }
            ChannelState::Connecting | ChannelState::Open => {}
        }

        for event in chan.abort_transfers(&PeerError::ChannelClosed) {
            emit(&self.events, event);
        }
        chan.enqueue_frame(&DataFrame::Close { stream: id.0 })?;
        chan.set_state(ChannelState::Closing);
        sink_debug!(self.log_sink, "[CHANNELS] {} closing {}", self.owner, id);
        Ok(())
    }

    /// Next encoded frame for the transport.
    pub fn poll_transmit(&mut self) -> Option<Vec<u8>> {
        if let Some(wire) = self.control.pop_front() {
            return Some(wire);
        }

        let stream = self.next_ready_stream()?;
        let chan = self.channels.get_mut(&stream)?;
        let before = chan.buffered_amount();
        let out = chan.pop_front()?;
        let after = chan.buffered_amount();
        let channel = chan.id();
        self.last_served = Some(stream);

        if out.completes_transfer
            && let Some(transfer) = out.transfer
        {
            if chan.outbound.as_ref().is_some_and(|s| s.id() == transfer) {
                chan.outbound = None;
            }
            sink_info!(self.log_sink, "[CHANNELS] {} transfer {} fully sent", self.owner, transfer);
            emit(
                &self.events,
                PeerEvent::TransferSent {
                    channel,
                    id: transfer,
                },
            );
        }
        if before > self.low_water_mark && after <= self.low_water_mark {
            emit(
                &self.events,
                PeerEvent::BufferedAmountLow {
                    channel,
                    buffered: after,
                },
            );
        }
        self.refill(stream);
        Some(out.wire)
    }

    /// Round-robin: the first ready stream after the one served last.
    fn next_ready_stream(&self) -> Option<u16> {
        let mut ready = self
            .channels
            .iter()
            .filter(|(_, c)| c.has_queued())
            .map(|(s, _)| *s)
            .peekable();
        let first = *ready.peek()?;
        Some(
            ready
                .find(|s| Some(*s) > self.last_served)
                .unwrap_or(first),
        )
    }

    /// Decodes and applies one incoming frame.
    pub fn handle_datagram(&mut self, data: &[u8]) -> Result<(), PeerError> {
        let bytes = Bytes::copy_from_slice(data);
        let frame = DataFrame::deserialize(&bytes)
            .map_err(|e| PeerError::ProtocolViolation(format!("malformed frame: {e}")))?;
        sink_trace!(self.log_sink, "[CHANNELS] {} <- frame on stream {}", self.owner, frame.stream());
        match frame {
            DataFrame::Open {
                stream,
                ordered,
                label,
            } => self.on_open(stream, ordered, label),
            DataFrame::OpenAck { stream } => self.on_open_ack(stream),
            DataFrame::Message {
                stream,
                kind,
                payload,
            } => self.on_channel_message(stream, kind, payload),
            DataFrame::Close { stream } => self.on_close(stream),
            DataFrame::CloseAck { stream } => self.on_close_ack(stream),
        }
    }

    fn on_open(&mut self, stream: u16, ordered: bool, label: String) -> Result<(), PeerError> {
        if self.channels.contains_key(&stream) {
            return Err(PeerError::ProtocolViolation(format!(
                "open request for stream {stream} already in use"
            )));
        }
        if let Some(role) = self.role
            && stream % 2 == role_parity(role)
        {
            return Err(PeerError::ProtocolViolation(format!(
                "peer opened stream {stream} with our parity"
            )));
        }
        if self.channels.values().any(|c| c.label() == label) {
            // Both sides opened this label at once. The peer refuses ours
            // the same way.
            sink_warn!(self.log_sink, "[CHANNELS] {} refusing stream {}: label {:?} in use", self.owner, stream, label);
            self.queue_control(&DataFrame::Close { stream });
            return Err(PeerError::ProtocolViolation(format!(
                "peer reused label {label:?}"
            )));
        }

        let id = ChannelId(stream);
        self.closed.remove(&stream);
        self.channels
            .insert(stream, DataChannel::new_remote(id, label.clone(), ordered));
        self.queue_control(&DataFrame::OpenAck { stream });
        sink_info!(self.log_sink, "[CHANNELS] {} accepted remote channel {} {:?}", self.owner, id, label);

        emit(
            &self.events,
            PeerEvent::RemoteChannel {
                channel: id,
                label: label.clone(),
            },
        );
        if let Some(handler) = self.remote_handler.as_mut() {
            handler(id, &label);
        }
        emit(&self.events, PeerEvent::ChannelOpened { channel: id, label });
        Ok(())
    }

    fn on_open_ack(&mut self, stream: u16) -> Result<(), PeerError> {
        let chan = self.channels.get_mut(&stream).ok_or_else(|| {
            PeerError::ProtocolViolation(format!("open ack for unknown stream {stream}"))
        })?;
        match chan.state() {
            ChannelState::Connecting if chan.is_locally_initiated() => {
                chan.set_state(ChannelState::Open);
                sink_info!(self.log_sink, "[CHANNELS] {} channel {} open", self.owner, chan.id());
                emit(
                    &self.events,
                    PeerEvent::ChannelOpened {
                        channel: chan.id(),
                        label: chan.label().to_owned(),
                    },
                );
                Ok(())
            }
            // Closed locally before the peer answered.
            ChannelState::Closing => Ok(()),
            state => Err(PeerError::ProtocolViolation(format!(
                "unexpected open ack on {state} stream {stream}"
            ))),
        }
    }

    fn on_channel_message(
        &mut self,
        stream: u16,
        kind: PayloadKind,
        payload: Bytes,
    ) -> Result<(), PeerError> {
        let chan = self.channels.get_mut(&stream).ok_or_else(|| {
            PeerError::ProtocolViolation(format!("message on unknown stream {stream}"))
        })?;
        match chan.state() {
            ChannelState::Open => {}
            ChannelState::Closing => {
                sink_debug!(self.log_sink, "[CHANNELS] {} dropping message on closing {}", self.owner, chan.id());
                return Ok(());
            }
            state => {
                return Err(PeerError::ProtocolViolation(format!(
                    "message on {state} channel {}",
                    chan.id()
                )));
            }
        }

        match kind {
            PayloadKind::Text | PayloadKind::Binary => {
                chan.deliver(kind, &payload);
                emit(
                    &self.events,
                    PeerEvent::Message {
                        channel: chan.id(),
                        kind,
                        payload,
                    },
                );
                Ok(())
            }
            PayloadKind::Transfer => {
                let msg = TransferMessage::deserialize(&payload).map_err(|e| {
                    PeerError::ProtocolViolation(format!("malformed transfer message: {e}"))
                })?;
                self.on_transfer_message(stream, msg);
                Ok(())
            }
        }
    }

    /// Transfer faults end only the affected session; they are reported as
    /// events and the peer is told to cancel.
    fn on_transfer_message(&mut self, stream: u16, msg: TransferMessage) {
        let Some(chan) = self.channels.get_mut(&stream) else {
            return;
        };
        let channel = chan.id();
        match msg {
            TransferMessage::Header {
                id,
                total_len,
                chunk_size,
                name,
                digest,
            } => {
                let accepted = if !chan.is_ordered() {
                    Err(PeerError::ProtocolViolation(format!(
                        "transfer {id} on unordered channel {channel}"
                    )))
                } else if chan.inbound.is_some() {
                    Err(PeerError::ProtocolViolation(format!(
                        "transfer {id} while another is in progress on {channel}"
                    )))
                } else {
                    ChunkReceiver::new(id, name, total_len, chunk_size, digest)
                };
                match accepted {
                    Ok(receiver) => {
                        sink_info!(
                            self.log_sink,
                            "[CHANNELS] {} incoming transfer {} on {}: {:?}, {} bytes",
                            self.owner,
                            id,
                            channel,
                            receiver.name(),
                            total_len
                        );
                        chan.inbound = Some(receiver);
                        self.poll_inbound(stream);
                    }
                    Err(error) => self.reject_inbound(stream, id, error),
                }
            }
            TransferMessage::Chunk { id, seq, payload } => {
                let Some(receiver) = chan.inbound.as_mut().filter(|r| r.id() == id) else {
                    sink_debug!(self.log_sink, "[CHANNELS] {} dropping chunk {} of inactive {}", self.owner, seq, id);
                    return;
                };
                match receiver.accept(seq, payload) {
                    Ok(received) => {
                        emit(
                            &self.events,
                            PeerEvent::TransferProgress {
                                channel,
                                id,
                                direction: TransferDirection::Receive,
                                bytes_transferred: received,
                                total_len: receiver.total_len(),
                            },
                        );
                        self.poll_inbound(stream);
                    }
                    Err(error) => {
                        if let Some(mut receiver) = chan.inbound.take() {
                            receiver.discard();
                        }
                        self.reject_inbound(stream, id, error);
                    }
                }
            }
            TransferMessage::Cancel { id } => {
                if let Some(mut sender) = chan.outbound.take_if(|s| s.id() == id) {
                    sender.cancel();
                    chan.purge_transfer(id);
                    sink_info!(self.log_sink, "[CHANNELS] {} peer cancelled outbound {}", self.owner, id);
                    emit(
                        &self.events,
                        PeerEvent::TransferError {
                            channel,
                            id,
                            direction: TransferDirection::Send,
                            error: PeerError::TransferCancelled,
                        },
                    );
                } else if let Some(mut receiver) = chan.inbound.take_if(|r| r.id() == id) {
                    receiver.discard();
                    sink_info!(self.log_sink, "[CHANNELS] {} peer cancelled inbound {}", self.owner, id);
                    emit(
                        &self.events,
                        PeerEvent::TransferError {
                            channel,
                            id,
                            direction: TransferDirection::Receive,
                            error: PeerError::TransferCancelled,
                        },
                    );
                } else {
                    sink_debug!(self.log_sink, "[CHANNELS] {} cancel for inactive {}", self.owner, id);
                }
            }
        }
    }

    fn poll_inbound(&mut self, stream: u16) {
        let Some(chan) = self.channels.get_mut(&stream) else {
            return;
        };
        let Some(receiver) = chan.inbound.as_mut() else {
            return;
        };
        let id = receiver.id();
        match receiver.poll_complete() {
            Ok(None) => {}
            Ok(Some(payload)) => {
                let name = receiver.name().to_owned();
                chan.inbound = None;
                sink_info!(self.log_sink, "[CHANNELS] {} transfer {} complete ({} bytes)", self.owner, id, payload.len());
                emit(
                    &self.events,
                    PeerEvent::TransferComplete {
                        channel: chan.id(),
                        id,
                        name,
                        payload,
                    },
                );
            }
            Err(error) => {
                chan.inbound = None;
                self.reject_inbound(stream, id, error);
            }
        }
    }

    fn reject_inbound(&mut self, stream: u16, id: TransferId, error: PeerError) {
        let Some(chan) = self.channels.get_mut(&stream) else {
            return;
        };
        sink_warn!(self.log_sink, "[CHANNELS] {} rejecting transfer {}: {}", self.owner, id, error);
        send_cancel(chan, id, &self.log_sink);
        emit(
            &self.events,
            PeerEvent::TransferError {
                channel: chan.id(),
                id,
                direction: TransferDirection::Receive,
                error,
            },
        );
    }

    fn on_close(&mut self, stream: u16) -> Result<(), PeerError> {
        let Some(mut chan) = self.channels.remove(&stream) else {
            if self.closed.contains(&stream) {
                self.queue_control(&DataFrame::CloseAck { stream });
                return Ok(());
            }
            return Err(PeerError::ProtocolViolation(format!(
                "close for unknown stream {stream}"
            )));
        };
        for event in chan.abort_transfers(&PeerError::ChannelClosed) {
            emit(&self.events, event);
        }
        chan.clear_queue();
        chan.set_state(ChannelState::Closed);
        self.closed.insert(stream);
        self.queue_control(&DataFrame::CloseAck { stream });
        sink_info!(self.log_sink, "[CHANNELS] {} peer closed {}", self.owner, chan.id());
        emit(&self.events, PeerEvent::ChannelClosed { channel: chan.id() });
        Ok(())
    }

    fn on_close_ack(&mut self, stream: u16) -> Result<(), PeerError> {
        match self.channels.get(&stream).map(DataChannel::state) {
            // Both sides closed at once; the channel is already gone.
            None => Ok(()),
            Some(ChannelState::Closing) => {
                self.channels.remove(&stream);
                self.closed.insert(stream);
                sink_info!(self.log_sink, "[CHANNELS] {} channel #{} closed", self.owner, stream);
                emit(
                    &self.events,
                    PeerEvent::ChannelClosed {
                        channel: ChannelId(stream),
                    },
                );
                Ok(())
            }
            Some(state) => Err(PeerError::ProtocolViolation(format!(
                "close ack on {state} stream {stream}"
            ))),
        }
    }
}

fn role_parity(role: Role) -> u16 {
    match role {
        Role::Offerer => 0,
        Role::Answerer => 1,
    }
}

fn send_cancel(chan: &mut DataChannel, id: TransferId, log_sink: &Arc<dyn LogSink>) {
    let queued = TransferMessage::Cancel { id }
        .serialize()
        .map_err(|e| PeerError::invalid_state(e.to_string()))
        .and_then(|wire| chan.enqueue_message(PayloadKind::Transfer, Bytes::from(wire), None, false));
    if let Err(e) = queued {
        sink_error!(log_sink, "[CHANNELS] cannot queue cancel for {}: {}", id, e);
    }
}
