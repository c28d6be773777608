use bytes::Bytes;
use std::sync::Arc;
use std::sync::mpsc::Sender;

use super::{
    CandidateDisposition, ConnectionState, IcePhase, NegotiationEvent, Negotiator, PeerError,
};
use crate::config::PeerConfig;
use crate::core::PeerEvent;
use crate::data_channel::{ChannelId, ChannelManager, ChannelState, PayloadKind};
use crate::log::log_sink::LogSink;
use crate::signaling::protocol::SignalingMsg;
use crate::signaling::{IceCandidate, SessionDescription};
use crate::transfer::TransferId;
use crate::{sink_info, sink_warn};

/// One side of a peer connection.
///
/// Wraps the negotiation state machine and the channels riding on it.
/// Every state change, channel event and transfer update is reported on the
/// `PeerEvent` sender given at construction.
pub struct Endpoint {
    negotiator: Negotiator,
    channels: ChannelManager,
    events: Sender<PeerEvent>,
    log_sink: Arc<dyn LogSink>,
}

impl Endpoint {
    pub fn new(
        id: &str,
        config: &PeerConfig,
        events: Sender<PeerEvent>,
        log_sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            negotiator: Negotiator::new(
                id,
                config.host_candidates.clone(),
                config.max_message_size,
                log_sink.clone(),
            ),
            channels: ChannelManager::new(id, config, events.clone(), log_sink.clone()),
            events,
            log_sink,
        }
    }

    pub fn id(&self) -> &str {
        self.negotiator.id()
    }

    pub fn state(&self) -> ConnectionState {
        self.negotiator.state()
    }

    pub fn ice_phase(&self) -> IcePhase {
        self.negotiator.ice_phase()
    }

    pub fn negotiator(&self) -> &Negotiator {
        &self.negotiator
    }

    pub fn create_offer(&mut self) -> Result<SessionDescription, PeerError> {
        let result = self.negotiator.create_offer();
        self.sync();
        result
    }

    pub fn create_answer(&mut self) -> Result<SessionDescription, PeerError> {
        let result = self.negotiator.create_answer();
        self.sync();
        result
    }

    pub fn set_local_description(&mut self, desc: SessionDescription) -> Result<(), PeerError> {
        let result = self.negotiator.set_local_description(desc);
        self.sync();
        result
    }

    pub fn set_remote_description(&mut self, desc: SessionDescription) -> Result<(), PeerError> {
        let result = self.negotiator.set_remote_description(desc);
        self.sync();
        result
    }

    pub fn add_ice_candidate(
        &mut self,
        candidate: IceCandidate,
    ) -> Result<CandidateDisposition, PeerError> {
        let result = self.negotiator.add_ice_candidate(candidate);
        self.sync();
        result
    }

    pub fn take_local_candidates(&mut self) -> Vec<IceCandidate> {
        self.negotiator.take_local_candidates()
    }

    /// Abandons the current offer/answer cycle. Channels whose open request
    /// never left are closed.
    pub fn rollback(&mut self) -> Result<(), PeerError> {
        let result = self.negotiator.rollback();
        if result.is_ok() {
            self.channels.drop_unopened();
        }
        self.sync();
        result
    }

    pub fn close(&mut self) {
        self.negotiator.close();
        self.sync();
    }

    pub fn fail(&mut self, reason: &str) {
        self.negotiator.fail(reason);
        self.sync();
    }

    /// Applies a message delivered by signaling.
    pub fn handle_signaling(&mut self, msg: SignalingMsg) -> Result<(), PeerError> {
        if msg.to() != self.id() {
            return Err(PeerError::ProtocolViolation(format!(
                "message for {} delivered to {}",
                msg.to(),
                self.id()
            )));
        }
        match msg {
            SignalingMsg::Bye { from, reason, .. } => {
                sink_info!(
                    self.log_sink,
                    "[ENDPOINT] {} bye from {}: {}",
                    self.id(),
                    from,
                    reason.as_deref().unwrap_or("-")
                );
                self.close();
                Ok(())
            }
            msg @ SignalingMsg::Candidate { .. } => {
                if let Some(candidate) = msg.into_candidate() {
                    self.add_ice_candidate(candidate)?;
                }
                Ok(())
            }
            msg => match msg.into_description() {
                Some(desc) => self.set_remote_description(desc),
                None => Ok(()),
            },
        }
    }

    pub fn create_channel(&mut self, label: &str, ordered: bool) -> Result<ChannelId, PeerError> {
        let state = self.state();
        if !state.allows_channels() {
            return Err(PeerError::invalid_state(format!("create_channel in {state}")));
        }
        let role = self
            .negotiator
            .role()
            .ok_or_else(|| PeerError::invalid_state("no offer/answer role yet"))?;
        self.channels.create_channel(label, ordered, role)
    }

    pub fn on_remote_channel<F>(&mut self, handler: F)
    where
        F: FnMut(ChannelId, &str) + Send + 'static,
    {
        self.channels.on_remote_channel(Box::new(handler));
    }

    pub fn on_message<F>(&mut self, channel: ChannelId, handler: F) -> Result<(), PeerError>
    where
        F: FnMut(ChannelId, PayloadKind, &Bytes) + Send + 'static,
    {
        self.channels.on_message(channel, Box::new(handler))
    }

    pub fn send(&mut self, channel: ChannelId, payload: impl Into<Bytes>) -> Result<(), PeerError> {
        self.channels
            .send(channel, PayloadKind::Binary, payload.into())
    }

    pub fn send_text(&mut self, channel: ChannelId, text: &str) -> Result<(), PeerError> {
        self.channels.send(
            channel,
            PayloadKind::Text,
            Bytes::copy_from_slice(text.as_bytes()),
        )
    }

    pub fn close_channel(&mut self, channel: ChannelId) -> Result<(), PeerError> {
        self.channels.close_channel(channel)
    }

    pub fn start_transfer(
        &mut self,
        channel: ChannelId,
        payload: impl Into<Bytes>,
    ) -> Result<TransferId, PeerError> {
        self.channels.start_transfer(channel, "", payload.into())
    }

    pub fn start_named_transfer(
        &mut self,
        channel: ChannelId,
        name: &str,
        payload: impl Into<Bytes>,
    ) -> Result<TransferId, PeerError> {
        self.channels.start_transfer(channel, name, payload.into())
    }

    pub fn cancel_transfer(&mut self, id: TransferId) -> Result<(), PeerError> {
        self.channels.cancel_transfer(id)
    }

    pub fn channel_state(&self, channel: ChannelId) -> Option<ChannelState> {
        self.channels.channel_state(channel)
    }

    pub fn buffered_amount(&self, channel: ChannelId) -> Option<usize> {
        self.channels.buffered_amount(channel)
    }

    pub fn channels(&self) -> &ChannelManager {
        &self.channels
    }

    /// Next frame to put on the wire; nothing leaves before `connected`.
    pub fn poll_transmit(&mut self) -> Option<Vec<u8>> {
        if self.state() != ConnectionState::Connected {
            return None;
        }
        self.channels.poll_transmit()
    }

    /// Applies a frame from the peer. Faults are returned and also reported
    /// as `PeerEvent::Error`.
    pub fn handle_datagram(&mut self, data: &[u8]) -> Result<(), PeerError> {
        let state = self.state();
        let result = if state == ConnectionState::Connected {
            self.channels.handle_datagram(data)
        } else {
            Err(PeerError::invalid_state(format!("frame received in {state}")))
        };
        if let Err(e) = &result {
            sink_warn!(self.log_sink, "[ENDPOINT] {} frame rejected: {}", self.id(), e);
            let _ = self.events.send(PeerEvent::Error(e.clone()));
        }
        result
    }

    fn sync(&mut self) {
        for event in self.negotiator.take_events() {
            let event = match event {
                NegotiationEvent::State(state) => {
                    sink_info!(self.log_sink, "[ENDPOINT] {} is {}", self.id(), state);
                    let _ = self.events.send(PeerEvent::ConnectionStateChanged(state));
                    match state {
                        ConnectionState::Connected => {
                            if let Some(role) = self.negotiator.role() {
                                self.channels.on_connected(role);
                            }
                        }
                        ConnectionState::Failed | ConnectionState::Closed => {
                            self.channels.shutdown();
                        }
                        _ => {}
                    }
                    continue;
                }
                NegotiationEvent::Ice(phase) => PeerEvent::IcePhaseChanged(phase),
                NegotiationEvent::Error(e) => {
                    sink_warn!(self.log_sink, "[ENDPOINT] {}: {}", self.id(), e);
                    PeerEvent::Error(e)
                }
            };
            let _ = self.events.send(event);
        }
    }
}
