use bytes::Bytes;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};

use crate::config::{PairConfig, PeerConfig};
use crate::connection_manager::{ConnectionState, Endpoint, IcePhase, PeerError};
use crate::core::PeerEvent;
use crate::data_channel::ChannelId;
use crate::log::log_sink::LogSink;
use crate::signaling::protocol::SignalingMsg;
use crate::signaling::{LoopbackSignaling, SignalingTransport};
use crate::transfer::TransferId;
use crate::{sink_debug, sink_info, sink_warn};

pub const LOCAL_ID: &str = "local";
pub const REMOTE_ID: &str = "remote";

/// Selects one endpoint of a [`ConnectionPair`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Local,
    Remote,
}

impl Side {
    pub fn peer(self) -> Side {
        match self {
            Side::Local => Side::Remote,
            Side::Remote => Side::Local,
        }
    }
}

/// Runs the offer/answer exchange between `a` (offerer) and `b` (answerer).
///
/// All descriptions and candidates travel through `signaling`, so they are
/// encoded and decoded on the way. The answerer's candidates are sent ahead
/// of its answer and must be buffered by the offerer. If the handshake fails,
/// or either side ends up without a connected, nominated candidate pair, both
/// endpoints are failed.
pub fn connect_pair(
    a: &mut Endpoint,
    b: &mut Endpoint,
    signaling: &mut dyn SignalingTransport,
    log_sink: &dyn LogSink,
) -> Result<(), PeerError> {
    sink_info!(log_sink, "[PAIR] negotiating {} <-> {}", a.id(), b.id());
    let outcome = handshake(a, b, signaling).and_then(|()| {
        ensure_established(a)?;
        ensure_established(b)
    });
    match outcome {
        Ok(()) => {
            sink_info!(log_sink, "[PAIR] {} and {} connected", a.id(), b.id());
            Ok(())
        }
        Err(e) => {
            let reason = e.to_string();
            sink_warn!(log_sink, "[PAIR] negotiation failed: {}", reason);
            a.fail(&reason);
            b.fail(&reason);
            Err(e)
        }
    }
}

fn handshake(
    a: &mut Endpoint,
    b: &mut Endpoint,
    signaling: &mut dyn SignalingTransport,
) -> Result<(), PeerError> {
    let offer = a.create_offer()?;
    a.set_local_description(offer.clone())?;
    signaling.send(&SignalingMsg::description(&offer, b.id()))?;
    relay(signaling, a, b)?;

    let answer = b.create_answer()?;
    b.set_local_description(answer.clone())?;
    trickle(signaling, b, a.id())?;
    signaling.send(&SignalingMsg::description(&answer, a.id()))?;
    relay(signaling, a, b)?;

    trickle(signaling, a, b.id())?;
    relay(signaling, a, b)
}

fn trickle(
    signaling: &mut dyn SignalingTransport,
    from: &mut Endpoint,
    to: &str,
) -> Result<(), PeerError> {
    for candidate in from.take_local_candidates() {
        signaling.send(&SignalingMsg::candidate(&candidate, to))?;
    }
    Ok(())
}

/// Delivers every pending signaling message to its addressee.
fn relay(
    signaling: &mut dyn SignalingTransport,
    a: &mut Endpoint,
    b: &mut Endpoint,
) -> Result<(), PeerError> {
    while let Some(msg) = signaling.recv()? {
        let target = if msg.to() == a.id() {
            &mut *a
        } else if msg.to() == b.id() {
            &mut *b
        } else {
            return Err(PeerError::ProtocolViolation(format!(
                "signaling message for unknown endpoint {}",
                msg.to()
            )));
        };
        target.handle_signaling(msg)?;
    }
    Ok(())
}

fn ensure_established(endpoint: &Endpoint) -> Result<(), PeerError> {
    if endpoint.state() != ConnectionState::Connected {
        return Err(PeerError::NegotiationFailed(format!(
            "{} ended in {}",
            endpoint.id(),
            endpoint.state()
        )));
    }
    if endpoint.ice_phase() != IcePhase::Nominated {
        return Err(PeerError::NegotiationFailed(format!(
            "{} has no nominated candidate pair ({})",
            endpoint.id(),
            endpoint.ice_phase()
        )));
    }
    Ok(())
}

/// Two endpoints in one process, wired through loopback signaling and a
/// frame pump that stands in for the network.
pub struct ConnectionPair {
    local: Endpoint,
    remote: Endpoint,
    local_events: Receiver<PeerEvent>,
    remote_events: Receiver<PeerEvent>,
    signaling: LoopbackSignaling,
    config: PairConfig,
    log_sink: Arc<dyn LogSink>,
}

impl ConnectionPair {
    pub fn new(peer: &PeerConfig, config: PairConfig, log_sink: Arc<dyn LogSink>) -> Self {
        Self::with_configs(peer, peer, config, log_sink)
    }

    /// Each endpoint gets its own settings, e.g. different host addresses.
    pub fn with_configs(
        local: &PeerConfig,
        remote: &PeerConfig,
        config: PairConfig,
        log_sink: Arc<dyn LogSink>,
    ) -> Self {
        let (local_tx, local_events) = mpsc::channel();
        let (remote_tx, remote_events) = mpsc::channel();
        Self {
            local: Endpoint::new(LOCAL_ID, local, local_tx, log_sink.clone()),
            remote: Endpoint::new(REMOTE_ID, remote, remote_tx, log_sink.clone()),
            local_events,
            remote_events,
            signaling: LoopbackSignaling::new(),
            config,
            log_sink,
        }
    }

    pub fn endpoint(&self, side: Side) -> &Endpoint {
        match side {
            Side::Local => &self.local,
            Side::Remote => &self.remote,
        }
    }

    pub fn endpoint_mut(&mut self, side: Side) -> &mut Endpoint {
        match side {
            Side::Local => &mut self.local,
            Side::Remote => &mut self.remote,
        }
    }

    /// The local endpoint offers, the remote one answers.
    pub fn negotiate(&mut self) -> Result<(), PeerError> {
        connect_pair(
            &mut self.local,
            &mut self.remote,
            &mut self.signaling,
            self.log_sink.as_ref(),
        )
    }

    pub fn open_channel(
        &mut self,
        side: Side,
        label: &str,
        ordered: bool,
    ) -> Result<ChannelId, PeerError> {
        self.endpoint_mut(side).create_channel(label, ordered)
    }

    pub fn send(
        &mut self,
        side: Side,
        channel: ChannelId,
        payload: impl Into<Bytes>,
    ) -> Result<(), PeerError> {
        self.endpoint_mut(side).send(channel, payload)
    }

    pub fn send_text(&mut self, side: Side, channel: ChannelId, text: &str) -> Result<(), PeerError> {
        self.endpoint_mut(side).send_text(channel, text)
    }

    pub fn start_transfer(
        &mut self,
        side: Side,
        channel: ChannelId,
        payload: impl Into<Bytes>,
    ) -> Result<TransferId, PeerError> {
        self.endpoint_mut(side).start_transfer(channel, payload)
    }

    pub fn start_named_transfer(
        &mut self,
        side: Side,
        channel: ChannelId,
        name: &str,
        payload: impl Into<Bytes>,
    ) -> Result<TransferId, PeerError> {
        self.endpoint_mut(side)
            .start_named_transfer(channel, name, payload)
    }

    pub fn cancel_transfer(&mut self, side: Side, id: TransferId) -> Result<(), PeerError> {
        self.endpoint_mut(side).cancel_transfer(id)
    }

    pub fn close_channel(&mut self, side: Side, channel: ChannelId) -> Result<(), PeerError> {
        self.endpoint_mut(side).close_channel(channel)
    }

    /// Closes `side` and tells its peer with a `Bye`.
    pub fn close(&mut self, side: Side, reason: Option<&str>) -> Result<(), PeerError> {
        let bye = SignalingMsg::Bye {
            from: self.endpoint(side).id().to_owned(),
            to: self.endpoint(side.peer()).id().to_owned(),
            reason: reason.map(str::to_owned),
        };
        self.endpoint_mut(side).close();
        self.signaling.send(&bye)?;
        relay(&mut self.signaling, &mut self.local, &mut self.remote)
    }

    /// One network tick: moves up to `max_frames_per_tick` frames in each
    /// direction and returns how many moved.
    pub fn pump_once(&mut self) -> usize {
        let budget = self.config.max_frames_per_tick;
        let log = self.log_sink.as_ref();
        forward(&mut self.local, &mut self.remote, budget, log)
            + forward(&mut self.remote, &mut self.local, budget, log)
    }

    /// Ticks until no frame moves or the round limit is hit.
    pub fn pump(&mut self) -> usize {
        let mut total = 0;
        for _ in 0..self.config.max_pump_rounds {
            let moved = self.pump_once();
            if moved == 0 {
                break;
            }
            total += moved;
        }
        sink_debug!(self.log_sink, "[PAIR] pumped {} frames", total);
        total
    }

    pub fn events(&self, side: Side) -> &Receiver<PeerEvent> {
        match side {
            Side::Local => &self.local_events,
            Side::Remote => &self.remote_events,
        }
    }

    /// Everything reported by `side` since the last drain.
    pub fn drain_events(&self, side: Side) -> Vec<PeerEvent> {
        self.events(side).try_iter().collect()
    }
}

fn forward(src: &mut Endpoint, dst: &mut Endpoint, budget: usize, log_sink: &dyn LogSink) -> usize {
    let mut moved = 0;
    while moved < budget {
        let Some(frame) = src.poll_transmit() else {
            break;
        };
        if let Err(e) = dst.handle_datagram(&frame) {
            sink_warn!(log_sink, "[PAIR] {} -> {} frame dropped: {}", src.id(), dst.id(), e);
        }
        moved += 1;
    }
    moved
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::log::NoopLogSink;

    fn pair() -> ConnectionPair {
        ConnectionPair::new(
            &PeerConfig::default(),
            PairConfig::default(),
            Arc::new(NoopLogSink),
        )
    }

    #[test]
    fn negotiate_connects_both_sides() {
        let mut p = pair();
        p.negotiate().expect("negotiate");
        for side in [Side::Local, Side::Remote] {
            assert_eq!(p.endpoint(side).state(), ConnectionState::Connected);
            assert_eq!(p.endpoint(side).ice_phase(), IcePhase::Nominated);
            assert!(p.endpoint(side).negotiator().selected_pair().is_some());
        }
    }

    #[test]
    fn second_negotiation_fails_both() {
        let mut p = pair();
        p.negotiate().expect("negotiate");
        assert!(matches!(p.negotiate(), Err(PeerError::InvalidState(_))));
        assert_eq!(p.endpoint(Side::Local).state(), ConnectionState::Failed);
        assert_eq!(p.endpoint(Side::Remote).state(), ConnectionState::Failed);
    }

    #[test]
    fn bye_closes_the_peer() {
        let mut p = pair();
        p.negotiate().expect("negotiate");
        p.close(Side::Remote, Some("done")).expect("close");
        assert_eq!(p.endpoint(Side::Remote).state(), ConnectionState::Closed);
        assert_eq!(p.endpoint(Side::Local).state(), ConnectionState::Closed);
        assert_eq!(p.pump(), 0);
    }

    #[test]
    fn frame_budget_limits_a_tick() {
        let config = PairConfig {
            max_frames_per_tick: 1,
            ..PairConfig::default()
        };
        let mut p = ConnectionPair::new(&PeerConfig::default(), config, Arc::new(NoopLogSink));
        p.negotiate().expect("negotiate");
        let chat = p.open_channel(Side::Local, "chat", true).expect("channel");
        let files = p.open_channel(Side::Local, "files", true).expect("channel");
        // One open request per tick, each acked within the same tick.
        assert_eq!(p.pump_once(), 2);
        assert_eq!(p.pump_once(), 2);
        assert_eq!(p.pump_once(), 0);
        for ch in [chat, files] {
            assert_eq!(
                p.endpoint(Side::Local).channel_state(ch),
                Some(crate::data_channel::ChannelState::Open)
            );
        }
    }
}
