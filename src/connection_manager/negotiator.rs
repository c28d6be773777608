use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;

use rand::Rng;
use rand::distributions::Alphanumeric;

use super::{ConnectionState, IcePhase, PeerError};
use crate::log::log_sink::LogSink;
use crate::signaling::{EndpointId, IceCandidate, SdpType, SessionDescription};
use crate::{sink_debug, sink_info, sink_warn};

const UFRAG_LEN: usize = 4;
const PWD_LEN: usize = 22;
const SCTP_PORT: u16 = 5000;

/// Which side of the offer/answer exchange this endpoint plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Offerer,
    Answerer,
}

/// What `add_ice_candidate` did with a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateDisposition {
    /// Held until the remote description arrives.
    Buffered,
    Applied,
    /// A candidate with the same origin and sequence number was already seen.
    Duplicate,
}

/// Observable effects of a negotiator operation, drained by the owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationEvent {
    State(ConnectionState),
    Ice(IcePhase),
    /// Raised outside the failing call, e.g. while draining early candidates.
    Error(PeerError),
}

/// Offer/answer state machine for one endpoint.
///
/// Every rejected input returns a typed error and leaves the state untouched.
pub struct Negotiator {
    id: EndpointId,
    state: ConnectionState,
    ice_phase: IcePhase,
    role: Option<Role>,

    session_id: u64,
    ufrag: String,
    pwd: String,
    max_message_size: usize,
    host_addrs: Vec<SocketAddr>,

    next_version: u64,
    pending_local: Option<SessionDescription>,
    local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
    latest_remote_version: u64,

    next_candidate_seq: u64,
    local_candidates: Vec<IceCandidate>,
    outgoing: VecDeque<IceCandidate>,
    /// Keyed by (seq, origin) so draining runs in sequence order.
    early: BTreeMap<(u64, EndpointId), IceCandidate>,
    remote_candidates: Vec<IceCandidate>,
    seen: BTreeSet<(EndpointId, u64)>,

    events: Vec<NegotiationEvent>,
    log_sink: Arc<dyn LogSink>,
}

impl Negotiator {
    pub fn new(
        id: impl Into<EndpointId>,
        host_addrs: Vec<SocketAddr>,
        max_message_size: usize,
        log_sink: Arc<dyn LogSink>,
    ) -> Self {
        let mut rng = rand::thread_rng();
        Self {
            id: id.into(),
            state: ConnectionState::New,
            ice_phase: IcePhase::Idle,
            role: None,
            session_id: rng.r#gen(),
            ufrag: random_token(UFRAG_LEN),
            pwd: random_token(PWD_LEN),
            max_message_size,
            host_addrs,
            next_version: 1,
            pending_local: None,
            local: None,
            remote: None,
            latest_remote_version: 0,
            next_candidate_seq: 0,
            local_candidates: Vec::new(),
            outgoing: VecDeque::new(),
            early: BTreeMap::new(),
            remote_candidates: Vec::new(),
            seen: BTreeSet::new(),
            events: Vec::new(),
            log_sink,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn ice_phase(&self) -> IcePhase {
        self.ice_phase
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn local_description(&self) -> Option<&SessionDescription> {
        self.local.as_ref()
    }

    pub fn pending_local_description(&self) -> Option<&SessionDescription> {
        self.pending_local.as_ref()
    }

    pub fn remote_description(&self) -> Option<&SessionDescription> {
        self.remote.as_ref()
    }

    pub fn remote_candidates(&self) -> &[IceCandidate] {
        &self.remote_candidates
    }

    pub fn early_candidate_count(&self) -> usize {
        self.early.len()
    }

    /// Local and remote candidate in use once nominated.
    pub fn selected_pair(&self) -> Option<(&IceCandidate, &IceCandidate)> {
        if self.ice_phase != IcePhase::Nominated {
            return None;
        }
        Some((self.local_candidates.first()?, self.remote_candidates.first()?))
    }

    pub fn take_events(&mut self) -> Vec<NegotiationEvent> {
        std::mem::take(&mut self.events)
    }

    /// Locally gathered candidates not yet handed to signaling.
    pub fn take_local_candidates(&mut self) -> Vec<IceCandidate> {
        self.outgoing.drain(..).collect()
    }

    pub fn create_offer(&mut self) -> Result<SessionDescription, PeerError> {
        if self.state != ConnectionState::New {
            return Err(PeerError::invalid_state(format!(
                "create_offer in {}",
                self.state
            )));
        }
        let desc = self.describe(SdpType::Offer, Role::Offerer);
        sink_debug!(self.log_sink, "[NEGOTIATOR] {} created offer v{}", self.id, desc.version);
        self.pending_local = Some(desc.clone());
        self.role = Some(Role::Offerer);
        self.set_state(ConnectionState::HaveLocalOffer);
        Ok(desc)
    }

    pub fn create_answer(&mut self) -> Result<SessionDescription, PeerError> {
        if self.state != ConnectionState::HaveRemoteOffer {
            return Err(PeerError::invalid_state(format!(
                "create_answer in {}",
                self.state
            )));
        }
        if self.local.is_some() || self.pending_local.is_some() {
            return Err(PeerError::invalid_state("an answer already exists"));
        }
        let desc = self.describe(SdpType::Answer, Role::Answerer);
        sink_debug!(self.log_sink, "[NEGOTIATOR] {} created answer v{}", self.id, desc.version);
        self.pending_local = Some(desc.clone());
        Ok(desc)
    }

    pub fn set_local_description(&mut self, desc: SessionDescription) -> Result<(), PeerError> {
        if self.state.is_terminal() {
            return Err(PeerError::invalid_state(format!(
                "set_local_description in {}",
                self.state
            )));
        }
        if self.local.is_some() {
            return Err(PeerError::invalid_state("local description already set"));
        }
        if self.pending_local.as_ref() != Some(&desc) {
            return Err(PeerError::invalid_state(
                "description was not created by this endpoint",
            ));
        }

        self.pending_local = None;
        let is_answer = desc.sdp_type == SdpType::Answer;
        self.local = Some(desc);
        self.gather();
        self.advance_ice();
        if is_answer {
            self.set_state(ConnectionState::Connected);
        }
        Ok(())
    }

    pub fn set_remote_description(&mut self, desc: SessionDescription) -> Result<(), PeerError> {
        if self.state.is_terminal() {
            return Err(PeerError::invalid_state(format!(
                "set_remote_description in {}",
                self.state
            )));
        }
        if desc.origin == self.id {
            return Err(PeerError::ProtocolViolation(format!(
                "remote {} originates from {} itself",
                desc.sdp_type, self.id
            )));
        }
        if desc.version <= self.latest_remote_version {
            sink_warn!(
                self.log_sink,
                "[NEGOTIATOR] {} ignoring stale {} v{} (latest v{})",
                self.id,
                desc.sdp_type,
                desc.version,
                self.latest_remote_version
            );
            return Err(PeerError::StaleDescription {
                version: desc.version,
                latest: self.latest_remote_version,
            });
        }

        match (self.state, desc.sdp_type) {
            (ConnectionState::HaveLocalOffer, SdpType::Answer) if self.local.is_some() => {
                self.accept_remote(desc);
                self.set_state(ConnectionState::HaveRemoteAnswer);
                self.set_state(ConnectionState::Connected);
            }
            (ConnectionState::New, SdpType::Offer) => {
                self.accept_remote(desc);
                self.role = Some(Role::Answerer);
                self.set_state(ConnectionState::HaveRemoteOffer);
            }
            (state, sdp_type) => {
                return Err(PeerError::invalid_state(format!(
                    "remote {sdp_type} in {state}"
                )));
            }
        }
        Ok(())
    }

    pub fn add_ice_candidate(
        &mut self,
        candidate: IceCandidate,
    ) -> Result<CandidateDisposition, PeerError> {
        if self.state.is_terminal() {
            return Err(PeerError::invalid_state(format!(
                "add_ice_candidate in {}",
                self.state
            )));
        }
        if candidate.origin == self.id {
            return Err(PeerError::ProtocolViolation(format!(
                "candidate #{} originates from {} itself",
                candidate.seq, self.id
            )));
        }
        if let Some(remote) = &self.remote
            && candidate.origin != remote.origin
        {
            return Err(PeerError::ProtocolViolation(format!(
                "candidate from {} but remote description is from {}",
                candidate.origin, remote.origin
            )));
        }
        if !self
            .seen
            .insert((candidate.origin.clone(), candidate.seq))
        {
            sink_debug!(self.log_sink, "[NEGOTIATOR] {} duplicate candidate #{}", self.id, candidate.seq);
            return Ok(CandidateDisposition::Duplicate);
        }

        if self.remote.is_none() {
            sink_debug!(self.log_sink, "[NEGOTIATOR] {} buffering early candidate #{}", self.id, candidate.seq);
            self.early
                .insert((candidate.seq, candidate.origin.clone()), candidate);
            return Ok(CandidateDisposition::Buffered);
        }
        self.remote_candidates.push(candidate);
        self.advance_ice();
        Ok(CandidateDisposition::Applied)
    }

    /// Abandons the current offer/answer cycle and returns to `new`.
    pub fn rollback(&mut self) -> Result<(), PeerError> {
        let allowed = match self.state {
            ConnectionState::HaveLocalOffer => true,
            ConnectionState::HaveRemoteOffer => self.local.is_none(),
            _ => false,
        };
        if !allowed {
            return Err(PeerError::invalid_state(format!("rollback in {}", self.state)));
        }
        sink_info!(self.log_sink, "[NEGOTIATOR] {} rolling back from {}", self.id, self.state);
        self.release();
        self.set_state(ConnectionState::New);
        Ok(())
    }

    pub fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        sink_info!(self.log_sink, "[NEGOTIATOR] {} closing from {}", self.id, self.state);
        self.release();
        self.set_state(ConnectionState::Closed);
    }

    pub fn fail(&mut self, reason: &str) {
        if self.state.is_terminal() {
            return;
        }
        sink_warn!(self.log_sink, "[NEGOTIATOR] {} failed: {}", self.id, reason);
        self.release();
        self.set_state(ConnectionState::Failed);
    }

    fn release(&mut self) {
        self.pending_local = None;
        self.local = None;
        self.remote = None;
        self.role = None;
        self.local_candidates.clear();
        self.outgoing.clear();
        self.early.clear();
        self.remote_candidates.clear();
        self.seen.clear();
        self.set_ice(IcePhase::Idle);
    }

    fn accept_remote(&mut self, desc: SessionDescription) {
        sink_debug!(self.log_sink, "[NEGOTIATOR] {} accepted remote {}", self.id, desc);
        self.latest_remote_version = desc.version;
        let origin = desc.origin.clone();
        self.remote = Some(desc);

        // BTreeMap iterates in ascending sequence order.
        for ((seq, _), candidate) in std::mem::take(&mut self.early) {
            if candidate.origin == origin {
                self.remote_candidates.push(candidate);
            } else {
                self.events
                    .push(NegotiationEvent::Error(PeerError::ProtocolViolation(format!(
                        "early candidate #{seq} from {} but remote description is from {origin}",
                        candidate.origin
                    ))));
            }
        }
        self.advance_ice();
    }

    fn gather(&mut self) {
        for addr in self.host_addrs.clone() {
            let candidate = IceCandidate::host(addr, self.id.clone(), self.next_candidate_seq);
            self.next_candidate_seq += 1;
            self.local_candidates.push(candidate.clone());
            self.outgoing.push_back(candidate);
        }
        sink_debug!(
            self.log_sink,
            "[NEGOTIATOR] {} gathered {} host candidates",
            self.id,
            self.host_addrs.len()
        );
    }

    fn advance_ice(&mut self) {
        loop {
            let next = match self.ice_phase {
                IcePhase::Idle if self.local.is_some() => IcePhase::Gathering,
                IcePhase::Gathering if self.remote.is_some() => IcePhase::Checking,
                IcePhase::Checking
                    if !self.local_candidates.is_empty() && !self.remote_candidates.is_empty() =>
                {
                    IcePhase::Nominated
                }
                _ => return,
            };
            self.set_ice(next);
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        sink_debug!(self.log_sink, "[NEGOTIATOR] {}: {} -> {}", self.id, self.state, state);
        self.state = state;
        self.events.push(NegotiationEvent::State(state));
    }

    fn set_ice(&mut self, phase: IcePhase) {
        if self.ice_phase == phase {
            return;
        }
        self.ice_phase = phase;
        self.events.push(NegotiationEvent::Ice(phase));
    }

    fn describe(&mut self, sdp_type: SdpType, role: Role) -> SessionDescription {
        let version = self.next_version;
        self.next_version += 1;
        let setup = match role {
            Role::Offerer => "actpass",
            Role::Answerer => "active",
        };
        let sdp = format!(
            "v=0\r\n\
             o=- {session} {version} IN IP4 0.0.0.0\r\n\
             s=-\r\n\
             t=0 0\r\n\
             a=group:BUNDLE 0\r\n\
             m=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\n\
             c=IN IP4 0.0.0.0\r\n\
             a=mid:0\r\n\
             a=ice-ufrag:{ufrag}\r\n\
             a=ice-pwd:{pwd}\r\n\
             a=setup:{setup}\r\n\
             a=sctp-port:{SCTP_PORT}\r\n\
             a=max-message-size:{max}\r\n",
            session = self.session_id,
            ufrag = self.ufrag,
            pwd = self.pwd,
            max = self.max_message_size,
        );
        SessionDescription::new(sdp_type, version, self.id.clone(), sdp)
    }
}

fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
