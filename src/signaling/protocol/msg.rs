use crate::signaling::{EndpointId, IceCandidate, SdpType, SessionDescription};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingMsg {
    Offer {
        from: EndpointId,
        to: EndpointId,
        version: u64,
        sdp: String,
    },
    Answer {
        from: EndpointId,
        to: EndpointId,
        version: u64,
        sdp: String,
    },
    Candidate {
        from: EndpointId,
        to: EndpointId,
        seq: u64,
        cand: String,
    },
    Bye {
        from: EndpointId,
        to: EndpointId,
        reason: Option<String>,
    },
}

impl SignalingMsg {
    pub fn description(desc: &SessionDescription, to: &str) -> Self {
        let (from, to, version, sdp) = (
            desc.origin.clone(),
            to.to_owned(),
            desc.version,
            desc.sdp.clone(),
        );
        match desc.sdp_type {
            SdpType::Offer => SignalingMsg::Offer {
                from,
                to,
                version,
                sdp,
            },
            SdpType::Answer => SignalingMsg::Answer {
                from,
                to,
                version,
                sdp,
            },
        }
    }

    pub fn candidate(cand: &IceCandidate, to: &str) -> Self {
        SignalingMsg::Candidate {
            from: cand.origin.clone(),
            to: to.to_owned(),
            seq: cand.seq,
            cand: cand.candidate.clone(),
        }
    }

    /// Recipient of the message.
    pub fn to(&self) -> &str {
        match self {
            SignalingMsg::Offer { to, .. }
            | SignalingMsg::Answer { to, .. }
            | SignalingMsg::Candidate { to, .. }
            | SignalingMsg::Bye { to, .. } => to,
        }
    }

    pub fn into_description(self) -> Option<SessionDescription> {
        match self {
            SignalingMsg::Offer {
                from, version, sdp, ..
            } => Some(SessionDescription::new(SdpType::Offer, version, from, sdp)),
            SignalingMsg::Answer {
                from, version, sdp, ..
            } => Some(SessionDescription::new(SdpType::Answer, version, from, sdp)),
            _ => None,
        }
    }

    pub fn into_candidate(self) -> Option<IceCandidate> {
        match self {
            SignalingMsg::Candidate {
                from, seq, cand, ..
            } => Some(IceCandidate::new(cand, from, seq)),
            _ => None,
        }
    }
}
