use std::fmt;

/// Negotiation state of one endpoint. `Failed` and `Closed` are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    New,
    HaveLocalOffer,
    HaveRemoteOffer,
    HaveRemoteAnswer,
    Connected,
    Failed,
    Closed,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::New => "new",
            ConnectionState::HaveLocalOffer => "have-local-offer",
            ConnectionState::HaveRemoteOffer => "have-remote-offer",
            ConnectionState::HaveRemoteAnswer => "have-remote-answer",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "failed",
            ConnectionState::Closed => "closed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Failed | ConnectionState::Closed)
    }

    /// States in which data channels may be created.
    pub fn allows_channels(self) -> bool {
        matches!(
            self,
            ConnectionState::HaveLocalOffer
                | ConnectionState::HaveRemoteOffer
                | ConnectionState::HaveRemoteAnswer
                | ConnectionState::Connected
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
