use std::fmt;

/// Candidate-exchange progress, tracked alongside the connection state.
/// Moves forward only, until the endpoint rolls back or shuts down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IcePhase {
    Idle,
    Gathering,
    Checking,
    Nominated,
}

impl fmt::Display for IcePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IcePhase::Idle => "idle",
            IcePhase::Gathering => "gathering",
            IcePhase::Checking => "checking",
            IcePhase::Nominated => "nominated",
        };
        f.write_str(s)
    }
}
