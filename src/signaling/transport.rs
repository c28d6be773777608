use std::collections::VecDeque;
use std::io::{self, Read, Write};

use crate::signaling::protocol::{FrameError, SignalingMsg, read_msg, write_msg};

/// Moves encoded signaling messages between endpoints.
///
/// Every message is serialized on `send` and decoded on `recv`, so whatever
/// reaches the peer has survived the wire format.
pub trait SignalingTransport {
    fn send(&mut self, msg: &SignalingMsg) -> Result<(), FrameError>;

    /// Next message, or `None` when nothing is pending.
    fn recv(&mut self) -> Result<Option<SignalingMsg>, FrameError>;
}

/// In-memory FIFO of framed messages.
#[derive(Debug, Default)]
pub struct LoopbackSignaling {
    wire: VecDeque<u8>,
    frames: usize,
}

impl LoopbackSignaling {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of framed messages not yet received.
    pub fn pending(&self) -> usize {
        self.frames
    }

    /// Encoded bytes waiting on the wire.
    pub fn wire_len(&self) -> usize {
        self.wire.len()
    }
}

impl SignalingTransport for LoopbackSignaling {
    fn send(&mut self, msg: &SignalingMsg) -> Result<(), FrameError> {
        let mut encoded = Vec::new();
        write_msg(&mut encoded, msg)?;
        self.wire.extend(encoded);
        self.frames += 1;
        Ok(())
    }

    fn recv(&mut self) -> Result<Option<SignalingMsg>, FrameError> {
        if self.frames == 0 {
            return Ok(None);
        }
        self.frames -= 1;
        read_msg(&mut self.wire).map(Some)
    }
}

/// Signaling over any blocking byte stream (a TCP socket, a pipe).
pub struct StreamSignaling<S> {
    stream: S,
}

impl<S> StreamSignaling<S>
where
    S: Read + Write,
{
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S> SignalingTransport for StreamSignaling<S>
where
    S: Read + Write,
{
    fn send(&mut self, msg: &SignalingMsg) -> Result<(), FrameError> {
        write_msg(&mut self.stream, msg)
    }

    /// End of stream at a frame boundary reads as `None`.
    fn recv(&mut self) -> Result<Option<SignalingMsg>, FrameError> {
        match read_msg(&mut self.stream) {
            Ok(msg) => Ok(Some(msg)),
            Err(FrameError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e),
        }
    }
}
