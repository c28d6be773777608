use super::{MsgType, ProtoError, SignalingMsg};
use std::str;

// ---- Encode to body bytes -------------------------------------------------

pub fn encode_msg(msg: &SignalingMsg) -> Result<(MsgType, Vec<u8>), ProtoError> {
    use SignalingMsg::*;
    let mut body = Vec::new();

    let msg_type = match msg {
        Offer {
            from,
            to,
            version,
            sdp,
        } => {
            put_route(&mut body, from, to)?;
            put_u64(&mut body, *version);
            put_str32(&mut body, sdp)?;
            MsgType::Offer
        }
        Answer {
            from,
            to,
            version,
            sdp,
        } => {
            put_route(&mut body, from, to)?;
            put_u64(&mut body, *version);
            put_str32(&mut body, sdp)?;
            MsgType::Answer
        }
        Candidate { from, to, seq, cand } => {
            put_route(&mut body, from, to)?;
            put_u64(&mut body, *seq);
            put_str32(&mut body, cand)?;
            MsgType::Candidate
        }
        Bye { from, to, reason } => {
            put_route(&mut body, from, to)?;
            match reason {
                Some(s) => put_str16(&mut body, s)?,
                None => put_u16(&mut body, 0), // len=0 string
            }
            MsgType::Bye
        }
    };

    Ok((msg_type, body))
}

// ---- Decode from body bytes ----------------------------------------------

pub fn decode_msg(msg_type: MsgType, body: &[u8]) -> Result<SignalingMsg, ProtoError> {
    use SignalingMsg::*;
    let mut cursor = Cursor::new(body);
    let from = cursor.get_str16()?.to_owned();
    let to = cursor.get_str16()?.to_owned();

    let msg = match msg_type {
        MsgType::Offer => {
            let version = cursor.get_u64()?;
            let sdp = cursor.get_str32()?.to_owned();
            Offer {
                from,
                to,
                version,
                sdp,
            }
        }
        MsgType::Answer => {
            let version = cursor.get_u64()?;
            let sdp = cursor.get_str32()?.to_owned();
            Answer {
                from,
                to,
                version,
                sdp,
            }
        }
        MsgType::Candidate => {
            let seq = cursor.get_u64()?;
            let cand = cursor.get_str32()?.to_owned();
            Candidate { from, to, seq, cand }
        }
        MsgType::Bye => {
            let s = cursor.get_str16()?.to_owned();
            let reason = if s.is_empty() { None } else { Some(s) };
            Bye { from, to, reason }
        }
    };

    cursor.finish()?;
    Ok(msg)
}

// ---- Primitive write helpers ---------------------------------------------

fn put_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn put_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_be_bytes());
}

/// str16 = u16 length + UTF-8 bytes
fn put_str16(buf: &mut Vec<u8>, s: &str) -> Result<(), ProtoError> {
    let bytes = s.as_bytes();
    let len = u16::try_from(bytes.len()).map_err(|_| ProtoError::StringTooLong {
        max: u16::MAX as usize,
        actual: bytes.len(),
    })?;
    put_u16(buf, len);
    buf.extend_from_slice(bytes);
    Ok(())
}

/// str32 = u32 length + UTF-8 bytes (description bodies, candidate lines)
fn put_str32(buf: &mut Vec<u8>, s: &str) -> Result<(), ProtoError> {
    let bytes = s.as_bytes();
    let len = u32::try_from(bytes.len()).map_err(|_| ProtoError::TooLarge)?;
    put_u32(buf, len);
    buf.extend_from_slice(bytes);
    Ok(())
}

fn put_route(buf: &mut Vec<u8>, from: &str, to: &str) -> Result<(), ProtoError> {
    put_str16(buf, from)?;
    put_str16(buf, to)
}

// ---- Cursor for decoding --------------------------------------------------

#[derive(Debug)]
struct Cursor<'a> {
    buf: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn get_u16(&mut self) -> Result<u16, ProtoError> {
        let b = self.get_bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn get_u32(&mut self) -> Result<u32, ProtoError> {
        let b = self.get_bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn get_u64(&mut self) -> Result<u64, ProtoError> {
        let b = self.get_bytes(8)?;
        Ok(u64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
    }

    fn get_bytes(&mut self, len: usize) -> Result<&'a [u8], ProtoError> {
        if self.buf.len() < len {
            return Err(ProtoError::Truncated);
        }
        let (head, rest) = self.buf.split_at(len);
        self.buf = rest;
        Ok(head)
    }

    fn get_str16(&mut self) -> Result<&'a str, ProtoError> {
        let len = self.get_u16()? as usize;
        let bytes = self.get_bytes(len)?;
        str::from_utf8(bytes).map_err(|_| ProtoError::InvalidUtf8)
    }

    fn get_str32(&mut self) -> Result<&'a str, ProtoError> {
        let len = self.get_u32()? as usize;
        let bytes = self.get_bytes(len)?;
        str::from_utf8(bytes).map_err(|_| ProtoError::InvalidUtf8)
    }

    /// Enforce that we've consumed the whole body.
    fn finish(self) -> Result<(), ProtoError> {
        if !self.buf.is_empty() {
            Err(ProtoError::InvalidFormat("trailing bytes in message body"))
        } else {
            Ok(())
        }
    }
}
