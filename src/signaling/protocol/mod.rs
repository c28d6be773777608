//! Binary signaling protocol.
//!
//! Header:
//!   [ver: u8][msg_type: u8][flags: u16][body_len: u32]
//! Body:
//!   [payload bytes...], up to `MAX_BODY_LEN`.

use std::io::{Read, Write};

pub mod codec;
pub mod errors;
pub mod framing;
pub mod msg;
pub mod msg_type;

pub use codec::{decode_msg, encode_msg};
pub use errors::{FrameError, ProtoError};
pub use framing::{read_frame, write_frame};
pub use msg::SignalingMsg;
pub use msg_type::MsgType;

/// Protocol version (first byte in the frame header).
pub const PROTO_VERSION: u8 = 1;

/// Maximum allowed body size for a frame (to avoid OOM).
pub const MAX_BODY_LEN: usize = 1_048_576; // 1 MiB

/// Header length in bytes.
pub const HEADER_LEN: usize = 8;

pub fn write_msg<W: Write>(w: &mut W, msg: &SignalingMsg) -> Result<(), FrameError> {
    let (msg_type, body) = encode_msg(msg)?;
    if body.len() > MAX_BODY_LEN {
        return Err(ProtoError::TooLarge.into());
    }
    write_frame(w, msg_type, &body)?;
    Ok(())
}

pub fn read_msg<R: Read>(r: &mut R) -> Result<SignalingMsg, FrameError> {
    let (msg_type, body) = read_frame(r, MAX_BODY_LEN)?;
    Ok(decode_msg(msg_type, &body)?)
}
