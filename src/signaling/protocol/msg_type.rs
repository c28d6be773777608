use crate::signaling::protocol::ProtoError;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum MsgType {
    Offer = 0x20,
    Answer = 0x21,
    Candidate = 0x22,
    Bye = 0x24,
}

impl MsgType {
    pub fn from_u8(v: u8) -> Result<MsgType, ProtoError> {
        use MsgType::*;
        match v {
            0x20 => Ok(Offer),
            0x21 => Ok(Answer),
            0x22 => Ok(Candidate),
            0x24 => Ok(Bye),
            other => Err(ProtoError::UnknownType(other)),
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}
