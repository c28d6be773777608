use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use std::io::{self, Cursor, Read, Write};

/// Payload protocol identifier carried by every message frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    Text,
    Binary,
    /// Chunked-transfer control and data (`TransferMessage`).
    Transfer,
}

impl PayloadKind {
    const PPID_TEXT: u32 = 51;
    const PPID_BINARY: u32 = 53;
    const PPID_TRANSFER: u32 = 0x5046_5400;

    pub fn ppid(self) -> u32 {
        match self {
            PayloadKind::Text => Self::PPID_TEXT,
            PayloadKind::Binary => Self::PPID_BINARY,
            PayloadKind::Transfer => Self::PPID_TRANSFER,
        }
    }

    pub fn from_ppid(ppid: u32) -> Option<Self> {
        match ppid {
            Self::PPID_TEXT => Some(PayloadKind::Text),
            Self::PPID_BINARY => Some(PayloadKind::Binary),
            Self::PPID_TRANSFER => Some(PayloadKind::Transfer),
            _ => None,
        }
    }
}

/// One unit on the data-channel transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataFrame {
    Open {
        stream: u16,
        ordered: bool,
        label: String,
    },
    OpenAck {
        stream: u16,
    },
    Message {
        stream: u16,
        kind: PayloadKind,
        payload: Bytes,
    },
    Close {
        stream: u16,
    },
    CloseAck {
        stream: u16,
    },
}

impl DataFrame {
    const TYPE_OPEN_ACK: u8 = 0x02;
    const TYPE_OPEN: u8 = 0x03;
    const TYPE_MESSAGE: u8 = 0x10;
    const TYPE_CLOSE: u8 = 0x20;
    const TYPE_CLOSE_ACK: u8 = 0x21;

    pub fn stream(&self) -> u16 {
        match self {
            DataFrame::Open { stream, .. }
            | DataFrame::OpenAck { stream }
            | DataFrame::Message { stream, .. }
            | DataFrame::Close { stream }
            | DataFrame::CloseAck { stream } => *stream,
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, io::Error> {
        let mut buf = Vec::new();
        match self {
            DataFrame::Open {
                stream,
                ordered,
                label,
            } => {
                let label_len = u16::try_from(label.len()).map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidInput, "channel label too long")
                })?;
                buf.write_u8(Self::TYPE_OPEN)?;
                buf.write_u16::<BigEndian>(*stream)?;
                buf.write_u8(u8::from(*ordered))?;
                buf.write_u16::<BigEndian>(label_len)?;
                buf.write_all(label.as_bytes())?;
            }
            DataFrame::OpenAck { stream } => {
                buf.write_u8(Self::TYPE_OPEN_ACK)?;
                buf.write_u16::<BigEndian>(*stream)?;
            }
            DataFrame::Message {
                stream,
                kind,
                payload,
            } => {
                let len = u32::try_from(payload.len()).map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidInput, "message too large")
                })?;
                buf.reserve(11 + payload.len());
                buf.write_u8(Self::TYPE_MESSAGE)?;
                buf.write_u16::<BigEndian>(*stream)?;
                buf.write_u32::<BigEndian>(kind.ppid())?;
                buf.write_u32::<BigEndian>(len)?;
                buf.write_all(payload)?;
            }
            DataFrame::Close { stream } => {
                buf.write_u8(Self::TYPE_CLOSE)?;
                buf.write_u16::<BigEndian>(*stream)?;
            }
            DataFrame::CloseAck { stream } => {
                buf.write_u8(Self::TYPE_CLOSE_ACK)?;
                buf.write_u16::<BigEndian>(*stream)?;
            }
        }
        Ok(buf)
    }

    /// Message payloads are slices of `data`.
    pub fn deserialize(data: &Bytes) -> Result<Self, io::Error> {
        let mut cursor = Cursor::new(data.as_ref());
        let frame = match cursor.read_u8()? {
            Self::TYPE_OPEN => {
                let stream = cursor.read_u16::<BigEndian>()?;
                let ordered = match cursor.read_u8()? {
                    0 => false,
                    1 => true,
                    other => {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("bad ordered flag {other}"),
                        ));
                    }
                };
                let label_len = cursor.read_u16::<BigEndian>()?;
                let mut label = vec![0u8; label_len as usize];
                cursor.read_exact(&mut label)?;
                let label = String::from_utf8(label)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                DataFrame::Open {
                    stream,
                    ordered,
                    label,
                }
            }
            Self::TYPE_OPEN_ACK => DataFrame::OpenAck {
                stream: cursor.read_u16::<BigEndian>()?,
            },
            Self::TYPE_MESSAGE => {
                let stream = cursor.read_u16::<BigEndian>()?;
                let ppid = cursor.read_u32::<BigEndian>()?;
                let kind = PayloadKind::from_ppid(ppid).ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidData, format!("unknown ppid {ppid}"))
                })?;
                let len = cursor.read_u32::<BigEndian>()? as usize;
                let start = cursor.position() as usize;
                let end = start
                    .checked_add(len)
                    .filter(|end| *end <= data.len())
                    .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))?;
                cursor.set_position(end as u64);
                DataFrame::Message {
                    stream,
                    kind,
                    payload: data.slice(start..end),
                }
            }
            Self::TYPE_CLOSE => DataFrame::Close {
                stream: cursor.read_u16::<BigEndian>()?,
            },
            Self::TYPE_CLOSE_ACK => DataFrame::CloseAck {
                stream: cursor.read_u16::<BigEndian>()?,
            },
            unknown => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unknown frame type: {unknown:#04x}"),
                ));
            }
        };
        if cursor.position() as usize != data.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "trailing bytes after frame",
            ));
        }
        Ok(frame)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    fn decode(frame: &DataFrame) -> DataFrame {
        let wire = Bytes::from(frame.serialize().expect("serialize"));
        DataFrame::deserialize(&wire).expect("deserialize")
    }

    #[test]
    fn open_carries_label_and_ordering() {
        let open = DataFrame::Open {
            stream: 4,
            ordered: false,
            label: "chat".into(),
        };
        assert_eq!(decode(&open), open);
        assert_eq!(open.stream(), 4);
    }

    #[test]
    fn text_message_keeps_kind() {
        let msg = DataFrame::Message {
            stream: 1,
            kind: PayloadKind::Text,
            payload: Bytes::from_static(b"hello"),
        };
        assert_eq!(decode(&msg), msg);
    }

    #[test]
    fn malformed_frames_are_rejected() {
        assert!(DataFrame::deserialize(&Bytes::new()).is_err());
        assert!(DataFrame::deserialize(&Bytes::from_static(&[0x7f, 0, 1])).is_err());
        // ordered flag must be 0 or 1
        assert!(DataFrame::deserialize(&Bytes::from_static(&[0x03, 0, 1, 9, 0, 0])).is_err());
        // unknown payload protocol id
        assert!(
            DataFrame::deserialize(&Bytes::from_static(&[0x10, 0, 1, 0, 0, 0, 9, 0, 0, 0, 0]))
                .is_err()
        );
        let mut wire = DataFrame::Close { stream: 2 }.serialize().expect("serialize");
        wire.push(0);
        assert!(DataFrame::deserialize(&Bytes::from(wire)).is_err());
    }
}
