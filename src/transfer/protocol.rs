use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use std::io::{self, Cursor, Read, Write};

use super::TransferId;

pub const DIGEST_LEN: usize = 32;

/// Bytes a chunk message adds around its payload: type, id, seq and length.
pub const CHUNK_OVERHEAD: usize = 1 + 4 + 8 + 4;

/// Messages exchanged on a data channel while moving one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferMessage {
    /// Announces a transfer. `digest` is the SHA-256 of the whole payload.
    Header {
        id: TransferId,
        total_len: u64,
        chunk_size: u32,
        name: String,
        digest: [u8; DIGEST_LEN],
    },
    Chunk {
        id: TransferId,
        seq: u64,
        payload: Bytes,
    },
    Cancel {
        id: TransferId,
    },
}

impl TransferMessage {
    const TYPE_HEADER: u8 = 1;
    const TYPE_CHUNK: u8 = 2;
    const TYPE_CANCEL: u8 = 3;

    pub fn id(&self) -> TransferId {
        match self {
            TransferMessage::Header { id, .. }
            | TransferMessage::Chunk { id, .. }
            | TransferMessage::Cancel { id } => *id,
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, io::Error> {
        let mut buf = Vec::new();
        match self {
            TransferMessage::Header {
                id,
                total_len,
                chunk_size,
                name,
                digest,
            } => {
                let name_len = u16::try_from(name.len()).map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidInput, "transfer name too long")
                })?;
                buf.write_u8(Self::TYPE_HEADER)?;
                buf.write_u32::<BigEndian>(id.0)?;
                buf.write_u64::<BigEndian>(*total_len)?;
                buf.write_u32::<BigEndian>(*chunk_size)?;
                buf.write_u16::<BigEndian>(name_len)?;
                buf.write_all(name.as_bytes())?;
                buf.write_all(digest)?;
            }
            TransferMessage::Chunk { id, seq, payload } => {
                let len = u32::try_from(payload.len()).map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidInput, "chunk payload too large")
                })?;
                buf.reserve(CHUNK_OVERHEAD + payload.len());
                buf.write_u8(Self::TYPE_CHUNK)?;
                buf.write_u32::<BigEndian>(id.0)?;
                buf.write_u64::<BigEndian>(*seq)?;
                buf.write_u32::<BigEndian>(len)?;
                buf.write_all(payload)?;
            }
            TransferMessage::Cancel { id } => {
                buf.write_u8(Self::TYPE_CANCEL)?;
                buf.write_u32::<BigEndian>(id.0)?;
            }
        }
        Ok(buf)
    }

    /// Chunk payloads are slices of `data`, not copies.
    pub fn deserialize(data: &Bytes) -> Result<Self, io::Error> {
        let mut cursor = Cursor::new(data.as_ref());
        let msg = match cursor.read_u8()? {
            Self::TYPE_HEADER => {
                let id = TransferId(cursor.read_u32::<BigEndian>()?);
                let total_len = cursor.read_u64::<BigEndian>()?;
                let chunk_size = cursor.read_u32::<BigEndian>()?;
                let name_len = cursor.read_u16::<BigEndian>()?;
                let mut name_bytes = vec![0u8; name_len as usize];
                cursor.read_exact(&mut name_bytes)?;
                let name = String::from_utf8(name_bytes)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                let mut digest = [0u8; DIGEST_LEN];
                cursor.read_exact(&mut digest)?;
                TransferMessage::Header {
                    id,
                    total_len,
                    chunk_size,
                    name,
                    digest,
                }
            }
            Self::TYPE_CHUNK => {
                let id = TransferId(cursor.read_u32::<BigEndian>()?);
                let seq = cursor.read_u64::<BigEndian>()?;
                let len = cursor.read_u32::<BigEndian>()? as usize;
                let start = cursor.position() as usize;
                let end = start
                    .checked_add(len)
                    .filter(|end| *end <= data.len())
                    .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))?;
                cursor.set_position(end as u64);
                TransferMessage::Chunk {
                    id,
                    seq,
                    payload: data.slice(start..end),
                }
            }
            Self::TYPE_CANCEL => TransferMessage::Cancel {
                id: TransferId(cursor.read_u32::<BigEndian>()?),
            },
            unknown => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unknown transfer message type: {unknown}"),
                ));
            }
        };
        if cursor.position() as usize != data.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "trailing bytes after transfer message",
            ));
        }
        Ok(msg)
    }
}
