use bytes::Bytes;
use sha2::{Digest, Sha256};

use super::TransferId;
use super::protocol::{DIGEST_LEN, TransferMessage};

/// Outbound half of a transfer: cuts a payload into fixed-size chunks.
///
/// Chunks are `Bytes` slices of the source, so no payload bytes are copied
/// until the chunk is framed for the wire.
#[derive(Debug)]
pub struct ChunkSender {
    id: TransferId,
    name: String,
    source: Bytes,
    chunk_size: usize,
    cursor: usize,
    next_seq: u64,
    cancelled: bool,
}

impl ChunkSender {
    pub fn new(id: TransferId, name: impl Into<String>, source: Bytes, chunk_size: usize) -> Self {
        Self {
            id,
            name: name.into(),
            source,
            chunk_size: chunk_size.max(1),
            cursor: 0,
            next_seq: 0,
            cancelled: false,
        }
    }

    pub fn id(&self) -> TransferId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn total_len(&self) -> u64 {
        self.source.len() as u64
    }

    /// Bytes handed out as chunks so far.
    pub fn bytes_transferred(&self) -> u64 {
        self.cursor as u64
    }

    pub fn header(&self) -> TransferMessage {
        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(&Sha256::digest(&self.source));
        TransferMessage::Header {
            id: self.id,
            total_len: self.total_len(),
            chunk_size: u32::try_from(self.chunk_size).unwrap_or(u32::MAX),
            name: self.name.clone(),
            digest,
        }
    }

    /// Next chunk in order, or `None` once cancelled or exhausted.
    pub fn next_chunk(&mut self) -> Option<TransferMessage> {
        if self.cancelled || self.is_finished() {
            return None;
        }
        let end = (self.cursor + self.chunk_size).min(self.source.len());
        let payload = self.source.slice(self.cursor..end);
        let seq = self.next_seq;
        self.cursor = end;
        self.next_seq += 1;
        Some(TransferMessage::Chunk {
            id: self.id,
            seq,
            payload,
        })
    }

    /// Every chunk has been handed out.
    pub fn is_finished(&self) -> bool {
        self.cursor >= self.source.len()
    }

    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}
