use bytes::{Bytes, BytesMut};
use sha2::{Digest, Sha256};

use super::TransferId;
use super::protocol::DIGEST_LEN;
use crate::connection_manager::PeerError;

/// Inbound half of a transfer: validates and reassembles chunks.
#[derive(Debug)]
pub struct ChunkReceiver {
    id: TransferId,
    name: String,
    total_len: u64,
    chunk_size: u64,
    expected_digest: [u8; DIGEST_LEN],
    chunks: Vec<Bytes>,
    received: u64,
    next_seq: u64,
    hasher: Sha256,
    completed: bool,
}

impl ChunkReceiver {
    pub fn new(
        id: TransferId,
        name: String,
        total_len: u64,
        chunk_size: u32,
        digest: [u8; DIGEST_LEN],
    ) -> Result<Self, PeerError> {
        if chunk_size == 0 && total_len > 0 {
            return Err(PeerError::ProtocolViolation(format!(
                "transfer {id} announces zero chunk size"
            )));
        }
        Ok(Self {
            id,
            name,
            total_len,
            chunk_size: u64::from(chunk_size),
            expected_digest: digest,
            chunks: Vec::new(),
            received: 0,
            next_seq: 0,
            hasher: Sha256::new(),
            completed: false,
        })
    }

    pub fn id(&self) -> TransferId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn total_len(&self) -> u64 {
        self.total_len
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.received
    }

    /// Accepts the next chunk and returns the new byte count.
    pub fn accept(&mut self, seq: u64, payload: Bytes) -> Result<u64, PeerError> {
        let id = self.id;
        if self.completed {
            return Err(PeerError::ProtocolViolation(format!(
                "transfer {id}: chunk {seq} after completion"
            )));
        }
        if seq != self.next_seq {
            return Err(PeerError::ProtocolViolation(format!(
                "transfer {id}: expected chunk {}, got {seq}",
                self.next_seq
            )));
        }
        let len = payload.len() as u64;
        if len > self.chunk_size {
            return Err(PeerError::ProtocolViolation(format!(
                "transfer {id}: chunk of {len} bytes exceeds chunk size {}",
                self.chunk_size
            )));
        }
        let after = self.received + len;
        if after > self.total_len {
            return Err(PeerError::ProtocolViolation(format!(
                "transfer {id}: {after} bytes exceeds declared total {}",
                self.total_len
            )));
        }
        if len < self.chunk_size && after < self.total_len {
            return Err(PeerError::ProtocolViolation(format!(
                "transfer {id}: short chunk {seq} before the end"
            )));
        }

        self.hasher.update(&payload);
        self.chunks.push(payload);
        self.received = after;
        self.next_seq += 1;
        Ok(self.received)
    }

    /// Yields the reassembled payload exactly once, when every byte arrived.
    pub fn poll_complete(&mut self) -> Result<Option<Bytes>, PeerError> {
        if self.completed || self.received != self.total_len {
            return Ok(None);
        }
        self.completed = true;

        let digest = std::mem::take(&mut self.hasher).finalize();
        if digest.as_slice() != self.expected_digest {
            self.chunks.clear();
            return Err(PeerError::ProtocolViolation(format!(
                "transfer {}: digest mismatch",
                self.id
            )));
        }

        let chunks = std::mem::take(&mut self.chunks);
        let payload = match chunks.len() {
            0 => Bytes::new(),
            1 => chunks.into_iter().next().unwrap_or_default(),
            _ => {
                let mut buf = BytesMut::with_capacity(self.total_len as usize);
                for chunk in &chunks {
                    buf.extend_from_slice(chunk);
                }
                buf.freeze()
            }
        };
        Ok(Some(payload))
    }

    /// Drops any partial data; the receiver never completes afterwards.
    pub fn discard(&mut self) {
        self.chunks.clear();
        self.completed = true;
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::transfer::{ChunkSender, TransferMessage};

    fn pair(data: &[u8], chunk: usize) -> (ChunkSender, ChunkReceiver) {
        let sender = ChunkSender::new(TransferId(7), "f.bin", Bytes::copy_from_slice(data), chunk);
        let TransferMessage::Header {
            id,
            total_len,
            chunk_size,
            name,
            digest,
        } = sender.header()
        else {
            panic!("expected header");
        };
        let receiver =
            ChunkReceiver::new(id, name, total_len, chunk_size, digest).expect("receiver");
        (sender, receiver)
    }

    fn next(sender: &mut ChunkSender) -> (u64, Bytes) {
        match sender.next_chunk() {
            Some(TransferMessage::Chunk { seq, payload, .. }) => (seq, payload),
            other => panic!("expected chunk, got {other:?}"),
        }
    }

    #[test]
    fn reassembles_uneven_payload_once() {
        let data: Vec<u8> = (0..100u8).collect();
        let (mut tx, mut rx) = pair(&data, 30);
        let mut progress = Vec::new();
        while !tx.is_finished() {
            let (seq, payload) = next(&mut tx);
            progress.push(rx.accept(seq, payload).expect("accept"));
        }
        assert_eq!(progress, vec![30, 60, 90, 100]);
        let out = rx.poll_complete().expect("digest ok").expect("complete");
        assert_eq!(out.as_ref(), data.as_slice());
        assert_eq!(rx.poll_complete().expect("no error"), None);
    }

    #[test]
    fn empty_payload_completes_immediately() {
        let (_tx, mut rx) = pair(&[], 16);
        let out = rx.poll_complete().expect("digest ok").expect("complete");
        assert!(out.is_empty());
    }

    #[test]
    fn out_of_order_chunk_is_a_violation() {
        let (mut tx, mut rx) = pair(&[1u8; 64], 16);
        let _ = next(&mut tx);
        let (seq, payload) = next(&mut tx);
        assert!(matches!(
            rx.accept(seq, payload),
            Err(PeerError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn overflow_is_a_violation() {
        let mut rx = ChunkReceiver::new(TransferId(1), String::new(), 20, 16, [0; DIGEST_LEN])
            .expect("receiver");
        rx.accept(0, Bytes::from(vec![0u8; 16])).expect("first chunk");
        assert!(matches!(
            rx.accept(1, Bytes::from(vec![0u8; 16])),
            Err(PeerError::ProtocolViolation(_))
        ));
        assert_eq!(rx.bytes_transferred(), 16);
    }

    #[test]
    fn corrupted_payload_fails_digest() {
        let (mut tx, mut rx) = pair(b"abcdefgh", 8);
        let _ = next(&mut tx);
        rx.accept(0, Bytes::from_static(b"abcdefgX")).expect("sizes match");
        assert!(matches!(
            rx.poll_complete(),
            Err(PeerError::ProtocolViolation(_))
        ));
        assert_eq!(rx.poll_complete().expect("no error"), None);
    }

    #[test]
    fn discarded_receiver_never_completes() {
        let (mut tx, mut rx) = pair(&[5u8; 32], 16);
        let (seq, payload) = next(&mut tx);
        rx.accept(seq, payload).expect("accept");
        rx.discard();
        let (seq, payload) = next(&mut tx);
        assert!(rx.accept(seq, payload).is_err());
        assert_eq!(rx.poll_complete().expect("no error"), None);
    }
}
