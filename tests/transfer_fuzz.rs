#![allow(clippy::expect_used)]

use std::sync::Arc;

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use peerlink::config::{PairConfig, PeerConfig};
use peerlink::connection_manager::PeerError;
use peerlink::core::{PeerEvent, TransferDirection};
use peerlink::log::NoopLogSink;
use peerlink::orchestrator::{ConnectionPair, Side};
use peerlink::transfer::{ChunkReceiver, ChunkSender, TransferId, TransferMessage};

fn random_payload(rng: &mut StdRng, len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rng.fill(data.as_mut_slice());
    data
}

/// Checks that progress in `direction` only grows and never passes the total.
fn assert_monotonic(events: &[PeerEvent], direction: TransferDirection, seed: u64) {
    let mut last = None;
    for event in events {
        if let PeerEvent::TransferProgress {
            direction: d,
            bytes_transferred,
            total_len,
            ..
        } = event
            && *d == direction
        {
            assert!(bytes_transferred <= total_len, "seed {seed}");
            assert!(last < Some(*bytes_transferred), "seed {seed}: {last:?} -> {bytes_transferred}");
            last = Some(*bytes_transferred);
        }
    }
}

fn completed(events: &[PeerEvent]) -> Vec<Bytes> {
    events
        .iter()
        .filter_map(|e| match e {
            PeerEvent::TransferComplete { payload, .. } => Some(payload.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn randomized_timing_and_cancellation() {
    for seed in 0..24u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let chunk_size = [512, 4096, 16 * 1024][rng.gen_range(0..3)];
        let peer = PeerConfig {
            chunk_size,
            low_water_mark: [0, 8 * 1024, 64 * 1024][rng.gen_range(0..3)],
            ..PeerConfig::default()
        };
        let pair_config = PairConfig {
            max_frames_per_tick: rng.gen_range(1..=6),
            ..PairConfig::default()
        };
        let mut pair = ConnectionPair::new(&peer, pair_config, Arc::new(NoopLogSink));
        pair.negotiate().expect("negotiate");
        let files = pair.open_channel(Side::Local, "files", true).expect("channel");
        pair.pump();

        let len = rng.gen_range(0..300_000);
        let payload = random_payload(&mut rng, len);
        let cancel_after = rng.gen_bool(0.4).then(|| rng.gen_range(0..40));
        let id = pair
            .start_transfer(Side::Local, files, payload.clone())
            .expect("transfer");

        let mut cancelled = false;
        let mut tick = 0;
        loop {
            if cancel_after == Some(tick) {
                match pair.cancel_transfer(Side::Local, id) {
                    Ok(()) => cancelled = true,
                    // Already fully sent.
                    Err(e) => assert_eq!(e, PeerError::UnknownTransfer(id), "seed {seed}"),
                }
            }
            let moved = pair.pump_once();
            tick += 1;
            if moved == 0 && cancel_after.is_none_or(|at| at < tick) {
                break;
            }
        }

        let local = pair.drain_events(Side::Local);
        let remote = pair.drain_events(Side::Remote);
        assert_monotonic(&local, TransferDirection::Send, seed);
        assert_monotonic(&remote, TransferDirection::Receive, seed);

        let done = completed(&remote);
        if cancelled {
            assert!(done.is_empty(), "seed {seed}: completed after cancel");
        } else {
            assert_eq!(done.len(), 1, "seed {seed}");
            assert_eq!(&done[0][..], payload.as_slice(), "seed {seed}");
        }
    }
}

#[test]
fn receiver_rebuilds_any_chunking() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..32 {
        let len = rng.gen_range(0..50_000);
        let chunk_size = rng.gen_range(1..=9_000);
        let source = Bytes::from(random_payload(&mut rng, len));
        let mut sender = ChunkSender::new(TransferId(1), "f", source.clone(), chunk_size);

        let TransferMessage::Header {
            id,
            total_len,
            chunk_size: announced,
            name,
            digest,
        } = sender.header()
        else {
            panic!("header expected");
        };
        let mut receiver =
            ChunkReceiver::new(id, name, total_len, announced, digest).expect("receiver");

        while let Some(TransferMessage::Chunk { seq, payload, .. }) = sender.next_chunk() {
            let received = receiver.accept(seq, payload).expect("chunk");
            assert_eq!(received, sender.bytes_transferred());
        }
        let rebuilt = receiver.poll_complete().expect("digest").expect("complete");
        assert_eq!(rebuilt, source);
        assert_eq!(receiver.poll_complete(), Ok(None));
    }
}

#[test]
fn corrupted_chunk_fails_the_digest() {
    let mut rng = StdRng::seed_from_u64(11);
    let source = Bytes::from(random_payload(&mut rng, 40_000));
    let mut sender = ChunkSender::new(TransferId(2), "", source, 4096);
    let TransferMessage::Header {
        id,
        total_len,
        chunk_size,
        name,
        digest,
    } = sender.header()
    else {
        panic!("header expected");
    };
    let mut receiver = ChunkReceiver::new(id, name, total_len, chunk_size, digest).expect("receiver");

    let victim = rng.gen_range(0..10u64);
    while let Some(TransferMessage::Chunk { seq, payload, .. }) = sender.next_chunk() {
        let payload = if seq == victim {
            let mut bad = payload.to_vec();
            bad[0] ^= 0xff;
            Bytes::from(bad)
        } else {
            payload
        };
        receiver.accept(seq, payload).expect("chunk");
    }
    assert!(matches!(
        receiver.poll_complete(),
        Err(PeerError::ProtocolViolation(_))
    ));
}
