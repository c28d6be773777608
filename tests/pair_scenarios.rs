#![allow(clippy::expect_used)]

use std::sync::mpsc;
use std::sync::Arc;

use bytes::Bytes;
use peerlink::config::{PairConfig, PeerConfig};
use peerlink::connection_manager::{ConnectionState, ErrorKind, IcePhase, PeerError};
use peerlink::core::{PeerEvent, TransferDirection};
use peerlink::data_channel::{ChannelId, ChannelState, PayloadKind};
use peerlink::log::NoopLogSink;
use peerlink::orchestrator::{ConnectionPair, Side};
use peerlink::transfer::TransferId;
use peerlink::transfer::protocol::CHUNK_OVERHEAD;

const MIB: usize = 1024 * 1024;

fn pair_with(frames_per_tick: usize) -> ConnectionPair {
    let config = PairConfig {
        max_frames_per_tick: frames_per_tick,
        ..PairConfig::default()
    };
    ConnectionPair::new(&PeerConfig::default(), config, Arc::new(NoopLogSink))
}

/// Negotiated pair with an open ordered channel created by the local side.
fn connected_with_channel(frames_per_tick: usize, label: &str) -> (ConnectionPair, ChannelId) {
    let mut pair = pair_with(frames_per_tick);
    pair.negotiate().expect("negotiate");
    let channel = pair.open_channel(Side::Local, label, true).expect("channel");
    pair.pump();
    assert_eq!(
        pair.endpoint(Side::Local).channel_state(channel),
        Some(ChannelState::Open)
    );
    pair.drain_events(Side::Local);
    pair.drain_events(Side::Remote);
    (pair, channel)
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

fn progress(events: &[PeerEvent], want: TransferDirection) -> Vec<(u64, u64)> {
    events
        .iter()
        .filter_map(|e| match e {
            PeerEvent::TransferProgress {
                direction,
                bytes_transferred,
                total_len,
                ..
            } if *direction == want => Some((*bytes_transferred, *total_len)),
            _ => None,
        })
        .collect()
}

fn completions(events: &[PeerEvent]) -> Vec<(TransferId, String, Bytes)> {
    events
        .iter()
        .filter_map(|e| match e {
            PeerEvent::TransferComplete {
                id, name, payload, ..
            } => Some((*id, name.clone(), payload.clone())),
            _ => None,
        })
        .collect()
}

fn transfer_errors(events: &[PeerEvent]) -> Vec<(TransferDirection, PeerError)> {
    events
        .iter()
        .filter_map(|e| match e {
            PeerEvent::TransferError {
                direction, error, ..
            } => Some((*direction, error.clone())),
            _ => None,
        })
        .collect()
}

#[test]
fn hello_on_chat_reaches_the_remote_handler() {
    let mut pair = pair_with(8);
    pair.negotiate().expect("negotiate");

    let (tx, rx) = mpsc::channel::<(String, String)>();
    let (remote_tx, remote_rx) = mpsc::channel::<(ChannelId, String)>();
    pair.endpoint_mut(Side::Remote)
        .on_remote_channel(move |id, label| {
            let _ = remote_tx.send((id, label.to_owned()));
        });

    let chat = pair.open_channel(Side::Local, "chat", true).expect("channel");
    pair.pump();
    let (announced, label) = remote_rx.try_recv().expect("remote channel callback");
    assert_eq!((announced, label.as_str()), (chat, "chat"));

    pair.endpoint_mut(Side::Remote)
        .on_message(chat, move |_, kind, payload| {
            let text = String::from_utf8_lossy(payload).into_owned();
            let _ = tx.send((format!("{kind:?}"), text));
        })
        .expect("handler");

    pair.send_text(Side::Local, chat, "hello").expect("send");
    pair.pump();

    assert_eq!(
        rx.try_recv().expect("delivered"),
        ("Text".to_owned(), "hello".to_owned())
    );
    let events = pair.drain_events(Side::Remote);
    assert!(events.iter().any(|e| matches!(
        e,
        PeerEvent::Message { channel, kind: PayloadKind::Text, payload }
            if *channel == chat && &payload[..] == b"hello"
    )));
}

#[test]
fn one_mebibyte_moves_in_sixty_four_chunks() {
    let (mut pair, files) = connected_with_channel(8, "files");
    let payload = pattern(MIB);
    let id = pair
        .start_named_transfer(Side::Local, files, "blob.bin", payload.clone())
        .expect("transfer");
    pair.pump();

    let sent = pair.drain_events(Side::Local);
    let received = pair.drain_events(Side::Remote);

    for (events, direction) in [
        (&sent, TransferDirection::Send),
        (&received, TransferDirection::Receive),
    ] {
        let steps = progress(events, direction);
        assert_eq!(steps.len(), 64, "{direction:?}");
        assert!(steps.windows(2).all(|w| w[0].0 < w[1].0), "{direction:?}");
        assert!(steps.iter().all(|&(done, total)| done <= total && total == MIB as u64));
        assert_eq!(steps.last().map(|s| s.0), Some(MIB as u64));
    }

    assert!(sent
        .iter()
        .any(|e| matches!(e, PeerEvent::TransferSent { id: done, .. } if *done == id)));
    let done = completions(&received);
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].0, id);
    assert_eq!(done[0].1, "blob.bin");
    assert_eq!(&done[0].2[..], payload.as_slice());
}

#[test]
fn stale_description_leaves_state_unchanged() {
    let mut pair = pair_with(8);
    pair.negotiate().expect("negotiate");
    let offer = pair
        .endpoint(Side::Local)
        .negotiator()
        .local_description()
        .cloned()
        .expect("offer");

    let remote = pair.endpoint_mut(Side::Remote);
    let err = remote.set_remote_description(offer).expect_err("stale");
    assert!(matches!(err, PeerError::StaleDescription { .. }));
    assert_eq!(err.kind(), ErrorKind::StaleDescription);
    assert_eq!(remote.state(), ConnectionState::Connected);
    assert_eq!(remote.ice_phase(), IcePhase::Nominated);
}

#[test]
fn cancelled_transfer_never_completes() {
    let (mut pair, files) = connected_with_channel(2, "files");
    let id = pair
        .start_transfer(Side::Local, files, pattern(MIB))
        .expect("transfer");
    for _ in 0..3 {
        pair.pump_once();
    }
    pair.cancel_transfer(Side::Local, id).expect("cancel");
    pair.pump();

    let local = pair.drain_events(Side::Local);
    let remote = pair.drain_events(Side::Remote);
    assert!(completions(&remote).is_empty());
    assert_eq!(
        transfer_errors(&local),
        vec![(TransferDirection::Send, PeerError::TransferCancelled)]
    );
    assert_eq!(
        transfer_errors(&remote),
        vec![(TransferDirection::Receive, PeerError::TransferCancelled)]
    );
    assert!(!local.iter().any(|e| matches!(e, PeerEvent::TransferSent { .. })));
    assert_eq!(
        pair.cancel_transfer(Side::Local, id),
        Err(PeerError::UnknownTransfer(id))
    );

    // The channel stays usable for the next transfer.
    pair.start_transfer(Side::Local, files, pattern(1000))
        .expect("second transfer");
    pair.pump();
    assert_eq!(completions(&pair.drain_events(Side::Remote)).len(), 1);
}

#[test]
fn receiver_can_cancel_too() {
    let (mut pair, files) = connected_with_channel(2, "files");
    let id = pair
        .start_transfer(Side::Local, files, pattern(MIB))
        .expect("transfer");
    pair.pump_once();
    pair.pump_once();
    pair.cancel_transfer(Side::Remote, id).expect("cancel inbound");
    pair.pump();

    assert!(completions(&pair.drain_events(Side::Remote)).is_empty());
    assert_eq!(
        transfer_errors(&pair.drain_events(Side::Local)),
        vec![(TransferDirection::Send, PeerError::TransferCancelled)]
    );
}

#[test]
fn closing_the_channel_cancels_its_transfer() {
    let (mut pair, files) = connected_with_channel(2, "files");
    pair.start_transfer(Side::Local, files, pattern(MIB))
        .expect("transfer");
    pair.pump_once();
    pair.pump_once();
    pair.close_channel(Side::Local, files).expect("close");
    assert_eq!(
        pair.endpoint(Side::Local).channel_state(files),
        Some(ChannelState::Closing)
    );
    assert_eq!(
        pair.send_text(Side::Local, files, "late"),
        Err(PeerError::ChannelClosed)
    );
    pair.pump();

    let local = pair.drain_events(Side::Local);
    let remote = pair.drain_events(Side::Remote);
    assert_eq!(
        transfer_errors(&local),
        vec![(TransferDirection::Send, PeerError::ChannelClosed)]
    );
    assert_eq!(
        transfer_errors(&remote),
        vec![(TransferDirection::Receive, PeerError::ChannelClosed)]
    );
    assert!(completions(&remote).is_empty());
    for events in [&local, &remote] {
        assert!(events
            .iter()
            .any(|e| matches!(e, PeerEvent::ChannelClosed { channel } if *channel == files)));
    }
    for side in [Side::Local, Side::Remote] {
        assert_eq!(
            pair.endpoint(side).channel_state(files),
            Some(ChannelState::Closed)
        );
    }
}

#[test]
fn calls_on_a_closed_channel_report_channel_closed() {
    let (mut pair, chat) = connected_with_channel(8, "chat");
    pair.close_channel(Side::Remote, chat).expect("close");
    pair.pump();

    for side in [Side::Local, Side::Remote] {
        assert_eq!(
            pair.endpoint(side).channel_state(chat),
            Some(ChannelState::Closed)
        );
        let err = pair.send_text(side, chat, "late").expect_err("closed");
        assert_eq!(err, PeerError::ChannelClosed);
        assert_eq!(err.kind(), ErrorKind::ChannelClosed);
        assert_eq!(
            pair.send(side, chat, vec![1u8, 2, 3]),
            Err(PeerError::ChannelClosed)
        );
        assert_eq!(
            pair.start_transfer(side, chat, vec![0u8; 64]),
            Err(PeerError::ChannelClosed)
        );
        assert_eq!(pair.close_channel(side, chat), Ok(()));
    }
    // The label is free again.
    let again = pair.open_channel(Side::Local, "chat", true).expect("reopen");
    pair.pump();
    assert_eq!(
        pair.endpoint(Side::Remote).channel_state(again),
        Some(ChannelState::Open)
    );
}

#[test]
fn simultaneous_open_of_one_label_closes_both() {
    let mut pair = pair_with(8);
    pair.negotiate().expect("negotiate");
    let ours = pair.open_channel(Side::Local, "chat", true).expect("local");
    let theirs = pair.open_channel(Side::Remote, "chat", true).expect("remote");
    assert_ne!(ours, theirs);
    pair.pump();

    for (side, own) in [(Side::Local, ours), (Side::Remote, theirs)] {
        let endpoint = pair.endpoint(side);
        assert_eq!(endpoint.channel_state(own), Some(ChannelState::Closed));
        assert_eq!(endpoint.state(), ConnectionState::Connected);
        let events = pair.drain_events(side);
        assert!(events
            .iter()
            .any(|e| matches!(e, PeerEvent::ChannelClosed { channel } if *channel == own)));
        assert!(!events
            .iter()
            .any(|e| matches!(e, PeerEvent::ChannelOpened { .. })));
    }

    let chat = pair.open_channel(Side::Local, "chat", true).expect("retry");
    pair.pump();
    for side in [Side::Local, Side::Remote] {
        assert_eq!(
            pair.endpoint(side).channel_state(chat),
            Some(ChannelState::Open)
        );
    }
}

#[test]
fn sending_while_connecting_is_rejected() {
    let mut pair = pair_with(8);
    pair.negotiate().expect("negotiate");
    let chat = pair.open_channel(Side::Local, "chat", true).expect("channel");
    assert_eq!(
        pair.endpoint(Side::Local).channel_state(chat),
        Some(ChannelState::Connecting)
    );
    let err = pair.send_text(Side::Local, chat, "too early").expect_err("connecting");
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert!(matches!(
        pair.start_transfer(Side::Local, chat, vec![1u8; 10]),
        Err(PeerError::InvalidState(_))
    ));

    pair.pump();
    pair.send_text(Side::Local, chat, "now").expect("open");
}

#[test]
fn pair_fails_together_without_candidates() {
    let silent = PeerConfig {
        host_candidates: Vec::new(),
        ..PeerConfig::default()
    };
    let mut pair = ConnectionPair::with_configs(
        &PeerConfig::default(),
        &silent,
        PairConfig::default(),
        Arc::new(NoopLogSink),
    );
    let err = pair.negotiate().expect_err("no candidate pair");
    assert_eq!(err.kind(), ErrorKind::NegotiationFailed);
    for side in [Side::Local, Side::Remote] {
        assert_eq!(pair.endpoint(side).state(), ConnectionState::Failed);
        let events = pair.drain_events(side);
        assert!(events
            .iter()
            .any(|e| matches!(e, PeerEvent::ConnectionStateChanged(ConnectionState::Failed))));
    }
    assert!(matches!(
        pair.open_channel(Side::Local, "chat", true),
        Err(PeerError::InvalidState(_))
    ));
}

#[test]
fn buffered_amount_stays_bounded() {
    let config = PeerConfig::default();
    let bound = config.low_water_mark + config.chunk_size + CHUNK_OVERHEAD;
    let (mut pair, files) = connected_with_channel(1, "files");
    pair.start_transfer(Side::Local, files, pattern(MIB))
        .expect("transfer");

    let mut peak = 0;
    loop {
        let buffered = pair
            .endpoint(Side::Local)
            .buffered_amount(files)
            .expect("channel");
        assert!(buffered <= bound, "{buffered} > {bound}");
        peak = peak.max(buffered);
        if pair.pump_once() == 0 {
            break;
        }
    }
    assert!(peak > config.low_water_mark);

    let local = pair.drain_events(Side::Local);
    assert!(local
        .iter()
        .any(|e| matches!(e, PeerEvent::BufferedAmountLow { channel, .. } if *channel == files)));
    assert_eq!(completions(&pair.drain_events(Side::Remote)).len(), 1);
}

#[test]
fn empty_transfer_completes_without_progress() {
    let (mut pair, files) = connected_with_channel(8, "files");
    let id = pair
        .start_named_transfer(Side::Local, files, "empty.txt", Bytes::new())
        .expect("transfer");
    pair.pump();

    let local = pair.drain_events(Side::Local);
    let remote = pair.drain_events(Side::Remote);
    assert!(progress(&local, TransferDirection::Send).is_empty());
    assert!(progress(&remote, TransferDirection::Receive).is_empty());
    assert!(local
        .iter()
        .any(|e| matches!(e, PeerEvent::TransferSent { id: done, .. } if *done == id)));
    let done = completions(&remote);
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].1, "empty.txt");
    assert!(done[0].2.is_empty());
}

#[test]
fn unordered_channels_carry_messages_but_not_transfers() {
    let mut pair = pair_with(8);
    pair.negotiate().expect("negotiate");
    let lossy = pair.open_channel(Side::Remote, "telemetry", false).expect("channel");
    assert_eq!(lossy, ChannelId(1));
    pair.pump();

    assert!(matches!(
        pair.start_transfer(Side::Remote, lossy, vec![0u8; 100]),
        Err(PeerError::InvalidState(_))
    ));
    pair.send(Side::Remote, lossy, vec![9u8; 4]).expect("send");
    pair.pump();
    assert!(pair.drain_events(Side::Local).iter().any(|e| matches!(
        e,
        PeerEvent::Message { kind: PayloadKind::Binary, payload, .. } if payload[..] == [9u8; 4]
    )));
}

#[test]
fn oversized_messages_are_refused() {
    let (mut pair, chat) = connected_with_channel(8, "chat");
    let max = PeerConfig::default().max_message_size;
    let err = pair
        .send(Side::Local, chat, vec![0u8; max + 1])
        .expect_err("too large");
    assert_eq!(err, PeerError::MessageTooLarge { size: max + 1, max });
    assert_eq!(pair.endpoint(Side::Local).buffered_amount(chat), Some(0));
}

#[test]
fn transfers_run_both_ways_at_once() {
    let (mut pair, files) = connected_with_channel(3, "files");
    let up = pattern(100_000);
    let down: Vec<u8> = pattern(70_000).into_iter().rev().collect();
    pair.start_named_transfer(Side::Local, files, "up", up.clone())
        .expect("up");
    pair.start_named_transfer(Side::Remote, files, "down", down.clone())
        .expect("down");
    pair.pump();

    let at_remote = completions(&pair.drain_events(Side::Remote));
    let at_local = completions(&pair.drain_events(Side::Local));
    assert_eq!(at_remote.len(), 1);
    assert_eq!(at_local.len(), 1);
    assert_eq!(&at_remote[0].2[..], up.as_slice());
    assert_eq!(&at_local[0].2[..], down.as_slice());
}

#[test]
fn bye_closes_both_endpoints_and_their_channels() {
    let (mut pair, chat) = connected_with_channel(8, "chat");
    pair.close(Side::Local, Some("done")).expect("bye");
    for side in [Side::Local, Side::Remote] {
        assert_eq!(pair.endpoint(side).state(), ConnectionState::Closed);
        assert_eq!(
            pair.endpoint(side).channel_state(chat),
            Some(ChannelState::Closed)
        );
        assert!(pair
            .drain_events(side)
            .iter()
            .any(|e| matches!(e, PeerEvent::ChannelClosed { channel } if *channel == chat)));
    }
}
