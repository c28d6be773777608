//! Runs two endpoints in one process: negotiates, says hello on `chat`,
//! then sends a file over `files` and reports progress.
//!
//! Usage: `pair_demo [CONFIG] [FILE]`. Without a config, `pair_demo.conf` is
//! tried and built-in defaults are used if it is missing. Without a file, a
//! generated 1 MiB payload is sent.

use std::error::Error;
use std::{env, fs, process};

use peerlink::config::{Config, LogConfig, PairConfig, PeerConfig};
use peerlink::core::{PeerEvent, TransferDirection};
use peerlink::log::logger::Logger;
use peerlink::orchestrator::{ConnectionPair, Side};
use peerlink::{sink_info, sink_warn};

const DEFAULT_CONFIG: &str = "pair_demo.conf";
const GENERATED_LEN: usize = 1024 * 1024;

fn main() {
    if let Err(e) = run() {
        eprintln!("[pair_demo] {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = env::args().collect();
    let config = match args.get(1) {
        Some(path) => Config::load(path)?,
        None => Config::load(DEFAULT_CONFIG).unwrap_or_else(|e| {
            eprintln!("[pair_demo] {e}. Using defaults.");
            Config::empty()
        }),
    };
    let peer = PeerConfig::from_config(&config)?;
    let pair_config = PairConfig::from_config(&config)?;
    let logger = Logger::start(&LogConfig::from_config(&config)?);
    let log_sink = logger.sink();
    println!("[pair_demo] logging to {}", logger.file_path().display());

    let (name, payload) = match args.get(2) {
        Some(path) => (path.clone(), fs::read(path)?),
        None => (
            "generated.bin".to_owned(),
            (0..GENERATED_LEN).map(|i| (i % 251) as u8).collect(),
        ),
    };

    let mut pair = ConnectionPair::new(&peer, pair_config, log_sink.clone());
    pair.negotiate()?;
    println!("[pair_demo] connected");

    let chat = pair.open_channel(Side::Local, "chat", true)?;
    let files = pair.open_channel(Side::Local, "files", true)?;
    pair.pump();

    pair.send_text(Side::Local, chat, "hello")?;
    let transfer = pair.start_named_transfer(Side::Local, files, &name, payload.clone())?;
    sink_info!(log_sink, "[DEMO] transfer {} of {} bytes queued", transfer, payload.len());
    let frames = pair.pump();
    println!("[pair_demo] {frames} frames exchanged");

    for side in [Side::Local, Side::Remote] {
        let mut quarter = 0;
        for event in pair.drain_events(side) {
            report(side, &event, &payload, &mut quarter);
        }
    }

    pair.close(Side::Local, Some("demo finished"))?;
    if logger.dropped() > 0 {
        sink_warn!(log_sink, "[DEMO] {} log records dropped", logger.dropped());
    }
    Ok(())
}

fn report(side: Side, event: &PeerEvent, sent: &[u8], quarter: &mut u64) {
    match event {
        PeerEvent::Message { channel, payload, .. } => {
            println!(
                "[{side:?}] message on {channel}: {}",
                String::from_utf8_lossy(payload)
            );
        }
        PeerEvent::TransferProgress {
            direction: TransferDirection::Receive,
            bytes_transferred,
            total_len,
            ..
        } => {
            // Print once per quarter of the file.
            let reached = (bytes_transferred * 4).checked_div(*total_len).unwrap_or(4);
            if reached > *quarter {
                *quarter = reached;
                println!("[{side:?}] received {bytes_transferred}/{total_len} bytes");
            }
        }
        PeerEvent::TransferComplete { id, name, payload, .. } => {
            let verdict = if &payload[..] == sent { "intact" } else { "CORRUPT" };
            println!("[{side:?}] transfer {id} ({name}) complete, {verdict}");
        }
        PeerEvent::TransferError { id, error, .. } => {
            println!("[{side:?}] transfer {id} failed: {error}");
        }
        PeerEvent::Error(e) => println!("[{side:?}] error: {e}"),
        _ => {}
    }
}
