//! peerlink negotiates peer sessions and moves data between them.
//!
//! Two endpoints exchange offers, answers and trickled candidates over a
//! signaling transport, then open data channels and run chunked transfers
//! with progress reporting, backpressure and cancellation. The
//! `pair_demo` binary wires two endpoints together in one process.

/// Handles configuration loading and management.
pub mod config;
/// Offer/answer negotiation, connection states and the endpoint facade.
pub mod connection_manager;
/// Events reported by an endpoint.
pub mod core;
/// Data channels, their wire frames and send scheduling.
pub mod data_channel;
/// Logging utilities for the application.
pub mod log;
/// Drives two endpoints against each other in one process.
pub mod orchestrator;
/// Signaling messages, their binary codec and transports.
pub mod signaling;
/// Chunked transfer protocol over data channels.
pub mod transfer;
