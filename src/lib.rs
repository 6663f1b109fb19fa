//! Tracker gateway - TCP ingest for GPS/health tracker devices
//!
//! Devices hold a persistent TCP connection and send `(`…`)` delimited ASCII
//! frames. The gateway reassembles frames from the byte stream, validates and
//! decodes them into typed telemetry, and acknowledges every parsed packet.

pub mod gateway_config;
pub mod metrics;
pub mod simulator;
pub mod tracker;
pub mod web;

pub use gateway_config::GatewayConfig;
pub use tracker::{GatewayServer, Packet, ParseError, SessionHandler, TypedPayload, decode_frame};
