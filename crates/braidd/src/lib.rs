//! Braid daemon library surface
//!
//! The binary in `main.rs` is a thin shell over these modules; integration
//! tests boot the same `Server` in-process.

#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod exit_codes;
pub mod logging;
pub mod server;

pub use braid_protocol::model::PeerInfo;
pub use config::{GeneralConfiguration, LogType, LoggingConfiguration};
pub use server::Server;
