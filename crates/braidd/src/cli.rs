//! Command-line interface

use clap::Parser;
use std::path::PathBuf;

/// Braid hybrid key-derivation daemon
#[derive(Debug, Parser)]
#[command(name = "braidd", version, about = "ETSI-004 hybrid key-derivation daemon")]
pub struct Cli {
    /// Node configuration document
    #[arg(long = "config", env = "CFGFILE", value_name = "FILE")]
    pub config: PathBuf,

    /// Trusted-peers document
    #[arg(long = "peers", env = "TRUSTED_PEERS_INFO", value_name = "FILE")]
    pub peers: PathBuf,
}
