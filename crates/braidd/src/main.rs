//! Braid daemon - hybrid key-derivation service

#![forbid(unsafe_code)]

use braidd::{config, exit_codes, logging, server};
use clap::Parser;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let cli = braidd::cli::Cli::parse();

    let general = match config::load_general_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {:#}", e);
            std::process::exit(exit_codes::ERROR);
        }
    };
    let peers_info = match config::load_trusted_peers(&cli.peers) {
        Ok(peers) => peers,
        Err(e) => {
            eprintln!("Error loading configuration: {:#}", e);
            std::process::exit(exit_codes::ERROR);
        }
    };

    let _log_guard = match logging::init(&general.logging_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error initializing logging: {:#}", e);
            std::process::exit(exit_codes::ERROR);
        }
    };

    let agent_address = general.hybridization_server_address.clone();
    let server = match server::Server::new(general, peers_info) {
        Ok(server) => server,
        Err(e) => {
            eprintln!("Error starting the daemon: {:#}", e);
            std::process::exit(exit_codes::ERROR);
        }
    };

    let listener = match server.bind().await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Error binding the agent address: {:#}", e);
            std::process::exit(exit_codes::ERROR);
        }
    };

    println!("Starting braidd on {}...", agent_address);
    let outcome = tokio::select! {
        result = Arc::clone(&server).serve(listener) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down server gracefully");
            Ok(())
        }
    };

    server.shutdown().await;

    match outcome {
        Ok(()) => std::process::exit(exit_codes::SUCCESS),
        Err(e) => {
            tracing::error!("server failed: {:#}", e);
            std::process::exit(exit_codes::ERROR);
        }
    }
}
