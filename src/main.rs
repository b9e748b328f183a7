// src/main.rs

//! The main entry point for the cluster controller process.

use anyhow::Result;
use clusterd::config::Config;
use clusterd::server;
use std::env;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{filter::EnvFilter, prelude::*, reload};

#[tokio::main]
async fn main() -> Result<()> {
    run_app().await
}

async fn run_app() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("clusterd version {VERSION}");
        return Ok(());
    }

    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
        .unwrap_or("clusterd.toml");

    let mut config = match Config::from_file(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from \"{config_path}\": {e}");
            std::process::exit(78); // FATAL_CONFIG per the client exit-code table
        }
    };

    if let Some(port_index) = args.iter().position(|arg| arg == "--port") {
        if let Some(port_str) = args.get(port_index + 1) {
            match port_str.parse::<u16>() {
                Ok(port) => config.slurmctld_port = port,
                Err(_) => {
                    eprintln!("Invalid port number: {port_str}");
                    std::process::exit(1);
                }
            }
        } else {
            eprintln!("--port flag requires a value");
            std::process::exit(1);
        }
    }

    let initial_log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    let (filter, reload_handle) = reload::Layer::new(EnvFilter::new(initial_log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact().with_ansi(true))
        .init();

    let reload_handle = Arc::new(reload_handle);

    if let Err(e) = server::run(config, reload_handle).await {
        error!("Controller runtime error: {}", e);
        return Err(e);
    }

    Ok(())
}
