//! Shared utilities for the demos.
//!
//! Provides:
//! - Command-line argument parsing
//! - Logging initialization
//! - Event printing
//! - Graceful exit handling

#![allow(dead_code)]

// ============================================================================
// Imports
// ============================================================================

use tcp_exchange::{DEFAULT_PORT, Event};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Types
// ============================================================================

/// Command-line arguments for the demos.
#[derive(Debug, Clone)]
pub struct Args {
    pub debug: bool,
    pub no_wait: bool,
    /// `--host <name>`, default `127.0.0.1`.
    pub host: String,
    /// `--port <n>`, default 9090.
    pub port: u16,
    /// `--interval <0..1>` enables auto-transmit.
    pub interval: Option<f64>,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let value = |flag: &str| {
            args.iter()
                .position(|a| a == flag)
                .and_then(|i| args.get(i + 1))
                .cloned()
        };

        Self {
            debug: args.iter().any(|a| a == "--debug"),
            no_wait: args.iter().any(|a| a == "--no-wait"),
            host: value("--host").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: value("--port")
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            interval: value("--interval").and_then(|f| f.parse().ok()),
        }
    }
}

// ============================================================================
// Functions
// ============================================================================

/// Initialize tracing/logging.
pub fn init_logging(debug: bool) {
    let filter = if debug {
        "tcp_exchange=debug"
    } else {
        "tcp_exchange=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

/// Print one event on a single line.
pub fn print_event(event: &Event) {
    match event {
        Event::Connected { endpoint, peer } => println!("    [{endpoint}] connected to {peer}"),
        Event::Disconnected { endpoint, error: None } => println!("    [{endpoint}] disconnected"),
        Event::Disconnected {
            endpoint,
            error: Some(e),
        } => println!("    [{endpoint}] disconnected: {e}"),
        Event::DataSent { endpoint, .. } => {
            println!("    [{endpoint}] -> {}", event.text().unwrap_or("<binary>"))
        }
        Event::DataReceived { endpoint, payload } => println!("    [{endpoint}] <- {payload}"),
    }
}

/// Wait for Ctrl+C or skip if `--no-wait` flag is set.
pub async fn wait_for_exit(no_wait: bool) {
    if no_wait {
        println!("[--no-wait] Skipping wait");
        return;
    }

    println!("Press Ctrl+C to exit...");
    tokio::signal::ctrl_c().await.ok();
}
