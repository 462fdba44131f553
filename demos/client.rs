//! Client with optional auto-transmit.
//!
//! Demonstrates:
//! - Parsing a `tcp://host:port` target
//! - Connecting and sending one timestamp
//! - Sending a timestamp periodically with AutoTransmit
//!
//! Usage:
//!   cargo run --example client
//!   cargo run --example client -- --host 10.0.0.2 --port 4000
//!   cargo run --example client -- --interval 0.0 --debug

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use common::Args;
use tcp_exchange::{AutoTransmit, Endpoint, EventFilter, Exchange, Target, TransmitInterval};

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    common::init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    println!("=== Client ===\n");

    let exchange = Exchange::builder().build()?;
    exchange.bus().subscribe(EventFilter::all(), common::print_event);

    // ========================================================================
    // Connect
    // ========================================================================

    let target = Target::parse(&format!("tcp://{}:{}", args.host, args.port))
        .with_context(|| format!("bad target {}:{}", args.host, args.port))?;

    println!("[1] Connecting to {target}...");
    let client = exchange.client();
    client.connect_to(&target).await?;
    println!("    ✓ Connected\n");

    // ========================================================================
    // Send
    // ========================================================================

    println!("[2] Sending a timestamp...");
    let stamp = client.send_timestamp().await?;
    println!("    ✓ Sent {stamp}\n");

    // ========================================================================
    // Auto-transmit
    // ========================================================================

    let transmit = match args.interval {
        Some(fraction) => {
            let interval = TransmitInterval::from_fraction(fraction);
            println!("[3] Auto-transmit every {interval}");
            Some(AutoTransmit::spawn(Arc::new(client.clone()), interval)?)
        }
        None => None,
    };

    common::wait_for_exit(args.no_wait).await;

    if let Some(transmit) = transmit {
        transmit.stop().await;
    }
    client.disconnect();
    exchange.bus().flush().await;

    Ok(())
}
