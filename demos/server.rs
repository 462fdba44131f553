//! Single-client server.
//!
//! Demonstrates:
//! - Building an Exchange and subscribing to its bus
//! - Starting the server on the default port
//! - Answering each received message with the current time
//!
//! Usage:
//!   cargo run --example server
//!   cargo run --example server -- --port 4000
//!   cargo run --example server -- --debug

mod common;

// ============================================================================
// Imports
// ============================================================================

use anyhow::Result;
use common::Args;
use tcp_exchange::{Endpoint, Event, EventFilter, EventKind, Exchange};

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
    println!("=== Server ===\n");

    // ========================================================================
    // Start
    // ========================================================================

    let exchange = Exchange::builder().build()?;
    let server = exchange.server();

    exchange.bus().subscribe(EventFilter::all(), common::print_event);

    // Handlers run on the dispatch task; replies go out through a channel
    let (_replies, mut received) = exchange
        .bus()
        .subscribe_channel(EventFilter::only(EventKind::DataReceived).from_endpoint(server.id()));

    println!("[1] Listening on port {}...", args.port);
    server.start(args.port).await?;
    println!("    ✓ Bound to {}\n", server.local_addr().map_or_else(String::new, |a| a.to_string()));

    // ========================================================================
    // Reply Loop
    // ========================================================================

    println!("[2] Replying to each message with a timestamp");

    let replier = server.clone();
    let replies = tokio::spawn(async move {
        while let Some(Event::DataReceived { .. }) = received.recv().await {
            if let Err(e) = replier.send_timestamp().await {
                eprintln!("    reply failed: {e}");
            }
        }
    });

    common::wait_for_exit(args.no_wait).await;

    // ========================================================================
    // Shutdown
    // ========================================================================

    println!("\n[3] Stopping...");
    server.stop().await;
    exchange.close();
    replies.await.ok();
    println!("    ✓ Done");

    Ok(())
}
