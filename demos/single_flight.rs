//! Example demonstrating the request controller over a real HTTP transport.
//!
//! Probes a URL for existence, fetches it, then repeats the fetch with a
//! deadline far too short to meet so the timeout path is visible. Pass a URL
//! as the first argument to point it somewhere else.

use std::time::Duration;

use tower_single_flight::{
    ConfigBuilder, ProbeOutcome, RequestController, RequestOptions, ReqwestTransport,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let target = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://example.com/".to_string());

    println!("=== Single-Flight Controller Example ===\n");

    let config = ConfigBuilder::new().timeout(Duration::from_secs(5)).build();
    let controller = RequestController::with_config(ReqwestTransport::new(), config);

    // Probe never returns an error, only a classified outcome.
    println!("--- Probe: is {} reachable? ---", target);
    match controller.probe(&target, RequestOptions::new()).await {
        ProbeOutcome::Successful => println!("  Reachable (HTTP 200)"),
        outcome => println!(
            "  Not reachable: {}",
            outcome.reason().unwrap_or_default()
        ),
    }

    println!("\n--- Send: fetch the resource ---");
    match controller.send(&target, RequestOptions::new()).await {
        Ok(response) => {
            println!("  Status: {}", response.status);
            println!("  Body: {} bytes", response.body.len());
        }
        Err(e) => println!("  Failed: {}", e),
    }

    // The same fetch under a 1ms deadline settles as a timeout.
    println!("\n--- Send with a 1ms deadline ---");
    let hurried = RequestController::with_config(
        ReqwestTransport::new(),
        ConfigBuilder::new()
            .timeout(Duration::from_millis(1))
            .build(),
    );
    match hurried.send(&target, RequestOptions::new()).await {
        Ok(response) => println!("  Unexpectedly fast: {}", response.status),
        Err(e) => println!("  Rejected as expected: {}", e),
    }

    Ok(())
}
