//! Example demonstrating the layer form of the controller.
//!
//! Wraps a deliberately slow in-process transport in `SingleFlightLayer`,
//! then stops a call from a second task and lets a newer call supersede an
//! older one. Runs entirely offline.

use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use tokio::time::sleep;
use tower::{service_fn, BoxError, Layer, Service, ServiceExt};
use tower_single_flight::{
    Cancelled, ConfigBuilder, FlightRequest, SingleFlightLayer, TransportRequest,
    TransportResponse,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt::init();

    // Answers after 400ms unless the flight's signal fires first.
    let slow = service_fn(|req: TransportRequest| async move {
        tokio::select! {
            _ = req.signal.cancelled() => Err::<TransportResponse, BoxError>(Cancelled.into()),
            _ = sleep(Duration::from_millis(400)) => Ok(TransportResponse {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                body: Bytes::from_static(b"finally"),
            }),
        }
    });

    let layer = SingleFlightLayer::new(ConfigBuilder::new().no_timeout().build());
    let mut service = layer.layer(slow);
    let stop = service.stop_handle();

    println!("=== Stop Handle Example ===\n");
    println!("--- Example 1: explicit stop from another task ---");

    let stopper = tokio::spawn({
        let stop = stop.clone();
        async move {
            sleep(Duration::from_millis(150)).await;
            println!("  [stopper] cancelling the in-flight request");
            stop.cancel();
        }
    });

    match service
        .ready()
        .await?
        .call(FlightRequest::new("fake://slow/resource"))
        .await
    {
        Ok(_) => println!("  Unexpected success"),
        Err(e) => println!("  Rejected as expected: {}", e),
    }
    stopper.await?;
    println!("  Flight still active? {}", stop.is_active());

    // Clones share one controller, so the second call displaces the first.
    println!("\n--- Example 2: a newer call supersedes an older one ---");

    let mut older_service = service.clone();
    let mut newer_service = service.clone();
    let (older, newer) = tokio::join!(
        async move {
            older_service
                .ready()
                .await?
                .call(FlightRequest::new("fake://slow/one"))
                .await
        },
        async move {
            sleep(Duration::from_millis(150)).await;
            println!("  [newer] starting while the older call is in flight");
            newer_service
                .ready()
                .await?
                .call(FlightRequest::new("fake://slow/two"))
                .await
        },
    );

    match older {
        Ok(_) => println!("  Older call: unexpected success"),
        Err(e) => println!("  Older call rejected: {}", e),
    }
    match newer {
        Ok(response) => println!("  Newer call settled with status {}", response.status),
        Err(e) => println!("  Newer call failed: {}", e),
    }

    Ok(())
}
