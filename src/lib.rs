//! # tower-single-flight
//!
//! A single-flight HTTP request controller built on Tower. A controller owns
//! at most one in-flight request at a time: starting a new `probe` or `send`
//! deterministically stops the previous one, an explicit `cancel` stops it
//! early, and a per-flight deadline stops it late. Every way a flight can end
//! settles into one classified outcome.
//!
//! ## Core Concepts
//!
//! - **RequestController**: owns the single cancellation scope; exposes
//!   `probe` (HEAD-style existence check that never fails), `send` (full
//!   request), and `cancel`
//! - **Transport**: any `tower::Service<TransportRequest>`; `ReqwestTransport`
//!   is the production implementation, and test fakes are a `service_fn` away
//! - **SingleFlightLayer**: the same controller as Tower middleware
//!
//! ## Getting Started
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use tower_single_flight::{
//!     ConfigBuilder, ProbeOutcome, RequestController, RequestOptions, ReqwestTransport,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let config = ConfigBuilder::new()
//!     .timeout(Duration::from_millis(500))
//!     .build();
//! let controller = RequestController::with_config(ReqwestTransport::new(), config);
//!
//! match controller.probe("https://example.com/resource", RequestOptions::new()).await {
//!     ProbeOutcome::Successful => println!("resource is there"),
//!     outcome => println!("not reachable: {:?}", outcome.reason()),
//! }
//!
//! let response = controller
//!     .send("https://example.com/resource", RequestOptions::new())
//!     .await?;
//! println!("status: {}", response.status);
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod config;
pub mod error;
pub mod layer;
pub mod transport;

// Core module with the controller implementation
mod core;

// Re-export core types
pub use crate::core::{ProbeOutcome, RequestController, StopHandle};

// Public re-exports for convenience
pub use cancel::{CancelReason, FlightToken};
pub use config::{from_env, from_file, ConfigBuilder, ControllerConfig};
pub use error::{Result, SingleFlightError};
pub use layer::{FlightRequest, SingleFlight, SingleFlightLayer};
pub use transport::{
    CacheMode, Cancelled, CredentialsMode, ReqwestTransport, RequestOptions, TransportRequest,
    TransportResponse, TransportSvc,
};

// Re-export Tower traits that users need
pub use tower::{Layer, Service, ServiceExt};
