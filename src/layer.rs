//! Tower integration for the single-flight controller
//!
//! What this module provides
//! - `SingleFlightLayer`: wraps any transport service so that at most one
//!   request is in flight through it at a time
//! - `SingleFlight<S>`: the wrapped service; every `call` supersedes whatever
//!   the previous call left pending
//! - `FlightRequest`: target plus per-call options
//!
//! Composition
//! - `ServiceBuilder::new().layer(SingleFlightLayer::new(config)).service(transport)`
//! - Clones of `SingleFlight` share one controller, so a clone per task still
//!   means one request in flight overall
//! - `stop_handle()` hands cancel-only access to other tasks
//!
//! Testing strategy
//! - Drive the layered service with `service_fn` fakes; recover the typed
//!   error by downcasting the `BoxError` it returns

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tower::{BoxError, Layer, Service};

use crate::config::ControllerConfig;
use crate::core::{RequestController, StopHandle};
use crate::transport::{RequestOptions, TransportRequest, TransportResponse};

/// Target plus options, the request type [`SingleFlight`] accepts.
#[derive(Debug, Clone, Default)]
pub struct FlightRequest {
    pub target: String,
    pub options: RequestOptions,
}

impl FlightRequest {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            options: RequestOptions::new(),
        }
    }

    pub fn options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }
}

/// Applies single-flight semantics to a transport service.
pub struct SingleFlightLayer {
    config: ControllerConfig,
}

impl SingleFlightLayer {
    pub fn new(config: ControllerConfig) -> Self {
        Self { config }
    }
}

impl Default for SingleFlightLayer {
    fn default() -> Self {
        Self::new(ControllerConfig::default())
    }
}

impl<S> Layer<S> for SingleFlightLayer {
    type Service = SingleFlight<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SingleFlight {
            controller: RequestController::with_config(inner, self.config.clone()),
        }
    }
}

/// Drives the inner transport with at most one request in flight.
pub struct SingleFlight<S> {
    controller: RequestController<S>,
}

impl<S: Clone> Clone for SingleFlight<S> {
    fn clone(&self) -> Self {
        Self {
            controller: self.controller.clone(),
        }
    }
}

impl<S> SingleFlight<S> {
    /// Cancel-only handle for other tasks.
    pub fn stop_handle(&self) -> StopHandle {
        self.controller.stop_handle()
    }

    /// Stop the in-flight request, if any.
    pub fn cancel(&self) {
        self.controller.cancel()
    }
}

impl<S> Service<FlightRequest> for SingleFlight<S>
where
    S: Service<TransportRequest, Response = TransportResponse, Error = BoxError>
        + Clone
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
{
    type Response = TransportResponse;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: FlightRequest) -> Self::Future {
        let controller = self.controller.clone();
        Box::pin(async move {
            controller
                .send(&req.target, req.options)
                .await
                .map_err(Into::into)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SingleFlightError;
    use crate::transport::Cancelled;
    use bytes::Bytes;
    use http::{HeaderMap, StatusCode};
    use std::time::Duration;
    use tokio::time::sleep;
    use tower::{service_fn, ServiceExt};

    fn response(status: StatusCode) -> TransportResponse {
        TransportResponse {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    #[tokio::test]
    async fn layer_sends_through_inner() {
        let svc = service_fn(|_req: TransportRequest| async {
            Ok::<_, BoxError>(response(StatusCode::OK))
        });
        let mut svc = SingleFlightLayer::default().layer(svc);
        let resp = ServiceExt::ready(&mut svc)
            .await
            .unwrap()
            .call(FlightRequest::new("http://example.com"))
            .await
            .unwrap();
        assert_eq!(resp.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn superseded_call_rejects_with_typed_error() {
        let svc = service_fn(|req: TransportRequest| async move {
            tokio::select! {
                _ = req.signal.cancelled() => Err::<TransportResponse, BoxError>(Cancelled.into()),
                _ = sleep(Duration::from_millis(50)) => Ok(response(StatusCode::OK)),
            }
        });
        let mut svc = SingleFlightLayer::default().layer(svc);

        let first = ServiceExt::ready(&mut svc)
            .await
            .unwrap()
            .call(FlightRequest::new("http://one"));
        let second = ServiceExt::ready(&mut svc)
            .await
            .unwrap()
            .call(FlightRequest::new("http://two"));
        let (a, b) = tokio::join!(first, second);

        let err = a.unwrap_err();
        let stopped = err
            .downcast_ref::<SingleFlightError>()
            .expect("typed error survives boxing");
        assert!(stopped.is_stopped());
        assert_eq!(b.unwrap().status, StatusCode::OK);
    }

    #[tokio::test]
    async fn stop_handle_cancels_in_flight_call() {
        let svc = service_fn(|req: TransportRequest| async move {
            tokio::select! {
                _ = req.signal.cancelled() => Err::<TransportResponse, BoxError>(Cancelled.into()),
                _ = sleep(Duration::from_millis(200)) => Ok(response(StatusCode::OK)),
            }
        });
        let mut svc = SingleFlightLayer::default().layer(svc);
        let handle = svc.stop_handle();

        let call = ServiceExt::ready(&mut svc)
            .await
            .unwrap()
            .call(FlightRequest::new("http://example.com"));
        let (result, _) = tokio::join!(call, async {
            sleep(Duration::from_millis(10)).await;
            handle.cancel();
        });

        let err = result.unwrap_err();
        let stopped = err.downcast_ref::<SingleFlightError>().unwrap();
        assert!(stopped.is_stopped());
        assert!(!stopped.is_timeout());
    }

    #[tokio::test]
    async fn clones_share_one_controller() {
        let svc = service_fn(|req: TransportRequest| async move {
            tokio::select! {
                _ = req.signal.cancelled() => Err::<TransportResponse, BoxError>(Cancelled.into()),
                _ = sleep(Duration::from_millis(50)) => Ok(response(StatusCode::OK)),
            }
        });
        let mut svc_a = SingleFlightLayer::default().layer(svc);
        let mut svc_b = svc_a.clone();

        let first = ServiceExt::ready(&mut svc_a)
            .await
            .unwrap()
            .call(FlightRequest::new("http://one"));
        let second = ServiceExt::ready(&mut svc_b)
            .await
            .unwrap()
            .call(FlightRequest::new("http://two"));
        let (a, b) = tokio::join!(first, second);

        assert!(a
            .unwrap_err()
            .downcast_ref::<SingleFlightError>()
            .unwrap()
            .is_stopped());
        assert_eq!(b.unwrap().status, StatusCode::OK);
    }
}
