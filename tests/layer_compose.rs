//! Tower composition: the single-flight layer in a `ServiceBuilder` stack,
//! boxed transports, and per-call options flowing through to the inner
//! service.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use tokio::time::sleep;
use tower::{service_fn, BoxError, Layer, Service, ServiceBuilder, ServiceExt};
use tower_single_flight::{
    Cancelled, ConfigBuilder, FlightRequest, RequestOptions, SingleFlightError, SingleFlightLayer,
    TransportRequest, TransportResponse, TransportSvc,
};

fn response(status: StatusCode) -> TransportResponse {
    TransportResponse {
        status,
        headers: HeaderMap::new(),
        body: Bytes::new(),
    }
}

#[tokio::test]
async fn service_builder_stack() {
    let mut svc = ServiceBuilder::new()
        .layer(SingleFlightLayer::default())
        .service(service_fn(|_req: TransportRequest| async {
            Ok::<_, BoxError>(response(StatusCode::OK))
        }));

    let resp = ServiceExt::ready(&mut svc)
        .await
        .unwrap()
        .call(FlightRequest::new("http://example.com"))
        .await
        .unwrap();
    assert_eq!(resp.status, StatusCode::OK);
}

#[tokio::test]
async fn layer_over_boxed_transport() {
    let boxed = TransportSvc::new(service_fn(|_req: TransportRequest| async {
        Ok::<_, BoxError>(response(StatusCode::NO_CONTENT))
    }));
    let mut svc = SingleFlightLayer::default().layer(boxed);

    let resp = ServiceExt::ready(&mut svc)
        .await
        .unwrap()
        .call(FlightRequest::new("http://example.com"))
        .await
        .unwrap();
    assert_eq!(resp.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn deadline_surfaces_through_the_layer() {
    let config = ConfigBuilder::new()
        .timeout(Duration::from_millis(30))
        .build();
    let mut svc = ServiceBuilder::new()
        .layer(SingleFlightLayer::new(config))
        .service(service_fn(|req: TransportRequest| async move {
            tokio::select! {
                _ = req.signal.cancelled() => Err::<TransportResponse, BoxError>(Cancelled.into()),
                _ = sleep(Duration::from_millis(200)) => Ok(response(StatusCode::OK)),
            }
        }));

    let err = ServiceExt::ready(&mut svc)
        .await
        .unwrap()
        .call(FlightRequest::new("http://example.com"))
        .await
        .unwrap_err();
    let stopped = err.downcast_ref::<SingleFlightError>().unwrap();
    assert!(stopped.is_timeout());
}

#[tokio::test]
async fn per_call_options_reach_the_inner_service() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_in = Arc::clone(&seen);
    let mut svc = SingleFlightLayer::default().layer(service_fn(move |req: TransportRequest| {
        let seen = Arc::clone(&seen_in);
        async move {
            seen.lock().unwrap().push((req.method, req.body));
            Ok::<_, BoxError>(response(StatusCode::OK))
        }
    }));

    let request = FlightRequest::new("http://example.com").options(
        RequestOptions::new()
            .method(Method::POST)
            .body("hello"),
    );
    ServiceExt::ready(&mut svc)
        .await
        .unwrap()
        .call(request)
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, Method::POST);
    assert_eq!(seen[0].1, Some(Bytes::from("hello")));
}
