//! Production transport backed by `reqwest`
//!
//! What this module provides
//! - `ReqwestTransport`: a `Service<TransportRequest>` over a shared
//!   `reqwest::Client`, racing every call against its cancellation signal
//!
//! Implementation strategy
//! - `tokio::select!` between the HTTP future and `signal.cancelled()`; the
//!   biased arm order makes cancellation win a simultaneous wake, and the
//!   losing HTTP future is dropped, which tears the connection down
//! - `CacheMode` maps onto a `Cache-Control` request header; `Omit`
//!   credentials strip credential-bearing headers before the call goes out
//! - The response body is buffered into `Bytes` so the settled response is
//!   plain data, cloneable and inspectable after the fact

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use http::header::{HeaderValue, AUTHORIZATION, CACHE_CONTROL, COOKIE, PROXY_AUTHORIZATION};
use tower::{BoxError, Service};

use super::{CacheMode, Cancelled, CredentialsMode, TransportRequest, TransportResponse};

/// Issues `TransportRequest`s over a shared `reqwest::Client`.
///
/// No client-level timeout is configured; deadlines belong to the controller
/// driving this transport.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Reuse an existing client (connection pool, proxy, TLS setup).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<TransportRequest> for ReqwestTransport {
    type Response = TransportResponse;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: TransportRequest) -> Self::Future {
        let client = self.client.clone();
        Box::pin(async move {
            let TransportRequest {
                method,
                target,
                mut headers,
                body,
                cache_mode,
                credentials_mode,
                signal,
            } = req;

            apply_cache_mode(&mut headers, cache_mode);
            apply_credentials_mode(&mut headers, credentials_mode);

            let mut builder = client.request(method, target).headers(headers);
            if let Some(body) = body {
                builder = builder.body(body);
            }

            let call = async move {
                let resp = builder.send().await?;
                let status = resp.status();
                let headers = resp.headers().clone();
                let body = resp.bytes().await?;
                Ok::<_, BoxError>(TransportResponse {
                    status,
                    headers,
                    body,
                })
            };

            tokio::select! {
                biased;
                _ = signal.cancelled() => Err(Cancelled.into()),
                out = call => out,
            }
        })
    }
}

fn apply_cache_mode(headers: &mut http::HeaderMap, mode: CacheMode) {
    match mode {
        CacheMode::Default => {}
        CacheMode::NoStore => {
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        }
        CacheMode::NoCache => {
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        }
    }
}

fn apply_credentials_mode(headers: &mut http::HeaderMap, mode: CredentialsMode) {
    match mode {
        // This client holds no ambient credentials, so Include and
        // SameOrigin both pass caller headers through untouched.
        CredentialsMode::SameOrigin | CredentialsMode::Include => {}
        CredentialsMode::Omit => {
            headers.remove(AUTHORIZATION);
            headers.remove(PROXY_AUTHORIZATION);
            headers.remove(COOKIE);
        }
    }
}
