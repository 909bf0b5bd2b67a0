//! The transport seam: how a controller issues network calls
//!
//! What this module provides
//! - `TransportRequest` / `TransportResponse`: the uniform call shape every
//!   transport implements, with the cancellation signal already attached
//! - `Cancelled`: the marker error a transport returns when its signal fired
//!   mid-call, recoverable through `BoxError` by downcast
//! - `RequestOptions`: caller-supplied knobs, merged with controller defaults
//!   when a flight begins
//! - `TransportSvc`: boxed alias for dynamic composition
//!
//! Implementation strategy
//! - A transport is any `tower::Service<TransportRequest>`; production code
//!   uses [`ReqwestTransport`], tests use `service_fn` fakes
//! - Merging is where probe and send diverge: probes force `HEAD` and drop
//!   the body, sends default to `GET`; both bypass caches unless the caller
//!   asked otherwise
//!
//! Testing strategy
//! - Merge semantics are pure functions over `RequestOptions`, tested here
//! - Transports are tested against pre-cancelled signals and scripted fakes

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tower::util::BoxCloneSyncService;
use tower::BoxError;

pub mod reqwest;

pub use self::reqwest::ReqwestTransport;

// ===== Call shape =====

/// One call handed to a transport. Everything the controller decided is
/// already baked in: the method, merged headers, and the cancellation signal.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub target: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub cache_mode: CacheMode,
    pub credentials_mode: CredentialsMode,
    pub signal: CancellationToken,
}

/// A settled transport response with the body fully buffered.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: http::StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Boxed transport service, for dynamic composition. The `Sync` flavor so it
/// stays usable behind a shared controller.
pub type TransportSvc = BoxCloneSyncService<TransportRequest, TransportResponse, BoxError>;

/// Marker error a transport returns when its signal fired mid-call.
///
/// Travels through `BoxError` boundaries; recover it with
/// [`Cancelled::is`] or `err.downcast_ref::<Cancelled>()`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Error)]
#[error("transport call cancelled")]
pub struct Cancelled;

impl Cancelled {
    /// True when `err` is this marker.
    pub fn is(err: &BoxError) -> bool {
        err.downcast_ref::<Cancelled>().is_some()
    }
}

// ===== Modes =====

/// Cache behavior requested from the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Let the transport and intermediaries apply their defaults.
    #[default]
    Default,
    /// Bypass caches entirely, for both lookup and store.
    NoStore,
    /// Revalidate with the origin before using anything cached.
    NoCache,
}

/// Credential handling requested from the transport.
///
/// At the header level only `Omit` changes anything; the other modes pass
/// caller-supplied headers through and exist for transports that hold
/// ambient credentials (cookie stores, session auth).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialsMode {
    /// Send whatever credentials are already attached to the request.
    #[default]
    SameOrigin,
    /// Strip credential-bearing headers before the call goes out.
    Omit,
    /// Like `SameOrigin` here; a transport with ambient credentials would
    /// attach them even cross-origin.
    Include,
}

// ===== Caller options =====

/// Caller-supplied options for one `probe` or `send`.
///
/// Unset fields fall back to controller defaults at merge time. Probes force
/// `HEAD` and drop the body no matter what the caller asked for.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Option<Method>,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub cache_mode: Option<CacheMode>,
    pub credentials_mode: Option<CredentialsMode>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = Some(mode);
        self
    }

    pub fn credentials_mode(mut self, mode: CredentialsMode) -> Self {
        self.credentials_mode = Some(mode);
        self
    }

    /// Merge into a probe call: `HEAD`, no body, caches bypassed unless the
    /// caller said otherwise.
    pub(crate) fn into_probe_request(
        self,
        target: &str,
        signal: CancellationToken,
    ) -> TransportRequest {
        TransportRequest {
            method: Method::HEAD,
            target: target.to_string(),
            headers: self.headers,
            body: None,
            cache_mode: self.cache_mode.unwrap_or(CacheMode::NoStore),
            credentials_mode: self.credentials_mode.unwrap_or_default(),
            signal,
        }
    }

    /// Merge into a send call: `GET` unless the caller chose a method, caches
    /// bypassed unless the caller said otherwise.
    pub(crate) fn into_send_request(
        self,
        target: &str,
        signal: CancellationToken,
    ) -> TransportRequest {
        TransportRequest {
            method: self.method.unwrap_or(Method::GET),
            target: target.to_string(),
            headers: self.headers,
            body: self.body,
            cache_mode: self.cache_mode.unwrap_or(CacheMode::NoStore),
            credentials_mode: self.credentials_mode.unwrap_or_default(),
            signal,
        }
    }
}
