//! The single-flight request controller
//!
//! What this module provides
//! - `RequestController<T>`: owns at most one in-flight request over a
//!   transport service `T`; starting a new `probe` or `send` stops the
//!   previous flight, `cancel` stops it on demand, and a per-flight deadline
//!   stops it late
//! - `ProbeOutcome`: the closed set of ways a probe can settle
//! - `StopHandle`: cancel-only access to the controller's current flight
//!
//! Implementation strategy
//! - One `Mutex<Option<FlightToken>>` slot holds the current flight; the
//!   cancel-before-start protocol plus displacement-on-replace keeps at most
//!   one flight live even when calls race from different tasks
//! - Each flight races the transport future against its token with a biased
//!   `select!`: cancellation wins a simultaneous wake, and the losing
//!   transport future is dropped
//! - A `FlightGuard` aborts the deadline timer and clears the slot on every
//!   exit path, dropped futures included; it only clears the slot while the
//!   slot still holds its own flight
//!
//! Testing strategy
//! - Scripted `service_fn` transports: fixed statuses, delays that honor the
//!   signal, counters for call accounting
//! - Supersede/cancel/timeout orderings driven by `join!` so poll order is
//!   deterministic

use std::sync::{Arc, Mutex};

use http::StatusCode;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tower::{BoxError, Service, ServiceExt};
use tracing::debug;

use crate::cancel::{CancelReason, FlightToken};
use crate::config::ControllerConfig;
use crate::error::{Result, SingleFlightError};
use crate::transport::{Cancelled, RequestOptions, TransportRequest, TransportResponse};

// ===== Outcomes =====

/// Settled result of a `probe`. Probes never fail; every path maps onto one
/// of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The target answered 200.
    Successful,
    /// The target answered something other than 200.
    FailedStatus(StatusCode),
    /// The transport failed before any status arrived.
    NetworkError(String),
    /// The deadline fired first.
    TimedOut(CancelReason),
    /// The flight was explicitly stopped or superseded.
    Stopped(CancelReason),
}

impl ProbeOutcome {
    pub fn is_successful(&self) -> bool {
        matches!(self, ProbeOutcome::Successful)
    }

    /// Human-readable reason, absent for `Successful`.
    pub fn reason(&self) -> Option<String> {
        match self {
            ProbeOutcome::Successful => None,
            ProbeOutcome::FailedStatus(code) => Some(format!("HTTP {}", code.as_u16())),
            ProbeOutcome::NetworkError(message) => Some(message.clone()),
            ProbeOutcome::TimedOut(reason) | ProbeOutcome::Stopped(reason) => {
                Some(reason.to_string())
            }
        }
    }
}

// ===== Controller =====

/// Drives a transport service with at most one request in flight.
///
/// `probe` and `send` are mutually exclusive within one controller: starting
/// either stops whatever the controller had in flight. Explicit `cancel` and
/// the configured deadline stop a flight the same way; the three differ only
/// in the recorded [`CancelReason`].
///
/// Clones share the flight slot, so a clone per task still means one request
/// in flight overall.
pub struct RequestController<T> {
    transport: T,
    config: ControllerConfig,
    current: Arc<Mutex<Option<FlightToken>>>,
}

impl<T: Clone> Clone for RequestController<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            config: self.config.clone(),
            current: Arc::clone(&self.current),
        }
    }
}

impl<T> RequestController<T> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, ControllerConfig::default())
    }

    pub fn with_config(transport: T, config: ControllerConfig) -> Self {
        Self {
            transport,
            config,
            current: Arc::new(Mutex::new(None)),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Cancel-only handle other tasks can hold onto.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            current: Arc::clone(&self.current),
        }
    }

    /// Stop the in-flight request, if any. Idempotent: with no flight, or
    /// with a flight that already timed out or stopped, this changes nothing.
    pub fn cancel(&self) {
        cancel_slot(&self.current);
    }

    fn begin_flight(&self) -> FlightGuard {
        let flight = FlightToken::new();
        let timer = self.config.effective_timeout().map(|after| {
            let timer_flight = flight.clone();
            tokio::spawn(async move {
                sleep(after).await;
                if timer_flight.trigger(CancelReason::Timeout { after }) {
                    debug!(
                        flight = timer_flight.id(),
                        after_ms = after.as_millis() as u64,
                        "deadline fired"
                    );
                }
            })
        });
        let displaced = self.current.lock().unwrap().replace(flight.clone());
        if let Some(old) = displaced {
            // A racing call can slip in between our cancel() and here;
            // whatever gets displaced must not stay live.
            old.trigger(CancelReason::UserStopped);
        }
        FlightGuard {
            flight,
            timer,
            slot: Arc::clone(&self.current),
        }
    }
}

impl<T> RequestController<T>
where
    T: Service<TransportRequest, Response = TransportResponse, Error = BoxError> + Clone,
{
    /// Lightweight existence check against `target`.
    ///
    /// Stops whatever was in flight, then races a `HEAD` call against the
    /// deadline and the stop signal. Never fails: every path settles into a
    /// [`ProbeOutcome`].
    pub async fn probe(&self, target: &str, options: RequestOptions) -> ProbeOutcome {
        self.cancel();
        let guard = self.begin_flight();
        let flight = guard.flight.clone();
        let req = options.into_probe_request(target, flight.signal());

        let mut transport = self.transport.clone();
        let outcome = tokio::select! {
            biased;
            _ = flight.cancelled() => cancelled_outcome(&flight),
            result = drive(&mut transport, req) => match result {
                Ok(resp) if resp.status == StatusCode::OK => ProbeOutcome::Successful,
                Ok(resp) => ProbeOutcome::FailedStatus(resp.status),
                Err(err) if Cancelled::is(&err) => cancelled_outcome(&flight),
                Err(err) => ProbeOutcome::NetworkError(err.to_string()),
            },
        };
        debug!(flight = flight.id(), ?outcome, "probe settled");
        outcome
    }

    /// Issue the full request against `target`.
    ///
    /// Stops whatever was in flight first. Resolves with the raw response
    /// whatever its status; fails only on transport failure or cancellation.
    pub async fn send(&self, target: &str, options: RequestOptions) -> Result<TransportResponse> {
        self.cancel();

        if self.config.probe_before_send {
            let warmup = self.probe(target, options.clone()).await;
            debug!(?warmup, "warm-up probe settled");
            if let ProbeOutcome::Stopped(reason) = warmup {
                // The stop was aimed at this controller, so it covers the
                // send this probe was warming up for.
                return Err(SingleFlightError::RequestStopped { reason });
            }
        }

        let guard = self.begin_flight();
        let flight = guard.flight.clone();
        let req = options.into_send_request(target, flight.signal());

        let mut transport = self.transport.clone();
        let result = tokio::select! {
            biased;
            _ = flight.cancelled() => Err(stopped_error(&flight)),
            result = drive(&mut transport, req) => match result {
                Ok(resp) => Ok(resp),
                Err(err) if Cancelled::is(&err) => Err(stopped_error(&flight)),
                Err(err) => Err(SingleFlightError::Network(err)),
            },
        };
        match &result {
            Ok(resp) => debug!(
                flight = flight.id(),
                status = resp.status.as_u16(),
                "send settled"
            ),
            Err(err) => debug!(flight = flight.id(), error = %err, "send failed"),
        }
        result
    }
}

async fn drive<T>(
    transport: &mut T,
    req: TransportRequest,
) -> std::result::Result<TransportResponse, BoxError>
where
    T: Service<TransportRequest, Response = TransportResponse, Error = BoxError>,
{
    transport.ready().await?.call(req).await
}

fn cancel_slot(slot: &Mutex<Option<FlightToken>>) {
    let flight = slot.lock().unwrap().clone();
    if let Some(flight) = flight {
        if flight.trigger(CancelReason::UserStopped) {
            debug!(flight = flight.id(), "stopped in-flight request");
        }
    }
}

fn cancelled_outcome(flight: &FlightToken) -> ProbeOutcome {
    match flight.reason() {
        Some(reason @ CancelReason::Timeout { .. }) => ProbeOutcome::TimedOut(reason),
        Some(reason @ CancelReason::UserStopped) => ProbeOutcome::Stopped(reason),
        // A transport can surface its own cancellation before any reason is
        // recorded here; classify that as a stop.
        None => ProbeOutcome::Stopped(CancelReason::UserStopped),
    }
}

fn stopped_error(flight: &FlightToken) -> SingleFlightError {
    SingleFlightError::RequestStopped {
        reason: flight.reason().unwrap_or(CancelReason::UserStopped),
    }
}

// ===== Stop handle =====

/// Cancel-only view of a controller, cheap to clone and hand to other tasks.
#[derive(Debug, Clone)]
pub struct StopHandle {
    current: Arc<Mutex<Option<FlightToken>>>,
}

impl StopHandle {
    /// Stop the in-flight request, if any.
    pub fn cancel(&self) {
        cancel_slot(&self.current);
    }

    /// True while a flight occupies the controller.
    pub fn is_active(&self) -> bool {
        self.current.lock().unwrap().is_some()
    }
}

// ===== Flight guard =====

/// Cleans up one flight on every exit path, dropped futures included.
///
/// The deadline timer is aborted here, and the controller slot is cleared
/// only if it still holds this flight; a successor may already have replaced
/// it, and a stale guard must never clear the successor's token.
struct FlightGuard {
    flight: FlightToken,
    timer: Option<JoinHandle<()>>,
    slot: Arc<Mutex<Option<FlightToken>>>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        let mut current = self.slot.lock().unwrap();
        if current.as_ref().map(FlightToken::id) == Some(self.flight.id()) {
            *current = None;
        }
    }
}
