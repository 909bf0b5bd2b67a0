//! Cancellation tokens with tagged abort reasons
//!
//! What this module provides
//! - `CancelReason`: why an in-flight call was aborted (deadline vs explicit
//!   stop), decided exactly once at trigger time
//! - `FlightToken`: one cancellation scope for one logical request, pairing a
//!   `CancellationToken` with a write-once reason and a process-unique id
//!
//! Implementation strategy
//! - The reason lives in a `OnceLock`: the first `trigger` wins and later
//!   triggers are no-ops, so a token can never abort twice
//! - Classification downstream switches on the reason tag, never on string
//!   matching; the wire-era strings survive only as `Display` output
//! - Ids come from a process-wide counter so teardown code can tell whether a
//!   shared slot still holds its own token or a successor's
//!
//! Testing strategy
//! - Trigger twice with different reasons and assert the first one sticks
//! - Race a waiter against `trigger` and assert it wakes with the reason set

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

static NEXT_FLIGHT_ID: AtomicU64 = AtomicU64::new(1);

/// Why a flight was cancelled. Recorded exactly once, at trigger time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The configured deadline elapsed before the transport settled.
    Timeout { after: Duration },
    /// `cancel()` was called, directly or by a superseding request.
    UserStopped,
}

impl CancelReason {
    pub fn is_timeout(&self) -> bool {
        matches!(self, CancelReason::Timeout { .. })
    }

    pub fn is_user_stopped(&self) -> bool {
        matches!(self, CancelReason::UserStopped)
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Timeout { after } => write!(f, "Timeout ({}ms)", after.as_millis()),
            CancelReason::UserStopped => write!(f, "Actively stopped."),
        }
    }
}

/// One cancellation scope for one logical request.
///
/// Clones share the same scope. The token cancels at most once; the reason
/// recorded by the winning `trigger` call is the one every observer sees.
#[derive(Debug, Clone)]
pub struct FlightToken {
    inner: Arc<TokenInner>,
}

#[derive(Debug)]
struct TokenInner {
    id: u64,
    token: CancellationToken,
    reason: OnceLock<CancelReason>,
}

impl FlightToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner {
                id: NEXT_FLIGHT_ID.fetch_add(1, Ordering::Relaxed),
                token: CancellationToken::new(),
                reason: OnceLock::new(),
            }),
        }
    }

    /// Process-unique id, used to guard slot cleanup against successors.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Record `reason` and cancel the token. Returns `true` for the first
    /// caller; later calls change nothing and return `false`.
    pub fn trigger(&self, reason: CancelReason) -> bool {
        if self.inner.reason.set(reason).is_ok() {
            self.inner.token.cancel();
            true
        } else {
            false
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.reason.get().is_some()
    }

    /// The winning reason, once triggered.
    pub fn reason(&self) -> Option<CancelReason> {
        self.inner.reason.get().copied()
    }

    /// Resolves when the token cancels. The reason is set before the token
    /// cancels, so it is readable as soon as this returns.
    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await
    }

    /// The raw signal handed to transports.
    pub fn signal(&self) -> CancellationToken {
        self.inner.token.clone()
    }
}

impl Default for FlightToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_trigger_wins() {
        let token = FlightToken::new();
        assert!(!token.is_triggered());
        assert!(token.trigger(CancelReason::Timeout {
            after: Duration::from_millis(50)
        }));
        assert!(!token.trigger(CancelReason::UserStopped));
        assert_eq!(
            token.reason(),
            Some(CancelReason::Timeout {
                after: Duration::from_millis(50)
            })
        );
    }

    #[test]
    fn reason_strings() {
        let timeout = CancelReason::Timeout {
            after: Duration::from_millis(50),
        };
        assert_eq!(timeout.to_string(), "Timeout (50ms)");
        assert_eq!(CancelReason::UserStopped.to_string(), "Actively stopped.");
        assert!(timeout.is_timeout());
        assert!(CancelReason::UserStopped.is_user_stopped());
    }

    #[test]
    fn ids_are_unique_and_shared_by_clones() {
        let a = FlightToken::new();
        let b = FlightToken::new();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id(), a.clone().id());
    }

    #[tokio::test]
    async fn waiter_wakes_with_reason_set() {
        let token = FlightToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
            waiter.reason()
        });
        tokio::time::sleep(Duration::from_millis(5)).await;
        token.trigger(CancelReason::UserStopped);
        assert_eq!(handle.await.unwrap(), Some(CancelReason::UserStopped));
    }

    #[tokio::test]
    async fn signal_clone_observes_cancel() {
        let token = FlightToken::new();
        let signal = token.signal();
        assert!(!signal.is_cancelled());
        token.trigger(CancelReason::UserStopped);
        assert!(signal.is_cancelled());
    }
}
