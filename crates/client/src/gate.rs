//! Request gate
//!
//! The upstream API misbehaves under concurrent requests from the same
//! credential, so every exchange is serialized through a single-permit gate.
//! A waiter stops honoring the current holder once the configured deadline
//! passes and proceeds without the permit; a lost release therefore bounds
//! how long callers can be blocked instead of wedging the client. A late
//! release from a stuck holder may then briefly overlap with the new holder,
//! an accepted trade at this call volume.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

/// Single-slot mutual exclusion with a lockout-breaker deadline.
#[derive(Debug)]
pub struct RequestGate {
    permits: Arc<Semaphore>,
    deadline: Duration,
    waiting: AtomicUsize,
}

/// Exclusive (best-effort, see [`RequestGate`]) right to perform one upstream
/// exchange. Releases the gate when dropped, on every exit path.
#[derive(Debug)]
pub struct GatePermit {
    _permit: Option<OwnedSemaphorePermit>,
}

impl RequestGate {
    /// Create a gate whose waiters give up on a stuck holder after
    /// `deadline`.
    #[must_use]
    pub fn new(deadline: Duration) -> Self {
        Self { permits: Arc::new(Semaphore::new(1)), deadline, waiting: AtomicUsize::new(0) }
    }

    /// Wait for exclusive access, giving up after the deadline.
    pub async fn acquire(&self) -> GatePermit {
        // Guard keeps the waiter count correct even when the caller is
        // cancelled mid-wait.
        struct WaitGuard<'a>(&'a AtomicUsize);
        impl Drop for WaitGuard<'_> {
            fn drop(&mut self) {
                self.0.fetch_sub(1, Ordering::Relaxed);
            }
        }

        self.waiting.fetch_add(1, Ordering::Relaxed);
        let _waiting = WaitGuard(&self.waiting);
        let acquired =
            tokio::time::timeout(self.deadline, Arc::clone(&self.permits).acquire_owned()).await;

        match acquired {
            Ok(Ok(permit)) => {
                // A reset while a holder was stuck can leave a surplus permit
                // behind once that holder finally releases; shrink back to
                // the single slot.
                while let Ok(extra) = self.permits.try_acquire() {
                    extra.forget();
                }
                GatePermit { _permit: Some(permit) }
            }
            // The semaphore is never closed.
            Ok(Err(_)) => GatePermit { _permit: None },
            Err(_) => {
                warn!(
                    deadline_ms = self.deadline.as_millis() as u64,
                    "gate deadline passed with a request still in flight, proceeding"
                );
                GatePermit { _permit: None }
            }
        }
    }

    /// Number of callers currently blocked on the gate.
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::Relaxed)
    }

    /// Force the gate back to one available slot.
    ///
    /// Called when the token lifecycle restarts initialization, mirroring its
    /// unconditional unlock of the original design.
    pub fn reset(&self) {
        if self.permits.available_permits() == 0 {
            debug!("gate reset while held, releasing slot");
            self.permits.add_permits(1);
        }
    }
}
