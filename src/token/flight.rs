use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;

use crate::errors::Error;

/// Result of one refresh exchange as seen by every caller attached to it.
#[derive(Clone, Debug)]
pub enum RefreshOutcome {
    Refreshed,
    Rejected,
    Faulted(Arc<Error>),
}

pub type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

/// How a caller relates to the refresh it needs.
pub enum Flight {
    /// The caller started the refresh with the given slot id.
    Lead(u64, SharedRefresh),
    /// A refresh was already running; the caller waits on it.
    Join(u64, SharedRefresh),
    /// The token changed since the caller's request was sent.
    AlreadyRefreshed,
}

/// Per-instance single-flight slot for token refreshes.
///
/// The first caller stores a shared pending result, later callers attach to
/// it, and the slot is cleared as soon as the refresh resolves. Checking and
/// filling the slot happens under one lock.
#[derive(Default)]
pub struct RefreshFlight {
    pending: Mutex<Option<(u64, SharedRefresh)>>,
    next_id: AtomicU64,
}

impl RefreshFlight {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn begin<S, F>(self: &Arc<Self>, already_refreshed: S, start: F) -> Flight
    where
        S: FnOnce() -> bool,
        F: FnOnce() -> BoxFuture<'static, RefreshOutcome>,
    {
        let mut pending = self.pending.lock();
        if let Some((id, shared)) = pending.as_ref() {
            return Flight::Join(*id, shared.clone());
        }
        if already_refreshed() {
            return Flight::AlreadyRefreshed;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let slot: Weak<Self> = Arc::downgrade(self);
        let refresh = start();
        let shared = async move {
            let outcome = refresh.await;
            if let Some(flight) = slot.upgrade() {
                flight.finish(id);
            }
            outcome
        }
        .boxed()
        .shared();
        *pending = Some((id, shared.clone()));
        Flight::Lead(id, shared)
    }

    pub fn in_flight(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Evicts the refresh with this id so the next caller leads a fresh one.
    /// A no-op when that refresh already resolved or was replaced.
    pub fn abandon(&self, id: u64) {
        self.finish(id);
    }

    fn finish(&self, id: u64) {
        let mut pending = self.pending.lock();
        if matches!(pending.as_ref(), Some((current, _)) if *current == id) {
            *pending = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use tokio::sync::oneshot;

    use super::*;

    fn shared_of(flight: Flight) -> SharedRefresh {
        match flight {
            Flight::Lead(_, shared) | Flight::Join(_, shared) => shared,
            Flight::AlreadyRefreshed => panic!("expected a pending refresh"),
        }
    }

    #[tokio::test]
    async fn second_caller_joins_the_running_refresh() {
        let flight = RefreshFlight::new();
        let started = Arc::new(AtomicUsize::new(0));
        let (release, gate) = oneshot::channel::<()>();

        let first = flight.begin(
            || false,
            || {
                started.fetch_add(1, Ordering::SeqCst);
                async move {
                    let _ = gate.await;
                    RefreshOutcome::Refreshed
                }
                .boxed()
            },
        );
        assert!(matches!(first, Flight::Lead(..)));
        assert!(flight.in_flight());

        let second = flight.begin(
            || false,
            || {
                started.fetch_add(1, Ordering::SeqCst);
                async { RefreshOutcome::Rejected }.boxed()
            },
        );
        assert!(matches!(second, Flight::Join(..)));

        release.send(()).unwrap();
        let (a, b) = tokio::join!(shared_of(first), shared_of(second));
        assert!(matches!(a, RefreshOutcome::Refreshed));
        assert!(matches!(b, RefreshOutcome::Refreshed));
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert!(!flight.in_flight(), "slot must clear once resolved");
    }

    #[tokio::test]
    async fn stale_request_skips_refresh() {
        let flight = RefreshFlight::new();
        let outcome = flight.begin(|| true, || panic!("must not start a refresh"));
        assert!(matches!(outcome, Flight::AlreadyRefreshed));
        assert!(!flight.in_flight());
    }

    #[tokio::test]
    async fn new_refresh_can_start_after_previous_resolves() {
        let flight = RefreshFlight::new();
        let first = flight.begin(|| false, || async { RefreshOutcome::Rejected }.boxed());
        assert!(matches!(shared_of(first).await, RefreshOutcome::Rejected));

        let second = flight.begin(|| false, || async { RefreshOutcome::Refreshed }.boxed());
        assert!(matches!(second, Flight::Lead(..)));
        assert!(matches!(shared_of(second).await, RefreshOutcome::Refreshed));
    }

    #[tokio::test]
    async fn abandoned_refresh_frees_the_slot() {
        let flight = RefreshFlight::new();
        let hung = flight.begin(|| false, || futures::future::pending().boxed());
        let Flight::Lead(hung_id, _) = hung else {
            panic!("expected to lead");
        };
        assert!(flight.in_flight());

        flight.abandon(hung_id);
        assert!(!flight.in_flight());

        let next = flight.begin(|| false, || async { RefreshOutcome::Refreshed }.boxed());
        let Flight::Lead(next_id, shared) = next else {
            panic!("expected a fresh refresh after abandon");
        };
        assert_ne!(next_id, hung_id);

        // A stale id must not evict the newer refresh.
        flight.abandon(hung_id);
        assert!(flight.in_flight());
        assert!(matches!(shared.await, RefreshOutcome::Refreshed));
        assert!(!flight.in_flight());
    }
}
