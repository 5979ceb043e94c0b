use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Cancellation signal shared by every request of a registry or fetcher.
///
/// Cancelling aborts all requests holding the current token and installs a
/// fresh one, so later requests are unaffected.
#[derive(Debug)]
pub struct CancelSignal {
    current: Mutex<CancellationToken>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.current.lock().clone()
    }

    pub fn cancel(&self) {
        let previous = std::mem::replace(&mut *self.current.lock(), CancellationToken::new());
        previous.cancel();
        info!("in-flight requests cancelled");
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_trips_old_token_and_issues_fresh_one() {
        let signal = CancelSignal::new();
        let before = signal.token();
        signal.cancel();
        let after = signal.token();
        assert!(before.is_cancelled());
        assert!(!after.is_cancelled());
    }
}
