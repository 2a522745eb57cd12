//! One-shot, process-wide termination signal.
//!
//! Wraps a [`CancellationToken`] with a once-flag so a re-delivered OS signal
//! cannot start a second shutdown sequence. Loops receive child tokens and
//! treat cancellation as a clean exit.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct TerminationSignal {
    token: CancellationToken,
    fired: Arc<AtomicBool>,
}

impl TerminationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal.
    ///
    /// Returns `true` for the call that actually fired it; every later call
    /// is a no-op returning `false`.
    pub fn trigger(&self) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            debug!("termination already in progress, ignoring repeated signal");
            return false;
        }
        self.token.cancel();
        true
    }

    pub fn is_triggered(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Resolve once the signal has been raised.
    pub async fn fired(&self) {
        self.token.cancelled().await;
    }

    /// Token that is cancelled when the signal fires.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }
}
