//! Output sink port.
//!
//! Both loops write `Report`s to one shared sink. Writes from the two loops
//! interleave in no particular order; implementations only need to keep each
//! individual write intact.

use std::sync::Mutex;
use std::time::Duration;

use beacon_types::report::Report;

/// Destination for human-facing status events.
pub trait OutputSink: Send + Sync {
    fn report(&self, report: Report);
}

/// Sink that keeps every report in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    reports: Mutex<Vec<Report>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything reported so far, in arrival order.
    pub fn snapshot(&self) -> Vec<Report> {
        self.reports
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn count(&self, predicate: impl Fn(&Report) -> bool) -> usize {
        self.reports
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|r| predicate(r))
            .count()
    }

    /// Poll until `predicate` holds for the recorded reports or `timeout`
    /// elapses. Returns whether the predicate was met.
    pub async fn wait_for(
        &self,
        timeout: Duration,
        predicate: impl Fn(&[Report]) -> bool,
    ) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if predicate(&self.snapshot()) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl OutputSink for MemorySink {
    fn report(&self, report: Report) {
        self.reports
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(report);
    }
}
