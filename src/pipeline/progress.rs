use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// How many of the current run's chunk calls have completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GenerationProgress {
    pub current: usize,
    pub total: usize,
}

/// Publishes chunk-completion progress to observers.
///
/// `current` only ever moves forward during a run; the value is cleared to
/// `None` on completion or failure.
#[derive(Debug)]
pub struct ProgressTracker {
    tx: watch::Sender<Option<GenerationProgress>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Observe progress updates; `None` means no run is in flight
    pub fn subscribe(&self) -> watch::Receiver<Option<GenerationProgress>> {
        self.tx.subscribe()
    }

    /// Begin a run of `total` chunks
    pub fn start(&self, total: usize) {
        self.tx
            .send_replace(Some(GenerationProgress { current: 0, total }));
    }

    /// Record one completed chunk
    pub fn advance(&self) {
        self.tx.send_modify(|progress| {
            if let Some(p) = progress {
                p.current = (p.current + 1).min(p.total);
            }
        });
    }

    /// Clear progress after the run finishes, successfully or not
    pub fn clear(&self) {
        self.tx.send_replace(None);
    }

    /// Current value, for callers that don't need a subscription
    pub fn current(&self) -> Option<GenerationProgress> {
        *self.tx.borrow()
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Cooperative cancellation for in-flight runs.
///
/// A superseding run (e.g. navigation to a new video) cancels the old
/// token; chunk and combine loops check it at every batch boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_lifecycle() {
        let tracker = ProgressTracker::new();
        assert_eq!(tracker.current(), None);

        tracker.start(3);
        assert_eq!(
            tracker.current(),
            Some(GenerationProgress { current: 0, total: 3 })
        );

        tracker.advance();
        tracker.advance();
        assert_eq!(
            tracker.current(),
            Some(GenerationProgress { current: 2, total: 3 })
        );

        tracker.clear();
        assert_eq!(tracker.current(), None);
    }

    #[test]
    fn test_progress_is_monotonic_and_capped() {
        let tracker = ProgressTracker::new();
        tracker.start(2);

        let mut last = 0;
        for _ in 0..5 {
            tracker.advance();
            let current = tracker.current().unwrap().current;
            assert!(current >= last);
            last = current;
        }
        // Never exceeds total
        assert_eq!(tracker.current().unwrap().current, 2);
    }

    #[test]
    fn test_advance_without_start_is_noop() {
        let tracker = ProgressTracker::new();
        tracker.advance();
        assert_eq!(tracker.current(), None);
    }

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());

        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
