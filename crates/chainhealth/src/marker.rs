//! Consecutive-failure markers shared between the monitor and route selection.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Failure state attached to a chain.
///
/// The monitor writes through `mark`/`reset` while selectors read `count`
/// from other tasks, so implementations must be safe to share.
#[cfg_attr(test, mockall::automock)]
pub trait FailureMarker: Send + Sync {
    /// Record one more failure.
    fn mark(&self);

    /// Clear all recorded failures.
    fn reset(&self);

    /// Failures since the last reset.
    fn count(&self) -> u64;
}

/// Lock-free failure marker.
#[derive(Debug, Default)]
pub struct AtomicMarker {
    count: AtomicU64,
    /// Millis since the epoch of the last mark, 0 if never marked.
    last_marked_ms: AtomicI64,
}

impl AtomicMarker {
    /// Create a marker with no failures recorded
    pub fn new() -> Self {
        Self::default()
    }

    /// Wall-clock time of the most recent `mark`.
    ///
    /// Survives `reset`, so selectors can still tell how long ago a chain
    /// last misbehaved.
    pub fn last_marked(&self) -> Option<SystemTime> {
        match self.last_marked_ms.load(Ordering::Acquire) {
            ms if ms > 0 => Some(UNIX_EPOCH + Duration::from_millis(ms as u64)),
            _ => None,
        }
    }
}

impl FailureMarker for AtomicMarker {
    fn mark(&self) {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(1);
        self.last_marked_ms.store(now_ms.max(1), Ordering::Release);
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    fn reset(&self) {
        self.count.store(0, Ordering::Release);
    }

    fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_mark_and_reset() {
        let marker = AtomicMarker::new();
        assert_eq!(marker.count(), 0);
        assert!(marker.last_marked().is_none());

        marker.mark();
        marker.mark();
        assert_eq!(marker.count(), 2);
        assert!(marker.last_marked().is_some());

        marker.reset();
        assert_eq!(marker.count(), 0);
        assert!(marker.last_marked().is_some());

        // Idempotent
        marker.reset();
        assert_eq!(marker.count(), 0);
    }

    #[test]
    fn test_concurrent_marks_are_not_lost() {
        let marker = Arc::new(AtomicMarker::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let marker = marker.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        marker.mark();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(marker.count(), 8000);
    }
}
