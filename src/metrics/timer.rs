//! Pending request timers.
//!
//! One start timestamp per in-flight request, keyed by request id. Entries
//! are inserted when a request starts and removed exactly once when it
//! finishes, or by [`PendingRequestTimer::sweep`] if the request was
//! abandoned.

use crate::util::RequestId;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// A request finished without a matching start.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no pending timer for request '{request_id}'")]
pub struct MissingTimerError {
    pub request_id: RequestId,
}

/// Concurrent map of request id to start time.
#[derive(Debug, Default)]
pub struct PendingRequestTimer {
    entries: DashMap<RequestId, Instant>,
}

impl PendingRequestTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the start of `request_id`.
    ///
    /// Returns `false` if the id is already pending; the original start
    /// time is kept in that case.
    pub fn start(&self, request_id: &RequestId, at: Instant) -> bool {
        match self.entries.entry(request_id.clone()) {
            Entry::Occupied(_) => {
                warn!(request_id = %request_id, "request started twice; keeping first start time");
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(at);
                true
            }
        }
    }

    /// Remove and return the start time of `request_id`.
    pub fn stop(&self, request_id: &RequestId) -> Result<Instant, MissingTimerError> {
        self.entries
            .remove(request_id)
            .map(|(_, started)| started)
            .ok_or_else(|| MissingTimerError {
                request_id: request_id.clone(),
            })
    }

    /// Evict entries started more than `max_age` before `now`.
    ///
    /// Returns the number of evicted entries.
    pub fn sweep(&self, now: Instant, max_age: Duration) -> usize {
        let mut evicted = 0;
        self.entries.retain(|request_id, started| {
            let keep = now.saturating_duration_since(*started) < max_age;
            if !keep {
                debug!(request_id = %request_id, "evicting abandoned request timer");
                evicted += 1;
            }
            keep
        });
        evicted
    }

    /// Number of in-flight requests being timed.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, request_id: &RequestId) -> bool {
        self.entries.contains_key(request_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_start_then_stop() {
        let timer = PendingRequestTimer::new();
        let id = RequestId::from("a");
        let t0 = Instant::now();

        assert!(timer.start(&id, t0));
        assert_eq!(timer.len(), 1);
        assert_eq!(timer.stop(&id), Ok(t0));
        assert!(timer.is_empty());
    }

    #[test]
    fn test_stop_twice_is_missing() {
        let timer = PendingRequestTimer::new();
        let id = RequestId::from("a");
        timer.start(&id, Instant::now());
        timer.stop(&id).unwrap();

        let err = timer.stop(&id).unwrap_err();
        assert_eq!(err.request_id, id);
        assert_eq!(err.to_string(), "no pending timer for request 'a'");
    }

    #[test]
    fn test_duplicate_start_keeps_first() {
        let timer = PendingRequestTimer::new();
        let id = RequestId::from("a");
        let t0 = Instant::now();

        assert!(timer.start(&id, t0));
        assert!(!timer.start(&id, t0 + Duration::from_secs(1)));
        assert_eq!(timer.len(), 1);
        assert_eq!(timer.stop(&id), Ok(t0));
    }

    #[test]
    fn test_missing_stop_leaves_others_alone() {
        let timer = PendingRequestTimer::new();
        let t0 = Instant::now();
        timer.start(&RequestId::from("a"), t0);
        timer.start(&RequestId::from("b"), t0);

        assert!(timer.stop(&RequestId::from("ghost")).is_err());
        assert_eq!(timer.len(), 2);
        assert!(timer.contains(&RequestId::from("a")));
        assert!(timer.contains(&RequestId::from("b")));
    }

    #[test]
    fn test_sweep_evicts_only_old_entries() {
        let timer = PendingRequestTimer::new();
        let t0 = Instant::now();
        timer.start(&RequestId::from("old"), t0);
        timer.start(&RequestId::from("new"), t0 + Duration::from_secs(50));

        let evicted = timer.sweep(t0 + Duration::from_secs(60), Duration::from_secs(30));

        assert_eq!(evicted, 1);
        assert!(!timer.contains(&RequestId::from("old")));
        assert!(timer.contains(&RequestId::from("new")));
    }

    #[test]
    fn test_concurrent_start_stop_drains() {
        let timer = Arc::new(PendingRequestTimer::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let timer = Arc::clone(&timer);
                std::thread::spawn(move || {
                    for i in 0..500 {
                        let id = RequestId::from_string(format!("{t}-{i}"));
                        assert!(timer.start(&id, Instant::now()));
                        assert!(timer.stop(&id).is_ok());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(timer.is_empty());
    }
}
