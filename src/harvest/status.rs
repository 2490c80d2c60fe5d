//! Observation points: the append-only status log and the batch progress gauge.
//!
//! Both are readable at any time without waiting on a running batch. Locks are
//! never held across an `.await`.

use chrono::Utc;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::model::{BatchProgress, StatusEvent, StatusKind};

// ============================================================================
// Status Log
// ============================================================================

/// Ordered, append-only log of [`StatusEvent`]s shared by every component.
#[derive(Debug, Default)]
pub struct StatusLog {
    next_id: AtomicU64,
    events: RwLock<Vec<StatusEvent>>,
}

impl StatusLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event and mirrors it to `tracing`.
    ///
    /// The id is assigned under the write lock, so the log is always in id order.
    pub fn push(&self, kind: StatusKind, message: impl Into<String>) -> StatusEvent {
        let event = {
            let mut events = self.events.write();
            let event = StatusEvent {
                id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
                message: message.into(),
                kind,
                timestamp: Utc::now(),
            };
            events.push(event.clone());
            event
        };

        match kind {
            StatusKind::Info => info!(event_id = event.id, "{}", event.message),
            StatusKind::Success => info!(event_id = event.id, outcome = "success", "{}", event.message),
            StatusKind::Warning => warn!(event_id = event.id, "{}", event.message),
            StatusKind::Error => error!(event_id = event.id, "{}", event.message),
        }
        event
    }

    pub fn info(&self, message: impl Into<String>) -> StatusEvent {
        self.push(StatusKind::Info, message)
    }

    pub fn success(&self, message: impl Into<String>) -> StatusEvent {
        self.push(StatusKind::Success, message)
    }

    pub fn warning(&self, message: impl Into<String>) -> StatusEvent {
        self.push(StatusKind::Warning, message)
    }

    pub fn error(&self, message: impl Into<String>) -> StatusEvent {
        self.push(StatusKind::Error, message)
    }

    pub fn snapshot(&self) -> Vec<StatusEvent> {
        self.events.read().clone()
    }

    /// Events with an id greater than `id`, for incremental display.
    pub fn since(&self, id: u64) -> Vec<StatusEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.id > id)
            .cloned()
            .collect()
    }

    pub fn count(&self, kind: StatusKind) -> usize {
        self.events.read().iter().filter(|e| e.kind == kind).count()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

// ============================================================================
// Progress Tracker
// ============================================================================

/// Batch progress gauge. The percentage never moves backwards within a run.
#[derive(Debug)]
pub struct ProgressTracker {
    tx: watch::Sender<BatchProgress>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(BatchProgress::default());
        Self { tx }
    }

    /// Starts a new run at 0%.
    pub fn reset(&self, total_targets: usize) {
        self.tx.send_replace(BatchProgress {
            percent: 0,
            processed_targets: 0,
            total_targets,
        });
    }

    /// Raises the percentage to `percent` (capped at 100). Lower values are ignored.
    pub fn advance(&self, percent: u8) {
        let percent = percent.min(100);
        self.tx.send_if_modified(|p| {
            if percent > p.percent {
                debug!(from = p.percent, to = percent, "progress advanced");
                p.percent = percent;
                true
            } else {
                false
            }
        });
    }

    pub fn set_processed(&self, processed_targets: usize) {
        self.tx.send_if_modified(|p| {
            if processed_targets > p.processed_targets {
                p.processed_targets = processed_targets;
                true
            } else {
                false
            }
        });
    }

    pub fn current(&self) -> BatchProgress {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<BatchProgress> {
        self.tx.subscribe()
    }
}

/// Progress after target `index` (0-based) of `total` succeeds:
/// `50 + round(40 * (index + 1) / total)`.
pub fn target_checkpoint(index: usize, total: usize) -> u8 {
    if total == 0 {
        return 90;
    }
    let done = (index + 1).min(total);
    // round-half-up in integer arithmetic
    let share = (80 * done + total) / (2 * total);
    (50 + share) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_log_ids_are_unique_and_ordered() {
        let log = StatusLog::new();
        let a = log.info("first");
        let b = log.error("second");
        let c = log.success("third");

        assert!(a.id < b.id && b.id < c.id);
        let snapshot = log.snapshot();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[1].kind, StatusKind::Error);
        assert_eq!(log.count(StatusKind::Error), 1);
        assert_eq!(log.since(a.id).len(), 2);
    }

    #[test]
    fn test_concurrent_pushes_stay_in_id_order() {
        let log = std::sync::Arc::new(StatusLog::new());
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for i in 0..250 {
                        log.info(format!("writer {} event {}", w, i));
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let ids: Vec<u64> = log.snapshot().iter().map(|e| e.id).collect();
        assert_eq!(ids, (1..=1000).collect::<Vec<u64>>());
    }

    #[test]
    fn test_progress_is_monotonic() {
        let progress = ProgressTracker::new();
        progress.reset(4);
        progress.advance(40);
        progress.advance(10);
        assert_eq!(progress.current().percent, 40);
        progress.advance(250);
        assert_eq!(progress.current().percent, 100);
        assert_eq!(progress.current().total_targets, 4);
    }

    #[test]
    fn test_progress_reset_returns_to_zero() {
        let progress = ProgressTracker::new();
        progress.reset(1);
        progress.advance(100);
        progress.set_processed(1);
        progress.reset(3);
        assert_eq!(progress.current(), BatchProgress {
            percent: 0,
            processed_targets: 0,
            total_targets: 3,
        });
    }

    #[test]
    fn test_subscribers_see_updates() {
        let progress = ProgressTracker::new();
        let rx = progress.subscribe();
        progress.advance(55);
        assert_eq!(rx.borrow().percent, 55);
    }

    #[test]
    fn test_target_checkpoint_matches_formula() {
        assert_eq!(target_checkpoint(0, 1), 90);
        assert_eq!(target_checkpoint(0, 3), 63); // 13.33 -> 13
        assert_eq!(target_checkpoint(1, 3), 77); // 26.67 -> 27
        assert_eq!(target_checkpoint(2, 3), 90);
        assert_eq!(target_checkpoint(0, 16), 53); // 2.5 -> 3
        assert_eq!(target_checkpoint(0, 80), 51); // 0.5 -> 1
    }
}
