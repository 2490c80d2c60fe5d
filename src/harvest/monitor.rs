//! Continuous monitoring for members who join after a harvest.
//!
//! [`MonitorLoop`] runs one probe task per monitored target on a steady
//! interval. Discoveries go to the head of the [`ContactStore`] so the most
//! recent member is listed first.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

use crate::error::{HarvestError, Result};
use crate::harvest::cancel::CancelSignal;
use crate::harvest::status::StatusLog;
use crate::harvest::store::ContactStore;
use crate::model::{derive_group_label, HarvestFilters};
use crate::traits::MemberProbe;

struct MonitorTask {
    target: String,
    cancel: CancelSignal,
    /// Cleared by `stop_monitoring`; checked under the same lock before every
    /// store mutation so a stopped loop never appends.
    live: Arc<Mutex<bool>>,
    join: JoinHandle<()>,
}

pub struct MonitorLoop {
    probe: Arc<dyn MemberProbe>,
    store: Arc<ContactStore>,
    status: Arc<StatusLog>,
    interval: Duration,
    task: Mutex<Option<MonitorTask>>,
}

impl MonitorLoop {
    pub fn new(
        probe: Arc<dyn MemberProbe>,
        store: Arc<ContactStore>,
        status: Arc<StatusLog>,
        interval: Duration,
    ) -> Self {
        Self {
            probe,
            store,
            status,
            interval,
            task: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|t| !t.join.is_finished())
    }

    pub fn target(&self) -> Option<String> {
        self.task.lock().as_ref().map(|t| t.target.clone())
    }

    /// Spawns the probe loop for `target`. The first probe runs one interval
    /// after the call.
    pub fn start_monitoring(&self, target: &str, filters: HarvestFilters) -> Result<()> {
        let target = target.trim();
        if target.is_empty() {
            let err = HarvestError::InvalidState("no target to monitor".into());
            self.status.error(err.to_string());
            return Err(err);
        }
        if self.interval.is_zero() {
            let err = HarvestError::Config("monitor interval must be greater than 0".into());
            self.status.error(err.to_string());
            return Err(err);
        }

        let mut slot = self.task.lock();
        if slot.as_ref().is_some_and(|t| !t.join.is_finished()) {
            drop(slot);
            let err = HarvestError::InvalidState("monitoring is already running".into());
            self.status.error(err.to_string());
            return Err(err);
        }

        let cancel = CancelSignal::new();
        let live = Arc::new(Mutex::new(true));
        let worker = Worker {
            probe: self.probe.clone(),
            store: self.store.clone(),
            status: self.status.clone(),
            target: target.to_string(),
            fallback_group: derive_group_label(target),
            filters,
            interval: self.interval,
            cancel: cancel.clone(),
            live: live.clone(),
        };

        self.status.info(format!(
            "Starting continuous monitoring of {} for new members...",
            worker.fallback_group
        ));
        let join = tokio::spawn(worker.run());

        *slot = Some(MonitorTask {
            target: target.to_string(),
            cancel,
            live,
            join,
        });
        Ok(())
    }

    /// Stops the loop at the next tick boundary. An in-flight probe result is
    /// discarded. Returns `false` when nothing was running.
    pub fn stop_monitoring(&self) -> bool {
        let Some(task) = self.task.lock().take() else {
            return false;
        };
        *task.live.lock() = false;
        task.cancel.cancel();
        if task.join.is_finished() {
            return false;
        }
        self.status.info("Monitoring stopped");
        true
    }
}

impl Drop for MonitorLoop {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            *task.live.lock() = false;
            task.cancel.cancel();
        }
    }
}

struct Worker {
    probe: Arc<dyn MemberProbe>,
    store: Arc<ContactStore>,
    status: Arc<StatusLog>,
    target: String,
    fallback_group: String,
    filters: HarvestFilters,
    interval: Duration,
    cancel: CancelSignal,
    live: Arc<Mutex<bool>>,
}

impl Worker {
    async fn run(self) {
        let mut ticker = time::interval(self.interval);
        // A probe still running when the next tick is due skips that tick.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // Consume the first tick which fires immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.canceled() => break,
                _ = ticker.tick() => {}
            }

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.canceled() => break,
                outcome = self.probe.probe(&self.target) => outcome,
            };

            match outcome {
                Ok(Some(raw)) => {
                    let contact = self.filters.apply(raw, &self.fallback_group);
                    let live = self.live.lock();
                    if !*live {
                        break;
                    }
                    let name = contact.name.clone();
                    self.store.append_front(contact);
                    drop(live);
                    self.status.success(format!("New member detected: {}", name));
                }
                Ok(None) => debug!(group = %self.target, "no new members"),
                Err(e) => {
                    if !*self.live.lock() {
                        break;
                    }
                    let err = HarvestError::MonitorProbe(e);
                    self.status.warning(err.to_string());
                }
            }
        }
        debug!(group = %self.target, "monitoring loop exited");
    }
}
