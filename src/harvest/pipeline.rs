//! Batch harvest orchestrator.
//!
//! This module provides the [`BatchOrchestrator`] that walks an ordered list
//! of group targets through a single harvesting session:
//! 1. **Session**: begin the pairing handshake via [`SessionGate`]
//! 2. **Login**: poll the gate until authenticated, canceled or timed out
//! 3. **Processing**: harvest each target in input order, pausing between them
//!
//! Progress and status are published through [`ProgressTracker`] and
//! [`StatusLog`] and can be read at any time while a batch runs.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{HarvestError, Result};
use crate::executor::TargetProcessor;
use crate::harvest::cancel::CancelSignal;
use crate::harvest::session::{SessionGate, SessionState};
use crate::harvest::status::{target_checkpoint, ProgressTracker, StatusLog};
use crate::harvest::store::ContactStore;
use crate::model::{
    normalize_targets, BatchProgress, ContactBatch, HarvestFilters, SessionConfig,
};

/// Progress reported once the login completes.
const LOGIN_CHECKPOINT: u8 = 40;

/// Progress reported when target processing begins.
const PROCESSING_CHECKPOINT: u8 = 50;

// ============================================================================
// Batch Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    AwaitingLogin,
    Processing,
    Completed,
    Aborted,
}

impl BatchState {
    pub fn is_running(self) -> bool {
        matches!(self, BatchState::AwaitingLogin | BatchState::Processing)
    }
}

/// Timing and retry policy for one orchestrator.
#[derive(Debug, Clone)]
pub struct BatchTimings {
    /// Delay between login status polls (default: 5s)
    pub poll_interval: Duration,

    /// Give up on the login after this long; `None` waits until canceled
    pub login_timeout: Option<Duration>,

    /// Pause between consecutive target attempts (default: 2s)
    pub target_pause: Duration,

    /// Progress shown while waiting for the login (default: 10)
    pub initial_checkpoint: u8,

    /// Harvest attempts per target before it is reported as failed (default: 1)
    pub max_attempts: u32,
}

impl Default for BatchTimings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            login_timeout: None,
            target_pause: Duration::from_secs(2),
            initial_checkpoint: 10,
            max_attempts: 1,
        }
    }
}

/// Statistics about one batch run.
#[derive(Debug, Default, Clone)]
pub struct BatchStats {
    pub total_targets: usize,

    /// Targets whose attempts were all made (success or failure)
    pub attempted: usize,

    pub succeeded: usize,

    /// 1-based indices of targets that failed
    pub failed_targets: Vec<usize>,

    pub contacts_added: usize,

    /// Time from session start to authentication (milliseconds)
    pub login_duration_ms: u64,

    /// Time spent harvesting targets (milliseconds)
    pub processing_duration_ms: u64,

    pub total_duration_ms: u64,
}

/// Final outcome of one batch run.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub state: BatchState,
    pub progress: BatchProgress,
    pub stats: BatchStats,
}

/// Handle to a batch running on a tokio task.
#[derive(Debug)]
pub struct BatchHandle {
    cancel: CancelSignal,
    join: JoinHandle<BatchReport>,
}

impl BatchHandle {
    /// Requests cancellation; honoured between target attempts, never mid-attempt.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub async fn wait(self) -> Result<BatchReport> {
        self.join
            .await
            .map_err(|e| HarvestError::InvalidState(format!("batch task failed: {}", e)))
    }
}

enum LoginOutcome {
    Authenticated,
    Canceled,
    Failed,
}

enum TargetOutcome {
    Harvested(ContactBatch),
    Failed(HarvestError),
    Canceled,
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Sequential, session-gated batch harvester.
///
/// State machine per run: `Idle → AwaitingLogin → Processing → Completed`,
/// with `Aborted` reachable on session failure, an empty target list, or
/// cancellation. One bad target never aborts the batch.
pub struct BatchOrchestrator {
    gate: Arc<SessionGate>,
    processor: Arc<TargetProcessor>,
    store: Arc<ContactStore>,
    status: Arc<StatusLog>,
    progress: ProgressTracker,
    state: watch::Sender<BatchState>,
    timings: BatchTimings,
}

impl BatchOrchestrator {
    pub fn new(
        gate: Arc<SessionGate>,
        processor: Arc<TargetProcessor>,
        store: Arc<ContactStore>,
        status: Arc<StatusLog>,
    ) -> Self {
        let (state, _rx) = watch::channel(BatchState::Idle);
        Self {
            gate,
            processor,
            store,
            status,
            progress: ProgressTracker::new(),
            state,
            timings: BatchTimings::default(),
        }
    }

    pub fn with_timings(mut self, timings: BatchTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn state(&self) -> BatchState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<BatchState> {
        self.state.subscribe()
    }

    pub fn progress(&self) -> BatchProgress {
        self.progress.current()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<BatchProgress> {
        self.progress.subscribe()
    }

    /// Starts a batch on a new tokio task and returns immediately.
    ///
    /// An empty target list (after trimming blanks) is rejected on the spot:
    /// the batch goes straight to `Aborted` with one error event.
    pub fn start(
        self: &Arc<Self>,
        targets: Vec<String>,
        filters: HarvestFilters,
        session_config: SessionConfig,
    ) -> Result<BatchHandle> {
        let targets = self.claim(targets)?;
        let cancel = CancelSignal::new();
        let token = cancel.clone();
        let this = Arc::clone(self);
        let join =
            tokio::spawn(async move { this.drive(targets, filters, session_config, token).await });
        Ok(BatchHandle { cancel, join })
    }

    /// Runs a batch to completion on the current task.
    pub async fn run(
        &self,
        targets: Vec<String>,
        filters: HarvestFilters,
        session_config: SessionConfig,
        cancel: CancelSignal,
    ) -> Result<BatchReport> {
        let targets = self.claim(targets)?;
        Ok(self.drive(targets, filters, session_config, cancel).await)
    }

    /// Validates the target list and moves the state machine out of idle.
    fn claim(&self, targets: Vec<String>) -> Result<Vec<String>> {
        let targets = normalize_targets(targets);

        if self.state().is_running() {
            let err = HarvestError::InvalidState("a batch is already running".into());
            self.status.error(err.to_string());
            return Err(err);
        }

        if self.timings.poll_interval.is_zero() {
            let err = HarvestError::Config("login poll interval must be greater than 0".into());
            self.status.error(err.to_string());
            return Err(err);
        }

        if targets.is_empty() {
            self.progress.reset(0);
            self.state.send_replace(BatchState::Aborted);
            let err = HarvestError::EmptyTargets;
            self.status.error(err.to_string());
            return Err(err);
        }

        let claimed = self.state.send_if_modified(|state| {
            if state.is_running() {
                false
            } else {
                *state = BatchState::AwaitingLogin;
                true
            }
        });
        if !claimed {
            let err = HarvestError::InvalidState("a batch is already running".into());
            self.status.error(err.to_string());
            return Err(err);
        }

        self.progress.reset(targets.len());
        Ok(targets)
    }

    async fn drive(
        &self,
        targets: Vec<String>,
        filters: HarvestFilters,
        session_config: SessionConfig,
        cancel: CancelSignal,
    ) -> BatchReport {
        let start = Instant::now();
        let total = targets.len();
        let mut stats = BatchStats {
            total_targets: total,
            ..BatchStats::default()
        };

        // ====================================================================
        // Stage 1: Session
        // ====================================================================

        info!(targets = total, "Starting batch");

        if self.gate.state() != SessionState::Unauthenticated {
            self.gate.reset().await;
        }

        if self.gate.begin_session(session_config).await.is_err() {
            return self.finish(BatchState::Aborted, stats, start);
        }
        self.progress.advance(self.timings.initial_checkpoint);

        // ====================================================================
        // Stage 2: Login
        // ====================================================================

        let login_start = Instant::now();
        match self.await_login(&cancel).await {
            LoginOutcome::Authenticated => {}
            LoginOutcome::Canceled => {
                self.status
                    .warning("Harvest canceled while waiting for login");
                return self.finish(BatchState::Aborted, stats, start);
            }
            LoginOutcome::Failed => return self.finish(BatchState::Aborted, stats, start),
        }
        stats.login_duration_ms = login_start.elapsed().as_millis() as u64;
        self.progress.advance(LOGIN_CHECKPOINT);

        // ====================================================================
        // Stage 3: Processing
        // ====================================================================

        self.state.send_replace(BatchState::Processing);
        self.status
            .info(format!("Processing {} group(s)...", total));
        self.progress.advance(PROCESSING_CHECKPOINT);

        let processing_start = Instant::now();
        for (index, target) in targets.iter().enumerate() {
            if cancel.is_canceled() {
                self.warn_canceled(index, total);
                return self.finish(BatchState::Aborted, stats, start);
            }

            self.status
                .info(format!("Processing group {} of {}...", index + 1, total));

            match self.attempt_target(index, target, &filters, &cancel).await {
                TargetOutcome::Harvested(batch) => {
                    let added = self.store.append(batch.contacts);
                    self.status.success(format!(
                        "Successfully harvested {} contacts from {}",
                        added, batch.group_label
                    ));
                    self.progress.advance(target_checkpoint(index, total));
                    stats.succeeded += 1;
                    stats.contacts_added += added;
                }
                TargetOutcome::Failed(err) => {
                    self.status.error(format!(
                        "Failed to process group {}: {}",
                        index + 1,
                        failure_cause(&err)
                    ));
                    stats.failed_targets.push(index + 1);
                }
                TargetOutcome::Canceled => {
                    self.warn_canceled(index, total);
                    return self.finish(BatchState::Aborted, stats, start);
                }
            }

            stats.attempted += 1;
            self.progress.set_processed(index + 1);

            if index + 1 < total && !cancel.sleep(self.timings.target_pause).await {
                self.warn_canceled(index + 1, total);
                return self.finish(BatchState::Aborted, stats, start);
            }
        }
        stats.processing_duration_ms = processing_start.elapsed().as_millis() as u64;

        self.progress.advance(100);
        self.status.success(format!(
            "Harvest completed: {} contacts from {} of {} group(s)",
            stats.contacts_added, stats.succeeded, total
        ));
        self.finish(BatchState::Completed, stats, start)
    }

    /// Polls the gate until authenticated. The gate or this method emits
    /// exactly one event for every failure path.
    async fn await_login(&self, cancel: &CancelSignal) -> LoginOutcome {
        let started = Instant::now();
        loop {
            if cancel.is_canceled() {
                return LoginOutcome::Canceled;
            }

            match self.gate.poll_status().await {
                Ok(SessionState::Authenticated) => return LoginOutcome::Authenticated,
                Ok(SessionState::AwaitingScan) => {}
                // The gate already reported the poll failure; keep waiting.
                Err(_) => {}
                Ok(SessionState::Failed) => return LoginOutcome::Failed,
                Ok(SessionState::Unauthenticated) => {
                    self.status
                        .warning("Session was reset before the login completed");
                    return LoginOutcome::Failed;
                }
            }

            if let Some(limit) = self.timings.login_timeout {
                if started.elapsed() >= limit {
                    let err = HarvestError::LoginTimeout {
                        waited_secs: started.elapsed().as_secs(),
                    };
                    if !self.gate.mark_failed(&err) {
                        self.status.error(err.to_string());
                    }
                    return LoginOutcome::Failed;
                }
            }

            debug!("waiting for login");
            if !cancel.sleep(self.timings.poll_interval).await {
                return LoginOutcome::Canceled;
            }
        }
    }

    async fn attempt_target(
        &self,
        index: usize,
        target: &str,
        filters: &HarvestFilters,
        cancel: &CancelSignal,
    ) -> TargetOutcome {
        let attempts = self.timings.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.processor.process(target, filters).await {
                Ok(batch) => return TargetOutcome::Harvested(batch),
                Err(err) if attempt < attempts => {
                    self.status.warning(format!(
                        "Attempt {} of {} for group {} failed: {}; retrying",
                        attempt,
                        attempts,
                        index + 1,
                        failure_cause(&err)
                    ));
                    if !cancel.sleep(self.timings.target_pause).await {
                        return TargetOutcome::Canceled;
                    }
                    attempt += 1;
                }
                Err(err) => return TargetOutcome::Failed(err),
            }
        }
    }

    fn warn_canceled(&self, done: usize, total: usize) {
        warn!(done, total, "batch canceled");
        self.status.warning(format!(
            "Harvest canceled after {} of {} group(s)",
            done, total
        ));
    }

    fn finish(&self, state: BatchState, mut stats: BatchStats, start: Instant) -> BatchReport {
        stats.total_duration_ms = start.elapsed().as_millis() as u64;
        self.state.send_replace(state);
        info!(
            state = ?state,
            succeeded = stats.succeeded,
            failed = stats.failed_targets.len(),
            contacts = stats.contacts_added,
            duration_ms = stats.total_duration_ms,
            "Batch finished"
        );
        BatchReport {
            state,
            progress: self.progress.current(),
            stats,
        }
    }
}

fn failure_cause(err: &HarvestError) -> String {
    match err {
        HarvestError::TargetProcessing { cause, .. } => cause.to_string(),
        other => other.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================
