//! Caller-facing surface of the harvester.
//!
//! [`HarvestController`] wires the collaborators into one session gate,
//! orchestrator, monitor and store, and exposes the four non-blocking
//! operations (`start_batch`, `cancel_batch`, `start_monitor`,
//! `stop_monitor`) plus the observation points and session housekeeping.
//!
//! Methods that spawn work must be called from within a tokio runtime.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::HarvesterSettings;
use crate::error::{HarvestError, Result};
use crate::executor::TargetProcessor;
use crate::harvest::formats::{self, ExportArtifact};
use crate::harvest::{
    BatchHandle, BatchOrchestrator, BatchReport, BatchState, ContactStore, MonitorLoop,
    SessionGate, SessionState, StatusLog, StoreSummary,
};
use crate::model::{BatchProgress, Contact, HarvestFilters, SessionConfig, StatusEvent};
use crate::traits::Collaborators;

pub struct HarvestController {
    collaborators: Collaborators,
    status: Arc<StatusLog>,
    store: Arc<ContactStore>,
    gate: Arc<SessionGate>,
    orchestrator: Arc<BatchOrchestrator>,
    monitor: MonitorLoop,
    batch: Mutex<Option<BatchHandle>>,
    /// Filters of the most recent batch, reused by monitoring.
    last_filters: Mutex<HarvestFilters>,
}

impl HarvestController {
    /// Wires the components from `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::Config`] when the settings fail validation.
    pub fn new(collaborators: Collaborators, settings: &HarvesterSettings) -> Result<Self> {
        settings.validate()?;

        let status = Arc::new(StatusLog::new());
        let store = Arc::new(ContactStore::new());
        let gate = Arc::new(SessionGate::new(
            collaborators.initializer.clone(),
            collaborators.login.clone(),
            status.clone(),
        ));
        let processor = Arc::new(
            TargetProcessor::new(collaborators.harvester.clone())
                .with_timeout(settings.timings.harvest_timeout()),
        );
        let orchestrator = Arc::new(
            BatchOrchestrator::new(gate.clone(), processor, store.clone(), status.clone())
                .with_timings(settings.timings.batch_timings()),
        );
        let monitor = MonitorLoop::new(
            collaborators.probe.clone(),
            store.clone(),
            status.clone(),
            settings.timings.monitor_interval(),
        );

        Ok(Self {
            collaborators,
            status,
            store,
            gate,
            orchestrator,
            monitor,
            batch: Mutex::new(None),
            last_filters: Mutex::new(settings.filters),
        })
    }

    // ── Operations ────────────────────────────────────────────────────────

    /// Starts a batch and returns immediately.
    ///
    /// Rejected while monitoring is active: monitoring must be stopped first
    /// so two contact sources never interleave.
    pub fn start_batch(
        &self,
        targets: Vec<String>,
        filters: HarvestFilters,
        session_config: SessionConfig,
    ) -> Result<()> {
        if self.monitor.is_running() {
            let err =
                HarvestError::InvalidState("stop monitoring before starting a new batch".into());
            self.status.error(err.to_string());
            return Err(err);
        }

        let handle = self.orchestrator.start(targets, filters, session_config)?;
        *self.last_filters.lock() = filters;
        *self.batch.lock() = Some(handle);
        Ok(())
    }

    /// Requests cancellation of the running batch. Returns `false` if none is running.
    pub fn cancel_batch(&self) -> bool {
        match self.batch.lock().as_ref() {
            Some(handle) if !handle.is_finished() => {
                handle.cancel();
                true
            }
            _ => false,
        }
    }

    /// Starts monitoring `target`; only allowed after a batch completed.
    pub fn start_monitor(&self, target: &str) -> Result<()> {
        let state = self.orchestrator.state();
        if state != BatchState::Completed {
            let err = HarvestError::InvalidState(format!(
                "monitoring requires a completed batch (current: {:?})",
                state
            ));
            self.status.error(err.to_string());
            return Err(err);
        }
        let filters = *self.last_filters.lock();
        self.monitor.start_monitoring(target, filters)
    }

    pub fn stop_monitor(&self) -> bool {
        self.monitor.stop_monitoring()
    }

    /// Waits for the current batch, if any, and returns its report.
    pub async fn wait_for_batch(&self) -> Result<Option<BatchReport>> {
        let handle = self.batch.lock().take();
        match handle {
            Some(handle) => handle.wait().await.map(Some),
            None => Ok(None),
        }
    }

    // ── Observation ───────────────────────────────────────────────────────

    pub fn events(&self) -> Vec<StatusEvent> {
        self.status.snapshot()
    }

    pub fn events_since(&self, id: u64) -> Vec<StatusEvent> {
        self.status.since(id)
    }

    pub fn progress(&self) -> BatchProgress {
        self.orchestrator.progress()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<BatchProgress> {
        self.orchestrator.subscribe_progress()
    }

    pub fn batch_state(&self) -> BatchState {
        self.orchestrator.state()
    }

    pub fn session_state(&self) -> SessionState {
        self.gate.state()
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor.is_running()
    }

    pub fn contacts(&self) -> Vec<Contact> {
        self.store.all()
    }

    pub fn summary(&self) -> StoreSummary {
        self.store.summary()
    }

    /// Pairing artifact returned when the current session began.
    pub fn session_qr_artifact(&self) -> Option<String> {
        self.gate.qr_artifact()
    }

    // ── Housekeeping ──────────────────────────────────────────────────────

    /// Fetches a fresh pairing artifact from the QR provider.
    pub async fn refresh_qr_artifact(&self) -> Result<String> {
        self.collaborators.qr.fetch().await.map_err(|e| {
            let err = HarvestError::QrFetch(e);
            self.status.error(err.to_string());
            err
        })
    }

    /// Encodes the accumulated contacts. A bad format fails only this call.
    pub fn export(&self, format: &str) -> Result<ExportArtifact> {
        let contacts = self.store.all();
        match formats::export(format, &contacts) {
            Ok(artifact) => {
                self.status.success(format!(
                    "Exported {} contacts to {}",
                    contacts.len(),
                    artifact.filename
                ));
                Ok(artifact)
            }
            Err(err) => {
                self.status.error(format!("Export failed: {}", err));
                Err(err)
            }
        }
    }

    /// Removes contacts sharing a `(phone, group)` identity.
    pub fn dedupe_contacts(&self) -> usize {
        let removed = self.store.dedupe();
        if removed > 0 {
            self.status
                .info(format!("Removed {} duplicate contacts", removed));
        }
        removed
    }

    /// Resets the session and discards every accumulated contact.
    ///
    /// A running batch is canceled and awaited first, so a harvest that was
    /// in flight cannot land in the cleared store.
    pub async fn reset_session(&self) {
        self.monitor.stop_monitoring();
        self.cancel_and_wait().await;
        self.gate.reset().await;
        self.store.clear();
    }

    /// Stops all work and closes the automation session.
    pub async fn teardown(&self) -> Result<()> {
        self.monitor.stop_monitoring();
        self.cancel_and_wait().await;

        info!("closing automation session");
        let outcome = self.collaborators.teardown.quit().await;
        self.gate.reset().await;

        match outcome {
            Ok(()) => {
                self.status.info("Automation session closed");
                Ok(())
            }
            Err(e) => {
                let err = HarvestError::Teardown(e);
                self.status.error(err.to_string());
                Err(err)
            }
        }
    }

    async fn cancel_and_wait(&self) {
        if !self.cancel_batch() {
            return;
        }
        if let Err(e) = self.wait_for_batch().await {
            warn!(error = %e, "canceled batch did not shut down cleanly");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StatusKind;
    use crate::testing::MockSource;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn controller(source: &Arc<MockSource>) -> HarvestController {
        HarvestController::new(source.collaborators(), &HarvesterSettings::default()).unwrap()
    }

    fn targets(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_batch_returns_immediately() {
        let source = MockSource::new();
        source.with_group("g1", None, 2);
        source.polls_before_auth.store(2, Ordering::SeqCst);
        let ctl = controller(&source);

        ctl.start_batch(
            targets(&["g1"]),
            HarvestFilters::default(),
            SessionConfig::default(),
        )
        .unwrap();
        assert!(ctl.batch_state().is_running());

        let report = ctl.wait_for_batch().await.unwrap().unwrap();
        assert_eq!(report.state, BatchState::Completed);
        assert_eq!(ctl.progress().percent, 100);
        assert_eq!(ctl.contacts().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_batch_reports_single_error() {
        let source = MockSource::new();
        let ctl = controller(&source);

        let err = ctl
            .start_batch(Vec::new(), HarvestFilters::default(), SessionConfig::default())
            .unwrap_err();
        assert!(matches!(err, HarvestError::EmptyTargets));
        assert_eq!(ctl.batch_state(), BatchState::Aborted);
        assert_eq!(
            ctl.events()
                .iter()
                .filter(|e| e.kind == StatusKind::Error)
                .count(),
            1
        );
        assert!(ctl.contacts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_requires_completed_batch() {
        let source = MockSource::new();
        let ctl = controller(&source);

        assert!(matches!(
            ctl.start_monitor("g1"),
            Err(HarvestError::InvalidState(_))
        ));
        assert!(!ctl.is_monitoring());
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_rejected_while_monitoring() {
        let source = MockSource::new();
        source.with_group("g1", None, 1);
        let ctl = controller(&source);

        ctl.start_batch(
            targets(&["g1"]),
            HarvestFilters::default(),
            SessionConfig::default(),
        )
        .unwrap();
        ctl.wait_for_batch().await.unwrap();

        ctl.start_monitor("g1").unwrap();
        assert!(ctl.is_monitoring());

        let err = ctl
            .start_batch(
                targets(&["g2"]),
                HarvestFilters::default(),
                SessionConfig::default(),
            )
            .unwrap_err();
        assert!(matches!(err, HarvestError::InvalidState(_)));

        assert!(ctl.stop_monitor());
        ctl.start_batch(
            targets(&["g1"]),
            HarvestFilters::default(),
            SessionConfig::default(),
        )
        .unwrap();
        let report = ctl.wait_for_batch().await.unwrap().unwrap();
        assert_eq!(report.state, BatchState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_uses_batch_filters() {
        let source = MockSource::new();
        source.with_group("g1", None, 1);
        source.probe_script.lock().push_back(Ok(Some(crate::model::RawContact {
            name: Some("Newcomer".into()),
            phone: Some("+19990000".into()),
            group: None,
            about: Some("New member".into()),
        })));
        let ctl = controller(&source);

        let filters = HarvestFilters {
            include_names: true,
            include_phones: false,
            include_about: false,
        };
        ctl.start_batch(targets(&["g1"]), filters, SessionConfig::default())
            .unwrap();
        ctl.wait_for_batch().await.unwrap();
        ctl.start_monitor("g1").unwrap();

        tokio::time::sleep(Duration::from_secs(11)).await;
        let newest = &ctl.contacts()[0];
        assert_eq!(newest.name, "Newcomer");
        assert_eq!(newest.phone, "N/A");
        ctl.stop_monitor();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_batch() {
        let source = MockSource::new();
        source.polls_before_auth.store(usize::MAX, Ordering::SeqCst);
        let ctl = controller(&source);

        assert!(!ctl.cancel_batch());
        ctl.start_batch(
            targets(&["g1"]),
            HarvestFilters::default(),
            SessionConfig::default(),
        )
        .unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(ctl.cancel_batch());

        let report = ctl.wait_for_batch().await.unwrap().unwrap();
        assert_eq!(report.state, BatchState::Aborted);
        assert_eq!(ctl.events().last().unwrap().kind, StatusKind::Warning);
    }

    #[tokio::test]
    async fn test_export_unknown_format_fails_only_that_call() {
        let source = MockSource::new();
        let ctl = controller(&source);

        assert!(matches!(
            ctl.export("pdf"),
            Err(HarvestError::UnsupportedFormat(_))
        ));
        assert!(ctl.export("json").is_ok());
        assert_eq!(
            ctl.events()
                .iter()
                .filter(|e| e.kind == StatusKind::Error)
                .count(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_session_clears_contacts() {
        let source = MockSource::new();
        source.with_group("g1", None, 3);
        let ctl = controller(&source);

        ctl.start_batch(
            targets(&["g1"]),
            HarvestFilters::default(),
            SessionConfig::default(),
        )
        .unwrap();
        ctl.wait_for_batch().await.unwrap();
        assert_eq!(ctl.contacts().len(), 3);

        ctl.reset_session().await;
        assert!(ctl.contacts().is_empty());
        assert_eq!(ctl.session_state(), SessionState::Unauthenticated);
        assert!(ctl.session_qr_artifact().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_session_discards_in_flight_harvest() {
        let source = MockSource::new();
        source.with_group("g1", None, 3);
        source.with_group("g2", None, 3);
        *source.harvest_delay.lock() = Some(Duration::from_secs(3));
        let ctl = controller(&source);

        ctl.start_batch(
            targets(&["g1", "g2"]),
            HarvestFilters::default(),
            SessionConfig::default(),
        )
        .unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        ctl.reset_session().await;
        assert!(ctl.contacts().is_empty());
        assert_eq!(ctl.batch_state(), BatchState::Aborted);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(ctl.contacts().is_empty());
        assert_eq!(ctl.session_state(), SessionState::Unauthenticated);
        assert_eq!(*source.harvested.lock(), vec!["g1".to_string()]);
    }

    #[test]
    fn test_new_rejects_invalid_settings() {
        let source = MockSource::new();
        let mut settings = HarvesterSettings::default();
        settings.timings.monitor_interval_secs = 0;

        let result = HarvestController::new(source.collaborators(), &settings);
        assert!(matches!(result, Err(HarvestError::Config(_))));
    }

    #[tokio::test]
    async fn test_refresh_qr_artifact_failure() {
        let source = MockSource::new();
        *source.qr_failure.lock() = Some("browser closed".into());
        let ctl = controller(&source);

        let err = ctl.refresh_qr_artifact().await.unwrap_err();
        assert!(matches!(err, HarvestError::QrFetch(_)));
        assert!(err.to_string().contains("browser closed"));
        assert_eq!(ctl.events().len(), 1);
        assert_eq!(ctl.events()[0].kind, StatusKind::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_waits_for_running_batch() {
        let source = MockSource::new();
        source.polls_before_auth.store(usize::MAX, Ordering::SeqCst);
        let ctl = controller(&source);

        ctl.start_batch(
            targets(&["g1"]),
            HarvestFilters::default(),
            SessionConfig::default(),
        )
        .unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        ctl.teardown().await.unwrap();
        assert_eq!(ctl.batch_state(), BatchState::Aborted);
        assert_eq!(source.quit_calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctl.session_state(), SessionState::Unauthenticated);
        assert!(ctl.wait_for_batch().await.unwrap().is_none());
        assert_eq!(
            ctl.events().last().unwrap().message,
            "Automation session closed"
        );
    }

    #[tokio::test]
    async fn test_teardown_is_safe_without_session() {
        let source = MockSource::new();
        let ctl = controller(&source);

        ctl.teardown().await.unwrap();
        assert_eq!(source.quit_calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctl.session_state(), SessionState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_refresh_qr_artifact() {
        let source = MockSource::new();
        let ctl = controller(&source);
        let qr = ctl.refresh_qr_artifact().await.unwrap();
        assert!(qr.starts_with("data:image/"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dedupe_contacts() {
        let source = MockSource::new();
        source.with_group("g1", Some("Same"), 2);
        let ctl = controller(&source);

        for _ in 0..2 {
            ctl.start_batch(
                targets(&["g1"]),
                HarvestFilters::default(),
                SessionConfig::default(),
            )
            .unwrap();
            ctl.wait_for_batch().await.unwrap();
        }
        assert_eq!(ctl.contacts().len(), 4);
        assert_eq!(ctl.dedupe_contacts(), 2);
        assert_eq!(ctl.summary().contacts_per_group.get("Same"), Some(&2));
    }
}
