//! Pairing/login handshake.
//!
//! [`SessionGate`] owns the [`SessionState`] of one harvesting session and is
//! polled by the orchestrator. It never times out on its own; the caller
//! decides how long to wait.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{HarvestError, Result};
use crate::harvest::status::StatusLog;
use crate::model::SessionConfig;
use crate::traits::{LoginStatus, LoginStatusProvider, SessionInitializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    AwaitingScan,
    Authenticated,
    Failed,
}

/// The live session started by [`SessionGate::begin_session`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub config: SessionConfig,
    /// Pairing artifact returned by the initializer, if any.
    pub qr_artifact: Option<String>,
    pub started_at: Instant,
}

#[derive(Debug)]
struct GateInner {
    state: SessionState,
    handle: Option<SessionHandle>,
    /// Bumped by every reset so in-flight collaborator calls can tell they are stale.
    epoch: u64,
}

pub struct SessionGate {
    initializer: Arc<dyn SessionInitializer>,
    login: Arc<dyn LoginStatusProvider>,
    status: Arc<StatusLog>,
    inner: Mutex<GateInner>,
}

impl SessionGate {
    pub fn new(
        initializer: Arc<dyn SessionInitializer>,
        login: Arc<dyn LoginStatusProvider>,
        status: Arc<StatusLog>,
    ) -> Self {
        Self {
            initializer,
            login,
            status,
            inner: Mutex::new(GateInner {
                state: SessionState::Unauthenticated,
                handle: None,
                epoch: 0,
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn handle(&self) -> Option<SessionHandle> {
        self.inner.lock().handle.clone()
    }

    pub fn qr_artifact(&self) -> Option<String> {
        self.inner
            .lock()
            .handle
            .as_ref()
            .and_then(|h| h.qr_artifact.clone())
    }

    /// Starts the handshake: `Unauthenticated → AwaitingScan`, or `Failed`
    /// when the initializer errors.
    pub async fn begin_session(&self, config: SessionConfig) -> Result<SessionHandle> {
        let epoch = {
            let inner = self.inner.lock();
            if inner.state != SessionState::Unauthenticated {
                let err = HarvestError::InvalidState(format!(
                    "cannot begin a session while {:?}",
                    inner.state
                ));
                drop(inner);
                self.status.error(err.to_string());
                return Err(err);
            }
            inner.epoch
        };

        debug!(driver = %config.driver_locator, only_new_users = config.only_new_users, "initializing session");
        let outcome = self.initializer.init(&config).await;

        let mut inner = self.inner.lock();
        if inner.epoch != epoch {
            drop(inner);
            let err = HarvestError::InvalidState("session was reset during initialization".into());
            self.status.warning(err.to_string());
            return Err(err);
        }

        match outcome {
            Ok(init) => {
                let handle = SessionHandle {
                    config,
                    qr_artifact: init.qr_artifact,
                    started_at: Instant::now(),
                };
                inner.state = SessionState::AwaitingScan;
                inner.handle = Some(handle.clone());
                drop(inner);
                self.status
                    .info("Session initialized. Scan the QR code to continue...");
                Ok(handle)
            }
            Err(e) => {
                inner.state = SessionState::Failed;
                drop(inner);
                let err = HarvestError::SessionInit(e);
                self.status.error(err.to_string());
                Err(err)
            }
        }
    }

    /// Asks the login status provider whether pairing completed.
    ///
    /// Only queries the provider while `AwaitingScan`; in any other state the
    /// current state is returned unchanged. A provider failure emits a
    /// warning and leaves the state alone.
    pub async fn poll_status(&self) -> Result<SessionState> {
        let epoch = {
            let inner = self.inner.lock();
            if inner.state != SessionState::AwaitingScan {
                return Ok(inner.state);
            }
            inner.epoch
        };

        let outcome = self.login.poll().await;

        let mut inner = self.inner.lock();
        if inner.epoch != epoch || inner.state != SessionState::AwaitingScan {
            return Ok(inner.state);
        }

        match outcome {
            Ok(LoginStatus::Authenticated) => {
                inner.state = SessionState::Authenticated;
                drop(inner);
                self.status.success("Successfully logged in!");
                Ok(SessionState::Authenticated)
            }
            Ok(LoginStatus::Waiting) => Ok(SessionState::AwaitingScan),
            Err(e) => {
                drop(inner);
                let err = HarvestError::LoginPoll(e);
                self.status.warning(err.to_string());
                Err(err)
            }
        }
    }

    /// `AwaitingScan → Failed`, used when the caller gives up on the login.
    /// Returns `false` if the gate was not awaiting a scan.
    pub fn mark_failed(&self, reason: &HarvestError) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::AwaitingScan {
            return false;
        }
        inner.state = SessionState::Failed;
        drop(inner);
        self.status.error(reason.to_string());
        true
    }

    /// Forces `Unauthenticated` and discards the pairing artifact. Callable in
    /// any state.
    pub async fn reset(&self) {
        let previous = {
            let mut inner = self.inner.lock();
            let previous = inner.state;
            inner.state = SessionState::Unauthenticated;
            inner.handle = None;
            inner.epoch += 1;
            previous
        };

        if let Err(e) = self.login.reset().await {
            self.status
                .warning(format!("Login status reset failed: {}", e));
        }

        if previous != SessionState::Unauthenticated {
            self.status.info("Session reset");
        }
    }
}
