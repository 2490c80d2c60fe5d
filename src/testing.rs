//! Scripted collaborators shared by the unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::model::{GroupHarvest, HarvestFilters, RawContact, SessionConfig};
use crate::traits::{
    CollaboratorError, Collaborators, GroupHarvester, LoginStatus, LoginStatusProvider,
    MemberProbe, QrArtifactProvider, SessionInit, SessionInitializer, SessionTeardown,
};

pub(crate) fn raw_contacts(group_size: usize, prefix: &str) -> Vec<RawContact> {
    (0..group_size)
        .map(|i| RawContact {
            name: Some(format!("{} Member {}", prefix, i)),
            phone: Some(format!("+1555{:07}", i)),
            group: None,
            about: Some("Engineer".to_string()),
        })
        .collect()
}

/// One object playing every collaborator role, with scripted answers.
#[derive(Default)]
pub(crate) struct MockSource {
    pub init_failure: Mutex<Option<String>>,
    pub init_delay: Mutex<Option<Duration>>,
    pub qr_failure: Mutex<Option<String>>,
    /// Polls answered with "waiting" before reporting authenticated.
    /// `usize::MAX` never authenticates.
    pub polls_before_auth: AtomicUsize,
    pub poll_failures: AtomicUsize,
    pub groups: Mutex<HashMap<String, std::result::Result<GroupHarvest, String>>>,
    pub harvest_delay: Mutex<Option<Duration>>,
    pub probe_script: Mutex<VecDeque<std::result::Result<Option<RawContact>, String>>>,
    pub probe_delay: Mutex<Option<Duration>>,

    pub init_calls: AtomicUsize,
    pub poll_calls: AtomicUsize,
    pub login_resets: AtomicUsize,
    pub harvested: Mutex<Vec<String>>,
    pub probe_calls: AtomicUsize,
    pub quit_calls: AtomicUsize,
}

impl MockSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_group(self: &Arc<Self>, target: &str, label: Option<&str>, size: usize) {
        self.groups.lock().insert(
            target.to_string(),
            Ok(GroupHarvest {
                group_label: label.map(str::to_string),
                contacts: raw_contacts(size, target),
            }),
        );
    }

    pub fn with_failing_group(self: &Arc<Self>, target: &str, reason: &str) {
        self.groups
            .lock()
            .insert(target.to_string(), Err(reason.to_string()));
    }

    pub fn collaborators(self: &Arc<Self>) -> Collaborators {
        Collaborators::from_source(self.clone())
    }
}

#[async_trait]
impl SessionInitializer for MockSource {
    async fn init(&self, _config: &SessionConfig) -> Result<SessionInit, CollaboratorError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.init_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.init_failure.lock().clone() {
            Some(reason) => Err(CollaboratorError::Unavailable(reason)),
            None => Ok(SessionInit {
                qr_artifact: Some("data:image/svg+xml;utf8,<svg/>".to_string()),
            }),
        }
    }
}

#[async_trait]
impl LoginStatusProvider for MockSource {
    async fn poll(&self) -> Result<LoginStatus, CollaboratorError> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        if self.poll_failures.load(Ordering::SeqCst) > 0 {
            self.poll_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(CollaboratorError::Request("status endpoint down".into()));
        }
        let remaining = self.polls_before_auth.load(Ordering::SeqCst);
        if remaining == 0 {
            Ok(LoginStatus::Authenticated)
        } else {
            if remaining != usize::MAX {
                self.polls_before_auth.fetch_sub(1, Ordering::SeqCst);
            }
            Ok(LoginStatus::Waiting)
        }
    }

    async fn reset(&self) -> Result<(), CollaboratorError> {
        self.login_resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl QrArtifactProvider for MockSource {
    async fn fetch(&self) -> Result<String, CollaboratorError> {
        if let Some(reason) = self.qr_failure.lock().clone() {
            return Err(CollaboratorError::Unavailable(reason));
        }
        Ok("data:image/svg+xml;utf8,<svg>fresh</svg>".to_string())
    }
}

#[async_trait]
impl GroupHarvester for MockSource {
    fn source_id(&self) -> &str {
        "mock"
    }

    async fn harvest(
        &self,
        target: &str,
        _filters: &HarvestFilters,
    ) -> Result<GroupHarvest, CollaboratorError> {
        self.harvested.lock().push(target.to_string());
        let delay = *self.harvest_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.groups.lock().get(target).cloned();
        match scripted {
            Some(Ok(harvest)) => Ok(harvest),
            Some(Err(reason)) => Err(CollaboratorError::Request(reason)),
            None => Ok(GroupHarvest::default()),
        }
    }
}

#[async_trait]
impl MemberProbe for MockSource {
    async fn probe(&self, _target: &str) -> Result<Option<RawContact>, CollaboratorError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.probe_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.probe_script.lock().pop_front();
        match next {
            Some(Ok(found)) => Ok(found),
            Some(Err(reason)) => Err(CollaboratorError::Request(reason)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl SessionTeardown for MockSource {
    async fn quit(&self) -> Result<(), CollaboratorError> {
        self.quit_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
