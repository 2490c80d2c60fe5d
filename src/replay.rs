//! Fixture-backed collaborators.
//!
//! [`ReplaySource`] answers every collaborator call from a JSON fixture, so
//! the whole orchestration (login, batch, monitoring, export) can run
//! without a browser. Answers are deterministic.
//!
//! ```json
//! {
//!   "polls_before_login": 1,
//!   "qr_artifact": "data:image/svg+xml;utf8,<svg/>",
//!   "groups": {
//!     "https://chat.example.com/ABC123": {
//!       "label": "Book Club",
//!       "contacts": [{ "name": "Ada", "phone": "+15550001", "about": "Reader" }]
//!     },
//!     "https://chat.example.com/GONE": { "error": "group no longer exists" }
//!   },
//!   "new_members": [{ "name": "Grace", "phone": "+15550002" }]
//! }
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tracing::debug;

use crate::error::Result;
use crate::model::{GroupHarvest, HarvestFilters, RawContact, SessionConfig};
use crate::traits::{
    CollaboratorError, GroupHarvester, LoginStatus, LoginStatusProvider, MemberProbe,
    QrArtifactProvider, SessionInit, SessionInitializer, SessionTeardown,
};

const PLACEHOLDER_QR: &str = "data:image/svg+xml;utf8,<svg xmlns='http://www.w3.org/2000/svg' width='200' height='200'><rect width='100%' height='100%' fill='white'/><text x='50%' y='50%' text-anchor='middle'>Scan with your phone</text></svg>";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplayFixture {
    /// "waiting" answers before the login reports authenticated
    #[serde(default)]
    pub polls_before_login: u32,

    #[serde(default)]
    pub qr_artifact: Option<String>,

    /// When set, session initialization fails with this message
    #[serde(default)]
    pub init_error: Option<String>,

    #[serde(default)]
    pub groups: HashMap<String, ReplayGroup>,

    /// Members handed out one per probe, in order
    #[serde(default)]
    pub new_members: Vec<RawContact>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplayGroup {
    #[serde(default)]
    pub label: Option<String>,

    #[serde(default)]
    pub contacts: Vec<RawContact>,

    /// When set, harvesting this group fails with this message
    #[serde(default)]
    pub error: Option<String>,
}

pub struct ReplaySource {
    fixture: ReplayFixture,
    polls_left: AtomicU32,
    new_members: Mutex<VecDeque<RawContact>>,
    active: AtomicBool,
}

impl ReplaySource {
    pub fn new(fixture: ReplayFixture) -> Self {
        Self {
            polls_left: AtomicU32::new(fixture.polls_before_login),
            new_members: Mutex::new(fixture.new_members.iter().cloned().collect()),
            active: AtomicBool::new(false),
            fixture,
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(Self::new(serde_json::from_str(text)?))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Targets known to the fixture, sorted.
    pub fn targets(&self) -> Vec<String> {
        let mut targets: Vec<_> = self.fixture.groups.keys().cloned().collect();
        targets.sort();
        targets
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionInitializer for ReplaySource {
    async fn init(&self, config: &SessionConfig) -> std::result::Result<SessionInit, CollaboratorError> {
        if let Some(reason) = &self.fixture.init_error {
            return Err(CollaboratorError::Unavailable(reason.clone()));
        }
        debug!(driver = %config.driver_locator, "replay session started");
        self.active.store(true, Ordering::SeqCst);
        Ok(SessionInit {
            qr_artifact: Some(
                self.fixture
                    .qr_artifact
                    .clone()
                    .unwrap_or_else(|| PLACEHOLDER_QR.to_string()),
            ),
        })
    }
}

#[async_trait]
impl LoginStatusProvider for ReplaySource {
    async fn poll(&self) -> std::result::Result<LoginStatus, CollaboratorError> {
        let waiting = self
            .polls_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        Ok(if waiting {
            LoginStatus::Waiting
        } else {
            LoginStatus::Authenticated
        })
    }

    async fn reset(&self) -> std::result::Result<(), CollaboratorError> {
        self.polls_left
            .store(self.fixture.polls_before_login, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl QrArtifactProvider for ReplaySource {
    async fn fetch(&self) -> std::result::Result<String, CollaboratorError> {
        Ok(self
            .fixture
            .qr_artifact
            .clone()
            .unwrap_or_else(|| PLACEHOLDER_QR.to_string()))
    }
}

#[async_trait]
impl GroupHarvester for ReplaySource {
    fn source_id(&self) -> &str {
        "replay"
    }

    async fn harvest(
        &self,
        target: &str,
        _filters: &HarvestFilters,
    ) -> std::result::Result<GroupHarvest, CollaboratorError> {
        if !self.is_active() {
            return Err(CollaboratorError::Unavailable(
                "no active automation session".into(),
            ));
        }
        let group = self
            .fixture
            .groups
            .get(target)
            .ok_or_else(|| CollaboratorError::Request(format!("unknown group: {}", target)))?;
        if let Some(reason) = &group.error {
            return Err(CollaboratorError::Request(reason.clone()));
        }
        Ok(GroupHarvest {
            group_label: group.label.clone(),
            contacts: group.contacts.clone(),
        })
    }
}

#[async_trait]
impl MemberProbe for ReplaySource {
    async fn probe(&self, _target: &str) -> std::result::Result<Option<RawContact>, CollaboratorError> {
        Ok(self.new_members.lock().pop_front())
    }
}

#[async_trait]
impl SessionTeardown for ReplaySource {
    async fn quit(&self) -> std::result::Result<(), CollaboratorError> {
        if self.active.swap(false, Ordering::SeqCst) {
            debug!("replay session closed");
        }
        Ok(())
    }
}
