//! Interfaces of the external collaborators the harvester drives.
//!
//! The crate never talks to a browser or a messaging service itself; every
//! side effect goes through one of these traits so the orchestration logic
//! can run against real automation, the fixture-backed
//! [`ReplaySource`](crate::replay::ReplaySource), or test doubles.

use crate::model::{GroupHarvest, HarvestFilters, RawContact, SessionConfig};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("Request failed: {0}")]
    Request(String),
    #[error("Malformed response: {0}")]
    Malformed(String),
    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),
    #[error("Timed out after {0}s")]
    Timeout(u64),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Outcome of a successful session initialization.
#[derive(Debug, Clone, Default)]
pub struct SessionInit {
    /// Pairing artifact (data URI) to show to the user, if the driver produced one.
    pub qr_artifact: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStatus {
    Waiting,
    Authenticated,
}

#[async_trait]
pub trait SessionInitializer: Send + Sync {
    async fn init(&self, config: &SessionConfig) -> Result<SessionInit, CollaboratorError>;
}

#[async_trait]
pub trait LoginStatusProvider: Send + Sync {
    /// Cheap status check; called on every poll interval.
    async fn poll(&self) -> Result<LoginStatus, CollaboratorError>;

    async fn reset(&self) -> Result<(), CollaboratorError>;
}

#[async_trait]
pub trait QrArtifactProvider: Send + Sync {
    /// Returns the current pairing image as a data URI.
    async fn fetch(&self) -> Result<String, CollaboratorError>;
}

#[async_trait]
pub trait GroupHarvester: Send + Sync {
    /// Identifier used in logs (e.g., "webdriver", "replay").
    fn source_id(&self) -> &str;

    /// Collects the member records of one group target.
    async fn harvest(
        &self,
        target: &str,
        filters: &HarvestFilters,
    ) -> Result<GroupHarvest, CollaboratorError>;
}

#[async_trait]
pub trait MemberProbe: Send + Sync {
    /// Returns a member that joined since the previous probe, if any.
    async fn probe(&self, target: &str) -> Result<Option<RawContact>, CollaboratorError>;
}

#[async_trait]
pub trait SessionTeardown: Send + Sync {
    /// Closes the automation session. Must be a no-op when none is active.
    async fn quit(&self) -> Result<(), CollaboratorError>;
}

/// The full set of collaborators a [`HarvestController`](crate::HarvestController) needs.
#[derive(Clone)]
pub struct Collaborators {
    pub initializer: Arc<dyn SessionInitializer>,
    pub login: Arc<dyn LoginStatusProvider>,
    pub qr: Arc<dyn QrArtifactProvider>,
    pub harvester: Arc<dyn GroupHarvester>,
    pub probe: Arc<dyn MemberProbe>,
    pub teardown: Arc<dyn SessionTeardown>,
}

impl Collaborators {
    /// Uses one object for every role.
    pub fn from_source<S>(source: Arc<S>) -> Self
    where
        S: SessionInitializer
            + LoginStatusProvider
            + QrArtifactProvider
            + GroupHarvester
            + MemberProbe
            + SessionTeardown
            + 'static,
    {
        Self {
            initializer: source.clone(),
            login: source.clone(),
            qr: source.clone(),
            harvester: source.clone(),
            probe: source.clone(),
            teardown: source,
        }
    }
}
