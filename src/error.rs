use crate::traits::CollaboratorError;
use thiserror::Error;

/// Failures surfaced by the harvester.
///
/// Session-level variants abort a whole batch; `TargetProcessing` and
/// `MonitorProbe` are recoverable and only ever produce a status event.
#[derive(Error, Debug)]
pub enum HarvestError {
    /// The session initializer failed; no target is attempted.
    #[error("Session initialization failed: {0}")]
    SessionInit(#[source] CollaboratorError),

    /// The caller-configured login window elapsed.
    #[error("Login not completed within {waited_secs}s")]
    LoginTimeout { waited_secs: u64 },

    /// The login status provider could not be queried.
    #[error("Login status check failed: {0}")]
    LoginPoll(#[source] CollaboratorError),

    /// The QR artifact provider could not supply a pairing artifact.
    #[error("Failed to fetch QR code: {0}")]
    QrFetch(#[source] CollaboratorError),

    /// One target could not be harvested.
    #[error("Failed to process target '{target}': {cause}")]
    TargetProcessing {
        target: String,
        #[source]
        cause: CollaboratorError,
    },

    #[error("Unsupported export format: {0}")]
    UnsupportedFormat(String),

    /// A monitoring tick failed; the loop keeps running.
    #[error("New member probe failed: {0}")]
    MonitorProbe(#[source] CollaboratorError),

    /// The teardown collaborator failed to close the automation session.
    #[error("Failed to close automation session: {0}")]
    Teardown(#[source] CollaboratorError),

    #[error("No valid group targets provided")]
    EmptyTargets,

    /// The operation is not allowed in the current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HarvestError>;
