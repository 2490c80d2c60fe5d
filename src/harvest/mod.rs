//! Harvest module - session-gated batch harvesting.
//!
//! This module provides the moving parts behind the harvester:
//! - **Session**: pairing handshake state machine via [`SessionGate`]
//! - **Pipeline**: sequential multi-target runs via [`BatchOrchestrator`]
//! - **Monitor**: incremental discovery after a run via [`MonitorLoop`]
//! - **Store**: accumulated contacts via [`ContactStore`]
//! - **Status**: observable event log and progress via [`StatusLog`] and [`ProgressTracker`]
//! - **Formats**: contact export via [`formats::export`]

pub mod cancel;
pub mod formats;
pub mod monitor;
pub mod pipeline;
pub mod session;
pub mod status;
pub mod store;

// Re-export commonly used types
pub use cancel::CancelSignal;
pub use formats::{export, ExportArtifact, ExportFormat};
pub use monitor::MonitorLoop;
pub use pipeline::{
    BatchHandle, BatchOrchestrator, BatchReport, BatchState, BatchStats, BatchTimings,
};
pub use session::{SessionGate, SessionHandle, SessionState};
pub use status::{ProgressTracker, StatusLog};
pub use store::{ContactStore, StoreSummary};
