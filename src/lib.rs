pub mod config;
pub mod controller;
pub mod error;
pub mod executor;
pub mod harvest;
pub mod logging;
pub mod model;
pub mod replay;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

// Re-export common types for convenience
pub use config::HarvesterSettings;
pub use controller::HarvestController;
pub use error::{HarvestError, Result};
pub use executor::*;
pub use model::*;
pub use traits::*;
