//! Harvester settings loaded from a TOML file.
//!
//! Every field has a default, so an absent file or a partial file is valid.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{HarvestError, Result};
use crate::harvest::pipeline::BatchTimings;
use crate::model::{HarvestFilters, SessionConfig};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HarvesterSettings {
    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub filters: HarvestFilters,

    #[serde(default)]
    pub timings: TimingSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingSettings {
    /// Seconds between login status polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Give up waiting for the login after this many seconds; unset waits forever
    #[serde(default)]
    pub login_timeout_secs: Option<u64>,

    /// Seconds to pause between consecutive targets
    #[serde(default = "default_target_pause")]
    pub target_pause_secs: u64,

    /// Seconds between new member probes while monitoring
    #[serde(default = "default_monitor_interval")]
    pub monitor_interval_secs: u64,

    /// Per-target harvest timeout in seconds; unset never times out
    #[serde(default)]
    pub harvest_timeout_secs: Option<u64>,

    /// Progress percentage shown while waiting for the login
    #[serde(default = "default_initial_checkpoint")]
    pub initial_checkpoint: u8,

    /// Harvest attempts per target
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_poll_interval() -> u64 {
    5
}

fn default_target_pause() -> u64 {
    2
}

fn default_monitor_interval() -> u64 {
    10
}

fn default_initial_checkpoint() -> u8 {
    10
}

fn default_max_attempts() -> u32 {
    1
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            login_timeout_secs: None,
            target_pause_secs: default_target_pause(),
            monitor_interval_secs: default_monitor_interval(),
            harvest_timeout_secs: None,
            initial_checkpoint: default_initial_checkpoint(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl TimingSettings {
    pub fn batch_timings(&self) -> BatchTimings {
        BatchTimings {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            login_timeout: self.login_timeout_secs.map(Duration::from_secs),
            target_pause: Duration::from_secs(self.target_pause_secs),
            initial_checkpoint: self.initial_checkpoint,
            max_attempts: self.max_attempts,
        }
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }

    pub fn harvest_timeout(&self) -> Option<Duration> {
        self.harvest_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error, off
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl HarvesterSettings {
    /// Loads settings from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found; using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let settings: Self =
            toml::from_str(text).map_err(|e| HarvestError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.timings;
        if t.poll_interval_secs == 0 {
            return Err(HarvestError::Config(
                "timings.poll_interval_secs must be greater than 0".into(),
            ));
        }
        if t.monitor_interval_secs == 0 {
            return Err(HarvestError::Config(
                "timings.monitor_interval_secs must be greater than 0".into(),
            ));
        }
        if t.initial_checkpoint > 40 {
            return Err(HarvestError::Config(
                "timings.initial_checkpoint must not exceed 40".into(),
            ));
        }
        if t.max_attempts == 0 {
            return Err(HarvestError::Config(
                "timings.max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
