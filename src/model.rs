use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel stored in any contact field that was not collected.
pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub phone: String,
    pub group: String,
    pub about: String,
}

impl Contact {
    /// Dedup identity: `(phone, group)`, or `None` when the phone is missing or blank.
    pub fn identity(&self) -> Option<(&str, &str)> {
        if self.phone == NOT_AVAILABLE || self.phone.trim().is_empty() {
            None
        } else {
            Some((self.phone.as_str(), self.group.as_str()))
        }
    }
}

/// Contact fields as handed back by a harvesting collaborator, before filtering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawContact {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub about: Option<String>,
}

impl RawContact {
    /// A record with neither a name nor a phone carries nothing to harvest.
    pub fn is_identifiable(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        present(&self.name) || present(&self.phone)
    }
}

/// Which contact fields to keep; disabled fields become [`NOT_AVAILABLE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestFilters {
    #[serde(default = "default_true")]
    pub include_names: bool,
    #[serde(default = "default_true")]
    pub include_phones: bool,
    #[serde(default)]
    pub include_about: bool,
}

fn default_true() -> bool {
    true
}

impl Default for HarvestFilters {
    fn default() -> Self {
        Self {
            include_names: true,
            include_phones: true,
            include_about: false,
        }
    }
}

impl HarvestFilters {
    /// Normalizes one raw record. `fallback_group` is used when the record
    /// does not name its own group.
    ///
    /// Disabled and uncollected fields become [`NOT_AVAILABLE`]; an enabled
    /// field keeps whatever the collaborator returned, blank included.
    pub fn apply(&self, raw: RawContact, fallback_group: &str) -> Contact {
        fn pick(enabled: bool, value: Option<String>) -> String {
            match value {
                Some(v) if enabled => v,
                _ => NOT_AVAILABLE.to_string(),
            }
        }

        let group = raw
            .group
            .filter(|g| !g.trim().is_empty())
            .unwrap_or_else(|| fallback_group.to_string());

        Contact {
            name: pick(self.include_names, raw.name),
            phone: pick(self.include_phones, raw.phone),
            group,
            about: pick(self.include_about, raw.about),
        }
    }
}

/// Result of one harvesting collaborator call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupHarvest {
    #[serde(default)]
    pub group_label: Option<String>,
    #[serde(default)]
    pub contacts: Vec<RawContact>,
}

/// Contacts harvested from a single target, already filtered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactBatch {
    pub target: String,
    pub group_label: String,
    pub contacts: Vec<Contact>,
}

/// Parameters handed to the session initializer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Locator of the automation driver (a path or an endpoint).
    #[serde(default = "default_driver_locator")]
    pub driver_locator: String,
    #[serde(default)]
    pub only_new_users: bool,
}

fn default_driver_locator() -> String {
    "chromedriver".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            driver_locator: default_driver_locator(),
            only_new_users: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Info,
    Success,
    Error,
    Warning,
}

impl std::fmt::Display for StatusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StatusKind::Info => "info",
            StatusKind::Success => "success",
            StatusKind::Error => "error",
            StatusKind::Warning => "warning",
        };
        f.pad(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub id: u64,
    pub message: String,
    pub kind: StatusKind,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub percent: u8,
    pub processed_targets: usize,
    pub total_targets: usize,
}

/// Human-readable label for a target when the collaborator supplies none:
/// `Group <first 6 chars of the last path segment>`.
pub fn derive_group_label(target: &str) -> String {
    let id: String = target
        .trim()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .chars()
        .take(6)
        .collect();
    if id.is_empty() {
        "Group Unknown".to_string()
    } else {
        format!("Group {}", id)
    }
}

/// Trims every target and drops blank entries, keeping input order.
pub fn normalize_targets<I, S>(targets: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    targets
        .into_iter()
        .map(|t| t.as_ref().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}
