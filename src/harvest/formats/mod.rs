//! Export formats for harvested contacts.
//!
//! - `csv` - header row plus one fully quoted row per contact
//! - `json` - pretty-printed array of contact objects
//! - `excel` - CSV body served as a legacy `.xls` download

mod csv;

use serde::Serialize;
use std::str::FromStr;

use crate::error::{HarvestError, Result};
use crate::model::Contact;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Json,
    Excel,
}

impl ExportFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv",
            ExportFormat::Json => "application/json",
            ExportFormat::Excel => "application/vnd.ms-excel",
        }
    }

    pub fn filename(self) -> &'static str {
        match self {
            ExportFormat::Csv => "contacts.csv",
            ExportFormat::Json => "contacts.json",
            ExportFormat::Excel => "contacts.xls",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            "excel" | "xls" => Ok(ExportFormat::Excel),
            other => Err(HarvestError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Encoded export ready to be written or served.
#[derive(Debug, Clone)]
pub struct ExportArtifact {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub filename: &'static str,
}

/// Encodes `contacts` in the named format.
///
/// # Errors
///
/// Returns [`HarvestError::UnsupportedFormat`] for an unknown format name.
pub fn export(format: &str, contacts: &[Contact]) -> Result<ExportArtifact> {
    let format: ExportFormat = format.parse()?;
    export_as(format, contacts)
}

pub fn export_as(format: ExportFormat, contacts: &[Contact]) -> Result<ExportArtifact> {
    let bytes = match format {
        ExportFormat::Csv | ExportFormat::Excel => csv::encode(contacts).into_bytes(),
        ExportFormat::Json => serde_json::to_vec_pretty(contacts)?,
    };
    Ok(ExportArtifact {
        bytes,
        content_type: format.content_type(),
        filename: format.filename(),
    })
}
