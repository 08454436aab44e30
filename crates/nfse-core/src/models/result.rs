//! Outcome of one pipeline run.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::NfseError;

/// Overall status of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineStatus {
    /// Every required field was found.
    Success,

    /// Extraction ran to completion but required fields were not found.
    MissingFields { fields: Vec<String> },

    /// A stage failed; the text holds whatever was assembled before it.
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        page: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        stage: Option<String>,
    },
}

impl PipelineStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineStatus::Success)
    }
}

impl From<&NfseError> for PipelineStatus {
    fn from(err: &NfseError) -> Self {
        PipelineStatus::Error {
            message: err.to_string(),
            page: err.page(),
            stage: err.stage().map(|s| s.to_string()),
        }
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStatus::Success => f.write_str("success"),
            PipelineStatus::MissingFields { fields } => {
                write!(f, "missing required fields: {}", fields.join(", "))
            }
            PipelineStatus::Error { message, .. } => write!(f, "error: {}", message),
        }
    }
}

/// Per-page diagnostics kept alongside the assembled text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageReport {
    /// Page number (1-indexed).
    pub number: usize,
    /// Primary recognition text, before merge and repair.
    pub raw_text: String,
    /// Whether the numeric re-scan ran for this page.
    pub numeric_pass: bool,
    /// Repaired and structured text of this page.
    pub text: String,
}

/// Status plus assembled text of a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub status: PipelineStatus,

    /// Structured text of all processed pages, one blank line between pages.
    pub text: String,

    /// Pages processed before the pipeline finished or stopped.
    pub pages: Vec<PageReport>,

    pub processed_at: DateTime<Utc>,
}

impl PipelineResult {
    pub(crate) fn new(status: PipelineStatus, text: String, pages: Vec<PageReport>) -> Self {
        Self {
            status,
            text,
            pages,
            processed_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Primary recognition text of every processed page, for inspection.
    pub fn raw_text(&self) -> String {
        self.pages
            .iter()
            .map(|p| p.raw_text.trim())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
