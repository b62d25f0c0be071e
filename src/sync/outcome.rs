use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::fetch::FetchError;
use crate::manifest::ParseError;
use crate::types::{RunStatus, SyncRun, ValidationError};

/// Pipeline stages of a single-file sync, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetching,
    Parsing,
    Validating,
    Resolving,
    Upserting,
    DetectingOrphans,
    Recording,
}

impl Stage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fetching => "fetching",
            Self::Parsing => "parsing",
            Self::Validating => "validating",
            Self::Resolving => "resolving",
            Self::Upserting => "upserting",
            Self::DetectingOrphans => "detecting_orphans",
            Self::Recording => "recording",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a file's sync stopped. Every variant except `Persistence` is raised
/// before the catalog is written.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SyncFailure {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("{0}")]
    Parse(#[from] ParseError),

    #[error("validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("owner \"{reference}\" at {field} does not match any team")]
    Resolution { field: String, reference: String },

    /// A catalog or team read failed while checking the document.
    #[error("catalog lookup failed: {0}")]
    Lookup(String),

    #[error("persistence failed, changes for this file were rolled back: {0}")]
    Persistence(String),

    #[error("timed out after {}s while loading the manifest", .0.as_secs_f64())]
    Timeout(Duration),
}

impl SyncFailure {
    /// Stage at which this failure stopped the pipeline.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Fetch(_) | Self::Timeout(_) => Stage::Fetching,
            Self::Parse(_) => Stage::Parsing,
            Self::Validation(_) => Stage::Validating,
            Self::Resolution { .. } | Self::Lookup(_) => Stage::Resolving,
            Self::Persistence(_) => Stage::Upserting,
        }
    }

    /// Field-scoped errors suitable for per-field rendering.
    pub fn field_errors(&self) -> Vec<ValidationError> {
        match self {
            Self::Validation(errors) => errors.clone(),
            Self::Resolution { field, reference } => vec![ValidationError::new(
                field.clone(),
                format!("no team matches \"{reference}\""),
            )],
            _ => Vec::new(),
        }
    }

    /// True when rows may have been written before the failure.
    pub fn touched_catalog(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }
}

impl SyncFailure {
    pub(crate) fn lookup(err: crate::error::Error) -> Self {
        SyncFailure::Lookup(err.to_string())
    }
}

/// Store errors reached through `?` come from the write path.
impl From<crate::error::Error> for SyncFailure {
    fn from(err: crate::error::Error) -> Self {
        SyncFailure::Persistence(err.to_string())
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result of a whole-catalog sync.
#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub succeeded: usize,
    pub failed: usize,
    pub runs: Vec<SyncRun>,
    /// Files that were synced but whose run history write failed. Counted as failed.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unrecorded: Vec<UnrecordedRun>,
    /// Auto-synced projects whose manifest no longer exists. Reported, never changed.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_sources: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnrecordedRun {
    pub path: String,
    pub error: String,
}

impl SyncSummary {
    pub(crate) fn from_runs(
        started_at: DateTime<Utc>,
        runs: Vec<SyncRun>,
        unrecorded: Vec<UnrecordedRun>,
        missing_sources: Vec<String>,
    ) -> Self {
        let succeeded = runs
            .iter()
            .filter(|r| r.status == RunStatus::Success)
            .count();
        let failed = runs.len() - succeeded + unrecorded.len();
        let status = match (succeeded, failed) {
            (_, 0) => RunStatus::Success,
            (0, _) => RunStatus::Failed,
            _ => RunStatus::Partial,
        };

        Self {
            status,
            started_at,
            completed_at: Utc::now().max(started_at),
            succeeded,
            failed,
            runs,
            unrecorded,
            missing_sources,
            scan_error: None,
        }
    }

    pub(crate) fn scan_failed(started_at: DateTime<Utc>, error: String) -> Self {
        Self {
            status: RunStatus::Failed,
            started_at,
            completed_at: Utc::now().max(started_at),
            succeeded: 0,
            failed: 0,
            runs: Vec::new(),
            unrecorded: Vec::new(),
            missing_sources: Vec::new(),
            scan_error: Some(error),
        }
    }
}
