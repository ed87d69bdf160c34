//! Result of a single scan-processing cycle

use crate::domain::types::Examinee;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Outcome of one processing cycle. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanOutcome {
    /// A new attendance record was written
    Success { examinee: Examinee, scanned_at: DateTime<Utc>, session: Option<String> },
    /// The examinee is already recorded for this session
    DuplicateWarning { examinee: Examinee, session: Option<String> },
    /// No visible examinee carries this code (or the payload was blank)
    NotFound { raw_code: String },
    /// Lookup or insert failed for a reason other than a duplicate
    Error { message: String },
}

/// Outcome class, used for resume delays and counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    Duplicate,
    NotFound,
    Error,
}

impl OutcomeKind {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Success => "success",
            OutcomeKind::Duplicate => "duplicate",
            OutcomeKind::NotFound => "not_found",
            OutcomeKind::Error => "error",
        }
    }
}

impl ScanOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            ScanOutcome::Success { .. } => OutcomeKind::Success,
            ScanOutcome::DuplicateWarning { .. } => OutcomeKind::Duplicate,
            ScanOutcome::NotFound { .. } => OutcomeKind::NotFound,
            ScanOutcome::Error { .. } => OutcomeKind::Error,
        }
    }

    /// Examinee the outcome refers to, when one was resolved
    pub fn examinee(&self) -> Option<&Examinee> {
        match self {
            ScanOutcome::Success { examinee, .. } | ScanOutcome::DuplicateWarning { examinee, .. } => {
                Some(examinee)
            }
            ScanOutcome::NotFound { .. } | ScanOutcome::Error { .. } => None,
        }
    }
}
