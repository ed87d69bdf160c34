//! Shared types for the attendance scanner

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Newtype wrapper for center IDs to provide type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct CenterId(pub i64);

impl std::fmt::Display for CenterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Newtype wrapper for examinee IDs to provide type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ExamineeId(pub i64);

impl std::fmt::Display for ExamineeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Assessment center
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Center {
    pub id: CenterId,
    pub name: String,
    pub location: Option<String>,
}

/// Examinee identity record, owned by the record store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Examinee {
    pub id: ExamineeId,
    /// Opaque QR payload, unique per examinee
    pub attendance_code: String,
    pub full_name: String,
    pub national_id: Option<String>,
    pub center_id: CenterId,
    /// Session the examinee was registered for, if any
    pub exam_session: Option<String>,
}

/// Attendance row as requested by the scan processor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewAttendance {
    pub examinee_id: ExamineeId,
    pub center_id: CenterId,
    pub scanned_by: String,
    pub exam_session: Option<String>,
}

/// Persisted attendance row; `scanned_at` is assigned by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: i64,
    pub examinee_id: ExamineeId,
    pub center_id: CenterId,
    pub scanned_by: String,
    pub exam_session: Option<String>,
    pub scanned_at: DateTime<Utc>,
}

/// Which examinees a lookup may see
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LookupScope {
    Center(CenterId),
    AllCenters,
}

impl LookupScope {
    /// Whether a record belonging to `center_id` is visible in this scope
    pub fn allows(&self, center_id: CenterId) -> bool {
        match self {
            LookupScope::Center(id) => *id == center_id,
            LookupScope::AllCenters => true,
        }
    }
}

/// Signed-in supervisor (or admin) operating a scanner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorContext {
    pub user_id: String,
    pub full_name: String,
    pub center_id: CenterId,
    pub center_name: String,
    #[serde(default)]
    pub is_admin: bool,
}

impl OperatorContext {
    pub fn scope(&self) -> LookupScope {
        if self.is_admin {
            LookupScope::AllCenters
        } else {
            LookupScope::Center(self.center_id)
        }
    }
}

/// Scanner lifecycle as seen by the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScannerState {
    /// Camera released
    Stopped,
    /// Camera held, payloads accepted
    Active,
    /// Camera held, a cycle is in flight or its result is on screen
    Paused,
}

impl ScannerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScannerState::Stopped => "stopped",
            ScannerState::Active => "active",
            ScannerState::Paused => "paused",
        }
    }
}

/// Normalize an optional session label: blank labels mean "no session"
pub fn normalize_session(label: Option<&str>) -> Option<String> {
    label.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Generate a fresh attendance code for a new examinee badge
pub fn new_attendance_code() -> String {
    format!("EX-{}", Uuid::now_v7().simple()).to_uppercase()
}
