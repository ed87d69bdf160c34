//! Record store boundary consumed by the scan pipeline
//!
//! Adapters must report uniqueness violations as
//! `StoreError::ConstraintViolation` and nothing else; duplicate detection
//! in the processor depends on that distinction.

use crate::domain::{AttendanceRecord, Examinee, LookupScope, NewAttendance};
use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Write would break a uniqueness rule
    ConstraintViolation { constraint: String },
    /// Store could not be reached or did not answer
    Unavailable(String),
    /// Any other failure: permissions, schema, malformed data
    Backend(String),
}

impl StoreError {
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, StoreError::ConstraintViolation { .. })
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::ConstraintViolation { constraint } => {
                write!(f, "constraint violation: {}", constraint)
            }
            StoreError::Unavailable(reason) => write!(f, "record store unavailable: {}", reason),
            StoreError::Backend(reason) => write!(f, "{}", reason),
        }
    }
}

impl std::error::Error for StoreError {}

#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    /// Exactly-equal lookup of an attendance code, limited to `scope`
    async fn find_examinee_by_code(
        &self,
        code: &str,
        scope: &LookupScope,
    ) -> Result<Option<Examinee>, StoreError>;

    /// Insert one attendance row; the store assigns `id` and `scanned_at`
    async fn insert_attendance(
        &self,
        record: NewAttendance,
    ) -> Result<AttendanceRecord, StoreError>;

    /// Attendance visible in `scope`, newest first
    async fn list_attendance(&self, scope: &LookupScope)
        -> Result<Vec<AttendanceRecord>, StoreError>;
}
