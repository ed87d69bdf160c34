//! Domain models - core business types and scan outcomes
//!
//! This module contains the canonical data types used throughout the system:
//! - `Examinee` - identity record resolved from a QR payload
//! - `AttendanceRecord` - persisted proof of presence
//! - `OperatorContext` - the signed-in supervisor and their lookup scope
//! - `ScanOutcome` - ephemeral result of one scan cycle
//! - `Presentation` - how an outcome is shown to the operator

pub mod outcome;
pub mod presentation;
pub mod types;

// Re-export commonly used types at module level
pub use outcome::{OutcomeKind, ScanOutcome};
pub use presentation::{Presentation, RecentScanEntry, Tone};
pub use types::{
    AttendanceRecord, Center, CenterId, Examinee, ExamineeId, LookupScope, NewAttendance,
    OperatorContext, ScannerState,
};
