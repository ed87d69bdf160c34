//! In-memory record store with the same uniqueness contract as SQLite

use crate::domain::{
    AttendanceRecord, CenterId, Examinee, ExamineeId, LookupScope, NewAttendance,
};
use crate::io::store::{RecordStore, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

#[derive(Default)]
struct MemoryState {
    examinees: Vec<Examinee>,
    attendance: Vec<AttendanceRecord>,
    next_examinee_id: i64,
    next_attendance_id: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an examinee; fails if the attendance code is taken
    pub fn add_examinee(
        &self,
        attendance_code: &str,
        full_name: &str,
        center_id: CenterId,
        exam_session: Option<&str>,
    ) -> Result<Examinee, StoreError> {
        let mut state = self.state.lock();
        if state.examinees.iter().any(|e| e.attendance_code == attendance_code) {
            return Err(StoreError::ConstraintViolation {
                constraint: "examinees.attendance_code".to_string(),
            });
        }
        state.next_examinee_id += 1;
        let examinee = Examinee {
            id: ExamineeId(state.next_examinee_id),
            attendance_code: attendance_code.to_string(),
            full_name: full_name.to_string(),
            national_id: None,
            center_id,
            exam_session: exam_session.map(str::to_string),
        };
        state.examinees.push(examinee.clone());
        Ok(examinee)
    }

    pub fn attendance_count(&self) -> usize {
        self.state.lock().attendance.len()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn find_examinee_by_code(
        &self,
        code: &str,
        scope: &LookupScope,
    ) -> Result<Option<Examinee>, StoreError> {
        let state = self.state.lock();
        Ok(state
            .examinees
            .iter()
            .find(|e| e.attendance_code == code && scope.allows(e.center_id))
            .cloned())
    }

    async fn insert_attendance(
        &self,
        record: NewAttendance,
    ) -> Result<AttendanceRecord, StoreError> {
        let mut state = self.state.lock();
        if !state.examinees.iter().any(|e| e.id == record.examinee_id) {
            return Err(StoreError::Backend(format!(
                "examinee {} does not exist",
                record.examinee_id
            )));
        }

        // Check and insert under one lock, like a unique index would
        let duplicate = state.attendance.iter().any(|r| {
            r.examinee_id == record.examinee_id && r.exam_session == record.exam_session
        });
        if duplicate {
            return Err(StoreError::ConstraintViolation {
                constraint: "attendance_records(examinee_id, exam_session)".to_string(),
            });
        }

        state.next_attendance_id += 1;
        let created = AttendanceRecord {
            id: state.next_attendance_id,
            examinee_id: record.examinee_id,
            center_id: record.center_id,
            scanned_by: record.scanned_by,
            exam_session: record.exam_session,
            scanned_at: Utc::now(),
        };
        state.attendance.push(created.clone());
        Ok(created)
    }

    async fn list_attendance(
        &self,
        scope: &LookupScope,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let state = self.state.lock();
        Ok(state
            .attendance
            .iter()
            .rev()
            .filter(|r| scope.allows(r.center_id))
            .cloned()
            .collect())
    }
}
