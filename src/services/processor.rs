//! Scan processor - one decoded payload in, one classified outcome out
//!
//! Resolves the payload against the record store, writes at most one
//! attendance record, and classifies the result. Duplicate detection relies
//! entirely on the store's uniqueness constraint; there is no pre-check, so
//! concurrent scans of the same badge from several devices race safely.

use crate::domain::types::normalize_session;
use crate::domain::{NewAttendance, OperatorContext, ScanOutcome};
use crate::io::store::RecordStore;
use std::sync::Arc;
use tracing::{info, warn};

pub struct ScanProcessor<S: RecordStore> {
    store: Arc<S>,
}

impl<S: RecordStore> Clone for ScanProcessor<S> {
    fn clone(&self) -> Self {
        Self { store: self.store.clone() }
    }
}

impl<S: RecordStore> ScanProcessor<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Process one payload on behalf of `operator`
    ///
    /// `declared_session` is the operator's session input; when blank the
    /// examinee's registered session is used instead.
    pub async fn process(
        &self,
        raw_payload: &str,
        operator: &OperatorContext,
        declared_session: Option<&str>,
    ) -> ScanOutcome {
        let code = raw_payload.trim();
        if code.is_empty() {
            return ScanOutcome::NotFound { raw_code: raw_payload.to_string() };
        }

        let examinee = match self.store.find_examinee_by_code(code, &operator.scope()).await {
            Ok(Some(examinee)) => examinee,
            Ok(None) => {
                info!(code = %code, operator = %operator.user_id, "scan_not_found");
                return ScanOutcome::NotFound { raw_code: raw_payload.to_string() };
            }
            Err(e) => {
                warn!(code = %code, error = %e, "examinee_lookup_failed");
                return ScanOutcome::Error { message: e.to_string() };
            }
        };

        let session = normalize_session(declared_session)
            .or_else(|| normalize_session(examinee.exam_session.as_deref()));

        let record = NewAttendance {
            examinee_id: examinee.id,
            center_id: examinee.center_id,
            scanned_by: operator.user_id.clone(),
            exam_session: session.clone(),
        };

        match self.store.insert_attendance(record).await {
            Ok(created) => {
                info!(
                    examinee = %examinee.id,
                    center = %examinee.center_id,
                    session = session.as_deref().unwrap_or("-"),
                    record = %created.id,
                    "scan_processed"
                );
                ScanOutcome::Success { examinee, scanned_at: created.scanned_at, session }
            }
            Err(e) if e.is_constraint_violation() => {
                info!(
                    examinee = %examinee.id,
                    session = session.as_deref().unwrap_or("-"),
                    "scan_duplicate"
                );
                ScanOutcome::DuplicateWarning { examinee, session }
            }
            Err(e) => {
                warn!(examinee = %examinee.id, error = %e, "attendance_insert_failed");
                ScanOutcome::Error { message: e.to_string() }
            }
        }
    }
}
