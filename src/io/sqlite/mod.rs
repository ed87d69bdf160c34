//! SQLite record store
//!
//! rusqlite connections are blocking, so every query runs on one dedicated
//! worker thread. Callers submit closures over an mpsc channel and await the
//! reply on a oneshot. Serializing writes this way, together with the unique
//! index on `(examinee_id, IFNULL(exam_session, ''))`, is what makes the
//! duplicate check atomic.

mod migrations;

use crate::domain::{
    AttendanceRecord, Center, CenterId, Examinee, ExamineeId, LookupScope, NewAttendance,
    OperatorContext,
};
use crate::domain::types::normalize_session;
use crate::io::store::{RecordStore, StoreError};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use migrations::run_migrations;
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use tokio::sync::oneshot;
use tracing::{error, info};

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct StoreInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.lock().take() {
            if let Err(e) = self.sender.send(DbCommand::Shutdown) {
                error!(error = %e, "db_shutdown_send_failed");
            }
            if handle.join().is_err() {
                error!("db_thread_join_failed");
            }
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(code, message) = &err {
            let unique = code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY;
            if unique {
                return StoreError::ConstraintViolation {
                    constraint: message.clone().unwrap_or_else(|| "unique".to_string()),
                };
            }
            if matches!(
                code.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::CannotOpen
            ) {
                return StoreError::Unavailable(err.to_string());
            }
        }
        StoreError::Backend(err.to_string())
    }
}

fn to_rfc3339(ts: &DateTime<Utc>) -> String {
    // Fixed precision keeps lexical order equal to time order
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Backend(format!("invalid datetime '{value}': {e}")))
}

fn scope_center(scope: &LookupScope) -> Option<i64> {
    match scope {
        LookupScope::Center(id) => Some(id.0),
        LookupScope::AllCenters => None,
    }
}

fn row_to_examinee(row: &Row) -> rusqlite::Result<Examinee> {
    Ok(Examinee {
        id: ExamineeId(row.get("id")?),
        attendance_code: row.get("attendance_code")?,
        full_name: row.get("full_name")?,
        national_id: row.get("national_id")?,
        center_id: CenterId(row.get("center_id")?),
        exam_session: row.get("exam_session")?,
    })
}

/// Attendance row before its timestamp is parsed
struct RawAttendance {
    id: i64,
    examinee_id: i64,
    center_id: i64,
    scanned_by: String,
    exam_session: Option<String>,
    scanned_at: String,
}

impl RawAttendance {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            examinee_id: row.get("examinee_id")?,
            center_id: row.get("center_id")?,
            scanned_by: row.get("scanned_by")?,
            exam_session: row.get("exam_session")?,
            scanned_at: row.get("scanned_at")?,
        })
    }

    fn into_record(self) -> Result<AttendanceRecord, StoreError> {
        Ok(AttendanceRecord {
            id: self.id,
            examinee_id: ExamineeId(self.examinee_id),
            center_id: CenterId(self.center_id),
            scanned_by: self.scanned_by,
            exam_session: self.exam_session,
            scanned_at: parse_datetime(&self.scanned_at)?,
        })
    }
}

#[derive(Clone)]
pub struct SqliteStore {
    inner: Arc<StoreInner>,
    location: Arc<PathBuf>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and run migrations
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let open_path = path.clone();
        Self::spawn(path, move || Connection::open(open_path))
    }

    /// Private in-memory database, mostly for tests
    pub fn open_in_memory() -> anyhow::Result<Self> {
        Self::spawn(PathBuf::from(":memory:"), Connection::open_in_memory)
    }

    fn spawn<F>(location: PathBuf, opener: F) -> anyhow::Result<Self>
    where
        F: FnOnce() -> rusqlite::Result<Connection> + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel::<anyhow::Result<()>>();

        let worker = thread::Builder::new()
            .name("attendance-db".into())
            .spawn(move || {
                let mut conn = match opener() {
                    Ok(conn) => conn,
                    Err(e) => {
                        let _ = ready_tx
                            .send(Err(anyhow::Error::new(e).context("failed to open SQLite database")));
                        return;
                    }
                };

                if let Err(e) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!(error = %e, "db_wal_enable_failed");
                }
                if let Err(e) = conn.pragma_update(None, "foreign_keys", "ON") {
                    error!(error = %e, "db_foreign_keys_enable_failed");
                }

                let init = run_migrations(&mut conn).context("failed to run database migrations");
                if ready_tx.send(init).is_err() {
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => task(&mut conn),
                        DbCommand::Shutdown => break,
                    }
                }
                info!("db_thread_stopped");
            })
            .context("failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before signaling readiness")??;

        info!(path = %location.display(), "record_store_opened");

        Ok(Self {
            inner: Arc::new(StoreInner { sender: command_tx, worker: Mutex::new(Some(worker)) }),
            location: Arc::new(location),
        })
    }

    pub fn path(&self) -> &Path {
        self.location.as_path()
    }

    /// Run `task` on the worker thread and await its result
    pub async fn execute<F, T>(&self, task: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let command = DbCommand::Execute(Box::new(move |conn| {
            // Caller may have gone away; nothing to report to
            let _ = reply_tx.send(task(conn));
        }));

        self.inner
            .sender
            .send(command)
            .map_err(|_| StoreError::Unavailable("database thread is not running".to_string()))?;

        reply_rx
            .await
            .map_err(|_| StoreError::Unavailable("database thread terminated".to_string()))?
    }

    pub async fn insert_center(
        &self,
        name: &str,
        location: Option<&str>,
    ) -> Result<Center, StoreError> {
        let name = name.trim().to_string();
        let location = location.map(str::to_string);
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO centers (name, location, created_at) VALUES (?1, ?2, ?3)",
                params![name, location, to_rfc3339(&Utc::now())],
            )?;
            Ok(Center { id: CenterId(conn.last_insert_rowid()), name, location })
        })
        .await
    }

    pub async fn insert_supervisor(
        &self,
        user_id: &str,
        full_name: &str,
        center_id: CenterId,
        is_admin: bool,
    ) -> Result<(), StoreError> {
        let user_id = user_id.trim().to_string();
        let full_name = full_name.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO supervisors (user_id, full_name, center_id, is_admin, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![user_id, full_name, center_id.0, is_admin, to_rfc3339(&Utc::now())],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn insert_examinee(
        &self,
        attendance_code: &str,
        full_name: &str,
        national_id: Option<&str>,
        center_id: CenterId,
        exam_session: Option<&str>,
    ) -> Result<Examinee, StoreError> {
        let examinee = Examinee {
            id: ExamineeId(0),
            attendance_code: attendance_code.trim().to_string(),
            full_name: full_name.to_string(),
            national_id: national_id.map(str::to_string),
            center_id,
            exam_session: normalize_session(exam_session),
        };
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO examinees
                    (attendance_code, full_name, national_id, center_id, exam_session, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    examinee.attendance_code,
                    examinee.full_name,
                    examinee.national_id,
                    examinee.center_id.0,
                    examinee.exam_session,
                    to_rfc3339(&Utc::now()),
                ],
            )?;
            Ok(Examinee { id: ExamineeId(conn.last_insert_rowid()), ..examinee })
        })
        .await
    }

    /// Supervisor profile joined with its center, as used on sign-in
    pub async fn load_operator(&self, user_id: &str) -> Result<Option<OperatorContext>, StoreError> {
        let user_id = user_id.trim().to_string();
        self.execute(move |conn| {
            let operator = conn
                .query_row(
                    "SELECT s.user_id, s.full_name, s.center_id, s.is_admin, c.name AS center_name
                     FROM supervisors s
                     JOIN centers c ON c.id = s.center_id
                     WHERE s.user_id = ?1",
                    params![user_id],
                    |row| {
                        Ok(OperatorContext {
                            user_id: row.get("user_id")?,
                            full_name: row.get("full_name")?,
                            center_id: CenterId(row.get("center_id")?),
                            center_name: row.get("center_name")?,
                            is_admin: row.get("is_admin")?,
                        })
                    },
                )
                .optional()?;
            Ok(operator)
        })
        .await
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn find_examinee_by_code(
        &self,
        code: &str,
        scope: &LookupScope,
    ) -> Result<Option<Examinee>, StoreError> {
        let code = code.to_string();
        let center = scope_center(scope);
        self.execute(move |conn| {
            let examinee = conn
                .query_row(
                    "SELECT id, attendance_code, full_name, national_id, center_id, exam_session
                     FROM examinees
                     WHERE attendance_code = ?1 AND (?2 IS NULL OR center_id = ?2)",
                    params![code, center],
                    row_to_examinee,
                )
                .optional()?;
            Ok(examinee)
        })
        .await
    }

    async fn insert_attendance(
        &self,
        record: NewAttendance,
    ) -> Result<AttendanceRecord, StoreError> {
        self.execute(move |conn| {
            let scanned_at = Utc::now();
            conn.execute(
                "INSERT INTO attendance_records
                    (examinee_id, center_id, scanned_by, exam_session, scanned_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.examinee_id.0,
                    record.center_id.0,
                    record.scanned_by,
                    record.exam_session,
                    to_rfc3339(&scanned_at),
                ],
            )?;

            Ok(AttendanceRecord {
                id: conn.last_insert_rowid(),
                examinee_id: record.examinee_id,
                center_id: record.center_id,
                scanned_by: record.scanned_by,
                exam_session: record.exam_session,
                scanned_at,
            })
        })
        .await
    }

    async fn list_attendance(
        &self,
        scope: &LookupScope,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let center = scope_center(scope);
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, examinee_id, center_id, scanned_by, exam_session, scanned_at
                 FROM attendance_records
                 WHERE ?1 IS NULL OR center_id = ?1
                 ORDER BY scanned_at DESC, id DESC",
            )?;
            let rows = stmt.query_map(params![center], RawAttendance::from_row)?;

            let mut records = Vec::new();
            for row in rows {
                records.push(row?.into_record()?);
            }
            Ok(records)
        })
        .await
    }
}
