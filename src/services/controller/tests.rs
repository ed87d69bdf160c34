//! Tests for the SessionController module

use super::*;
use crate::domain::{AttendanceRecord, CenterId, Examinee, LookupScope, NewAttendance, OutcomeKind};
use crate::infra::config::ResumeDelays;
use crate::io::camera::{CameraConstraints, CameraError, ChannelCamera, DecodeStream};
use crate::io::feedback::create_feedback_channel;
use crate::io::memory::MemoryStore;
use crate::io::store::StoreError;
use async_trait::async_trait;
use tokio::time::{timeout, Duration, Instant};

fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

fn supervisor() -> OperatorContext {
    OperatorContext {
        user_id: "sup-1".to_string(),
        full_name: "Supervisor One".to_string(),
        center_id: CenterId(1),
        center_name: "North Hall".to_string(),
        is_admin: false,
    }
}

/// Memory store whose inserts take a while, to keep a cycle in flight
struct SlowStore {
    inner: MemoryStore,
    insert_delay: Duration,
}

#[async_trait]
impl RecordStore for SlowStore {
    async fn find_examinee_by_code(
        &self,
        code: &str,
        scope: &LookupScope,
    ) -> Result<Option<Examinee>, StoreError> {
        self.inner.find_examinee_by_code(code, scope).await
    }

    async fn insert_attendance(
        &self,
        record: NewAttendance,
    ) -> Result<AttendanceRecord, StoreError> {
        tokio::time::sleep(self.insert_delay).await;
        self.inner.insert_attendance(record).await
    }

    async fn list_attendance(
        &self,
        scope: &LookupScope,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        self.inner.list_attendance(scope).await
    }
}

/// Test harness that keeps the command sender and feedback receiver alive
struct Harness<S: RecordStore> {
    controller: SessionController<S, ChannelCamera>,
    commands_tx: mpsc::Sender<ScannerCommand>,
    commands_rx: mpsc::Receiver<ScannerCommand>,
    feed: mpsc::Sender<String>,
    feedback_rx: mpsc::Receiver<FeedbackMessage>,
    store: Arc<S>,
    metrics: Arc<Metrics>,
}

impl<S: RecordStore> Harness<S> {
    fn new(store: Arc<S>, delays: ResumeDelays) -> Self {
        let config = Config::default().with_resume_delays(delays);
        let metrics = Arc::new(Metrics::new());
        let (feedback, feedback_rx) = create_feedback_channel(256, metrics.clone());
        let (feed, camera) = ChannelCamera::channel(16);
        let controller = SessionController::new(
            ScanProcessor::new(store.clone()),
            camera,
            &config,
            feedback,
            metrics.clone(),
        );
        let (commands_tx, commands_rx) = mpsc::channel(8);
        Self { controller, commands_tx, commands_rx, feed, feedback_rx, store, metrics }
    }

    async fn command(&mut self, command: ScannerCommand) {
        assert!(self.controller.handle_command(command).await);
    }

    async fn scan(&self, code: &str) {
        self.feed.send(code.to_string()).await.unwrap();
    }

    /// Step the loop until `done` holds, failing after two seconds
    async fn step_until(&mut self, done: impl Fn(&Self) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !done(self) {
            assert!(Instant::now() < deadline, "condition not reached in time");
            let _ = timeout(millis(20), self.controller.step(&mut self.commands_rx)).await;
        }
    }

    /// Step the loop for `period`, handling whatever arrives
    async fn settle(&mut self, period: Duration) {
        let deadline = Instant::now() + period;
        while Instant::now() < deadline {
            let _ = timeout(millis(20), self.controller.step(&mut self.commands_rx)).await;
        }
    }

    fn drain_feedback(&mut self) -> Vec<FeedbackMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = self.feedback_rx.try_recv() {
            messages.push(message);
        }
        messages
    }
}

fn seeded_memory_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.add_examinee("EX-10293", "A. Musa", CenterId(1), Some("Morning")).unwrap();
    store
}

async fn signed_in_and_started<S: RecordStore>(store: Arc<S>, delays: ResumeDelays) -> Harness<S> {
    let mut h = Harness::new(store, delays);
    h.command(ScannerCommand::SignIn(supervisor())).await;
    h.command(ScannerCommand::Start).await;
    assert_eq!(h.controller.state(), ScannerState::Active);
    h
}

#[tokio::test]
async fn test_start_requires_sign_in() {
    let mut h = Harness::new(seeded_memory_store(), ResumeDelays::uniform(millis(50)));

    h.command(ScannerCommand::Start).await;
    assert_eq!(h.controller.state(), ScannerState::Stopped);

    let feedback = h.drain_feedback();
    assert!(feedback.iter().any(|m| matches!(m, FeedbackMessage::Notice(text) if text.contains("Sign in"))));
}

#[tokio::test]
async fn test_success_cycle_pauses_presents_and_resumes() {
    let mut h = signed_in_and_started(seeded_memory_store(), ResumeDelays::uniform(millis(50))).await;

    h.scan("EX-10293").await;
    h.step_until(|h| h.controller.state() == ScannerState::Paused).await;
    h.step_until(|h| h.metrics.scans_total() == 1).await;

    assert_eq!(h.metrics.outcome_total(OutcomeKind::Success), 1);
    assert_eq!(h.store.attendance_count(), 1);
    let recent = h.controller.recent_scans();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].name, "A. Musa");
    assert_eq!(recent[0].session.as_deref(), Some("Morning"));

    h.step_until(|h| h.controller.state() == ScannerState::Active).await;

    let feedback = h.drain_feedback();
    assert!(feedback.contains(&FeedbackMessage::Processing));
    assert!(feedback.iter().any(|m| matches!(
        m,
        FeedbackMessage::Outcome(p) if p.title == "Attendance Registered"
    )));
}

#[tokio::test]
async fn test_rescan_after_resume_is_duplicate() {
    let mut h = signed_in_and_started(seeded_memory_store(), ResumeDelays::uniform(millis(30))).await;

    h.scan("EX-10293").await;
    h.step_until(|h| h.metrics.scans_total() == 1).await;
    h.step_until(|h| h.controller.state() == ScannerState::Active).await;

    h.scan("EX-10293").await;
    h.step_until(|h| h.metrics.scans_total() == 2).await;

    assert_eq!(h.metrics.outcome_total(OutcomeKind::Duplicate), 1);
    assert_eq!(h.store.attendance_count(), 1);
    // Duplicates never enter the recent log
    assert_eq!(h.controller.recent_scans().len(), 1);
}

#[tokio::test]
async fn test_decodes_while_paused_never_reach_processor() {
    // Long resume delay keeps the scanner paused for the whole test
    let mut h = signed_in_and_started(seeded_memory_store(), ResumeDelays::uniform(millis(10_000))).await;

    h.scan("EX-10293").await;
    h.step_until(|h| h.controller.state() == ScannerState::Paused).await;
    h.scan("EX-10293").await;
    h.scan("UNKNOWN-999").await;

    h.step_until(|h| h.metrics.scans_total() == 1 && h.metrics.decodes_ignored() == 2).await;
    h.settle(millis(100)).await;

    assert_eq!(h.metrics.scans_total(), 1);
    assert_eq!(h.metrics.outcome_total(OutcomeKind::NotFound), 0);
    assert_eq!(h.controller.state(), ScannerState::Paused);
}

#[tokio::test]
async fn test_decodes_while_stopped_are_ignored() {
    let mut h = signed_in_and_started(seeded_memory_store(), ResumeDelays::uniform(millis(50))).await;
    h.command(ScannerCommand::Stop(StopReason::Operator)).await;
    assert_eq!(h.controller.state(), ScannerState::Stopped);

    // Camera is released, so nothing reads the feed
    h.scan("EX-10293").await;
    h.settle(millis(100)).await;

    assert_eq!(h.metrics.scans_total(), 0);
    assert_eq!(h.store.attendance_count(), 0);

    // Restarting must not replay what was scanned while stopped
    h.command(ScannerCommand::Start).await;
    assert_eq!(h.controller.state(), ScannerState::Active);
    h.settle(millis(300)).await;

    assert_eq!(h.metrics.scans_total(), 0);
    assert_eq!(h.store.attendance_count(), 0);
    assert_eq!(h.controller.state(), ScannerState::Active);

    h.scan("EX-10293").await;
    h.step_until(|h| h.metrics.scans_total() == 1).await;
    assert_eq!(h.store.attendance_count(), 1);
}

#[tokio::test]
async fn test_result_after_stop_is_discarded() {
    let inner = MemoryStore::new();
    inner.add_examinee("EX-10293", "A. Musa", CenterId(1), Some("Morning")).unwrap();
    let store = Arc::new(SlowStore { inner, insert_delay: millis(100) });
    let mut h = signed_in_and_started(store, ResumeDelays::uniform(millis(50))).await;

    h.scan("EX-10293").await;
    h.step_until(|h| h.controller.state() == ScannerState::Paused).await;
    h.command(ScannerCommand::Stop(StopReason::LeftScanView)).await;
    assert_eq!(h.controller.state(), ScannerState::Stopped);

    h.step_until(|h| h.metrics.results_discarded() == 1).await;

    // The in-flight store call is not aborted, but its result is never shown
    assert_eq!(h.metrics.scans_total(), 0);
    assert!(h.controller.recent_scans().is_empty());
    assert_eq!(h.controller.state(), ScannerState::Stopped);
    let feedback = h.drain_feedback();
    assert!(!feedback.iter().any(|m| matches!(m, FeedbackMessage::Outcome(_))));
}

#[tokio::test]
async fn test_stale_result_after_restart_is_discarded() {
    let inner = MemoryStore::new();
    inner.add_examinee("EX-10293", "A. Musa", CenterId(1), None).unwrap();
    let store = Arc::new(SlowStore { inner, insert_delay: millis(100) });
    let mut h = signed_in_and_started(store, ResumeDelays::uniform(millis(50))).await;

    h.scan("EX-10293").await;
    h.step_until(|h| h.controller.state() == ScannerState::Paused).await;
    h.command(ScannerCommand::Stop(StopReason::Operator)).await;
    h.command(ScannerCommand::Start).await;
    assert_eq!(h.controller.state(), ScannerState::Active);

    h.step_until(|h| h.metrics.results_discarded() == 1).await;
    assert_eq!(h.controller.state(), ScannerState::Active);
    assert!(h.controller.recent_scans().is_empty());
}

#[tokio::test]
async fn test_stop_cancels_pending_resume() {
    let mut h = signed_in_and_started(seeded_memory_store(), ResumeDelays::uniform(millis(80))).await;

    h.scan("EX-10293").await;
    h.step_until(|h| h.metrics.scans_total() == 1).await;
    assert_eq!(h.controller.state(), ScannerState::Paused);

    h.command(ScannerCommand::Stop(StopReason::Operator)).await;
    h.settle(millis(200)).await;

    assert_eq!(h.controller.state(), ScannerState::Stopped);
}

#[tokio::test]
async fn test_sign_out_stops_and_resets_recent_log() {
    let mut h = signed_in_and_started(seeded_memory_store(), ResumeDelays::uniform(millis(30))).await;

    h.scan("EX-10293").await;
    h.step_until(|h| h.controller.recent_scans().len() == 1).await;

    h.command(ScannerCommand::SignOut).await;
    assert_eq!(h.controller.state(), ScannerState::Stopped);
    assert!(h.controller.operator().is_none());
    assert!(h.controller.recent_scans().is_empty());

    h.command(ScannerCommand::SignIn(supervisor())).await;
    assert!(h.controller.recent_scans().is_empty());
}

#[tokio::test]
async fn test_exam_session_input_is_used_for_new_scans() {
    let mut h = signed_in_and_started(seeded_memory_store(), ResumeDelays::uniform(millis(30))).await;
    h.command(ScannerCommand::SetExamSession(Some("Evening".to_string()))).await;

    h.scan("EX-10293").await;
    h.step_until(|h| h.metrics.scans_total() == 1).await;

    let records = h.store.list_attendance(&LookupScope::AllCenters).await.unwrap();
    assert_eq!(records[0].exam_session.as_deref(), Some("Evening"));
}

#[tokio::test]
async fn test_shutdown_ends_the_loop() {
    let mut h = signed_in_and_started(seeded_memory_store(), ResumeDelays::uniform(millis(30))).await;

    h.commands_tx.send(ScannerCommand::Shutdown).await.unwrap();
    let running = timeout(Duration::from_secs(1), h.controller.step(&mut h.commands_rx))
        .await
        .unwrap();

    assert!(!running);
    assert_eq!(h.controller.state(), ScannerState::Stopped);
}

struct DeniedCamera;

#[async_trait]
impl CameraProvider for DeniedCamera {
    async fn acquire(
        &self,
        _constraints: &CameraConstraints,
    ) -> Result<Box<dyn DecodeStream>, CameraError> {
        Err(CameraError::PermissionDenied)
    }
}

#[tokio::test]
async fn test_camera_error_leaves_scanner_stopped() {
    let metrics = Arc::new(Metrics::new());
    let (feedback, mut feedback_rx) = create_feedback_channel(16, metrics.clone());
    let mut controller = SessionController::new(
        ScanProcessor::new(seeded_memory_store()),
        DeniedCamera,
        &Config::default(),
        feedback,
        metrics.clone(),
    );

    controller.handle_command(ScannerCommand::SignIn(supervisor())).await;
    controller.handle_command(ScannerCommand::Start).await;

    assert_eq!(controller.state(), ScannerState::Stopped);
    assert_eq!(metrics.camera_errors(), 1);

    let mut saw_camera_error = false;
    while let Ok(message) = feedback_rx.try_recv() {
        if let FeedbackMessage::CameraError(text) = message {
            assert_eq!(text, "camera permission denied");
            saw_camera_error = true;
        }
    }
    assert!(saw_camera_error);
}

#[tokio::test]
async fn test_camera_stream_end_stops_scanner() {
    let metrics = Arc::new(Metrics::new());
    let (feedback, mut feedback_rx) = create_feedback_channel(16, metrics.clone());
    let (feed, camera) = ChannelCamera::channel(4);
    let mut controller = SessionController::new(
        ScanProcessor::new(seeded_memory_store()),
        camera.clone(),
        &Config::default(),
        feedback,
        metrics.clone(),
    );
    let (_commands_tx, mut commands_rx) = mpsc::channel(4);

    controller.handle_command(ScannerCommand::SignIn(supervisor())).await;
    controller.handle_command(ScannerCommand::Start).await;
    assert_eq!(controller.state(), ScannerState::Active);

    drop(feed);
    let deadline = Instant::now() + Duration::from_secs(2);
    while controller.state() != ScannerState::Stopped {
        assert!(Instant::now() < deadline, "scanner never stopped");
        let _ = timeout(millis(20), controller.step(&mut commands_rx)).await;
    }

    assert_eq!(metrics.camera_errors(), 1);
    // Camera was released and can be acquired again
    assert!(camera.acquire(&CameraConstraints::default()).await.is_ok());

    let mut saw_camera_error = false;
    while let Ok(message) = feedback_rx.try_recv() {
        if matches!(message, FeedbackMessage::CameraError(_)) {
            saw_camera_error = true;
        }
    }
    assert!(saw_camera_error);
}
