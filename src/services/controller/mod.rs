//! Session controller - scanner lifecycle and scan-cycle orchestration
//!
//! The controller is a single event loop that owns the decoder adapter and
//! the signed-in operator session. It coordinates:
//! - Start/stop of the camera on operator commands
//! - Pausing the decoder while one scan cycle is processed
//! - Presenting the outcome and resuming after a per-outcome delay
//! - Discarding results that arrive after the scanner was stopped
//! - Stopping when the camera stream ends underneath it
//!
//! State machine: `Stopped -> Active -> Paused -> Active ... -> Stopped`.

mod handlers;
#[cfg(test)]
mod tests;

use crate::domain::{OperatorContext, RecentScanEntry, ScanOutcome, ScannerState};
use crate::infra::config::{Config, ResumeDelays};
use crate::infra::metrics::Metrics;
use crate::io::camera::CameraProvider;
use crate::io::decoder::{DecoderAdapter, DecoderEvent};
use crate::io::feedback::{FeedbackMessage, FeedbackSender};
use crate::io::store::RecordStore;
use crate::services::operator::OperatorSession;
use crate::services::processor::ScanProcessor;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Why the scanner is being stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Operator pressed stop
    Operator,
    /// Operator navigated away from the scan view
    LeftScanView,
    SignedOut,
    /// Camera stopped producing on its own
    CameraLost,
    Shutdown,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Operator => "operator",
            StopReason::LeftScanView => "left_scan_view",
            StopReason::SignedOut => "signed_out",
            StopReason::CameraLost => "camera_lost",
            StopReason::Shutdown => "shutdown",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScannerCommand {
    SignIn(OperatorContext),
    SignOut,
    Start,
    Stop(StopReason),
    /// Replace the operator's session label; `None` or blank clears it
    SetExamSession(Option<String>),
    Shutdown,
}

/// Finished processing cycle, reported by the spawned cycle task
pub(crate) struct CycleDone {
    cycle: u64,
    outcome: ScanOutcome,
    latency_us: u64,
}

pub struct SessionController<S: RecordStore, P: CameraProvider> {
    processor: ScanProcessor<S>,
    decoder: DecoderAdapter<P>,
    decoder_rx: mpsc::Receiver<DecoderEvent>,
    cycle_tx: mpsc::Sender<CycleDone>,
    cycle_rx: mpsc::Receiver<CycleDone>,
    resume_tx: mpsc::Sender<u64>,
    resume_rx: mpsc::Receiver<u64>,
    state: ScannerState,
    operator: Option<OperatorSession>,
    /// Session label applied to every new sign-in
    default_session: Option<String>,
    next_cycle: u64,
    /// Cycle whose store calls have not returned yet
    in_flight: Option<u64>,
    /// Cycle whose result is on screen, waiting for its resume timer
    awaiting_resume: Option<u64>,
    pending_resume: Option<JoinHandle<()>>,
    delays: ResumeDelays,
    feedback: FeedbackSender,
    metrics: Arc<Metrics>,
}

impl<S: RecordStore, P: CameraProvider> SessionController<S, P> {
    pub fn new(
        processor: ScanProcessor<S>,
        camera: P,
        config: &Config,
        feedback: FeedbackSender,
        metrics: Arc<Metrics>,
    ) -> Self {
        let (decoder_tx, decoder_rx) = mpsc::channel(config.decode_buffer());
        let (cycle_tx, cycle_rx) = mpsc::channel(4);
        let (resume_tx, resume_rx) = mpsc::channel(4);
        let decoder = DecoderAdapter::new(camera, config.camera().clone(), decoder_tx, metrics.clone());

        Self {
            processor,
            decoder,
            decoder_rx,
            cycle_tx,
            cycle_rx,
            resume_tx,
            resume_rx,
            state: ScannerState::Stopped,
            operator: None,
            default_session: config.operator_exam_session().map(str::to_string),
            next_cycle: 0,
            in_flight: None,
            awaiting_resume: None,
            pending_resume: None,
            delays: config.resume_delays(),
            feedback,
            metrics,
        }
    }

    /// Run until a `Shutdown` command arrives or the command channel closes
    pub async fn run(&mut self, mut commands: mpsc::Receiver<ScannerCommand>) {
        while self.step(&mut commands).await {}
        info!("controller_stopped");
    }

    /// Handle exactly one event. Returns `false` once the controller is done.
    pub async fn step(&mut self, commands: &mut mpsc::Receiver<ScannerCommand>) -> bool {
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => self.handle_command(command).await,
                None => {
                    self.stop(StopReason::Shutdown).await;
                    false
                }
            },
            Some(event) = self.decoder_rx.recv() => {
                match event {
                    DecoderEvent::Decoded(payload) => self.on_decoded(payload),
                    DecoderEvent::StreamEnded { run } => self.on_stream_ended(run).await,
                }
                true
            }
            Some(done) = self.cycle_rx.recv() => {
                self.on_cycle_done(done);
                true
            }
            Some(cycle) = self.resume_rx.recv() => {
                self.on_resume_due(cycle);
                true
            }
        }
    }

    pub async fn handle_command(&mut self, command: ScannerCommand) -> bool {
        match command {
            ScannerCommand::SignIn(context) => {
                self.stop(StopReason::SignedOut).await;
                info!(
                    operator = %context.user_id,
                    center = %context.center_id,
                    admin = %context.is_admin,
                    "operator_signed_in"
                );
                self.feedback
                    .notice(format!("Signed in as {} ({})", context.full_name, context.center_name));
                self.operator = Some(OperatorSession::new(context, self.default_session.as_deref()));
                self.feedback.send(FeedbackMessage::RecentScans(Vec::new()));
            }
            ScannerCommand::SignOut => {
                self.stop(StopReason::SignedOut).await;
                if let Some(session) = self.operator.take() {
                    info!(operator = %session.context().user_id, "operator_signed_out");
                    self.feedback.notice("Signed out");
                    self.feedback.send(FeedbackMessage::RecentScans(Vec::new()));
                }
            }
            ScannerCommand::Start => self.start().await,
            ScannerCommand::Stop(reason) => self.stop(reason).await,
            ScannerCommand::SetExamSession(label) => match self.operator.as_mut() {
                Some(session) => {
                    session.set_exam_session(label.as_deref());
                    let shown = session.exam_session().unwrap_or("(examinee's own)").to_string();
                    info!(session = %shown, "exam_session_set");
                    self.feedback.notice(format!("Exam session: {}", shown));
                }
                None => self.feedback.notice("Sign in before setting an exam session"),
            },
            ScannerCommand::Shutdown => {
                self.stop(StopReason::Shutdown).await;
                return false;
            }
        }
        true
    }

    async fn start(&mut self) {
        if self.state != ScannerState::Stopped {
            return;
        }
        if self.operator.is_none() {
            self.feedback.notice("Sign in before starting the scanner");
            return;
        }

        match self.decoder.start().await {
            Ok(()) => self.set_state(ScannerState::Active),
            Err(e) => {
                self.metrics.record_camera_error();
                warn!(error = %e, "scanner_start_failed");
                self.feedback.send(FeedbackMessage::CameraError(e.to_string()));
            }
        }
    }

    /// Stop from any state. Forgets the in-flight cycle and the pending
    /// resume, then releases the camera.
    async fn stop(&mut self, reason: StopReason) {
        self.cancel_resume();
        self.in_flight = None;
        self.awaiting_resume = None;

        if self.state == ScannerState::Stopped {
            return;
        }

        self.decoder.stop().await;
        info!(reason = reason.as_str(), "scanner_stopped");
        self.set_state(ScannerState::Stopped);
    }

    fn set_state(&mut self, state: ScannerState) {
        if self.state != state {
            self.state = state;
            self.feedback.state_changed(state);
        }
    }

    pub fn state(&self) -> ScannerState {
        self.state
    }

    pub fn operator(&self) -> Option<&OperatorSession> {
        self.operator.as_ref()
    }

    /// Recent-activity log of the signed-in operator, newest first
    pub fn recent_scans(&self) -> Vec<RecentScanEntry> {
        self.operator
            .as_ref()
            .map(|session| session.presenter().recent().snapshot())
            .unwrap_or_default()
    }
}
