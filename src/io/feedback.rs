//! Typed channel for operator feedback
//!
//! The controller never blocks on the UI. Messages go through a bounded
//! mpsc channel; when the consumer falls behind they are dropped and
//! counted.

use crate::domain::{Presentation, RecentScanEntry, ScannerState};
use crate::infra::metrics::Metrics;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Messages rendered by whatever front end drives the scanner
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum FeedbackMessage {
    /// Scanner moved to a new lifecycle state
    StateChanged(ScannerState),
    /// A payload was accepted and is being processed
    Processing,
    /// Result of the cycle that just finished
    Outcome(Presentation),
    /// Recent-activity log after a change, newest first
    RecentScans(Vec<RecentScanEntry>),
    /// Camera could not be acquired
    CameraError(String),
    /// Anything else worth telling the operator
    Notice(String),
}

/// Non-blocking sender; if the channel is full, messages are dropped
#[derive(Clone)]
pub struct FeedbackSender {
    tx: mpsc::Sender<FeedbackMessage>,
    metrics: Arc<Metrics>,
}

impl FeedbackSender {
    pub fn new(tx: mpsc::Sender<FeedbackMessage>, metrics: Arc<Metrics>) -> Self {
        Self { tx, metrics }
    }

    pub fn send(&self, message: FeedbackMessage) {
        if self.tx.try_send(message).is_err() {
            self.metrics.record_feedback_dropped();
            debug!("feedback_dropped");
        }
    }

    pub fn state_changed(&self, state: ScannerState) {
        self.send(FeedbackMessage::StateChanged(state));
    }

    pub fn notice(&self, text: impl Into<String>) {
        self.send(FeedbackMessage::Notice(text.into()));
    }
}

/// Create a feedback channel with the given buffer size
pub fn create_feedback_channel(
    buffer_size: usize,
    metrics: Arc<Metrics>,
) -> (FeedbackSender, mpsc::Receiver<FeedbackMessage>) {
    let (tx, rx) = mpsc::channel(buffer_size.max(1));
    (FeedbackSender::new(tx, metrics), rx)
}
