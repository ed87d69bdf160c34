//! Event handlers for the SessionController
//!
//! Each handler reacts to one loop event: a decoded payload, a camera
//! stream that ended, a finished processing cycle, or a due resume timer.

use super::{CycleDone, SessionController, StopReason};
use crate::domain::{OutcomeKind, ScannerState};
use crate::io::camera::CameraProvider;
use crate::io::decoder::DecodedPayload;
use crate::io::feedback::FeedbackMessage;
use crate::io::store::RecordStore;
use std::time::Duration;
use tracing::{debug, info, warn};

impl<S: RecordStore, P: CameraProvider> SessionController<S, P> {
    /// Accept the payload only while `Active` and only from the current run
    ///
    /// Accepting it pauses the decoder and dispatches exactly one cycle.
    pub(crate) fn on_decoded(&mut self, payload: DecodedPayload) {
        if self.state != ScannerState::Active || payload.run != self.decoder.run_id() {
            self.metrics.record_decode_ignored();
            debug!(
                run = %payload.run,
                state = self.state.as_str(),
                "decode_ignored"
            );
            return;
        }
        let Some(session) = self.operator.as_ref() else {
            self.metrics.record_decode_ignored();
            return;
        };

        self.decoder.pause();
        let run = payload.run;
        self.next_cycle += 1;
        let cycle = self.next_cycle;
        self.in_flight = Some(cycle);

        let processor = self.processor.clone();
        let operator = session.context().clone();
        let declared = session.exam_session().map(str::to_string);
        let cycle_tx = self.cycle_tx.clone();
        tokio::spawn(async move {
            let outcome = processor.process(&payload.text, &operator, declared.as_deref()).await;
            let latency_us = payload.decoded_at.elapsed().as_micros() as u64;
            // Controller gone means shutdown; the result has nowhere to go
            let _ = cycle_tx.send(CycleDone { cycle, outcome, latency_us }).await;
        });

        debug!(cycle = %cycle, run = %run, "scan_cycle_dispatched");
        self.set_state(ScannerState::Paused);
        self.feedback.send(FeedbackMessage::Processing);
    }

    /// The current run's camera went away: report it and stop
    ///
    /// Ends from an older run were already handled by the stop that ended it.
    pub(crate) async fn on_stream_ended(&mut self, run: u64) {
        if self.state == ScannerState::Stopped || run != self.decoder.run_id() {
            debug!(run = %run, "stale_stream_end_ignored");
            return;
        }

        self.metrics.record_camera_error();
        warn!(run = %run, state = self.state.as_str(), "camera_lost");
        self.stop(StopReason::CameraLost).await;
        self.feedback
            .send(FeedbackMessage::CameraError("camera stopped producing frames".to_string()));
    }

    /// Present the outcome of the in-flight cycle and schedule the resume
    pub(crate) fn on_cycle_done(&mut self, done: CycleDone) {
        let CycleDone { cycle, outcome, latency_us } = done;
        let kind = outcome.kind();

        if self.in_flight != Some(cycle) {
            self.metrics.record_result_discarded();
            info!(cycle = %cycle, outcome = kind.as_str(), "scan_result_discarded");
            return;
        }
        self.in_flight = None;

        let Some(session) = self.operator.as_mut() else {
            self.metrics.record_result_discarded();
            return;
        };

        self.metrics.record_outcome(kind, latency_us);
        let presentation = session.presenter_mut().present(&outcome);
        info!(
            cycle = %cycle,
            outcome = kind.as_str(),
            latency_us = %latency_us,
            title = %presentation.title,
            "scan_outcome_presented"
        );

        self.feedback.send(FeedbackMessage::Outcome(presentation));
        if kind == OutcomeKind::Success {
            let recent = session.presenter().recent().snapshot();
            self.feedback.send(FeedbackMessage::RecentScans(recent));
        }

        self.schedule_resume(cycle, self.delays.for_outcome(kind));
    }

    pub(crate) fn on_resume_due(&mut self, cycle: u64) {
        if self.state != ScannerState::Paused || self.awaiting_resume != Some(cycle) {
            debug!(cycle = %cycle, "stale_resume_ignored");
            return;
        }

        self.pending_resume = None;
        self.awaiting_resume = None;
        self.decoder.resume();
        self.set_state(ScannerState::Active);
    }

    fn schedule_resume(&mut self, cycle: u64, delay: Duration) {
        self.cancel_resume();
        self.awaiting_resume = Some(cycle);

        let resume_tx = self.resume_tx.clone();
        self.pending_resume = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = resume_tx.send(cycle).await;
        }));
    }

    pub(crate) fn cancel_resume(&mut self) {
        if let Some(handle) = self.pending_resume.take() {
            handle.abort();
        }
    }
}
