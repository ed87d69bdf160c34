//! Decoder adapter - turns a camera into a pausable stream of payloads
//!
//! `start` acquires the camera and spawns a pump task that forwards decoded
//! payloads into the controller's channel. `pause` keeps the camera but drops
//! everything it decodes; `stop` cancels the pump, which always releases the
//! camera on its way out. All four operations are idempotent. A camera that
//! stops producing on its own is reported as `DecoderEvent::StreamEnded`.

use crate::infra::metrics::Metrics;
use crate::io::camera::{CameraConstraints, CameraError, CameraProvider, DecodeStream};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A payload produced by one decoder run
#[derive(Debug, Clone)]
pub struct DecodedPayload {
    /// Decoder run that produced it; payloads from older runs are stale
    pub run: u64,
    pub text: String,
    pub decoded_at: Instant,
}

/// What the pump reports to the controller
#[derive(Debug, Clone)]
pub enum DecoderEvent {
    Decoded(DecodedPayload),
    /// The camera stopped producing; the pump released it and exited
    StreamEnded { run: u64 },
}

struct RunningDecoder {
    cancel: CancellationToken,
    paused_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct DecoderAdapter<P: CameraProvider> {
    provider: P,
    constraints: CameraConstraints,
    output: mpsc::Sender<DecoderEvent>,
    metrics: Arc<Metrics>,
    run_id: u64,
    running: Option<RunningDecoder>,
}

impl<P: CameraProvider> DecoderAdapter<P> {
    pub fn new(
        provider: P,
        constraints: CameraConstraints,
        output: mpsc::Sender<DecoderEvent>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { provider, constraints, output, metrics, run_id: 0, running: None }
    }

    /// Acquire the camera and begin emitting payloads. No-op when running.
    pub async fn start(&mut self) -> Result<(), CameraError> {
        if self.running.is_some() {
            return Ok(());
        }

        self.constraints.validate()?;
        let stream = self.provider.acquire(&self.constraints).await?;

        self.run_id += 1;
        let cancel = CancellationToken::new();
        let (paused_tx, paused_rx) = watch::channel(false);
        let handle = tokio::spawn(decode_pump(
            self.run_id,
            stream,
            self.output.clone(),
            cancel.clone(),
            paused_rx,
            self.metrics.clone(),
        ));

        self.running = Some(RunningDecoder { cancel, paused_tx, handle });
        info!(
            run = %self.run_id,
            fps = %self.constraints.fps,
            qrbox = %self.constraints.qrbox,
            "decoder_started"
        );
        Ok(())
    }

    /// Stop forwarding payloads without releasing the camera
    pub fn pause(&self) {
        if let Some(running) = &self.running {
            running.paused_tx.send_replace(true);
        }
    }

    pub fn resume(&self) {
        if let Some(running) = &self.running {
            running.paused_tx.send_replace(false);
        }
    }

    /// Cancel the pump and wait for it to release the camera
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        running.cancel.cancel();
        if let Err(e) = running.handle.await {
            // The stream was owned by the task, so it is dropped either way
            error!(run = %self.run_id, error = %e, "decoder_pump_join_failed");
        }
        info!(run = %self.run_id, "decoder_stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.running.as_ref().map(|r| *r.paused_tx.borrow()).unwrap_or(false)
    }

    /// Identifier of the current (or last) decoder run
    pub fn run_id(&self) -> u64 {
        self.run_id
    }
}

async fn decode_pump(
    run: u64,
    mut stream: Box<dyn DecodeStream>,
    output: mpsc::Sender<DecoderEvent>,
    cancel: CancellationToken,
    paused: watch::Receiver<bool>,
    metrics: Arc<Metrics>,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = stream.next_decoded() => {
                let Some(text) = next else {
                    warn!(run = %run, "camera_stream_ended");
                    // Never block a concurrent stop that is joining this task
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = output.send(DecoderEvent::StreamEnded { run }) => {}
                    }
                    break;
                };

                if *paused.borrow() {
                    metrics.record_decode_ignored();
                    debug!(run = %run, "decode_dropped_while_paused");
                    continue;
                }

                let payload = DecodedPayload { run, text, decoded_at: Instant::now() };
                match output.try_send(DecoderEvent::Decoded(payload)) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        metrics.record_decode_ignored();
                        warn!(run = %run, "decode_dropped: channel full");
                    }
                    Err(TrySendError::Closed(_)) => {
                        warn!(run = %run, "decode_channel_closed");
                        break;
                    }
                }
            }
        }
    }

    match stream.release().await {
        Ok(()) => debug!(run = %run, "camera_released"),
        Err(e) => warn!(run = %run, error = %e, "camera_release_failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::camera::ChannelCamera;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::time::{timeout, Duration};

    fn adapter(
        camera: ChannelCamera,
    ) -> (DecoderAdapter<ChannelCamera>, mpsc::Receiver<DecoderEvent>, Arc<Metrics>) {
        let (tx, rx) = mpsc::channel(16);
        let metrics = Arc::new(Metrics::new());
        let adapter = DecoderAdapter::new(camera, CameraConstraints::default(), tx, metrics.clone());
        (adapter, rx, metrics)
    }

    async fn next_payload(rx: &mut mpsc::Receiver<DecoderEvent>) -> DecodedPayload {
        match timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap() {
            DecoderEvent::Decoded(payload) => payload,
            other => panic!("expected a payload, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_start_forwards_payloads() {
        let (feed, camera) = ChannelCamera::channel(8);
        let (mut decoder, mut rx, _) = adapter(camera);

        decoder.start().await.unwrap();
        assert!(decoder.is_running());
        assert_eq!(decoder.run_id(), 1);

        feed.send("EX-10293".to_string()).await.unwrap();
        let payload = next_payload(&mut rx).await;
        assert_eq!(payload.text, "EX-10293");
        assert_eq!(payload.run, 1);

        decoder.stop().await;
    }

    #[tokio::test]
    async fn test_paused_decoder_drops_payloads() {
        let (feed, camera) = ChannelCamera::channel(8);
        let (mut decoder, mut rx, metrics) = adapter(camera);

        decoder.start().await.unwrap();
        decoder.pause();
        assert!(decoder.is_paused());

        feed.send("EX-1".to_string()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(metrics.decodes_ignored(), 1);

        decoder.resume();
        feed.send("EX-2".to_string()).await.unwrap();
        let payload = next_payload(&mut rx).await;
        assert_eq!(payload.text, "EX-2");

        decoder.stop().await;
    }

    #[tokio::test]
    async fn test_operations_are_idempotent() {
        let (_feed, camera) = ChannelCamera::channel(8);
        let (mut decoder, _rx, _) = adapter(camera);

        // Not running: all no-ops
        decoder.pause();
        decoder.resume();
        decoder.stop().await;
        assert!(!decoder.is_running());

        decoder.start().await.unwrap();
        decoder.start().await.unwrap();
        assert_eq!(decoder.run_id(), 1);

        decoder.stop().await;
        decoder.stop().await;
        assert!(!decoder.is_running());
    }

    #[tokio::test]
    async fn test_restart_after_stop_reacquires_camera() {
        let (feed, camera) = ChannelCamera::channel(8);
        let (mut decoder, mut rx, _) = adapter(camera);

        decoder.start().await.unwrap();
        decoder.stop().await;
        decoder.start().await.unwrap();
        assert_eq!(decoder.run_id(), 2);

        feed.send("EX-3".to_string()).await.unwrap();
        let payload = next_payload(&mut rx).await;
        assert_eq!(payload.run, 2);

        decoder.stop().await;
    }

    #[tokio::test]
    async fn test_invalid_constraints_do_not_acquire() {
        let (_feed, camera) = ChannelCamera::channel(8);
        let (tx, _rx) = mpsc::channel(4);
        let constraints = CameraConstraints { fps: 0, ..Default::default() };
        let mut decoder =
            DecoderAdapter::new(camera.clone(), constraints, tx, Arc::new(Metrics::new()));

        assert!(decoder.start().await.is_err());
        assert!(!decoder.is_running());
        // Camera still free for someone else
        assert!(camera.acquire(&CameraConstraints::default()).await.is_ok());
    }

    #[tokio::test]
    async fn test_stream_end_is_reported() {
        let (feed, camera) = ChannelCamera::channel(8);
        let (mut decoder, mut rx, _) = adapter(camera.clone());

        decoder.start().await.unwrap();
        drop(feed);

        match timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap() {
            DecoderEvent::StreamEnded { run } => assert_eq!(run, 1),
            other => panic!("expected stream end, got {other:?}"),
        }

        // The pump released the camera before exiting
        decoder.stop().await;
        assert!(!decoder.is_running());
        assert!(camera.acquire(&CameraConstraints::default()).await.is_ok());
    }

    /// Stream whose release always fails, recording that it was attempted
    struct FaultyStream {
        released: Arc<AtomicBool>,
    }

    #[async_trait]
    impl DecodeStream for FaultyStream {
        async fn next_decoded(&mut self) -> Option<String> {
            std::future::pending::<Option<String>>().await
        }

        async fn release(&mut self) -> Result<(), CameraError> {
            self.released.store(true, Ordering::SeqCst);
            Err(CameraError::ReleaseFailed("device busy".to_string()))
        }
    }

    struct FaultyCamera {
        released: Arc<AtomicBool>,
        acquisitions: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CameraProvider for FaultyCamera {
        async fn acquire(
            &self,
            _constraints: &CameraConstraints,
        ) -> Result<Box<dyn DecodeStream>, CameraError> {
            self.acquisitions.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FaultyStream { released: self.released.clone() }))
        }
    }

    #[tokio::test]
    async fn test_stop_swallows_release_failure() {
        let released = Arc::new(AtomicBool::new(false));
        let acquisitions = Arc::new(AtomicUsize::new(0));
        let camera = FaultyCamera { released: released.clone(), acquisitions: acquisitions.clone() };
        let (tx, _rx) = mpsc::channel(4);
        let mut decoder =
            DecoderAdapter::new(camera, CameraConstraints::default(), tx, Arc::new(Metrics::new()));

        decoder.start().await.unwrap();
        decoder.stop().await;

        assert!(released.load(Ordering::SeqCst));
        assert!(!decoder.is_running());

        // A failed release never leaves the adapter thinking it still holds the camera
        decoder.start().await.unwrap();
        assert_eq!(acquisitions.load(Ordering::SeqCst), 2);
        decoder.stop().await;
    }
}
