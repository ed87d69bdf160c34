//! Camera boundary - opaque QR decoder producing text payloads
//!
//! The scanner never sees images. A `CameraProvider` hands out a
//! `DecodeStream` per scanner run; the stream yields decoded payloads until
//! released. `ChannelCamera` feeds payloads from an mpsc channel, which is
//! how the CLI bridges a keyboard-wedge scanner or stdin.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    Environment,
    User,
}

/// Acquisition constraints passed to the camera on start
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraConstraints {
    pub facing_mode: FacingMode,
    pub fps: u32,
    pub qrbox: u32,
    pub aspect_ratio: f32,
}

impl Default for CameraConstraints {
    fn default() -> Self {
        Self { facing_mode: FacingMode::Environment, fps: 10, qrbox: 250, aspect_ratio: 1.0 }
    }
}

impl CameraConstraints {
    pub fn validate(&self) -> Result<(), CameraError> {
        if self.fps == 0 {
            return Err(CameraError::InvalidConstraints("fps must be greater than zero".into()));
        }
        if self.qrbox == 0 {
            return Err(CameraError::InvalidConstraints("qrbox must be greater than zero".into()));
        }
        if !(self.aspect_ratio.is_finite() && self.aspect_ratio > 0.0) {
            return Err(CameraError::InvalidConstraints(format!(
                "aspect_ratio {} is not a positive number",
                self.aspect_ratio
            )));
        }
        Ok(())
    }
}

/// Camera acquisition or release failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    PermissionDenied,
    /// Another scanner run holds the device
    Busy,
    Unavailable(String),
    InvalidConstraints(String),
    ReleaseFailed(String),
}

impl std::fmt::Display for CameraError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraError::PermissionDenied => write!(f, "camera permission denied"),
            CameraError::Busy => write!(f, "camera is already in use"),
            CameraError::Unavailable(reason) => write!(f, "camera unavailable: {}", reason),
            CameraError::InvalidConstraints(reason) => {
                write!(f, "invalid camera constraints: {}", reason)
            }
            CameraError::ReleaseFailed(reason) => write!(f, "camera release failed: {}", reason),
        }
    }
}

impl std::error::Error for CameraError {}

/// Live decode session on an acquired camera
#[async_trait]
pub trait DecodeStream: Send {
    /// Next decoded payload; `None` once the camera stops producing
    ///
    /// Must be cancel-safe: the decoder pump races it against shutdown.
    async fn next_decoded(&mut self) -> Option<String>;

    /// Release the device. The stream is dropped afterwards either way.
    async fn release(&mut self) -> Result<(), CameraError>;
}

/// Source of camera sessions
#[async_trait]
pub trait CameraProvider: Send + Sync + 'static {
    async fn acquire(
        &self,
        constraints: &CameraConstraints,
    ) -> Result<Box<dyn DecodeStream>, CameraError>;
}

/// Camera fed by an mpsc channel of already-decoded payloads
///
/// Only one stream can hold the feed at a time; dropping the stream
/// returns the feed for the next run. Payloads pushed while no stream holds
/// the feed are discarded on the next acquire, never replayed.
#[derive(Clone)]
pub struct ChannelCamera {
    feed: Arc<Mutex<mpsc::Receiver<String>>>,
}

impl ChannelCamera {
    pub fn new(feed: mpsc::Receiver<String>) -> Self {
        Self { feed: Arc::new(Mutex::new(feed)) }
    }

    /// Create a camera together with the sender used to push payloads
    pub fn channel(buffer: usize) -> (mpsc::Sender<String>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self::new(rx))
    }
}

struct ChannelStream {
    feed: OwnedMutexGuard<mpsc::Receiver<String>>,
}

#[async_trait]
impl DecodeStream for ChannelStream {
    async fn next_decoded(&mut self) -> Option<String> {
        self.feed.recv().await
    }

    async fn release(&mut self) -> Result<(), CameraError> {
        Ok(())
    }
}

#[async_trait]
impl CameraProvider for ChannelCamera {
    async fn acquire(
        &self,
        _constraints: &CameraConstraints,
    ) -> Result<Box<dyn DecodeStream>, CameraError> {
        let mut feed = self.feed.clone().try_lock_owned().map_err(|_| CameraError::Busy)?;

        let mut stale = 0usize;
        while feed.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            debug!(stale = %stale, "camera_feed_drained");
        }
        Ok(Box::new(ChannelStream { feed }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_constraints_are_valid() {
        assert!(CameraConstraints::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_constraints() {
        let zero_fps = CameraConstraints { fps: 0, ..Default::default() };
        assert!(matches!(zero_fps.validate(), Err(CameraError::InvalidConstraints(_))));

        let bad_ratio = CameraConstraints { aspect_ratio: f32::NAN, ..Default::default() };
        assert!(matches!(bad_ratio.validate(), Err(CameraError::InvalidConstraints(_))));
    }

    #[tokio::test]
    async fn test_channel_camera_is_exclusive() {
        let (_tx, camera) = ChannelCamera::channel(4);
        let constraints = CameraConstraints::default();

        let first = camera.acquire(&constraints).await.unwrap();
        assert_eq!(camera.acquire(&constraints).await.err(), Some(CameraError::Busy));

        drop(first);
        assert!(camera.acquire(&constraints).await.is_ok());
    }

    #[tokio::test]
    async fn test_channel_camera_yields_payloads() {
        let (tx, camera) = ChannelCamera::channel(4);
        let mut stream = camera.acquire(&CameraConstraints::default()).await.unwrap();

        tx.send("EX-1".to_string()).await.unwrap();
        assert_eq!(stream.next_decoded().await, Some("EX-1".to_string()));

        drop(tx);
        assert_eq!(stream.next_decoded().await, None);
        assert!(stream.release().await.is_ok());
    }

    #[tokio::test]
    async fn test_payloads_sent_while_released_are_not_replayed() {
        let (tx, camera) = ChannelCamera::channel(4);
        let stream = camera.acquire(&CameraConstraints::default()).await.unwrap();
        drop(stream);

        tx.send("EX-STALE-1".to_string()).await.unwrap();
        tx.send("EX-STALE-2".to_string()).await.unwrap();

        let mut stream = camera.acquire(&CameraConstraints::default()).await.unwrap();
        tx.send("EX-FRESH".to_string()).await.unwrap();
        assert_eq!(stream.next_decoded().await, Some("EX-FRESH".to_string()));
    }
}
