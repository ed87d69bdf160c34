//! Configuration loading from TOML files
//!
//! The binary picks the file from `--config` or `CONFIG_FILE`, defaulting
//! to config/dev.toml. A missing or unreadable file falls back to defaults.

use crate::domain::OutcomeKind;
use crate::io::camera::{CameraConstraints, FacingMode};
use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// SQLite database file
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: default_store_path() }
    }
}

fn default_store_path() -> String {
    "data/attendance.sqlite3".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct OperatorConfig {
    /// Supervisor signed in automatically when scanning starts
    #[serde(default)]
    pub user_id: Option<String>,
    /// Initial value of the exam session input
    #[serde(default)]
    pub exam_session: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScannerConfig {
    #[serde(default = "default_facing_mode")]
    pub facing_mode: FacingMode,
    #[serde(default = "default_fps")]
    pub fps: u32,
    /// Side of the square decode region in pixels
    #[serde(default = "default_qrbox")]
    pub qrbox: u32,
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: f32,
    /// Decoded payloads buffered between decoder and controller
    #[serde(default = "default_decode_buffer")]
    pub decode_buffer: usize,
    #[serde(default = "default_success_resume_ms")]
    pub success_resume_ms: u64,
    #[serde(default = "default_duplicate_resume_ms")]
    pub duplicate_resume_ms: u64,
    #[serde(default = "default_not_found_resume_ms")]
    pub not_found_resume_ms: u64,
    #[serde(default = "default_error_resume_ms")]
    pub error_resume_ms: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            facing_mode: default_facing_mode(),
            fps: default_fps(),
            qrbox: default_qrbox(),
            aspect_ratio: default_aspect_ratio(),
            decode_buffer: default_decode_buffer(),
            success_resume_ms: default_success_resume_ms(),
            duplicate_resume_ms: default_duplicate_resume_ms(),
            not_found_resume_ms: default_not_found_resume_ms(),
            error_resume_ms: default_error_resume_ms(),
        }
    }
}

fn default_facing_mode() -> FacingMode {
    FacingMode::Environment
}

fn default_fps() -> u32 {
    10
}

fn default_qrbox() -> u32 {
    250
}

fn default_aspect_ratio() -> f32 {
    1.0
}

fn default_decode_buffer() -> usize {
    16
}

fn default_success_resume_ms() -> u64 {
    2500
}

fn default_duplicate_resume_ms() -> u64 {
    2000
}

fn default_not_found_resume_ms() -> u64 {
    2000
}

fn default_error_resume_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackConfig {
    #[serde(default = "default_feedback_buffer")]
    pub buffer: usize,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self { buffer: default_feedback_buffer() }
    }
}

fn default_feedback_buffer() -> usize {
    64
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Interval for logging the metrics summary (0 to disable)
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub operator: OperatorConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Per-outcome delay before the scanner resumes listening
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumeDelays {
    pub success: Duration,
    pub duplicate: Duration,
    pub not_found: Duration,
    pub error: Duration,
}

impl ResumeDelays {
    pub fn for_outcome(&self, kind: OutcomeKind) -> Duration {
        match kind {
            OutcomeKind::Success => self.success,
            OutcomeKind::Duplicate => self.duplicate,
            OutcomeKind::NotFound => self.not_found,
            OutcomeKind::Error => self.error,
        }
    }

    /// Same delay for every outcome
    pub fn uniform(delay: Duration) -> Self {
        Self { success: delay, duplicate: delay, not_found: delay, error: delay }
    }
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    store_path: String,
    operator_user_id: Option<String>,
    operator_exam_session: Option<String>,
    camera: CameraConstraints,
    decode_buffer: usize,
    resume_delays: ResumeDelays,
    feedback_buffer: usize,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        let scanner = toml_config.scanner;
        Self {
            store_path: toml_config.store.path,
            operator_user_id: toml_config.operator.user_id,
            operator_exam_session: toml_config.operator.exam_session,
            camera: CameraConstraints {
                facing_mode: scanner.facing_mode,
                fps: scanner.fps,
                qrbox: scanner.qrbox,
                aspect_ratio: scanner.aspect_ratio,
            },
            decode_buffer: scanner.decode_buffer.max(1),
            resume_delays: ResumeDelays {
                success: Duration::from_millis(scanner.success_resume_ms),
                duplicate: Duration::from_millis(scanner.duplicate_resume_ms),
                not_found: Duration::from_millis(scanner.not_found_resume_ms),
                error: Duration::from_millis(scanner.error_resume_ms),
            },
            feedback_buffer: toml_config.feedback.buffer.max(1),
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file,
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load configuration from a path, falling back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    // Getters for all config fields
    pub fn store_path(&self) -> &str {
        &self.store_path
    }

    pub fn operator_user_id(&self) -> Option<&str> {
        self.operator_user_id.as_deref()
    }

    pub fn operator_exam_session(&self) -> Option<&str> {
        self.operator_exam_session.as_deref()
    }

    pub fn camera(&self) -> &CameraConstraints {
        &self.camera
    }

    pub fn decode_buffer(&self) -> usize {
        self.decode_buffer
    }

    pub fn resume_delays(&self) -> ResumeDelays {
        self.resume_delays
    }

    pub fn feedback_buffer(&self) -> usize {
        self.feedback_buffer
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method to override resume delays (short delays keep tests fast)
    pub fn with_resume_delays(mut self, delays: ResumeDelays) -> Self {
        self.resume_delays = delays;
        self
    }

    /// Builder method to override camera constraints
    pub fn with_camera(mut self, camera: CameraConstraints) -> Self {
        self.camera = camera;
        self
    }
}
