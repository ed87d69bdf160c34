//! Infrastructure - configuration and metrics
//!
//! This module contains infrastructure concerns:
//! - `config` - Application configuration (TOML loading, defaults)
//! - `metrics` - Lock-free scan counters and latency histogram

pub mod config;
pub mod metrics;

// Re-export commonly used types
pub use config::{Config, ResumeDelays};
pub use metrics::Metrics;
