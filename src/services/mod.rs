//! Services - scan pipeline logic and state management
//!
//! This module contains the core business logic services:
//! - `processor` - Resolves one payload and writes at most one attendance record
//! - `presenter` - Maps outcomes to operator messages, keeps the recent log
//! - `operator` - Signed-in operator session
//! - `controller` - Scanner lifecycle and scan-cycle orchestration

pub mod controller;
pub mod operator;
pub mod presenter;
pub mod processor;

// Re-export commonly used types
pub use controller::{ScannerCommand, SessionController, StopReason};
pub use operator::OperatorSession;
pub use presenter::{RecentScans, ResultPresenter, RECENT_SCANS_CAPACITY};
pub use processor::ScanProcessor;
