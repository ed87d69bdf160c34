//! IO modules - external system interfaces
//!
//! This module contains all external IO boundaries:
//! - `camera` - Camera provider trait and the channel-fed camera
//! - `decoder` - Pausable decoder adapter over a camera stream
//! - `store` - Record store trait and its error type
//! - `sqlite` - SQLite record store on a dedicated worker thread
//! - `memory` - In-memory record store
//! - `feedback` - Typed channel for operator feedback

pub mod camera;
pub mod decoder;
pub mod feedback;
pub mod memory;
pub mod sqlite;
pub mod store;

// Re-export commonly used types
pub use camera::{CameraConstraints, CameraError, CameraProvider, ChannelCamera, DecodeStream};
pub use decoder::{DecodedPayload, DecoderAdapter, DecoderEvent};
pub use feedback::{create_feedback_channel, FeedbackMessage, FeedbackSender};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use store::{RecordStore, StoreError};
