//! Session writer
//!
//! Coordinates independently paced video, system audio and microphone
//! producers into one muxed output:
//! - Session lifecycle (idle → running → idle) with optional deferred anchoring
//! - Monotonic video timing and end-time validation
//! - Backpressure reporting without internal buffering
//! - Bounded wait for finalization

mod error;
mod session_writer;
mod state;

pub use error::{WriterError, WriterResult};
pub use session_writer::{SessionWriter, WriterOptions};
pub use state::{SessionState, WriterStats};
