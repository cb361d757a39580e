use serde::{Deserialize, Serialize};

use crate::media::Timestamp;

/// Snapshot of a session writer's state
///
/// Returned by value; later writes never change a snapshot already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionState {
    /// Whether a session is between `start` and a completed `end`
    pub is_running: bool,

    /// Host-clock time at which `start` was invoked
    pub start_time: Timestamp,

    /// Presentation time of the most recently accepted video frame
    pub last_frame_time: Timestamp,

    /// Timeline anchoring is deferred until the first video frame
    pub waiting_for_first_write: bool,

    /// Whether system audio is written
    pub audio_enabled: bool,

    /// Whether microphone audio is written
    pub microphone_enabled: bool,
}

/// Buffer counters for the current (or most recent) session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WriterStats {
    pub video_frames_written: u64,
    pub audio_buffers_written: u64,
    pub microphone_buffers_written: u64,

    /// Audio and microphone buffers dropped while anchoring was pending
    pub dropped_before_anchor: u64,

    /// Writes refused because a track reported it was not ready
    pub backpressure_rejections: u64,

    /// Appends the muxer rejected after readiness was confirmed
    pub append_failures: u64,
}
