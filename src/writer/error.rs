use std::time::Duration;
use thiserror::Error;

use crate::media::Timestamp;

/// Failures surfaced by [`SessionWriter`](super::SessionWriter) operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WriterError {
    #[error("Recording has not started yet")]
    NotStarted,

    #[error("Recording has already started")]
    AlreadyRunning,

    #[error("Failed to start recording: {reason}")]
    FailedToStart { reason: String },

    #[error("Trying to write at an incorrect time: {time} (last frame at {last})")]
    InvalidTime { time: Timestamp, last: Timestamp },

    #[error("Not yet ready to write the next buffer")]
    NotReadyForMoreData,

    #[error("Buffer write failed")]
    FailedToAppendBuffer,

    #[error("Finalization did not report back within {waited:?}")]
    FinalizeTimeout { waited: Duration },

    #[error("Failed to finalize recording: {reason}")]
    FailedToFinalize { reason: String },
}

/// Result type alias using WriterError
pub type WriterResult<T> = Result<T, WriterError>;
