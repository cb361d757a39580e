use std::path::Path;
use thiserror::Error;

use super::finalize::FinalizeNotifier;
use crate::media::{
    AudioBuffer, ContainerFormat, MediaKind, PixelBufferAttributes, PixelReadGuard, Timestamp,
    TrackSettings,
};

/// Errors reported by muxer backends
#[derive(Error, Debug)]
pub enum MuxerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV encoding error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unsupported container format: {0}")]
    UnsupportedContainer(ContainerFormat),

    #[error("Unsupported track: {0}")]
    UnsupportedTrack(String),

    #[error("Session error: {0}")]
    Session(String),
}

/// Writing status of a muxing session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Created, `begin_writing` not yet called
    Unknown,
    Writing,
    Completed,
    Failed,
    Cancelled,
}

/// Encoder/container service that creates muxing sessions
///
/// Implementations do the compression and container serialization; the
/// session writer only coordinates timing and lifecycle around them.
pub trait MuxerService: Send + Sync {
    /// Create a new session writing to `output`
    fn create_session(
        &self,
        output: &Path,
        container: ContainerFormat,
    ) -> Result<Box<dyn MuxSession>, MuxerError>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// One muxing context producing one output
pub trait MuxSession: Send {
    /// Add an audio track (system audio or microphone)
    fn add_track(&mut self, settings: &TrackSettings) -> Result<Box<dyn TrackInput>, MuxerError>;

    /// Add the video track together with the adaptor that converts raw
    /// pixel buffers described by `attributes` into the encoder's input
    fn add_video_track(
        &mut self,
        settings: &TrackSettings,
        attributes: &PixelBufferAttributes,
    ) -> Result<Box<dyn PixelBufferAdaptor>, MuxerError>;

    /// Ask the service to start accepting media. Returns false if it cannot.
    fn begin_writing(&mut self) -> bool;

    fn status(&self) -> SessionStatus;

    /// Set the output timeline's zero-point
    fn anchor_timeline(&mut self, at: Timestamp);

    /// Set the output timeline's end
    fn close_timeline(&mut self, at: Timestamp);

    /// Finish the output asynchronously, reporting progress through `notifier`.
    /// Consumes the session; no handle survives finalization.
    fn finalize(self: Box<Self>, notifier: FinalizeNotifier);
}

/// Sink for one audio track
pub trait TrackInput: Send {
    fn kind(&self) -> MediaKind;

    /// Backpressure signal: false means the next append would block or drop
    fn is_ready_for_more_data(&self) -> bool;

    /// Append a buffer at its embedded presentation time
    fn append(&mut self, buffer: &AudioBuffer) -> bool;

    /// No more buffers will be appended
    fn mark_finished(self: Box<Self>);
}

/// Sink for the video track, accepting raw pixel buffers
pub trait PixelBufferAdaptor: Send {
    fn is_ready_for_more_data(&self) -> bool;

    /// Convert a locked pixel buffer and append it at `time`
    fn append(&mut self, pixels: &PixelReadGuard<'_>, time: Timestamp) -> bool;

    /// No more frames will be appended
    fn mark_finished(self: Box<Self>);
}
