//! Media value types shared by the writer and muxer backends
//!
//! - `Timestamp`: rational presentation time
//! - `PixelBuffer` / `AudioBuffer` / `VideoSample`: buffers handed in by capture callbacks
//! - Encoding settings derived from the writer's construction inputs

mod buffer;
mod settings;
mod time;

pub use buffer::{AudioBuffer, PixelBuffer, PixelFormat, PixelReadGuard, VideoSample};
pub use settings::{
    AudioFormat, AudioSettings, ContainerFormat, MediaKind, PixelBufferAttributes,
    TrackEncoding, TrackSettings, VideoCodec, VideoSettings, WriterSettings,
};
pub use time::{Timestamp, NANOS_PER_SECOND};
