pub mod clock;
pub mod config;
pub mod media;
pub mod muxer;
pub mod writer;

pub use clock::{Clock, HostClock, ManualClock};
pub use config::Config;
pub use media::{
    AudioBuffer, AudioFormat, ContainerFormat, MediaKind, PixelBuffer, PixelFormat, Timestamp,
    VideoCodec, VideoSample, WriterSettings,
};
pub use muxer::{BundleManifest, BundleMuxer, MemoryMuxer, MuxerError, MuxerService};
pub use writer::{SessionState, SessionWriter, WriterError, WriterOptions, WriterResult, WriterStats};
