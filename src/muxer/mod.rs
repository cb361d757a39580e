//! Encoder/container collaborators
//!
//! The session writer drives these traits and never touches encoded data:
//! - `MuxerService` creates sessions
//! - `MuxSession` owns the timeline and tracks of one output
//! - `TrackInput` / `PixelBufferAdaptor` accept audio buffers and video frames
//!
//! Two backends ship with the crate: `MemoryMuxer` (records calls, injects
//! faults) and `BundleMuxer` (writes a directory bundle to disk).

mod backend;
mod bundle;
mod finalize;
mod memory;

pub use backend::{
    MuxSession, MuxerError, MuxerService, PixelBufferAdaptor, SessionStatus, TrackInput,
};
pub use bundle::{BundleManifest, BundleMuxer, FrameEntry, TrackManifest, MANIFEST_FILE, VIDEO_FILE};
pub use finalize::{Completion, FinalizeNotifier, FinalizeSignal};
pub use memory::{FinalizeMode, MemoryMuxer, MuxerEvent, MuxerLog};
