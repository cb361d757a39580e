//! In-memory muxer backend
//!
//! Records every call it receives in a shared [`MuxerLog`] instead of encoding
//! anything, counts live session and track handles, and lets callers inject
//! the failure modes a real encoder can produce (refusing to start,
//! backpressure, rejected appends, stalled or failing finalization).

use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::debug;

use super::backend::{
    MuxSession, MuxerError, MuxerService, PixelBufferAdaptor, SessionStatus, TrackInput,
};
use super::finalize::FinalizeNotifier;
use crate::media::{
    AudioBuffer, ContainerFormat, MediaKind, PixelBufferAttributes, PixelReadGuard, Timestamp,
    TrackSettings,
};

/// How a memory session behaves when finalized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FinalizeMode {
    /// Flush and complete before `finalize` returns
    #[default]
    Immediate,
    /// Flush and complete from a background thread after the delay
    Delayed(Duration),
    /// Flush immediately, hold completion until `release_finalize`
    FlushOnly,
    /// Report nothing until `release_finalize`
    Never,
    /// Complete with an error
    Fail,
}

/// A call observed by the memory muxer
#[derive(Debug, Clone, PartialEq)]
pub enum MuxerEvent {
    SessionCreated {
        output: PathBuf,
        container: ContainerFormat,
    },
    TrackAdded(TrackSettings),
    BeganWriting,
    Anchored(Timestamp),
    Appended {
        kind: MediaKind,
        time: Timestamp,
        bytes: usize,
    },
    TrackFinished(MediaKind),
    Closed(Timestamp),
    FinalizeRequested,
}

/// Ordered record of every call the muxer received, across all sessions
#[derive(Debug, Clone, Default)]
pub struct MuxerLog {
    pub events: Vec<MuxerEvent>,
}

impl MuxerLog {
    pub fn sessions_created(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, MuxerEvent::SessionCreated { .. }))
            .count()
    }

    pub fn tracks_added(&self) -> Vec<MediaKind> {
        self.events
            .iter()
            .filter_map(|e| match e {
                MuxerEvent::TrackAdded(settings) => Some(settings.kind),
                _ => None,
            })
            .collect()
    }

    pub fn anchors(&self) -> Vec<Timestamp> {
        self.events
            .iter()
            .filter_map(|e| match e {
                MuxerEvent::Anchored(t) => Some(*t),
                _ => None,
            })
            .collect()
    }

    pub fn closes(&self) -> Vec<Timestamp> {
        self.events
            .iter()
            .filter_map(|e| match e {
                MuxerEvent::Closed(t) => Some(*t),
                _ => None,
            })
            .collect()
    }

    /// Presentation times of every buffer appended to tracks of `kind`
    pub fn appended(&self, kind: MediaKind) -> Vec<Timestamp> {
        self.events
            .iter()
            .filter_map(|e| match e {
                MuxerEvent::Appended { kind: k, time, .. } if *k == kind => Some(*time),
                _ => None,
            })
            .collect()
    }

    pub fn finished_tracks(&self) -> Vec<MediaKind> {
        self.events
            .iter()
            .filter_map(|e| match e {
                MuxerEvent::TrackFinished(kind) => Some(*kind),
                _ => None,
            })
            .collect()
    }

    pub fn finalize_requests(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, MuxerEvent::FinalizeRequested))
            .count()
    }
}

#[derive(Debug, Default)]
struct Faults {
    fail_create: bool,
    fail_begin: bool,
    status_override: Option<SessionStatus>,
    not_ready: HashSet<MediaKind>,
    reject_append: HashSet<MediaKind>,
    finalize: FinalizeMode,
}

#[derive(Debug, Default)]
struct Shared {
    log: Mutex<MuxerLog>,
    faults: Mutex<Faults>,
    held: Mutex<Vec<FinalizeNotifier>>,
    live_sessions: AtomicUsize,
    live_tracks: AtomicUsize,
}

impl Shared {
    fn record(&self, event: MuxerEvent) {
        self.log.lock().events.push(event);
    }
}

/// Muxer backend that keeps everything in memory. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryMuxer {
    shared: Arc<Shared>,
}

impl MemoryMuxer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far
    pub fn log(&self) -> MuxerLog {
        self.shared.log.lock().clone()
    }

    /// Session handles currently alive
    pub fn live_sessions(&self) -> usize {
        self.shared.live_sessions.load(Ordering::SeqCst)
    }

    /// Track and adaptor handles currently alive
    pub fn live_tracks(&self) -> usize {
        self.shared.live_tracks.load(Ordering::SeqCst)
    }

    pub fn fail_create_session(&self, fail: bool) {
        self.shared.faults.lock().fail_create = fail;
    }

    pub fn fail_begin_writing(&self, fail: bool) {
        self.shared.faults.lock().fail_begin = fail;
    }

    /// Force the status every session reports, or `None` for the real one
    pub fn override_status(&self, status: Option<SessionStatus>) {
        self.shared.faults.lock().status_override = status;
    }

    pub fn set_ready(&self, kind: MediaKind, ready: bool) {
        let mut faults = self.shared.faults.lock();
        if ready {
            faults.not_ready.remove(&kind);
        } else {
            faults.not_ready.insert(kind);
        }
    }

    pub fn reject_appends(&self, kind: MediaKind, reject: bool) {
        let mut faults = self.shared.faults.lock();
        if reject {
            faults.reject_append.insert(kind);
        } else {
            faults.reject_append.remove(&kind);
        }
    }

    pub fn set_finalize_mode(&self, mode: FinalizeMode) {
        self.shared.faults.lock().finalize = mode;
    }

    /// Complete every finalize held by `FlushOnly` or `Never`
    pub fn release_finalize(&self) {
        let held: Vec<FinalizeNotifier> = self.shared.held.lock().drain(..).collect();
        for notifier in held {
            notifier.complete(Ok(()));
        }
    }
}

impl MuxerService for MemoryMuxer {
    fn create_session(
        &self,
        output: &Path,
        container: ContainerFormat,
    ) -> Result<Box<dyn MuxSession>, MuxerError> {
        if self.shared.faults.lock().fail_create {
            return Err(MuxerError::Session(format!(
                "cannot create session at {}",
                output.display()
            )));
        }

        self.shared.record(MuxerEvent::SessionCreated {
            output: output.to_path_buf(),
            container,
        });
        self.shared.live_sessions.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MemorySession {
            shared: Arc::clone(&self.shared),
            status: SessionStatus::Unknown,
        }))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

struct MemorySession {
    shared: Arc<Shared>,
    status: SessionStatus,
}

impl MemorySession {
    fn new_track(&self, settings: &TrackSettings) -> MemoryTrack {
        self.shared.record(MuxerEvent::TrackAdded(settings.clone()));
        self.shared.live_tracks.fetch_add(1, Ordering::SeqCst);
        MemoryTrack {
            kind: settings.kind,
            shared: Arc::clone(&self.shared),
        }
    }
}

impl MuxSession for MemorySession {
    fn add_track(&mut self, settings: &TrackSettings) -> Result<Box<dyn TrackInput>, MuxerError> {
        if settings.kind == MediaKind::Video {
            return Err(MuxerError::UnsupportedTrack(
                "video tracks are added with add_video_track".to_string(),
            ));
        }
        Ok(Box::new(self.new_track(settings)))
    }

    fn add_video_track(
        &mut self,
        settings: &TrackSettings,
        _attributes: &PixelBufferAttributes,
    ) -> Result<Box<dyn PixelBufferAdaptor>, MuxerError> {
        Ok(Box::new(self.new_track(settings)))
    }

    fn begin_writing(&mut self) -> bool {
        if self.shared.faults.lock().fail_begin {
            self.status = SessionStatus::Failed;
            return false;
        }
        self.shared.record(MuxerEvent::BeganWriting);
        self.status = SessionStatus::Writing;
        true
    }

    fn status(&self) -> SessionStatus {
        self.shared
            .faults
            .lock()
            .status_override
            .unwrap_or(self.status)
    }

    fn anchor_timeline(&mut self, at: Timestamp) {
        self.shared.record(MuxerEvent::Anchored(at));
    }

    fn close_timeline(&mut self, at: Timestamp) {
        self.shared.record(MuxerEvent::Closed(at));
    }

    fn finalize(self: Box<Self>, notifier: FinalizeNotifier) {
        self.shared.record(MuxerEvent::FinalizeRequested);
        let mode = self.shared.faults.lock().finalize;
        debug!("Memory session finalizing ({:?})", mode);

        match mode {
            FinalizeMode::Immediate => notifier.complete(Ok(())),
            FinalizeMode::Delayed(delay) => {
                thread::spawn(move || {
                    thread::sleep(delay / 2);
                    notifier.flushed();
                    thread::sleep(delay / 2);
                    notifier.complete(Ok(()));
                });
            }
            FinalizeMode::FlushOnly => {
                notifier.flushed();
                self.shared.held.lock().push(notifier);
            }
            FinalizeMode::Never => self.shared.held.lock().push(notifier),
            FinalizeMode::Fail => notifier.complete(Err(MuxerError::Session(
                "finalize failed".to_string(),
            ))),
        }
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.shared.live_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

struct MemoryTrack {
    kind: MediaKind,
    shared: Arc<Shared>,
}

impl MemoryTrack {
    fn ready(&self) -> bool {
        !self.shared.faults.lock().not_ready.contains(&self.kind)
    }

    fn accept(&self, time: Timestamp, bytes: usize) -> bool {
        if self.shared.faults.lock().reject_append.contains(&self.kind) {
            return false;
        }
        self.shared.record(MuxerEvent::Appended {
            kind: self.kind,
            time,
            bytes,
        });
        true
    }

    fn finish(&self) {
        self.shared.record(MuxerEvent::TrackFinished(self.kind));
    }
}

impl TrackInput for MemoryTrack {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn is_ready_for_more_data(&self) -> bool {
        self.ready()
    }

    fn append(&mut self, buffer: &AudioBuffer) -> bool {
        self.accept(buffer.presentation_time, buffer.samples.len() * 2)
    }

    fn mark_finished(self: Box<Self>) {
        self.finish();
    }
}

impl PixelBufferAdaptor for MemoryTrack {
    fn is_ready_for_more_data(&self) -> bool {
        self.ready()
    }

    fn append(&mut self, pixels: &PixelReadGuard<'_>, time: Timestamp) -> bool {
        self.accept(time, pixels.bytes().len())
    }

    fn mark_finished(self: Box<Self>) {
        self.finish();
    }
}

impl Drop for MemoryTrack {
    fn drop(&mut self) {
        self.shared.live_tracks.fetch_sub(1, Ordering::SeqCst);
    }
}
