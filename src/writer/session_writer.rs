use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

use super::error::{WriterError, WriterResult};
use super::state::{SessionState, WriterStats};
use crate::clock::{Clock, HostClock};
use crate::media::{
    AudioBuffer, MediaKind, PixelBuffer, PixelReadGuard, Timestamp, VideoSample, WriterSettings,
};
use crate::muxer::{
    Completion, FinalizeNotifier, FinalizeSignal, MuxSession, MuxerError, MuxerService,
    PixelBufferAdaptor, SessionStatus, TrackInput,
};

/// Runtime options of a session writer
#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Upper bound on how long `end` waits for the muxer to report back
    pub finalize_timeout: Duration,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            finalize_timeout: Duration::from_secs(30),
        }
    }
}

/// Writes live video, system audio and microphone buffers into one muxed output
///
/// Capture callbacks may call the write methods concurrently from their own
/// threads; every check-then-update runs under a single lock, so ordering and
/// anchoring decisions are atomic. Share the writer through an `Arc`.
pub struct SessionWriter {
    settings: WriterSettings,
    options: WriterOptions,
    muxer: Arc<dyn MuxerService>,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
    /// Completion waits left running by detached `end` calls
    background: Mutex<Vec<JoinHandle<()>>>,
}

struct Inner {
    audio_enabled: bool,
    microphone_enabled: bool,
    start_time: Timestamp,
    last_frame_time: Timestamp,
    stats: WriterStats,
    phase: Phase,
}

impl Inner {
    fn is_running(&self) -> bool {
        matches!(self.phase, Phase::Running(_))
    }
}

enum Phase {
    Idle,
    Running(ActiveSession),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Anchor {
    /// Timeline starts at the first accepted video frame
    Pending,
    Anchored(Timestamp),
}

/// Handles of a running session. Exists only while the writer is running.
struct ActiveSession {
    session: Box<dyn MuxSession>,
    video: Box<dyn PixelBufferAdaptor>,
    audio: Option<Box<dyn TrackInput>>,
    microphone: Option<Box<dyn TrackInput>>,
    anchor: Anchor,
    wrote_video: bool,
}

impl ActiveSession {
    fn is_writable(&self) -> bool {
        self.session.status() == SessionStatus::Writing
    }

    fn anchor_if_pending(&mut self, time: Timestamp) {
        if self.anchor == Anchor::Pending {
            self.session.anchor_timeline(time);
            self.anchor = Anchor::Anchored(time);
            info!("Session timeline anchored at first frame {}", time);
        }
    }

    fn audio_track(&mut self, kind: MediaKind) -> Option<&mut Box<dyn TrackInput>> {
        match kind {
            MediaKind::Audio => self.audio.as_mut(),
            MediaKind::Microphone => self.microphone.as_mut(),
            MediaKind::Video => None,
        }
    }

    /// Finish every track, close the timeline and hand the session to the
    /// muxer for finalization. All handles are gone when this returns.
    fn finish(self, end: Timestamp, notifier: FinalizeNotifier) {
        let ActiveSession {
            mut session,
            video,
            audio,
            microphone,
            ..
        } = self;

        video.mark_finished();
        for track in [audio, microphone].into_iter().flatten() {
            debug!("Finishing {} track", track.kind());
            track.mark_finished();
        }

        session.close_timeline(end);
        session.finalize(notifier);
    }
}

impl SessionWriter {
    /// Create a writer using the monotonic host clock
    pub fn new(settings: WriterSettings, muxer: Arc<dyn MuxerService>) -> Self {
        Self {
            settings,
            options: WriterOptions::default(),
            muxer,
            clock: Arc::new(HostClock::new()),
            inner: Mutex::new(Inner {
                audio_enabled: false,
                microphone_enabled: false,
                start_time: Timestamp::ZERO,
                last_frame_time: Timestamp::ZERO,
                stats: WriterStats::default(),
                phase: Phase::Idle,
            }),
            background: Mutex::new(Vec::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_options(mut self, options: WriterOptions) -> Self {
        self.options = options;
        self
    }

    pub fn settings(&self) -> &WriterSettings {
        &self.settings
    }

    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    /// Snapshot of the current state
    pub fn state(&self) -> SessionState {
        let inner = self.inner.lock();
        SessionState {
            is_running: inner.is_running(),
            start_time: inner.start_time,
            last_frame_time: inner.last_frame_time,
            waiting_for_first_write: matches!(
                &inner.phase,
                Phase::Running(active) if active.anchor == Anchor::Pending
            ),
            audio_enabled: inner.audio_enabled,
            microphone_enabled: inner.microphone_enabled,
        }
    }

    pub fn stats(&self) -> WriterStats {
        self.inner.lock().stats
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().is_running()
    }

    /// Presentation time of the last frame written
    pub fn current_time(&self) -> Timestamp {
        self.inner.lock().last_frame_time
    }

    pub fn audio_enabled(&self) -> bool {
        self.inner.lock().audio_enabled
    }

    /// Enable or disable the system audio track. Ignored while running.
    pub fn set_audio_enabled(&self, enabled: bool) {
        let mut inner = self.inner.lock();
        if inner.is_running() {
            warn!("Audio setting will not be updated as writing has already started");
            return;
        }
        inner.audio_enabled = enabled;
    }

    pub fn microphone_enabled(&self) -> bool {
        self.inner.lock().microphone_enabled
    }

    /// Enable or disable the microphone track. Ignored while running.
    pub fn set_microphone_enabled(&self, enabled: bool) {
        let mut inner = self.inner.lock();
        if inner.is_running() {
            warn!("Microphone setting will not be updated as writing has already started");
            return;
        }
        inner.microphone_enabled = enabled;
    }

    /// Start a new session
    ///
    /// With `defer_anchor` false the output timeline starts at the host time of
    /// this call; with `defer_anchor` true it starts at the first video frame
    /// written, so the output has no blank lead-in.
    pub fn start(&self, defer_anchor: bool) -> WriterResult<()> {
        let mut inner = self.inner.lock();
        if inner.is_running() {
            return Err(WriterError::AlreadyRunning);
        }

        let mut active = self.open_session(inner.audio_enabled, inner.microphone_enabled)?;

        let start_time = self.clock.now();
        if defer_anchor {
            active.anchor = Anchor::Pending;
        } else {
            active.session.anchor_timeline(start_time);
            active.anchor = Anchor::Anchored(start_time);
        }

        info!(
            "Session started on {} muxer at {} (audio: {}, microphone: {}, deferred anchor: {})",
            self.muxer.name(),
            start_time,
            inner.audio_enabled,
            inner.microphone_enabled,
            defer_anchor
        );

        inner.start_time = start_time;
        inner.last_frame_time = Timestamp::ZERO;
        inner.stats = WriterStats::default();
        inner.phase = Phase::Running(active);
        Ok(())
    }

    /// Create the muxing session and its tracks. Handles created before a
    /// failure are dropped on the way out.
    fn open_session(&self, audio: bool, microphone: bool) -> WriterResult<ActiveSession> {
        let mut session = self
            .muxer
            .create_session(&self.settings.output, self.settings.container)
            .map_err(start_failure)?;

        let video = session
            .add_video_track(
                &self.settings.track_settings(MediaKind::Video),
                &self.settings.pixel_buffer_attributes(),
            )
            .map_err(start_failure)?;

        let audio = if audio {
            Some(
                session
                    .add_track(&self.settings.track_settings(MediaKind::Audio))
                    .map_err(start_failure)?,
            )
        } else {
            None
        };

        let microphone = if microphone {
            Some(
                session
                    .add_track(&self.settings.track_settings(MediaKind::Microphone))
                    .map_err(start_failure)?,
            )
        } else {
            None
        };

        if !session.begin_writing() {
            let reason = format!(
                "{} muxer could not begin writing (status {:?})",
                self.muxer.name(),
                session.status()
            );
            error!("Failed to start session: {}", reason);
            return Err(WriterError::FailedToStart { reason });
        }

        Ok(ActiveSession {
            session,
            video,
            audio,
            microphone,
            anchor: Anchor::Pending,
            wrote_video: false,
        })
    }

    /// Write a video frame at `time`
    ///
    /// After the first frame of a session, each frame must be strictly later
    /// than the previous one.
    pub fn write_video_frame(&self, buffer: &PixelBuffer, time: Timestamp) -> WriterResult<()> {
        let pixels = buffer.lock_read();
        self.append_video(&pixels, time)
    }

    /// Write a captured video sample at its embedded presentation time.
    /// Samples without an image are skipped.
    pub fn write_video_sample(&self, sample: &VideoSample) -> WriterResult<()> {
        let Some(image) = &sample.image else {
            trace!("Skipping video sample without image at {}", sample.presentation_time);
            return Ok(());
        };

        let pixels = image.lock_read();
        self.append_video(&pixels, sample.presentation_time)
    }

    fn append_video(&self, pixels: &PixelReadGuard<'_>, time: Timestamp) -> WriterResult<()> {
        let mut inner = self.inner.lock();
        let Inner {
            phase,
            last_frame_time,
            stats,
            ..
        } = &mut *inner;

        let active = match phase {
            Phase::Running(active) if active.is_writable() => active,
            _ => return Err(WriterError::NotStarted),
        };

        let in_order = if active.wrote_video {
            time > *last_frame_time
        } else {
            time >= *last_frame_time
        };
        if !in_order {
            debug!("Rejecting video frame at {} (last frame at {})", time, last_frame_time);
            return Err(WriterError::InvalidTime {
                time,
                last: *last_frame_time,
            });
        }

        active.anchor_if_pending(time);

        if !active.video.is_ready_for_more_data() {
            stats.backpressure_rejections += 1;
            return Err(WriterError::NotReadyForMoreData);
        }

        if !active.video.append(pixels, time) {
            stats.append_failures += 1;
            warn!("Video track rejected frame at {}", time);
            return Err(WriterError::FailedToAppendBuffer);
        }

        *last_frame_time = time;
        active.wrote_video = true;
        stats.video_frames_written += 1;
        Ok(())
    }

    /// Write a system audio buffer
    pub fn write_audio(&self, buffer: &AudioBuffer) -> WriterResult<()> {
        self.append_audio(MediaKind::Audio, buffer)
    }

    /// Write a microphone buffer
    pub fn write_microphone(&self, buffer: &AudioBuffer) -> WriterResult<()> {
        self.append_audio(MediaKind::Microphone, buffer)
    }

    fn append_audio(&self, kind: MediaKind, buffer: &AudioBuffer) -> WriterResult<()> {
        let mut inner = self.inner.lock();
        let enabled = match kind {
            MediaKind::Audio => inner.audio_enabled,
            MediaKind::Microphone => inner.microphone_enabled,
            MediaKind::Video => false,
        };
        let Inner { phase, stats, .. } = &mut *inner;

        let active = match phase {
            Phase::Running(active) if enabled && active.is_writable() => active,
            _ => return Err(WriterError::NotStarted),
        };

        // Audio cannot anchor the timeline; drop it until video does.
        let pending = active.anchor == Anchor::Pending;
        let Some(track) = active.audio_track(kind) else {
            return Err(WriterError::NotStarted);
        };
        if pending {
            stats.dropped_before_anchor += 1;
            trace!("Dropping {} buffer at {} before anchor", kind, buffer.presentation_time);
            return Ok(());
        }

        if !track.is_ready_for_more_data() {
            stats.backpressure_rejections += 1;
            return Err(WriterError::NotReadyForMoreData);
        }

        if !track.append(buffer) {
            stats.append_failures += 1;
            warn!("{} track rejected buffer at {}", kind, buffer.presentation_time);
            return Err(WriterError::FailedToAppendBuffer);
        }

        match kind {
            MediaKind::Microphone => stats.microphone_buffers_written += 1,
            _ => stats.audio_buffers_written += 1,
        }
        Ok(())
    }

    /// End the session at `time`
    ///
    /// Does nothing if no session is running. `time` must not precede the last
    /// frame written. The writer is idle again as soon as finalization has been
    /// dispatched; the caller then waits, bounded by
    /// [`WriterOptions::finalize_timeout`]:
    /// - `block_until_finished = true`: until the output is fully finalized
    /// - `block_until_finished = false`: until the muxer's first notification;
    ///   completion continues in the background
    pub fn end(&self, time: Timestamp, block_until_finished: bool) -> WriterResult<()> {
        let signal = FinalizeSignal::new();

        {
            let mut inner = self.inner.lock();
            let active = match std::mem::replace(&mut inner.phase, Phase::Idle) {
                Phase::Idle => {
                    debug!("End requested with no running session");
                    return Ok(());
                }
                Phase::Running(active) => active,
            };

            if time < inner.last_frame_time {
                let last = inner.last_frame_time;
                inner.phase = Phase::Running(active);
                return Err(WriterError::InvalidTime { time, last });
            }

            active.finish(time, signal.notifier());
            info!(
                "Session ended at {} ({} video frames, {} audio, {} microphone buffers)",
                time,
                inner.stats.video_frames_written,
                inner.stats.audio_buffers_written,
                inner.stats.microphone_buffers_written
            );
        }

        if block_until_finished {
            self.wait_until_finished(&signal)
        } else {
            self.wait_until_flushed(signal)
        }
    }

    fn wait_until_finished(&self, signal: &FinalizeSignal) -> WriterResult<()> {
        let timeout = self.options.finalize_timeout;
        match signal.wait_complete(timeout) {
            Completion::Finished(Ok(())) => {
                info!("Finalization complete");
                Ok(())
            }
            Completion::Finished(Err(e)) => {
                error!("Finalization failed: {}", e);
                Err(finalize_failure(e))
            }
            Completion::TimedOut => {
                error!("Finalization did not complete within {:?}", timeout);
                Err(WriterError::FinalizeTimeout { waited: timeout })
            }
        }
    }

    fn wait_until_flushed(&self, signal: FinalizeSignal) -> WriterResult<()> {
        let timeout = self.options.finalize_timeout;
        if !signal.wait_flushed(timeout) {
            error!("Finalization did not report back within {:?}", timeout);
            return Err(WriterError::FinalizeTimeout { waited: timeout });
        }

        if signal.is_complete() {
            return match signal.wait_complete(Duration::ZERO) {
                Completion::Finished(Err(e)) => {
                    error!("Finalization failed: {}", e);
                    Err(finalize_failure(e))
                }
                _ => Ok(()),
            };
        }

        debug!("Finalization continuing in background");
        let handle = thread::spawn(move || match signal.wait_complete(timeout) {
            Completion::Finished(Ok(())) => info!("Background finalization complete"),
            Completion::Finished(Err(e)) => error!("Background finalization failed: {}", e),
            Completion::TimedOut => {
                warn!("Background finalization still pending after {:?}", timeout)
            }
        });

        let mut background = self.background.lock();
        background.retain(|h| !h.is_finished());
        background.push(handle);
        Ok(())
    }

    /// Block until every finalization left running by a detached `end` has
    /// completed or hit the finalize timeout. Call before process exit so
    /// the output is not cut short.
    pub fn wait_for_background_finalize(&self) {
        let handles: Vec<JoinHandle<()>> = self.background.lock().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                warn!("Background finalization thread panicked");
            }
        }
    }
}

impl Drop for SessionWriter {
    fn drop(&mut self) {
        if self.inner.get_mut().is_running() {
            warn!("Session writer dropped while running; output was not finalized");
        }
    }
}

fn start_failure(e: MuxerError) -> WriterError {
    error!("Failed to start session: {}", e);
    WriterError::FailedToStart {
        reason: e.to_string(),
    }
}

fn finalize_failure(e: MuxerError) -> WriterError {
    WriterError::FailedToFinalize {
        reason: e.to_string(),
    }
}
