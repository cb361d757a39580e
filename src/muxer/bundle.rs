//! Directory bundle muxer
//!
//! Writes one session as a directory:
//! - video.raw: concatenated raw frames as received from the adaptor
//! - audio.wav / microphone.wav: 16-bit PCM per audio track
//! - manifest.json: session metadata, timeline bounds and a per-frame index
//!
//! Finalization runs on a background thread and reports `flushed` once the
//! media files are closed, then `complete` once the manifest is written.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::backend::{
    MuxSession, MuxerError, MuxerService, PixelBufferAdaptor, SessionStatus, TrackInput,
};
use super::finalize::FinalizeNotifier;
use crate::media::{
    AudioBuffer, AudioSettings, ContainerFormat, MediaKind, PixelBufferAttributes, PixelReadGuard,
    Timestamp, TrackEncoding, TrackSettings,
};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const VIDEO_FILE: &str = "video.raw";

fn audio_file_name(kind: MediaKind) -> String {
    format!("{}.wav", kind)
}

/// Contents of `manifest.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleManifest {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub finalized_at: DateTime<Utc>,
    /// Output timeline zero-point
    pub anchor: Option<Timestamp>,
    /// Output timeline end
    pub end: Option<Timestamp>,
    pub tracks: Vec<TrackManifest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackManifest {
    pub kind: MediaKind,
    pub file: String,
    /// Requested encoding, e.g. "H.264 1920x1080" or "AAC 48000Hz 2ch"
    pub encoding: String,
    pub buffers: usize,
    pub first_time: Option<Timestamp>,
    pub last_time: Option<Timestamp>,
    /// Per-frame index into video.raw (video track only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frames: Vec<FrameEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameEntry {
    pub time: Timestamp,
    pub offset: u64,
    pub len: u64,
}

impl BundleManifest {
    /// Read the manifest of a finalized bundle
    pub fn read(bundle_dir: &Path) -> Result<Self, MuxerError> {
        let content = fs::read_to_string(bundle_dir.join(MANIFEST_FILE))?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn track(&self, kind: MediaKind) -> Option<&TrackManifest> {
        self.tracks.iter().find(|t| t.kind == kind)
    }
}

/// Muxer backend writing directory bundles
#[derive(Debug, Clone, Default)]
pub struct BundleMuxer;

impl BundleMuxer {
    pub fn new() -> Self {
        Self
    }
}

impl MuxerService for BundleMuxer {
    fn create_session(
        &self,
        output: &Path,
        container: ContainerFormat,
    ) -> Result<Box<dyn MuxSession>, MuxerError> {
        if container != ContainerFormat::Bundle {
            return Err(MuxerError::UnsupportedContainer(container));
        }

        fs::create_dir_all(output)?;
        let session_id = Uuid::new_v4();
        info!("Bundle session {} created at {}", session_id, output.display());

        Ok(Box::new(BundleSession {
            state: Arc::new(Mutex::new(BundleState {
                dir: output.to_path_buf(),
                session_id,
                created_at: Utc::now(),
                status: SessionStatus::Unknown,
                anchor: None,
                end: None,
                video: None,
                audio: BTreeMap::new(),
            })),
        }))
    }

    fn name(&self) -> &str {
        "bundle"
    }
}

#[derive(Debug, Default)]
struct TrackSummary {
    encoding: String,
    buffers: usize,
    first_time: Option<Timestamp>,
    last_time: Option<Timestamp>,
    finished: bool,
}

impl TrackSummary {
    fn new(encoding: String) -> Self {
        Self {
            encoding,
            ..Default::default()
        }
    }

    fn record(&mut self, time: Timestamp) {
        self.buffers += 1;
        self.first_time.get_or_insert(time);
        self.last_time = Some(time);
    }
}

struct VideoFile {
    writer: BufWriter<File>,
    attributes: PixelBufferAttributes,
    offset: u64,
    frames: Vec<FrameEntry>,
    summary: TrackSummary,
}

struct AudioFile {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    settings: AudioSettings,
    summary: TrackSummary,
}

struct BundleState {
    dir: PathBuf,
    session_id: Uuid,
    created_at: DateTime<Utc>,
    status: SessionStatus,
    anchor: Option<Timestamp>,
    end: Option<Timestamp>,
    video: Option<VideoFile>,
    audio: BTreeMap<MediaKind, AudioFile>,
}

impl BundleState {
    fn accepting(&self) -> bool {
        self.status == SessionStatus::Writing
    }

    /// Close every media file. Safe to call more than once.
    fn flush(&mut self) -> Result<(), MuxerError> {
        if let Some(video) = &mut self.video {
            video.writer.flush()?;
        }
        for file in self.audio.values_mut() {
            if let Some(writer) = file.writer.take() {
                writer.finalize()?;
            }
        }
        Ok(())
    }

    fn manifest(&self) -> BundleManifest {
        let mut tracks = Vec::new();

        if let Some(video) = &self.video {
            tracks.push(TrackManifest {
                kind: MediaKind::Video,
                file: VIDEO_FILE.to_string(),
                encoding: video.summary.encoding.clone(),
                buffers: video.summary.buffers,
                first_time: video.summary.first_time,
                last_time: video.summary.last_time,
                frames: video.frames.clone(),
            });
        }

        for (kind, file) in &self.audio {
            tracks.push(TrackManifest {
                kind: *kind,
                file: audio_file_name(*kind),
                encoding: file.summary.encoding.clone(),
                buffers: file.summary.buffers,
                first_time: file.summary.first_time,
                last_time: file.summary.last_time,
                frames: Vec::new(),
            });
        }

        BundleManifest {
            session_id: self.session_id,
            created_at: self.created_at,
            finalized_at: Utc::now(),
            anchor: self.anchor,
            end: self.end,
            tracks,
        }
    }

    fn write_manifest(&self) -> Result<(), MuxerError> {
        let manifest = self.manifest();
        let json = serde_json::to_string_pretty(&manifest)?;
        fs::write(self.dir.join(MANIFEST_FILE), json)?;
        Ok(())
    }
}

struct BundleSession {
    state: Arc<Mutex<BundleState>>,
}

impl MuxSession for BundleSession {
    fn add_track(&mut self, settings: &TrackSettings) -> Result<Box<dyn TrackInput>, MuxerError> {
        let audio = match (&settings.kind, &settings.encoding) {
            (MediaKind::Audio | MediaKind::Microphone, TrackEncoding::Audio(audio)) => audio,
            _ => {
                return Err(MuxerError::UnsupportedTrack(format!(
                    "{} track with {:?}",
                    settings.kind, settings.encoding
                )))
            }
        };

        let mut state = self.state.lock();
        if state.audio.contains_key(&settings.kind) {
            return Err(MuxerError::UnsupportedTrack(format!(
                "duplicate {} track",
                settings.kind
            )));
        }

        let spec = hound::WavSpec {
            channels: audio.channels,
            sample_rate: audio.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let path = state.dir.join(audio_file_name(settings.kind));
        let writer = hound::WavWriter::create(&path, spec)?;
        debug!("Bundle {} track writing to {}", settings.kind, path.display());

        state.audio.insert(
            settings.kind,
            AudioFile {
                writer: Some(writer),
                settings: audio.clone(),
                summary: TrackSummary::new(format!(
                    "{} {}Hz {}ch",
                    audio.format, audio.sample_rate, audio.channels
                )),
            },
        );

        Ok(Box::new(BundleAudioTrack {
            kind: settings.kind,
            state: Arc::clone(&self.state),
        }))
    }

    fn add_video_track(
        &mut self,
        settings: &TrackSettings,
        attributes: &PixelBufferAttributes,
    ) -> Result<Box<dyn PixelBufferAdaptor>, MuxerError> {
        let video = match &settings.encoding {
            TrackEncoding::Video(video) if settings.kind == MediaKind::Video => video,
            _ => {
                return Err(MuxerError::UnsupportedTrack(format!(
                    "{} track is not video",
                    settings.kind
                )))
            }
        };

        let mut state = self.state.lock();
        if state.video.is_some() {
            return Err(MuxerError::UnsupportedTrack(
                "duplicate video track".to_string(),
            ));
        }

        let file = File::create(state.dir.join(VIDEO_FILE))?;
        state.video = Some(VideoFile {
            writer: BufWriter::new(file),
            attributes: attributes.clone(),
            offset: 0,
            frames: Vec::new(),
            summary: TrackSummary::new(format!(
                "{} {}x{}",
                video.codec, video.width, video.height
            )),
        });

        Ok(Box::new(BundleVideoTrack {
            state: Arc::clone(&self.state),
        }))
    }

    fn begin_writing(&mut self) -> bool {
        let mut state = self.state.lock();
        if state.video.is_none() && state.audio.is_empty() {
            warn!("Bundle session {} has no tracks", state.session_id);
            state.status = SessionStatus::Failed;
            return false;
        }
        state.status = SessionStatus::Writing;
        true
    }

    fn status(&self) -> SessionStatus {
        self.state.lock().status
    }

    fn anchor_timeline(&mut self, at: Timestamp) {
        self.state.lock().anchor = Some(at);
    }

    fn close_timeline(&mut self, at: Timestamp) {
        self.state.lock().end = Some(at);
    }

    fn finalize(self: Box<Self>, notifier: FinalizeNotifier) {
        let state = Arc::clone(&self.state);

        thread::spawn(move || {
            let mut state = state.lock();

            if let Err(e) = state.flush() {
                error!("Failed to flush bundle {}: {}", state.dir.display(), e);
                state.status = SessionStatus::Failed;
                notifier.complete(Err(e));
                return;
            }
            notifier.flushed();

            let outcome = state.write_manifest();
            state.status = match &outcome {
                Ok(()) => SessionStatus::Completed,
                Err(_) => SessionStatus::Failed,
            };
            info!(
                "Bundle session {} finalized ({:?})",
                state.session_id, state.status
            );
            notifier.complete(outcome);
        });
    }
}

struct BundleVideoTrack {
    state: Arc<Mutex<BundleState>>,
}

impl PixelBufferAdaptor for BundleVideoTrack {
    fn is_ready_for_more_data(&self) -> bool {
        let state = self.state.lock();
        state.accepting() && state.video.as_ref().is_some_and(|v| !v.summary.finished)
    }

    fn append(&mut self, pixels: &PixelReadGuard<'_>, time: Timestamp) -> bool {
        let mut state = self.state.lock();
        if !state.accepting() {
            return false;
        }
        let Some(video) = state.video.as_mut() else {
            return false;
        };
        if video.summary.finished {
            return false;
        }
        if pixels.width() != video.attributes.width || pixels.height() != video.attributes.height
        {
            warn!(
                "Rejecting {}x{} frame for {}x{} video track",
                pixels.width(),
                pixels.height(),
                video.attributes.width,
                video.attributes.height
            );
            return false;
        }

        let bytes = pixels.bytes();
        if let Err(e) = video.writer.write_all(bytes) {
            error!("Failed to write video frame: {}", e);
            return false;
        }

        video.frames.push(FrameEntry {
            time,
            offset: video.offset,
            len: bytes.len() as u64,
        });
        video.offset += bytes.len() as u64;
        video.summary.record(time);
        true
    }

    fn mark_finished(self: Box<Self>) {
        if let Some(video) = self.state.lock().video.as_mut() {
            video.summary.finished = true;
        }
    }
}

struct BundleAudioTrack {
    kind: MediaKind,
    state: Arc<Mutex<BundleState>>,
}

impl TrackInput for BundleAudioTrack {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn is_ready_for_more_data(&self) -> bool {
        let state = self.state.lock();
        state.accepting()
            && state
                .audio
                .get(&self.kind)
                .is_some_and(|file| !file.summary.finished)
    }

    fn append(&mut self, buffer: &AudioBuffer) -> bool {
        let mut state = self.state.lock();
        if !state.accepting() {
            return false;
        }
        let Some(file) = state.audio.get_mut(&self.kind) else {
            return false;
        };
        if file.summary.finished {
            return false;
        }
        if buffer.sample_rate != file.settings.sample_rate
            || buffer.channels != file.settings.channels
        {
            warn!(
                "Rejecting {}Hz {}ch buffer for {} track ({}Hz {}ch)",
                buffer.sample_rate,
                buffer.channels,
                self.kind,
                file.settings.sample_rate,
                file.settings.channels
            );
            return false;
        }
        if buffer.frame_count() * buffer.channels as usize != buffer.samples.len() {
            warn!(
                "Rejecting {} buffer with a partial frame ({} samples, {}ch)",
                self.kind,
                buffer.samples.len(),
                buffer.channels
            );
            return false;
        }
        let Some(writer) = file.writer.as_mut() else {
            return false;
        };

        for &sample in &buffer.samples {
            if let Err(e) = writer.write_sample(sample) {
                error!("Failed to write {} sample: {}", self.kind, e);
                return false;
            }
        }
        file.summary.record(buffer.presentation_time);
        true
    }

    fn mark_finished(self: Box<Self>) {
        if let Some(file) = self.state.lock().audio.get_mut(&self.kind) {
            file.summary.finished = true;
        }
    }
}
