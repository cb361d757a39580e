use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::buffer::PixelFormat;

/// Video codec requested from the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    H264,
    Hevc,
    ProRes,
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoCodec::H264 => write!(f, "H.264"),
            VideoCodec::Hevc => write!(f, "HEVC"),
            VideoCodec::ProRes => write!(f, "ProRes"),
        }
    }
}

impl std::str::FromStr for VideoCodec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "h264" | "h.264" | "avc" => Ok(VideoCodec::H264),
            "hevc" | "h265" | "h.265" => Ok(VideoCodec::Hevc),
            "prores" => Ok(VideoCodec::ProRes),
            _ => Err(format!("Unknown video codec: {}", s)),
        }
    }
}

/// Audio format requested from the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Aac,
    Opus,
    /// Uncompressed 16-bit linear PCM
    Pcm,
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioFormat::Aac => write!(f, "AAC"),
            AudioFormat::Opus => write!(f, "Opus"),
            AudioFormat::Pcm => write!(f, "PCM"),
        }
    }
}

impl std::str::FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "aac" => Ok(AudioFormat::Aac),
            "opus" => Ok(AudioFormat::Opus),
            "pcm" | "lpcm" => Ok(AudioFormat::Pcm),
            _ => Err(format!("Unknown audio format: {}", s)),
        }
    }
}

/// Output container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    Mp4,
    QuickTime,
    /// Directory of per-track files plus a manifest
    Bundle,
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerFormat::Mp4 => write!(f, "mp4"),
            ContainerFormat::QuickTime => write!(f, "mov"),
            ContainerFormat::Bundle => write!(f, "bundle"),
        }
    }
}

impl std::str::FromStr for ContainerFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mp4" => Ok(ContainerFormat::Mp4),
            "mov" | "quicktime" => Ok(ContainerFormat::QuickTime),
            "bundle" => Ok(ContainerFormat::Bundle),
            _ => Err(format!("Unknown container format: {}", s)),
        }
    }
}

/// Media kind of a track within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    /// System audio
    Audio,
    Microphone,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Video => write!(f, "video"),
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Microphone => write!(f, "microphone"),
        }
    }
}

/// Encoder settings for the video track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoSettings {
    pub codec: VideoCodec,
    pub width: u32,
    pub height: u32,
}

/// Encoder settings for an audio track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioSettings {
    pub format: AudioFormat,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Source pixel layout the video adaptor converts from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PixelBufferAttributes {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
}

/// Per-track settings handed to the muxer when a track is added
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSettings {
    pub kind: MediaKind,
    pub encoding: TrackEncoding,
    /// Tracks fed from live capture ask the encoder to favor latency
    pub expects_real_time: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrackEncoding {
    Video(VideoSettings),
    Audio(AudioSettings),
}

/// Construction inputs of a session writer. Fixed for the writer's lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriterSettings {
    /// Output location handed to the muxer
    pub output: PathBuf,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    pub codec: VideoCodec,
    pub audio_format: AudioFormat,
    pub audio_sample_rate: u32,
    pub audio_channels: u16,
    pub container: ContainerFormat,
}

impl WriterSettings {
    pub fn new(output: impl Into<PathBuf>, width: u32, height: u32) -> Self {
        Self {
            output: output.into(),
            width,
            height,
            codec: VideoCodec::H264,
            audio_format: AudioFormat::Aac,
            audio_sample_rate: 44_100,
            audio_channels: 2,
            container: ContainerFormat::Mp4,
        }
    }

    pub fn with_codec(mut self, codec: VideoCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_audio(mut self, format: AudioFormat, sample_rate: u32, channels: u16) -> Self {
        self.audio_format = format;
        self.audio_sample_rate = sample_rate;
        self.audio_channels = channels;
        self
    }

    pub fn with_container(mut self, container: ContainerFormat) -> Self {
        self.container = container;
        self
    }

    pub fn video_settings(&self) -> VideoSettings {
        VideoSettings {
            codec: self.codec,
            width: self.width,
            height: self.height,
        }
    }

    pub fn pixel_buffer_attributes(&self) -> PixelBufferAttributes {
        PixelBufferAttributes {
            format: PixelFormat::Argb32,
            width: self.width,
            height: self.height,
        }
    }

    pub fn audio_settings(&self) -> AudioSettings {
        AudioSettings {
            format: self.audio_format,
            sample_rate: self.audio_sample_rate,
            channels: self.audio_channels,
        }
    }

    /// Track settings for `kind`, as handed to the muxer in `start`
    pub fn track_settings(&self, kind: MediaKind) -> TrackSettings {
        let encoding = match kind {
            MediaKind::Video => TrackEncoding::Video(self.video_settings()),
            MediaKind::Audio | MediaKind::Microphone => TrackEncoding::Audio(self.audio_settings()),
        };
        TrackSettings {
            kind,
            encoding,
            expects_real_time: true,
        }
    }
}
