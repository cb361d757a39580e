use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::media::{AudioFormat, ContainerFormat, VideoCodec, WriterSettings};
use crate::writer::WriterOptions;

/// Prefix of environment overrides, e.g. `SESSION_WRITER_VIDEO__FPS=60`
pub const ENV_PREFIX: &str = "SESSION_WRITER";

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub output: OutputConfig,
    pub video: VideoConfig,
    pub audio: AudioConfig,
    pub writer: WriterConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    pub directory: String,
    pub container: ContainerFormat,
}

#[derive(Debug, Deserialize)]
pub struct VideoConfig {
    pub width: u32,
    pub height: u32,
    pub codec: VideoCodec,
    pub fps: u32,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    pub format: AudioFormat,
    pub sample_rate: u32,
    pub channels: u16,
    pub system_audio: bool,
    pub microphone: bool,
}

#[derive(Debug, Deserialize)]
pub struct WriterConfig {
    pub defer_anchor: bool,
    pub block_until_finished: bool,
    pub finalize_timeout_ms: u64,
}

impl Config {
    /// Load configuration from `path` layered over built-in defaults and
    /// under environment overrides. A missing file is an error only when
    /// `required` is set.
    pub fn load(path: &str, required: bool) -> Result<Self> {
        let settings = config::Config::builder()
            .set_default("service.name", "session-writer")?
            .set_default("output.directory", "recordings")?
            .set_default("output.container", "bundle")?
            .set_default("video.width", 1280)?
            .set_default("video.height", 720)?
            .set_default("video.codec", "h264")?
            .set_default("video.fps", 30)?
            .set_default("audio.format", "pcm")?
            .set_default("audio.sample_rate", 48_000)?
            .set_default("audio.channels", 2)?
            .set_default("audio.system_audio", true)?
            .set_default("audio.microphone", false)?
            .set_default("writer.defer_anchor", true)?
            .set_default("writer.block_until_finished", true)?
            .set_default("writer.finalize_timeout_ms", 30_000)?
            .add_source(config::File::with_name(path).required(required))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("Failed to load config from {}", path))?;

        Ok(settings.try_deserialize()?)
    }

    /// Writer construction inputs for a session written to `output`
    pub fn writer_settings(&self, output: impl Into<PathBuf>) -> WriterSettings {
        WriterSettings::new(output, self.video.width, self.video.height)
            .with_codec(self.video.codec)
            .with_audio(
                self.audio.format,
                self.audio.sample_rate,
                self.audio.channels,
            )
            .with_container(self.output.container)
    }

    pub fn writer_options(&self) -> WriterOptions {
        WriterOptions {
            finalize_timeout: Duration::from_millis(self.writer.finalize_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_file() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("missing.toml");

        let cfg = Config::load(&path.to_string_lossy(), false)?;
        assert_eq!(cfg.service.name, "session-writer");
        assert_eq!(cfg.output.container, ContainerFormat::Bundle);
        assert_eq!(cfg.video.fps, 30);
        assert!(cfg.writer.defer_anchor);
        assert_eq!(cfg.writer_options().finalize_timeout, Duration::from_secs(30));

        Ok(())
    }

    #[test]
    fn test_environment_overrides_file() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("writer.toml");
        fs::write(&path, "[output]\ndirectory = \"from-file\"\n")?;

        // Only output.directory is overridden so parallel tests keep their defaults
        std::env::set_var("SESSION_WRITER_OUTPUT__DIRECTORY", "from-env");
        let cfg = Config::load(&path.to_string_lossy(), true);
        std::env::remove_var("SESSION_WRITER_OUTPUT__DIRECTORY");

        assert_eq!(cfg?.output.directory, "from-env");
        Ok(())
    }

    #[test]
    fn test_missing_required_file_fails() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("missing.toml");
        assert!(Config::load(&path.to_string_lossy(), true).is_err());
        Ok(())
    }

    #[test]
    fn test_file_overrides_defaults() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("writer.toml");
        fs::write(
            &path,
            r#"
[video]
width = 1920
height = 1080
codec = "hevc"

[audio]
format = "aac"
sample_rate = 44100
microphone = true

[writer]
finalize_timeout_ms = 500
"#,
        )?;

        let cfg = Config::load(&path.to_string_lossy(), true)?;
        let settings = cfg.writer_settings("out/session-1");
        assert_eq!(settings.width, 1920);
        assert_eq!(settings.height, 1080);
        assert_eq!(settings.codec, VideoCodec::Hevc);
        assert_eq!(settings.audio_format, AudioFormat::Aac);
        assert_eq!(settings.audio_sample_rate, 44_100);
        assert_eq!(settings.audio_channels, 2);
        assert_eq!(settings.container, ContainerFormat::Bundle);
        assert!(cfg.audio.microphone);
        assert_eq!(
            cfg.writer_options().finalize_timeout,
            Duration::from_millis(500)
        );

        Ok(())
    }
}
