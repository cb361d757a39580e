use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use session_writer::{
    AudioBuffer, BundleMuxer, Clock, Config, HostClock, MediaKind, PixelBuffer, PixelFormat,
    SessionWriter, VideoSample, WriterError, WriterResult,
};
use std::f32::consts::TAU;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Duration};
use tracing::{debug, info, warn};

const DEFAULT_CONFIG: &str = "config/session-writer";

/// Audio callback period
const AUDIO_PERIOD_MS: u64 = 20;

/// Frame rates outside this range are clamped
const MAX_FPS: u32 = 1000;

/// Camera-style warm-up before the first video frame arrives
const VIDEO_WARMUP_MS: u64 = 200;

/// Record synthetic video, system audio and microphone sources into one session
#[derive(Parser, Debug)]
#[command(name = "session-writer", version)]
struct Args {
    /// Config file (defaults to config/session-writer.toml if present)
    #[arg(short, long)]
    config: Option<String>,

    /// Output location (defaults to a timestamped directory under output.directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Recording length in seconds
    #[arg(short, long, default_value_t = 5)]
    duration_secs: u64,

    /// Video frame rate
    #[arg(long)]
    fps: Option<u32>,

    /// Record system audio (true/false)
    #[arg(long)]
    system_audio: Option<bool>,

    /// Record microphone audio (true/false)
    #[arg(long)]
    microphone: Option<bool>,

    /// Anchor the timeline at the first video frame instead of at start (true/false)
    #[arg(long)]
    defer_anchor: Option<bool>,

    /// Return once finalization is underway instead of waiting for it
    #[arg(long)]
    detach: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let cfg = match &args.config {
        Some(path) => Config::load(path, true)?,
        None => Config::load(DEFAULT_CONFIG, false)?,
    };

    let output = args.output.clone().unwrap_or_else(|| {
        PathBuf::from(&cfg.output.directory)
            .join(format!("session-{}", Utc::now().format("%Y%m%d-%H%M%S")))
    });
    let fps = clamp_fps(args.fps.unwrap_or(cfg.video.fps));
    let system_audio = args.system_audio.unwrap_or(cfg.audio.system_audio);
    let microphone = args.microphone.unwrap_or(cfg.audio.microphone);
    let defer_anchor = args.defer_anchor.unwrap_or(cfg.writer.defer_anchor);
    let block_until_finished = !args.detach && cfg.writer.block_until_finished;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!("Output: {} ({})", output.display(), cfg.output.container);
    info!(
        "Video: {}x{} {} @ {} fps",
        cfg.video.width, cfg.video.height, cfg.video.codec, fps
    );

    let clock = Arc::new(HostClock::new());
    let writer = Arc::new(
        SessionWriter::new(cfg.writer_settings(&output), Arc::new(BundleMuxer::new()))
            .with_clock(clock.clone())
            .with_options(cfg.writer_options()),
    );
    let settings = writer.settings();
    debug!(
        "Finalize timeout {:?}, block until finished: {}",
        writer.options().finalize_timeout,
        block_until_finished
    );
    writer.set_audio_enabled(system_audio);
    writer.set_microphone_enabled(microphone);

    writer.start(defer_anchor).context("Failed to start session")?;

    let running = Arc::new(AtomicBool::new(true));
    let mut producers: Vec<JoinHandle<()>> = Vec::new();

    producers.push(tokio::spawn(video_producer(
        Arc::clone(&writer),
        clock.clone(),
        Arc::clone(&running),
        settings.width,
        settings.height,
        fps,
    )));

    if system_audio {
        producers.push(tokio::spawn(audio_producer(
            MediaKind::Audio,
            Arc::clone(&writer),
            clock.clone(),
            Arc::clone(&running),
            settings.audio_sample_rate,
            settings.audio_channels,
            440.0,
        )));
    }

    if microphone {
        producers.push(tokio::spawn(audio_producer(
            MediaKind::Microphone,
            Arc::clone(&writer),
            clock.clone(),
            Arc::clone(&running),
            settings.audio_sample_rate,
            settings.audio_channels,
            660.0,
        )));
    }

    info!("Recording for {} seconds...", args.duration_secs);
    sleep(Duration::from_secs(args.duration_secs)).await;

    running.store(false, Ordering::SeqCst);
    for producer in producers {
        if let Err(e) = producer.await {
            warn!("Producer task panicked: {}", e);
        }
    }

    // End at the later of now and the last frame so the close time is valid.
    let end_time = clock.now().max(writer.current_time());
    let end_writer = Arc::clone(&writer);
    tokio::task::spawn_blocking(move || end_writer.end(end_time, block_until_finished))
        .await?
        .context("Failed to end session")?;

    let summary = serde_json::json!({
        "output": output,
        "state": writer.state(),
        "stats": writer.stats(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    // Detached finalization must still finish before the process exits
    if !block_until_finished {
        let bg_writer = Arc::clone(&writer);
        tokio::task::spawn_blocking(move || bg_writer.wait_for_background_finalize()).await?;
    }

    Ok(())
}

/// Handle one write result. Returns false once the session is gone.
fn report(kind: MediaKind, result: WriterResult<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(WriterError::NotReadyForMoreData) => {
            debug!("{} track not ready, dropping buffer", kind);
            true
        }
        Err(WriterError::NotStarted) => false,
        Err(e) => {
            warn!("{} write failed: {}", kind, e);
            true
        }
    }
}

async fn video_producer(
    writer: Arc<SessionWriter>,
    clock: Arc<HostClock>,
    running: Arc<AtomicBool>,
    width: u32,
    height: u32,
    fps: u32,
) {
    sleep(Duration::from_millis(VIDEO_WARMUP_MS)).await;

    let mut ticker = interval(frame_period(fps));
    let mut frame_index: u32 = 0;

    while running.load(Ordering::SeqCst) {
        ticker.tick().await;

        let frame = gradient_frame(width, height, frame_index);
        let sample = VideoSample::new(frame, clock.now());
        if !report(MediaKind::Video, writer.write_video_sample(&sample)) {
            break;
        }
        frame_index = frame_index.wrapping_add(1);
    }

    info!("Video producer stopped after {} frames", frame_index);
}

async fn audio_producer(
    kind: MediaKind,
    writer: Arc<SessionWriter>,
    clock: Arc<HostClock>,
    running: Arc<AtomicBool>,
    sample_rate: u32,
    channels: u16,
    tone_hz: f32,
) {
    let frames_per_buffer = (sample_rate as u64 * AUDIO_PERIOD_MS / 1000) as usize;
    let mut ticker = interval(Duration::from_millis(AUDIO_PERIOD_MS));
    let mut phase: f32 = 0.0;
    let step = TAU * tone_hz / sample_rate as f32;

    while running.load(Ordering::SeqCst) {
        ticker.tick().await;

        let mut samples = Vec::with_capacity(frames_per_buffer * channels as usize);
        for _ in 0..frames_per_buffer {
            let value = (phase.sin() * 0.2 * i16::MAX as f32) as i16;
            samples.extend(std::iter::repeat(value).take(channels as usize));
            phase = (phase + step) % TAU;
        }

        let buffer = AudioBuffer {
            samples,
            sample_rate,
            channels,
            presentation_time: clock.now(),
        };
        let result = match kind {
            MediaKind::Microphone => writer.write_microphone(&buffer),
            _ => writer.write_audio(&buffer),
        };
        if !report(kind, result) {
            break;
        }
    }

    info!("{} producer stopped", kind);
}

/// ARGB frame with a horizontal gradient that scrolls each frame
fn gradient_frame(width: u32, height: u32, frame_index: u32) -> PixelBuffer {
    let buffer = PixelBuffer::new(width, height, PixelFormat::Argb32);
    {
        let mut pixels = buffer.lock_write();
        let row_bytes = buffer.bytes_per_row();
        for y in 0..height as usize {
            for x in 0..width as usize {
                let offset = y * row_bytes + x * 4;
                let shade = ((x as u32 + frame_index * 4) % 256) as u8;
                pixels[offset] = 0xff;
                pixels[offset + 1] = shade;
                pixels[offset + 2] = (y % 256) as u8;
                pixels[offset + 3] = 0xff - shade;
            }
        }
    }
    buffer
}

fn clamp_fps(fps: u32) -> u32 {
    fps.clamp(1, MAX_FPS)
}

/// Interval between video frames. Never zero, which `interval` rejects.
fn frame_period(fps: u32) -> Duration {
    Duration::from_secs(1) / clamp_fps(fps)
}
