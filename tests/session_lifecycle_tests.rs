// Integration tests for session lifecycle
//
// These tests verify start/end transitions, configuration locking and that
// every muxer handle is released when a session ends or fails to start.

use anyhow::Result;
use session_writer::media::{MediaKind, PixelBuffer, PixelFormat, Timestamp, WriterSettings};
use session_writer::muxer::MemoryMuxer;
use session_writer::{AudioBuffer, ManualClock, SessionState, SessionWriter, WriterError};
use std::sync::Arc;

fn setup() -> (SessionWriter, MemoryMuxer, ManualClock) {
    let muxer = MemoryMuxer::new();
    let clock = ManualClock::new(Timestamp::from_seconds(100));
    let writer = SessionWriter::new(
        WriterSettings::new("recordings/out.mp4", 4, 4),
        Arc::new(muxer.clone()),
    )
    .with_clock(Arc::new(clock.clone()));
    (writer, muxer, clock)
}

fn frame() -> PixelBuffer {
    PixelBuffer::new(4, 4, PixelFormat::Argb32)
}

fn audio_buffer(time: Timestamp) -> AudioBuffer {
    AudioBuffer {
        samples: vec![0i16; 882],
        sample_rate: 44_100,
        channels: 2,
        presentation_time: time,
    }
}

#[test]
fn test_initial_state() {
    let (writer, muxer, _clock) = setup();

    assert_eq!(writer.state(), SessionState::default());
    assert!(!writer.is_running());
    assert_eq!(writer.current_time(), Timestamp::ZERO);
    assert_eq!(muxer.log().sessions_created(), 0);
}

#[test]
fn test_start_twice_is_rejected() -> Result<()> {
    let (writer, muxer, _clock) = setup();

    writer.start(false)?;
    assert_eq!(writer.start(false), Err(WriterError::AlreadyRunning));
    assert_eq!(writer.start(true), Err(WriterError::AlreadyRunning));

    assert!(writer.is_running(), "Writer should still be running");
    assert_eq!(muxer.log().sessions_created(), 1);
    assert_eq!(muxer.live_sessions(), 1);

    Ok(())
}

#[test]
fn test_writes_before_start_are_rejected() {
    let (writer, muxer, _clock) = setup();
    writer.set_audio_enabled(true);
    writer.set_microphone_enabled(true);
    let before = writer.state();

    assert_eq!(
        writer.write_video_frame(&frame(), Timestamp::from_seconds(1)),
        Err(WriterError::NotStarted)
    );
    assert_eq!(
        writer.write_audio(&audio_buffer(Timestamp::from_seconds(1))),
        Err(WriterError::NotStarted)
    );
    assert_eq!(
        writer.write_microphone(&audio_buffer(Timestamp::from_seconds(1))),
        Err(WriterError::NotStarted)
    );

    assert_eq!(writer.state(), before, "Rejected writes must not change state");
    assert!(muxer.log().events.is_empty());
}

#[test]
fn test_start_records_clock_time_and_creates_enabled_tracks() -> Result<()> {
    let (writer, muxer, _clock) = setup();
    writer.set_microphone_enabled(true);

    writer.start(false)?;

    let state = writer.state();
    assert!(state.is_running);
    assert_eq!(state.start_time, Timestamp::from_seconds(100));
    assert!(!state.waiting_for_first_write);
    assert!(!state.audio_enabled);
    assert!(state.microphone_enabled);

    let log = muxer.log();
    assert_eq!(
        log.tracks_added(),
        vec![MediaKind::Video, MediaKind::Microphone]
    );
    assert_eq!(muxer.live_tracks(), 2);

    Ok(())
}

#[test]
fn test_configuration_is_locked_while_running() -> Result<()> {
    let (writer, _muxer, _clock) = setup();
    writer.set_audio_enabled(true);

    writer.start(false)?;
    writer.set_audio_enabled(false);
    writer.set_microphone_enabled(true);

    assert!(writer.audio_enabled(), "Audio flag must not change mid-session");
    assert!(!writer.microphone_enabled(), "Microphone flag must not change mid-session");

    writer.end(Timestamp::from_seconds(101), true)?;
    writer.set_microphone_enabled(true);
    assert!(writer.microphone_enabled(), "Flags are mutable again once idle");

    Ok(())
}

#[test]
fn test_state_snapshot_is_detached() -> Result<()> {
    let (writer, _muxer, _clock) = setup();
    writer.start(false)?;

    let snapshot = writer.state();
    writer.write_video_frame(&frame(), Timestamp::from_seconds(101))?;

    assert_eq!(snapshot.last_frame_time, Timestamp::ZERO);
    assert_eq!(writer.state().last_frame_time, Timestamp::from_seconds(101));

    Ok(())
}

#[test]
fn test_failed_session_creation() {
    let (writer, muxer, _clock) = setup();
    muxer.fail_create_session(true);

    let result = writer.start(false);
    assert!(
        matches!(result, Err(WriterError::FailedToStart { .. })),
        "Expected FailedToStart, got {:?}",
        result
    );
    assert_eq!(writer.state(), SessionState::default());
    assert_eq!(muxer.live_sessions(), 0);
}

#[test]
fn test_failed_begin_writing_releases_handles() -> Result<()> {
    let (writer, muxer, _clock) = setup();
    writer.set_audio_enabled(true);
    writer.set_microphone_enabled(true);
    muxer.fail_begin_writing(true);

    let result = writer.start(true);
    assert!(matches!(result, Err(WriterError::FailedToStart { .. })));

    assert!(!writer.is_running());
    assert!(!writer.state().waiting_for_first_write);
    assert_eq!(muxer.log().tracks_added().len(), 3);
    assert_eq!(muxer.live_sessions(), 0, "Session handle leaked");
    assert_eq!(muxer.live_tracks(), 0, "Track handles leaked");

    // The writer is usable once the muxer recovers
    muxer.fail_begin_writing(false);
    writer.start(true)?;
    assert!(writer.is_running());

    Ok(())
}

#[test]
fn test_end_without_session_is_a_no_op() -> Result<()> {
    let (writer, muxer, _clock) = setup();

    writer.end(Timestamp::from_seconds(5), true)?;
    writer.end(Timestamp::ZERO, false)?;

    assert!(muxer.log().events.is_empty());
    Ok(())
}

#[test]
fn test_end_releases_all_handles() -> Result<()> {
    let (writer, muxer, _clock) = setup();
    writer.set_audio_enabled(true);
    writer.set_microphone_enabled(true);

    writer.start(false)?;
    writer.write_video_frame(&frame(), Timestamp::from_seconds(101))?;
    writer.end(Timestamp::from_seconds(102), true)?;

    let log = muxer.log();
    assert_eq!(
        log.finished_tracks(),
        vec![MediaKind::Video, MediaKind::Audio, MediaKind::Microphone]
    );
    assert_eq!(log.closes(), vec![Timestamp::from_seconds(102)]);
    assert_eq!(log.finalize_requests(), 1);

    assert_eq!(muxer.live_sessions(), 0);
    assert_eq!(muxer.live_tracks(), 0);

    let state = writer.state();
    assert!(!state.is_running);
    assert!(!state.waiting_for_first_write);

    assert_eq!(
        writer.write_video_frame(&frame(), Timestamp::from_seconds(103)),
        Err(WriterError::NotStarted)
    );

    Ok(())
}

#[test]
fn test_restart_produces_independent_session() -> Result<()> {
    let (writer, muxer, clock) = setup();

    writer.start(false)?;
    writer.write_video_frame(&frame(), Timestamp::from_seconds(150))?;
    writer.end(Timestamp::from_seconds(150), true)?;

    clock.set(Timestamp::from_seconds(200));
    writer.start(true)?;

    let state = writer.state();
    assert!(state.is_running);
    assert_eq!(state.start_time, Timestamp::from_seconds(200));
    assert_eq!(state.last_frame_time, Timestamp::ZERO);
    assert!(state.waiting_for_first_write);
    assert_eq!(writer.stats().video_frames_written, 0);

    // Ordering restarts with the new session
    writer.write_video_frame(&frame(), Timestamp::from_seconds(1))?;

    let log = muxer.log();
    assert_eq!(log.sessions_created(), 2);
    assert_eq!(
        log.anchors(),
        vec![Timestamp::from_seconds(100), Timestamp::from_seconds(1)]
    );
    assert_eq!(muxer.live_sessions(), 1);

    Ok(())
}
