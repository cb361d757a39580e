// Integration tests for system audio and microphone tracks
//
// These tests verify feature gating, the silent drop while the timeline
// anchor is pending, and backpressure/append failure reporting.

use anyhow::Result;
use session_writer::media::{MediaKind, PixelBuffer, PixelFormat, Timestamp, WriterSettings};
use session_writer::muxer::MemoryMuxer;
use session_writer::{AudioBuffer, ManualClock, SessionWriter, WriterError};
use std::sync::Arc;

fn setup(audio: bool, microphone: bool) -> (SessionWriter, MemoryMuxer) {
    let muxer = MemoryMuxer::new();
    let writer = SessionWriter::new(
        WriterSettings::new("recordings/out.mp4", 4, 4),
        Arc::new(muxer.clone()),
    )
    .with_clock(Arc::new(ManualClock::new(Timestamp::from_seconds(100))));
    writer.set_audio_enabled(audio);
    writer.set_microphone_enabled(microphone);
    (writer, muxer)
}

fn buffer(millis: i64) -> AudioBuffer {
    AudioBuffer {
        samples: vec![0i16; 1764],
        sample_rate: 44_100,
        channels: 2,
        presentation_time: Timestamp::from_millis(millis),
    }
}

fn frame() -> PixelBuffer {
    PixelBuffer::new(4, 4, PixelFormat::Argb32)
}

#[test]
fn test_disabled_audio_is_not_started() -> Result<()> {
    let (writer, muxer) = setup(false, false);
    writer.start(false)?;

    assert_eq!(writer.write_audio(&buffer(100_000)), Err(WriterError::NotStarted));
    assert_eq!(
        writer.write_microphone(&buffer(100_000)),
        Err(WriterError::NotStarted)
    );
    assert!(muxer.log().appended(MediaKind::Audio).is_empty());

    Ok(())
}

#[test]
fn test_disabled_audio_rejected_even_while_anchor_pending() -> Result<()> {
    let (writer, _muxer) = setup(false, true);
    writer.start(true)?;

    // Feature off is an error; the pending-anchor drop is not
    assert_eq!(writer.write_audio(&buffer(0)), Err(WriterError::NotStarted));
    assert_eq!(writer.write_microphone(&buffer(0)), Ok(()));

    Ok(())
}

#[test]
fn test_audio_before_first_frame_is_dropped_silently() -> Result<()> {
    let (writer, muxer) = setup(true, true);
    writer.start(true)?;

    for millis in [0, 20, 40] {
        writer.write_audio(&buffer(millis))?;
        writer.write_microphone(&buffer(millis))?;
    }

    let log = muxer.log();
    assert!(log.appended(MediaKind::Audio).is_empty());
    assert!(log.appended(MediaKind::Microphone).is_empty());
    assert!(log.anchors().is_empty(), "Audio must not anchor the timeline");

    let state = writer.state();
    assert!(state.waiting_for_first_write);
    assert_eq!(state.last_frame_time, Timestamp::ZERO);
    assert_eq!(writer.stats().dropped_before_anchor, 6);

    Ok(())
}

#[test]
fn test_audio_flows_after_first_frame() -> Result<()> {
    let (writer, muxer) = setup(true, true);
    writer.start(true)?;

    writer.write_audio(&buffer(10))?;
    writer.write_video_frame(&frame(), Timestamp::from_millis(50))?;
    writer.write_audio(&buffer(60))?;
    writer.write_microphone(&buffer(60))?;

    let log = muxer.log();
    assert_eq!(log.anchors(), vec![Timestamp::from_millis(50)]);
    assert_eq!(log.appended(MediaKind::Audio), vec![Timestamp::from_millis(60)]);
    assert_eq!(
        log.appended(MediaKind::Microphone),
        vec![Timestamp::from_millis(60)]
    );

    let stats = writer.stats();
    assert_eq!(stats.audio_buffers_written, 1);
    assert_eq!(stats.microphone_buffers_written, 1);
    assert_eq!(stats.dropped_before_anchor, 1);

    Ok(())
}

#[test]
fn test_audio_flows_immediately_when_anchored_at_start() -> Result<()> {
    let (writer, muxer) = setup(true, false);
    writer.start(false)?;

    writer.write_audio(&buffer(100_000))?;
    assert_eq!(
        muxer.log().appended(MediaKind::Audio),
        vec![Timestamp::from_seconds(100)]
    );

    Ok(())
}

#[test]
fn test_audio_timestamps_are_not_ordered_by_writer() -> Result<()> {
    let (writer, muxer) = setup(true, false);
    writer.start(false)?;
    writer.write_video_frame(&frame(), Timestamp::from_seconds(105))?;

    writer.write_audio(&buffer(104_000))?;
    writer.write_audio(&buffer(103_000))?;

    assert_eq!(muxer.log().appended(MediaKind::Audio).len(), 2);
    assert_eq!(writer.current_time(), Timestamp::from_seconds(105));

    Ok(())
}

#[test]
fn test_audio_backpressure_and_append_failure() -> Result<()> {
    let (writer, muxer) = setup(true, true);
    writer.start(false)?;

    muxer.set_ready(MediaKind::Microphone, false);
    assert_eq!(
        writer.write_microphone(&buffer(100_000)),
        Err(WriterError::NotReadyForMoreData)
    );
    // Tracks apply backpressure independently
    writer.write_audio(&buffer(100_000))?;

    muxer.reject_appends(MediaKind::Audio, true);
    assert_eq!(
        writer.write_audio(&buffer(100_020)),
        Err(WriterError::FailedToAppendBuffer)
    );

    let stats = writer.stats();
    assert_eq!(stats.backpressure_rejections, 1);
    assert_eq!(stats.append_failures, 1);
    assert_eq!(stats.audio_buffers_written, 1);
    assert_eq!(stats.microphone_buffers_written, 0);

    Ok(())
}

#[test]
fn test_audio_after_end_is_not_started() -> Result<()> {
    let (writer, _muxer) = setup(true, true);
    writer.start(false)?;
    writer.end(Timestamp::from_seconds(101), true)?;

    assert_eq!(writer.write_audio(&buffer(101_000)), Err(WriterError::NotStarted));
    assert_eq!(
        writer.write_microphone(&buffer(101_000)),
        Err(WriterError::NotStarted)
    );

    Ok(())
}
