//! Integration tests for audio/video pacing

mod common;

use avclip::format::ChannelLayout;
use avclip::generator::{AudioSweep, CircleGradientColors};
use avclip::output::{AudioOutput, VideoOutput};
use avclip::{pacing, ContainerWriter, Dictionary, OutputFormat, TimeStamp};
use common::*;
use tempfile::TempDir;

/// Drain loops must end well within this many iterations
const MAX_FLUSH_ITERATIONS: usize = 64;

/// 15 seconds at 30 fps against 44.1 kHz audio in 10000-sample buffers
#[test]
fn test_fifteen_second_clip() {
    let temp_dir = TempDir::new().unwrap();
    let output_path = temp_dir.path().join("paced.mkv");

    let mut container = ContainerWriter::create(OutputFormat::Matroska, &output_path).unwrap();
    let mut codec_options = Dictionary::new();

    let video_options = small_video_options(16, 8, 30);
    let audio_options = mono_audio_options(44100);

    let mut video = VideoOutput::new(&mut container, &mut codec_options, video_options).unwrap();
    let mut audio = AudioOutput::new(&mut container, &mut codec_options, audio_options).unwrap();
    assert_eq!(audio.sample_count(), 10000);

    container.initialize(&codec_options).unwrap();

    let mut gradient = CircleGradientColors::new(8, 16, 30);
    let mut sweep = AudioSweep::new(44100, ChannelLayout::MONO, 20.0, 40.0, 400.0);

    let report = pacing::generate_audio_and_video(
        &mut container,
        &mut video,
        &mut gradient,
        &mut audio,
        &mut sweep,
        TimeStamp::seconds(15),
    )
    .unwrap();

    assert!(
        video.time_stamp().count() >= 15 * 30,
        "Video stopped at {} frames",
        video.time_stamp().count()
    );
    assert_eq!(report.video_frames as i64, video.time_stamp().count());
    assert_eq!(report.audio_frames as i64 * 10000, audio.time_stamp().count());

    // Audio is never more than one buffer behind the last video frame
    assert!(audio.time_stamp() >= TimeStamp::new(report.video_frames as i64 - 1, video.time_stamp().time_base()));

    // The loop ends once either clock passes the duration
    assert!(
        video.time_stamp() > TimeStamp::seconds(15) || audio.time_stamp() > TimeStamp::seconds(15)
    );

    assert!(report.video_flush_iterations >= 1);
    assert!(report.video_flush_iterations <= MAX_FLUSH_ITERATIONS);
    assert!(report.audio_flush_iterations >= 1);
    assert!(report.audio_flush_iterations <= MAX_FLUSH_ITERATIONS);

    container.finalize().unwrap();

    assert!(verify_matroska_header(&output_path));
    // 450 raw 16x8 yuv420p frames are 192 bytes each
    let size = get_file_size(&output_path).unwrap();
    assert!(size > 450 * 192, "Output file is too small: {} bytes", size);
}

/// The library entry point writes a complete clip
#[test]
fn test_make_audio_and_video() {
    let temp_dir = TempDir::new().unwrap();
    let output_path = temp_dir.path().join("clip.mkv");

    let options = quick_clip(&output_path, OutputFormat::Matroska);
    let report = avclip::make_audio_and_video(&options).unwrap();

    assert!(report.video_end >= TimeStamp::seconds(1) || report.audio_end > TimeStamp::seconds(1));
    assert!(report.audio_frames >= 1);
    assert!(verify_file_exists_with_size(&output_path));
    assert!(verify_matroska_header(&output_path));
}

/// Video-only generation overshoots by at most one frame
#[test]
fn test_make_video() {
    let temp_dir = TempDir::new().unwrap();
    let output_path = temp_dir.path().join("video.mkv");

    let options = quick_clip(&output_path, OutputFormat::Matroska);
    let frames = avclip::make_video(&options).unwrap();

    // 10 fps for one second: frames 0..=10
    assert_eq!(frames, 11);
    assert!(verify_matroska_header(&output_path));
}

#[test]
fn test_zero_duration_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let output_path = temp_dir.path().join("empty.mkv");

    let mut options = quick_clip(&output_path, OutputFormat::Matroska);
    options.duration_seconds = 0;

    let result = avclip::make_video(&options);
    assert!(matches!(result, Err(avclip::Error::InvalidInput(_))));
    assert!(!output_path.exists());
}
