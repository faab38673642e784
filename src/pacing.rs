//! Frame pacing between independently clocked audio and video channels

use crate::container::ContainerWriter;
use crate::generator::Generator;
use crate::output::OutputChannel;
use crate::time_stamp::TimeStamp;
use crate::Result;

/// What a pacing run wrote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingReport {
    pub video_frames: u64,
    pub audio_frames: u64,
    /// Drain iterations needed to flush the video encoder
    pub video_flush_iterations: usize,
    /// Drain iterations needed to flush the audio encoder
    pub audio_flush_iterations: usize,
    /// Time stamp of the frame after the last video frame
    pub video_end: TimeStamp,
    /// Time stamp of the sample after the last audio frame
    pub audio_end: TimeStamp,
}

/// Generate until either channel passes `duration`, keeping audio caught up
/// with video.
///
/// Before every video frame, audio frames are written while the audio clock
/// is behind the video clock. Generation stops at the first check where
/// either clock has passed `duration`, so the last frame of each stream may
/// extend past it by up to one buffer. Both encoders are flushed afterwards,
/// video first.
pub fn generate_audio_and_video<V, VG, A, AG>(
    container: &mut ContainerWriter,
    video: &mut V,
    video_generator: &mut VG,
    audio: &mut A,
    audio_generator: &mut AG,
    duration: TimeStamp,
) -> Result<PacingReport>
where
    V: OutputChannel + ?Sized,
    VG: Generator + ?Sized,
    A: OutputChannel + ?Sized,
    AG: Generator + ?Sized,
{
    let mut video_frames = 0;
    let mut audio_frames = 0;

    while video.time_stamp() <= duration && audio.time_stamp() <= duration {
        while audio.time_stamp() < video.time_stamp() {
            audio_generator.fill_frame(audio.next_frame()?)?;
            audio.write_frame(container)?;
            audio_frames += 1;
        }

        video_generator.fill_frame(video.next_frame()?)?;
        video.write_frame(container)?;
        video_frames += 1;
    }

    let video_flush_iterations = video.flush(container)?;
    let audio_flush_iterations = audio.flush(container)?;

    let report = PacingReport {
        video_frames,
        audio_frames,
        video_flush_iterations,
        audio_flush_iterations,
        video_end: video.time_stamp(),
        audio_end: audio.time_stamp(),
    };

    tracing::debug!(
        video_frames,
        audio_frames,
        video_end = report.video_end.as_seconds(),
        audio_end = report.audio_end.as_seconds(),
        "Audio and video generated"
    );
    Ok(report)
}

/// Generate video frames until the clock passes `duration`, then flush.
///
/// Returns the number of frames written.
pub fn generate_video<V, G>(
    container: &mut ContainerWriter,
    video: &mut V,
    generator: &mut G,
    duration: TimeStamp,
) -> Result<u64>
where
    V: OutputChannel + ?Sized,
    G: Generator + ?Sized,
{
    let mut frames = 0;
    while video.time_stamp() <= duration {
        generator.fill_frame(video.next_frame()?)?;
        video.write_frame(container)?;
        frames += 1;
    }

    let iterations = video.flush(container)?;
    tracing::debug!(frames, flush_iterations = iterations, "Video generated");
    Ok(frames)
}
