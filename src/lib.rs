//! avclip - Synthetic audio/video clip generation FFI library
//!
//! This library encodes generated signals into MP4, MOV and Matroska files:
//! - `make_audio_and_video`: a moving colour gradient with a rising audio sweep
//! - `make_video`: the gradient alone
//!
//! The pieces are usable on their own: open a [`ContainerWriter`], add an
//! [`AudioOutput`] and a [`VideoOutput`], initialize the container and drive
//! the channels with [`pacing::generate_audio_and_video`].

pub mod codec;
pub mod container;
pub mod convert;
pub mod dictionary;
pub mod error;
pub mod ffi;
pub mod format;
pub mod frame;
pub mod generator;
pub mod options;
pub mod output;
pub mod pacing;
pub mod time_stamp;

pub use container::{ContainerWriter, OutputFormat};
pub use dictionary::Dictionary;
pub use error::{Error, Result};
pub use frame::{Frame, Packet};
pub use options::{AudioOptions, VideoOptions};
pub use output::{AudioOutput, OutputChannel, VideoOutput};
pub use pacing::PacingReport;
pub use time_stamp::{Rational, TimeStamp};

use format::{ChannelLayout, PixelFormat, SampleFormat};
use generator::{AudioSweep, CircleGradientColors};

/// Pitch range of the generated audio sweep
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepOptions {
    pub start_hz: f64,
    pub increase_hz_per_second: f64,
    pub stop_hz: f64,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            start_hz: 20.0,
            increase_hz_per_second: 40.0,
            stop_hz: 400.0,
        }
    }
}

/// Options for a generated clip
#[derive(Debug, Clone)]
pub struct ClipOptions {
    /// Output file path
    pub output_path: String,
    /// Container format
    pub container: OutputFormat,
    /// Requested length; the last frame of each stream may run past it
    pub duration_seconds: u32,
    pub video: VideoOptions,
    /// Ignored by [`make_video`]
    pub audio: AudioOptions,
    /// Ignored by [`make_video`]
    pub sweep: SweepOptions,
    /// Passed to the encoders; unused keys are logged
    pub codec_options: Dictionary,
}

impl ClipOptions {
    /// 15 seconds of 1080p at 30 fps with 44.1 kHz stereo audio
    pub fn new(output_path: impl Into<String>, container: OutputFormat) -> Self {
        Self {
            output_path: output_path.into(),
            container,
            duration_seconds: 15,
            video: VideoOptions::make_default(),
            audio: AudioOptions {
                bit_rate: 128000,
                ..AudioOptions::new(SampleFormat::S16p, 44100, ChannelLayout::STEREO)
            },
            sweep: SweepOptions::default(),
            codec_options: Dictionary::new(),
        }
    }

    /// Validate the options
    pub fn validate(&self) -> Result<()> {
        if self.duration_seconds == 0 {
            return Err(Error::InvalidInput("Duration must be positive".to_string()));
        }

        // The gradient generator draws RGB images
        if self.video.in_pixel_format != PixelFormat::Rgb24 {
            return Err(Error::Configuration(format!(
                "Generated video is rgb24, not {}",
                self.video.in_pixel_format
            )));
        }

        self.video.validate()
    }

    fn duration(&self) -> TimeStamp {
        TimeStamp::seconds(self.duration_seconds as i64)
    }
}

/// Write a gradient video with an audio sweep
pub fn make_audio_and_video(options: &ClipOptions) -> Result<PacingReport> {
    options.validate()?;

    let mut container = ContainerWriter::create(options.container, &options.output_path)?;
    let mut codec_options = options.codec_options.clone();

    let mut video = VideoOutput::new(&mut container, &mut codec_options, options.video)?;
    let mut audio = AudioOutput::new(&mut container, &mut codec_options, options.audio)?;
    container.initialize(&codec_options)?;

    let mut gradient = CircleGradientColors::new(
        options.video.height,
        options.video.width,
        options.video.frames_per_second,
    );
    let mut sweep = AudioSweep::new(
        options.audio.sample_rate,
        options.audio.channel_layout,
        options.sweep.start_hz,
        options.sweep.increase_hz_per_second,
        options.sweep.stop_hz,
    );

    let report = pacing::generate_audio_and_video(
        &mut container,
        &mut video,
        &mut gradient,
        &mut audio,
        &mut sweep,
        options.duration(),
    )?;

    container.finalize()?;
    Ok(report)
}

/// Write a gradient video without audio, returning the number of frames
pub fn make_video(options: &ClipOptions) -> Result<u64> {
    options.validate()?;

    let mut container = ContainerWriter::create(options.container, &options.output_path)?;
    let mut codec_options = options.codec_options.clone();

    let mut video = VideoOutput::new(&mut container, &mut codec_options, options.video)?;
    container.initialize(&codec_options)?;

    let mut gradient = CircleGradientColors::new(
        options.video.height,
        options.video.width,
        options.video.frames_per_second,
    );

    let frames =
        pacing::generate_video(&mut container, &mut video, &mut gradient, options.duration())?;

    container.finalize()?;
    Ok(frames)
}

/// Check if an encoder is compiled into this build
pub fn available(codec_name: &str) -> Result<()> {
    codec::find_encoder_by_name(codec_name).map(|_| ())
}
