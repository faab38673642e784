//! Declarative audio and video stream options

use crate::codec::Codec;
use crate::format::{AudioFormat, ChannelLayout, PixelFormat, SampleFormat, VideoFormat};
use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Producer-side audio configuration
#[derive(Debug, Clone, Copy)]
pub struct AudioOptions {
    /// Format the producer writes samples in
    pub sample_format: SampleFormat,
    pub sample_rate: u32,
    /// Bits per second, zero lets the codec decide
    pub bit_rate: u64,
    pub channel_layout: ChannelLayout,
    /// Overrides the container's default audio codec
    pub codec: Option<&'static Codec>,
}

impl AudioOptions {
    pub fn new(sample_format: SampleFormat, sample_rate: u32, channel_layout: ChannelLayout) -> Self {
        Self {
            sample_format,
            sample_rate,
            bit_rate: 0,
            channel_layout,
            codec: None,
        }
    }

    /// Format of the buffers handed out to the producer
    pub fn format(&self) -> AudioFormat {
        AudioFormat {
            sample_format: self.sample_format,
            sample_rate: self.sample_rate,
            channel_layout: self.channel_layout,
        }
    }

    /// Check the options against the codec's declared capabilities
    pub fn require_compatible(&self, codec: &Codec) -> Result<()> {
        if !codec.supports_sample_rate(self.sample_rate) {
            return Err(Error::Configuration(format!(
                "Sample rate not supported: {} Hz with {}",
                self.sample_rate, codec.name
            )));
        }

        if !codec.supports_channel_layout(self.channel_layout) {
            return Err(Error::Configuration(format!(
                "Channel layout not supported: {} with {}",
                self.channel_layout, codec.name
            )));
        }

        Ok(())
    }
}

/// Encoder speed/quality trade-off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    Superfast,
    Veryfast,
    Faster,
    Fast,
    Medium,
    Slow,
    Slower,
    Veryslow,
    Placebo,
}

impl Preset {
    pub const ALL: [Preset; 9] = [
        Preset::Superfast,
        Preset::Veryfast,
        Preset::Faster,
        Preset::Fast,
        Preset::Medium,
        Preset::Slow,
        Preset::Slower,
        Preset::Veryslow,
        Preset::Placebo,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Preset::Superfast => "superfast",
            Preset::Veryfast => "veryfast",
            Preset::Faster => "faster",
            Preset::Fast => "fast",
            Preset::Medium => "medium",
            Preset::Slow => "slow",
            Preset::Slower => "slower",
            Preset::Veryslow => "veryslow",
            Preset::Placebo => "placebo",
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Preset {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        Preset::ALL
            .into_iter()
            .find(|preset| preset.name() == name)
            .ok_or_else(|| Error::Configuration(format!("Unknown preset: {}", name)))
    }
}

/// Video codec profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Profile {
    /// 4:2:0 and monochrome
    Main,
    /// Adds 4:4:4
    High,
    /// Adds 4:2:2 and 12-bit
    Professional,
}

impl Profile {
    pub fn name(self) -> &'static str {
        match self {
            Profile::Main => "main",
            Profile::High => "high",
            Profile::Professional => "professional",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Amount of movement in the picture, used to estimate a bit rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    Low = 1,
    Medium = 2,
    High = 3,
    Extreme = 4,
}

/// Rough bit rate needed for a picture size and frame rate
pub fn estimate_bit_rate(height: u32, width: u32, frame_rate: u32, motion: Motion) -> u64 {
    const COMPRESSION_FACTOR: f64 = 0.12;

    let estimate =
        height as f64 * width as f64 * frame_rate as f64 * motion as i32 as f64 * COMPRESSION_FACTOR;

    estimate as u64
}

/// Producer-side video configuration
#[derive(Debug, Clone, Copy)]
pub struct VideoOptions {
    pub height: u32,
    pub width: u32,
    /// Format the producer writes pixels in
    pub in_pixel_format: PixelFormat,
    /// Format handed to the encoder
    pub out_pixel_format: PixelFormat,
    pub frames_per_second: u32,
    /// Constant rate factor, lower is better
    pub quality_factor: Option<u32>,
    pub bit_rate: Option<u64>,
    /// Maximum distance between key frames
    pub gop_size: u32,
    pub profile: Profile,
    pub preset: Preset,
    /// Overrides the container's default video codec
    pub codec: Option<&'static Codec>,
}

impl VideoOptions {
    pub fn make_default() -> Self {
        Self {
            height: 1080,
            width: 1920,
            in_pixel_format: PixelFormat::Rgb24,
            out_pixel_format: PixelFormat::Yuv420p,
            frames_per_second: 30,
            quality_factor: Some(22),
            bit_rate: None,
            gop_size: 32,
            profile: Profile::Main,
            preset: Preset::Medium,
            codec: None,
        }
    }

    pub fn make_lossless() -> Self {
        Self {
            quality_factor: Some(0),
            profile: Profile::High,
            gop_size: 1,
            out_pixel_format: PixelFormat::Yuv444p,
            preset: Preset::Veryslow,
            ..Self::make_default()
        }
    }

    /// Format of the images handed out to the producer
    pub fn input_format(&self) -> VideoFormat {
        VideoFormat {
            pixel_format: self.in_pixel_format,
            width: self.width,
            height: self.height,
        }
    }

    /// Format of the images handed to the encoder
    pub fn output_format(&self) -> VideoFormat {
        VideoFormat {
            pixel_format: self.out_pixel_format,
            width: self.width,
            height: self.height,
        }
    }

    /// Validate the options
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::Configuration(format!(
                "Invalid dimensions: {}x{}",
                self.width, self.height
            )));
        }

        if self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(Error::Configuration(format!(
                "Height and width must be divisible by 2, got {}x{}",
                self.width, self.height
            )));
        }

        if self.frames_per_second == 0 {
            return Err(Error::Configuration(
                "Frame rate must be positive".to_string(),
            ));
        }

        if self.gop_size == 0 {
            return Err(Error::Configuration("GOP size must be positive".to_string()));
        }

        Ok(())
    }
}

impl Default for VideoOptions {
    fn default() -> Self {
        Self::make_default()
    }
}
