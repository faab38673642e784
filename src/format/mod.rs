//! Sample, pixel and channel descriptors

mod channel_layout;
mod pixel_format;
mod sample_format;

pub use channel_layout::ChannelLayout;
pub use pixel_format::{PixelFormat, PixelSize};
pub use sample_format::{Sample, SampleFormat};

pub(crate) use pixel_format::RgbOffsets;

/// Representation of audio samples on one side of a conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_format: SampleFormat,
    pub sample_rate: u32,
    pub channel_layout: ChannelLayout,
}

/// Representation of an image on one side of a conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFormat {
    pub pixel_format: PixelFormat,
    pub width: u32,
    pub height: u32,
}

/// Kind of data carried by a stream or handled by a codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Audio,
    Video,
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaType::Audio => f.write_str("audio"),
            MediaType::Video => f.write_str("video"),
        }
    }
}
