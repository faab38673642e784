//! Encoders and their capability descriptors
//!
//! Encoding follows a send/receive protocol:
//! 1. `send_frame(Some(frame))` submits one raw frame
//! 2. `receive_packet()` is called until it reports [`Received::TryAgain`]
//! 3. `send_frame(None)` starts draining; `receive_packet()` then returns
//!    the buffered packets followed by [`Received::EndOfStream`]

#[cfg(feature = "av1")]
pub mod av1;
pub mod pcm;
pub mod raw;

use crate::dictionary::Dictionary;
use crate::format::{ChannelLayout, MediaType, PixelFormat, SampleFormat};
use crate::frame::{Frame, Packet};
use crate::options::Profile;
use crate::time_stamp::Rational;
use crate::{Error, Result};
use std::fmt;

/// Built-in codec identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecId {
    Av1,
    RawVideo,
    PcmS16le,
    PcmS16be,
    PcmF32le,
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CodecId::Av1 => "av1",
            CodecId::RawVideo => "rawvideo",
            CodecId::PcmS16le => "pcm_s16le",
            CodecId::PcmS16be => "pcm_s16be",
            CodecId::PcmF32le => "pcm_f32le",
        };
        f.write_str(name)
    }
}

/// Outcome of [`Encoder::receive_packet`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// A packet was written to the output argument
    Packet,
    /// More input is needed before another packet is ready
    TryAgain,
    /// The encoder is fully drained
    EndOfStream,
}

/// Encoder trait
pub trait Encoder: Send {
    /// Submit a raw frame, or `None` to start draining.
    ///
    /// Sending `None` again while draining is accepted. Sending a frame
    /// after draining started is an error.
    fn send_frame(&mut self, frame: Option<&Frame>) -> Result<()>;

    /// Fetch the next compressed packet into `packet`
    fn receive_packet(&mut self, packet: &mut Packet) -> Result<Received>;

    /// Samples per frame the encoder requires; zero when any size works
    fn frame_size(&self) -> u32 {
        0
    }

    /// Codec-specific configuration stored in the container header
    fn extradata(&self) -> Vec<u8> {
        Vec::new()
    }
}

/// What an encoder can do beyond the basics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Audio frames may carry any number of samples
    pub variable_frame_size: bool,
    /// Packets may come out later than the frame that produced them
    pub delay: bool,
}

/// Media-specific codec parameters
#[derive(Debug, Clone, PartialEq)]
pub enum CodecParamsType {
    Audio(AudioCodecParams),
    Video(VideoCodecParams),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioCodecParams {
    pub sample_rate: u32,
    pub channel_layout: ChannelLayout,
    pub sample_format: SampleFormat,
    /// Samples per frame, zero when variable
    pub frame_size: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoCodecParams {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub frames_per_second: u32,
    pub gop_size: u32,
    pub profile: Option<Profile>,
}

/// Parameters an encoder is opened with, later copied to the container stream
#[derive(Debug, Clone, PartialEq)]
pub struct CodecParameters {
    pub codec_id: CodecId,
    /// Bits per second, zero when unset
    pub bit_rate: u64,
    pub time_base: Rational,
    /// Configuration goes into the container header instead of the bitstream
    pub global_header: bool,
    pub extradata: Vec<u8>,
    pub params: CodecParamsType,
}

impl CodecParameters {
    pub fn media_type(&self) -> MediaType {
        match self.params {
            CodecParamsType::Audio(_) => MediaType::Audio,
            CodecParamsType::Video(_) => MediaType::Video,
        }
    }

    pub fn audio(&self) -> Option<&AudioCodecParams> {
        match &self.params {
            CodecParamsType::Audio(audio) => Some(audio),
            CodecParamsType::Video(_) => None,
        }
    }

    pub fn video(&self) -> Option<&VideoCodecParams> {
        match &self.params {
            CodecParamsType::Video(video) => Some(video),
            CodecParamsType::Audio(_) => None,
        }
    }
}

/// Creates an opened encoder, removing the options it consumed
pub type EncoderFactory = fn(&CodecParameters, &mut Dictionary) -> Result<Box<dyn Encoder>>;

/// Static description of an encoder and what it accepts.
///
/// `None` for a capability list means the codec accepts anything.
#[derive(Debug)]
pub struct Codec {
    pub name: &'static str,
    pub long_name: &'static str,
    pub id: CodecId,
    pub media_type: MediaType,
    pub sample_formats: Option<&'static [SampleFormat]>,
    pub pixel_formats: Option<&'static [PixelFormat]>,
    pub supported_sample_rates: Option<&'static [u32]>,
    pub channel_layouts: Option<&'static [ChannelLayout]>,
    pub capabilities: Capabilities,
    pub factory: EncoderFactory,
}

impl Codec {
    pub fn supports_sample_rate(&self, sample_rate: u32) -> bool {
        self.supported_sample_rates
            .map_or(true, |rates| rates.contains(&sample_rate))
    }

    pub fn supports_channel_layout(&self, layout: ChannelLayout) -> bool {
        self.channel_layouts
            .map_or(true, |layouts| layouts.contains(&layout))
    }

    pub fn supports_pixel_format(&self, format: PixelFormat) -> bool {
        self.pixel_formats
            .map_or(true, |formats| formats.contains(&format))
    }

    /// Preferred sample format, planar float when the codec declares none
    pub fn default_sample_format(&self) -> SampleFormat {
        self.sample_formats
            .and_then(|formats| formats.first().copied())
            .unwrap_or(SampleFormat::Fltp)
    }

    /// Open an encoder for `parameters`
    pub fn open(
        &self,
        parameters: &CodecParameters,
        options: &mut Dictionary,
    ) -> Result<Box<dyn Encoder>> {
        if parameters.media_type() != self.media_type {
            return Err(Error::Configuration(format!(
                "{} codec {} cannot encode {}",
                self.media_type,
                self.name,
                parameters.media_type()
            )));
        }

        tracing::debug!(codec = self.name, "Opening encoder");
        (self.factory)(parameters, options)
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

static CODECS: &[&Codec] = &[
    #[cfg(feature = "av1")]
    &av1::AV1,
    &raw::RAW_VIDEO,
    &pcm::PCM_S16LE,
    &pcm::PCM_S16BE,
    &pcm::PCM_F32LE,
];

/// Every encoder compiled into this build
pub fn encoders() -> impl Iterator<Item = &'static Codec> {
    CODECS.iter().copied()
}

/// Look up the encoder for a codec id
pub fn find_encoder(id: CodecId) -> Result<&'static Codec> {
    encoders()
        .find(|codec| codec.id == id)
        .ok_or_else(|| Error::CodecUnavailable(format!("{} encoder not found", id)))
}

/// Look up an encoder by name
pub fn find_encoder_by_name(name: &str) -> Result<&'static Codec> {
    encoders()
        .find(|codec| codec.name == name)
        .ok_or_else(|| Error::CodecUnavailable(format!("{} encoder not found", name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_builtin_encoders() {
        let pcm = find_encoder(CodecId::PcmS16le).unwrap();
        assert_eq!(pcm.media_type, MediaType::Audio);
        assert!(pcm.capabilities.variable_frame_size);

        let raw = find_encoder_by_name("rawvideo").unwrap();
        assert_eq!(raw.id, CodecId::RawVideo);
        assert!(find_encoder_by_name("mp3").is_err());
    }

    #[cfg(feature = "av1")]
    #[test]
    fn test_av1_is_registered() {
        let codec = find_encoder(CodecId::Av1).unwrap();
        assert!(codec.supports_pixel_format(PixelFormat::Yuv420p));
        assert!(!codec.supports_pixel_format(PixelFormat::Rgb24));
    }

    #[test]
    fn test_missing_lists_accept_anything() {
        let codec = find_encoder(CodecId::PcmF32le).unwrap();
        assert!(codec.supports_sample_rate(7));
        assert!(codec.supports_channel_layout(ChannelLayout::SEVEN_POINT_ONE));
        assert_eq!(codec.default_sample_format(), SampleFormat::Flt);
    }
}
