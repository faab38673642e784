//! Uncompressed PCM audio encoders

use super::{Capabilities, Codec, CodecId, CodecParameters, Encoder, Received};
use crate::dictionary::Dictionary;
use crate::format::{MediaType, SampleFormat};
use crate::frame::{Frame, Packet};
use crate::{Error, Result};
use std::collections::VecDeque;

pub static PCM_S16LE: Codec = Codec {
    name: "pcm_s16le",
    long_name: "PCM signed 16-bit little-endian",
    id: CodecId::PcmS16le,
    media_type: MediaType::Audio,
    sample_formats: Some(&[SampleFormat::S16]),
    pixel_formats: None,
    supported_sample_rates: None,
    channel_layouts: None,
    capabilities: Capabilities {
        variable_frame_size: true,
        delay: false,
    },
    factory: PcmEncoder::create,
};

pub static PCM_S16BE: Codec = Codec {
    name: "pcm_s16be",
    long_name: "PCM signed 16-bit big-endian",
    id: CodecId::PcmS16be,
    media_type: MediaType::Audio,
    sample_formats: Some(&[SampleFormat::S16]),
    pixel_formats: None,
    supported_sample_rates: None,
    channel_layouts: None,
    capabilities: Capabilities {
        variable_frame_size: true,
        delay: false,
    },
    factory: PcmEncoder::create,
};

pub static PCM_F32LE: Codec = Codec {
    name: "pcm_f32le",
    long_name: "PCM 32-bit floating point little-endian",
    id: CodecId::PcmF32le,
    media_type: MediaType::Audio,
    sample_formats: Some(&[SampleFormat::Flt]),
    pixel_formats: None,
    supported_sample_rates: None,
    channel_layouts: None,
    capabilities: Capabilities {
        variable_frame_size: true,
        delay: false,
    },
    factory: PcmEncoder::create,
};

/// Writes interleaved samples with a fixed byte order, one packet per frame
pub struct PcmEncoder {
    sample_format: SampleFormat,
    channels: usize,
    big_endian: bool,
    queue: VecDeque<Packet>,
    draining: bool,
}

impl PcmEncoder {
    pub fn create(parameters: &CodecParameters, _options: &mut Dictionary) -> Result<Box<dyn Encoder>> {
        let audio = parameters
            .audio()
            .ok_or_else(|| Error::Codec("PCM encoder requires audio parameters".to_string()))?;

        let (sample_format, big_endian) = match parameters.codec_id {
            CodecId::PcmS16le => (SampleFormat::S16, false),
            CodecId::PcmS16be => (SampleFormat::S16, true),
            CodecId::PcmF32le => (SampleFormat::Flt, false),
            other => {
                return Err(Error::Codec(format!("{} is not a PCM codec", other)));
            }
        };

        if audio.sample_format != sample_format {
            return Err(Error::Configuration(format!(
                "{} expects {} samples, got {}",
                parameters.codec_id, sample_format, audio.sample_format
            )));
        }

        if audio.sample_rate == 0 {
            return Err(Error::Configuration("Sample rate must be positive".to_string()));
        }

        Ok(Box::new(Self {
            sample_format,
            channels: audio.channel_layout.channel_count(),
            big_endian,
            queue: VecDeque::new(),
            draining: false,
        }))
    }

    fn encode(&self, frame: &Frame) -> Result<Packet> {
        if frame.sample_format() != Some(self.sample_format)
            || frame.channel_layout().map(|layout| layout.channel_count()) != Some(self.channels)
        {
            return Err(Error::Codec(format!(
                "Frame does not match encoder format {} with {} channels",
                self.sample_format, self.channels
            )));
        }

        let bytes = self.sample_format.bytes_per_sample();
        let length = frame.nb_samples() * self.channels * bytes;
        let source = &frame.plane(0)[..length];

        let data = if self.big_endian == cfg!(target_endian = "big") {
            source.to_vec()
        } else {
            source
                .chunks_exact(bytes)
                .flat_map(|sample| sample.iter().rev().copied())
                .collect()
        };

        let pts = frame.pts().unwrap_or(0);

        Ok(Packet {
            data,
            pts,
            dts: pts,
            duration: frame.nb_samples() as i64,
            stream_index: 0,
            is_keyframe: true,
        })
    }
}

impl Encoder for PcmEncoder {
    fn send_frame(&mut self, frame: Option<&Frame>) -> Result<()> {
        match frame {
            Some(_) if self.draining => Err(Error::Codec(
                "Cannot send a frame to a draining encoder".to_string(),
            )),
            Some(frame) => {
                let packet = self.encode(frame)?;
                self.queue.push_back(packet);
                Ok(())
            }
            None => {
                self.draining = true;
                Ok(())
            }
        }
    }

    fn receive_packet(&mut self, packet: &mut Packet) -> Result<Received> {
        match self.queue.pop_front() {
            Some(next) => {
                *packet = next;
                Ok(Received::Packet)
            }
            None if self.draining => Ok(Received::EndOfStream),
            None => Ok(Received::TryAgain),
        }
    }
}
