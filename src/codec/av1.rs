//! AV1 encoder using rav1e

use super::{Capabilities, CodecParameters, Encoder, Received};
use crate::dictionary::Dictionary;
use crate::format::{MediaType, PixelFormat};
use crate::frame::{Frame, Packet};
use crate::options::{Preset, Profile};
use crate::{Error, Result};
use rav1e::prelude::*;
use std::collections::BTreeMap;

pub static AV1: super::Codec = super::Codec {
    name: "av1",
    long_name: "AV1 (rav1e)",
    id: super::CodecId::Av1,
    media_type: MediaType::Video,
    sample_formats: None,
    pixel_formats: Some(&[PixelFormat::Yuv420p, PixelFormat::Yuv444p]),
    supported_sample_rates: None,
    channel_layouts: None,
    capabilities: Capabilities {
        variable_frame_size: false,
        delay: true,
    },
    factory: Av1Encoder::create,
};

/// rav1e speed level for a preset
fn speed_for(preset: Preset) -> u8 {
    match preset {
        Preset::Superfast => 10,
        Preset::Veryfast => 9,
        Preset::Faster => 8,
        Preset::Fast => 7,
        Preset::Medium => 6,
        Preset::Slow => 4,
        Preset::Slower => 2,
        Preset::Veryslow => 1,
        Preset::Placebo => 0,
    }
}

/// AV1 encoder using rav1e
pub struct Av1Encoder {
    context: Context<u8>,
    pixel_format: PixelFormat,
    width: u32,
    height: u32,
    /// Presentation stamps of frames still inside rav1e, by input frame number
    pending: BTreeMap<u64, i64>,
    frame_count: u64,
    draining: bool,
}

impl Av1Encoder {
    /// Open an encoder, consuming the `preset`, `crf` and `speed` options
    pub fn create(parameters: &CodecParameters, options: &mut Dictionary) -> Result<Box<dyn Encoder>> {
        Ok(Box::new(Self::new(parameters, options)?))
    }

    pub fn new(parameters: &CodecParameters, options: &mut Dictionary) -> Result<Self> {
        let video = parameters
            .video()
            .ok_or_else(|| Error::Codec("AV1 encoder requires video parameters".to_string()))?;

        let chroma_sampling = match video.pixel_format {
            PixelFormat::Yuv420p => ChromaSampling::Cs420,
            PixelFormat::Yuv444p => ChromaSampling::Cs444,
            other => {
                return Err(Error::Configuration(format!(
                    "Pixel format {} not supported by av1",
                    other
                )))
            }
        };

        match (video.profile, chroma_sampling) {
            (None, _) | (Some(Profile::Main), ChromaSampling::Cs420) | (Some(Profile::High), _) => {}
            (Some(profile), _) => {
                return Err(Error::Configuration(format!(
                    "Profile {} cannot encode {}",
                    profile, video.pixel_format
                )))
            }
        }

        let preset = options.take::<Preset>("preset")?.unwrap_or(Preset::Medium);
        let speed = match options.take::<u8>("speed")? {
            Some(speed) => speed.min(10),
            None => speed_for(preset),
        };

        // crf 0..=63 maps onto the 0..=255 quantizer range, 0 is lossless
        let quantizer = match options.take::<u32>("crf")? {
            Some(crf) => (crf as usize * 4).min(255),
            None => 100,
        };
        let min_quantizer = quantizer.saturating_sub(10) as u8;

        let bitrate = i32::try_from(parameters.bit_rate).unwrap_or(i32::MAX);

        let enc_config = rav1e::config::EncoderConfig {
            width: video.width as usize,
            height: video.height as usize,
            speed_settings: SpeedSettings::from_preset(speed),
            time_base: Rational::new(
                parameters.time_base.num().unsigned_abs() as u64,
                parameters.time_base.den().unsigned_abs() as u64,
            ),
            sample_aspect_ratio: Rational::new(1, 1),
            bit_depth: 8,
            chroma_sampling,
            chroma_sample_position: ChromaSamplePosition::Unknown,
            pixel_range: PixelRange::Limited,
            enable_timing_info: false,
            still_picture: false,
            error_resilient: false,
            min_key_frame_interval: 0,
            max_key_frame_interval: video.gop_size.max(1) as u64,
            low_latency: false,
            quantizer,
            min_quantizer,
            bitrate,
            tune: Tune::Psychovisual,
            ..Default::default()
        };

        let rav1e_config = Config::new()
            .with_encoder_config(enc_config)
            .with_threads(0);

        let context = rav1e_config
            .new_context()
            .map_err(|e| Error::Codec(format!("Failed to create AV1 context: {}", e)))?;

        tracing::debug!(
            width = video.width,
            height = video.height,
            speed,
            quantizer,
            gop = video.gop_size,
            "AV1 encoder opened"
        );

        Ok(Self {
            context,
            pixel_format: video.pixel_format,
            width: video.width,
            height: video.height,
            pending: BTreeMap::new(),
            frame_count: 0,
            draining: false,
        })
    }

    fn to_rav1e_frame(&self, frame: &Frame) -> Result<rav1e::Frame<u8>> {
        if frame.pixel_format() != Some(self.pixel_format)
            || frame.width() != self.width
            || frame.height() != self.height
        {
            return Err(Error::Codec(format!(
                "Frame does not match encoder format {} {}x{}",
                self.pixel_format, self.width, self.height
            )));
        }

        let mut yuv_frame = self.context.new_frame();
        for (index, plane) in yuv_frame.planes.iter_mut().enumerate() {
            plane.copy_from_raw_u8(frame.plane(index), frame.linesize(index), 1);
        }

        Ok(yuv_frame)
    }
}

impl Encoder for Av1Encoder {
    fn send_frame(&mut self, frame: Option<&Frame>) -> Result<()> {
        let Some(frame) = frame else {
            if !self.draining {
                self.context.flush();
                self.draining = true;
            }
            return Ok(());
        };

        if self.draining {
            return Err(Error::Codec(
                "Cannot send a frame to a draining encoder".to_string(),
            ));
        }

        let yuv_frame = self.to_rav1e_frame(frame)?;

        self.context
            .send_frame(yuv_frame)
            .map_err(|e| Error::Codec(format!("Failed to send frame: {}", e)))?;

        self.pending
            .insert(self.frame_count, frame.pts().unwrap_or(self.frame_count as i64));
        self.frame_count += 1;
        Ok(())
    }

    fn receive_packet(&mut self, packet: &mut Packet) -> Result<Received> {
        loop {
            match self.context.receive_packet() {
                Ok(pkt) => {
                    let pts = self
                        .pending
                        .remove(&pkt.input_frameno)
                        .unwrap_or(pkt.input_frameno as i64);

                    *packet = Packet {
                        data: pkt.data,
                        pts,
                        dts: pts,
                        duration: 1,
                        stream_index: 0,
                        is_keyframe: pkt.frame_type == FrameType::KEY,
                    };
                    return Ok(Received::Packet);
                }
                Err(EncoderStatus::Encoded) => continue,
                Err(EncoderStatus::NeedMoreData) => return Ok(Received::TryAgain),
                Err(EncoderStatus::LimitReached) => return Ok(Received::EndOfStream),
                Err(e) => {
                    return Err(Error::Codec(format!("AV1 encoding error: {}", e)));
                }
            }
        }
    }

    fn extradata(&self) -> Vec<u8> {
        self.context.container_sequence_header()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{CodecId, CodecParamsType, VideoCodecParams};
    use crate::format::VideoFormat;

    fn parameters(pixel_format: PixelFormat, profile: Option<Profile>) -> CodecParameters {
        CodecParameters {
            codec_id: CodecId::Av1,
            bit_rate: 0,
            time_base: crate::time_stamp::Rational::per(30).unwrap(),
            global_header: true,
            extradata: Vec::new(),
            params: CodecParamsType::Video(VideoCodecParams {
                width: 64,
                height: 64,
                pixel_format,
                frames_per_second: 30,
                gop_size: 8,
                profile,
            }),
        }
    }

    #[test]
    fn test_consumes_known_options() {
        let mut options = Dictionary::new();
        options.set("preset", "superfast");
        options.set("crf", "40");
        options.set("tune", "film");

        Av1Encoder::new(&parameters(PixelFormat::Yuv420p, Some(Profile::Main)), &mut options)
            .unwrap();

        assert_eq!(options.keys().collect::<Vec<_>>(), vec!["tune"]);
    }

    #[test]
    fn test_main_profile_rejects_444() {
        let result = Av1Encoder::new(
            &parameters(PixelFormat::Yuv444p, Some(Profile::Main)),
            &mut Dictionary::new(),
        );
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_encode_and_drain() {
        let mut options = Dictionary::new();
        options.set("preset", "superfast");
        let mut encoder =
            Av1Encoder::new(&parameters(PixelFormat::Yuv420p, None), &mut options).unwrap();
        assert!(!encoder.extradata().is_empty());

        let mut frame = Frame::video(VideoFormat {
            pixel_format: PixelFormat::Yuv420p,
            width: 64,
            height: 64,
        })
        .unwrap();

        let mut packets = Vec::new();
        let mut packet = Packet::default();

        for pts in 0..4 {
            frame.set_pts(Some(pts));
            encoder.send_frame(Some(&frame)).unwrap();
            while encoder.receive_packet(&mut packet).unwrap() == Received::Packet {
                packets.push(packet.take());
            }
        }

        encoder.send_frame(None).unwrap();
        loop {
            match encoder.receive_packet(&mut packet).unwrap() {
                Received::Packet => packets.push(packet.take()),
                Received::TryAgain => continue,
                Received::EndOfStream => break,
            }
        }

        assert!(!packets.is_empty());
        assert!(packets[0].is_keyframe);
        assert!(packets.iter().all(|packet| (0..4).contains(&packet.pts)));
        assert_eq!(packets.last().map(|packet| packet.pts), Some(3));
    }
}
