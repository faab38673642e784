//! Uncompressed video "encoder"

use super::{Capabilities, Codec, CodecId, CodecParameters, Encoder, Received};
use crate::dictionary::Dictionary;
use crate::format::{MediaType, VideoFormat};
use crate::frame::{Frame, Packet};
use crate::{Error, Result};
use std::collections::VecDeque;

pub static RAW_VIDEO: Codec = Codec {
    name: "rawvideo",
    long_name: "raw video",
    id: CodecId::RawVideo,
    media_type: MediaType::Video,
    sample_formats: None,
    pixel_formats: None,
    supported_sample_rates: None,
    channel_layouts: None,
    capabilities: Capabilities {
        variable_frame_size: false,
        delay: false,
    },
    factory: RawVideoEncoder::create,
};

/// Emits every image as a key frame with the row padding removed
pub struct RawVideoEncoder {
    format: VideoFormat,
    queue: VecDeque<Packet>,
    draining: bool,
}

impl RawVideoEncoder {
    pub fn create(parameters: &CodecParameters, _options: &mut Dictionary) -> Result<Box<dyn Encoder>> {
        let video = parameters
            .video()
            .ok_or_else(|| Error::Codec("rawvideo requires video parameters".to_string()))?;

        Ok(Box::new(Self {
            format: VideoFormat {
                pixel_format: video.pixel_format,
                width: video.width,
                height: video.height,
            },
            queue: VecDeque::new(),
            draining: false,
        }))
    }

    fn encode(&self, frame: &Frame) -> Result<Packet> {
        if frame.video_format() != Some(self.format) {
            return Err(Error::Codec(format!(
                "Frame does not match encoder format {} {}x{}",
                self.format.pixel_format, self.format.width, self.format.height
            )));
        }

        let pixel_format = self.format.pixel_format;
        let width = self.format.width as usize;
        let height = self.format.height as usize;

        let mut data = Vec::new();
        for plane in 0..pixel_format.plane_count() {
            let row = pixel_format.row_bytes(plane, width);
            let stride = frame.linesize(plane);
            for line in frame
                .plane(plane)
                .chunks(stride)
                .take(pixel_format.plane_height(plane, height))
            {
                data.extend_from_slice(&line[..row]);
            }
        }

        let pts = frame.pts().unwrap_or(0);

        Ok(Packet {
            data,
            pts,
            dts: pts,
            duration: 1,
            stream_index: 0,
            is_keyframe: true,
        })
    }
}

impl Encoder for RawVideoEncoder {
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
