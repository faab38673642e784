//! Raw sample/pixel buffers and compressed packets

use crate::format::{AudioFormat, ChannelLayout, MediaType, PixelFormat, SampleFormat, VideoFormat};
use crate::time_stamp::{rescale, Rational};
use crate::{Error, Result};
use std::sync::Arc;

/// Row alignment of video planes, in bytes
pub const LINESIZE_ALIGN: usize = 32;

#[derive(Debug, Clone, PartialEq)]
struct Buffer {
    planes: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Layout {
    Audio {
        format: AudioFormat,
        nb_samples: usize,
    },
    Video(VideoFormat),
}

/// One unit of raw audio (samples x channels) or one image.
///
/// The planes live behind a reference count. Cloning a frame shares them,
/// and any mutable access first makes the frame writable, copying the planes
/// when another reference still aliases them.
#[derive(Debug, Clone)]
pub struct Frame {
    buffer: Arc<Buffer>,
    linesize: Vec<usize>,
    layout: Layout,
    pts: Option<i64>,
}

impl Frame {
    /// Allocate silence for `nb_samples` samples per channel
    pub fn audio(format: AudioFormat, nb_samples: usize) -> Result<Self> {
        let channels = format.channel_layout.channel_count();
        if nb_samples == 0 || channels == 0 {
            return Err(Error::Allocation(format!(
                "Failed to allocate audio frame: {} samples, {} channels",
                nb_samples, channels
            )));
        }

        let bytes = format.sample_format.bytes_per_sample();
        let (plane_count, plane_size) = if format.sample_format.is_planar() {
            (channels, nb_samples * bytes)
        } else {
            (1, nb_samples * channels * bytes)
        };

        let silence = if format.sample_format.packed() == SampleFormat::U8 {
            0x80
        } else {
            0
        };

        Ok(Self {
            buffer: Arc::new(Buffer {
                planes: vec![vec![silence; plane_size]; plane_count],
            }),
            linesize: vec![plane_size; plane_count],
            layout: Layout::Audio { format, nb_samples },
            pts: None,
        })
    }

    /// Allocate a black image with 32-byte aligned rows
    pub fn video(format: VideoFormat) -> Result<Self> {
        if format.width == 0 || format.height == 0 {
            return Err(Error::Allocation(format!(
                "Failed to allocate video frame: {}x{}",
                format.width, format.height
            )));
        }

        let width = format.width as usize;
        let height = format.height as usize;
        let pixel_format = format.pixel_format;

        let mut planes = Vec::with_capacity(pixel_format.plane_count());
        let mut linesize = Vec::with_capacity(pixel_format.plane_count());

        for plane in 0..pixel_format.plane_count() {
            let row = pixel_format.row_bytes(plane, width);
            let stride = (row + LINESIZE_ALIGN - 1) / LINESIZE_ALIGN * LINESIZE_ALIGN;
            // Chroma planes start at mid grey so a fresh YUV frame is black
            let fill = if pixel_format.is_planar() && plane > 0 {
                128
            } else {
                0
            };
            planes.push(vec![fill; stride * pixel_format.plane_height(plane, height)]);
            linesize.push(stride);
        }

        Ok(Self {
            buffer: Arc::new(Buffer { planes }),
            linesize,
            layout: Layout::Video(format),
            pts: None,
        })
    }

    pub fn media_type(&self) -> MediaType {
        match self.layout {
            Layout::Audio { .. } => MediaType::Audio,
            Layout::Video(_) => MediaType::Video,
        }
    }

    pub fn audio_format(&self) -> Option<AudioFormat> {
        match self.layout {
            Layout::Audio { format, .. } => Some(format),
            Layout::Video(_) => None,
        }
    }

    pub fn video_format(&self) -> Option<VideoFormat> {
        match self.layout {
            Layout::Video(format) => Some(format),
            Layout::Audio { .. } => None,
        }
    }

    /// Samples per channel; zero for images
    pub fn nb_samples(&self) -> usize {
        match self.layout {
            Layout::Audio { nb_samples, .. } => nb_samples,
            Layout::Video(_) => 0,
        }
    }

    pub fn sample_format(&self) -> Option<SampleFormat> {
        self.audio_format().map(|format| format.sample_format)
    }

    pub fn channel_layout(&self) -> Option<ChannelLayout> {
        self.audio_format().map(|format| format.channel_layout)
    }

    pub fn pixel_format(&self) -> Option<PixelFormat> {
        self.video_format().map(|format| format.pixel_format)
    }

    pub fn width(&self) -> u32 {
        self.video_format().map_or(0, |format| format.width)
    }

    pub fn height(&self) -> u32 {
        self.video_format().map_or(0, |format| format.height)
    }

    pub fn pts(&self) -> Option<i64> {
        self.pts
    }

    pub fn set_pts(&mut self, pts: Option<i64>) {
        self.pts = pts;
    }

    pub fn plane_count(&self) -> usize {
        self.buffer.planes.len()
    }

    /// Bytes per row of a video plane, or the plane size for audio
    pub fn linesize(&self, plane: usize) -> usize {
        self.linesize[plane]
    }

    pub fn plane(&self, plane: usize) -> &[u8] {
        &self.buffer.planes[plane]
    }

    /// No other frame shares the planes
    pub fn is_writable(&self) -> bool {
        Arc::strong_count(&self.buffer) == 1
    }

    /// Ensure exclusive ownership of the planes.
    ///
    /// Returns `true` when the planes were aliased and had to be copied.
    pub fn make_writable(&mut self) -> bool {
        let copied = !self.is_writable();
        Arc::make_mut(&mut self.buffer);
        copied
    }

    pub fn plane_mut(&mut self, plane: usize) -> &mut [u8] {
        &mut Arc::make_mut(&mut self.buffer).planes[plane]
    }

    pub fn planes_mut(&mut self) -> Vec<&mut [u8]> {
        Arc::make_mut(&mut self.buffer)
            .planes
            .iter_mut()
            .map(Vec::as_mut_slice)
            .collect()
    }

    /// Both frames view the same planes
    pub fn shares_buffer(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
    }
}

/// One unit of compressed data ready for muxing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    /// Encoded data
    pub data: Vec<u8>,
    /// Presentation timestamp in time_base units
    pub pts: i64,
    /// Decoding timestamp in time_base units
    pub dts: i64,
    /// Duration in time_base units
    pub duration: i64,
    /// Index of the container stream this packet belongs to
    pub stream_index: usize,
    /// Is this a keyframe?
    pub is_keyframe: bool,
}

impl Packet {
    /// Convert the timestamps and duration from one time base to another
    pub fn rescale_ts(&mut self, from: Rational, to: Rational) {
        if from == to {
            return;
        }

        self.pts = rescale(self.pts, from, to);
        self.dts = rescale(self.dts, from, to);
        self.duration = rescale(self.duration, from, to);
    }

    /// Move the contents out, leaving this packet empty for reuse
    pub fn take(&mut self) -> Packet {
        std::mem::take(self)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
