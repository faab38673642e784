//! Matroska container muxer

use super::{Muxer, Stream, WriteSeek};
use crate::codec::{CodecId, CodecParamsType};
use crate::format::{MediaType, PixelFormat};
use crate::frame::Packet;
use crate::time_stamp::Rational;
use crate::{Error, Result};
use std::io::Write;

const EBML: u32 = 0x1A45DFA3;
const SEGMENT: u32 = 0x18538067;
const INFO: u32 = 0x1549A966;
const TRACKS: u32 = 0x1654AE6B;
const TRACK_ENTRY: u32 = 0xAE;
const CLUSTER: u32 = 0x1F43B675;
const TIMESTAMP: u32 = 0xE7;
const SIMPLE_BLOCK: u32 = 0xA3;

/// Audio-only clusters are split after this many milliseconds
const MAX_CLUSTER_DURATION_MS: i64 = 5000;

/// Matroska muxer using simple EBML writing.
///
/// The segment and clusters have unknown size so the file is written in a
/// single pass. All timestamps are in milliseconds.
pub struct MatroskaMuxer {
    writer: Box<dyn WriteSeek>,
    /// Timestamp of the open cluster
    cluster_start: Option<i64>,
    has_video: bool,
}

impl MatroskaMuxer {
    pub fn new(writer: Box<dyn WriteSeek>) -> Self {
        Self {
            writer,
            cluster_start: None,
            has_video: false,
        }
    }

    fn create_ebml_header(&self) -> Vec<u8> {
        let mut data = Vec::new();

        // EBMLVersion = 1
        data.extend(encode_ebml_element(0x4286, &[1]));
        // EBMLReadVersion = 1
        data.extend(encode_ebml_element(0x42F7, &[1]));
        // EBMLMaxIDLength = 4
        data.extend(encode_ebml_element(0x42F2, &[4]));
        // EBMLMaxSizeLength = 8
        data.extend(encode_ebml_element(0x42F3, &[8]));
        // DocType
        data.extend(encode_ebml_element(0x4282, b"matroska"));
        // DocTypeVersion = 4
        data.extend(encode_ebml_element(0x4287, &[4]));
        // DocTypeReadVersion = 2
        data.extend(encode_ebml_element(0x4285, &[2]));

        data
    }

    fn create_segment_info(&self) -> Vec<u8> {
        let mut data = Vec::new();

        // TimestampScale = 1000000 (1ms)
        data.extend(encode_ebml_element(0x2AD7B1, &encode_uint(1_000_000)));
        data.extend(encode_ebml_element(0x4D80, b"avclip"));
        data.extend(encode_ebml_element(0x5741, b"avclip"));

        data
    }

    fn create_track_entry(&self, stream: &Stream) -> Result<Vec<u8>> {
        let parameters = stream.codec_parameters()?;
        let number = track_number(stream);
        let mut data = Vec::new();

        data.extend(encode_ebml_element(0xD7, &encode_uint(number)));
        // TrackUID
        data.extend(encode_ebml_element(0x73C5, &encode_uint(number)));
        // TrackType
        let track_type = match stream.media_type {
            MediaType::Video => 1,
            MediaType::Audio => 2,
        };
        data.extend(encode_ebml_element(0x83, &[track_type]));
        data.extend(encode_ebml_element(0x86, codec_name(parameters.codec_id).as_bytes()));

        if !parameters.extradata.is_empty() {
            // CodecPrivate
            data.extend(encode_ebml_element(0x63A2, &parameters.extradata));
        }

        match &parameters.params {
            CodecParamsType::Video(video) => {
                // DefaultDuration in nanoseconds
                let frame_duration = 1_000_000_000 / video.frames_per_second.max(1) as u64;
                data.extend(encode_ebml_element(0x23E383, &encode_uint(frame_duration)));

                let mut settings = Vec::new();
                settings.extend(encode_ebml_element(0xB0, &encode_uint(video.width as u64)));
                settings.extend(encode_ebml_element(0xBA, &encode_uint(video.height as u64)));
                if parameters.codec_id == CodecId::RawVideo {
                    // ColourSpace
                    settings.extend(encode_ebml_element(0x2EB524, &fourcc(video.pixel_format)));
                }
                data.extend(encode_ebml_element(0xE0, &settings));
            }
            CodecParamsType::Audio(audio) => {
                let mut settings = Vec::new();
                // SamplingFrequency
                settings.extend(encode_ebml_element(
                    0xB5,
                    &(audio.sample_rate as f64).to_be_bytes(),
                ));
                // Channels
                settings.extend(encode_ebml_element(
                    0x9F,
                    &encode_uint(audio.channel_layout.channel_count() as u64),
                ));
                // BitDepth
                settings.extend(encode_ebml_element(
                    0x6264,
                    &encode_uint(audio.sample_format.bytes_per_sample() as u64 * 8),
                ));
                data.extend(encode_ebml_element(0xE1, &settings));
            }
        }

        Ok(data)
    }

    fn start_cluster(&mut self, timestamp: i64) -> Result<()> {
        // Cluster (unknown size for streaming)
        self.write_ebml_id(CLUSTER)?;
        self.write_ebml_size_unknown()?;

        let timestamp_data = encode_ebml_element(TIMESTAMP, &encode_uint(timestamp.max(0) as u64));
        self.writer.write_all(&timestamp_data).map_err(Error::Io)?;

        self.cluster_start = Some(timestamp.max(0));
        Ok(())
    }

    fn write_simple_block(&mut self, track: u64, relative_timecode: i16, packet: &Packet) -> Result<()> {
        let mut block_data = Vec::with_capacity(packet.data.len() + 4);

        // Track number (EBML coded)
        block_data.extend(encode_ebml_size(track));

        // Relative timecode (big-endian i16)
        block_data.extend(relative_timecode.to_be_bytes());

        // Flags: keyframe if applicable
        let flags = if packet.is_keyframe { 0x80 } else { 0x00 };
        block_data.push(flags);

        block_data.extend(&packet.data);

        self.write_ebml_element(SIMPLE_BLOCK, &block_data)
    }

    fn write_ebml_id(&mut self, id: u32) -> Result<()> {
        let bytes = encode_ebml_id(id);
        self.writer.write_all(&bytes).map_err(Error::Io)
    }

    fn write_ebml_size_unknown(&mut self) -> Result<()> {
        // Unknown size marker for streaming
        self.writer
            .write_all(&[0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF])
            .map_err(Error::Io)
    }

    fn write_ebml_element(&mut self, id: u32, data: &[u8]) -> Result<()> {
        let bytes = encode_ebml_element(id, data);
        self.writer.write_all(&bytes).map_err(Error::Io)
    }
}

impl Muxer for MatroskaMuxer {
    fn write_header(&mut self, streams: &mut [Stream]) -> Result<()> {
        let mut tracks = Vec::new();
        for stream in streams.iter_mut() {
            tracks.extend(encode_ebml_element(TRACK_ENTRY, &self.create_track_entry(stream)?));
            stream.time_base = Rational::MILLISECOND;
        }

        self.has_video = streams
            .iter()
            .any(|stream| stream.media_type == MediaType::Video);

        let header = self.create_ebml_header();
        self.write_ebml_element(EBML, &header)?;

        // Segment (unknown size)
        self.write_ebml_id(SEGMENT)?;
        self.write_ebml_size_unknown()?;

        let info = self.create_segment_info();
        self.write_ebml_element(INFO, &info)?;
        self.write_ebml_element(TRACKS, &tracks)?;

        Ok(())
    }

    fn write_packet(&mut self, stream: &Stream, packet: &Packet) -> Result<()> {
        let timestamp = packet.pts;

        let start_new = match self.cluster_start {
            None => true,
            Some(start) => {
                let relative = timestamp - start;
                let keyframe_split = stream.media_type == MediaType::Video
                    && packet.is_keyframe
                    && relative > 0;
                let audio_split = !self.has_video && relative >= MAX_CLUSTER_DURATION_MS;

                keyframe_split
                    || audio_split
                    || relative > i16::MAX as i64
                    || relative < i16::MIN as i64
            }
        };

        if start_new {
            self.start_cluster(timestamp)?;
        }

        let start = self.cluster_start.unwrap_or(0);
        let relative = i16::try_from(timestamp - start)
            .map_err(|_| Error::Container(format!("Timestamp {} out of cluster range", timestamp)))?;

        self.write_simple_block(track_number(stream), relative, packet)
    }

    fn write_trailer(&mut self) -> Result<()> {
        self.writer.flush().map_err(Error::Io)?;
        Ok(())
    }
}

fn track_number(stream: &Stream) -> u64 {
    stream.index as u64 + 1
}

fn codec_name(codec: CodecId) -> &'static str {
    match codec {
        CodecId::Av1 => "V_AV1",
        CodecId::RawVideo => "V_UNCOMPRESSED",
        CodecId::PcmS16le => "A_PCM/INT/LIT",
        CodecId::PcmS16be => "A_PCM/INT/BIG",
        CodecId::PcmF32le => "A_PCM/FLOAT/IEEE",
    }
}

/// FourCC describing uncompressed pixels
fn fourcc(format: PixelFormat) -> [u8; 4] {
    match format {
        PixelFormat::Rgb24 => [b'R', b'G', b'B', 24],
        PixelFormat::Bgr24 => [b'B', b'G', b'R', 24],
        PixelFormat::Argb => *b"ARGB",
        PixelFormat::Rgba => *b"RGBA",
        PixelFormat::Abgr => *b"ABGR",
        PixelFormat::Bgra => *b"BGRA",
        PixelFormat::Gray8 => *b"Y800",
        PixelFormat::Yuv420p => *b"I420",
        PixelFormat::Yuv444p => [b'Y', b'3', 11, 8],
    }
}

// EBML encoding helpers

/// Encode an EBML element ID.
///
/// IDs carry their own length marker in the leading bits, so the encoding
/// is the big-endian value without leading zero bytes.
pub(crate) fn encode_ebml_id(id: u32) -> Vec<u8> {
    let skip = (id.leading_zeros() / 8).min(3) as usize;
    id.to_be_bytes()[skip..].to_vec()
}

pub(crate) fn encode_ebml_size(size: u64) -> Vec<u8> {
    if size < 0x7F {
        vec![(size as u8) | 0x80]
    } else if size < 0x3FFF {
        vec![((size >> 8) as u8) | 0x40, (size & 0xFF) as u8]
    } else if size < 0x1FFFFF {
        vec![
            ((size >> 16) as u8) | 0x20,
            ((size >> 8) & 0xFF) as u8,
            (size & 0xFF) as u8,
        ]
    } else if size < 0x0FFFFFFF {
        vec![
            ((size >> 24) as u8) | 0x10,
            ((size >> 16) & 0xFF) as u8,
            ((size >> 8) & 0xFF) as u8,
            (size & 0xFF) as u8,
        ]
    } else {
        // For larger sizes, use 8-byte encoding
        let mut bytes = vec![0x01];
        bytes.extend(&size.to_be_bytes()[1..]);
        bytes
    }
}

pub(crate) fn encode_ebml_element(id: u32, data: &[u8]) -> Vec<u8> {
    let mut result = encode_ebml_id(id);
    result.extend(encode_ebml_size(data.len() as u64));
    result.extend(data);
    result
}

pub(crate) fn encode_uint(value: u64) -> Vec<u8> {
    let skip = (value.leading_zeros() / 8).min(7) as usize;
    value.to_be_bytes()[skip..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{AudioCodecParams, CodecParameters, VideoCodecParams};
    use crate::format::{ChannelLayout, SampleFormat};
    use std::io::{Cursor, Read, Seek, SeekFrom};
    use std::sync::{Arc, Mutex};

    /// Sink that keeps its bytes readable after the muxer took ownership
    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Cursor<Vec<u8>>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Seek for SharedBuffer {
        fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
            self.0.lock().unwrap().seek(pos)
        }
    }

    impl SharedBuffer {
        fn bytes(&self) -> Vec<u8> {
            let mut cursor = self.0.lock().unwrap();
            let mut bytes = Vec::new();
            cursor.seek(SeekFrom::Start(0)).unwrap();
            cursor.read_to_end(&mut bytes).unwrap();
            bytes
        }
    }

    fn streams() -> Vec<Stream> {
        vec![
            Stream {
                index: 0,
                media_type: MediaType::Video,
                time_base: Rational::per(30).unwrap(),
                parameters: Some(CodecParameters {
                    codec_id: CodecId::RawVideo,
                    bit_rate: 0,
                    time_base: Rational::per(30).unwrap(),
                    global_header: true,
                    extradata: Vec::new(),
                    params: CodecParamsType::Video(VideoCodecParams {
                        width: 4,
                        height: 2,
                        pixel_format: PixelFormat::Rgb24,
                        frames_per_second: 30,
                        gop_size: 1,
                        profile: None,
                    }),
                }),
                packets_written: 0,
            },
            Stream {
                index: 1,
                media_type: MediaType::Audio,
                time_base: Rational::per(8000).unwrap(),
                parameters: Some(CodecParameters {
                    codec_id: CodecId::PcmS16le,
                    bit_rate: 0,
                    time_base: Rational::per(8000).unwrap(),
                    global_header: true,
                    extradata: Vec::new(),
                    params: CodecParamsType::Audio(AudioCodecParams {
                        sample_rate: 8000,
                        channel_layout: ChannelLayout::STEREO,
                        sample_format: SampleFormat::S16,
                        frame_size: 0,
                    }),
                }),
                packets_written: 0,
            },
        ]
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|window| window == needle)
    }

    #[test]
    fn test_ebml_encoding() {
        assert_eq!(encode_ebml_id(0xA3), vec![0xA3]);
        assert_eq!(encode_ebml_id(0x1A45DFA3), vec![0x1A, 0x45, 0xDF, 0xA3]);
        assert_eq!(encode_ebml_size(5), vec![0x85]);
        assert_eq!(encode_ebml_size(500), vec![0x41, 0xF4]);
        assert_eq!(encode_uint(0), vec![0]);
        assert_eq!(encode_uint(1_000_000), vec![0x0F, 0x42, 0x40]);
    }

    #[test]
    fn test_header_uses_millisecond_time_base() {
        let buffer = SharedBuffer::default();
        let mut muxer = MatroskaMuxer::new(Box::new(buffer.clone()));
        let mut streams = streams();

        muxer.write_header(&mut streams).unwrap();

        assert!(streams
            .iter()
            .all(|stream| stream.time_base == Rational::MILLISECOND));

        let bytes = buffer.bytes();
        assert_eq!(&bytes[..4], &[0x1A, 0x45, 0xDF, 0xA3]);
        assert!(contains(&bytes, b"V_UNCOMPRESSED"));
        assert!(contains(&bytes, b"A_PCM/INT/LIT"));
        assert!(contains(&bytes, b"matroska"));
    }

    #[test]
    fn test_keyframes_open_clusters() {
        let buffer = SharedBuffer::default();
        let mut muxer = MatroskaMuxer::new(Box::new(buffer.clone()));
        let mut streams = streams();
        muxer.write_header(&mut streams).unwrap();

        for pts in [0, 33, 67] {
            let packet = Packet {
                data: vec![0; 24],
                pts,
                dts: pts,
                duration: 33,
                stream_index: 0,
                is_keyframe: true,
            };
            muxer.write_packet(&streams[0], &packet).unwrap();
        }

        let audio = Packet {
            data: vec![0; 8],
            pts: 70,
            dts: 70,
            duration: 1,
            stream_index: 1,
            is_keyframe: true,
        };
        muxer.write_packet(&streams[1], &audio).unwrap();
        muxer.write_trailer().unwrap();

        let bytes = buffer.bytes();
        let clusters = bytes
            .windows(4)
            .filter(|window| *window == [0x1F, 0x43, 0xB6, 0x75])
            .count();
        assert_eq!(clusters, 3);

        // Audio block: track 2, 3 ms after the cluster at 67
        assert!(contains(&bytes, &[0xA3, 0x8C, 0x82, 0x00, 0x03, 0x80]));
    }
}
