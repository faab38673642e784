//! MP4 / QuickTime (ISO base media file format) muxer
//!
//! Layout: `ftyp`, `wide`, `mdat` (packets appended as they arrive), then
//! `moov` built from the collected sample tables when the trailer is
//! written. The `wide` placeholder becomes a 64-bit `mdat` header when the
//! media data outgrows 4 GiB.

use super::{Muxer, Stream, WriteSeek};
use crate::codec::{CodecId, CodecParamsType};
use crate::format::MediaType;
use crate::frame::Packet;
use crate::time_stamp::{rescale, Rational};
use crate::{Error, Result};
use std::io::{Seek, SeekFrom, Write};

/// Time scale of the movie header
const MOVIE_TIMESCALE: u32 = 1000;

const UNITY_MATRIX: [u8; 36] = [
    0x00, 0x01, 0x00, 0x00, 0, 0, 0, 0, 0, 0, 0, 0, //
    0, 0, 0, 0, 0x00, 0x01, 0x00, 0x00, 0, 0, 0, 0, //
    0, 0, 0, 0, 0, 0, 0, 0, 0x40, 0x00, 0x00, 0x00,
];

/// File type flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Brand {
    /// ISO/IEC 14496-14
    Iso,
    /// Apple QuickTime
    QuickTime,
}

#[derive(Debug, Clone)]
struct Sample {
    offset: u64,
    size: u32,
    dts: i64,
    pts: i64,
    duration: i64,
    is_keyframe: bool,
}

struct Track {
    stream: Stream,
    timescale: u32,
    samples: Vec<Sample>,
}

impl Track {
    /// Sample durations from consecutive dts, the last one from its packet
    fn durations(&self) -> Vec<u32> {
        self.samples
            .iter()
            .enumerate()
            .map(|(i, sample)| {
                let duration = match self.samples.get(i + 1) {
                    Some(next) => next.dts - sample.dts,
                    None => sample.duration,
                };
                duration.clamp(0, u32::MAX as i64) as u32
            })
            .collect()
    }

    fn duration(&self) -> u64 {
        self.durations().iter().map(|&d| d as u64).sum()
    }
}

/// MP4 / MOV muxer
pub struct Mp4Muxer {
    writer: Box<dyn WriteSeek>,
    brand: Brand,
    tracks: Vec<Track>,
    wide_offset: u64,
    mdat_written: u64,
}

impl Mp4Muxer {
    pub fn new(writer: Box<dyn WriteSeek>, brand: Brand) -> Self {
        Self {
            writer,
            brand,
            tracks: Vec::new(),
            wide_offset: 0,
            mdat_written: 0,
        }
    }

    fn position(&mut self) -> Result<u64> {
        self.writer.stream_position().map_err(Error::Io)
    }

    fn build_ftyp(&self) -> Vec<u8> {
        let mut body = Vec::new();
        match self.brand {
            Brand::Iso => {
                body.extend_from_slice(b"isom");
                body.extend_from_slice(&0x200u32.to_be_bytes());
                for brand in [b"isom", b"iso2", b"av01", b"mp41"] {
                    body.extend_from_slice(brand);
                }
            }
            Brand::QuickTime => {
                body.extend_from_slice(b"qt  ");
                body.extend_from_slice(&0x2005_0300u32.to_be_bytes());
                body.extend_from_slice(b"qt  ");
            }
        }
        make_box(b"ftyp", &body)
    }

    fn build_moov(&self) -> Result<Vec<u8>> {
        let movie_duration = self
            .tracks
            .iter()
            .map(|track| movie_duration(track))
            .max()
            .unwrap_or(0);

        let mut body = build_mvhd(movie_duration, self.tracks.len() as u32 + 1);
        for (i, track) in self.tracks.iter().enumerate() {
            body.extend(self.build_trak(track, i as u32 + 1)?);
        }

        Ok(make_box(b"moov", &body))
    }

    fn build_trak(&self, track: &Track, track_id: u32) -> Result<Vec<u8>> {
        let mut body = build_tkhd(track, track_id);

        let mut mdia = build_mdhd(track);
        mdia.extend(build_hdlr(track.stream.media_type));

        let mut minf = match track.stream.media_type {
            MediaType::Video => full_box(b"vmhd", 0, 1, &[0; 8]),
            MediaType::Audio => full_box(b"smhd", 0, 0, &[0; 4]),
        };
        minf.extend(build_dinf());
        minf.extend(self.build_stbl(track)?);

        mdia.extend(make_box(b"minf", &minf));
        body.extend(make_box(b"mdia", &mdia));

        Ok(make_box(b"trak", &body))
    }

    fn build_stbl(&self, track: &Track) -> Result<Vec<u8>> {
        let mut body = self.build_stsd(track)?;
        body.extend(build_stts(track));

        // Every sample is its own chunk
        body.extend(full_box(b"stsc", 0, 0, &[0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1]));
        body.extend(build_stsz(track));
        body.extend(build_chunk_offsets(track));

        if track.stream.media_type == MediaType::Video
            && !track.samples.iter().all(|sample| sample.is_keyframe)
        {
            body.extend(build_stss(track));
        }

        if track.samples.iter().any(|sample| sample.pts != sample.dts) {
            body.extend(build_ctts(track));
        }

        Ok(make_box(b"stbl", &body))
    }

    fn build_stsd(&self, track: &Track) -> Result<Vec<u8>> {
        let parameters = track.stream.codec_parameters()?;

        let entry = match (&parameters.params, parameters.codec_id) {
            (CodecParamsType::Video(video), CodecId::Av1) => {
                let mut body = visual_sample_entry(video.width, video.height);
                body.extend(make_box(b"av1C", &parameters.extradata));
                make_box(b"av01", &body)
            }
            (CodecParamsType::Audio(audio), codec) => {
                let channels = audio.channel_layout.channel_count() as u16;
                let bits = audio.sample_format.bytes_per_sample() as u16 * 8;
                let mut body = audio_sample_entry(channels, bits, audio.sample_rate);

                let kind = match (self.brand, codec) {
                    (Brand::QuickTime, CodecId::PcmS16le) => b"sowt",
                    (Brand::QuickTime, CodecId::PcmS16be) => b"twos",
                    (Brand::Iso, CodecId::PcmS16le | CodecId::PcmS16be) => b"ipcm",
                    (Brand::Iso, CodecId::PcmF32le) => b"fpcm",
                    _ => return Err(unsupported(self.brand, codec)),
                };

                if self.brand == Brand::Iso {
                    let little_endian = u8::from(codec != CodecId::PcmS16be);
                    body.extend(full_box(b"pcmC", 0, 0, &[little_endian, bits as u8]));
                }

                make_box(kind, &body)
            }
            (_, codec) => return Err(unsupported(self.brand, codec)),
        };

        let mut body = 1u32.to_be_bytes().to_vec();
        body.extend(entry);
        Ok(full_box(b"stsd", 0, 0, &body))
    }
}

impl Muxer for Mp4Muxer {
    fn write_header(&mut self, streams: &mut [Stream]) -> Result<()> {
        for stream in streams.iter_mut() {
            let parameters = stream.codec_parameters()?;
            let timescale = match &parameters.params {
                CodecParamsType::Audio(audio) => audio.sample_rate,
                CodecParamsType::Video(_) if stream.time_base.num() == 1 => {
                    stream.time_base.den() as u32
                }
                CodecParamsType::Video(_) => 90000,
            };

            stream.time_base = Rational::per(timescale)?;
            self.tracks.push(Track {
                stream: stream.clone(),
                timescale,
                samples: Vec::new(),
            });
        }

        let ftyp = self.build_ftyp();
        self.writer.write_all(&ftyp).map_err(Error::Io)?;

        self.wide_offset = self.position()?;
        self.writer
            .write_all(&make_box(b"wide", &[]))
            .map_err(Error::Io)?;
        // mdat size is patched in the trailer
        self.writer
            .write_all(&[0, 0, 0, 0, b'm', b'd', b'a', b't'])
            .map_err(Error::Io)?;

        tracing::debug!(tracks = self.tracks.len(), brand = ?self.brand, "MP4 header written");
        Ok(())
    }

    fn write_packet(&mut self, stream: &Stream, packet: &Packet) -> Result<()> {
        let offset = self.position()?;
        let size = u32::try_from(packet.data.len())
            .map_err(|_| Error::Container("Packet too large for mp4".to_string()))?;

        let track = self
            .tracks
            .iter_mut()
            .find(|track| track.stream.index == stream.index)
            .ok_or_else(|| Error::Container(format!("Unknown stream index {}", stream.index)))?;

        track.samples.push(Sample {
            offset,
            size,
            dts: packet.dts,
            pts: packet.pts,
            duration: packet.duration,
            is_keyframe: packet.is_keyframe,
        });

        self.writer.write_all(&packet.data).map_err(Error::Io)?;
        self.mdat_written += packet.data.len() as u64;
        Ok(())
    }

    fn write_trailer(&mut self) -> Result<()> {
        let end = self.position()?;

        let mdat_size = 8 + self.mdat_written;
        if let Ok(size) = u32::try_from(mdat_size) {
            self.writer
                .seek(SeekFrom::Start(self.wide_offset + 8))
                .map_err(Error::Io)?;
            self.writer.write_all(&size.to_be_bytes()).map_err(Error::Io)?;
        } else {
            // Grow the mdat header over the wide placeholder
            self.writer
                .seek(SeekFrom::Start(self.wide_offset))
                .map_err(Error::Io)?;
            self.writer.write_all(&1u32.to_be_bytes()).map_err(Error::Io)?;
            self.writer.write_all(b"mdat").map_err(Error::Io)?;
            self.writer
                .write_all(&(16 + self.mdat_written).to_be_bytes())
                .map_err(Error::Io)?;
        }

        self.writer.seek(SeekFrom::Start(end)).map_err(Error::Io)?;

        let moov = self.build_moov()?;
        self.writer.write_all(&moov).map_err(Error::Io)?;
        self.writer.flush().map_err(Error::Io)?;

        tracing::debug!(mdat = self.mdat_written, moov = moov.len(), "MP4 trailer written");
        Ok(())
    }
}

fn unsupported(brand: Brand, codec: CodecId) -> Error {
    Error::Container(format!("{} cannot be stored in {:?} files", codec, brand))
}

fn movie_duration(track: &Track) -> u64 {
    let duration = i64::try_from(track.duration()).unwrap_or(i64::MAX);
    let scale = Rational::per(track.timescale).unwrap_or(Rational::SECOND);
    let movie = Rational::per(MOVIE_TIMESCALE).unwrap_or(Rational::MILLISECOND);
    rescale(duration, scale, movie).max(0) as u64
}

fn make_box(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + body.len());
    buf.extend_from_slice(&(8 + body.len() as u32).to_be_bytes());
    buf.extend_from_slice(kind);
    buf.extend_from_slice(body);
    buf
}

fn full_box(kind: &[u8; 4], version: u8, flags: u32, body: &[u8]) -> Vec<u8> {
    let mut content = Vec::with_capacity(4 + body.len());
    content.push(version);
    content.extend_from_slice(&flags.to_be_bytes()[1..]);
    content.extend_from_slice(body);
    make_box(kind, &content)
}

fn build_mvhd(duration: u64, next_track_id: u32) -> Vec<u8> {
    let mut body = Vec::with_capacity(96);
    // creation_time + modification_time
    body.extend_from_slice(&[0; 8]);
    body.extend_from_slice(&MOVIE_TIMESCALE.to_be_bytes());
    body.extend_from_slice(&(duration.min(u32::MAX as u64) as u32).to_be_bytes());
    // rate 1.0, volume 1.0
    body.extend_from_slice(&0x0001_0000u32.to_be_bytes());
    body.extend_from_slice(&0x0100u16.to_be_bytes());
    body.extend_from_slice(&[0; 10]);
    body.extend_from_slice(&UNITY_MATRIX);
    // pre_defined
    body.extend_from_slice(&[0; 24]);
    body.extend_from_slice(&next_track_id.to_be_bytes());
    full_box(b"mvhd", 0, 0, &body)
}

fn build_tkhd(track: &Track, track_id: u32) -> Vec<u8> {
    let (width, height) = match track.stream.parameters.as_ref().and_then(|p| p.video()) {
        Some(video) => (video.width, video.height),
        None => (0, 0),
    };

    let mut body = Vec::with_capacity(80);
    body.extend_from_slice(&[0; 8]);
    body.extend_from_slice(&track_id.to_be_bytes());
    body.extend_from_slice(&[0; 4]);
    body.extend_from_slice(&(movie_duration(track).min(u32::MAX as u64) as u32).to_be_bytes());
    body.extend_from_slice(&[0; 8]);
    // layer + alternate_group
    body.extend_from_slice(&[0; 4]);
    let volume: u16 = if track.stream.media_type == MediaType::Audio {
        0x0100
    } else {
        0
    };
    body.extend_from_slice(&volume.to_be_bytes());
    body.extend_from_slice(&[0; 2]);
    body.extend_from_slice(&UNITY_MATRIX);
    // 16.16 fixed point
    body.extend_from_slice(&(width << 16).to_be_bytes());
    body.extend_from_slice(&(height << 16).to_be_bytes());

    // track_enabled | track_in_movie
    full_box(b"tkhd", 0, 0x03, &body)
}

fn build_mdhd(track: &Track) -> Vec<u8> {
    let mut body = Vec::with_capacity(20);
    body.extend_from_slice(&[0; 8]);
    body.extend_from_slice(&track.timescale.to_be_bytes());
    body.extend_from_slice(&(track.duration().min(u32::MAX as u64) as u32).to_be_bytes());
    // language 'und'
    body.extend_from_slice(&0x55C4u16.to_be_bytes());
    body.extend_from_slice(&[0; 2]);
    full_box(b"mdhd", 0, 0, &body)
}

fn build_hdlr(media_type: MediaType) -> Vec<u8> {
    let (handler_type, name): (&[u8; 4], &[u8]) = match media_type {
        MediaType::Video => (b"vide", b"VideoHandler\0"),
        MediaType::Audio => (b"soun", b"SoundHandler\0"),
    };

    let mut body = Vec::new();
    body.extend_from_slice(&[0; 4]);
    body.extend_from_slice(handler_type);
    body.extend_from_slice(&[0; 12]);
    body.extend_from_slice(name);
    full_box(b"hdlr", 0, 0, &body)
}

fn build_dinf() -> Vec<u8> {
    // One self-contained 'url ' entry
    let url = full_box(b"url ", 0, 1, &[]);
    let mut dref = 1u32.to_be_bytes().to_vec();
    dref.extend(url);
    make_box(b"dinf", &full_box(b"dref", 0, 0, &dref))
}

fn visual_sample_entry(width: u32, height: u32) -> Vec<u8> {
    let mut body = Vec::with_capacity(78);
    // reserved + data_reference_index
    body.extend_from_slice(&[0; 6]);
    body.extend_from_slice(&1u16.to_be_bytes());
    // pre_defined + reserved + pre_defined[3]
    body.extend_from_slice(&[0; 16]);
    body.extend_from_slice(&(width as u16).to_be_bytes());
    body.extend_from_slice(&(height as u16).to_be_bytes());
    // 72 dpi
    body.extend_from_slice(&0x0048_0000u32.to_be_bytes());
    body.extend_from_slice(&0x0048_0000u32.to_be_bytes());
    body.extend_from_slice(&[0; 4]);
    // frame_count
    body.extend_from_slice(&1u16.to_be_bytes());
    // compressorname
    body.extend_from_slice(&[0; 32]);
    // depth + pre_defined
    body.extend_from_slice(&0x0018u16.to_be_bytes());
    body.extend_from_slice(&(-1i16).to_be_bytes());
    body
}

fn audio_sample_entry(channels: u16, bits: u16, sample_rate: u32) -> Vec<u8> {
    let mut body = Vec::with_capacity(28);
    body.extend_from_slice(&[0; 6]);
    body.extend_from_slice(&1u16.to_be_bytes());
    body.extend_from_slice(&[0; 8]);
    body.extend_from_slice(&channels.to_be_bytes());
    body.extend_from_slice(&bits.to_be_bytes());
    body.extend_from_slice(&[0; 4]);
    // 16.16 fixed point, zero when the rate does not fit
    let rate = if sample_rate <= u16::MAX as u32 {
        sample_rate << 16
    } else {
        0
    };
    body.extend_from_slice(&rate.to_be_bytes());
    body
}

fn build_stts(track: &Track) -> Vec<u8> {
    let mut runs: Vec<(u32, u32)> = Vec::new();
    for duration in track.durations() {
        match runs.last_mut() {
            Some((count, last)) if *last == duration => *count += 1,
            _ => runs.push((1, duration)),
        }
    }

    let mut body = (runs.len() as u32).to_be_bytes().to_vec();
    for (count, duration) in runs {
        body.extend_from_slice(&count.to_be_bytes());
        body.extend_from_slice(&duration.to_be_bytes());
    }
    full_box(b"stts", 0, 0, &body)
}

fn build_stsz(track: &Track) -> Vec<u8> {
    let mut body = Vec::with_capacity(8 + track.samples.len() * 4);
    // sample_size 0: sizes are listed
    body.extend_from_slice(&0u32.to_be_bytes());
    body.extend_from_slice(&(track.samples.len() as u32).to_be_bytes());
    for sample in &track.samples {
        body.extend_from_slice(&sample.size.to_be_bytes());
    }
    full_box(b"stsz", 0, 0, &body)
}

fn build_chunk_offsets(track: &Track) -> Vec<u8> {
    let large = track
        .samples
        .iter()
        .any(|sample| sample.offset > u32::MAX as u64);

    let mut body = (track.samples.len() as u32).to_be_bytes().to_vec();
    for sample in &track.samples {
        if large {
            body.extend_from_slice(&sample.offset.to_be_bytes());
        } else {
            body.extend_from_slice(&(sample.offset as u32).to_be_bytes());
        }
    }

    full_box(if large { b"co64" } else { b"stco" }, 0, 0, &body)
}

fn build_stss(track: &Track) -> Vec<u8> {
    let keyframes: Vec<u32> = track
        .samples
        .iter()
        .enumerate()
        .filter(|(_, sample)| sample.is_keyframe)
        .map(|(i, _)| i as u32 + 1)
        .collect();

    let mut body = (keyframes.len() as u32).to_be_bytes().to_vec();
    for number in keyframes {
        body.extend_from_slice(&number.to_be_bytes());
    }
    full_box(b"stss", 0, 0, &body)
}

fn build_ctts(track: &Track) -> Vec<u8> {
    let mut runs: Vec<(u32, i32)> = Vec::new();
    for sample in &track.samples {
        let offset = (sample.pts - sample.dts).clamp(i32::MIN as i64, i32::MAX as i64) as i32;
        match runs.last_mut() {
            Some((count, last)) if *last == offset => *count += 1,
            _ => runs.push((1, offset)),
        }
    }

    let mut body = (runs.len() as u32).to_be_bytes().to_vec();
    for (count, offset) in runs {
        body.extend_from_slice(&count.to_be_bytes());
        body.extend_from_slice(&offset.to_be_bytes());
    }
    // version 1 allows negative offsets
    full_box(b"ctts", 1, 0, &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{AudioCodecParams, CodecParameters};
    use crate::format::{ChannelLayout, SampleFormat};
    use std::io::{Cursor, Read};
    use std::sync::{Arc, Mutex};

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

    fn audio_stream() -> Stream {
        Stream {
            index: 0,
            media_type: MediaType::Audio,
            time_base: Rational::per(8000).unwrap(),
            parameters: Some(CodecParameters {
                codec_id: CodecId::PcmS16be,
                bit_rate: 0,
                time_base: Rational::per(8000).unwrap(),
                global_header: true,
                extradata: Vec::new(),
                params: CodecParamsType::Audio(AudioCodecParams {
                    sample_rate: 8000,
                    channel_layout: ChannelLayout::MONO,
                    sample_format: SampleFormat::S16,
                    frame_size: 0,
                }),
            }),
            packets_written: 0,
        }
    }

    /// Top-level boxes as (type, size)
    fn top_level_boxes(bytes: &[u8]) -> Vec<(String, u64)> {
        let mut boxes = Vec::new();
        let mut offset = 0;
        while offset + 8 <= bytes.len() {
            let size = u32::from_be_bytes(bytes[offset..offset + 4].try_into().unwrap()) as u64;
            let kind = String::from_utf8_lossy(&bytes[offset + 4..offset + 8]).to_string();
            boxes.push((kind, size));
            if size < 8 {
                break;
            }
            offset += size as usize;
        }
        boxes
    }

    fn write_file(brand: Brand) -> Vec<u8> {
        let buffer = SharedBuffer::default();
        let mut muxer = Mp4Muxer::new(Box::new(buffer.clone()), brand);
        let mut streams = vec![audio_stream()];
        muxer.write_header(&mut streams).unwrap();

        for i in 0..3 {
            let packet = Packet {
                data: vec![0; 200],
                pts: i * 100,
                dts: i * 100,
                duration: 100,
                stream_index: 0,
                is_keyframe: true,
            };
            muxer.write_packet(&streams[0], &packet).unwrap();
        }
        muxer.write_trailer().unwrap();
        buffer.bytes()
    }

    #[test]
    fn test_box_layout() {
        let bytes = write_file(Brand::Iso);
        let boxes = top_level_boxes(&bytes);
        let kinds: Vec<&str> = boxes.iter().map(|(kind, _)| kind.as_str()).collect();

        assert_eq!(kinds, vec!["ftyp", "wide", "mdat", "moov"]);
        assert_eq!(boxes[2].1, 8 + 600);
        assert!(bytes.windows(4).any(|window| window == b"ipcm"));
        assert!(bytes.windows(4).any(|window| window == b"pcmC"));
    }

    #[test]
    fn test_quicktime_brand_and_entry() {
        let bytes = write_file(Brand::QuickTime);
        assert_eq!(&bytes[8..12], b"qt  ");
        assert!(bytes.windows(4).any(|window| window == b"twos"));
    }

    #[test]
    fn test_stts_run_length() {
        let bytes = write_file(Brand::Iso);
        let position = bytes
            .windows(4)
            .position(|window| window == b"stts")
            .unwrap();
        // version/flags, one run of three samples lasting 100 ticks
        assert_eq!(
            &bytes[position + 4..position + 20],
            &[0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 3, 0, 0, 0, 100]
        );
    }
}
