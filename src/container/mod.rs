//! Multiplexed output files
//!
//! A [`ContainerWriter`] moves through three states:
//! 1. `Open`: streams are added and given codec parameters
//! 2. `Initialized`: the header is written and packets are accepted
//! 3. `Finalized`: the trailer is written; nothing else is accepted

pub mod matroska;
pub mod mp4;

use crate::codec::{CodecId, CodecParameters};
use crate::dictionary::Dictionary;
use crate::format::MediaType;
use crate::frame::Packet;
use crate::time_stamp::{rescale, Rational, Seconds, TimeStamp};
use crate::{Error, Result};
use std::collections::VecDeque;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

/// Packets are held back for interleaving at most this long
pub const MAX_INTERLEAVE_DELTA_SECONDS: i64 = 10;

/// Byte sink a muxer writes to
pub trait WriteSeek: Write + Seek + Send {}

impl<T: Write + Seek + Send> WriteSeek for T {}

/// Container formats recognised by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Mov,
    Mp4,
    Matroska,
    Ogg,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 4] = [
        OutputFormat::Mov,
        OutputFormat::Mp4,
        OutputFormat::Matroska,
        OutputFormat::Ogg,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OutputFormat::Mov => "mov",
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Matroska => "matroska",
            OutputFormat::Ogg => "ogg",
        }
    }

    pub fn long_name(self) -> &'static str {
        match self {
            OutputFormat::Mov => "QuickTime / MOV",
            OutputFormat::Mp4 => "MP4 (MPEG-4 Part 14)",
            OutputFormat::Matroska => "Matroska",
            OutputFormat::Ogg => "Ogg",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Mov => "mov",
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Matroska => "mkv",
            OutputFormat::Ogg => "ogg",
        }
    }

    /// Look up a format by name or extension
    pub fn find(name: &str) -> Result<Self> {
        let name = name.to_ascii_lowercase();
        match name.as_str() {
            "mov" | "qt" => Ok(OutputFormat::Mov),
            "mp4" | "m4v" | "m4a" => Ok(OutputFormat::Mp4),
            "matroska" | "mkv" | "mka" => Ok(OutputFormat::Matroska),
            "ogg" | "ogv" | "oga" => Ok(OutputFormat::Ogg),
            _ => Err(Error::Configuration(format!(
                "Unknown container format: {}",
                name
            ))),
        }
    }

    /// Guess the format from a file extension
    pub fn guess<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|extension| extension.to_str())
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "Cannot guess container format of {}",
                    path.display()
                ))
            })?;

        Self::find(extension)
    }

    /// Look up a format by name and check it pairs with built-in encoders
    pub fn require(name: &str) -> Result<Self> {
        Self::find(name)?.validated()
    }

    pub fn default_video_codec(self) -> Option<CodecId> {
        match self {
            OutputFormat::Mov | OutputFormat::Mp4 | OutputFormat::Matroska => Some(CodecId::Av1),
            OutputFormat::Ogg => None,
        }
    }

    pub fn default_audio_codec(self) -> Option<CodecId> {
        match self {
            OutputFormat::Mp4 | OutputFormat::Matroska => Some(CodecId::PcmS16le),
            OutputFormat::Mov => Some(CodecId::PcmS16be),
            OutputFormat::Ogg => None,
        }
    }

    pub fn default_codec(self, media_type: MediaType) -> Result<CodecId> {
        let codec = match media_type {
            MediaType::Audio => self.default_audio_codec(),
            MediaType::Video => self.default_video_codec(),
        };

        codec.ok_or_else(|| {
            Error::Configuration(format!("{} {} codec not found", self.name(), media_type))
        })
    }

    /// Codec configuration goes in the header rather than the bitstream
    pub fn global_header(self) -> bool {
        !matches!(self, OutputFormat::Ogg)
    }

    pub fn supports_codec(self, codec: CodecId) -> bool {
        match self {
            OutputFormat::Matroska => true,
            OutputFormat::Mp4 => codec != CodecId::RawVideo,
            OutputFormat::Mov => matches!(
                codec,
                CodecId::Av1 | CodecId::PcmS16le | CodecId::PcmS16be
            ),
            OutputFormat::Ogg => false,
        }
    }

    fn validated(self) -> Result<Self> {
        self.default_codec(MediaType::Video)?;
        self.default_codec(MediaType::Audio)?;
        Ok(self)
    }

    fn create_muxer(self, writer: Box<dyn WriteSeek>) -> Result<Box<dyn Muxer>> {
        match self {
            OutputFormat::Matroska => Ok(Box::new(matroska::MatroskaMuxer::new(writer))),
            OutputFormat::Mp4 => Ok(Box::new(mp4::Mp4Muxer::new(writer, mp4::Brand::Iso))),
            OutputFormat::Mov => Ok(Box::new(mp4::Mp4Muxer::new(writer, mp4::Brand::QuickTime))),
            OutputFormat::Ogg => Err(Error::Configuration(
                "ogg muxer is not available".to_string(),
            )),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One stream of the container
#[derive(Debug, Clone)]
pub struct Stream {
    pub index: usize,
    pub media_type: MediaType,
    /// Time base of packet timestamps; muxers may change it while writing the header
    pub time_base: Rational,
    pub parameters: Option<CodecParameters>,
    pub packets_written: u64,
}

impl Stream {
    /// Codec parameters, which every stream has once the header is written
    pub fn codec_parameters(&self) -> Result<&CodecParameters> {
        self.parameters.as_ref().ok_or_else(|| {
            Error::Container(format!("Stream {} has no codec parameters", self.index))
        })
    }
}

/// Container muxer trait
pub trait Muxer: Send {
    /// Write the header. May adjust the streams' time bases.
    fn write_header(&mut self, streams: &mut [Stream]) -> Result<()>;

    /// Write one packet whose timestamps are in `stream.time_base`
    fn write_packet(&mut self, stream: &Stream, packet: &Packet) -> Result<()>;

    /// Write the trailer and flush the output
    fn write_trailer(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Open,
    Initialized,
    Finalized,
}

/// Owns the output file and the muxer shared by all output channels
pub struct ContainerWriter {
    format: OutputFormat,
    muxer: Box<dyn Muxer>,
    streams: Vec<Stream>,
    /// Packets waiting for interleaving, per stream, in arrival order
    queues: Vec<VecDeque<Packet>>,
    /// Last dts handed over per stream
    last_dts: Vec<Option<i64>>,
    state: State,
}

impl ContainerWriter {
    /// Create `path` and write `format` to it
    pub fn create<P: AsRef<Path>>(format: OutputFormat, path: P) -> Result<Self> {
        let format = format.validated()?;
        let file = File::create(path.as_ref()).map_err(Error::Io)?;

        tracing::debug!(format = %format, path = %path.as_ref().display(), "Container created");
        Self::with_writer(format, BufWriter::new(file))
    }

    /// Create `path`, guessing the format from its extension
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::create(OutputFormat::guess(path.as_ref())?, path)
    }

    /// Write `format` to any seekable sink
    pub fn with_writer<W: Write + Seek + Send + 'static>(format: OutputFormat, writer: W) -> Result<Self> {
        let format = format.validated()?;
        let muxer = format.create_muxer(Box::new(writer))?;
        Ok(Self::with_muxer(format, muxer))
    }

    fn with_muxer(format: OutputFormat, muxer: Box<dyn Muxer>) -> Self {
        Self {
            format,
            muxer,
            streams: Vec::new(),
            queues: Vec::new(),
            last_dts: Vec::new(),
            state: State::Open,
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn streams(&self) -> &[Stream] {
        &self.streams
    }

    pub fn stream(&self, index: usize) -> Result<&Stream> {
        self.streams
            .get(index)
            .ok_or_else(|| Error::Container(format!("Unknown stream index {}", index)))
    }

    /// Add a stream, returning its index. Only allowed before initialization.
    pub fn add_stream(&mut self, media_type: MediaType, time_base: Rational) -> Result<usize> {
        if self.state != State::Open {
            return Err(Error::Container(
                "Streams must be added before the container is initialized".to_string(),
            ));
        }

        let index = self.streams.len();
        self.streams.push(Stream {
            index,
            media_type,
            time_base,
            parameters: None,
            packets_written: 0,
        });
        self.queues.push(VecDeque::new());
        self.last_dts.push(None);

        tracing::debug!(index, %media_type, %time_base, "Stream added");
        Ok(index)
    }

    /// Attach encoder parameters to a stream. Only allowed before initialization.
    pub fn set_codec_parameters(&mut self, index: usize, parameters: CodecParameters) -> Result<()> {
        if self.state != State::Open {
            return Err(Error::Container(
                "Codec parameters must be set before the container is initialized".to_string(),
            ));
        }

        let format = self.format;
        let stream = self
            .streams
            .get_mut(index)
            .ok_or_else(|| Error::Container(format!("Unknown stream index {}", index)))?;

        if parameters.media_type() != stream.media_type {
            return Err(Error::Configuration(format!(
                "Stream {} is {}, codec parameters are {}",
                index,
                stream.media_type,
                parameters.media_type()
            )));
        }

        if !format.supports_codec(parameters.codec_id) {
            return Err(Error::Configuration(format!(
                "{} cannot store {}",
                format, parameters.codec_id
            )));
        }

        stream.parameters = Some(parameters);
        Ok(())
    }

    /// Write the header. Options the muxer does not use are logged and left in place.
    pub fn initialize(&mut self, options: &Dictionary) -> Result<()> {
        if self.state != State::Open {
            return Err(Error::Container("Container is already initialized".to_string()));
        }

        if self.streams.is_empty() {
            return Err(Error::Container("Container has no streams".to_string()));
        }

        for stream in &self.streams {
            stream.codec_parameters()?;
        }

        self.muxer.write_header(&mut self.streams)?;
        self.state = State::Initialized;

        for key in options.keys() {
            tracing::warn!(key, "Codec option not used");
        }

        for stream in &self.streams {
            tracing::debug!(
                index = stream.index,
                time_base = %stream.time_base,
                "Header written"
            );
        }

        Ok(())
    }

    /// Queue a packet for writing. The packet's contents move into the container.
    pub fn write_packet(&mut self, packet: &mut Packet) -> Result<()> {
        if self.state != State::Initialized {
            return Err(Error::Container(format!(
                "Cannot write packets while the container is {:?}",
                self.state
            )));
        }

        let index = packet.stream_index;
        self.stream(index)?;

        if let Some(last) = self.last_dts[index] {
            if packet.dts < last {
                return Err(Error::Container(format!(
                    "Non-monotonic dts in stream {}: {} after {}",
                    index, packet.dts, last
                )));
            }
        }
        self.last_dts[index] = Some(packet.dts);

        self.queues[index].push_back(packet.take());
        self.interleave(false)
    }

    /// Flush queued packets, write the trailer and close the container
    pub fn finalize(&mut self) -> Result<()> {
        match self.state {
            State::Open => {
                return Err(Error::Container(
                    "Cannot finalize a container that was never initialized".to_string(),
                ))
            }
            State::Finalized => {
                return Err(Error::Container("Container is already finalized".to_string()))
            }
            State::Initialized => {}
        }

        // Terminal even when the trailer fails, so drop does not retry
        self.state = State::Finalized;
        self.interleave(true)?;
        self.muxer.write_trailer()?;

        tracing::debug!(
            format = %self.format,
            packets = self.streams.iter().map(|stream| stream.packets_written).sum::<u64>(),
            "Trailer written"
        );
        Ok(())
    }

    fn head_time(&self, index: usize) -> Option<TimeStamp> {
        self.queues[index]
            .front()
            .map(|packet| TimeStamp::new(packet.dts, self.streams[index].time_base))
    }

    fn tail_time(&self, index: usize) -> Option<TimeStamp> {
        self.queues[index]
            .back()
            .map(|packet| TimeStamp::new(packet.dts, self.streams[index].time_base))
    }

    /// Write queued packets in dts order across streams.
    ///
    /// The earliest packet goes out once every stream has one queued, or
    /// once the queue spans more than the maximum interleave delta, or
    /// unconditionally when `flush` is set.
    fn interleave(&mut self, flush: bool) -> Result<()> {
        loop {
            let earliest = (0..self.queues.len())
                .filter_map(|index| self.head_time(index).map(|time| (time, index)))
                .min();

            let Some((head, index)) = earliest else {
                return Ok(());
            };

            if !flush && self.queues.iter().any(VecDeque::is_empty) {
                let latest = (0..self.queues.len())
                    .filter_map(|index| self.tail_time(index))
                    .max()
                    .unwrap_or(head);

                let delta = rescale(MAX_INTERLEAVE_DELTA_SECONDS, Rational::SECOND, head.time_base());
                let limit = TimeStamp::new(head.count().saturating_add(delta), head.time_base());

                if latest <= limit {
                    return Ok(());
                }
            }

            let Some(packet) = self.queues[index].pop_front() else {
                return Ok(());
            };

            let stream = &mut self.streams[index];
            let pts = TimeStamp::new(packet.pts, stream.time_base);
            tracing::trace!(
                stream = index,
                pts = packet.pts,
                pts_time = %Seconds(&pts),
                dts = packet.dts,
                duration = packet.duration,
                size = packet.data.len(),
                keyframe = packet.is_keyframe,
                "Writing packet"
            );

            self.muxer.write_packet(stream, &packet)?;
            stream.packets_written += 1;
        }
    }
}

impl Drop for ContainerWriter {
    fn drop(&mut self) {
        if self.state == State::Initialized {
            if let Err(e) = self.finalize() {
                tracing::error!(error = %e, "Failed to finalize container");
            }
        }
    }
}
