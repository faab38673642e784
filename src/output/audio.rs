//! Audio encoder output channel

use super::{Output, OutputChannel};
use crate::codec::{AudioCodecParams, Codec, CodecParameters, CodecParamsType};
use crate::container::ContainerWriter;
use crate::convert::{self, Resampler};
use crate::dictionary::Dictionary;
use crate::format::{AudioFormat, MediaType};
use crate::frame::Frame;
use crate::options::AudioOptions;
use crate::time_stamp::{Rational, TimeStamp};
use crate::{Error, Result};

/// Samples per frame for codecs that accept any frame size
pub const VARIABLE_FRAME_SAMPLES: usize = 10000;

/// Producer-side buffer and the resampler feeding the encoder's frame
struct Intermediate {
    frame: Frame,
    resampler: Resampler,
}

/// Encodes audio frames into one stream of a container
pub struct AudioOutput {
    output: Output,
    options: AudioOptions,
    /// Frame in the encoder's format
    frame: Frame,
    intermediate: Option<Intermediate>,
    /// Presentation time of the next frame, in samples
    time_stamp: TimeStamp,
    sample_count: usize,
}

impl AudioOutput {
    /// Add an audio stream to `container` and open its encoder.
    ///
    /// Options consumed by the encoder are removed from `codec_options`.
    pub fn new(
        container: &mut ContainerWriter,
        codec_options: &mut Dictionary,
        options: AudioOptions,
    ) -> Result<Self> {
        let codec = Output::select_codec(container, MediaType::Audio, options.codec)?;
        let time_base = Rational::per(options.sample_rate)?;
        let stream_index = container.add_stream(MediaType::Audio, time_base)?;

        let sample_format = codec.default_sample_format();
        options.require_compatible(codec)?;

        let parameters = CodecParameters {
            codec_id: codec.id,
            bit_rate: options.bit_rate,
            time_base,
            global_header: false,
            extradata: Vec::new(),
            params: CodecParamsType::Audio(AudioCodecParams {
                sample_rate: options.sample_rate,
                channel_layout: options.channel_layout,
                sample_format,
                frame_size: 0,
            }),
        };

        let output = Output::open(container, codec, stream_index, parameters, codec_options)?;
        let sample_count = Self::buffer_size(codec, output.encoder().frame_size())?;

        let codec_format = AudioFormat {
            sample_format,
            ..options.format()
        };
        let frame = Frame::audio(codec_format, sample_count)?;

        let intermediate = if convert::needs_conversion(&options.format(), &codec_format) {
            Some(Intermediate {
                frame: Frame::audio(options.format(), sample_count)?,
                resampler: Resampler::new(options.format(), codec_format)?,
            })
        } else {
            None
        };

        tracing::debug!(
            codec = codec.name,
            stream = stream_index,
            sample_rate = options.sample_rate,
            layout = %options.channel_layout,
            producer_format = %options.sample_format,
            codec_format = %sample_format,
            sample_count,
            converting = intermediate.is_some(),
            "Audio output opened"
        );

        Ok(Self {
            output,
            options,
            frame,
            intermediate,
            time_stamp: TimeStamp::new(0, time_base),
            sample_count,
        })
    }

    fn buffer_size(codec: &Codec, frame_size: u32) -> Result<usize> {
        if codec.capabilities.variable_frame_size {
            return Ok(VARIABLE_FRAME_SAMPLES);
        }

        if frame_size == 0 {
            return Err(Error::Codec(format!(
                "{} encoder reported no frame size",
                codec.name
            )));
        }

        Ok(frame_size as usize)
    }

    /// Writable buffer in the producer's sample format.
    ///
    /// Calling this twice without `write_frame()` returns the same buffer.
    pub fn next_frame(&mut self) -> Result<&mut Frame> {
        self.frame.make_writable();

        match &mut self.intermediate {
            Some(intermediate) => {
                intermediate.frame.make_writable();
                Ok(&mut intermediate.frame)
            }
            None => Ok(&mut self.frame),
        }
    }

    /// Convert, stamp and encode the current buffer
    ///
    /// The time stamp only advances when the frame was accepted.
    pub fn write_frame(&mut self, container: &mut ContainerWriter) -> Result<()> {
        self.output.ensure_writable()?;

        if let Some(intermediate) = &mut self.intermediate {
            let converted = intermediate
                .resampler
                .convert(&intermediate.frame, &mut self.frame)?;

            if converted != self.frame.nb_samples() {
                return Err(Error::Codec(format!(
                    "Error while converting: {} of {} samples",
                    converted,
                    self.frame.nb_samples()
                )));
            }
        }

        self.frame.set_pts(Some(self.time_stamp.count()));
        self.output.write(container, &self.frame)?;
        self.time_stamp += self.frame.nb_samples() as i64;
        Ok(())
    }

    /// Drain the encoder, returning the number of drain iterations
    pub fn flush(&mut self, container: &mut ContainerWriter) -> Result<usize> {
        self.output.flush(container)
    }

    /// Presentation time of the next frame
    pub fn time_stamp(&self) -> TimeStamp {
        self.time_stamp
    }

    /// Samples per channel in each frame
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn options(&self) -> &AudioOptions {
        &self.options
    }

    pub fn codec(&self) -> &'static Codec {
        self.output.codec()
    }

    pub fn stream_index(&self) -> usize {
        self.output.stream_index()
    }

    /// Time base of frame timestamps
    pub fn time_base(&self) -> Rational {
        self.output.time_base()
    }
}

impl OutputChannel for AudioOutput {
    fn time_stamp(&self) -> TimeStamp {
        AudioOutput::time_stamp(self)
    }

    fn next_frame(&mut self) -> Result<&mut Frame> {
        AudioOutput::next_frame(self)
    }

    fn write_frame(&mut self, container: &mut ContainerWriter) -> Result<()> {
        AudioOutput::write_frame(self, container)
    }

    fn flush(&mut self, container: &mut ContainerWriter) -> Result<usize> {
        AudioOutput::flush(self, container)
    }
}
