//! Video encoder output channel

use super::{Output, OutputChannel};
use crate::codec::{Codec, CodecParameters, CodecParamsType, VideoCodecParams};
use crate::container::ContainerWriter;
use crate::convert::{self, Reformat, ScaleFlag};
use crate::dictionary::Dictionary;
use crate::format::MediaType;
use crate::frame::Frame;
use crate::options::VideoOptions;
use crate::time_stamp::{Rational, TimeStamp};
use crate::{Error, Result};

struct Intermediate {
    frame: Frame,
    reformat: Reformat,
}

/// Encodes images into one stream of a container
pub struct VideoOutput {
    output: Output,
    options: VideoOptions,
    /// Frame in the encoder's pixel format
    frame: Frame,
    intermediate: Option<Intermediate>,
    /// Presentation time of the next frame, in frames
    time_stamp: TimeStamp,
}

impl VideoOutput {
    /// Add a video stream to `container` and open its encoder.
    ///
    /// `preset` and `crf` are written to `codec_options`; options consumed by
    /// the encoder are removed.
    pub fn new(
        container: &mut ContainerWriter,
        codec_options: &mut Dictionary,
        options: VideoOptions,
    ) -> Result<Self> {
        let codec = Output::select_codec(container, MediaType::Video, options.codec)?;
        options.validate()?;

        let time_base = Rational::per(options.frames_per_second)?;
        let stream_index = container.add_stream(MediaType::Video, time_base)?;

        codec_options.set("preset", options.preset.name());
        if let Some(crf) = options.quality_factor {
            codec_options.set("crf", crf.to_string());
        }

        if !codec.supports_pixel_format(options.out_pixel_format) {
            return Err(Error::Configuration(format!(
                "Pixel format {} not supported by {}",
                options.out_pixel_format, codec.name
            )));
        }

        let parameters = CodecParameters {
            codec_id: codec.id,
            bit_rate: options.bit_rate.unwrap_or(0),
            time_base,
            global_header: false,
            extradata: Vec::new(),
            params: CodecParamsType::Video(VideoCodecParams {
                width: options.width,
                height: options.height,
                pixel_format: options.out_pixel_format,
                frames_per_second: options.frames_per_second,
                gop_size: options.gop_size,
                profile: Some(options.profile),
            }),
        };

        let output = Output::open(container, codec, stream_index, parameters, codec_options)?;

        let frame = Frame::video(options.output_format())?;
        let intermediate =
            if convert::needs_conversion(&options.in_pixel_format, &options.out_pixel_format) {
                Some(Intermediate {
                    frame: Frame::video(options.input_format())?,
                    reformat: Reformat::new(
                        options.input_format(),
                        options.output_format(),
                        ScaleFlag::Bicubic,
                    )?,
                })
            } else {
                None
            };

        tracing::debug!(
            codec = codec.name,
            stream = stream_index,
            width = options.width,
            height = options.height,
            fps = options.frames_per_second,
            producer_format = %options.in_pixel_format,
            codec_format = %options.out_pixel_format,
            converting = intermediate.is_some(),
            "Video output opened"
        );

        Ok(Self {
            output,
            options,
            frame,
            intermediate,
            time_stamp: TimeStamp::new(0, time_base),
        })
    }

    /// Writable image in the producer's pixel format.
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

    /// Row stride in bytes of the first plane of the producer's image
    pub fn stride(&self) -> usize {
        match &self.intermediate {
            Some(intermediate) => intermediate.frame.linesize(0),
            None => self.frame.linesize(0),
        }
    }

    /// Convert, stamp and encode the current image
    ///
    /// The time stamp only advances when the image was accepted.
    pub fn write_frame(&mut self, container: &mut ContainerWriter) -> Result<()> {
        self.output.ensure_writable()?;

        if let Some(intermediate) = &mut self.intermediate {
            let rows = intermediate
                .reformat
                .convert(&intermediate.frame, &mut self.frame)?;

            if rows != self.options.height as usize {
                return Err(Error::Codec(format!(
                    "Error while converting: {} of {} rows",
                    rows, self.options.height
                )));
            }
        }

        self.frame.set_pts(Some(self.time_stamp.count()));
        self.output.write(container, &self.frame)?;
        self.time_stamp.increment();
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

    pub fn options(&self) -> &VideoOptions {
        &self.options
    }

    pub fn codec(&self) -> &'static Codec {
        self.output.codec()
    }

    pub fn stream_index(&self) -> usize {
        self.output.stream_index()
    }
}

impl OutputChannel for VideoOutput {
    fn time_stamp(&self) -> TimeStamp {
        VideoOutput::time_stamp(self)
    }

    fn next_frame(&mut self) -> Result<&mut Frame> {
        VideoOutput::next_frame(self)
    }

    fn write_frame(&mut self, container: &mut ContainerWriter) -> Result<()> {
        VideoOutput::write_frame(self, container)
    }

    fn flush(&mut self, container: &mut ContainerWriter) -> Result<usize> {
        VideoOutput::flush(self, container)
    }
}
