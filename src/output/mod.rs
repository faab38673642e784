//! Encoder output channels
//!
//! A channel owns one encoder and one container stream. The producer fills
//! the frame returned by `next_frame()`, then `write_frame()` converts it to
//! the negotiated format, encodes it and hands the packets to the container.
//! `flush()` drains the encoder at end of stream.

mod audio;
mod video;

pub use audio::AudioOutput;
pub use video::VideoOutput;

use crate::codec::{self, Codec, CodecParameters, Encoder, Received};
use crate::container::ContainerWriter;
use crate::dictionary::Dictionary;
use crate::format::MediaType;
use crate::frame::{Frame, Packet};
use crate::time_stamp::{Rational, Seconds, TimeStamp};
use crate::{Error, Result};

/// Common interface of audio and video channels, used by the pacing driver
pub trait OutputChannel {
    /// Presentation time of the next frame
    fn time_stamp(&self) -> TimeStamp;

    /// Writable buffer for the next frame
    fn next_frame(&mut self) -> Result<&mut Frame>;

    /// Encode the buffer returned by `next_frame()`
    fn write_frame(&mut self, container: &mut ContainerWriter) -> Result<()>;

    /// Drain the encoder, returning the number of drain iterations
    fn flush(&mut self, container: &mut ContainerWriter) -> Result<usize>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Opened,
    Flushing,
    Flushed,
}

/// Encoder and stream shared by the audio and video channels
pub(crate) struct Output {
    codec: &'static Codec,
    encoder: Box<dyn Encoder>,
    stream_index: usize,
    /// Time base of frame and packet timestamps coming out of the encoder
    time_base: Rational,
    packet: Packet,
    state: State,
}

impl Output {
    /// The requested codec, or the container's default for `media_type`
    pub(crate) fn select_codec(
        container: &ContainerWriter,
        media_type: MediaType,
        requested: Option<&'static Codec>,
    ) -> Result<&'static Codec> {
        let codec = match requested {
            Some(codec) => codec,
            None => codec::find_encoder(container.format().default_codec(media_type)?)?,
        };

        if codec.media_type != media_type {
            return Err(Error::Configuration(format!(
                "Codec {} is not a {} encoder",
                codec.name, media_type
            )));
        }

        Ok(codec)
    }

    /// Open the encoder and publish its parameters on the stream
    pub(crate) fn open(
        container: &mut ContainerWriter,
        codec: &'static Codec,
        stream_index: usize,
        mut parameters: CodecParameters,
        codec_options: &mut Dictionary,
    ) -> Result<Self> {
        parameters.global_header = container.format().global_header();

        let encoder = codec.open(&parameters, codec_options)?;
        parameters.extradata = encoder.extradata();

        let time_base = parameters.time_base;
        container.set_codec_parameters(stream_index, parameters)?;

        Ok(Self {
            codec,
            encoder,
            stream_index,
            time_base,
            packet: Packet::default(),
            state: State::Opened,
        })
    }

    pub(crate) fn codec(&self) -> &'static Codec {
        self.codec
    }

    pub(crate) fn encoder(&self) -> &dyn Encoder {
        self.encoder.as_ref()
    }

    pub(crate) fn stream_index(&self) -> usize {
        self.stream_index
    }

    pub(crate) fn time_base(&self) -> Rational {
        self.time_base
    }

    /// Fails once flushing has started
    pub(crate) fn ensure_writable(&self) -> Result<()> {
        if self.state != State::Opened {
            return Err(Error::Codec(format!(
                "Cannot write frames to a {:?} {} encoder",
                self.state, self.codec.name
            )));
        }

        Ok(())
    }

    /// Encode one frame and send the resulting packets to the container
    pub(crate) fn write(&mut self, container: &mut ContainerWriter, frame: &Frame) -> Result<()> {
        self.ensure_writable()?;
        self.send(container, Some(frame))?;
        Ok(())
    }

    /// Send end of stream until the encoder has nothing left
    pub(crate) fn flush(&mut self, container: &mut ContainerWriter) -> Result<usize> {
        if self.state == State::Flushed {
            return Ok(0);
        }

        self.state = State::Flushing;
        let mut iterations = 0;
        loop {
            iterations += 1;
            if self.send(container, None)? {
                break;
            }
        }
        self.state = State::Flushed;

        tracing::debug!(codec = self.codec.name, iterations, "Encoder flushed");
        Ok(iterations)
    }

    /// Returns true once the encoder reports end of stream
    fn send(&mut self, container: &mut ContainerWriter, frame: Option<&Frame>) -> Result<bool> {
        self.encoder.send_frame(frame)?;

        loop {
            match self.encoder.receive_packet(&mut self.packet)? {
                Received::TryAgain => return Ok(false),
                Received::EndOfStream => return Ok(true),
                Received::Packet => {}
            }

            // The muxer may have changed the stream time base in the header
            let stream_time_base = container.stream(self.stream_index)?.time_base;
            self.packet.rescale_ts(self.time_base, stream_time_base);
            self.packet.stream_index = self.stream_index;

            let pts = TimeStamp::new(self.packet.pts, stream_time_base);
            tracing::trace!(
                codec = self.codec.name,
                stream = self.stream_index,
                pts = self.packet.pts,
                pts_time = %Seconds(&pts),
                dts = self.packet.dts,
                duration = self.packet.duration,
                "Encoded packet"
            );

            container.write_packet(&mut self.packet)?;
        }
    }
}
