//! Audio sample format, channel layout and sample rate conversion

use crate::format::{AudioFormat, SampleFormat};
use crate::frame::Frame;
use crate::{Error, Result};

/// How target channels are derived from source channels
#[derive(Debug, Clone, PartialEq, Eq)]
enum Remix {
    /// Same channel count, copied one to one
    Direct,
    /// One source channel copied to every target channel
    FanOut,
    /// Every source channel averaged into one
    Average,
    /// Target channel `i` takes source channel `i`, or silence
    Index,
}

/// Converts audio frames between two [`AudioFormat`]s.
///
/// Rate conversion is linear interpolation with the fractional position and
/// the last input sample carried between calls, so consecutive frames join
/// without clicks. An output position past the last input sample waits for
/// the next call, so when upsampling each call can produce one sample fewer
/// than the rate ratio suggests. Output that does not fit in the target frame
/// is kept and delivered first on the next call.
pub struct Resampler {
    source: AudioFormat,
    target: AudioFormat,
    remix: Remix,
    /// Input samples per output sample
    step: f64,
    /// Position of the next output sample relative to the start of the next input
    position: f64,
    /// Last remixed input sample per target channel
    last: Vec<f64>,
    /// Converted samples waiting for room in a target frame, per target channel
    pending: Vec<Vec<f64>>,
}

impl Resampler {
    pub fn new(source: AudioFormat, target: AudioFormat) -> Result<Self> {
        let source_channels = source.channel_layout.channel_count();
        let target_channels = target.channel_layout.channel_count();

        if source_channels == 0 || target_channels == 0 {
            return Err(Error::Allocation(
                "Failed to initialize resampler: no channels".to_string(),
            ));
        }

        if source.sample_rate == 0 || target.sample_rate == 0 {
            return Err(Error::Allocation(format!(
                "Failed to initialize resampler: {} Hz to {} Hz",
                source.sample_rate, target.sample_rate
            )));
        }

        let remix = if source_channels == target_channels {
            Remix::Direct
        } else if source_channels == 1 {
            Remix::FanOut
        } else if target_channels == 1 {
            Remix::Average
        } else {
            Remix::Index
        };

        tracing::debug!(
            from = %source.sample_format,
            to = %target.sample_format,
            from_rate = source.sample_rate,
            to_rate = target.sample_rate,
            from_layout = %source.channel_layout,
            to_layout = %target.channel_layout,
            "Resampler created"
        );

        Ok(Self {
            source,
            target,
            remix,
            step: source.sample_rate as f64 / target.sample_rate as f64,
            position: 0.0,
            last: vec![0.0; target_channels],
            pending: vec![Vec::new(); target_channels],
        })
    }

    pub fn source(&self) -> AudioFormat {
        self.source
    }

    pub fn target(&self) -> AudioFormat {
        self.target
    }

    /// Samples per channel converted but not yet delivered
    pub fn buffered(&self) -> usize {
        self.pending[0].len()
    }

    /// Convert `source` into `target`, returning the samples written per channel
    pub fn convert(&mut self, source: &Frame, target: &mut Frame) -> Result<usize> {
        if source.audio_format() != Some(self.source) {
            return Err(Error::InvalidInput(format!(
                "Resampler source frame is not {} {} Hz {}",
                self.source.sample_format, self.source.sample_rate, self.source.channel_layout
            )));
        }

        if target.audio_format() != Some(self.target) {
            return Err(Error::InvalidInput(format!(
                "Resampler target frame is not {} {} Hz {}",
                self.target.sample_format, self.target.sample_rate, self.target.channel_layout
            )));
        }

        let input = self.remix(&read_channels(source));
        self.interpolate(&input);

        let count = self.buffered().min(target.nb_samples());
        write_channels(target, &self.pending, count);

        for channel in &mut self.pending {
            channel.drain(..count);
        }

        Ok(count)
    }

    fn remix(&self, input: &[Vec<f64>]) -> Vec<Vec<f64>> {
        let target_channels = self.target.channel_layout.channel_count();
        let length = input.first().map_or(0, Vec::len);

        match self.remix {
            Remix::Direct => input.to_vec(),
            Remix::FanOut => vec![input[0].clone(); target_channels],
            Remix::Average => {
                let scale = 1.0 / input.len() as f64;
                let mixed = (0..length)
                    .map(|i| input.iter().map(|channel| channel[i]).sum::<f64>() * scale)
                    .collect();
                vec![mixed]
            }
            Remix::Index => (0..target_channels)
                .map(|c| input.get(c).cloned().unwrap_or_else(|| vec![0.0; length]))
                .collect(),
        }
    }

    fn interpolate(&mut self, input: &[Vec<f64>]) {
        if self.source.sample_rate == self.target.sample_rate {
            for (pending, channel) in self.pending.iter_mut().zip(input) {
                pending.extend_from_slice(channel);
            }
            return;
        }

        let length = input[0].len();
        if length == 0 {
            return;
        }

        // Index -1 refers to the last sample of the previous call
        let mut position = self.position;
        while position <= (length - 1) as f64 {
            let floor = position.floor();
            let fraction = position - floor;
            let index = floor as isize;

            for (c, channel) in input.iter().enumerate() {
                let a = if index < 0 {
                    self.last[c]
                } else {
                    channel[index as usize]
                };
                let b = channel
                    .get((index + 1) as usize)
                    .copied()
                    .unwrap_or(a);
                self.pending[c].push(a + (b - a) * fraction);
            }

            position += self.step;
        }

        self.position = position - length as f64;
        for (last, channel) in self.last.iter_mut().zip(input) {
            *last = channel[length - 1];
        }
    }
}

/// Sample `i` of channel `c` lives at this plane and byte offset
fn locate(format: SampleFormat, channels: usize, c: usize, i: usize) -> (usize, usize) {
    let bytes = format.bytes_per_sample();
    if format.is_planar() {
        (c, i * bytes)
    } else {
        (0, (i * channels + c) * bytes)
    }
}

fn read_channels(frame: &Frame) -> Vec<Vec<f64>> {
    let Some(format) = frame.audio_format() else {
        return Vec::new();
    };

    let sample_format = format.sample_format;
    let channels = format.channel_layout.channel_count();
    let bytes = sample_format.bytes_per_sample();

    (0..channels)
        .map(|c| {
            (0..frame.nb_samples())
                .map(|i| {
                    let (plane, offset) = locate(sample_format, channels, c, i);
                    sample_format.read_unit(&frame.plane(plane)[offset..offset + bytes])
                })
                .collect()
        })
        .collect()
}

fn write_channels(frame: &mut Frame, input: &[Vec<f64>], count: usize) {
    let Some(format) = frame.audio_format() else {
        return;
    };

    let sample_format = format.sample_format;
    let channels = format.channel_layout.channel_count();
    let bytes = sample_format.bytes_per_sample();
    let mut planes = frame.planes_mut();

    for (c, channel) in input.iter().enumerate().take(channels) {
        for (i, &value) in channel.iter().enumerate().take(count) {
            let (plane, offset) = locate(sample_format, channels, c, i);
            sample_format.write_unit(value, &mut planes[plane][offset..offset + bytes]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{ChannelLayout, Sample};

    fn format(sample_format: SampleFormat, sample_rate: u32, channel_layout: ChannelLayout) -> AudioFormat {
        AudioFormat {
            sample_format,
            sample_rate,
            channel_layout,
        }
    }

    fn fill_planar_s16(frame: &mut Frame, values: &[i16]) {
        for plane in frame.planes_mut() {
            for (bytes, value) in plane.chunks_exact_mut(2).zip(values) {
                value.write_ne(bytes);
            }
        }
    }

    #[test]
    fn test_planar_to_interleaved() {
        let source_format = format(SampleFormat::S16p, 44100, ChannelLayout::STEREO);
        let target_format = format(SampleFormat::S16, 44100, ChannelLayout::STEREO);
        let mut resampler = Resampler::new(source_format, target_format).unwrap();

        let mut source = Frame::audio(source_format, 4).unwrap();
        fill_planar_s16(&mut source, &[1000, -1000, 2000, -2000]);
        let mut target = Frame::audio(target_format, 4).unwrap();

        assert_eq!(resampler.convert(&source, &mut target).unwrap(), 4);

        let values: Vec<i16> = target
            .plane(0)
            .chunks_exact(2)
            .map(i16::read_ne)
            .collect();
        assert_eq!(values, vec![1000, 1000, -1000, -1000, 2000, 2000, -2000, -2000]);
    }

    #[test]
    fn test_integer_to_float_and_mono_fan_out() {
        let source_format = format(SampleFormat::S16, 8000, ChannelLayout::MONO);
        let target_format = format(SampleFormat::Fltp, 8000, ChannelLayout::STEREO);
        let mut resampler = Resampler::new(source_format, target_format).unwrap();

        let mut source = Frame::audio(source_format, 2).unwrap();
        i16::MAX.write_ne(&mut source.plane_mut(0)[0..2]);
        let mut target = Frame::audio(target_format, 2).unwrap();

        assert_eq!(resampler.convert(&source, &mut target).unwrap(), 2);
        assert_eq!(f32::read_ne(&target.plane(0)[0..4]), 1.0);
        assert_eq!(f32::read_ne(&target.plane(1)[0..4]), 1.0);
        assert_eq!(f32::read_ne(&target.plane(1)[4..8]), 0.0);
    }

    #[test]
    fn test_rate_conversion_keeps_leftovers() {
        let source_format = format(SampleFormat::Flt, 8000, ChannelLayout::MONO);
        let target_format = format(SampleFormat::Flt, 16000, ChannelLayout::MONO);
        let mut resampler = Resampler::new(source_format, target_format).unwrap();

        let source = Frame::audio(source_format, 100).unwrap();
        let mut target = Frame::audio(target_format, 150).unwrap();

        // Positions 0, 0.5 .. 99 are produced; 99.5 needs the next input
        assert_eq!(resampler.convert(&source, &mut target).unwrap(), 150);
        assert_eq!(resampler.buffered(), 49);

        // The held position comes out first, then 0 .. 99 again
        assert_eq!(resampler.convert(&source, &mut target).unwrap(), 150);
        assert_eq!(resampler.buffered(), 99);

        let mut large = Frame::audio(target_format, 400).unwrap();
        assert_eq!(resampler.convert(&source, &mut large).unwrap(), 299);
        assert_eq!(resampler.buffered(), 0);
    }

    #[test]
    fn test_rejects_mismatched_frames() {
        let source_format = format(SampleFormat::S16p, 44100, ChannelLayout::STEREO);
        let target_format = format(SampleFormat::S16, 44100, ChannelLayout::STEREO);
        let mut resampler = Resampler::new(source_format, target_format).unwrap();

        let source = Frame::audio(target_format, 4).unwrap();
        let mut target = Frame::audio(target_format, 4).unwrap();
        assert!(resampler.convert(&source, &mut target).is_err());
    }

    #[test]
    fn test_zero_rate_is_allocation_error() {
        let source_format = format(SampleFormat::S16p, 0, ChannelLayout::STEREO);
        let target_format = format(SampleFormat::S16, 44100, ChannelLayout::STEREO);
        assert!(matches!(
            Resampler::new(source_format, target_format),
            Err(Error::Allocation(_))
        ));
    }
}
