//! Rising-pitch audio sweep

use super::Generator;
use crate::format::ChannelLayout;
use crate::frame::Frame;
use crate::{Error, Result};
use std::f64::consts::PI;

/// Peak level of integral samples, in 16-bit units
const INTEGRAL_LEVEL: f64 = 20000.0;

/// Sum of three harmonics whose pitch rises linearly from `start_hz` until it
/// reaches `stop_hz`. Every channel carries the same signal.
#[derive(Debug, Clone)]
pub struct AudioSweep {
    sample_rate: u32,
    channel_layout: ChannelLayout,
    start_hz: f64,
    stop_hz: f64,
    /// Phase of the next sample
    time: f64,
    /// Phase advance per sample
    sample_period: f64,
    sample_period_increment: f64,
    max_sample_period: f64,
}

impl AudioSweep {
    pub fn new(
        sample_rate: u32,
        channel_layout: ChannelLayout,
        start_hz: f64,
        increase_hz_per_second: f64,
        stop_hz: f64,
    ) -> Self {
        let rate = sample_rate as f64;

        Self {
            sample_rate,
            channel_layout,
            start_hz,
            stop_hz,
            time: 0.0,
            sample_period: 2.0 * PI * start_hz / rate,
            sample_period_increment: 2.0 * PI * increase_hz_per_second / (rate * rate),
            max_sample_period: 2.0 * PI * stop_hz / rate,
        }
    }

    pub fn start_hz(&self) -> f64 {
        self.start_hz
    }

    pub fn stop_hz(&self) -> f64 {
        self.stop_hz
    }

    /// Signal value at phase `time`, within [-1, 1]
    pub fn sample(time: f64) -> f64 {
        let value1 = time.sin();
        let value2 = (2.0 * time).sin() * 0.75;
        let value3 = (2.5 * time).sin() * 0.8;
        (value1 + value2 + value3) / 3.0
    }

    fn advance(&mut self) -> f64 {
        let value = Self::sample(self.time);
        self.time += self.sample_period;
        if self.sample_period < self.max_sample_period {
            self.sample_period += self.sample_period_increment;
        }
        value
    }
}

impl Generator for AudioSweep {
    fn fill_frame(&mut self, frame: &mut Frame) -> Result<()> {
        let format = frame
            .audio_format()
            .ok_or_else(|| Error::InvalidInput("Audio sweep needs an audio frame".to_string()))?;

        if format.channel_layout != self.channel_layout || format.sample_rate != self.sample_rate {
            return Err(Error::InvalidInput(format!(
                "Audio sweep generates {} at {} Hz, frame is {} at {} Hz",
                self.channel_layout, self.sample_rate, format.channel_layout, format.sample_rate
            )));
        }

        let sample_format = format.sample_format;
        let bytes = sample_format.bytes_per_sample();
        let channels = self.channel_layout.channel_count();
        // Integral formats sit at a fixed level below full scale
        let level = if sample_format.is_integral() {
            INTEGRAL_LEVEL / i16::MAX as f64
        } else {
            1.0
        };

        let nb_samples = frame.nb_samples();
        let mut planes = frame.planes_mut();

        for j in 0..nb_samples {
            let value = self.advance() * level;
            for c in 0..channels {
                let (plane, offset) = if sample_format.is_planar() {
                    (c, j * bytes)
                } else {
                    (0, (j * channels + c) * bytes)
                };
                sample_format.write_unit(value, &mut planes[plane][offset..offset + bytes]);
            }
        }

        Ok(())
    }

    fn reset(&mut self) {
        self.time = 0.0;
        self.sample_period = 2.0 * PI * self.start_hz / self.sample_rate as f64;
    }
}
