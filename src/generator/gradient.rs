//! Moving circle gradient test pattern

use super::Generator;
use crate::format::PixelFormat;
use crate::frame::Frame;
use crate::{Error, Result};
use image::{ImageBuffer, Luma, Rgb, RgbImage};
use std::f64::consts::TAU;

/// Distance of every pixel to the moving point
pub type Distances = ImageBuffer<Luma<u32>, Vec<u32>>;

/// Seconds per revolution of the moving point
const REVOLUTION_SECONDS: f64 = 6.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Point {
    x: i64,
    y: i64,
}

/// Distance field to a point travelling on a circle around the image centre,
/// one revolution every six seconds
#[derive(Debug, Clone)]
pub struct CircleGradient {
    time: f64,
    path_step: f64,
    height: u32,
    width: u32,
    phase: f64,
    center: Point,
    radius: i64,
}

impl CircleGradient {
    pub fn new(height: u32, width: u32, frames_per_second: u32) -> Self {
        Self::with_phase(height, width, frames_per_second, 0.0)
    }

    /// Start the point `phase` radians along its path
    pub fn with_phase(height: u32, width: u32, frames_per_second: u32, phase: f64) -> Self {
        Self {
            time: 0.0,
            path_step: TAU / (REVOLUTION_SECONDS * frames_per_second.max(1) as f64),
            height,
            width,
            phase,
            center: Point {
                x: (width / 2) as i64,
                y: (height / 2) as i64,
            },
            radius: (height.min(width) / 3) as i64,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn reset(&mut self) {
        self.time = 0.0;
    }

    pub fn tick(&mut self) {
        self.time += self.path_step;
    }

    /// Distances for the current position, then advance one frame
    pub fn next_distances(&mut self) -> Distances {
        let point = self.path_point();
        self.tick();

        ImageBuffer::from_fn(self.width, self.height, |x, y| {
            Luma([distance(x as i64 - point.x, y as i64 - point.y) as u32])
        })
    }

    /// Largest distance any pixel can have
    pub fn maximum_value(&self) -> u32 {
        let corner = distance((self.height / 2) as i64, (self.width / 2) as i64);
        (corner + self.radius) as u32
    }

    fn path_point(&self) -> Point {
        let angle = self.time + self.phase;
        let radius = self.radius as f64;

        Point {
            x: (radius * angle.cos()).round() as i64 + self.center.x,
            y: (radius * angle.sin()).round() as i64 + self.center.y,
        }
    }
}

/// Euclidean distance rounded up
fn distance(x: i64, y: i64) -> i64 {
    let x = x as f64;
    let y = y as f64;
    (x * x + y * y).sqrt().ceil() as i64
}

/// Polynomial fit of the Turbo colour map (Mikhailov, 2019), lowest order first
const TURBO_RED: [f64; 6] = [0.13572138, 4.61539260, -42.66032258, 132.13108234, -152.94239396, 59.28637943];
const TURBO_GREEN: [f64; 6] = [0.09140261, 2.19418839, 4.84296658, -14.18503333, 4.27729857, 2.82956604];
const TURBO_BLUE: [f64; 6] = [0.10667330, 12.64194608, -60.58204836, 110.36276771, -89.90310912, 27.34824973];

/// Turbo colour map sampled at `t` in [0, 1]
pub fn turbo(t: f64) -> Rgb<u8> {
    let t = t.clamp(0.0, 1.0);
    let channel = |coefficients: [f64; 6]| {
        let value = coefficients.iter().rev().fold(0.0, |acc, c| acc * t + c);
        (value.clamp(0.0, 1.0) * 255.0).round() as u8
    };

    Rgb([channel(TURBO_RED), channel(TURBO_GREEN), channel(TURBO_BLUE)])
}

/// [`CircleGradient`] coloured through the Turbo map
#[derive(Debug, Clone)]
pub struct CircleGradientColors {
    gradient: CircleGradient,
    /// One colour per distance value
    palette: Vec<Rgb<u8>>,
}

impl CircleGradientColors {
    pub fn new(height: u32, width: u32, frames_per_second: u32) -> Self {
        let gradient = CircleGradient::new(height, width, frames_per_second);
        let maximum = gradient.maximum_value().max(1);

        let palette = (0..=maximum)
            .map(|value| turbo(value as f64 / maximum as f64))
            .collect();

        Self { gradient, palette }
    }

    /// Bytes in one row of colour data, excluding any frame padding
    pub fn data_width(&self) -> usize {
        self.gradient.width() as usize * 3
    }

    /// Render the next image
    pub fn next_image(&mut self) -> RgbImage {
        let distances = self.gradient.next_distances();
        let last = self.palette.len() - 1;

        ImageBuffer::from_fn(distances.width(), distances.height(), |x, y| {
            let value = distances.get_pixel(x, y)[0] as usize;
            self.palette[value.min(last)]
        })
    }
}

impl Generator for CircleGradientColors {
    fn fill_frame(&mut self, frame: &mut Frame) -> Result<()> {
        if frame.pixel_format() != Some(PixelFormat::Rgb24)
            || frame.width() != self.gradient.width()
            || frame.height() != self.gradient.height()
        {
            return Err(Error::InvalidInput(format!(
                "Circle gradient needs a {}x{} rgb24 frame",
                self.gradient.width(),
                self.gradient.height()
            )));
        }

        let image = self.next_image();
        let row = self.data_width();
        let stride = frame.linesize(0);

        for (line, pixels) in frame
            .plane_mut(0)
            .chunks_mut(stride)
            .zip(image.as_raw().chunks(row))
        {
            line[..row].copy_from_slice(pixels);
        }

        Ok(())
    }

    fn reset(&mut self) {
        self.gradient.reset();
    }
}
