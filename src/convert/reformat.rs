//! Pixel format conversion between same-sized images

use crate::format::{PixelFormat, VideoFormat};
use crate::frame::Frame;
use crate::{Error, Result};

/// Filter used when chroma planes are resampled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScaleFlag {
    /// Nearest sample
    Point,
    /// Linear blend of the 2x2 neighbourhood
    Bilinear,
    /// Catmull-Rom spline over the 4x4 neighbourhood
    #[default]
    Bicubic,
}

/// Converts images between two [`VideoFormat`]s of equal dimensions.
///
/// Every conversion passes through full-resolution BT.601 Y/Cb/Cr planes.
pub struct Reformat {
    source: VideoFormat,
    target: VideoFormat,
    flag: ScaleFlag,
    luma: Vec<f32>,
    blue: Vec<f32>,
    red: Vec<f32>,
}

impl Reformat {
    pub fn new(source: VideoFormat, target: VideoFormat, flag: ScaleFlag) -> Result<Self> {
        if source.width != target.width || source.height != target.height {
            return Err(Error::Configuration(format!(
                "Cannot reformat {}x{} to {}x{}: dimensions must match",
                source.width, source.height, target.width, target.height
            )));
        }

        if source.width == 0 || source.height == 0 {
            return Err(Error::Allocation(
                "Failed to initialize reformat context: empty image".to_string(),
            ));
        }

        let pixels = source.width as usize * source.height as usize;

        tracing::debug!(
            from = %source.pixel_format,
            to = %target.pixel_format,
            width = source.width,
            height = source.height,
            ?flag,
            "Reformat created"
        );

        Ok(Self {
            source,
            target,
            flag,
            luma: vec![0.0; pixels],
            blue: vec![0.0; pixels],
            red: vec![0.0; pixels],
        })
    }

    pub fn source(&self) -> VideoFormat {
        self.source
    }

    pub fn target(&self) -> VideoFormat {
        self.target
    }

    /// Convert one full image, returning the number of rows written
    pub fn convert(&mut self, source: &Frame, target: &mut Frame) -> Result<usize> {
        if source.video_format() != Some(self.source) {
            return Err(Error::InvalidInput(format!(
                "Reformat source frame is not {} {}x{}",
                self.source.pixel_format, self.source.width, self.source.height
            )));
        }

        if target.video_format() != Some(self.target) {
            return Err(Error::InvalidInput(format!(
                "Reformat target frame is not {} {}x{}",
                self.target.pixel_format, self.target.width, self.target.height
            )));
        }

        self.load(source);
        self.store(target);

        Ok(self.target.height as usize)
    }

    fn dimensions(&self) -> (usize, usize) {
        (self.source.width as usize, self.source.height as usize)
    }

    fn load(&mut self, frame: &Frame) {
        let (width, height) = self.dimensions();
        let pixel_format = self.source.pixel_format;

        if let Some(offsets) = pixel_format.rgb_offsets() {
            let size = pixel_format.row_bytes(0, 1);
            let stride = frame.linesize(0);
            let plane = frame.plane(0);

            for y in 0..height {
                let row = &plane[y * stride..];
                for x in 0..width {
                    let pixel = &row[x * size..(x + 1) * size];
                    let r = pixel[offsets.red] as f32;
                    let g = pixel[offsets.green] as f32;
                    let b = pixel[offsets.blue] as f32;

                    // BT.601 conversion
                    let i = y * width + x;
                    self.luma[i] = 0.299 * r + 0.587 * g + 0.114 * b;
                    self.blue[i] = -0.169 * r - 0.331 * g + 0.500 * b + 128.0;
                    self.red[i] = 0.500 * r - 0.419 * g - 0.081 * b + 128.0;
                }
            }
            return;
        }

        copy_plane(frame, 0, width, height, &mut self.luma);

        match pixel_format {
            PixelFormat::Yuv444p => {
                copy_plane(frame, 1, width, height, &mut self.blue);
                copy_plane(frame, 2, width, height, &mut self.red);
            }
            PixelFormat::Yuv420p => {
                let chroma_width = pixel_format.row_bytes(1, width);
                let chroma_height = pixel_format.plane_height(1, height);

                for (plane, output) in [(1, &mut self.blue), (2, &mut self.red)] {
                    let stride = frame.linesize(plane);
                    let data = frame.plane(plane);
                    let get = |x: usize, y: usize| data[y * stride + x] as f32;

                    for y in 0..height {
                        let fy = (y as f32 + 0.5) / 2.0 - 0.5;
                        for x in 0..width {
                            let fx = (x as f32 + 0.5) / 2.0 - 0.5;
                            output[y * width + x] =
                                sample(self.flag, fx, fy, chroma_width, chroma_height, get);
                        }
                    }
                }
            }
            _ => {
                self.blue.fill(128.0);
                self.red.fill(128.0);
            }
        }
    }

    fn store(&self, frame: &mut Frame) {
        let (width, height) = self.dimensions();
        let pixel_format = self.target.pixel_format;

        if let Some(offsets) = pixel_format.rgb_offsets() {
            let size = pixel_format.row_bytes(0, 1);
            let stride = frame.linesize(0);
            let plane = frame.plane_mut(0);

            for y in 0..height {
                let row = &mut plane[y * stride..];
                for x in 0..width {
                    let i = y * width + x;
                    let luma = self.luma[i];
                    let u = self.blue[i] - 128.0;
                    let v = self.red[i] - 128.0;

                    let pixel = &mut row[x * size..(x + 1) * size];
                    pixel[offsets.red] = clamp(luma + 1.402 * v);
                    pixel[offsets.green] = clamp(luma - 0.344 * u - 0.714 * v);
                    pixel[offsets.blue] = clamp(luma + 1.772 * u);
                    if let Some(alpha) = offsets.alpha {
                        pixel[alpha] = 255;
                    }
                }
            }
            return;
        }

        store_plane(frame, 0, width, height, &self.luma);

        match pixel_format {
            PixelFormat::Yuv444p => {
                store_plane(frame, 1, width, height, &self.blue);
                store_plane(frame, 2, width, height, &self.red);
            }
            PixelFormat::Yuv420p => {
                let chroma_width = pixel_format.row_bytes(1, width);
                let chroma_height = pixel_format.plane_height(1, height);

                for (plane, input) in [(1, &self.blue), (2, &self.red)] {
                    let stride = frame.linesize(plane);
                    let get = |x: usize, y: usize| input[y * width + x];
                    let data = frame.plane_mut(plane);

                    for y in 0..chroma_height {
                        let fy = 2.0 * y as f32 + 0.5;
                        for x in 0..chroma_width {
                            let fx = 2.0 * x as f32 + 0.5;
                            data[y * stride + x] =
                                clamp(sample(self.flag, fx, fy, width, height, get));
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

fn clamp(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

fn copy_plane(frame: &Frame, plane: usize, width: usize, height: usize, output: &mut [f32]) {
    let stride = frame.linesize(plane);
    for (y, row) in frame.plane(plane).chunks(stride).take(height).enumerate() {
        for (x, &value) in row[..width].iter().enumerate() {
            output[y * width + x] = value as f32;
        }
    }
}

fn store_plane(frame: &mut Frame, plane: usize, width: usize, height: usize, input: &[f32]) {
    let stride = frame.linesize(plane);
    for (y, row) in frame.plane_mut(plane).chunks_mut(stride).take(height).enumerate() {
        for (x, value) in row[..width].iter_mut().enumerate() {
            *value = clamp(input[y * width + x]);
        }
    }
}

/// Catmull-Rom weights for the four taps around a fractional offset
fn cubic_weights(t: f32) -> [f32; 4] {
    let t2 = t * t;
    let t3 = t2 * t;
    [
        (-t3 + 2.0 * t2 - t) / 2.0,
        (3.0 * t3 - 5.0 * t2 + 2.0) / 2.0,
        (-3.0 * t3 + 4.0 * t2 + t) / 2.0,
        (t3 - t2) / 2.0,
    ]
}

/// Filter a `width` x `height` grid at fractional position (`fx`, `fy`),
/// clamping taps to the edges
fn sample(
    flag: ScaleFlag,
    fx: f32,
    fy: f32,
    width: usize,
    height: usize,
    get: impl Fn(usize, usize) -> f32,
) -> f32 {
    let clamp_x = |x: isize| x.clamp(0, width as isize - 1) as usize;
    let clamp_y = |y: isize| y.clamp(0, height as isize - 1) as usize;

    match flag {
        ScaleFlag::Point => {
            // Nearest, ties go to the lower index
            let x = (fx - 0.5).ceil() as isize;
            let y = (fy - 0.5).ceil() as isize;
            get(clamp_x(x), clamp_y(y))
        }
        ScaleFlag::Bilinear => {
            let x0 = fx.floor();
            let y0 = fy.floor();
            let tx = fx - x0;
            let ty = fy - y0;
            let (x0, y0) = (x0 as isize, y0 as isize);

            let top = get(clamp_x(x0), clamp_y(y0)) * (1.0 - tx)
                + get(clamp_x(x0 + 1), clamp_y(y0)) * tx;
            let bottom = get(clamp_x(x0), clamp_y(y0 + 1)) * (1.0 - tx)
                + get(clamp_x(x0 + 1), clamp_y(y0 + 1)) * tx;
            top * (1.0 - ty) + bottom * ty
        }
        ScaleFlag::Bicubic => {
            let x0 = fx.floor();
            let y0 = fy.floor();
            let wx = cubic_weights(fx - x0);
            let wy = cubic_weights(fy - y0);
            let (x0, y0) = (x0 as isize, y0 as isize);

            let mut total = 0.0;
            for (j, weight_y) in wy.iter().enumerate() {
                let y = clamp_y(y0 + j as isize - 1);
                for (i, weight_x) in wx.iter().enumerate() {
                    total += get(clamp_x(x0 + i as isize - 1), y) * weight_x * weight_y;
                }
            }
            total
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(pixel_format: PixelFormat, width: u32, height: u32) -> VideoFormat {
        VideoFormat {
            pixel_format,
            width,
            height,
        }
    }

    fn solid_rgb(width: u32, height: u32, color: [u8; 3]) -> Frame {
        let mut frame = Frame::video(format(PixelFormat::Rgb24, width, height)).unwrap();
        let stride = frame.linesize(0);
        for row in frame.plane_mut(0).chunks_mut(stride) {
            for pixel in row[..width as usize * 3].chunks_exact_mut(3) {
                pixel.copy_from_slice(&color);
            }
        }
        frame
    }

    #[test]
    fn test_rejects_resize() {
        assert!(matches!(
            Reformat::new(
                format(PixelFormat::Rgb24, 4, 4),
                format(PixelFormat::Yuv420p, 8, 4),
                ScaleFlag::default()
            ),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_white_and_red_to_yuv420() {
        let mut reformat = Reformat::new(
            format(PixelFormat::Rgb24, 4, 4),
            format(PixelFormat::Yuv420p, 4, 4),
            ScaleFlag::Bicubic,
        )
        .unwrap();

        let mut target = Frame::video(format(PixelFormat::Yuv420p, 4, 4)).unwrap();

        assert_eq!(
            reformat.convert(&solid_rgb(4, 4, [255, 255, 255]), &mut target).unwrap(),
            4
        );
        assert_eq!(target.plane(0)[0], 255);
        assert_eq!(target.plane(1)[0], 128);
        assert_eq!(target.plane(2)[0], 128);

        reformat.convert(&solid_rgb(4, 4, [255, 0, 0]), &mut target).unwrap();
        assert_eq!(target.plane(0)[0], 76);
        assert_eq!(target.plane(2)[0], 255);
    }

    #[test]
    fn test_rgb_round_trip_through_yuv444() {
        let to_yuv = format(PixelFormat::Yuv444p, 2, 2);
        let mut forward = Reformat::new(format(PixelFormat::Rgb24, 2, 2), to_yuv, ScaleFlag::Point).unwrap();
        let mut backward = Reformat::new(to_yuv, format(PixelFormat::Bgra, 2, 2), ScaleFlag::Point).unwrap();

        let source = solid_rgb(2, 2, [40, 120, 200]);
        let mut yuv = Frame::video(to_yuv).unwrap();
        let mut bgra = Frame::video(format(PixelFormat::Bgra, 2, 2)).unwrap();

        forward.convert(&source, &mut yuv).unwrap();
        backward.convert(&yuv, &mut bgra).unwrap();

        let pixel = &bgra.plane(0)[0..4];
        assert!((pixel[2] as i32 - 40).abs() <= 2, "red {}", pixel[2]);
        assert!((pixel[1] as i32 - 120).abs() <= 2, "green {}", pixel[1]);
        assert!((pixel[0] as i32 - 200).abs() <= 2, "blue {}", pixel[0]);
        assert_eq!(pixel[3], 255);
    }

    #[test]
    fn test_chroma_filters_differ_on_edges() {
        let source_format = format(PixelFormat::Yuv444p, 4, 2);
        let target_format = format(PixelFormat::Yuv420p, 4, 2);
        let mut source = Frame::video(source_format).unwrap();

        // Cb column pattern 0, 200, 0, 200
        let stride = source.linesize(1);
        for row in source.plane_mut(1).chunks_mut(stride).take(2) {
            row[..4].copy_from_slice(&[0, 200, 0, 200]);
        }

        let mut point = Reformat::new(source_format, target_format, ScaleFlag::Point).unwrap();
        let mut bilinear = Reformat::new(source_format, target_format, ScaleFlag::Bilinear).unwrap();
        let mut target = Frame::video(target_format).unwrap();

        point.convert(&source, &mut target).unwrap();
        assert_eq!(target.plane(1)[0], 0);

        bilinear.convert(&source, &mut target).unwrap();
        assert_eq!(target.plane(1)[0], 100);
    }
}
