//! Pixel formats and their memory layout

use crate::{Error, Result};
use std::fmt;

/// Memory layout of one image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// packed RGB 8:8:8, 24bpp, RGBRGB...
    Rgb24,
    /// packed RGB 8:8:8, 24bpp, BGRBGR...
    Bgr24,
    /// packed ARGB 8:8:8:8, 32bpp
    Argb,
    /// packed RGBA 8:8:8:8, 32bpp
    Rgba,
    /// packed ABGR 8:8:8:8, 32bpp
    Abgr,
    /// packed BGRA 8:8:8:8, 32bpp
    Bgra,
    /// Y, 8bpp
    Gray8,
    /// planar YUV 4:2:0, 12bpp
    Yuv420p,
    /// planar YUV 4:4:4, 24bpp
    Yuv444p,
}

/// Color components and bytes of one packed pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelSize {
    pub color_count: usize,
    pub size_bytes: usize,
}

/// Byte offsets of red, green and blue inside a packed pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RgbOffsets {
    pub red: usize,
    pub green: usize,
    pub blue: usize,
    pub alpha: Option<usize>,
}

impl PixelFormat {
    pub fn name(self) -> &'static str {
        match self {
            PixelFormat::Rgb24 => "rgb24",
            PixelFormat::Bgr24 => "bgr24",
            PixelFormat::Argb => "argb",
            PixelFormat::Rgba => "rgba",
            PixelFormat::Abgr => "abgr",
            PixelFormat::Bgra => "bgra",
            PixelFormat::Gray8 => "gray",
            PixelFormat::Yuv420p => "yuv420p",
            PixelFormat::Yuv444p => "yuv444p",
        }
    }

    pub fn is_planar(self) -> bool {
        matches!(self, PixelFormat::Yuv420p | PixelFormat::Yuv444p)
    }

    pub fn plane_count(self) -> usize {
        if self.is_planar() {
            3
        } else {
            1
        }
    }

    /// Size of one packed pixel. Planar formats have no single pixel size.
    pub fn pixel_size(self) -> Result<PixelSize> {
        let (color_count, size_bytes) = match self {
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => (3, 3),
            PixelFormat::Argb | PixelFormat::Rgba | PixelFormat::Abgr | PixelFormat::Bgra => (4, 4),
            PixelFormat::Gray8 => (1, 1),
            PixelFormat::Yuv420p | PixelFormat::Yuv444p => {
                return Err(Error::Configuration(format!(
                    "Unsupported pixel format: {}",
                    self
                )))
            }
        };

        Ok(PixelSize {
            color_count,
            size_bytes,
        })
    }

    /// Horizontal and vertical log2 subsampling of `plane`
    pub fn chroma_shift(self, plane: usize) -> (u32, u32) {
        match (self, plane) {
            (PixelFormat::Yuv420p, 1 | 2) => (1, 1),
            _ => (0, 0),
        }
    }

    /// Bytes in one row of `plane`, without padding
    pub fn row_bytes(self, plane: usize, width: usize) -> usize {
        if self.is_planar() {
            let (shift_x, _) = self.chroma_shift(plane);
            (width + (1 << shift_x) - 1) >> shift_x
        } else {
            // Packed formats always have a pixel size
            width * self.pixel_size().map_or(1, |size| size.size_bytes)
        }
    }

    /// Rows of `plane`
    pub fn plane_height(self, plane: usize, height: usize) -> usize {
        let (_, shift_y) = self.chroma_shift(plane);
        (height + (1 << shift_y) - 1) >> shift_y
    }

    pub(crate) fn rgb_offsets(self) -> Option<RgbOffsets> {
        let offsets = match self {
            PixelFormat::Rgb24 => (0, 1, 2, None),
            PixelFormat::Bgr24 => (2, 1, 0, None),
            PixelFormat::Argb => (1, 2, 3, Some(0)),
            PixelFormat::Rgba => (0, 1, 2, Some(3)),
            PixelFormat::Abgr => (3, 2, 1, Some(0)),
            PixelFormat::Bgra => (2, 1, 0, Some(3)),
            _ => return None,
        };

        Some(RgbOffsets {
            red: offsets.0,
            green: offsets.1,
            blue: offsets.2,
            alpha: offsets.3,
        })
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_pixel_sizes() {
        assert_eq!(
            PixelFormat::Rgb24.pixel_size().unwrap(),
            PixelSize {
                color_count: 3,
                size_bytes: 3
            }
        );
        assert_eq!(PixelFormat::Bgra.pixel_size().unwrap().size_bytes, 4);
        assert!(PixelFormat::Yuv420p.pixel_size().is_err());
    }

    #[test]
    fn test_yuv420_plane_geometry() {
        let format = PixelFormat::Yuv420p;
        assert_eq!(format.plane_count(), 3);
        assert_eq!(format.row_bytes(0, 640), 640);
        assert_eq!(format.row_bytes(1, 640), 320);
        assert_eq!(format.plane_height(2, 480), 240);
        assert_eq!(PixelFormat::Yuv444p.plane_height(2, 480), 480);
    }

    #[test]
    fn test_rgb_offsets() {
        let offsets = PixelFormat::Argb.rgb_offsets().unwrap();
        assert_eq!((offsets.red, offsets.alpha), (1, Some(0)));
        assert!(PixelFormat::Gray8.rgb_offsets().is_none());
    }
}
