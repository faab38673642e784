//! Audio sample formats

use std::fmt;

/// Storage type and layout of audio samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    U8,
    S16,
    S32,
    S64,
    Flt,
    Dbl,
    U8p,
    S16p,
    S32p,
    S64p,
    Fltp,
    Dblp,
}

struct FormatInfo {
    name: &'static str,
    bytes: usize,
    planar: bool,
}

const fn info(format: SampleFormat) -> FormatInfo {
    use SampleFormat::*;

    let (name, bytes, planar) = match format {
        U8 => ("u8", 1, false),
        S16 => ("s16", 2, false),
        S32 => ("s32", 4, false),
        S64 => ("s64", 8, false),
        Flt => ("flt", 4, false),
        Dbl => ("dbl", 8, false),
        U8p => ("u8p", 1, true),
        S16p => ("s16p", 2, true),
        S32p => ("s32p", 4, true),
        S64p => ("s64p", 8, true),
        Fltp => ("fltp", 4, true),
        Dblp => ("dblp", 8, true),
    };

    FormatInfo {
        name,
        bytes,
        planar,
    }
}

impl SampleFormat {
    pub const fn name(self) -> &'static str {
        info(self).name
    }

    pub const fn bytes_per_sample(self) -> usize {
        info(self).bytes
    }

    /// Each channel occupies its own plane
    pub const fn is_planar(self) -> bool {
        info(self).planar
    }

    /// Stored as integers rather than floating point
    pub const fn is_integral(self) -> bool {
        !matches!(
            self,
            SampleFormat::Flt | SampleFormat::Fltp | SampleFormat::Dbl | SampleFormat::Dblp
        )
    }

    /// Interleaved counterpart with the same storage type
    pub const fn packed(self) -> SampleFormat {
        use SampleFormat::*;

        match self {
            U8 | U8p => U8,
            S16 | S16p => S16,
            S32 | S32p => S32,
            S64 | S64p => S64,
            Flt | Fltp => Flt,
            Dbl | Dblp => Dbl,
        }
    }

    /// Planar counterpart with the same storage type
    pub const fn planar(self) -> SampleFormat {
        use SampleFormat::*;

        match self {
            U8 | U8p => U8p,
            S16 | S16p => S16p,
            S32 | S32p => S32p,
            S64 | S64p => S64p,
            Flt | Fltp => Fltp,
            Dbl | Dblp => Dblp,
        }
    }

    /// Decode one sample from native-endian bytes into the unit range
    pub fn read_unit(self, bytes: &[u8]) -> f64 {
        match self.packed() {
            SampleFormat::U8 => u8::read_ne(bytes).to_unit(),
            SampleFormat::S16 => i16::read_ne(bytes).to_unit(),
            SampleFormat::S32 => i32::read_ne(bytes).to_unit(),
            SampleFormat::S64 => i64::read_ne(bytes).to_unit(),
            SampleFormat::Flt => f32::read_ne(bytes).to_unit(),
            _ => f64::read_ne(bytes).to_unit(),
        }
    }

    /// Encode one unit-range value as native-endian bytes
    pub fn write_unit(self, value: f64, out: &mut [u8]) {
        match self.packed() {
            SampleFormat::U8 => u8::scale(value).write_ne(out),
            SampleFormat::S16 => i16::scale(value).write_ne(out),
            SampleFormat::S32 => i32::scale(value).write_ne(out),
            SampleFormat::S64 => i64::scale(value).write_ne(out),
            SampleFormat::Flt => f32::scale(value).write_ne(out),
            _ => f64::scale(value).write_ne(out),
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Rust storage type of an audio sample
pub trait Sample: Copy + Send + 'static {
    /// Interleaved format stored as `Self`
    const PACKED: SampleFormat;
    /// Planar format stored as `Self`
    const PLANAR: SampleFormat;

    /// Map a value in `[-1.0, 1.0]` to this type's range
    fn scale(value: f64) -> Self;

    /// Map this sample back to `[-1.0, 1.0]`
    fn to_unit(self) -> f64;

    fn read_ne(bytes: &[u8]) -> Self;

    fn write_ne(self, out: &mut [u8]);
}

macro_rules! signed_sample {
    ($type:ty, $packed:ident, $planar:ident) => {
        impl Sample for $type {
            const PACKED: SampleFormat = SampleFormat::$packed;
            const PLANAR: SampleFormat = SampleFormat::$planar;

            fn scale(value: f64) -> Self {
                (value.clamp(-1.0, 1.0) * <$type>::MAX as f64).round() as $type
            }

            fn to_unit(self) -> f64 {
                (self as f64 / <$type>::MAX as f64).max(-1.0)
            }

            fn read_ne(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$type>()];
                raw.copy_from_slice(&bytes[..std::mem::size_of::<$type>()]);
                <$type>::from_ne_bytes(raw)
            }

            fn write_ne(self, out: &mut [u8]) {
                out[..std::mem::size_of::<$type>()].copy_from_slice(&self.to_ne_bytes());
            }
        }
    };
}

signed_sample!(i16, S16, S16p);
signed_sample!(i32, S32, S32p);
signed_sample!(i64, S64, S64p);

impl Sample for u8 {
    const PACKED: SampleFormat = SampleFormat::U8;
    const PLANAR: SampleFormat = SampleFormat::U8p;

    fn scale(value: f64) -> Self {
        (128.0 + (value.clamp(-1.0, 1.0) * 127.0).round()) as u8
    }

    fn to_unit(self) -> f64 {
        ((self as f64 - 128.0) / 127.0).max(-1.0)
    }

    fn read_ne(bytes: &[u8]) -> Self {
        bytes[0]
    }

    fn write_ne(self, out: &mut [u8]) {
        out[0] = self;
    }
}

macro_rules! float_sample {
    ($type:ty, $packed:ident, $planar:ident) => {
        impl Sample for $type {
            const PACKED: SampleFormat = SampleFormat::$packed;
            const PLANAR: SampleFormat = SampleFormat::$planar;

            fn scale(value: f64) -> Self {
                value as $type
            }

            fn to_unit(self) -> f64 {
                self as f64
            }

            fn read_ne(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$type>()];
                raw.copy_from_slice(&bytes[..std::mem::size_of::<$type>()]);
                <$type>::from_ne_bytes(raw)
            }

            fn write_ne(self, out: &mut [u8]) {
                out[..std::mem::size_of::<$type>()].copy_from_slice(&self.to_ne_bytes());
            }
        }
    };
}

float_sample!(f32, Flt, Fltp);
float_sample!(f64, Dbl, Dblp);

#[cfg(test)]
mod tests {
    use super::*;

    const PACKED: [SampleFormat; 6] = [
        SampleFormat::U8,
        SampleFormat::S16,
        SampleFormat::S32,
        SampleFormat::S64,
        SampleFormat::Flt,
        SampleFormat::Dbl,
    ];

    const PLANAR: [SampleFormat; 6] = [
        SampleFormat::U8p,
        SampleFormat::S16p,
        SampleFormat::S32p,
        SampleFormat::S64p,
        SampleFormat::Fltp,
        SampleFormat::Dblp,
    ];

    #[test]
    fn test_non_planar_formats() {
        for format in PACKED {
            assert!(!format.is_planar(), "{} should be interleaved", format);
            assert_eq!(format.packed(), format);
        }
    }

    #[test]
    fn test_planar_formats() {
        for format in PLANAR {
            assert!(format.is_planar(), "{} should be planar", format);
            assert_eq!(format.planar(), format);
            assert_eq!(format.packed().planar(), format);
        }
    }

    #[test]
    fn test_storage_types() {
        assert_eq!(<i16 as Sample>::PLANAR, SampleFormat::S16p);
        assert_eq!(<f32 as Sample>::PACKED, SampleFormat::Flt);
        assert_eq!(SampleFormat::S16p.bytes_per_sample(), 2);
        assert_eq!(SampleFormat::Dbl.bytes_per_sample(), 8);
    }

    #[test]
    fn test_scale_integral_and_float() {
        assert_eq!(i16::scale(1.0), i16::MAX);
        assert_eq!(i16::scale(0.0), 0);
        assert_eq!(i16::scale(-2.0), -i16::MAX);
        assert_eq!(u8::scale(0.0), 128);
        assert_eq!(f32::scale(0.25), 0.25);
    }

    #[test]
    fn test_unit_conversion_through_bytes() {
        let mut bytes = [0u8; 8];
        for format in PACKED {
            format.write_unit(0.5, &mut bytes);
            let value = format.read_unit(&bytes);
            assert!((value - 0.5).abs() < 0.01, "{}: {}", format, value);
        }
    }
}
