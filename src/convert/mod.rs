//! Conversion from producer-native buffers to encoder-negotiated ones

mod reformat;
mod resample;

pub use reformat::{Reformat, ScaleFlag};
pub use resample::Resampler;

/// Source and target representations differ, so a converter is required
pub fn needs_conversion<T: PartialEq>(source: &T, target: &T) -> bool {
    source != target
}
