//! Synthetic signal sources

mod gradient;
mod sweep;

pub use gradient::{turbo, CircleGradient, CircleGradientColors};
pub use sweep::AudioSweep;

use crate::frame::Frame;
use crate::Result;

/// Fills successive frames with generated content
pub trait Generator {
    /// Write the next frame's worth of signal into `frame`
    fn fill_frame(&mut self, frame: &mut Frame) -> Result<()>;

    /// Start over from the first frame
    fn reset(&mut self);
}
