//! Speaker arrangements described by channel masks

use crate::{Error, Result};
use std::fmt;

pub const FRONT_LEFT: u64 = 0x1;
pub const FRONT_RIGHT: u64 = 0x2;
pub const FRONT_CENTER: u64 = 0x4;
pub const LOW_FREQUENCY: u64 = 0x8;
pub const BACK_LEFT: u64 = 0x10;
pub const BACK_RIGHT: u64 = 0x20;
pub const SIDE_LEFT: u64 = 0x200;
pub const SIDE_RIGHT: u64 = 0x400;

/// Channel count and speaker arrangement of an audio stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelLayout {
    mask: u64,
}

impl ChannelLayout {
    pub const MONO: ChannelLayout = ChannelLayout { mask: FRONT_CENTER };
    pub const STEREO: ChannelLayout = ChannelLayout {
        mask: FRONT_LEFT | FRONT_RIGHT,
    };
    pub const SURROUND: ChannelLayout = ChannelLayout {
        mask: FRONT_LEFT | FRONT_RIGHT | FRONT_CENTER,
    };
    pub const QUAD: ChannelLayout = ChannelLayout {
        mask: FRONT_LEFT | FRONT_RIGHT | BACK_LEFT | BACK_RIGHT,
    };
    pub const FIVE_POINT_ZERO: ChannelLayout = ChannelLayout {
        mask: FRONT_LEFT | FRONT_RIGHT | FRONT_CENTER | SIDE_LEFT | SIDE_RIGHT,
    };
    pub const FIVE_POINT_ONE: ChannelLayout = ChannelLayout {
        mask: FRONT_LEFT | FRONT_RIGHT | FRONT_CENTER | LOW_FREQUENCY | SIDE_LEFT | SIDE_RIGHT,
    };
    pub const SEVEN_POINT_ONE: ChannelLayout = ChannelLayout {
        mask: FRONT_LEFT
            | FRONT_RIGHT
            | FRONT_CENTER
            | LOW_FREQUENCY
            | BACK_LEFT
            | BACK_RIGHT
            | SIDE_LEFT
            | SIDE_RIGHT,
    };

    /// Build a layout from a speaker mask. The mask must name at least one speaker.
    pub fn from_mask(mask: u64) -> Result<Self> {
        if mask == 0 {
            return Err(Error::Configuration(
                "Failed to initialize channel layout: empty mask".to_string(),
            ));
        }

        Ok(Self { mask })
    }

    pub fn mask(&self) -> u64 {
        self.mask
    }

    pub fn channel_count(&self) -> usize {
        self.mask.count_ones() as usize
    }

    pub fn name(&self) -> String {
        match *self {
            Self::MONO => "mono".to_string(),
            Self::STEREO => "stereo".to_string(),
            Self::SURROUND => "3.0".to_string(),
            Self::QUAD => "quad".to_string(),
            Self::FIVE_POINT_ZERO => "5.0(side)".to_string(),
            Self::FIVE_POINT_ONE => "5.1(side)".to_string(),
            Self::SEVEN_POINT_ONE => "7.1".to_string(),
            _ => format!("{} channels", self.channel_count()),
        }
    }
}

impl Default for ChannelLayout {
    fn default() -> Self {
        Self::MONO
    }
}

impl fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}
