#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Size of the drawing surface in logical units, plus the pixel ratio.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
    pub aspect: f32,
    pub dpr: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 0.0,
            height: 0.0,
            aspect: 0.0,
            dpr: 1.0,
        }
    }
}

impl Viewport {
    pub fn from_size(size: Size, dpr: f32) -> Self {
        let aspect = if size.height > 0.0 {
            size.width / size.height
        } else {
            0.0
        };
        Self {
            width: size.width,
            height: size.height,
            aspect,
            dpr,
        }
    }

    /// Physical pixel dimensions.
    pub fn physical(&self) -> (u32, u32) {
        (
            (self.width * self.dpr).round() as u32,
            (self.height * self.dpr).round() as u32,
        )
    }
}
