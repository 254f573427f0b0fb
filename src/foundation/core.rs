use std::time::Duration;

use crate::foundation::error::{LayercastError, LayercastResult};

pub use kurbo::Rect;

/// Pixel dimensions of a drawable surface or render target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct SurfaceSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl SurfaceSize {
    /// Build a size from pixel dimensions.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Clamp signed host dimensions; negative values become zero.
    pub fn from_signed(width: i64, height: i64) -> Self {
        Self {
            width: width.clamp(0, i64::from(u32::MAX)) as u32,
            height: height.clamp(0, i64::from(u32::MAX)) as u32,
        }
    }

    /// Return `true` when both dimensions are non-zero.
    pub fn is_drawable(self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Byte length of a tightly packed RGBA8 image of this size.
    pub fn rgba_len(self) -> usize {
        (self.width as usize) * (self.height as usize) * 4
    }

    /// Width divided by height, `None` for a zero-sized surface.
    pub fn aspect_ratio(self) -> Option<f32> {
        self.is_drawable()
            .then(|| self.width as f32 / self.height as f32)
    }
}

/// Frames-per-second represented as a rational `num/den`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    /// Numerator (frames).
    pub num: u32,
    /// Denominator (seconds), must be non-zero.
    pub den: u32,
}

impl Fps {
    /// Create a validated FPS value.
    pub fn new(num: u32, den: u32) -> LayercastResult<Self> {
        if den == 0 {
            return Err(LayercastError::config("Fps den must be > 0"));
        }
        if num == 0 {
            return Err(LayercastError::config("Fps num must be > 0"));
        }
        Ok(Self { num, den })
    }

    /// Convert to floating-point FPS.
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Duration of one frame.
    pub fn frame_duration(self) -> Duration {
        Duration::from_nanos(u64::from(self.den) * 1_000_000_000 / u64::from(self.num))
    }

    /// Time at which frame `frames` starts.
    pub fn frames_to_duration(self, frames: u64) -> Duration {
        let nanos = u128::from(frames) * u128::from(self.den) * 1_000_000_000 / u128::from(self.num);
        Duration::from_nanos(nanos.min(u128::from(u64::MAX)) as u64)
    }

    /// Nearest frame slot for a presentation time.
    pub fn duration_to_frame_round(self, t: Duration) -> u64 {
        (t.as_secs_f64() * self.as_f64()).round().max(0.0) as u64
    }
}

/// Whether a layer takes part in drawing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Drawn on every frame.
    Visible,
    /// Skipped by the orchestrator.
    #[default]
    Invisible,
}

impl Visibility {
    /// Return `true` for [`Visibility::Visible`].
    pub fn is_visible(self) -> bool {
        matches!(self, Self::Visible)
    }
}

/// Premultiplied RGBA8 (r,g,b already multiplied by a).
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Rgba8Premul {
    /// Red channel premultiplied by alpha.
    pub r: u8,
    /// Green channel premultiplied by alpha.
    pub g: u8,
    /// Blue channel premultiplied by alpha.
    pub b: u8,
    /// Alpha channel.
    pub a: u8,
}

impl Default for Rgba8Premul {
    fn default() -> Self {
        Self::transparent()
    }
}

impl Rgba8Premul {
    /// Fully transparent black.
    pub fn transparent() -> Self {
        Self {
            r: 0,
            g: 0,
            b: 0,
            a: 0,
        }
    }

    /// Convert straight-alpha RGBA8 into premultiplied RGBA8.
    pub fn from_straight_rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        let a16 = u16::from(a);
        Self {
            r: crate::foundation::math::mul_div255_u8(u16::from(r), a16),
            g: crate::foundation::math::mul_div255_u8(u16::from(g), a16),
            b: crate::foundation::math::mul_div255_u8(u16::from(b), a16),
            a,
        }
    }

    /// Channels as a byte array in RGBA order.
    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
