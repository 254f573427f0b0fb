use std::sync::Arc;

use anyhow::Context;

use crate::foundation::core::{Rgba8Premul, SurfaceSize};
use crate::foundation::error::{LayercastError, LayercastResult};
use crate::foundation::math::premultiply_rgba8_in_place;

const MAX_DIM: u32 = 16_384;

/// Raster image in premultiplied RGBA8 form, top row first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bitmap {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel bytes in row-major premultiplied RGBA8.
    pub rgba8_premul: Arc<Vec<u8>>,
}

impl Bitmap {
    /// Wrap already premultiplied pixels.
    pub fn from_rgba8_premul(width: u32, height: u32, data: Vec<u8>) -> LayercastResult<Self> {
        let size = SurfaceSize::new(width, height);
        if !size.is_drawable() || data.len() != size.rgba_len() {
            return Err(LayercastError::asset(format!(
                "bitmap {width}x{height} needs {} bytes, got {}",
                size.rgba_len(),
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            rgba8_premul: Arc::new(data),
        })
    }

    /// Premultiply straight-alpha pixels and wrap them.
    pub fn from_rgba8_straight(width: u32, height: u32, mut data: Vec<u8>) -> LayercastResult<Self> {
        premultiply_rgba8_in_place(&mut data);
        Self::from_rgba8_premul(width, height, data)
    }

    /// A single-color bitmap.
    pub fn solid(width: u32, height: u32, color: Rgba8Premul) -> Self {
        let px = color.to_array();
        let len = SurfaceSize::new(width, height).rgba_len() / 4;
        let data = std::iter::repeat_n(px, len).flatten().collect();
        Self {
            width,
            height,
            rgba8_premul: Arc::new(data),
        }
    }

    /// Pixel dimensions.
    pub fn size(&self) -> SurfaceSize {
        SurfaceSize::new(self.width, self.height)
    }
}

/// Decode encoded image bytes (PNG, JPEG) and convert to premultiplied RGBA8.
pub fn decode_image(bytes: &[u8]) -> LayercastResult<Bitmap> {
    let dyn_img = image::load_from_memory(bytes).context("decode image from memory")?;
    let rgba = dyn_img.to_rgba8();
    let (width, height) = rgba.dimensions();
    Bitmap::from_rgba8_straight(width, height, rgba.into_raw())
}

/// Rasterize SVG bytes at `size`, or at the document's intrinsic size when `None`.
pub fn rasterize_svg(bytes: &[u8], size: Option<SurfaceSize>) -> LayercastResult<Bitmap> {
    let tree = usvg::Tree::from_data(bytes, &usvg::Options::default()).context("parse svg tree")?;

    let (width, height) = match size {
        Some(s) => (s.width, s.height),
        None => {
            let intrinsic = tree.size();
            (
                intrinsic.width().ceil().max(1.0) as u32,
                intrinsic.height().ceil().max(1.0) as u32,
            )
        }
    };
    if width == 0 || height == 0 || width > MAX_DIM || height > MAX_DIM {
        return Err(LayercastError::asset(format!(
            "svg raster size out of range: {width}x{height} (max {MAX_DIM}x{MAX_DIM})"
        )));
    }

    let mut pixmap = resvg::tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| LayercastError::asset("failed to allocate svg pixmap"))?;
    let sx = (width as f32) / tree.size().width();
    let sy = (height as f32) / tree.size().height();
    resvg::render(
        &tree,
        resvg::tiny_skia::Transform::from_scale(sx, sy),
        &mut pixmap.as_mut(),
    );
    // tiny-skia pixmaps are already premultiplied RGBA8.
    Bitmap::from_rgba8_premul(width, height, pixmap.take())
}

#[cfg(test)]
#[path = "../../tests/unit/assets/bitmap.rs"]
mod tests;
