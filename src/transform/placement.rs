//! Aspect-preserving placement of an image inside a region.

use crate::foundation::core::SurfaceSize;
use crate::transform::matrix::{Matrix4, pixel_x_to_normalized, pixel_y_to_normalized};
use crate::transform::region::CoordinateRegion;

/// Where a letterboxed image sits inside its region.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    /// Centered on both axes.
    Center,
    /// Pinned to the top-left corner.
    #[default]
    LeftTop,
    /// Pinned to the top-right corner.
    RightTop,
    /// Pinned to the bottom-left corner.
    LeftBottom,
    /// Pinned to the bottom-right corner.
    RightBottom,
    /// Centered horizontally, pinned to the top edge.
    MiddleTop,
    /// Centered horizontally, pinned to the bottom edge.
    MiddleBottom,
}

impl Anchor {
    /// All anchors in declaration order.
    pub const ALL: [Anchor; 7] = [
        Anchor::Center,
        Anchor::LeftTop,
        Anchor::RightTop,
        Anchor::LeftBottom,
        Anchor::RightBottom,
        Anchor::MiddleTop,
        Anchor::MiddleBottom,
    ];
}

/// Translation for `anchor` given the letterbox slack on each axis.
pub fn anchor_offset(anchor: Anchor, dif_width: f32, dif_height: f32) -> (f32, f32) {
    let (hw, hh) = (dif_width / 2.0, dif_height / 2.0);
    match anchor {
        Anchor::Center => (0.0, 0.0),
        Anchor::LeftTop => (-hw, hh),
        Anchor::RightTop => (hw, hh),
        Anchor::LeftBottom => (-hw, -hh),
        Anchor::RightBottom => (hw, -hh),
        Anchor::MiddleTop => (0.0, hh),
        Anchor::MiddleBottom => (0.0, -hh),
    }
}

/// Projection * view matrix that fits an `image_w`x`image_h` image inside
/// `region` without distortion, anchored per `anchor`.
///
/// Returns `None` when the image, the region or the surface has a
/// non-positive dimension, or when the region is malformed.
pub fn best_fit_matrix(
    image_w: u32,
    image_h: u32,
    region: &CoordinateRegion,
    surface: SurfaceSize,
    anchor: Anchor,
) -> Option<Matrix4> {
    let view_w = region.width().trunc();
    let view_h = region.height().trunc();
    if image_w == 0 || image_h == 0 || view_w <= 0.0 || view_h <= 0.0 || !surface.is_drawable() {
        return None;
    }

    let view_ar = view_w / view_h;
    let image_ar = SurfaceSize::new(image_w, image_h).aspect_ratio()?;
    let wide = image_ar > view_ar;

    let (left, right, bottom, top) = if wide {
        let r = image_ar / view_ar;
        (-1.0, 1.0, -r, r)
    } else {
        let r = view_ar / image_ar;
        (-r, r, -1.0, 1.0)
    };
    let projection = Matrix4::orthographic(left, right, bottom, top, 1.0, 3.0).ok()?;

    let (cx, cy) = region.surface_area(surface, 1.0, 1.0).ok()?.center();
    let view = Matrix4::look_at([cx, cy, 1.0], [cx, cy, 0.0], [0.0, 1.0, 0.0]);

    let xb = (right - left).abs() / 2.0;
    let yb = (top - bottom).abs() / 2.0;
    let (ax, ay) = region.surface_area(surface, xb, yb).ok()?.center();

    let (sw, sh) = (surface.width as f32, surface.height as f32);
    let (dif_width, dif_height) = if wide {
        let fitted_h = region.width() / image_ar;
        let dh = (pixel_y_to_normalized(fitted_h, sh, yb)
            - pixel_y_to_normalized(region.height(), sh, yb))
        .abs();
        (0.0, dh)
    } else {
        let fitted_w = region.height() * image_ar;
        let dw = (pixel_x_to_normalized(fitted_w, sw, xb)
            - pixel_x_to_normalized(region.width(), sw, xb))
        .abs();
        (dw, 0.0)
    };

    let (ox, oy) = anchor_offset(anchor, dif_width, dif_height);
    Some((projection * view).translate(ax + ox, ay + oy, 0.0))
}

#[cfg(test)]
#[path = "../../tests/unit/transform/placement.rs"]
mod tests;
