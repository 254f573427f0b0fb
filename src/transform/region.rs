//! Axis-aligned pixel regions and their normalized-device projections.

use crate::foundation::core::{Rect, SurfaceSize};
use crate::foundation::error::{LayercastError, LayercastResult};
use crate::transform::matrix::pixel_to_normalized;

/// A point in surface pixel space; `z` is carried through to quad vertices.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CoordinatePoint {
    /// Horizontal pixel position.
    pub x: f32,
    /// Vertical pixel position (grows downward).
    pub y: f32,
    /// Depth component.
    #[serde(default)]
    pub z: f32,
}

impl CoordinatePoint {
    /// Point at `(x, y)` with zero depth.
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }

    fn to_normalized(self, surface: SurfaceSize) -> [f32; 3] {
        let (x, y) = pixel_to_normalized(
            self.x,
            self.y,
            surface.width as f32,
            surface.height as f32,
            1.0,
            1.0,
        );
        [x, y, self.z]
    }
}

/// Four corners of an axis-aligned rectangle in surface pixel space.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CoordinateRegion {
    /// Top-left corner.
    pub left_top: CoordinatePoint,
    /// Top-right corner.
    pub right_top: CoordinatePoint,
    /// Bottom-left corner.
    pub left_bottom: CoordinatePoint,
    /// Bottom-right corner.
    pub right_bottom: CoordinatePoint,
}

/// A region projected into normalized coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CoordinateArea {
    /// Normalized x of the left edge.
    pub left: f32,
    /// Normalized y of the top edge.
    pub top: f32,
    /// Normalized x of the right edge.
    pub right: f32,
    /// Normalized y of the bottom edge.
    pub bottom: f32,
}

impl CoordinateArea {
    /// Midpoint of the area.
    pub fn center(&self) -> (f32, f32) {
        ((self.left + self.right) / 2.0, (self.top + self.bottom) / 2.0)
    }
}

impl CoordinateRegion {
    /// Build a validated region from its top-left corner and extent.
    pub fn from_rect(left: f32, top: f32, width: f32, height: f32) -> LayercastResult<Self> {
        let right = left + width;
        let bottom = top + height;
        let region = Self {
            left_top: CoordinatePoint::new(left, top),
            right_top: CoordinatePoint::new(right, top),
            left_bottom: CoordinatePoint::new(left, bottom),
            right_bottom: CoordinatePoint::new(right, bottom),
        };
        region.check()?;
        Ok(region)
    }

    /// Build a validated region from a `kurbo` rectangle.
    pub fn from_kurbo(rect: Rect) -> LayercastResult<Self> {
        let rect = rect.abs();
        Self::from_rect(
            rect.x0 as f32,
            rect.y0 as f32,
            rect.width() as f32,
            rect.height() as f32,
        )
    }

    /// Region covering the whole surface.
    pub fn full_surface(surface: SurfaceSize) -> Self {
        let (w, h) = (surface.width as f32, surface.height as f32);
        Self {
            left_top: CoordinatePoint::new(0.0, 0.0),
            right_top: CoordinatePoint::new(w, 0.0),
            left_bottom: CoordinatePoint::new(0.0, h),
            right_bottom: CoordinatePoint::new(w, h),
        }
    }

    /// Verify the corners describe an axis-aligned rectangle.
    pub fn check(&self) -> LayercastResult<()> {
        let aligned = self.left_top.x == self.left_bottom.x
            && self.right_top.x == self.right_bottom.x
            && self.left_top.y == self.right_top.y
            && self.left_bottom.y == self.right_bottom.y;
        let finite = [
            self.left_top,
            self.right_top,
            self.left_bottom,
            self.right_bottom,
        ]
        .iter()
        .all(|p| p.x.is_finite() && p.y.is_finite() && p.z.is_finite());

        if aligned && finite {
            return Ok(());
        }
        tracing::error!(region = ?self, "malformed coordinate region");
        Err(LayercastError::config(format!(
            "coordinate region is not axis-aligned: lt=({}, {}) rt=({}, {}) lb=({}, {}) rb=({}, {})",
            self.left_top.x,
            self.left_top.y,
            self.right_top.x,
            self.right_top.y,
            self.left_bottom.x,
            self.left_bottom.y,
            self.right_bottom.x,
            self.right_bottom.y,
        )))
    }

    /// Horizontal extent in pixels.
    pub fn width(&self) -> f32 {
        (self.left_top.x - self.right_top.x).abs()
    }

    /// Vertical extent in pixels.
    pub fn height(&self) -> f32 {
        (self.left_top.y - self.left_bottom.y).abs()
    }

    /// Return `true` when the region covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.width() == 0.0 || self.height() == 0.0
    }

    /// Project the region into normalized space spanning `[-xb, xb]` by `[-yb, yb]`.
    pub fn surface_area(
        &self,
        surface: SurfaceSize,
        x_boundary: f32,
        y_boundary: f32,
    ) -> LayercastResult<CoordinateArea> {
        self.check()?;
        let (w, h) = (surface.width as f32, surface.height as f32);
        let (left, top) =
            pixel_to_normalized(self.left_top.x, self.left_top.y, w, h, x_boundary, y_boundary);
        let (right, bottom) = pixel_to_normalized(
            self.right_bottom.x,
            self.right_bottom.y,
            w,
            h,
            x_boundary,
            y_boundary,
        );
        Ok(CoordinateArea {
            left,
            top,
            right,
            bottom,
        })
    }

    /// Quad positions (xyz) in fan order: left-top, left-bottom, right-bottom, right-top.
    pub fn quad_vertices(&self, surface: SurfaceSize) -> [f32; 12] {
        let lt = self.left_top.to_normalized(surface);
        let lb = self.left_bottom.to_normalized(surface);
        let rb = self.right_bottom.to_normalized(surface);
        let rt = self.right_top.to_normalized(surface);
        [
            lt[0], lt[1], lt[2], //
            lb[0], lb[1], lb[2], //
            rb[0], rb[1], rb[2], //
            rt[0], rt[1], rt[2],
        ]
    }
}

#[cfg(test)]
#[path = "../../tests/unit/transform/region.rs"]
mod tests;
