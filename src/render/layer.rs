//! One textured quad positioned on the surface.

use crate::assets::bitmap::Bitmap;
use crate::foundation::core::{SurfaceSize, Visibility};
use crate::foundation::error::LayercastResult;
use crate::render::device::{GpuDevice, TextureId};
use crate::render::quad::{LAYER_UVS, QuadProgram, UNIT_QUAD};
use crate::transform::matrix::Matrix4;
use crate::transform::placement::{Anchor, best_fit_matrix};
use crate::transform::region::CoordinateRegion;

/// How a layer maps its texture onto its region.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    /// Texture fills the region, ignoring aspect ratio.
    #[default]
    Stretch,
    /// Texture keeps its aspect ratio and is pinned inside the region.
    Fit(Anchor),
}

/// Texture handle plus the pixel size of its contents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureInfo {
    /// Device handle.
    pub id: TextureId,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// A texture drawn as a quad over a [`CoordinateRegion`] of the surface.
///
/// The layer owns every handle it holds and releases each one exactly once.
#[derive(Debug)]
pub struct TextureLayer {
    kind: LayerKind,
    quad: Option<QuadProgram>,
    texture: Option<TextureInfo>,
    visibility: Visibility,
    region: Option<CoordinateRegion>,
    matrix: Matrix4,
    surface: SurfaceSize,
    vertices: [f32; 12],
    needs_redraw: bool,
}

impl TextureLayer {
    /// A layer with no device resources yet.
    pub fn new(kind: LayerKind) -> Self {
        Self {
            kind,
            quad: None,
            texture: None,
            visibility: Visibility::Invisible,
            region: None,
            matrix: Matrix4::identity(),
            surface: SurfaceSize::default(),
            vertices: UNIT_QUAD,
            needs_redraw: false,
        }
    }

    /// Placement behavior.
    pub fn kind(&self) -> LayerKind {
        self.kind
    }

    /// Link the program and create the quad buffers. The texture handle waits for the first upload.
    ///
    /// Shader compile or link failure is a configuration error.
    pub fn create_gpu_resources<D: GpuDevice>(&mut self, device: &mut D) -> LayercastResult<()> {
        self.release(device);
        let quad = QuadProgram::create(device, &LAYER_UVS)?;
        quad.set_positions(device, &self.vertices);
        self.quad = Some(quad);
        self.matrix = Matrix4::identity();
        tracing::debug!(kind = ?self.kind, "layer resources created");
        Ok(())
    }

    /// Track a new surface size. A layer without a region takes the full surface.
    pub fn on_surface_resize<D: GpuDevice>(&mut self, device: &mut D, surface: SurfaceSize) {
        if surface == self.surface {
            return;
        }
        self.surface = surface;
        let region = match self.region {
            Some(r) if !r.is_empty() => r,
            _ => CoordinateRegion::full_surface(surface),
        };
        self.apply_region(device, region);
        self.needs_redraw = true;
    }

    /// Draw into whatever target is bound. Invisible or empty layers draw nothing.
    pub fn draw<D: GpuDevice>(&self, device: &mut D) {
        if !self.visibility.is_visible() {
            return;
        }
        let (Some(quad), Some(tex)) = (&self.quad, self.texture) else {
            return;
        };
        if tex.width == 0 || tex.height == 0 {
            return;
        }
        quad.draw(device, &self.matrix, tex.id);
    }

    /// Move the layer to `region` after validating it.
    pub fn set_region<D: GpuDevice>(
        &mut self,
        device: &mut D,
        region: CoordinateRegion,
    ) -> LayercastResult<()> {
        region.check()?;
        self.apply_region(device, region);
        self.needs_redraw = true;
        Ok(())
    }

    /// Swap in a texture this layer now owns.
    ///
    /// A previously owned handle with a different id is deleted. The matrix resets to identity
    /// before the region is re-derived; `reset_region` snaps the region back to the full surface.
    pub fn set_texture<D: GpuDevice>(
        &mut self,
        device: &mut D,
        info: TextureInfo,
        reset_region: bool,
        visibility: Visibility,
    ) {
        if let Some(old) = self.texture.replace(info)
            && old.id != info.id
        {
            device.delete_texture(old.id);
        }
        self.visibility = visibility;
        self.matrix = Matrix4::identity();

        let region = match self.region {
            Some(r) if !reset_region => r,
            _ => CoordinateRegion::full_surface(self.surface),
        };
        self.apply_region(device, region);
        self.needs_redraw = true;
    }

    /// Upload `bitmap` into this layer's texture, allocating the handle on first use.
    pub fn upload_bitmap<D: GpuDevice>(
        &mut self,
        device: &mut D,
        bitmap: &Bitmap,
        reset_region: bool,
        visibility: Visibility,
    ) -> LayercastResult<()> {
        let (id, fresh) = match self.texture {
            Some(t) => (t.id, false),
            None => (device.create_texture(), true),
        };
        if let Err(e) = device.upload_texture(id, bitmap.size(), &bitmap.rgba8_premul) {
            if fresh {
                device.delete_texture(id);
            }
            return Err(e);
        }
        self.set_texture(
            device,
            TextureInfo {
                id,
                width: bitmap.width,
                height: bitmap.height,
            },
            reset_region,
            visibility,
        );
        Ok(())
    }

    /// Show or hide the layer.
    pub fn set_visibility(&mut self, visibility: Visibility) {
        if self.visibility != visibility {
            self.visibility = visibility;
            self.needs_redraw = true;
        }
    }

    /// Current visibility.
    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// Current region, once known.
    pub fn region(&self) -> Option<CoordinateRegion> {
        self.region
    }

    /// Model/projection matrix uploaded on draw.
    pub fn matrix(&self) -> Matrix4 {
        self.matrix
    }

    /// Texture currently held.
    pub fn texture(&self) -> Option<TextureInfo> {
        self.texture
    }

    /// Quad positions derived from the region.
    pub fn vertices(&self) -> &[f32; 12] {
        &self.vertices
    }

    /// Surface size last seen by [`TextureLayer::on_surface_resize`].
    pub fn surface(&self) -> SurfaceSize {
        self.surface
    }

    /// Whether something changed since the last [`TextureLayer::mark_drawn`].
    pub fn needs_redraw(&self) -> bool {
        self.needs_redraw
    }

    /// Clear the redraw flag.
    pub fn mark_drawn(&mut self) {
        self.needs_redraw = false;
    }

    /// Delete every device handle. Calling it again does nothing.
    pub fn release<D: GpuDevice>(&mut self, device: &mut D) {
        if let Some(mut quad) = self.quad.take() {
            quad.release(device);
        }
        if let Some(tex) = self.texture.take() {
            device.delete_texture(tex.id);
        }
    }

    fn apply_region<D: GpuDevice>(&mut self, device: &mut D, region: CoordinateRegion) {
        self.region = Some(region);
        if self.surface.is_drawable() {
            self.vertices = region.quad_vertices(self.surface);
        }
        if let Some(quad) = &self.quad {
            quad.set_positions(device, &self.vertices);
        }

        if let LayerKind::Fit(anchor) = self.kind {
            self.matrix = self
                .texture
                .and_then(|t| best_fit_matrix(t.width, t.height, &region, self.surface, anchor))
                .unwrap_or_default();
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/layer.rs"]
mod tests;
