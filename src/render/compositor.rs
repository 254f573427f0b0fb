//! N offscreen render targets plus the blit that shows one of them.

use crate::foundation::core::SurfaceSize;
use crate::foundation::error::{LayercastError, LayercastResult};
use crate::render::device::{FramebufferId, FramebufferStatus, GpuDevice, TextureId};
use crate::render::quad::{QuadProgram, TARGET_UVS};
use crate::transform::matrix::Matrix4;

/// Lifecycle of a [`MultiTargetCompositor`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompositorState {
    /// No device resources.
    Uninitialized,
    /// Handles exist; storage is not yet allocated.
    Created,
    /// Every target has storage at [`MultiTargetCompositor::size`].
    Sized,
}

#[derive(Debug, Clone, Copy)]
struct RenderTarget {
    framebuffer: FramebufferId,
    texture: TextureId,
}

/// Owns `N >= 2` (framebuffer, texture) pairs, all resized together.
#[derive(Debug)]
pub struct MultiTargetCompositor {
    count: usize,
    state: CompositorState,
    targets: Vec<RenderTarget>,
    quad: Option<QuadProgram>,
    size: SurfaceSize,
    matrix: Matrix4,
    resize_count: u64,
}

impl MultiTargetCompositor {
    /// A compositor that will own `count` targets. Fewer than two is a configuration error.
    pub fn new(count: usize) -> LayercastResult<Self> {
        if count < 2 {
            return Err(LayercastError::config(format!(
                "compositor needs at least 2 render targets, got {count}"
            )));
        }
        Ok(Self {
            count,
            state: CompositorState::Uninitialized,
            targets: Vec::with_capacity(count),
            quad: None,
            size: SurfaceSize::default(),
            matrix: Matrix4::identity(),
            resize_count: 0,
        })
    }

    /// Allocate handles and the blit program. Storage is attached right away only for a
    /// drawable `surface`; otherwise the first valid [`MultiTargetCompositor::on_resize`] does it.
    #[tracing::instrument(skip(self, device))]
    pub fn on_create<D: GpuDevice>(
        &mut self,
        device: &mut D,
        surface: SurfaceSize,
    ) -> LayercastResult<()> {
        self.release(device);
        self.quad = Some(QuadProgram::create(device, &TARGET_UVS)?);
        self.targets = (0..self.count)
            .map(|_| RenderTarget {
                framebuffer: device.create_framebuffer(),
                texture: device.create_texture(),
            })
            .collect();
        self.matrix = Matrix4::identity();
        self.state = CompositorState::Created;
        tracing::debug!(targets = self.count, "render targets created");

        if surface.is_drawable() {
            self.allocate_storage(device, surface)?;
        }
        Ok(())
    }

    /// Reallocate every target at `surface`. Zero sizes and unchanged sizes are no-ops.
    #[tracing::instrument(skip(self, device))]
    pub fn on_resize<D: GpuDevice>(
        &mut self,
        device: &mut D,
        surface: SurfaceSize,
    ) -> LayercastResult<()> {
        if !surface.is_drawable() || self.state == CompositorState::Uninitialized {
            return Ok(());
        }
        if self.state == CompositorState::Sized && surface == self.size {
            return Ok(());
        }
        self.allocate_storage(device, surface)
    }

    fn allocate_storage<D: GpuDevice>(
        &mut self,
        device: &mut D,
        surface: SurfaceSize,
    ) -> LayercastResult<()> {
        for (index, t) in self.targets.iter().enumerate() {
            device.allocate_texture_storage(t.texture, surface);
            let status = device.attach_color(t.framebuffer, t.texture);
            if status != FramebufferStatus::Complete {
                tracing::error!(index, ?status, ?surface, "render target incomplete");
                return Err(LayercastError::config(format!(
                    "framebuffer {index} incomplete ({status:?}) at {}x{}: framebuffer={} texture={}",
                    surface.width,
                    surface.height,
                    t.framebuffer.raw(),
                    t.texture.raw()
                )));
            }
        }
        self.size = surface;
        self.matrix = Matrix4::identity();
        device.set_viewport(surface);
        self.state = CompositorState::Sized;
        self.resize_count += 1;
        tracing::debug!(width = surface.width, height = surface.height, "render targets resized");
        Ok(())
    }

    /// Route draws into target `index`.
    pub fn bind_target<D: GpuDevice>(&self, device: &mut D, index: usize) {
        device.bind_framebuffer(Some(self.target(index).framebuffer));
    }

    /// Route draws back to the visible surface.
    pub fn unbind_target<D: GpuDevice>(&self, device: &mut D) {
        device.bind_framebuffer(None);
    }

    /// Draw target `index` over the whole visible surface.
    ///
    /// # Panics
    ///
    /// Panics when `index` is not below [`MultiTargetCompositor::target_count`].
    pub fn blit<D: GpuDevice>(&self, device: &mut D, index: usize) {
        let target = self.target(index);
        device.bind_framebuffer(None);
        if let Some(quad) = &self.quad {
            quad.draw(device, &self.matrix, target.texture);
        }
    }

    /// Number of targets.
    pub fn target_count(&self) -> usize {
        self.count
    }

    /// Framebuffer of target `index`, once created.
    pub fn framebuffer(&self, index: usize) -> Option<FramebufferId> {
        self.targets.get(index).map(|t| t.framebuffer)
    }

    /// Backing texture of target `index`, once created.
    pub fn texture(&self, index: usize) -> Option<TextureId> {
        self.targets.get(index).map(|t| t.texture)
    }

    /// Current state.
    pub fn state(&self) -> CompositorState {
        self.state
    }

    /// Size of the allocated storage.
    pub fn size(&self) -> SurfaceSize {
        self.size
    }

    /// Matrix used by the blit.
    pub fn matrix(&self) -> Matrix4 {
        self.matrix
    }

    /// Number of storage reallocation passes so far.
    pub fn resize_count(&self) -> u64 {
        self.resize_count
    }

    /// Delete every handle and return to [`CompositorState::Uninitialized`]. Idempotent.
    pub fn release<D: GpuDevice>(&mut self, device: &mut D) {
        for t in self.targets.drain(..) {
            device.delete_framebuffer(t.framebuffer);
            device.delete_texture(t.texture);
        }
        if let Some(mut quad) = self.quad.take() {
            quad.release(device);
        }
        self.state = CompositorState::Uninitialized;
        self.size = SurfaceSize::default();
    }

    fn target(&self, index: usize) -> RenderTarget {
        match self.targets.get(index) {
            Some(t) => *t,
            None => panic!(
                "render target index {index} out of range (compositor has {} targets)",
                self.count
            ),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/compositor.rs"]
mod tests;
