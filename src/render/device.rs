//! The device seam: everything layers and the compositor need from a GPU.
//!
//! Calls mirror a stateful immediate-mode API (bind, set, draw, unbind). The
//! render thread owns the device; nothing here is required to be `Send`.

use std::collections::BTreeMap;
use std::num::NonZeroU32;

use crate::foundation::core::{Rgba8Premul, SurfaceSize};
use crate::foundation::error::{LayercastError, LayercastResult};
use crate::render::shaders::{ShaderSource, ShaderStage};
use crate::transform::matrix::Matrix4;

macro_rules! device_handle {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub(crate) NonZeroU32);

        impl $name {
            /// Wrap a raw non-zero handle value.
            pub fn from_raw(raw: u32) -> Option<Self> {
                NonZeroU32::new(raw).map(Self)
            }

            /// Raw handle value, never zero.
            pub fn raw(self) -> u32 {
                self.0.get()
            }
        }
    };
}

device_handle!(
    /// Texture handle.
    TextureId
);
device_handle!(
    /// Framebuffer (offscreen render target) handle.
    FramebufferId
);
device_handle!(
    /// Linked shader program handle.
    ProgramId
);
device_handle!(
    /// Vertex buffer handle.
    BufferId
);

/// Result of a framebuffer completeness check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FramebufferStatus {
    /// Ready to be drawn into.
    Complete,
    /// No color attachment.
    MissingAttachment,
    /// The attached texture has no storage.
    IncompleteAttachment,
    /// The framebuffer or texture handle is unknown to the device.
    Unsupported,
}

/// Blend factor applied to source or destination color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    /// 0
    Zero,
    /// 1
    One,
    /// Source alpha.
    SrcAlpha,
    /// 1 - source alpha.
    OneMinusSrcAlpha,
}

/// Fixed-function blend equation `src * src_factor + dst * dst_factor`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlendFunc {
    /// Factor for the incoming fragment.
    pub src: BlendFactor,
    /// Factor for the stored color.
    pub dst: BlendFactor,
}

impl BlendFunc {
    /// `src-alpha, one-minus-src-alpha`.
    pub const ALPHA: Self = Self {
        src: BlendFactor::SrcAlpha,
        dst: BlendFactor::OneMinusSrcAlpha,
    };
}

/// Primitive assembly for `draw_arrays`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Topology {
    /// `(0, i, i + 1)` triangles.
    TriangleFan,
    /// `(i, i + 1, i + 2)` triangles.
    TriangleStrip,
}

impl Topology {
    /// Expand `count` vertices starting at `first` into triangle index triples.
    pub fn triangles(self, first: u32, count: u32) -> Vec<[u32; 3]> {
        if count < 3 {
            return Vec::new();
        }
        match self {
            Self::TriangleFan => (1..count - 1)
                .map(|i| [first, first + i, first + i + 1])
                .collect(),
            Self::TriangleStrip => (0..count - 2)
                .map(|i| [first + i, first + i + 1, first + i + 2])
                .collect(),
        }
    }
}

/// Call counters and live-handle gauges reported by a device.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceStats {
    /// Draw calls that produced geometry.
    pub draws: u64,
    /// Draw calls skipped because bindings were incomplete.
    pub skipped_draws: u64,
    /// Clear calls.
    pub clears: u64,
    /// Bitmap uploads.
    pub texture_uploads: u64,
    /// Empty storage (re)allocations.
    pub storage_allocations: u64,
    /// Pixel readbacks.
    pub readbacks: u64,
    /// Drawables discarded before a blit.
    pub discarded_drawables: u64,
    /// Completed `finish` barriers.
    pub finishes: u64,
    /// Live textures.
    pub live_textures: usize,
    /// Live framebuffers.
    pub live_framebuffers: usize,
    /// Live programs.
    pub live_programs: usize,
    /// Live buffers.
    pub live_buffers: usize,
}

impl DeviceStats {
    /// Total live handles of every kind.
    pub fn live_handles(&self) -> usize {
        self.live_textures + self.live_framebuffers + self.live_programs + self.live_buffers
    }
}

/// A GPU (or GPU-shaped) device driven from the render thread.
///
/// Deleting an unknown handle is a no-op. `read_pixels` returns tightly packed
/// premultiplied RGBA8 with the bottom row first.
pub trait GpuDevice {
    /// Make the device's context current on the calling thread. Idempotent.
    fn make_current(&mut self) -> LayercastResult<()>;

    /// Compile both stages and link them; failures carry the diagnostic log.
    fn create_program(
        &mut self,
        vertex: &ShaderSource<'_>,
        fragment: &ShaderSource<'_>,
    ) -> LayercastResult<ProgramId>;
    /// Location of a linked vertex attribute.
    fn attrib_location(&self, program: ProgramId, name: &str) -> Option<u32>;
    /// Location of a linked uniform.
    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<u32>;
    /// Delete a program.
    fn delete_program(&mut self, program: ProgramId);

    /// Allocate a vertex buffer holding `data`.
    fn create_buffer(&mut self, data: &[f32]) -> BufferId;
    /// Replace a buffer's contents.
    fn update_buffer(&mut self, buffer: BufferId, data: &[f32]);
    /// Delete a buffer.
    fn delete_buffer(&mut self, buffer: BufferId);

    /// Allocate an empty texture handle.
    fn create_texture(&mut self) -> TextureId;
    /// Specify a texture's storage and contents from premultiplied RGBA8, top row first.
    fn upload_texture(
        &mut self,
        texture: TextureId,
        size: SurfaceSize,
        rgba8_premul: &[u8],
    ) -> LayercastResult<()>;
    /// (Re)specify a texture's storage at `size` with undefined contents.
    fn allocate_texture_storage(&mut self, texture: TextureId, size: SurfaceSize);
    /// Delete a texture.
    fn delete_texture(&mut self, texture: TextureId);

    /// Allocate a framebuffer handle.
    fn create_framebuffer(&mut self) -> FramebufferId;
    /// Attach `texture` as the color attachment and report completeness.
    fn attach_color(&mut self, framebuffer: FramebufferId, texture: TextureId) -> FramebufferStatus;
    /// Delete a framebuffer.
    fn delete_framebuffer(&mut self, framebuffer: FramebufferId);
    /// Route subsequent draws; `None` is the visible surface.
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>);

    /// Resize the visible surface's backing store.
    fn resize_surface(&mut self, size: SurfaceSize);
    /// Set the viewport used to map normalized coordinates to pixels.
    fn set_viewport(&mut self, size: SurfaceSize);
    /// Fill the bound target.
    fn clear(&mut self, color: Rgba8Premul);
    /// Enable (`Some`) or disable (`None`) blending.
    fn set_blend(&mut self, blend: Option<BlendFunc>);

    /// Bind or unbind a program.
    fn use_program(&mut self, program: Option<ProgramId>);
    /// Set a matrix uniform on the bound program.
    fn set_uniform_matrix(&mut self, location: u32, matrix: &Matrix4);
    /// Point a sampler uniform of the bound program at a texture unit.
    fn set_uniform_sampler(&mut self, location: u32, unit: u32);
    /// Bind or unbind the buffer feeding an attribute.
    fn bind_attrib_buffer(&mut self, location: u32, buffer: Option<BufferId>, components: u32);
    /// Bind or unbind a texture on a unit.
    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>);
    /// Draw with the current bindings.
    fn draw_arrays(&mut self, topology: Topology, first: u32, count: u32);

    /// Block until submitted work completes.
    fn finish(&mut self);
    /// Read `size` pixels from a target (`None` = visible surface) into `out`.
    fn read_pixels(
        &mut self,
        framebuffer: Option<FramebufferId>,
        size: SurfaceSize,
        out: &mut [u8],
    ) -> LayercastResult<()>;
    /// Drop the visible surface's previous contents.
    fn discard_drawable(&mut self);

    /// Counters and live-handle gauges.
    fn stats(&self) -> DeviceStats;
}

/// Attribute and uniform locations of a linked program.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct LinkedInterface {
    pub(crate) attributes: BTreeMap<String, u32>,
    pub(crate) uniforms: BTreeMap<String, u32>,
}

/// Front-end checks shared by devices before handing sources to a backend
/// compiler: stage, entry point and every declared name must be present, and
/// the two stages must agree on uniform locations.
pub(crate) fn link_interface(
    vertex: &ShaderSource<'_>,
    fragment: &ShaderSource<'_>,
) -> LayercastResult<LinkedInterface> {
    let mut log = Vec::new();
    check_stage(vertex, ShaderStage::Vertex, &mut log);
    check_stage(fragment, ShaderStage::Fragment, &mut log);

    let mut linked = LinkedInterface::default();
    for src in [vertex, fragment] {
        for (name, loc) in src.attributes {
            linked.attributes.insert((*name).to_string(), *loc);
        }
        for (name, loc) in src.uniforms {
            if let Some(prev) = linked.uniforms.insert((*name).to_string(), *loc)
                && prev != *loc
            {
                log.push(format!(
                    "link: uniform '{name}' bound at {prev} and {loc} ({} / {})",
                    vertex.name, fragment.name
                ));
            }
        }
    }

    if log.is_empty() {
        return Ok(linked);
    }
    let log = log.join("\n");
    tracing::error!(vertex = vertex.name, fragment = fragment.name, %log, "shader program failed");
    Err(LayercastError::config(format!(
        "shader program '{}' + '{}' failed:\n{log}",
        vertex.name, fragment.name
    )))
}

fn check_stage(src: &ShaderSource<'_>, expected: ShaderStage, log: &mut Vec<String>) {
    if src.stage != expected {
        log.push(format!(
            "{}: compiled as {:?}, expected {:?}",
            src.name, src.stage, expected
        ));
        return;
    }
    if src.code.trim().is_empty() {
        log.push(format!("{}: empty source", src.name));
        return;
    }
    if !src.code.contains(expected.attribute()) {
        log.push(format!("{}: missing {} stage attribute", src.name, expected.attribute()));
    }
    if !src.code.contains(&format!("fn {}", expected.entry_point())) {
        log.push(format!(
            "{}: missing entry point {}",
            src.name,
            expected.entry_point()
        ));
    }
    for (name, _) in src.attributes.iter().chain(src.uniforms.iter()) {
        if !src.code.contains(name) {
            log.push(format!("{}: undeclared identifier '{name}'", src.name));
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/device.rs"]
mod tests;
