//! Deterministic software implementation of [`GpuDevice`].
//!
//! Triangles are rasterized at pixel centers with a top-left tie rule, so the two
//! halves of a quad never cover the same pixel twice. Sampling is nearest with
//! clamp-to-edge. Targets store their bottom row first, like a GL framebuffer.

use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroU32;

use crate::foundation::core::{Rgba8Premul, SurfaceSize};
use crate::foundation::error::{LayercastError, LayercastResult};
use crate::foundation::math::mul_div255_u16;
use crate::render::device::{
    BlendFactor, BlendFunc, BufferId, DeviceStats, FramebufferId, FramebufferStatus, GpuDevice,
    LinkedInterface, ProgramId, TextureId, Topology, link_interface,
};
use crate::render::shaders::{
    ATTRIB_POSITION, ATTRIB_TEX_COORD, ShaderSource, UNIFORM_MATRIX, UNIFORM_TEXTURE,
};
use crate::transform::matrix::Matrix4;

#[derive(Clone, Debug, Default)]
struct CpuTexture {
    size: SurfaceSize,
    pixels: Vec<u8>,
}

impl CpuTexture {
    fn allocate(size: SurfaceSize) -> Self {
        Self {
            size,
            pixels: vec![0; size.rgba_len()],
        }
    }

    fn sample_nearest(&self, u: f32, v: f32) -> [u8; 4] {
        if !self.size.is_drawable() {
            return [0; 4];
        }
        let (w, h) = (self.size.width as usize, self.size.height as usize);
        let x = ((u * w as f32).floor().max(0.0) as usize).min(w - 1);
        let y = ((v * h as f32).floor().max(0.0) as usize).min(h - 1);
        let i = (y * w + x) * 4;
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }
}

#[derive(Debug)]
struct CpuProgram {
    linked: LinkedInterface,
    matrices: HashMap<u32, Matrix4>,
    samplers: HashMap<u32, u32>,
}

#[derive(Debug, Default)]
struct Bindings {
    framebuffer: Option<FramebufferId>,
    program: Option<ProgramId>,
    attribs: BTreeMap<u32, (BufferId, u32)>,
    textures: BTreeMap<u32, TextureId>,
    blend: Option<BlendFunc>,
}

#[derive(Clone, Copy, Debug)]
struct WindowVertex {
    x: f32,
    y: f32,
    u: f32,
    v: f32,
}

/// CPU rasterizer with observable state, used headless and in tests.
#[derive(Debug, Default)]
pub struct CpuDevice {
    next_handle: u32,
    textures: HashMap<TextureId, CpuTexture>,
    framebuffers: HashMap<FramebufferId, Option<TextureId>>,
    programs: HashMap<ProgramId, CpuProgram>,
    buffers: HashMap<BufferId, Vec<f32>>,
    surface: CpuTexture,
    viewport: SurfaceSize,
    bindings: Bindings,
    current: bool,
    fail_attachments: bool,
    stats: DeviceStats,
}

impl CpuDevice {
    /// Create a device with an empty visible surface.
    pub fn new() -> Self {
        Self::default()
    }

    /// Force every later `attach_color` to report [`FramebufferStatus::Unsupported`].
    pub fn fail_attachments(&mut self, fail: bool) {
        self.fail_attachments = fail;
    }

    /// Return `true` when no program, buffer, texture, framebuffer or blend state is bound.
    pub fn bindings_clean(&self) -> bool {
        self.bindings.framebuffer.is_none()
            && self.bindings.program.is_none()
            && self.bindings.attribs.is_empty()
            && self.bindings.textures.is_empty()
            && self.bindings.blend.is_none()
    }

    /// Visible surface pixels, bottom row first.
    pub fn surface_pixels(&self) -> &[u8] {
        &self.surface.pixels
    }

    /// Size of the visible surface.
    pub fn surface_size(&self) -> SurfaceSize {
        self.surface.size
    }

    /// Storage size of a texture, `None` for unknown handles.
    pub fn texture_size(&self, texture: TextureId) -> Option<SurfaceSize> {
        self.textures.get(&texture).map(|t| t.size)
    }

    /// Whether the context was made current at least once.
    pub fn is_current(&self) -> bool {
        self.current
    }

    fn next_raw(&mut self) -> NonZeroU32 {
        self.next_handle = self.next_handle.saturating_add(1);
        NonZeroU32::new(self.next_handle).unwrap_or(NonZeroU32::MAX)
    }

    fn target_texture_id(&self) -> Option<TextureId> {
        self.bindings
            .framebuffer
            .and_then(|fb| self.framebuffers.get(&fb).copied().flatten())
    }

    fn gather_vertex(
        &self,
        matrix: &Matrix4,
        positions: (&[f32], u32),
        uvs: (&[f32], u32),
        index: u32,
    ) -> Option<WindowVertex> {
        let fetch = |data: &[f32], comps: u32, defaults: [f32; 4]| -> Option<[f32; 4]> {
            let start = (index * comps) as usize;
            let slice = data.get(start..start + comps as usize)?;
            let mut out = defaults;
            out[..slice.len().min(4)].copy_from_slice(&slice[..slice.len().min(4)]);
            Some(out)
        };
        let p = fetch(positions.0, positions.1, [0.0, 0.0, 0.0, 1.0])?;
        let t = fetch(uvs.0, uvs.1, [0.0; 4])?;
        let clip = matrix.transform_point(p);
        if clip[3] == 0.0 {
            return None;
        }
        let (nx, ny) = (clip[0] / clip[3], clip[1] / clip[3]);
        Some(WindowVertex {
            x: (nx + 1.0) * 0.5 * self.viewport.width as f32,
            y: (ny + 1.0) * 0.5 * self.viewport.height as f32,
            u: t[0],
            v: t[1],
        })
    }
}

fn edge(a: (f32, f32), b: (f32, f32), p: (f32, f32)) -> f32 {
    (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0)
}

/// Pixels exactly on an edge belong to the triangle that walks the edge
/// upward, or leftward when horizontal.
fn owns_tie(a: (f32, f32), b: (f32, f32)) -> bool {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    dy > 0.0 || (dy == 0.0 && dx < 0.0)
}

fn factor(f: BlendFactor, src_alpha: u8) -> u16 {
    match f {
        BlendFactor::Zero => 0,
        BlendFactor::One => 255,
        BlendFactor::SrcAlpha => u16::from(src_alpha),
        BlendFactor::OneMinusSrcAlpha => 255 - u16::from(src_alpha),
    }
}

fn blend_px(dst: &mut [u8], src: [u8; 4], blend: Option<BlendFunc>) {
    let Some(func) = blend else {
        dst.copy_from_slice(&src);
        return;
    };
    let fs = factor(func.src, src[3]);
    let fd = factor(func.dst, src[3]);
    for c in 0..4 {
        let v = mul_div255_u16(u16::from(src[c]), fs) + mul_div255_u16(u16::from(dst[c]), fd);
        dst[c] = v.min(255) as u8;
    }
}

fn raster_triangle(
    target: &mut CpuTexture,
    clip: SurfaceSize,
    tri: [WindowVertex; 3],
    source: Option<&CpuTexture>,
    blend: Option<BlendFunc>,
) {
    let [a, mut b, mut c] = tri;
    let mut area = edge((a.x, a.y), (b.x, b.y), (c.x, c.y));
    if area == 0.0 || !area.is_finite() {
        return;
    }
    if area < 0.0 {
        std::mem::swap(&mut b, &mut c);
        area = -area;
    }
    let (pa, pb, pc) = ((a.x, a.y), (b.x, b.y), (c.x, c.y));

    let max_x = clip.width.min(target.size.width) as f32;
    let max_y = clip.height.min(target.size.height) as f32;
    let x0 = a.x.min(b.x).min(c.x).floor().clamp(0.0, max_x) as usize;
    let x1 = a.x.max(b.x).max(c.x).ceil().clamp(0.0, max_x) as usize;
    let y0 = a.y.min(b.y).min(c.y).floor().clamp(0.0, max_y) as usize;
    let y1 = a.y.max(b.y).max(c.y).ceil().clamp(0.0, max_y) as usize;

    let inside = |w: f32, from: (f32, f32), to: (f32, f32)| w > 0.0 || (w == 0.0 && owns_tie(from, to));
    let stride = target.size.width as usize;

    for y in y0..y1 {
        for x in x0..x1 {
            let p = (x as f32 + 0.5, y as f32 + 0.5);
            let wa = edge(pb, pc, p);
            let wb = edge(pc, pa, p);
            let wc = edge(pa, pb, p);
            if !(inside(wa, pb, pc) && inside(wb, pc, pa) && inside(wc, pa, pb)) {
                continue;
            }
            let (ba, bb, bc) = (wa / area, wb / area, wc / area);
            let u = ba * a.u + bb * b.u + bc * c.u;
            let v = ba * a.v + bb * b.v + bc * c.v;
            let src = source.map_or([0; 4], |t| t.sample_nearest(u, v));
            let i = (y * stride + x) * 4;
            blend_px(&mut target.pixels[i..i + 4], src, blend);
        }
    }
}

impl GpuDevice for CpuDevice {
    fn make_current(&mut self) -> LayercastResult<()> {
        self.current = true;
        Ok(())
    }

    fn create_program(
        &mut self,
        vertex: &ShaderSource<'_>,
        fragment: &ShaderSource<'_>,
    ) -> LayercastResult<ProgramId> {
        let linked = link_interface(vertex, fragment)?;
        let id = ProgramId(self.next_raw());
        self.programs.insert(
            id,
            CpuProgram {
                linked,
                matrices: HashMap::new(),
                samplers: HashMap::new(),
            },
        );
        Ok(id)
    }

    fn attrib_location(&self, program: ProgramId, name: &str) -> Option<u32> {
        self.programs.get(&program)?.linked.attributes.get(name).copied()
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<u32> {
        self.programs.get(&program)?.linked.uniforms.get(name).copied()
    }

    fn delete_program(&mut self, program: ProgramId) {
        if self.programs.remove(&program).is_some() && self.bindings.program == Some(program) {
            self.bindings.program = None;
        }
    }

    fn create_buffer(&mut self, data: &[f32]) -> BufferId {
        let id = BufferId(self.next_raw());
        self.buffers.insert(id, data.to_vec());
        id
    }

    fn update_buffer(&mut self, buffer: BufferId, data: &[f32]) {
        if let Some(b) = self.buffers.get_mut(&buffer) {
            b.clear();
            b.extend_from_slice(data);
        }
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(&buffer);
        self.bindings.attribs.retain(|_, (b, _)| *b != buffer);
    }

    fn create_texture(&mut self) -> TextureId {
        let id = TextureId(self.next_raw());
        self.textures.insert(id, CpuTexture::default());
        id
    }

    fn upload_texture(
        &mut self,
        texture: TextureId,
        size: SurfaceSize,
        rgba8_premul: &[u8],
    ) -> LayercastResult<()> {
        if rgba8_premul.len() != size.rgba_len() {
            return Err(LayercastError::asset(format!(
                "texture upload expects {} bytes for {}x{}, got {}",
                size.rgba_len(),
                size.width,
                size.height,
                rgba8_premul.len()
            )));
        }
        let Some(t) = self.textures.get_mut(&texture) else {
            return Err(LayercastError::config(format!(
                "upload to unknown texture {}",
                texture.raw()
            )));
        };
        t.size = size;
        t.pixels.clear();
        t.pixels.extend_from_slice(rgba8_premul);
        self.stats.texture_uploads += 1;
        Ok(())
    }

    fn allocate_texture_storage(&mut self, texture: TextureId, size: SurfaceSize) {
        match self.textures.get_mut(&texture) {
            Some(t) => {
                *t = CpuTexture::allocate(size);
                self.stats.storage_allocations += 1;
            }
            None => tracing::warn!(texture = texture.raw(), "storage for unknown texture"),
        }
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if self.textures.remove(&texture).is_none() {
            return;
        }
        self.bindings.textures.retain(|_, t| *t != texture);
        for attachment in self.framebuffers.values_mut() {
            if *attachment == Some(texture) {
                *attachment = None;
            }
        }
    }

    fn create_framebuffer(&mut self) -> FramebufferId {
        let id = FramebufferId(self.next_raw());
        self.framebuffers.insert(id, None);
        id
    }

    fn attach_color(&mut self, framebuffer: FramebufferId, texture: TextureId) -> FramebufferStatus {
        if self.fail_attachments {
            return FramebufferStatus::Unsupported;
        }
        let Some(storage) = self.textures.get(&texture).map(|t| t.size) else {
            return FramebufferStatus::Unsupported;
        };
        let Some(slot) = self.framebuffers.get_mut(&framebuffer) else {
            return FramebufferStatus::Unsupported;
        };
        *slot = Some(texture);
        if storage.is_drawable() {
            FramebufferStatus::Complete
        } else {
            FramebufferStatus::IncompleteAttachment
        }
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        if self.framebuffers.remove(&framebuffer).is_some()
            && self.bindings.framebuffer == Some(framebuffer)
        {
            self.bindings.framebuffer = None;
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        self.bindings.framebuffer = framebuffer.filter(|fb| self.framebuffers.contains_key(fb));
    }

    fn resize_surface(&mut self, size: SurfaceSize) {
        if self.surface.size != size {
            self.surface = CpuTexture::allocate(size);
        }
    }

    fn set_viewport(&mut self, size: SurfaceSize) {
        self.viewport = size;
    }

    fn clear(&mut self, color: Rgba8Premul) {
        let rgba = color.to_array();
        let target = match self.target_texture_id() {
            Some(id) => self.textures.get_mut(&id),
            None if self.bindings.framebuffer.is_none() => Some(&mut self.surface),
            None => None,
        };
        if let Some(t) = target {
            for px in t.pixels.chunks_exact_mut(4) {
                px.copy_from_slice(&rgba);
            }
            self.stats.clears += 1;
        }
    }

    fn set_blend(&mut self, blend: Option<BlendFunc>) {
        self.bindings.blend = blend;
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        self.bindings.program = program.filter(|p| self.programs.contains_key(p));
    }

    fn set_uniform_matrix(&mut self, location: u32, matrix: &Matrix4) {
        if let Some(p) = self.bindings.program.and_then(|id| self.programs.get_mut(&id)) {
            p.matrices.insert(location, *matrix);
        }
    }

    fn set_uniform_sampler(&mut self, location: u32, unit: u32) {
        if let Some(p) = self.bindings.program.and_then(|id| self.programs.get_mut(&id)) {
            p.samplers.insert(location, unit);
        }
    }

    fn bind_attrib_buffer(&mut self, location: u32, buffer: Option<BufferId>, components: u32) {
        match buffer.filter(|b| self.buffers.contains_key(b)) {
            Some(b) => {
                self.bindings.attribs.insert(location, (b, components.clamp(1, 4)));
            }
            None => {
                self.bindings.attribs.remove(&location);
            }
        }
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>) {
        match texture.filter(|t| self.textures.contains_key(t)) {
            Some(t) => {
                self.bindings.textures.insert(unit, t);
            }
            None => {
                self.bindings.textures.remove(&unit);
            }
        }
    }

    fn draw_arrays(&mut self, topology: Topology, first: u32, count: u32) {
        let resolved = (|| {
            let program = self.programs.get(&self.bindings.program?)?;
            let pos_loc = program.linked.attributes.get(ATTRIB_POSITION)?;
            let uv_loc = program.linked.attributes.get(ATTRIB_TEX_COORD)?;
            let (pos_buf, pos_comps) = *self.bindings.attribs.get(pos_loc)?;
            let (uv_buf, uv_comps) = *self.bindings.attribs.get(uv_loc)?;
            let matrix = program
                .linked
                .uniforms
                .get(UNIFORM_MATRIX)
                .and_then(|loc| program.matrices.get(loc))
                .copied()
                .unwrap_or_default();
            let unit = program
                .linked
                .uniforms
                .get(UNIFORM_TEXTURE)
                .and_then(|loc| program.samplers.get(loc))
                .copied()
                .unwrap_or(0);
            let source = self.bindings.textures.get(&unit).copied();
            Some((matrix, pos_buf, pos_comps, uv_buf, uv_comps, source))
        })();

        let Some((matrix, pos_buf, pos_comps, uv_buf, uv_comps, source)) = resolved else {
            tracing::warn!("draw skipped: incomplete program/buffer bindings");
            self.stats.skipped_draws += 1;
            return;
        };

        let verts: Option<Vec<WindowVertex>> = {
            let positions = self.buffers.get(&pos_buf).map(Vec::as_slice).unwrap_or(&[]);
            let uvs = self.buffers.get(&uv_buf).map(Vec::as_slice).unwrap_or(&[]);
            (first..first.saturating_add(count))
                .map(|i| self.gather_vertex(&matrix, (positions, pos_comps), (uvs, uv_comps), i))
                .collect()
        };
        let Some(verts) = verts else {
            tracing::warn!(first, count, "draw skipped: vertices out of buffer range");
            self.stats.skipped_draws += 1;
            return;
        };

        let target_id = self.target_texture_id();
        if self.bindings.framebuffer.is_some() && target_id.is_none() {
            self.stats.skipped_draws += 1;
            return;
        }
        let mut target = match target_id {
            Some(id) => self.textures.remove(&id).unwrap_or_default(),
            None => std::mem::take(&mut self.surface),
        };

        let feedback = source.is_some() && source == target_id;
        let source_copy = feedback.then(|| target.clone());
        let source_ref = if feedback {
            source_copy.as_ref()
        } else {
            source.and_then(|id| self.textures.get(&id))
        };

        for tri in topology.triangles(0, verts.len() as u32) {
            let tri = tri.map(|i| verts[i as usize]);
            raster_triangle(&mut target, self.viewport, tri, source_ref, self.bindings.blend);
        }

        match target_id {
            Some(id) => {
                self.textures.insert(id, target);
            }
            None => self.surface = target,
        }
        self.stats.draws += 1;
    }

    fn finish(&mut self) {
        self.stats.finishes += 1;
    }

    fn read_pixels(
        &mut self,
        framebuffer: Option<FramebufferId>,
        size: SurfaceSize,
        out: &mut [u8],
    ) -> LayercastResult<()> {
        let source = match framebuffer {
            Some(fb) => self
                .framebuffers
                .get(&fb)
                .copied()
                .flatten()
                .and_then(|t| self.textures.get(&t)),
            None => Some(&self.surface),
        };
        let Some(source) = source else {
            return Err(LayercastError::capture("read from a framebuffer without storage"));
        };
        if !size.is_drawable()
            || size.width > source.size.width
            || size.height > source.size.height
            || out.len() != size.rgba_len()
        {
            return Err(LayercastError::capture(format!(
                "readback of {}x{} into {} bytes from a {}x{} target",
                size.width,
                size.height,
                out.len(),
                source.size.width,
                source.size.height
            )));
        }

        let src_stride = source.size.width as usize * 4;
        let row_len = size.width as usize * 4;
        for (y, row) in out.chunks_exact_mut(row_len).enumerate() {
            let start = y * src_stride;
            row.copy_from_slice(&source.pixels[start..start + row_len]);
        }
        self.stats.readbacks += 1;
        Ok(())
    }

    fn discard_drawable(&mut self) {
        self.surface.pixels.fill(0);
        self.stats.discarded_drawables += 1;
    }

    fn stats(&self) -> DeviceStats {
        DeviceStats {
            live_textures: self.textures.len(),
            live_framebuffers: self.framebuffers.len(),
            live_programs: self.programs.len(),
            live_buffers: self.buffers.len(),
            ..self.stats.clone()
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/cpu.rs"]
mod tests;
