//! Headless `wgpu` implementation of [`GpuDevice`] (feature `gpu`).
//!
//! Every draw is encoded and submitted on its own; this keeps the immediate-mode
//! contract simple at the cost of batching. Targets are `Rgba8Unorm` textures
//! whose row 0 is the bottom row, matching [`crate::render::cpu::CpuDevice`].

use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroU32;

use wgpu::util::DeviceExt;

use crate::foundation::core::{Rgba8Premul, SurfaceSize};
use crate::foundation::error::{LayercastError, LayercastResult};
use crate::foundation::math::align_to;
use crate::render::device::{
    BlendFactor, BlendFunc, BufferId, DeviceStats, FramebufferId, FramebufferStatus, GpuDevice,
    LinkedInterface, ProgramId, TextureId, Topology, link_interface,
};
use crate::render::shaders::{
    ATTRIB_POSITION, ATTRIB_TEX_COORD, ShaderSource, UNIFORM_MATRIX, UNIFORM_TEXTURE,
};
use crate::transform::matrix::Matrix4;

const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: SurfaceSize,
}

struct GpuProgram {
    linked: LinkedInterface,
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
    pipelines: HashMap<Option<BlendFunc>, wgpu::RenderPipeline>,
    matrices: HashMap<u32, Matrix4>,
    samplers: HashMap<u32, u32>,
}

#[derive(Default)]
struct Bindings {
    framebuffer: Option<FramebufferId>,
    program: Option<ProgramId>,
    attribs: BTreeMap<u32, (BufferId, u32)>,
    textures: BTreeMap<u32, TextureId>,
    blend: Option<BlendFunc>,
}

/// `wgpu`-backed device rendering into offscreen textures.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    sampler: wgpu::Sampler,
    fallback: GpuTexture,
    next_handle: u32,
    textures: HashMap<TextureId, Option<GpuTexture>>,
    framebuffers: HashMap<FramebufferId, Option<TextureId>>,
    programs: HashMap<ProgramId, GpuProgram>,
    buffers: HashMap<BufferId, Vec<f32>>,
    surface: Option<GpuTexture>,
    viewport: SurfaceSize,
    bindings: Bindings,
    stats: DeviceStats,
}

impl std::fmt::Debug for WgpuDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuDevice")
            .field("textures", &self.textures.len())
            .field("framebuffers", &self.framebuffers.len())
            .field("programs", &self.programs.len())
            .field("viewport", &self.viewport)
            .finish()
    }
}

impl WgpuDevice {
    /// Acquire an adapter and device without a presentation surface.
    pub fn new() -> LayercastResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| LayercastError::config(format!("wgpu request_adapter failed: {e:?}")))?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("layercast_device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| LayercastError::config(format!("wgpu request_device failed: {e:?}")))?;

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("layercast_quad_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("layercast_quad_pipeline_layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("layercast_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let fallback = create_texture(&device, SurfaceSize::new(1, 1), "layercast_fallback");

        Ok(Self {
            device,
            queue,
            layout,
            pipeline_layout,
            sampler,
            fallback,
            next_handle: 0,
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            programs: HashMap::new(),
            buffers: HashMap::new(),
            surface: None,
            viewport: SurfaceSize::default(),
            bindings: Bindings::default(),
            stats: DeviceStats::default(),
        })
    }

    fn next_raw(&mut self) -> NonZeroU32 {
        self.next_handle = self.next_handle.saturating_add(1);
        NonZeroU32::new(self.next_handle).unwrap_or(NonZeroU32::MAX)
    }

    fn compile(&self, src: &ShaderSource<'_>) -> LayercastResult<wgpu::ShaderModule> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(src.name),
                source: wgpu::ShaderSource::Wgsl(src.code.into()),
            });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            tracing::error!(shader = src.name, %err, "shader compile failed");
            return Err(LayercastError::config(format!(
                "shader '{}' failed to compile:\n{err}",
                src.name
            )));
        }
        Ok(module)
    }

    fn target_view(&self) -> Option<(&wgpu::TextureView, SurfaceSize, Option<TextureId>)> {
        match self.bindings.framebuffer {
            Some(fb) => {
                let id = self.framebuffers.get(&fb).copied().flatten()?;
                let t = self.textures.get(&id)?.as_ref()?;
                Some((&t.view, t.size, Some(id)))
            }
            None => self.surface.as_ref().map(|t| (&t.view, t.size, None)),
        }
    }

    fn pipeline_for(&mut self, program: ProgramId, blend: Option<BlendFunc>) -> Option<()> {
        let device = &self.device;
        let layout = &self.pipeline_layout;
        let p = self.programs.get_mut(&program)?;
        p.pipelines.entry(blend).or_insert_with(|| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("layercast_quad_pipeline"),
                layout: Some(layout),
                vertex: wgpu::VertexState {
                    module: &p.vertex,
                    entry_point: Some("vs_main"),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: (5 * size_of::<f32>()) as u64,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &[
                            wgpu::VertexAttribute {
                                format: wgpu::VertexFormat::Float32x3,
                                offset: 0,
                                shader_location: 0,
                            },
                            wgpu::VertexAttribute {
                                format: wgpu::VertexFormat::Float32x2,
                                offset: 12,
                                shader_location: 1,
                            },
                        ],
                    }],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &p.fragment,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: TARGET_FORMAT,
                        blend: blend.map(blend_state),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        });
        Some(())
    }

    fn gather_vertices(&self, topology: Topology, first: u32, count: u32) -> Option<Vec<f32>> {
        let program = self.programs.get(&self.bindings.program?)?;
        let (pos_buf, pos_comps) = *self
            .bindings
            .attribs
            .get(program.linked.attributes.get(ATTRIB_POSITION)?)?;
        let (uv_buf, uv_comps) = *self
            .bindings
            .attribs
            .get(program.linked.attributes.get(ATTRIB_TEX_COORD)?)?;
        let positions = self.buffers.get(&pos_buf)?;
        let uvs = self.buffers.get(&uv_buf)?;

        let mut out = Vec::new();
        for tri in topology.triangles(first, count) {
            for i in tri {
                let p0 = (i * pos_comps) as usize;
                let t0 = (i * uv_comps) as usize;
                let p = positions.get(p0..p0 + pos_comps as usize)?;
                let t = uvs.get(t0..t0 + uv_comps as usize)?;
                out.extend_from_slice(&[
                    p[0],
                    p.get(1).copied().unwrap_or(0.0),
                    p.get(2).copied().unwrap_or(0.0),
                    t[0],
                    t.get(1).copied().unwrap_or(0.0),
                ]);
            }
        }
        Some(out)
    }
}

fn create_texture(device: &wgpu::Device, size: SurfaceSize, label: &str) -> GpuTexture {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: size.width.max(1),
            height: size.height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: TARGET_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    GpuTexture {
        texture,
        view,
        size,
    }
}

fn wgpu_factor(f: BlendFactor) -> wgpu::BlendFactor {
    match f {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
    }
}

fn blend_state(func: BlendFunc) -> wgpu::BlendState {
    let component = wgpu::BlendComponent {
        src_factor: wgpu_factor(func.src),
        dst_factor: wgpu_factor(func.dst),
        operation: wgpu::BlendOperation::Add,
    };
    wgpu::BlendState {
        color: component,
        alpha: component,
    }
}

impl GpuDevice for WgpuDevice {
    fn make_current(&mut self) -> LayercastResult<()> {
        Ok(())
    }

    fn create_program(
        &mut self,
        vertex: &ShaderSource<'_>,
        fragment: &ShaderSource<'_>,
    ) -> LayercastResult<ProgramId> {
        let linked = link_interface(vertex, fragment)?;
        let vertex = self.compile(vertex)?;
        let fragment = self.compile(fragment)?;
        let id = ProgramId(self.next_raw());
        self.programs.insert(
            id,
            GpuProgram {
                linked,
                vertex,
                fragment,
                pipelines: HashMap::new(),
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
        self.textures.insert(id, None);
        id
    }

    fn upload_texture(
        &mut self,
        texture: TextureId,
        size: SurfaceSize,
        rgba8_premul: &[u8],
    ) -> LayercastResult<()> {
        if rgba8_premul.len() != size.rgba_len() || !size.is_drawable() {
            return Err(LayercastError::asset(format!(
                "texture upload expects {} bytes for {}x{}, got {}",
                size.rgba_len(),
                size.width,
                size.height,
                rgba8_premul.len()
            )));
        }
        let Some(slot) = self.textures.get_mut(&texture) else {
            return Err(LayercastError::config(format!(
                "upload to unknown texture {}",
                texture.raw()
            )));
        };
        if slot.as_ref().map(|t| t.size) != Some(size) {
            *slot = Some(create_texture(&self.device, size, "layercast_layer_texture"));
        }
        if let Some(t) = slot.as_ref() {
            self.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &t.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                rgba8_premul,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(size.width * 4),
                    rows_per_image: Some(size.height),
                },
                wgpu::Extent3d {
                    width: size.width,
                    height: size.height,
                    depth_or_array_layers: 1,
                },
            );
        }
        self.stats.texture_uploads += 1;
        Ok(())
    }

    fn allocate_texture_storage(&mut self, texture: TextureId, size: SurfaceSize) {
        let Some(slot) = self.textures.get_mut(&texture) else {
            tracing::warn!(texture = texture.raw(), "storage for unknown texture");
            return;
        };
        *slot = size
            .is_drawable()
            .then(|| create_texture(&self.device, size, "layercast_target"));
        self.stats.storage_allocations += 1;
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if let Some(Some(t)) = self.textures.remove(&texture) {
            t.texture.destroy();
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
        let Some(storage) = self.textures.get(&texture) else {
            return FramebufferStatus::Unsupported;
        };
        let has_storage = storage.is_some();
        let Some(slot) = self.framebuffers.get_mut(&framebuffer) else {
            return FramebufferStatus::Unsupported;
        };
        *slot = Some(texture);
        if has_storage {
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
        if self.surface.as_ref().map(|t| t.size) == Some(size) {
            return;
        }
        self.surface = size
            .is_drawable()
            .then(|| create_texture(&self.device, size, "layercast_drawable"));
    }

    fn set_viewport(&mut self, size: SurfaceSize) {
        self.viewport = size;
    }

    fn clear(&mut self, color: Rgba8Premul) {
        let Some((view, _, _)) = self.target_view() else {
            return;
        };
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("layercast_clear"),
            });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("layercast_clear_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: f64::from(color.r) / 255.0,
                            g: f64::from(color.g) / 255.0,
                            b: f64::from(color.b) / 255.0,
                            a: f64::from(color.a) / 255.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        self.queue.submit([encoder.finish()]);
        self.stats.clears += 1;
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
        let Some(program_id) = self.bindings.program else {
            self.stats.skipped_draws += 1;
            return;
        };
        let blend = self.bindings.blend;
        let Some(vertices) = self.gather_vertices(topology, first, count) else {
            tracing::warn!("draw skipped: incomplete program/buffer bindings");
            self.stats.skipped_draws += 1;
            return;
        };
        if vertices.is_empty() || self.pipeline_for(program_id, blend).is_none() {
            self.stats.skipped_draws += 1;
            return;
        }

        let Some(program) = self.programs.get(&program_id) else {
            return;
        };
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
        let source_id = self.bindings.textures.get(&unit).copied();

        let Some((target, target_size, target_id)) = self.target_view() else {
            self.stats.skipped_draws += 1;
            return;
        };
        if source_id.is_some() && source_id == target_id {
            tracing::warn!("draw skipped: texture is bound as both source and target");
            self.stats.skipped_draws += 1;
            return;
        }
        let source_view = source_id
            .and_then(|id| self.textures.get(&id))
            .and_then(Option::as_ref)
            .map_or(&self.fallback.view, |t| &t.view);
        let Some(pipeline) = program.pipelines.get(&blend) else {
            return;
        };

        let vertex_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("layercast_quad_vertices"),
                contents: bytemuck::cast_slice(&vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let uniform_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("layercast_quad_uniforms"),
                contents: bytemuck::cast_slice(&matrix.as_array()[..]),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("layercast_quad_bind_group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(source_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let vw = self.viewport.width.min(target_size.width).max(1) as f32;
        let vh = self.viewport.height.min(target_size.height).max(1) as f32;
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("layercast_draw"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("layercast_draw_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_viewport(0.0, 0.0, vw, vh, 0.0, 1.0);
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.set_vertex_buffer(0, vertex_buffer.slice(..));
            pass.draw(0..(vertices.len() / 5) as u32, 0..1);
        }
        self.queue.submit([encoder.finish()]);
        self.stats.draws += 1;
    }

    fn finish(&mut self) {
        if let Err(e) = self.device.poll(wgpu::PollType::wait_indefinitely()) {
            tracing::warn!(error = ?e, "wgpu poll failed");
        }
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
                .and_then(|t| self.textures.get(&t))
                .and_then(Option::as_ref),
            None => self.surface.as_ref(),
        };
        let Some(source) = source else {
            return Err(LayercastError::capture("read from a target without storage"));
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

        let row_bytes = size.width * 4;
        let padded = align_to(row_bytes, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("layercast_readback"),
            size: u64::from(padded) * u64::from(size.height),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("layercast_readback_encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &source.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(size.height),
                },
            },
            wgpu::Extent3d {
                width: size.width,
                height: size.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit([encoder.finish()]);

        let slice = readback.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| LayercastError::capture(format!("wgpu poll failed: {e:?}")))?;
        rx.recv()
            .map_err(|_| LayercastError::capture("readback channel closed"))?
            .map_err(|e| LayercastError::capture(format!("readback map failed: {e:?}")))?;

        {
            let mapped = slice.get_mapped_range();
            for (y, row) in out.chunks_exact_mut(row_bytes as usize).enumerate() {
                let start = y * padded as usize;
                row.copy_from_slice(&mapped[start..start + row_bytes as usize]);
            }
        }
        readback.unmap();
        self.stats.readbacks += 1;
        Ok(())
    }

    fn discard_drawable(&mut self) {
        let Some(size) = self.surface.as_ref().map(|t| t.size) else {
            return;
        };
        self.surface = Some(create_texture(&self.device, size, "layercast_drawable"));
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
