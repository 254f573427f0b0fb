//! The textured quad shared by layers and the compositor blit: one program,
//! one position buffer, one UV buffer.

use crate::foundation::error::{LayercastError, LayercastResult};
use crate::render::device::{BufferId, GpuDevice, ProgramId, TextureId, Topology};
use crate::render::shaders::{
    ATTRIB_POSITION, ATTRIB_TEX_COORD, ShaderSource, UNIFORM_MATRIX, UNIFORM_TEXTURE, named,
};
use crate::transform::matrix::Matrix4;

/// Full-viewport quad in fan order: left-top, left-bottom, right-bottom, right-top.
pub const UNIT_QUAD: [f32; 12] = [
    -1.0, 1.0, 0.0, //
    -1.0, -1.0, 0.0, //
    1.0, -1.0, 0.0, //
    1.0, 1.0, 0.0,
];

/// UVs placing a top-row-first bitmap upright on [`UNIT_QUAD`].
pub const LAYER_UVS: [f32; 8] = [0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 0.0];

/// UVs placing a bottom-row-first render target upright on [`UNIT_QUAD`].
pub const TARGET_UVS: [f32; 8] = [0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 1.0];

const TEXTURE_UNIT: u32 = 0;

const VERTEX_SOURCE: &str = "base_vert";
const FRAGMENT_SOURCE: &str = "base_frag";

fn library_source(name: &str) -> LayercastResult<ShaderSource<'static>> {
    named(name).ok_or_else(|| LayercastError::config(format!("no shader source named '{name}'")))
}

#[derive(Debug)]
pub(crate) struct QuadProgram {
    program: Option<ProgramId>,
    position_buffer: Option<BufferId>,
    uv_buffer: Option<BufferId>,
    position_loc: u32,
    uv_loc: u32,
    matrix_loc: u32,
    texture_loc: u32,
}

impl QuadProgram {
    pub(crate) fn create<D: GpuDevice>(device: &mut D, uvs: &[f32; 8]) -> LayercastResult<Self> {
        let vertex = library_source(VERTEX_SOURCE)?;
        let fragment = library_source(FRAGMENT_SOURCE)?;
        let program = device.create_program(&vertex, &fragment)?;
        let lookup = |kind: &str, name: &str, loc: Option<u32>| {
            loc.ok_or_else(|| {
                tracing::error!(kind, name, "linked program is missing a location");
                LayercastError::config(format!("linked program has no {kind} '{name}'"))
            })
        };
        let located = (|| {
            Ok::<_, LayercastError>((
                lookup("attribute", ATTRIB_POSITION, device.attrib_location(program, ATTRIB_POSITION))?,
                lookup("attribute", ATTRIB_TEX_COORD, device.attrib_location(program, ATTRIB_TEX_COORD))?,
                lookup("uniform", UNIFORM_MATRIX, device.uniform_location(program, UNIFORM_MATRIX))?,
                lookup("uniform", UNIFORM_TEXTURE, device.uniform_location(program, UNIFORM_TEXTURE))?,
            ))
        })();
        let (position_loc, uv_loc, matrix_loc, texture_loc) = match located {
            Ok(locs) => locs,
            Err(e) => {
                device.delete_program(program);
                return Err(e);
            }
        };

        Ok(Self {
            program: Some(program),
            position_buffer: Some(device.create_buffer(&UNIT_QUAD)),
            uv_buffer: Some(device.create_buffer(uvs)),
            position_loc,
            uv_loc,
            matrix_loc,
            texture_loc,
        })
    }

    pub(crate) fn set_positions<D: GpuDevice>(&self, device: &mut D, positions: &[f32; 12]) {
        if let Some(buf) = self.position_buffer {
            device.update_buffer(buf, positions);
        }
    }

    /// Bind, draw four vertices as a fan, then unbind everything bound here.
    pub(crate) fn draw<D: GpuDevice>(&self, device: &mut D, matrix: &Matrix4, texture: TextureId) {
        let Some(program) = self.program else {
            return;
        };
        device.use_program(Some(program));
        device.set_uniform_matrix(self.matrix_loc, matrix);
        device.bind_attrib_buffer(self.position_loc, self.position_buffer, 3);
        device.bind_attrib_buffer(self.uv_loc, self.uv_buffer, 2);
        device.bind_texture(TEXTURE_UNIT, Some(texture));
        device.set_uniform_sampler(self.texture_loc, TEXTURE_UNIT);

        device.draw_arrays(Topology::TriangleFan, 0, 4);

        device.bind_texture(TEXTURE_UNIT, None);
        device.bind_attrib_buffer(self.uv_loc, None, 2);
        device.bind_attrib_buffer(self.position_loc, None, 3);
        device.use_program(None);
    }

    pub(crate) fn release<D: GpuDevice>(&mut self, device: &mut D) {
        if let Some(b) = self.position_buffer.take() {
            device.delete_buffer(b);
        }
        if let Some(b) = self.uv_buffer.take() {
            device.delete_buffer(b);
        }
        if let Some(p) = self.program.take() {
            device.delete_program(p);
        }
    }
}
