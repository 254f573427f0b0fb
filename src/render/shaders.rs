//! Named WGSL sources for the textured-quad program shared by layers and the blit.

/// Pipeline stage a source module is compiled for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderStage {
    /// Vertex stage, entry point `vs_main`.
    Vertex,
    /// Fragment stage, entry point `fs_main`.
    Fragment,
}

impl ShaderStage {
    /// Required entry point name.
    pub fn entry_point(self) -> &'static str {
        match self {
            Self::Vertex => "vs_main",
            Self::Fragment => "fs_main",
        }
    }

    /// Required WGSL stage attribute.
    pub fn attribute(self) -> &'static str {
        match self {
            Self::Vertex => "@vertex",
            Self::Fragment => "@fragment",
        }
    }
}

/// One compilable unit plus the interface it declares.
#[derive(Clone, Copy, Debug)]
pub struct ShaderSource<'a> {
    /// Library name, used in diagnostics.
    pub name: &'a str,
    /// Stage the module is compiled for.
    pub stage: ShaderStage,
    /// WGSL text.
    pub code: &'a str,
    /// Vertex attributes declared by the module: `(name, location)`.
    pub attributes: &'a [(&'a str, u32)],
    /// Uniforms/bindings declared by the module: `(name, location)`.
    pub uniforms: &'a [(&'a str, u32)],
}

/// Location of the quad position attribute (xyz).
pub const ATTRIB_POSITION: &str = "a_position";
/// Location of the quad texture coordinate attribute (uv).
pub const ATTRIB_TEX_COORD: &str = "a_tex_coord";
/// Model/projection matrix uniform.
pub const UNIFORM_MATRIX: &str = "u_matrix";
/// Texture sampler uniform.
pub const UNIFORM_TEXTURE: &str = "u_texture";

/// Vertex-stage location carrying positions.
pub const POSITION_LOCATION: u32 = 0;
/// Vertex-stage location carrying texture coordinates.
pub const TEX_COORD_LOCATION: u32 = 1;
/// Uniform slot of the matrix.
pub const MATRIX_LOCATION: u32 = 0;
/// Uniform slot of the sampler.
pub const TEXTURE_LOCATION: u32 = 1;

const BASE_VERT_WGSL: &str = r#"
struct Uniforms {
    u_matrix: mat4x4<f32>,
};

@group(0) @binding(0) var<uniform> uniforms: Uniforms;

struct VertexOut {
    @builtin(position) position: vec4<f32>,
    @location(0) tex_coord: vec2<f32>,
};

@vertex
fn vs_main(
    @location(0) a_position: vec3<f32>,
    @location(1) a_tex_coord: vec2<f32>,
) -> VertexOut {
    var out: VertexOut;
    let p = uniforms.u_matrix * vec4<f32>(a_position, 1.0);
    // Targets keep their bottom row first; depth arrives in [-w, w].
    out.position = vec4<f32>(p.x, -p.y, (p.z + p.w) * 0.5, p.w);
    out.tex_coord = a_tex_coord;
    return out;
}
"#;

const BASE_FRAG_WGSL: &str = r#"
@group(0) @binding(1) var u_texture: texture_2d<f32>;
@group(0) @binding(2) var u_sampler: sampler;

struct FragmentIn {
    @location(0) tex_coord: vec2<f32>,
};

@fragment
fn fs_main(in: FragmentIn) -> @location(0) vec4<f32> {
    return textureSample(u_texture, u_sampler, in.tex_coord);
}
"#;

/// Vertex stage of the textured-quad program.
pub const BASE_VERT: ShaderSource<'static> = ShaderSource {
    name: "base_vert",
    stage: ShaderStage::Vertex,
    code: BASE_VERT_WGSL,
    attributes: &[
        (ATTRIB_POSITION, POSITION_LOCATION),
        (ATTRIB_TEX_COORD, TEX_COORD_LOCATION),
    ],
    uniforms: &[(UNIFORM_MATRIX, MATRIX_LOCATION)],
};

/// Fragment stage of the textured-quad program.
pub const BASE_FRAG: ShaderSource<'static> = ShaderSource {
    name: "base_frag",
    stage: ShaderStage::Fragment,
    code: BASE_FRAG_WGSL,
    attributes: &[],
    uniforms: &[(UNIFORM_TEXTURE, TEXTURE_LOCATION)],
};

/// Look up a library source by name.
pub fn named(name: &str) -> Option<ShaderSource<'static>> {
    match name {
        "base_vert" => Some(BASE_VERT),
        "base_frag" => Some(BASE_FRAG),
        _ => None,
    }
}
