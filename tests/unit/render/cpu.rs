use super::*;
use crate::render::shaders::{
    BASE_FRAG, BASE_VERT, MATRIX_LOCATION, POSITION_LOCATION, TEX_COORD_LOCATION,
    TEXTURE_LOCATION,
};

const QUAD: [f32; 12] = [
    -1.0, 1.0, 0.0, //
    -1.0, -1.0, 0.0, //
    1.0, -1.0, 0.0, //
    1.0, 1.0, 0.0,
];
const UV: [f32; 8] = [0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 0.0];

struct Fixture {
    dev: CpuDevice,
    program: ProgramId,
    pos: BufferId,
    uv: BufferId,
    fb: FramebufferId,
    target: TextureId,
}

fn fixture(w: u32, h: u32) -> Fixture {
    let mut dev = CpuDevice::new();
    dev.make_current().unwrap();
    let program = dev.create_program(&BASE_VERT, &BASE_FRAG).unwrap();
    let pos = dev.create_buffer(&QUAD);
    let uv = dev.create_buffer(&UV);
    let fb = dev.create_framebuffer();
    let target = dev.create_texture();
    dev.allocate_texture_storage(target, SurfaceSize::new(w, h));
    assert_eq!(dev.attach_color(fb, target), FramebufferStatus::Complete);
    dev.set_viewport(SurfaceSize::new(w, h));
    Fixture {
        dev,
        program,
        pos,
        uv,
        fb,
        target,
    }
}

fn draw_textured(f: &mut Fixture, texture: TextureId, blend: Option<BlendFunc>) {
    let d = &mut f.dev;
    d.bind_framebuffer(Some(f.fb));
    d.set_blend(blend);
    d.use_program(Some(f.program));
    d.set_uniform_matrix(MATRIX_LOCATION, &Matrix4::identity());
    d.bind_attrib_buffer(POSITION_LOCATION, Some(f.pos), 3);
    d.bind_attrib_buffer(TEX_COORD_LOCATION, Some(f.uv), 2);
    d.bind_texture(0, Some(texture));
    d.set_uniform_sampler(TEXTURE_LOCATION, 0);
    d.draw_arrays(Topology::TriangleFan, 0, 4);
    d.bind_texture(0, None);
    d.bind_attrib_buffer(POSITION_LOCATION, None, 3);
    d.bind_attrib_buffer(TEX_COORD_LOCATION, None, 2);
    d.use_program(None);
    d.set_blend(None);
    d.bind_framebuffer(None);
}

fn read(f: &mut Fixture, w: u32, h: u32) -> Vec<u8> {
    let mut out = vec![0; SurfaceSize::new(w, h).rgba_len()];
    f.dev
        .read_pixels(Some(f.fb), SurfaceSize::new(w, h), &mut out)
        .unwrap();
    out
}

#[test]
fn textured_quad_lands_upright_in_bottom_first_storage() {
    let mut f = fixture(4, 4);
    let tex = f.dev.create_texture();
    let red = [255, 0, 0, 255];
    let blue = [0, 0, 255, 255];
    let pixels: Vec<u8> = [red, red, blue, blue].concat();
    f.dev
        .upload_texture(tex, SurfaceSize::new(2, 2), &pixels)
        .unwrap();

    draw_textured(&mut f, tex, None);
    assert!(f.dev.bindings_clean());

    let out = read(&mut f, 4, 4);
    let row = |y: usize| &out[y * 16..y * 16 + 16];
    assert!(row(3).chunks_exact(4).all(|px| px == red));
    assert!(row(0).chunks_exact(4).all(|px| px == blue));
    assert_eq!(f.dev.stats().draws, 1);
}

#[test]
fn alpha_blend_covers_each_pixel_once() {
    let mut f = fixture(8, 6);
    f.dev.bind_framebuffer(Some(f.fb));
    f.dev.clear(Rgba8Premul {
        r: 0,
        g: 0,
        b: 200,
        a: 255,
    });
    f.dev.bind_framebuffer(None);

    let tex = f.dev.create_texture();
    f.dev
        .upload_texture(tex, SurfaceSize::new(1, 1), &[100, 0, 0, 128])
        .unwrap();
    draw_textured(&mut f, tex, Some(BlendFunc::ALPHA));

    let out = read(&mut f, 8, 6);
    assert!(
        out.chunks_exact(4).all(|px| px == [50, 0, 100, 191]),
        "{out:?}"
    );
}

#[test]
fn draw_without_program_is_skipped() {
    let mut f = fixture(2, 2);
    f.dev.bind_framebuffer(Some(f.fb));
    f.dev.draw_arrays(Topology::TriangleFan, 0, 4);
    f.dev.bind_framebuffer(None);
    let st = f.dev.stats();
    assert_eq!(st.draws, 0);
    assert_eq!(st.skipped_draws, 1);
}

#[test]
fn attach_reports_missing_storage() {
    let mut dev = CpuDevice::new();
    let fb = dev.create_framebuffer();
    let tex = dev.create_texture();
    assert_eq!(
        dev.attach_color(fb, tex),
        FramebufferStatus::IncompleteAttachment
    );
    dev.allocate_texture_storage(tex, SurfaceSize::new(3, 3));
    assert_eq!(dev.attach_color(fb, tex), FramebufferStatus::Complete);
    dev.fail_attachments(true);
    assert_eq!(dev.attach_color(fb, tex), FramebufferStatus::Unsupported);
}

#[test]
fn readback_validates_size() {
    let mut f = fixture(4, 4);
    let mut small = vec![0; 8];
    assert!(
        f.dev
            .read_pixels(Some(f.fb), SurfaceSize::new(4, 4), &mut small)
            .is_err()
    );
    let mut big = vec![0; SurfaceSize::new(5, 4).rgba_len()];
    assert!(
        f.dev
            .read_pixels(Some(f.fb), SurfaceSize::new(5, 4), &mut big)
            .is_err()
    );
    let mut none = Vec::new();
    assert!(
        f.dev
            .read_pixels(None, SurfaceSize::new(0, 0), &mut none)
            .is_err()
    );
}

#[test]
fn deletes_are_idempotent() {
    let mut f = fixture(2, 2);
    let before = f.dev.stats().live_handles();
    f.dev.delete_texture(f.target);
    f.dev.delete_texture(f.target);
    f.dev.delete_framebuffer(f.fb);
    f.dev.delete_framebuffer(f.fb);
    f.dev.delete_buffer(f.pos);
    f.dev.delete_buffer(f.pos);
    f.dev.delete_program(f.program);
    f.dev.delete_program(f.program);
    assert_eq!(f.dev.stats().live_handles(), before - 4);
}

#[test]
fn surface_discard_and_resize() {
    let mut dev = CpuDevice::new();
    dev.resize_surface(SurfaceSize::new(3, 2));
    dev.set_viewport(SurfaceSize::new(3, 2));
    dev.clear(Rgba8Premul {
        r: 9,
        g: 9,
        b: 9,
        a: 255,
    });
    assert!(dev.surface_pixels().iter().all(|b| *b == 9 || *b == 255));
    dev.discard_drawable();
    assert!(dev.surface_pixels().iter().all(|b| *b == 0));
    assert_eq!(dev.surface_size(), SurfaceSize::new(3, 2));
    assert_eq!(dev.stats().discarded_drawables, 1);
}
