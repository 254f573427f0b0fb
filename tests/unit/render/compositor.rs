use super::*;
use crate::assets::bitmap::Bitmap;
use crate::foundation::core::{Rgba8Premul, Visibility};
use crate::render::cpu::CpuDevice;
use crate::render::layer::{LayerKind, TextureLayer};
use crate::transform::region::CoordinateRegion;

fn device() -> CpuDevice {
    let mut dev = CpuDevice::new();
    dev.make_current().unwrap();
    dev
}

#[test]
fn fewer_than_two_targets_is_rejected() {
    assert!(MultiTargetCompositor::new(1).unwrap_err().is_config());
    assert_eq!(MultiTargetCompositor::new(3).unwrap().target_count(), 3);
}

#[test]
fn zero_size_resize_issues_no_device_calls() {
    let mut dev = device();
    let mut comp = MultiTargetCompositor::new(2).unwrap();
    comp.on_create(&mut dev, SurfaceSize::new(0, 0)).unwrap();
    assert_eq!(comp.state(), CompositorState::Created);
    assert_eq!(dev.stats().storage_allocations, 0);

    let before = dev.stats();
    comp.on_resize(&mut dev, SurfaceSize::new(0, 0)).unwrap();
    comp.on_resize(&mut dev, SurfaceSize::from_signed(-3, 10)).unwrap();
    assert_eq!(dev.stats(), before);
    assert_eq!(comp.resize_count(), 0);

    comp.on_resize(&mut dev, SurfaceSize::new(640, 480)).unwrap();
    assert_eq!(dev.stats().storage_allocations, 2);
    assert_eq!(comp.resize_count(), 1);
    assert_eq!(comp.state(), CompositorState::Sized);
    for i in 0..2 {
        let tex = comp.texture(i).unwrap();
        assert_eq!(dev.texture_size(tex), Some(SurfaceSize::new(640, 480)));
    }

    comp.on_resize(&mut dev, SurfaceSize::new(640, 480)).unwrap();
    assert_eq!(dev.stats().storage_allocations, 2);
    assert_eq!(comp.resize_count(), 1);
}

#[test]
fn resize_keeps_framebuffer_identity() {
    let mut dev = device();
    let mut comp = MultiTargetCompositor::new(2).unwrap();
    comp.on_create(&mut dev, SurfaceSize::new(4, 4)).unwrap();
    let fb0 = comp.framebuffer(0);
    comp.on_resize(&mut dev, SurfaceSize::new(8, 2)).unwrap();
    assert_eq!(comp.framebuffer(0), fb0);
    assert_eq!(comp.size(), SurfaceSize::new(8, 2));
    assert_eq!(comp.resize_count(), 2);
    assert!(comp.matrix().approx_eq(&Matrix4::identity(), 0.0));
}

#[test]
fn incomplete_target_is_a_config_error() {
    let mut dev = device();
    dev.fail_attachments(true);
    let mut comp = MultiTargetCompositor::new(2).unwrap();
    let err = comp.on_create(&mut dev, SurfaceSize::new(4, 4)).unwrap_err();
    assert!(err.is_config());
    assert!(err.to_string().contains("incomplete"));
    assert_eq!(comp.state(), CompositorState::Created);
}

#[test]
fn blit_shows_the_target_upright() {
    let size = SurfaceSize::new(4, 4);
    let mut dev = device();
    dev.resize_surface(size);
    let mut comp = MultiTargetCompositor::new(2).unwrap();
    comp.on_create(&mut dev, size).unwrap();

    let red = Rgba8Premul::from_straight_rgba(255, 0, 0, 255);
    let mut layer = TextureLayer::new(LayerKind::Stretch);
    layer.create_gpu_resources(&mut dev).unwrap();
    layer.on_surface_resize(&mut dev, size);
    layer
        .upload_bitmap(&mut dev, &Bitmap::solid(1, 1, red), true, Visibility::Visible)
        .unwrap();
    layer
        .set_region(&mut dev, CoordinateRegion::from_rect(0.0, 0.0, 4.0, 2.0).unwrap())
        .unwrap();

    comp.bind_target(&mut dev, 1);
    dev.clear(Rgba8Premul::transparent());
    layer.draw(&mut dev);
    comp.unbind_target(&mut dev);
    comp.blit(&mut dev, 1);
    assert!(dev.bindings_clean());

    let rows: Vec<&[u8]> = dev.surface_pixels().chunks_exact(16).collect();
    assert!(rows[3].chunks_exact(4).all(|px| px == red.to_array()));
    assert!(rows[2].chunks_exact(4).all(|px| px == red.to_array()));
    assert!(rows[0].iter().all(|&b| b == 0));
}

#[test]
#[should_panic(expected = "out of range")]
fn blit_past_the_last_target_panics() {
    let mut dev = device();
    let mut comp = MultiTargetCompositor::new(2).unwrap();
    comp.on_create(&mut dev, SurfaceSize::new(4, 4)).unwrap();
    comp.blit(&mut dev, 2);
}

#[test]
fn release_frees_everything_once() {
    let mut dev = device();
    let mut comp = MultiTargetCompositor::new(3).unwrap();
    comp.on_create(&mut dev, SurfaceSize::new(4, 4)).unwrap();
    assert_eq!(dev.stats().live_framebuffers, 3);
    comp.release(&mut dev);
    comp.release(&mut dev);
    assert_eq!(dev.stats().live_handles(), 0);
    assert_eq!(comp.state(), CompositorState::Uninitialized);
    assert!(comp.framebuffer(0).is_none());
}
