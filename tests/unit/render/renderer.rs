use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::assets::bitmap::Bitmap;
use crate::config::{RecorderConfig, RendererConfig};
use crate::encode::clock::ManualClock;
use crate::encode::memory::MemoryBackend;
use crate::render::cpu::CpuDevice;
use crate::render::layer::LayerKind;
use crate::render::registry::SnapshotSource;
use crate::transform::region::CoordinateRegion;

const RED: [u8; 4] = [255, 0, 0, 255];
const GREEN: [u8; 4] = [0, 255, 0, 255];

struct Fixture {
    renderer: Renderer<CpuDevice>,
    backend: MemoryBackend,
    clock: ManualClock,
    registry: ViewRegistry,
}

fn fixture(tag: &str) -> Fixture {
    let root = std::env::temp_dir().join(format!("layercast_renderer_{tag}_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&root);
    let config = HostConfig {
        renderer: RendererConfig {
            layers: vec![
                LayerSpec::default(),
                LayerSpec::default(),
                LayerSpec {
                    kind: LayerKind::Stretch,
                    opaque_pass: false,
                },
            ],
            ..RendererConfig::default()
        },
        recorder: RecorderConfig {
            poll_interval_ms: 2,
            ready_wait_ms: 50,
            drain_deadline_ms: 500,
            ..RecorderConfig::default()
        },
        output_dir: root.join("out"),
        asset_root: root.join("assets"),
        ..HostConfig::default()
    };
    let backend = MemoryBackend::new();
    let clock = ManualClock::new();
    let recorder = VideoRecorder::new(
        config.recorder.clone(),
        Arc::new(backend.clone()),
        Arc::new(clock.clone()),
    )
    .unwrap();
    let renderer = Renderer::new(CpuDevice::new(), &config, recorder).unwrap();
    Fixture {
        renderer,
        backend,
        clock,
        registry: ViewRegistry::new(),
    }
}

fn solid(rgba: [u8; 4]) -> Bitmap {
    Bitmap::solid(2, 2, Rgba8Premul::from_straight_rgba(rgba[0], rgba[1], rgba[2], rgba[3]))
}

fn surface_px(device: &CpuDevice, x: usize, y: usize) -> [u8; 4] {
    let w = device.surface_size().width as usize;
    let i = (y * w + x) * 4;
    device.surface_pixels()[i..i + 4].try_into().unwrap()
}

/// Red everywhere in both passes, green over the left half in the blended pass only.
fn load_scene(f: &mut Fixture) {
    let assets = f.renderer.assets();
    assets.insert("red", solid(RED)).unwrap();
    assets.insert("green", solid(GREEN)).unwrap();
    f.renderer
        .apply(
            Action::LoadStaticTexture {
                layer: 0,
                name: "red".into(),
            },
            &f.registry,
        )
        .unwrap();
    f.renderer
        .apply(
            Action::LoadStaticTexture {
                layer: 2,
                name: "green".into(),
            },
            &f.registry,
        )
        .unwrap();
    f.renderer
        .apply(
            Action::UpdateLayerRegion {
                layer: 2,
                region: CoordinateRegion::from_rect(0.0, 0.0, 2.0, 4.0).unwrap(),
            },
            &f.registry,
        )
        .unwrap();
}

struct SolidSource([u8; 4]);

impl SnapshotSource for SolidSource {
    fn snapshot(&self, rect: Rect) -> Option<Bitmap> {
        let [r, g, b, a] = self.0;
        Some(Bitmap::solid(
            rect.width() as u32,
            rect.height() as u32,
            Rgba8Premul::from_straight_rgba(r, g, b, a),
        ))
    }
}

#[test]
fn frames_are_skipped_until_the_surface_has_pixels() {
    let mut f = fixture("skip");
    f.renderer.on_create(SurfaceSize::new(0, 0)).unwrap();
    assert_eq!(f.renderer.draw_frame().unwrap(), FrameOutcome::Skipped);
    assert_eq!(f.renderer.compositor().resize_count(), 0);

    f.renderer.on_resize(SurfaceSize::new(4, 4)).unwrap();
    assert!(matches!(
        f.renderer.draw_frame().unwrap(),
        FrameOutcome::Drawn {
            capture: CaptureOutcome::Inactive
        }
    ));
    assert_eq!(f.renderer.compositor().resize_count(), 1);
    assert_eq!(f.renderer.frames_drawn(), 1);
}

#[test]
fn opaque_pass_skips_excluded_layers() {
    let mut f = fixture("passes");
    f.renderer.on_create(SurfaceSize::new(4, 4)).unwrap();
    load_scene(&mut f);
    assert!(f.renderer.needs_redraw());
    f.renderer.draw_frame().unwrap();
    assert!(!f.renderer.needs_redraw());

    let device = f.renderer.device();
    assert!(device.bindings_clean());
    for y in 0..4 {
        assert_eq!(surface_px(device, 0, y), GREEN);
        assert_eq!(surface_px(device, 3, y), RED);
    }

    let fb0 = f.renderer.compositor().framebuffer(0);
    let mut opaque = vec![0u8; SurfaceSize::new(4, 4).rgba_len()];
    f.renderer
        .device_mut()
        .read_pixels(fb0, SurfaceSize::new(4, 4), &mut opaque)
        .unwrap();
    assert!(opaque.chunks_exact(4).all(|px| px == RED));
}

#[test]
fn bad_layer_index_is_a_config_error() {
    let mut f = fixture("badlayer");
    f.renderer.on_create(SurfaceSize::new(4, 4)).unwrap();
    let err = f
        .renderer
        .apply(
            Action::SetLayerVisibility {
                layer: 9,
                visibility: Visibility::Visible,
            },
            &f.registry,
        )
        .unwrap_err();
    assert!(err.is_config());
    assert!(err.to_string().contains("9"));
}

#[test]
fn recording_captures_the_blended_target() {
    let mut f = fixture("record");
    f.renderer.on_create(SurfaceSize::new(4, 4)).unwrap();
    load_scene(&mut f);

    let ActionOutcome::RecordingStarted { output } =
        f.renderer.apply(Action::StartRecording, &f.registry).unwrap()
    else {
        panic!("recording did not start");
    };
    let name = output.file_name().unwrap().to_str().unwrap().to_owned();
    assert!(name.starts_with("video_") && name.ends_with(".mp4"), "{name}");
    assert!(output.starts_with(f.renderer.output_dir()));

    for _ in 0..5 {
        let outcome = f.renderer.draw_frame().unwrap();
        assert!(matches!(
            outcome,
            FrameOutcome::Drawn {
                capture: CaptureOutcome::Enqueued { .. }
            }
        ));
        f.clock.advance(Duration::from_millis(40));
    }

    let ActionOutcome::RecordingStopping(completion) =
        f.renderer.apply(Action::StopRecording, &f.registry).unwrap()
    else {
        panic!("recording did not stop");
    };
    let outcome = completion.wait().unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.output, output);
    assert_eq!(outcome.frames_appended, 5);

    // BGRA, top row first: green on the left, red on the right.
    let frame = f.backend.last_recording().unwrap().last_frame.unwrap();
    assert_eq!(&frame[0..4], &[0, 255, 0, 255]);
    assert_eq!(&frame[12..16], &[0, 0, 255, 255]);

    let err = f
        .renderer
        .apply(Action::StopRecording, &f.registry)
        .unwrap_err();
    assert!(matches!(
        err,
        LayercastError::Recording(RecordingError::NotRecording)
    ));
}

#[test]
fn resizing_mid_recording_keeps_capturing_at_the_session_size() {
    let mut f = fixture("resize_rec");
    f.renderer.on_create(SurfaceSize::new(4, 4)).unwrap();
    load_scene(&mut f);
    f.renderer.apply(Action::StartRecording, &f.registry).unwrap();

    for i in 0..6 {
        if i == 2 {
            f.renderer.on_resize(SurfaceSize::new(8, 8)).unwrap();
        }
        let outcome = f.renderer.draw_frame().unwrap();
        assert!(
            matches!(
                outcome,
                FrameOutcome::Drawn {
                    capture: CaptureOutcome::Enqueued { .. }
                }
            ),
            "frame {i}: {outcome:?}"
        );
        f.clock.advance(Duration::from_millis(40));
    }
    assert_eq!(f.renderer.recorder().stats().read_failures, 0);

    let ActionOutcome::RecordingStopping(completion) =
        f.renderer.apply(Action::StopRecording, &f.registry).unwrap()
    else {
        panic!("recording did not stop");
    };
    assert_eq!(completion.wait().unwrap().frames_appended, 6);
    let first = f.backend.last_recording().unwrap();
    assert_eq!(first.settings.size, SurfaceSize::new(4, 4));
    assert_eq!(first.timestamps.len(), 6);

    // The next session picks up the new surface size.
    f.renderer.apply(Action::StartRecording, &f.registry).unwrap();
    assert_eq!(f.renderer.recorder().session_size(), Some(SurfaceSize::new(8, 8)));
    f.renderer.draw_frame().unwrap();
    let ActionOutcome::RecordingStopping(completion) =
        f.renderer.apply(Action::StopRecording, &f.registry).unwrap()
    else {
        panic!("recording did not stop");
    };
    assert_eq!(completion.wait().unwrap().frames_appended, 1);
    assert_eq!(
        f.backend.last_recording().unwrap().settings.size,
        SurfaceSize::new(8, 8)
    );
}

#[test]
fn screenshot_is_saved_upright() {
    let mut f = fixture("shot");
    f.renderer.on_create(SurfaceSize::new(4, 4)).unwrap();
    load_scene(&mut f);
    f.renderer.draw_frame().unwrap();

    let ActionOutcome::Snapshot { image, path } =
        f.renderer.apply(Action::TakeScreenshot, &f.registry).unwrap()
    else {
        panic!("no snapshot outcome");
    };
    let image = image.unwrap();
    assert_eq!(image.dimensions(), (4, 4));
    assert_eq!(image.get_pixel(0, 0).0, GREEN);
    assert_eq!(image.get_pixel(3, 3).0, RED);
    let path = path.unwrap();
    assert!(path.exists());
    assert_eq!(f.renderer.snapshots().list_snapshots().unwrap(), vec![path]);
}

#[test]
fn snapshot_layers_refresh_until_their_source_goes_away() {
    let mut f = fixture("views");
    f.renderer.on_create(SurfaceSize::new(4, 4)).unwrap();
    let source: Arc<dyn SnapshotSource> = Arc::new(SolidSource(GREEN));
    f.registry.register("panel", &source);

    let missing = f.renderer.apply(
        Action::LoadSnapshotTexture {
            view: "nope".into(),
            rect: Rect::new(0.0, 0.0, 3.0, 2.0),
            layer: 1,
        },
        &f.registry,
    );
    assert!(matches!(missing, Err(LayercastError::Capture(_))));
    assert!(!f.renderer.has_snapshot_layers());

    f.renderer
        .apply(
            Action::LoadSnapshotTexture {
                view: "panel".into(),
                rect: Rect::new(0.0, 0.0, 3.0, 2.0),
                layer: 1,
            },
            &f.registry,
        )
        .unwrap();
    let tex = f.renderer.layers()[1].texture().unwrap();
    assert_eq!((tex.width, tex.height), (3, 2));
    assert_eq!(f.renderer.layers()[1].visibility(), Visibility::Visible);
    assert!(f.renderer.has_snapshot_layers());
    assert_eq!(f.renderer.refresh_snapshot_layers(&f.registry), 1);

    drop(source);
    assert_eq!(f.renderer.refresh_snapshot_layers(&f.registry), 0);
    assert!(!f.renderer.has_snapshot_layers());
}

#[test]
fn release_frees_every_handle_once() {
    let mut f = fixture("release");
    f.renderer.on_create(SurfaceSize::new(4, 4)).unwrap();
    load_scene(&mut f);
    f.renderer.draw_frame().unwrap();
    assert!(f.renderer.device().stats().live_handles() > 0);

    f.renderer.release();
    assert_eq!(f.renderer.device().stats().live_handles(), 0);
    f.renderer.release();
    assert_eq!(f.renderer.compositor().state(), CompositorState::Uninitialized);
}
