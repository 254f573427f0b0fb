//! Per-frame orchestration: two offscreen passes, optional capture, then the blit.
//!
//! Target 0 receives the opaque pass (layers flagged `opaque_pass`), target 1 the blended pass
//! over every layer. Target 1 is what the surface shows, what the recorder reads and what
//! screenshots capture.

use std::path::{Path, PathBuf};

use image::RgbaImage;

use crate::assets::store::AssetStore;
use crate::capture::snapshot::SnapshotService;
use crate::capture::timestamped_path;
use crate::config::{HostConfig, LayerSpec};
use crate::encode::recorder::{CaptureOutcome, RecorderState, RecordingCompletion, VideoRecorder};
use crate::foundation::core::{Rect, Rgba8Premul, SurfaceSize, Visibility};
use crate::foundation::error::{LayercastError, LayercastResult, RecordingError};
use crate::render::command::Action;
use crate::render::compositor::{CompositorState, MultiTargetCompositor};
use crate::render::device::{BlendFunc, GpuDevice};
use crate::render::layer::TextureLayer;
use crate::render::registry::ViewRegistry;

const OPAQUE_TARGET: usize = 0;
const BLENDED_TARGET: usize = 1;

/// What [`Renderer::draw_frame`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// No sized targets yet; nothing was drawn.
    Skipped,
    /// Both passes ran and target 1 was shown.
    Drawn {
        /// What the recorder did with the frame.
        capture: CaptureOutcome,
    },
}

/// Result of [`Renderer::apply`].
#[derive(Debug)]
pub enum ActionOutcome {
    /// Layer state changed.
    Applied,
    /// A recording started writing to `output`.
    RecordingStarted {
        /// Video file being written.
        output: PathBuf,
    },
    /// The recording is draining; the completion resolves once the file is finalized.
    RecordingStopping(RecordingCompletion),
    /// A screenshot attempt finished.
    Snapshot {
        /// Captured image, `None` when the capture failed.
        image: Option<RgbaImage>,
        /// Where the image was saved, if it was.
        path: Option<PathBuf>,
    },
}

#[derive(Clone, Debug, PartialEq)]
struct SnapshotBinding {
    layer: usize,
    view: String,
    rect: Rect,
}

/// Owns the device, the layer stack, the compositor, the recorder and the screenshot service.
#[derive(Debug)]
pub struct Renderer<D: GpuDevice> {
    device: D,
    specs: Vec<LayerSpec>,
    layers: Vec<TextureLayer>,
    compositor: MultiTargetCompositor,
    clear_color: Rgba8Premul,
    recorder: VideoRecorder,
    snapshots: SnapshotService,
    assets: AssetStore,
    output_dir: PathBuf,
    speed: f64,
    size: SurfaceSize,
    bindings: Vec<SnapshotBinding>,
    frames_drawn: u64,
}

impl<D: GpuDevice> Renderer<D> {
    /// Build the layer stack from `config`. No device work happens until
    /// [`Renderer::on_create`].
    pub fn new(device: D, config: &HostConfig, recorder: VideoRecorder) -> LayercastResult<Self> {
        config.validate()?;
        let specs = config.renderer.layers.clone();
        let layers = specs.iter().map(|s| TextureLayer::new(s.kind)).collect();
        Ok(Self {
            device,
            specs,
            layers,
            compositor: MultiTargetCompositor::new(config.renderer.targets)?,
            clear_color: config.renderer.clear_color,
            recorder,
            snapshots: SnapshotService::new(&config.output_dir, config.persist_snapshots),
            assets: AssetStore::new(&config.asset_root),
            output_dir: config.output_dir.clone(),
            speed: config.recorder.speed,
            size: SurfaceSize::default(),
            bindings: Vec::new(),
            frames_drawn: 0,
        })
    }

    /// Replace the screenshot service, e.g. to attach a media library.
    pub fn with_snapshot_service(mut self, snapshots: SnapshotService) -> Self {
        self.snapshots = snapshots;
        self
    }

    /// Create every device resource for a surface of `surface` pixels.
    #[tracing::instrument(skip(self))]
    pub fn on_create(&mut self, surface: SurfaceSize) -> LayercastResult<()> {
        self.device.make_current()?;
        self.compositor.on_create(&mut self.device, surface)?;
        for layer in &mut self.layers {
            layer.create_gpu_resources(&mut self.device)?;
        }
        self.on_resize(surface)
    }

    /// Follow a surface resize. Zero sizes are ignored.
    #[tracing::instrument(skip(self))]
    pub fn on_resize(&mut self, surface: SurfaceSize) -> LayercastResult<()> {
        if !surface.is_drawable() {
            tracing::debug!("surface resize ignored: no pixels");
            return Ok(());
        }
        self.device.make_current()?;
        self.device.resize_surface(surface);
        self.device.set_viewport(surface);
        self.compositor.on_resize(&mut self.device, surface)?;
        for layer in &mut self.layers {
            layer.on_surface_resize(&mut self.device, surface);
        }
        self.size = surface;
        if let Err(e) = self.recorder.configure_size(surface) {
            tracing::warn!(error = %e, "recording keeps its size until it stops");
        }
        Ok(())
    }

    /// Run one frame.
    pub fn draw_frame(&mut self) -> LayercastResult<FrameOutcome> {
        if self.compositor.state() != CompositorState::Sized {
            return Ok(FrameOutcome::Skipped);
        }
        self.device.make_current()?;

        self.compositor.bind_target(&mut self.device, OPAQUE_TARGET);
        self.device.set_viewport(self.size);
        self.device.clear(self.clear_color);
        for (layer, spec) in self.layers.iter().zip(&self.specs) {
            if spec.opaque_pass {
                layer.draw(&mut self.device);
            }
        }
        self.compositor.unbind_target(&mut self.device);

        self.compositor.bind_target(&mut self.device, BLENDED_TARGET);
        self.device.clear(self.clear_color);
        self.device.set_blend(Some(BlendFunc::ALPHA));
        for layer in &self.layers {
            layer.draw(&mut self.device);
        }
        self.device.set_blend(None);
        self.compositor.unbind_target(&mut self.device);

        // A resized target is read from its bottom-left corner at the recording's size.
        let framebuffer = self.compositor.framebuffer(BLENDED_TARGET);
        let size = self.recorder.session_size().unwrap_or(self.size);
        let device = &mut self.device;
        let capture = self
            .recorder
            .capture_frame(|buf| device.read_pixels(framebuffer, size, buf));

        self.device.discard_drawable();
        self.compositor.blit(&mut self.device, BLENDED_TARGET);
        for layer in &mut self.layers {
            layer.mark_drawn();
        }
        self.frames_drawn += 1;
        Ok(FrameOutcome::Drawn { capture })
    }

    /// Apply one command on the render thread.
    #[tracing::instrument(skip(self, registry))]
    pub fn apply(
        &mut self,
        action: Action,
        registry: &ViewRegistry,
    ) -> LayercastResult<ActionOutcome> {
        match action {
            Action::LoadStaticTexture { layer, name } => {
                self.check_layer(layer)?;
                let bitmap = self.assets.load(&name)?;
                self.bindings.retain(|b| b.layer != layer);
                self.layers[layer].upload_bitmap(
                    &mut self.device,
                    &bitmap,
                    false,
                    Visibility::Visible,
                )?;
                Ok(ActionOutcome::Applied)
            }
            Action::LoadSnapshotTexture { view, rect, layer } => {
                self.check_layer(layer)?;
                let binding = SnapshotBinding { layer, view, rect };
                self.refresh_binding(&binding, registry)?;
                self.bindings.retain(|b| b.layer != layer);
                self.bindings.push(binding);
                Ok(ActionOutcome::Applied)
            }
            Action::UpdateLayerRegion { layer, region } => {
                self.check_layer(layer)?;
                self.layers[layer].set_region(&mut self.device, region)?;
                Ok(ActionOutcome::Applied)
            }
            Action::SetLayerVisibility { layer, visibility } => {
                self.check_layer(layer)?;
                self.layers[layer].set_visibility(visibility);
                Ok(ActionOutcome::Applied)
            }
            Action::StartRecording => {
                if self.size.is_drawable() && self.recorder.state() == RecorderState::Idle {
                    self.recorder.configure_size(self.size)?;
                }
                let output = timestamped_path(&self.output_dir, "video", "mp4");
                self.recorder.start(&output, self.speed)?;
                Ok(ActionOutcome::RecordingStarted { output })
            }
            Action::StopRecording => {
                if !self.recorder.is_recording() {
                    return Err(RecordingError::NotRecording.into());
                }
                Ok(ActionOutcome::RecordingStopping(self.recorder.stop()))
            }
            Action::TakeScreenshot => {
                let mut result = (None, None);
                self.snapshots.take(
                    &mut self.device,
                    self.compositor.framebuffer(BLENDED_TARGET),
                    self.size,
                    |image, path| result = (image, path),
                );
                let (image, path) = result;
                Ok(ActionOutcome::Snapshot { image, path })
            }
        }
    }

    /// Re-snapshot every layer bound to a view. Bindings whose view is gone are dropped.
    ///
    /// Returns how many layers were updated.
    pub fn refresh_snapshot_layers(&mut self, registry: &ViewRegistry) -> usize {
        let mut refreshed = 0;
        for binding in std::mem::take(&mut self.bindings) {
            match self.refresh_binding(&binding, registry) {
                Ok(()) => {
                    refreshed += 1;
                    self.bindings.push(binding);
                }
                Err(e) if registry.find(&binding.view).is_none() => {
                    tracing::warn!(
                        view = %binding.view,
                        error = %e,
                        "snapshot source gone, unbinding layer"
                    );
                }
                Err(e) => {
                    tracing::debug!(view = %binding.view, error = %e, "snapshot refresh skipped");
                    self.bindings.push(binding);
                }
            }
        }
        refreshed
    }

    fn refresh_binding(
        &mut self,
        binding: &SnapshotBinding,
        registry: &ViewRegistry,
    ) -> LayercastResult<()> {
        let source = registry.find(&binding.view).ok_or_else(|| {
            LayercastError::capture(format!("no snapshot source registered as '{}'", binding.view))
        })?;
        let bitmap = source.snapshot(binding.rect).ok_or_else(|| {
            LayercastError::capture(format!("snapshot source '{}' returned nothing", binding.view))
        })?;
        self.layers[binding.layer].upload_bitmap(
            &mut self.device,
            &bitmap,
            false,
            Visibility::Visible,
        )
    }

    fn check_layer(&self, layer: usize) -> LayercastResult<()> {
        if layer < self.layers.len() {
            return Ok(());
        }
        Err(LayercastError::config(format!(
            "layer index {layer} out of range ({} layers)",
            self.layers.len()
        )))
    }

    /// Whether any layer is fed from a snapshot source.
    pub fn has_snapshot_layers(&self) -> bool {
        !self.bindings.is_empty()
    }

    /// Whether any layer changed since the last frame.
    pub fn needs_redraw(&self) -> bool {
        self.layers.iter().any(TextureLayer::needs_redraw)
    }

    /// The device.
    pub fn device(&self) -> &D {
        &self.device
    }

    /// The device, mutably.
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Layer stack, bottom first.
    pub fn layers(&self) -> &[TextureLayer] {
        &self.layers
    }

    /// The compositor.
    pub fn compositor(&self) -> &MultiTargetCompositor {
        &self.compositor
    }

    /// The recorder.
    pub fn recorder(&self) -> &VideoRecorder {
        &self.recorder
    }

    /// The recorder, mutably.
    pub fn recorder_mut(&mut self) -> &mut VideoRecorder {
        &mut self.recorder
    }

    /// The screenshot service.
    pub fn snapshots(&self) -> &SnapshotService {
        &self.snapshots
    }

    /// Named bitmaps available to [`Action::LoadStaticTexture`].
    pub fn assets(&self) -> &AssetStore {
        &self.assets
    }

    /// Directory videos and screenshots are written to.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Current surface size.
    pub fn size(&self) -> SurfaceSize {
        self.size
    }

    /// Frames drawn so far.
    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    /// Stop recording, then delete every device handle. Idempotent.
    #[tracing::instrument(skip(self))]
    pub fn release(&mut self) {
        self.recorder.release();
        for layer in &mut self.layers {
            layer.release(&mut self.device);
        }
        self.compositor.release(&mut self.device);
        self.bindings.clear();
    }
}

impl<D: GpuDevice> Drop for Renderer<D> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/renderer.rs"]
mod tests;
