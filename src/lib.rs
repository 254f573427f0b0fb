//! Layercast composites independent 2D texture layers into offscreen render targets, shows the
//! result on a surface, and can stream the composited frames into a video encoder or capture
//! them as still images.
//!
//! # Frame overview
//!
//! 1. **Opaque pass**: every layer flagged `opaque_pass` is drawn into target 0.
//! 2. **Blended pass**: every layer is drawn into target 1 with `src-alpha, one-minus-src-alpha`.
//! 3. **Capture** (optional): target 1 is read back once and queued for the encode worker.
//! 4. **Blit**: target 1 is drawn full-surface onto the visible drawable.
//!
//! The design constraints:
//!
//! - **No unsafe**: `unsafe` is forbidden in this crate.
//! - **Render thread never waits on the encoder**: frames are dropped at the rate limiter, and
//!   the worker thread is the only place that blocks, with a bounded poll.
//! - **Device-agnostic**: layers, compositor and orchestrator run against the [`GpuDevice`]
//!   trait. [`CpuDevice`] is a deterministic software implementation; `WgpuDevice` sits behind
//!   the `gpu` feature.
//! - **Premultiplied RGBA8**: bitmaps and targets carry premultiplied pixels.
//!
//! # Getting started
//!
//! Build a [`SurfaceHost`] from a [`HostConfig`], a device, an [`EncoderBackend`] such as
//! [`FfmpegBackend`] and a [`Clock`], then forward the toolkit's surface callbacks to it and
//! send [`Action`]s through its [`CommandSender`].
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod assets;
mod capture;
mod config;
mod encode;
mod foundation;
mod host;
mod render;

/// Pure matrix, region and placement math.
pub mod transform;

pub use assets::bitmap::{Bitmap, decode_image, rasterize_svg};
pub use assets::store::AssetStore;
pub use capture::snapshot::{MediaLibrary, SnapshotService, capture_target};
pub use config::{HostConfig, LayerSpec, RecorderConfig, RendererConfig, TimingMode};
pub use encode::buffer_pool::{PixelBuffer, PixelBufferPool, PixelBufferPoolStats};
pub use encode::clock::{Clock, ManualClock, SystemClock};
pub use encode::ffmpeg::{FfmpegBackend, FfmpegEncoder, ensure_parent_dir, is_ffmpeg_on_path};
pub use encode::memory::{MemoryBackend, MemoryEncoder, MemoryRecording};
pub use encode::queue::{FrameQueue, PendingFrame};
pub use encode::recorder::{
    CaptureOutcome, RecorderEvent, RecorderState, RecorderStats, RecordingCompletion,
    RecordingOutcome, VideoRecorder, flip_rgba_to_bgra,
};
pub use encode::sink::{
    EncoderBackend, EncoderStatus, PixelLayout, VideoEncoder, VideoOutputSettings,
};
pub use foundation::core::{Fps, Rect, Rgba8Premul, SurfaceSize, Visibility};
pub use foundation::error::{LayercastError, LayercastResult, RecordingError};
pub use host::{HostEvent, SurfaceHost, TickDriver};
pub use render::command::{Action, CommandQueue, CommandSender};
pub use render::compositor::{CompositorState, MultiTargetCompositor};
pub use render::cpu::CpuDevice;
pub use render::device::{
    BlendFactor, BlendFunc, BufferId, DeviceStats, FramebufferId, FramebufferStatus, GpuDevice,
    ProgramId, TextureId, Topology,
};
#[cfg(feature = "gpu")]
pub use render::gpu::WgpuDevice;
pub use render::layer::{LayerKind, TextureInfo, TextureLayer};
pub use render::registry::{SnapshotSource, ViewRegistry};
pub use render::renderer::{ActionOutcome, FrameOutcome, Renderer};
pub use render::shaders::{BASE_FRAG, BASE_VERT, ShaderSource, ShaderStage};
pub use transform::matrix::{Matrix4, pixel_to_normalized};
pub use transform::placement::{Anchor, best_fit_matrix};
pub use transform::region::{CoordinateArea, CoordinatePoint, CoordinateRegion};
