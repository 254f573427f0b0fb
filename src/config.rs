//! JSON-loadable settings for the renderer, the recorder and the host.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;

use crate::encode::sink::DEFAULT_POOL_CAPACITY;
use crate::foundation::core::{Fps, Rgba8Premul};
use crate::foundation::error::{LayercastError, LayercastResult};
use crate::render::layer::LayerKind;
use crate::transform::placement::Anchor;

/// How presentation timestamps advance while recording.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingMode {
    /// Elapsed time since the first captured frame, scaled by the speed multiplier.
    #[default]
    WallClock,
    /// Captured frame count times the nominal frame duration, scaled by the speed multiplier.
    FrameCount,
}

/// One entry of the fixed layer stack.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayerSpec {
    /// Placement behavior: `"stretch"` or `{"fit": "<anchor>"}`.
    pub kind: LayerKind,
    /// Whether the layer is drawn into the opaque target.
    pub opaque_pass: bool,
}

impl Default for LayerSpec {
    fn default() -> Self {
        Self {
            kind: LayerKind::Stretch,
            opaque_pass: true,
        }
    }
}

/// Compositor and layer stack settings.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RendererConfig {
    /// Offscreen target count, at least 2.
    pub targets: usize,
    /// Color every target is cleared to at the start of a pass.
    pub clear_color: Rgba8Premul,
    /// Layer stack, bottom first.
    pub layers: Vec<LayerSpec>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        // Even slots stretch, odd slots fit to the top-left; the top two come from UI snapshots
        // and stay out of the opaque pass.
        let layers = (0..6)
            .map(|i| LayerSpec {
                kind: if i % 2 == 0 {
                    LayerKind::Stretch
                } else {
                    LayerKind::Fit(Anchor::LeftTop)
                },
                opaque_pass: i < 4,
            })
            .collect();
        Self {
            targets: 2,
            clear_color: Rgba8Premul::transparent(),
            layers,
        }
    }
}

/// Video recorder settings.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecorderConfig {
    /// Frame-rate cap and nominal output rate.
    pub max_fps: u32,
    /// Timestamp derivation.
    pub timing: TimingMode,
    /// Drop frames arriving faster than `max_fps`.
    pub rate_limit: bool,
    /// Default speed multiplier applied to timestamps.
    pub speed: f64,
    /// Bitrate is `width * height * bitrate_factor`.
    pub bitrate_factor: u64,
    /// Frames between key frames; defaults to `max_fps`.
    pub key_frame_interval: Option<u32>,
    /// Worker sleep between queue and readiness polls, in milliseconds.
    pub poll_interval_ms: u64,
    /// How long a frame waits for the encoder before it is dropped, in milliseconds.
    pub ready_wait_ms: u64,
    /// Bound on draining after stop, in milliseconds.
    pub drain_deadline_ms: u64,
    /// Emit a progress event every this many appended frames.
    pub progress_interval: u64,
    /// Pixel buffers the encoder pool may hand out at once.
    pub pool_capacity: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            max_fps: 30,
            timing: TimingMode::WallClock,
            rate_limit: true,
            speed: 1.0,
            bitrate_factor: 10,
            key_frame_interval: None,
            poll_interval_ms: 10,
            ready_wait_ms: 500,
            drain_deadline_ms: 5_000,
            progress_interval: 30,
            pool_capacity: DEFAULT_POOL_CAPACITY,
        }
    }
}

impl RecorderConfig {
    /// `max_fps` as an [`Fps`].
    pub fn fps(&self) -> LayercastResult<Fps> {
        Fps::new(self.max_fps, 1)
    }

    /// Effective key-frame interval.
    pub fn key_frame_interval(&self) -> u32 {
        self.key_frame_interval.unwrap_or(self.max_fps).max(1)
    }

    /// Worker poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Per-frame encoder-ready wait.
    pub fn ready_wait(&self) -> Duration {
        Duration::from_millis(self.ready_wait_ms)
    }

    /// Drain bound after stop.
    pub fn drain_deadline(&self) -> Duration {
        Duration::from_millis(self.drain_deadline_ms)
    }

    /// Check ranges.
    pub fn validate(&self) -> LayercastResult<()> {
        if self.max_fps == 0 {
            return Err(LayercastError::config("recorder max_fps must be > 0"));
        }
        if !self.speed.is_finite() || self.speed <= 0.0 {
            return Err(LayercastError::config(format!(
                "recorder speed must be finite and > 0, got {}",
                self.speed
            )));
        }
        if self.bitrate_factor == 0 {
            return Err(LayercastError::config("recorder bitrate_factor must be > 0"));
        }
        if self.progress_interval == 0 {
            return Err(LayercastError::config("recorder progress_interval must be > 0"));
        }
        if self.pool_capacity == 0 {
            return Err(LayercastError::config("recorder pool_capacity must be > 0"));
        }
        Ok(())
    }
}

/// Everything a [`crate::host::SurfaceHost`] needs.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    /// Compositor and layers.
    pub renderer: RendererConfig,
    /// Video recorder.
    pub recorder: RecorderConfig,
    /// Directory receiving videos and screenshots.
    pub output_dir: PathBuf,
    /// Directory named bitmaps are loaded from.
    pub asset_root: PathBuf,
    /// Preferred draw tick rate.
    pub tick_fps: u32,
    /// Refresh rate of snapshot-sourced layers.
    pub snapshot_fps: u32,
    /// Write screenshots to `output_dir`.
    pub persist_snapshots: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            renderer: RendererConfig::default(),
            recorder: RecorderConfig::default(),
            output_dir: PathBuf::from("output"),
            asset_root: PathBuf::from("assets"),
            tick_fps: 60,
            snapshot_fps: 15,
            persist_snapshots: true,
        }
    }
}

impl HostConfig {
    /// Parse and validate JSON text.
    pub fn from_json_str(s: &str) -> LayercastResult<Self> {
        let cfg: Self = serde_json::from_str(s).map_err(|e| {
            if e.is_data() {
                LayercastError::config(format!("invalid host config: {e}"))
            } else {
                LayercastError::serde(format!("malformed host config json: {e}"))
            }
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_json_file(path: &Path) -> LayercastResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read host config '{}'", path.display()))?;
        Self::from_json_str(&text)
    }

    /// Check ranges across every section.
    pub fn validate(&self) -> LayercastResult<()> {
        if self.renderer.targets < 2 {
            return Err(LayercastError::config(format!(
                "renderer needs at least 2 targets, got {}",
                self.renderer.targets
            )));
        }
        if self.tick_fps == 0 || self.snapshot_fps == 0 {
            return Err(LayercastError::config("tick_fps and snapshot_fps must be > 0"));
        }
        self.recorder.validate()
    }
}

#[cfg(test)]
#[path = "../tests/unit/config/config.rs"]
mod tests;
