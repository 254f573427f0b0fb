use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::encode::buffer_pool::{PixelBuffer, PixelBufferPool};
use crate::foundation::core::{Fps, SurfaceSize};
use crate::foundation::error::{LayercastError, LayercastResult};

/// Byte order of pixels handed to an encoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelLayout {
    /// `B, G, R, A` per pixel, top row first.
    Bgra8,
}

/// Parameters an encoder is opened with.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoOutputSettings {
    /// Frame size in pixels.
    pub size: SurfaceSize,
    /// Nominal frame rate.
    pub fps: Fps,
    /// Target bitrate in bits per second.
    pub bitrate: u64,
    /// Frames between key frames.
    pub key_frame_interval: u32,
    /// Layout of appended buffers.
    pub layout: PixelLayout,
    /// Pooled buffers the encoder may hand out at once.
    pub pool_capacity: usize,
}

/// Pool capacity used when none is configured.
pub(crate) const DEFAULT_POOL_CAPACITY: usize = 4;

impl VideoOutputSettings {
    /// Settings for `size` at `fps`, with bitrate `width * height * bitrate_factor` and a key frame
    /// every `key_frame_interval` frames.
    pub fn new(size: SurfaceSize, fps: Fps, bitrate_factor: u64, key_frame_interval: u32) -> Self {
        Self {
            size,
            fps,
            bitrate: u64::from(size.width)
                .saturating_mul(u64::from(size.height))
                .saturating_mul(bitrate_factor),
            key_frame_interval: key_frame_interval.max(1),
            layout: PixelLayout::Bgra8,
            pool_capacity: DEFAULT_POOL_CAPACITY,
        }
    }

    /// Size the encoder's buffer pool; at least one buffer is kept.
    pub fn with_pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity.max(1);
        self
    }

    /// Bytes in one frame buffer.
    pub fn frame_len(&self) -> usize {
        self.size.rgba_len()
    }
}

/// Terminal state of an encoder after [`VideoEncoder::finish`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EncoderStatus {
    /// The container was finalized.
    Completed,
    /// Finalization failed.
    Failed(String),
}

impl EncoderStatus {
    /// Return `true` for [`EncoderStatus::Completed`].
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// An open output stream fed by the encode worker.
///
/// Presentation timestamps must strictly increase; an append that breaks this is rejected.
pub trait VideoEncoder: Send {
    /// Whether an append right now would be accepted without blocking.
    fn is_ready_for_more_data(&self) -> bool;
    /// Pool appended buffers should come from, if the encoder keeps one.
    fn pixel_buffer_pool(&self) -> Option<Arc<PixelBufferPool>>;
    /// Queue one frame. The buffer is returned to its pool once consumed.
    fn append(&mut self, buffer: PixelBuffer, pts: Duration) -> LayercastResult<()>;
    /// No more appends follow.
    fn mark_input_finished(&mut self);
    /// Finalize the container.
    fn finish(&mut self) -> EncoderStatus;
}

/// Opens [`VideoEncoder`]s.
pub trait EncoderBackend: Send + Sync + std::fmt::Debug {
    /// Create an encoder writing to `path`.
    fn open(
        &self,
        path: &Path,
        settings: &VideoOutputSettings,
    ) -> LayercastResult<Box<dyn VideoEncoder>>;
}

/// Tracks the last accepted presentation timestamp.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct PtsGuard {
    last: Option<Duration>,
}

impl PtsGuard {
    pub(crate) fn accept(&mut self, pts: Duration) -> LayercastResult<()> {
        if let Some(last) = self.last
            && pts <= last
        {
            return Err(LayercastError::encode(format!(
                "non-increasing presentation timestamp: {pts:?} after {last:?}"
            )));
        }
        self.last = Some(pts);
        Ok(())
    }
}

pub(crate) fn check_frame_len(buffer: &PixelBuffer, settings: &VideoOutputSettings) -> LayercastResult<()> {
    if buffer.len() != settings.frame_len() {
        return Err(LayercastError::encode(format!(
            "frame buffer holds {} bytes, expected {} for {}x{}",
            buffer.len(),
            settings.frame_len(),
            settings.size.width,
            settings.size.height
        )));
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/encode/sink.rs"]
mod tests;
