use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::encode::buffer_pool::{PixelBuffer, PixelBufferPool};
use crate::encode::sink::{
    EncoderBackend, EncoderStatus, PtsGuard, VideoEncoder, VideoOutputSettings, check_frame_len,
};
use crate::foundation::error::{LayercastError, LayercastResult};

/// What a [`MemoryEncoder`] saw during one session.
#[derive(Clone, Debug, PartialEq)]
pub struct MemoryRecording {
    /// Output path the encoder was opened with.
    pub path: PathBuf,
    /// Settings the encoder was opened with.
    pub settings: VideoOutputSettings,
    /// Timestamps of accepted frames, in append order.
    pub timestamps: Vec<Duration>,
    /// Appends refused (bad timestamp, wrong size, injected failure).
    pub rejected: u64,
    /// Whether `mark_input_finished` was called.
    pub input_finished: bool,
    /// Status returned by `finish`, once called.
    pub status: Option<EncoderStatus>,
    /// Bytes of the most recent accepted frame (BGRA, top row first).
    pub last_frame: Option<Vec<u8>>,
    /// Accepted frames that arrived in ad-hoc buffers instead of pooled ones.
    pub ad_hoc_frames: u64,
}

#[derive(Clone, Debug)]
struct MemoryScript {
    readiness: Vec<bool>,
    fail_open: Option<String>,
    fail_appends: Vec<u64>,
    finish_status: EncoderStatus,
    append_delay: Duration,
}

impl Default for MemoryScript {
    fn default() -> Self {
        Self {
            readiness: Vec::new(),
            fail_open: None,
            fail_appends: Vec::new(),
            finish_status: EncoderStatus::Completed,
            append_delay: Duration::ZERO,
        }
    }
}

/// Opens [`MemoryEncoder`]s that keep everything in memory.
///
/// Readiness, append failures and the final status can be scripted. Clones share the recording
/// log.
#[derive(Clone, Debug, Default)]
pub struct MemoryBackend {
    script: MemoryScript,
    log: Arc<Mutex<Vec<MemoryRecording>>>,
}

impl MemoryBackend {
    /// Backend whose encoders are always ready and always complete.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer readiness polls by cycling through `pattern`. Empty means always ready.
    pub fn with_readiness(mut self, pattern: Vec<bool>) -> Self {
        self.script.readiness = pattern;
        self
    }

    /// Fail every `open` with `msg`.
    pub fn failing_open(mut self, msg: impl Into<String>) -> Self {
        self.script.fail_open = Some(msg.into());
        self
    }

    /// Reject the append with zero-based index `n` (counting every append call).
    pub fn failing_append_at(mut self, n: u64) -> Self {
        self.script.fail_appends.push(n);
        self
    }

    /// Report `status` from `finish`.
    pub fn finishing_with(mut self, status: EncoderStatus) -> Self {
        self.script.finish_status = status;
        self
    }

    /// Sleep this long inside every append.
    pub fn with_append_delay(mut self, delay: Duration) -> Self {
        self.script.append_delay = delay;
        self
    }

    /// Every session opened so far, oldest first.
    pub fn recordings(&self) -> Vec<MemoryRecording> {
        lock(&self.log).clone()
    }

    /// The most recent session.
    pub fn last_recording(&self) -> Option<MemoryRecording> {
        lock(&self.log).last().cloned()
    }
}

impl EncoderBackend for MemoryBackend {
    fn open(
        &self,
        path: &Path,
        settings: &VideoOutputSettings,
    ) -> LayercastResult<Box<dyn VideoEncoder>> {
        if let Some(msg) = &self.script.fail_open {
            return Err(LayercastError::encode(msg.clone()));
        }
        let index = {
            let mut log = lock(&self.log);
            log.push(MemoryRecording {
                path: path.to_path_buf(),
                settings: settings.clone(),
                timestamps: Vec::new(),
                rejected: 0,
                input_finished: false,
                status: None,
                last_frame: None,
                ad_hoc_frames: 0,
            });
            log.len() - 1
        };
        Ok(Box::new(MemoryEncoder {
            index,
            log: Arc::clone(&self.log),
            script: self.script.clone(),
            settings: settings.clone(),
            pool: Arc::new(PixelBufferPool::new(
                settings.frame_len(),
                settings.pool_capacity.max(1),
            )),
            polls: AtomicUsize::new(0),
            appends: 0,
            guard: PtsGuard::default(),
            finished: false,
        }))
    }
}

/// Encoder that records timestamps and the last frame into its backend's log.
#[derive(Debug)]
pub struct MemoryEncoder {
    index: usize,
    log: Arc<Mutex<Vec<MemoryRecording>>>,
    script: MemoryScript,
    settings: VideoOutputSettings,
    pool: Arc<PixelBufferPool>,
    polls: AtomicUsize,
    appends: u64,
    guard: PtsGuard,
    finished: bool,
}

impl MemoryEncoder {
    fn with_entry(&self, f: impl FnOnce(&mut MemoryRecording)) {
        if let Some(entry) = lock(&self.log).get_mut(self.index) {
            f(entry);
        }
    }
}

impl VideoEncoder for MemoryEncoder {
    fn is_ready_for_more_data(&self) -> bool {
        let pattern = &self.script.readiness;
        if pattern.is_empty() {
            return true;
        }
        let n = self.polls.fetch_add(1, Ordering::Relaxed);
        pattern[n % pattern.len()]
    }

    fn pixel_buffer_pool(&self) -> Option<Arc<PixelBufferPool>> {
        Some(Arc::clone(&self.pool))
    }

    fn append(&mut self, buffer: PixelBuffer, pts: Duration) -> LayercastResult<()> {
        let n = self.appends;
        self.appends += 1;
        if !self.script.append_delay.is_zero() {
            std::thread::sleep(self.script.append_delay);
        }

        let checked = if self.finished {
            Err(LayercastError::encode("memory encoder input already finished"))
        } else if self.script.fail_appends.contains(&n) {
            Err(LayercastError::encode(format!("injected append failure at {n}")))
        } else {
            check_frame_len(&buffer, &self.settings).and_then(|()| self.guard.accept(pts))
        };

        match checked {
            Ok(()) => {
                let pooled = buffer.is_pooled();
                self.with_entry(|e| {
                    e.timestamps.push(pts);
                    if !pooled {
                        e.ad_hoc_frames += 1;
                    }
                    match &mut e.last_frame {
                        Some(v) => {
                            v.clear();
                            v.extend_from_slice(buffer.as_slice());
                        }
                        None => e.last_frame = Some(buffer.as_slice().to_vec()),
                    }
                });
                self.pool.recycle(buffer);
                Ok(())
            }
            Err(err) => {
                self.with_entry(|e| e.rejected += 1);
                self.pool.recycle(buffer);
                Err(err)
            }
        }
    }

    fn mark_input_finished(&mut self) {
        self.finished = true;
        self.with_entry(|e| e.input_finished = true);
    }

    fn finish(&mut self) -> EncoderStatus {
        self.finished = true;
        let status = self.script.finish_status.clone();
        self.with_entry(|e| e.status = Some(status.clone()));
        status
    }
}

fn lock(log: &Mutex<Vec<MemoryRecording>>) -> MutexGuard<'_, Vec<MemoryRecording>> {
    match log.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/memory.rs"]
mod tests;
