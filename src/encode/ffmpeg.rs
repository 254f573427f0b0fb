use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::encode::buffer_pool::{PixelBuffer, PixelBufferPool};
use crate::encode::sink::{
    EncoderBackend, EncoderStatus, PtsGuard, VideoEncoder, VideoOutputSettings, check_frame_len,
};
use crate::foundation::core::{Fps, SurfaceSize};
use crate::foundation::error::{LayercastError, LayercastResult};

/// Frames that may sit between the encode worker and `ffmpeg`'s stdin.
const WRITER_QUEUE_DEPTH: usize = 3;
/// Longest run of repeated frames written to fill a timestamp gap.
const MAX_GAP_FRAMES: u64 = 600;

/// Opens [`FfmpegEncoder`]s that stream BGRA rawvideo into the system `ffmpeg`.
#[derive(Clone, Debug)]
pub struct FfmpegBackend {
    /// Overwrite an existing output file.
    pub overwrite: bool,
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self { overwrite: true }
    }
}

impl EncoderBackend for FfmpegBackend {
    fn open(
        &self,
        path: &Path,
        settings: &VideoOutputSettings,
    ) -> LayercastResult<Box<dyn VideoEncoder>> {
        Ok(Box::new(FfmpegEncoder::spawn(path, settings, self.overwrite)?))
    }
}

struct WriterMsg {
    buffer: PixelBuffer,
    repeat_previous: u64,
}

/// H.264/MP4 encoder running as an `ffmpeg` child process.
///
/// Appends go through a bounded channel to a writer thread; a full channel is what "not ready"
/// means. Timestamps are mapped onto constant-frame-rate slots and gaps are filled by repeating the
/// previous frame. Odd dimensions are padded to even with black.
pub struct FfmpegEncoder {
    out_path: PathBuf,
    settings: VideoOutputSettings,
    pool: Arc<PixelBufferPool>,
    guard: PtsGuard,
    next_slot: u64,

    tx: Option<SyncSender<WriterMsg>>,
    in_flight: Arc<AtomicUsize>,
    writer: Option<JoinHandle<LayercastResult<u64>>>,
    child: Option<Child>,
    stderr_drain: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
}

impl std::fmt::Debug for FfmpegEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegEncoder")
            .field("out_path", &self.out_path)
            .field("settings", &self.settings)
            .field("next_slot", &self.next_slot)
            .finish_non_exhaustive()
    }
}

impl FfmpegEncoder {
    /// Spawn `ffmpeg` writing to `out_path`.
    #[tracing::instrument(skip(settings), fields(width = settings.size.width, height = settings.size.height))]
    pub fn spawn(
        out_path: &Path,
        settings: &VideoOutputSettings,
        overwrite: bool,
    ) -> LayercastResult<Self> {
        if !settings.size.is_drawable() {
            return Err(LayercastError::encode("ffmpeg encoder width/height must be non-zero"));
        }

        ensure_parent_dir(out_path)?;
        if !overwrite && out_path.exists() {
            return Err(LayercastError::encode(format!(
                "output file '{}' already exists",
                out_path.display()
            )));
        }
        if !is_ffmpeg_on_path() {
            return Err(LayercastError::encode(
                "ffmpeg is required for MP4 encoding, but was not found on PATH",
            ));
        }

        let padded = even_size(settings.size);
        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd.arg(if overwrite { "-y" } else { "-n" });
        cmd.args([
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "bgra",
            "-s",
            &format!("{}x{}", padded.width, padded.height),
        ]);
        push_input_fps(&mut cmd, settings.fps);
        cmd.args(["-i", "pipe:0"]);
        cmd.args([
            "-an",
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-b:v",
            &settings.bitrate.to_string(),
            "-g",
            &settings.key_frame_interval.to_string(),
            "-movflags",
            "+faststart",
        ]);
        cmd.arg(out_path);

        let mut child = cmd.spawn().map_err(|e| {
            LayercastError::encode(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| LayercastError::encode("failed to open ffmpeg stdin (unexpected)"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| LayercastError::encode("failed to open ffmpeg stderr (unexpected)"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut stderr_bytes = Vec::new();
            stderr.read_to_end(&mut stderr_bytes)?;
            Ok(stderr_bytes)
        });

        let pool = Arc::new(PixelBufferPool::new(settings.frame_len(), settings.pool_capacity.max(1)));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = sync_channel(WRITER_QUEUE_DEPTH);
        let writer = {
            let pool = Arc::clone(&pool);
            let in_flight = Arc::clone(&in_flight);
            let size = settings.size;
            std::thread::Builder::new()
                .name("layercast-ffmpeg-writer".into())
                .spawn(move || write_frames(rx, stdin, size, padded, &pool, &in_flight))
                .map_err(|e| LayercastError::encode(format!("failed to spawn writer thread: {e}")))?
        };

        tracing::info!(out = %out_path.display(), "ffmpeg encoder started");
        Ok(Self {
            out_path: out_path.to_path_buf(),
            settings: settings.clone(),
            pool,
            guard: PtsGuard::default(),
            next_slot: 0,
            tx: Some(tx),
            in_flight,
            writer: Some(writer),
            child: Some(child),
            stderr_drain: Some(stderr_drain),
        })
    }

    fn finalize(&mut self) -> LayercastResult<()> {
        drop(self.tx.take());
        let written = match self.writer.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| LayercastError::encode("ffmpeg writer thread panicked"))??,
            None => 0,
        };

        let mut child = self
            .child
            .take()
            .ok_or_else(|| LayercastError::encode("ffmpeg encoder already finalized"))?;
        let status = child.wait().map_err(|e| {
            LayercastError::encode(format!("failed to wait for ffmpeg to finish: {e}"))
        })?;
        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| LayercastError::encode("ffmpeg stderr drain thread panicked"))?
                .map_err(|e| LayercastError::encode(format!("ffmpeg stderr read failed: {e}")))?,
            None => Vec::new(),
        };

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr_bytes);
            return Err(LayercastError::encode(format!(
                "ffmpeg exited with status {}: {}",
                status,
                stderr.trim()
            )));
        }
        tracing::info!(out = %self.out_path.display(), frames = written, "ffmpeg encoder finished");
        Ok(())
    }
}

impl VideoEncoder for FfmpegEncoder {
    fn is_ready_for_more_data(&self) -> bool {
        // A dead writer reports ready so the next append surfaces its error.
        let writer_gone = self.writer.as_ref().is_none_or(|h| h.is_finished());
        writer_gone || self.in_flight.load(Ordering::Acquire) < WRITER_QUEUE_DEPTH
    }

    fn pixel_buffer_pool(&self) -> Option<Arc<PixelBufferPool>> {
        Some(Arc::clone(&self.pool))
    }

    fn append(&mut self, buffer: PixelBuffer, pts: Duration) -> LayercastResult<()> {
        check_frame_len(&buffer, &self.settings)?;
        self.guard.accept(pts)?;
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| LayercastError::encode("ffmpeg encoder input already finished"))?;

        let slot = self
            .settings
            .fps
            .duration_to_frame_round(pts)
            .max(self.next_slot);
        let repeat_previous = if self.next_slot == 0 {
            0
        } else {
            (slot - self.next_slot).min(MAX_GAP_FRAMES)
        };
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        if tx
            .send(WriterMsg {
                buffer,
                repeat_previous,
            })
            .is_err()
        {
            self.in_flight.fetch_sub(1, Ordering::AcqRel);
            return Err(LayercastError::encode("ffmpeg writer stopped accepting frames"));
        }
        self.next_slot = slot + 1;
        Ok(())
    }

    fn mark_input_finished(&mut self) {
        drop(self.tx.take());
    }

    fn finish(&mut self) -> EncoderStatus {
        match self.finalize() {
            Ok(()) => EncoderStatus::Completed,
            Err(e) => {
                tracing::warn!(error = %e, "ffmpeg finalize failed");
                EncoderStatus::Failed(e.to_string())
            }
        }
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        drop(self.tx.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

fn write_frames(
    rx: Receiver<WriterMsg>,
    mut stdin: ChildStdin,
    size: SurfaceSize,
    padded: SurfaceSize,
    pool: &PixelBufferPool,
    in_flight: &AtomicUsize,
) -> LayercastResult<u64> {
    let mut previous: Vec<u8> = Vec::new();
    let mut scratch = vec![0u8; padded.rgba_len()];
    let mut written = 0u64;

    for msg in rx {
        let result = (|| {
            if !previous.is_empty() {
                for _ in 0..msg.repeat_previous {
                    stdin.write_all(pad_frame(&previous, size, padded, &mut scratch))?;
                    written += 1;
                }
            }
            stdin.write_all(pad_frame(msg.buffer.as_slice(), size, padded, &mut scratch))?;
            written += 1;
            Ok::<_, std::io::Error>(())
        })();

        previous.clear();
        previous.extend_from_slice(msg.buffer.as_slice());
        pool.recycle(msg.buffer);
        in_flight.fetch_sub(1, Ordering::AcqRel);

        result.map_err(|e| {
            LayercastError::encode(format!("failed to write frame to ffmpeg stdin: {e}"))
        })?;
    }
    Ok(written)
}

/// Copy `src` into `scratch` with black padding on the right and bottom when `padded` is larger.
fn pad_frame<'a>(
    src: &'a [u8],
    size: SurfaceSize,
    padded: SurfaceSize,
    scratch: &'a mut [u8],
) -> &'a [u8] {
    if size == padded {
        return src;
    }
    scratch.fill(0);
    let src_row = size.width as usize * 4;
    let dst_row = padded.width as usize * 4;
    for (y, row) in src.chunks_exact(src_row).enumerate() {
        scratch[y * dst_row..y * dst_row + src_row].copy_from_slice(row);
    }
    for px in scratch.chunks_exact_mut(4) {
        px[3] = 255;
    }
    scratch
}

fn even_size(size: SurfaceSize) -> SurfaceSize {
    SurfaceSize::new(size.width + size.width % 2, size.height + size.height % 2)
}

fn push_input_fps(cmd: &mut Command, fps: Fps) {
    // For rawvideo input, `-r` goes before `-i`.
    cmd.args(["-r", &format!("{}/{}", fps.num, fps.den)]);
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> LayercastResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "../../tests/unit/encode/ffmpeg.rs"]
mod tests;
