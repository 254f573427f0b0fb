//! Recording state machine: `Idle -> Recording -> Draining -> Idle`.
//!
//! The render thread calls [`VideoRecorder::capture_frame`], which rate-limits, reads pixels once
//! and enqueues an owned copy. A worker thread drains the queue into the encoder, waiting a bounded
//! time for encoder readiness and dropping the frame when that window passes. [`VideoRecorder::stop`]
//! hands the session to a finalizer thread and returns a [`RecordingCompletion`] that resolves
//! exactly once.

use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use rayon::prelude::*;

use crate::config::{RecorderConfig, TimingMode};
use crate::encode::buffer_pool::{PixelBuffer, PixelBufferPool};
use crate::encode::clock::Clock;
use crate::encode::ffmpeg::ensure_parent_dir;
use crate::encode::queue::{FrameQueue, PendingFrame};
use crate::encode::sink::{EncoderBackend, EncoderStatus, VideoEncoder, VideoOutputSettings};
use crate::foundation::core::{Fps, SurfaceSize};
use crate::foundation::error::{LayercastError, LayercastResult, RecordingError};

/// Accepts a frame this much before its slot is due.
const RATE_LIMIT_SLACK: Duration = Duration::from_millis(1);

/// Where the recorder is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum RecorderState {
    /// No session.
    Idle = 0,
    /// Accepting frames.
    Recording = 1,
    /// Stopped; the worker is flushing and the container is being finalized.
    Draining = 2,
}

impl RecorderState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Recording,
            2 => Self::Draining,
            _ => Self::Idle,
        }
    }
}

/// What [`VideoRecorder::capture_frame`] did with a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Not recording; nothing was read.
    Inactive,
    /// Too soon after the previous accepted frame; nothing was read.
    RateLimited,
    /// Read and queued for encoding.
    Enqueued {
        /// Presentation timestamp assigned to the frame.
        pts: Duration,
    },
    /// The pixel read failed; the frame was skipped.
    ReadFailed,
}

/// Final report of one recording session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordingOutcome {
    /// `true` when the encoder finished with [`EncoderStatus::Completed`].
    pub success: bool,
    /// Output location.
    pub output: PathBuf,
    /// Frames the encoder accepted.
    pub frames_appended: u64,
    /// Queued frames that never reached the encoder, or that it refused.
    pub frames_dropped: u64,
    /// Encoder's terminal status.
    pub status: EncoderStatus,
}

/// Notifications delivered to [`VideoRecorder::subscribe`]rs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecorderEvent {
    /// A session began writing to `output`.
    Started {
        /// Output location.
        output: PathBuf,
    },
    /// `frames` frames have been appended so far.
    Progress {
        /// Appended frame count.
        frames: u64,
    },
    /// A session ended.
    Stopped(RecordingOutcome),
}

/// Counters for the current (or last) session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecorderStats {
    /// Frames read and queued.
    pub frames_enqueued: u64,
    /// Frames refused by the rate limiter.
    pub frames_rate_limited: u64,
    /// Frames whose pixel read failed.
    pub read_failures: u64,
    /// Frames appended by the worker.
    pub frames_appended: u64,
    /// Frames the worker dropped.
    pub frames_dropped: u64,
}

/// Resolves once with the outcome of a [`VideoRecorder::stop`].
///
/// The outcome is handed out a single time; later polls return `None`.
#[derive(Debug)]
pub struct RecordingCompletion {
    rx: Receiver<Result<RecordingOutcome, RecordingError>>,
    delivered: Cell<bool>,
}

impl RecordingCompletion {
    fn new(rx: Receiver<Result<RecordingOutcome, RecordingError>>) -> Self {
        Self {
            rx,
            delivered: Cell::new(false),
        }
    }

    fn resolved(result: Result<RecordingOutcome, RecordingError>) -> Self {
        let (tx, rx) = mpsc::channel();
        let _ = tx.send(result);
        Self::new(rx)
    }

    /// Block until the session is finalized.
    pub fn wait(self) -> Result<RecordingOutcome, RecordingError> {
        match self.rx.recv() {
            Ok(r) => r,
            Err(_) => Err(vanished()),
        }
    }

    /// Block for at most `timeout`. `None` means still draining or already delivered.
    pub fn wait_timeout(
        &self,
        timeout: Duration,
    ) -> Option<Result<RecordingOutcome, RecordingError>> {
        match self.rx.recv_timeout(timeout) {
            Ok(r) => self.deliver(r),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => self.deliver(Err(vanished())),
        }
    }

    /// Poll without blocking.
    pub fn try_result(&self) -> Option<Result<RecordingOutcome, RecordingError>> {
        match self.rx.try_recv() {
            Ok(r) => self.deliver(r),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => self.deliver(Err(vanished())),
        }
    }

    fn deliver(
        &self,
        r: Result<RecordingOutcome, RecordingError>,
    ) -> Option<Result<RecordingOutcome, RecordingError>> {
        (!self.delivered.replace(true)).then_some(r)
    }
}

fn vanished() -> RecordingError {
    RecordingError::Output("recording finalizer vanished".into())
}

#[derive(Debug, Default)]
struct EventHub {
    subscribers: Mutex<Vec<Sender<RecorderEvent>>>,
}

impl EventHub {
    fn subscribe(&self) -> Receiver<RecorderEvent> {
        let (tx, rx) = mpsc::channel();
        self.lock().push(tx);
        rx
    }

    fn emit(&self, event: RecorderEvent) {
        self.lock().retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Sender<RecorderEvent>>> {
        match self.subscribers.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// State both threads touch. Only the queue carries frames.
#[derive(Debug, Default)]
struct SessionShared {
    queue: FrameQueue,
    stopping: AtomicBool,
    appended: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Clone, Debug)]
struct WorkerParams {
    size: SurfaceSize,
    poll_interval: Duration,
    ready_wait: Duration,
    drain_deadline: Duration,
    progress_interval: u64,
}

/// Render-thread half of a session.
#[derive(Debug)]
struct Session {
    shared: Arc<SessionShared>,
    worker: JoinHandle<EncoderStatus>,
    output: PathBuf,
    size: SurfaceSize,
    speed: f64,
    origin: Option<Duration>,
    next_due: Option<Duration>,
    captured: u64,
    last_pts: Option<Duration>,
}

/// Bridges the render loop to a [`VideoEncoder`] without ever blocking on it.
#[derive(Debug)]
pub struct VideoRecorder {
    config: RecorderConfig,
    fps: Fps,
    backend: Arc<dyn EncoderBackend>,
    clock: Arc<dyn Clock>,
    size: Option<SurfaceSize>,
    state: Arc<AtomicU8>,
    session: Option<Session>,
    events: Arc<EventHub>,
    stats: RecorderStats,
    last_shared: Option<Arc<SessionShared>>,
}

impl VideoRecorder {
    /// Recorder using `backend` for encoders and `clock` for timing.
    pub fn new(
        config: RecorderConfig,
        backend: Arc<dyn EncoderBackend>,
        clock: Arc<dyn Clock>,
    ) -> LayercastResult<Self> {
        config.validate()?;
        let fps = config.fps()?;
        Ok(Self {
            config,
            fps,
            backend,
            clock,
            size: None,
            state: Arc::new(AtomicU8::new(RecorderState::Idle as u8)),
            session: None,
            events: Arc::new(EventHub::default()),
            stats: RecorderStats::default(),
            last_shared: None,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RecorderState {
        RecorderState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether frames are being accepted.
    pub fn is_recording(&self) -> bool {
        self.state() == RecorderState::Recording
    }

    /// Frame size the next session will use.
    pub fn size(&self) -> Option<SurfaceSize> {
        self.size
    }

    /// Frame size of the live session. Stays fixed until the session stops.
    pub fn session_size(&self) -> Option<SurfaceSize> {
        self.session.as_ref().map(|s| s.size)
    }

    /// Settings this recorder was built with.
    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Receive lifecycle and progress events from now on.
    pub fn subscribe(&self) -> Receiver<RecorderEvent> {
        self.events.subscribe()
    }

    /// Counters of the current or most recent session.
    pub fn stats(&self) -> RecorderStats {
        let mut st = self.stats.clone();
        if let Some(shared) = &self.last_shared {
            st.frames_appended = shared.appended.load(Ordering::Acquire);
            st.frames_dropped = shared.dropped.load(Ordering::Acquire);
        }
        st
    }

    /// Set the frame size for the next session. Refused while a session is live.
    pub fn configure_size(&mut self, size: SurfaceSize) -> Result<(), RecordingError> {
        match self.state() {
            RecorderState::Recording => return Err(RecordingError::AlreadyRecording),
            RecorderState::Draining => return Err(RecordingError::Busy),
            RecorderState::Idle => {}
        }
        self.size = size.is_drawable().then_some(size);
        Ok(())
    }

    /// Open an encoder at `output` and start the worker.
    ///
    /// An existing file at `output` is replaced. `speed` scales presentation timestamps.
    #[tracing::instrument(skip(self), fields(output = %output.display()))]
    pub fn start(&mut self, output: &Path, speed: f64) -> Result<(), RecordingError> {
        match self.state() {
            RecorderState::Recording => return Err(RecordingError::AlreadyRecording),
            RecorderState::Draining => return Err(RecordingError::Busy),
            RecorderState::Idle => {}
        }
        let size = self.size.ok_or(RecordingError::NotConfigured)?;
        if !speed.is_finite() || speed <= 0.0 {
            return Err(RecordingError::Output(format!(
                "speed multiplier must be finite and > 0, got {speed}"
            )));
        }

        prepare_output(output).map_err(|e| RecordingError::Output(e.to_string()))?;
        let settings = VideoOutputSettings::new(
            size,
            self.fps,
            self.config.bitrate_factor,
            self.config.key_frame_interval(),
        )
        .with_pool_capacity(self.config.pool_capacity);
        let encoder = self
            .backend
            .open(output, &settings)
            .map_err(|e| RecordingError::Output(e.to_string()))?;

        let shared = Arc::new(SessionShared::default());
        let params = WorkerParams {
            size,
            poll_interval: self.config.poll_interval(),
            ready_wait: self.config.ready_wait(),
            drain_deadline: self.config.drain_deadline(),
            progress_interval: self.config.progress_interval,
        };
        let worker = {
            let shared = Arc::clone(&shared);
            let events = Arc::clone(&self.events);
            std::thread::Builder::new()
                .name("layercast-encode".into())
                .spawn(move || run_worker(encoder, &shared, &events, &params))
                .map_err(|e| RecordingError::Output(format!("failed to spawn encode worker: {e}")))?
        };

        self.stats = RecorderStats::default();
        self.last_shared = Some(Arc::clone(&shared));
        self.session = Some(Session {
            shared,
            worker,
            output: output.to_path_buf(),
            size,
            speed,
            origin: None,
            next_due: None,
            captured: 0,
            last_pts: None,
        });
        self.state.store(RecorderState::Recording as u8, Ordering::Release);
        tracing::info!(
            width = size.width,
            height = size.height,
            fps = self.fps.num,
            "recording started"
        );
        self.events.emit(RecorderEvent::Started {
            output: output.to_path_buf(),
        });
        Ok(())
    }

    /// Offer a frame. `read` fills an RGBA8 buffer (bottom row first) of the session size.
    ///
    /// Never waits on the encoder.
    pub fn capture_frame<F>(&mut self, read: F) -> CaptureOutcome
    where
        F: FnOnce(&mut [u8]) -> LayercastResult<()>,
    {
        let min_interval = self.fps.frame_duration();
        let rate_limit = self.config.rate_limit;
        let timing = self.config.timing;
        let now = self.clock.now();

        let Some(session) = self.session.as_mut() else {
            return CaptureOutcome::Inactive;
        };
        if session.shared.stopping.load(Ordering::Acquire) {
            return CaptureOutcome::Inactive;
        }
        if rate_limit
            && let Some(due) = session.next_due
            && now + RATE_LIMIT_SLACK < due
        {
            self.stats.frames_rate_limited += 1;
            return CaptureOutcome::RateLimited;
        }

        let mut pixels = vec![0u8; session.size.rgba_len()];
        if let Err(e) = read(&mut pixels) {
            tracing::warn!(error = %e, "frame readback failed");
            self.stats.read_failures += 1;
            return CaptureOutcome::ReadFailed;
        }

        session.next_due = Some(match session.next_due {
            Some(due) if now < due + min_interval => due + min_interval,
            _ => now + min_interval,
        });
        let origin = *session.origin.get_or_insert(now);
        let raw = match timing {
            TimingMode::WallClock => now.saturating_sub(origin),
            TimingMode::FrameCount => self.fps.frames_to_duration(session.captured),
        };
        let mut pts = raw.mul_f64(session.speed);
        if let Some(last) = session.last_pts {
            pts = pts.max(last);
        }
        session.last_pts = Some(pts);
        session.captured += 1;

        session.shared.queue.push(PendingFrame {
            pixels,
            pts,
            size: session.size,
        });
        self.stats.frames_enqueued += 1;
        CaptureOutcome::Enqueued { pts }
    }

    /// [`VideoRecorder::capture_frame`] with pixels already in hand.
    pub fn capture_pixels(&mut self, rgba8: &[u8], size: SurfaceSize) -> CaptureOutcome {
        let expected = self.session.as_ref().map(|s| s.size);
        self.capture_frame(|buf| {
            if expected != Some(size) || rgba8.len() != buf.len() {
                return Err(LayercastError::capture(format!(
                    "frame of {}x{} ({} bytes) does not match the session size",
                    size.width,
                    size.height,
                    rgba8.len()
                )));
            }
            buf.copy_from_slice(rgba8);
            Ok(())
        })
    }

    /// Stop accepting frames, drain what is queued and finalize the output in the background.
    #[tracing::instrument(skip(self))]
    pub fn stop(&mut self) -> RecordingCompletion {
        let Some(session) = self.session.take() else {
            return RecordingCompletion::resolved(Err(RecordingError::NotRecording));
        };
        self.state.store(RecorderState::Draining as u8, Ordering::Release);
        session.shared.stopping.store(true, Ordering::Release);
        session.shared.queue.notify_all();
        tracing::info!(queued = session.shared.queue.len(), "recording stopping");

        let (tx, rx) = mpsc::channel();
        let state = Arc::clone(&self.state);
        let events = Arc::clone(&self.events);
        let finalize = move || {
            let outcome = finalize_session(session, &events);
            state.store(RecorderState::Idle as u8, Ordering::Release);
            let _ = tx.send(Ok(outcome));
        };

        // The closure owns the session; if the thread cannot start it is dropped and the
        // completion reports a vanished finalizer.
        if let Err(e) = std::thread::Builder::new()
            .name("layercast-finalize".into())
            .spawn(finalize)
        {
            tracing::warn!(error = %e, "failed to spawn recording finalizer");
            self.state.store(RecorderState::Idle as u8, Ordering::Release);
        }
        RecordingCompletion::new(rx)
    }

    /// Stop any live session and wait for it to finish.
    pub fn release(&mut self) {
        if self.session.is_some() {
            let _ = self.stop().wait();
        }
    }
}

impl Drop for VideoRecorder {
    fn drop(&mut self) {
        self.release();
    }
}

fn prepare_output(output: &Path) -> LayercastResult<()> {
    ensure_parent_dir(output)?;
    if output.exists() {
        use anyhow::Context as _;
        std::fs::remove_file(output)
            .with_context(|| format!("remove previous output '{}'", output.display()))?;
    }
    Ok(())
}

fn finalize_session(session: Session, events: &EventHub) -> RecordingOutcome {
    let status = session.worker.join().unwrap_or_else(|_| {
        tracing::warn!("encode worker panicked");
        EncoderStatus::Failed("encode worker panicked".into())
    });
    let outcome = RecordingOutcome {
        success: status.is_completed(),
        output: session.output,
        frames_appended: session.shared.appended.load(Ordering::Acquire),
        frames_dropped: session.shared.dropped.load(Ordering::Acquire),
        status,
    };
    if outcome.success {
        tracing::info!(
            output = %outcome.output.display(),
            appended = outcome.frames_appended,
            dropped = outcome.frames_dropped,
            "recording finished"
        );
    } else {
        tracing::warn!(status = ?outcome.status, "recording did not complete");
    }
    events.emit(RecorderEvent::Stopped(outcome.clone()));
    outcome
}

fn run_worker(
    mut encoder: Box<dyn VideoEncoder>,
    shared: &SessionShared,
    events: &EventHub,
    params: &WorkerParams,
) -> EncoderStatus {
    let pool = encoder.pixel_buffer_pool();
    let mut drain_deadline: Option<Instant> = None;

    loop {
        shared.queue.wait_for_frames(params.poll_interval, &shared.stopping);
        let stopping = shared.stopping.load(Ordering::Acquire);
        if stopping && drain_deadline.is_none() {
            drain_deadline = Some(Instant::now() + params.drain_deadline);
        }

        for frame in shared.queue.take_all() {
            let wait_until = match drain_deadline {
                Some(d) => d,
                None => Instant::now() + params.ready_wait,
            };
            let ready = wait_until_ready(
                encoder.as_ref(),
                wait_until,
                shared,
                &mut drain_deadline,
                params,
            );
            if !ready {
                shared.dropped.fetch_add(1, Ordering::AcqRel);
                tracing::warn!(pts = ?frame.pts, "encoder not ready, frame dropped");
                continue;
            }
            if frame.size != params.size {
                shared.dropped.fetch_add(1, Ordering::AcqRel);
                tracing::warn!(size = ?frame.size, "frame size changed mid-session, frame dropped");
                continue;
            }

            let mut buffer = pool.as_deref().map_or_else(
                || PixelBuffer::ad_hoc(frame.pixels.len()),
                PixelBufferPool::acquire_or_ad_hoc,
            );
            flip_rgba_to_bgra(&frame.pixels, buffer.as_mut_slice(), frame.size);

            match encoder.append(buffer, frame.pts) {
                Ok(()) => {
                    let n = shared.appended.fetch_add(1, Ordering::AcqRel) + 1;
                    if n.is_multiple_of(params.progress_interval) {
                        tracing::debug!(frames = n, "recording progress");
                        events.emit(RecorderEvent::Progress { frames: n });
                    }
                }
                Err(e) => {
                    shared.dropped.fetch_add(1, Ordering::AcqRel);
                    tracing::warn!(error = %e, pts = ?frame.pts, "encoder refused frame");
                }
            }
        }

        if stopping && shared.queue.is_empty() {
            break;
        }
    }

    encoder.mark_input_finished();
    encoder.finish()
}

/// Poll readiness until `until`. Observing a stop tightens the bound to the drain deadline.
fn wait_until_ready(
    encoder: &dyn VideoEncoder,
    mut until: Instant,
    shared: &SessionShared,
    drain_deadline: &mut Option<Instant>,
    params: &WorkerParams,
) -> bool {
    loop {
        if encoder.is_ready_for_more_data() {
            return true;
        }
        if drain_deadline.is_none() && shared.stopping.load(Ordering::Acquire) {
            let d = Instant::now() + params.drain_deadline;
            *drain_deadline = Some(d);
            until = until.min(d);
        }
        let now = Instant::now();
        if now >= until {
            return false;
        }
        std::thread::sleep(params.poll_interval.min(until - now));
    }
}

/// Reverse row order and swap R/B: bottom-first RGBA8 in, top-first BGRA8 out.
pub fn flip_rgba_to_bgra(src: &[u8], dst: &mut [u8], size: SurfaceSize) {
    let row_len = size.width as usize * 4;
    let rows = size.height as usize;
    if row_len == 0 || src.len() < row_len * rows || dst.len() < row_len * rows {
        return;
    }
    dst[..row_len * rows]
        .par_chunks_exact_mut(row_len)
        .enumerate()
        .for_each(|(y, out)| {
            let start = (rows - 1 - y) * row_len;
            let row = &src[start..start + row_len];
            for (o, i) in out.chunks_exact_mut(4).zip(row.chunks_exact(4)) {
                o[0] = i[2];
                o[1] = i[1];
                o[2] = i[0];
                o[3] = i[3];
            }
        });
}

#[cfg(test)]
#[path = "../../tests/unit/encode/recorder.rs"]
mod tests;
