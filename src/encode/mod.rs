//! Video recording: a render-thread producer, a worker-thread consumer and the encoders behind it.
//!
//! The render thread only ever reads pixels and pushes a [`queue::PendingFrame`]. Everything slow
//! (orientation flip, channel reorder, waiting on the encoder) happens on the worker.

/// Time sources for presentation timestamps and rate limiting.
pub mod clock;
/// Reusable pixel buffers handed to encoders.
pub mod buffer_pool;
/// `ffmpeg`-backed MP4 encoder.
pub mod ffmpeg;
/// In-memory encoder for tests and embedding.
pub mod memory;
/// Lock-guarded FIFO shared by the render thread and the worker.
pub mod queue;
/// The recording state machine.
pub mod recorder;
/// Encoder traits and output settings.
pub mod sink;
