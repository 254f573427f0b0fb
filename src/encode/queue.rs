use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

use crate::foundation::core::SurfaceSize;

/// One captured frame travelling from the render thread to the encode worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingFrame {
    /// Owned RGBA8 copy of the target, bottom row first.
    pub pixels: Vec<u8>,
    /// Presentation timestamp relative to the first frame.
    pub pts: Duration,
    /// Pixel size of `pixels`.
    pub size: SurfaceSize,
}

/// FIFO of [`PendingFrame`]s. The lock covers only append and swap.
#[derive(Debug, Default)]
pub struct FrameQueue {
    frames: Mutex<VecDeque<PendingFrame>>,
    ready: Condvar,
}

impl FrameQueue {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame and wake the worker. Returns the queue length after the push.
    pub fn push(&self, frame: PendingFrame) -> usize {
        let len = {
            let mut q = self.lock();
            q.push_back(frame);
            q.len()
        };
        self.ready.notify_one();
        len
    }

    /// Take every queued frame, leaving the queue empty.
    pub fn take_all(&self) -> VecDeque<PendingFrame> {
        std::mem::take(&mut *self.lock())
    }

    /// Block up to `timeout` until frames are queued or `stop` is set.
    ///
    /// Returns `true` when frames are available.
    pub fn wait_for_frames(&self, timeout: Duration, stop: &AtomicBool) -> bool {
        let guard = self.lock();
        let (guard, _) = match self.ready.wait_timeout_while(guard, timeout, |q| {
            q.is_empty() && !stop.load(Ordering::Acquire)
        }) {
            Ok(r) => r,
            Err(poisoned) => poisoned.into_inner(),
        };
        !guard.is_empty()
    }

    /// Wake every waiter, e.g. after raising a stop flag.
    pub fn notify_all(&self) {
        // Taking the lock orders the wakeup after the flag store.
        drop(self.lock());
        self.ready.notify_all();
    }

    /// Number of queued frames.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Return `true` when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<PendingFrame>> {
        match self.frames.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/queue.rs"]
mod tests;
