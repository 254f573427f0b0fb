//! Actions the UI layer sends to the render thread, one at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::foundation::core::{Rect, Visibility};
use crate::transform::region::CoordinateRegion;

/// A request applied by the renderer at the start of its next frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    /// Load a named bitmap from the asset store into `layer`.
    LoadStaticTexture {
        /// Target layer index.
        layer: usize,
        /// Asset name, relative to the asset root.
        name: String,
    },
    /// Snapshot `rect` of the registered view `view` into `layer`, and keep refreshing it.
    LoadSnapshotTexture {
        /// Registry identifier of the snapshot source.
        view: String,
        /// Area of the source to capture.
        rect: Rect,
        /// Target layer index.
        layer: usize,
    },
    /// Move `layer` to `region`.
    UpdateLayerRegion {
        /// Target layer index.
        layer: usize,
        /// New placement in surface pixels.
        region: CoordinateRegion,
    },
    /// Show or hide `layer`.
    SetLayerVisibility {
        /// Target layer index.
        layer: usize,
        /// New visibility.
        visibility: Visibility,
    },
    /// Start a recording into a fresh timestamped file.
    StartRecording,
    /// Stop the current recording.
    StopRecording,
    /// Capture the composited frame as a still image.
    TakeScreenshot,
}

#[derive(Debug, Default)]
struct CommandSlot {
    pending: Mutex<Option<Action>>,
    in_flight: AtomicBool,
}

impl CommandSlot {
    fn pending(&self) -> std::sync::MutexGuard<'_, Option<Action>> {
        match self.pending.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// UI-side handle. Cloneable and `Send`.
#[derive(Clone, Debug)]
pub struct CommandSender {
    slot: Arc<CommandSlot>,
}

impl CommandSender {
    /// Queue `action`. Returns `false`, dropping it, while another action is still in flight.
    pub fn dispatch(&self, action: Action) -> bool {
        if self
            .slot
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(?action, "command dropped: another one is in flight");
            return false;
        }
        *self.slot.pending() = Some(action);
        true
    }

    /// Whether an action is pending or being applied.
    pub fn is_busy(&self) -> bool {
        self.slot.in_flight.load(Ordering::Acquire)
    }
}

/// Render-side end of the command slot.
#[derive(Debug, Default)]
pub struct CommandQueue {
    slot: Arc<CommandSlot>,
}

impl CommandQueue {
    /// An empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// A new sender feeding this queue.
    pub fn sender(&self) -> CommandSender {
        CommandSender {
            slot: Arc::clone(&self.slot),
        }
    }

    /// The pending action, if any. The guard stays set until [`CommandQueue::complete`].
    pub fn take(&self) -> Option<Action> {
        self.slot.pending().take()
    }

    /// Mark the taken action as applied so the next dispatch is accepted.
    pub fn complete(&self) {
        self.slot.in_flight.store(false, Ordering::Release);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/command.rs"]
mod tests;
