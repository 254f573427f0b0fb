//! Surface lifecycle glue between a UI toolkit and the [`Renderer`].
//!
//! The toolkit calls [`SurfaceHost::on_create`], [`SurfaceHost::on_resize`] and
//! [`SurfaceHost::on_draw_tick`] from its render thread, toggles delivery with
//! [`SurfaceHost::on_appear`] / [`SurfaceHost::on_disappear`], and sends [`Action`]s through a
//! [`CommandSender`] from anywhere. Results come back as [`HostEvent`]s on a channel.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

use anyhow::Context as _;
use image::RgbaImage;

use crate::config::HostConfig;
use crate::encode::clock::Clock;
use crate::encode::recorder::{RecorderEvent, VideoRecorder};
use crate::encode::sink::EncoderBackend;
use crate::foundation::core::{Fps, SurfaceSize};
use crate::foundation::error::LayercastResult;
use crate::render::command::{Action, CommandQueue, CommandSender};
use crate::render::device::GpuDevice;
use crate::render::registry::ViewRegistry;
use crate::render::renderer::{ActionOutcome, FrameOutcome, Renderer};

const TICK_SLACK: Duration = Duration::from_millis(1);

/// Notifications for the UI layer.
#[derive(Clone, Debug, PartialEq)]
pub enum HostEvent {
    /// Forwarded recorder lifecycle or progress.
    Recording(RecorderEvent),
    /// A screenshot was captured.
    SnapshotSaved {
        /// The image, upright and opaque.
        image: RgbaImage,
        /// Saved file, `None` when persistence is off or the write failed.
        path: Option<PathBuf>,
    },
    /// A screenshot could not be captured.
    SnapshotFailed(String),
    /// An action was rejected.
    CommandFailed {
        /// The action, formatted.
        action: String,
        /// Why it failed.
        error: String,
    },
}

/// A display-link style tick gate: preferred rate, pause flag, one-way invalidation.
#[derive(Clone, Debug)]
pub struct TickDriver {
    fps: Fps,
    paused: bool,
    invalidated: bool,
    next_due: Option<Duration>,
}

impl TickDriver {
    /// A driver at `fps` ticks per second, starting paused or running.
    pub fn new(fps: Fps, paused: bool) -> Self {
        Self {
            fps,
            paused,
            invalidated: false,
            next_due: None,
        }
    }

    /// Preferred tick rate.
    pub fn fps(&self) -> Fps {
        self.fps
    }

    /// Pause or resume. Resuming fires on the next poll.
    pub fn set_paused(&mut self, paused: bool) {
        if self.paused != paused {
            self.paused = paused;
            self.next_due = None;
        }
    }

    /// Whether ticks are held back.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Stop for good.
    pub fn invalidate(&mut self) {
        self.invalidated = true;
    }

    /// Whether [`TickDriver::invalidate`] was called.
    pub fn is_invalidated(&self) -> bool {
        self.invalidated
    }

    /// Whether a tick arriving at `now` should run.
    pub fn poll(&mut self, now: Duration) -> bool {
        if self.paused || self.invalidated {
            return false;
        }
        let interval = self.fps.frame_duration();
        if let Some(due) = self.next_due
            && now + TICK_SLACK < due
        {
            return false;
        }
        self.next_due = Some(match self.next_due {
            Some(due) if now < due + interval => due + interval,
            _ => now + interval,
        });
        true
    }
}

/// Owns the renderer, the view registry, the command queue and both tick drivers.
#[derive(Debug)]
pub struct SurfaceHost<D: GpuDevice> {
    renderer: Renderer<D>,
    registry: ViewRegistry,
    commands: CommandQueue,
    draw_driver: TickDriver,
    snapshot_driver: TickDriver,
    clock: Arc<dyn Clock>,
    events: Sender<HostEvent>,
    released: bool,
}

impl<D: GpuDevice> SurfaceHost<D> {
    /// Build a host and the receiver its events arrive on. Ticks are paused until
    /// [`SurfaceHost::on_appear`].
    pub fn new(
        device: D,
        config: &HostConfig,
        backend: Arc<dyn EncoderBackend>,
        clock: Arc<dyn Clock>,
    ) -> LayercastResult<(Self, Receiver<HostEvent>)> {
        config.validate()?;
        let recorder = VideoRecorder::new(config.recorder.clone(), backend, Arc::clone(&clock))?;
        let renderer = Renderer::new(device, config, recorder)?;
        let (events, rx) = mpsc::channel();

        let recorder_events = renderer.recorder().subscribe();
        let forward = events.clone();
        std::thread::Builder::new()
            .name("layercast-events".into())
            .spawn(move || {
                for ev in recorder_events {
                    if forward.send(HostEvent::Recording(ev)).is_err() {
                        break;
                    }
                }
            })
            .context("spawn recorder event forwarder")?;

        let host = Self {
            renderer,
            registry: ViewRegistry::new(),
            commands: CommandQueue::new(),
            draw_driver: TickDriver::new(Fps::new(config.tick_fps, 1)?, true),
            snapshot_driver: TickDriver::new(Fps::new(config.snapshot_fps, 1)?, true),
            clock,
            events,
            released: false,
        };
        Ok((host, rx))
    }

    /// The surface exists at `size` (which may still be zero).
    pub fn on_create(&mut self, size: SurfaceSize) -> LayercastResult<()> {
        self.renderer.on_create(size)
    }

    /// The surface changed size.
    pub fn on_resize(&mut self, size: SurfaceSize) -> LayercastResult<()> {
        self.renderer.on_resize(size)
    }

    /// The surface became visible; ticks are delivered again.
    pub fn on_appear(&mut self) {
        self.draw_driver.set_paused(false);
        tracing::debug!("surface appeared");
    }

    /// The surface went away; ticks are ignored.
    pub fn on_disappear(&mut self) {
        self.draw_driver.set_paused(true);
        self.snapshot_driver.set_paused(true);
        tracing::debug!("surface disappeared");
    }

    /// One display tick: apply the pending action, refresh snapshot layers when due, draw.
    pub fn on_draw_tick(&mut self) -> LayercastResult<FrameOutcome> {
        let now = self.clock.now();
        if self.released || !self.draw_driver.poll(now) {
            return Ok(FrameOutcome::Skipped);
        }
        self.apply_pending();

        self.snapshot_driver
            .set_paused(!self.renderer.has_snapshot_layers());
        if self.snapshot_driver.poll(now) {
            self.renderer.refresh_snapshot_layers(&self.registry);
        }
        self.renderer.draw_frame()
    }

    fn apply_pending(&mut self) {
        let Some(action) = self.commands.take() else {
            return;
        };
        let label = format!("{action:?}");
        match self.renderer.apply(action, &self.registry) {
            Ok(ActionOutcome::Snapshot {
                image: Some(image),
                path,
            }) => self.emit(HostEvent::SnapshotSaved { image, path }),
            Ok(ActionOutcome::Snapshot { image: None, .. }) => {
                self.emit(HostEvent::SnapshotFailed("surface could not be captured".into()));
            }
            // Progress and the final outcome arrive as recorder events.
            Ok(ActionOutcome::RecordingStopping(_)) => {}
            Ok(ActionOutcome::Applied | ActionOutcome::RecordingStarted { .. }) => {}
            Err(e) => {
                tracing::warn!(action = %label, error = %e, "action failed");
                self.emit(HostEvent::CommandFailed {
                    action: label,
                    error: e.to_string(),
                });
            }
        }
        self.commands.complete();
    }

    fn emit(&self, event: HostEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("host event dropped: no receiver");
        }
    }

    /// Handle for sending [`Action`]s from the UI thread.
    pub fn command_sender(&self) -> CommandSender {
        self.commands.sender()
    }

    /// Queue an action from the render thread itself.
    pub fn dispatch(&self, action: Action) -> bool {
        self.commands.sender().dispatch(action)
    }

    /// Snapshot sources known to this host.
    pub fn registry(&self) -> &ViewRegistry {
        &self.registry
    }

    /// Snapshot sources known to this host, mutably.
    pub fn registry_mut(&mut self) -> &mut ViewRegistry {
        &mut self.registry
    }

    /// The renderer.
    pub fn renderer(&self) -> &Renderer<D> {
        &self.renderer
    }

    /// The renderer, mutably.
    pub fn renderer_mut(&mut self) -> &mut Renderer<D> {
        &mut self.renderer
    }

    /// Gate for draw ticks.
    pub fn draw_driver(&self) -> &TickDriver {
        &self.draw_driver
    }

    /// Gate for snapshot-layer refreshes.
    pub fn snapshot_driver(&self) -> &TickDriver {
        &self.snapshot_driver
    }

    /// Whether [`SurfaceHost::release`] ran.
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Stop both drivers, finish any recording and free every device handle. Idempotent.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.draw_driver.invalidate();
        self.snapshot_driver.invalidate();
        self.renderer.release();
        self.released = true;
        tracing::debug!("surface host released");
    }
}

impl<D: GpuDevice> Drop for SurfaceHost<D> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
#[path = "../tests/unit/host/host.rs"]
mod tests;
