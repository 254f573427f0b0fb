//! Device abstraction, layers, the compositor and the per-frame orchestrator.

pub mod command;
pub mod compositor;
pub mod cpu;
pub mod device;
#[cfg(feature = "gpu")]
pub mod gpu;
pub mod layer;
pub(crate) mod quad;
pub mod registry;
pub mod renderer;
pub mod shaders;
