//! Pure 4x4 matrix and pixel-to-normalized coordinate helpers.
//!
//! Nothing in here touches a device; every function is safe to call from any thread.

/// Column-major [`matrix::Matrix4`] and pixel/normalized conversions.
pub mod matrix;
/// Anchored best-fit placement of an image inside a region.
pub mod placement;
/// Axis-aligned pixel regions and their normalized quads.
pub mod region;
