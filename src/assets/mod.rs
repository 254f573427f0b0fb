//! Bitmaps loaded into layer textures.

pub mod bitmap;
pub mod store;
