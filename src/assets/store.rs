use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;

use crate::assets::bitmap::{Bitmap, decode_image, rasterize_svg};
use crate::foundation::error::{LayercastError, LayercastResult};

/// Normalize and validate a store-relative bitmap name.
///
/// The result uses `/` separators and drops `.` segments. Absolute names and parent traversals
/// (`..`) are rejected.
pub(crate) fn normalize_name(name: &str) -> LayercastResult<String> {
    let s = name.replace('\\', "/");
    if s.starts_with('/') {
        return Err(LayercastError::asset("bitmap names must be relative"));
    }

    let mut out = Vec::<&str>::new();
    for part in s.split('/') {
        if part.is_empty() || part == "." {
            continue;
        }
        if part == ".." {
            return Err(LayercastError::asset("bitmap names must not contain '..'"));
        }
        out.push(part);
    }
    if out.is_empty() {
        return Err(LayercastError::asset("bitmap name must contain a file name"));
    }
    Ok(out.join("/"))
}

#[derive(Debug)]
/// Named bitmaps backed by a root directory, decoded once and cached.
///
/// `.svg` files are rasterized at their intrinsic size; every other extension goes through the
/// raster decoder.
pub struct AssetStore {
    root: PathBuf,
    cache: Mutex<HashMap<String, Bitmap>>,
}

impl AssetStore {
    /// Store rooted at `root`. Nothing is read until [`AssetStore::load`].
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Root directory names are resolved against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Register an in-memory bitmap under `name`, replacing any cached entry.
    pub fn insert(&self, name: &str, bitmap: Bitmap) -> LayercastResult<()> {
        let key = normalize_name(name)?;
        self.lock_cache().insert(key, bitmap);
        Ok(())
    }

    /// Resolve `name` to a bitmap, decoding it from disk on first use.
    #[tracing::instrument(skip(self))]
    pub fn load(&self, name: &str) -> LayercastResult<Bitmap> {
        let key = normalize_name(name)?;
        if let Some(hit) = self.lock_cache().get(&key) {
            return Ok(hit.clone());
        }

        let path = self.root.join(&key);
        let bytes = std::fs::read(&path)
            .with_context(|| format!("read bitmap '{}'", path.display()))?;
        let is_svg = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("svg"));
        let bitmap = if is_svg {
            rasterize_svg(&bytes, None)?
        } else {
            decode_image(&bytes)?
        };
        tracing::debug!(
            name = %key,
            width = bitmap.width,
            height = bitmap.height,
            "bitmap decoded"
        );

        self.lock_cache().insert(key, bitmap.clone());
        Ok(bitmap)
    }

    /// Number of cached bitmaps.
    pub fn cached_len(&self) -> usize {
        self.lock_cache().len()
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<String, Bitmap>> {
        match self.cache.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/assets/store.rs"]
mod tests;
