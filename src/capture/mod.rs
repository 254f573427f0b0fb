//! Still-image capture of a composited render target.

pub mod snapshot;

use std::path::{Path, PathBuf};

/// `<dir>/<prefix>_<YYYYMMDD_HHMMSS_mmm>.<ext>` in local time, suffixed `_<n>` if taken.
pub(crate) fn timestamped_path(dir: &Path, prefix: &str, ext: &str) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S_%3f");
    let base = format!("{prefix}_{stamp}");
    let mut path = dir.join(format!("{base}.{ext}"));
    let mut n = 1u32;
    while path.exists() {
        path = dir.join(format!("{base}_{n}.{ext}"));
        n += 1;
    }
    path
}
