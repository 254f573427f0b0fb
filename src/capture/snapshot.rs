use std::path::{Path, PathBuf};

use anyhow::Context as _;
use image::RgbaImage;

use crate::capture::timestamped_path;
use crate::foundation::core::SurfaceSize;
use crate::foundation::error::{LayercastError, LayercastResult};
use crate::render::device::{FramebufferId, GpuDevice};

/// Read a target back as an upright, fully opaque image.
///
/// `None` for a zero-sized surface or when any step fails; failures are logged.
#[tracing::instrument(skip(device))]
pub fn capture_target<D: GpuDevice + ?Sized>(
    device: &mut D,
    framebuffer: Option<FramebufferId>,
    size: SurfaceSize,
) -> Option<RgbaImage> {
    if !size.is_drawable() {
        tracing::warn!("snapshot skipped: surface has no pixels");
        return None;
    }
    match read_upright(device, framebuffer, size) {
        Ok(img) => Some(img),
        Err(e) => {
            tracing::warn!(error = %e, "snapshot readback failed");
            None
        }
    }
}

fn read_upright<D: GpuDevice + ?Sized>(
    device: &mut D,
    framebuffer: Option<FramebufferId>,
    size: SurfaceSize,
) -> LayercastResult<RgbaImage> {
    device.make_current()?;
    device.bind_framebuffer(framebuffer);
    device.finish();
    let mut raw = vec![0u8; size.rgba_len()];
    let read = device.read_pixels(framebuffer, size, &mut raw);
    device.bind_framebuffer(None);
    read?;

    let row_len = size.width as usize * 4;
    let mut upright = Vec::with_capacity(raw.len());
    for row in raw.chunks_exact(row_len).rev() {
        upright.extend_from_slice(row);
    }
    for px in upright.chunks_exact_mut(4) {
        px[3] = 255;
    }
    RgbaImage::from_raw(size.width, size.height, upright)
        .ok_or_else(|| LayercastError::capture("snapshot buffer does not match its size"))
}

/// Destination for saved snapshots beyond the output directory (a photo album, a gallery index).
pub trait MediaLibrary: std::fmt::Debug {
    /// Import an image that was just written to `path`.
    fn import_image(&self, path: &Path, image: &RgbaImage) -> LayercastResult<()>;
}

/// Takes snapshots and manages the ones saved to disk.
#[derive(Debug)]
pub struct SnapshotService {
    output_dir: PathBuf,
    persist: bool,
    library: Option<Box<dyn MediaLibrary>>,
}

impl SnapshotService {
    /// Service saving PNGs into `output_dir` when `persist` is set.
    pub fn new(output_dir: impl Into<PathBuf>, persist: bool) -> Self {
        Self {
            output_dir: output_dir.into(),
            persist,
            library: None,
        }
    }

    /// Also hand every saved snapshot to `library`.
    pub fn with_library(mut self, library: Box<dyn MediaLibrary>) -> Self {
        self.library = Some(library);
        self
    }

    /// Directory snapshots are written to.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Capture `framebuffer` and call `completion` with the image and where it was saved.
    ///
    /// The image is still delivered when saving fails; the path is then `None`.
    pub fn take<D, F>(
        &self,
        device: &mut D,
        framebuffer: Option<FramebufferId>,
        size: SurfaceSize,
        completion: F,
    ) where
        D: GpuDevice + ?Sized,
        F: FnOnce(Option<RgbaImage>, Option<PathBuf>),
    {
        let Some(image) = capture_target(device, framebuffer, size) else {
            completion(None, None);
            return;
        };
        if !self.persist {
            completion(Some(image), None);
            return;
        }

        let path = match self.save(&image) {
            Ok(path) => {
                tracing::info!(path = %path.display(), "snapshot saved");
                Some(path)
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to save snapshot");
                None
            }
        };
        if let (Some(library), Some(path)) = (&self.library, &path)
            && let Err(e) = library.import_image(path, &image)
        {
            tracing::warn!(error = %e, "media library rejected snapshot");
        }
        completion(Some(image), path);
    }

    fn save(&self, image: &RgbaImage) -> LayercastResult<PathBuf> {
        std::fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("create snapshot dir '{}'", self.output_dir.display())
        })?;
        let path = timestamped_path(&self.output_dir, "screenshot", "png");
        image
            .save_with_format(&path, image::ImageFormat::Png)
            .with_context(|| format!("write snapshot '{}'", path.display()))?;
        Ok(path)
    }

    /// Saved snapshots, newest first. A missing directory lists nothing.
    pub fn list_snapshots(&self) -> LayercastResult<Vec<PathBuf>> {
        let entries = match std::fs::read_dir(&self.output_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("list snapshots in '{}'", self.output_dir.display()))
                    .into());
            }
        };

        let mut found = Vec::new();
        for entry in entries {
            let entry = entry.context("read snapshot dir entry")?;
            let path = entry.path();
            if !is_snapshot_file(&path) {
                continue;
            }
            let modified = entry.metadata().and_then(|m| m.modified()).ok();
            found.push((modified, path));
        }
        found.sort_by(|a, b| b.cmp(a));
        Ok(found.into_iter().map(|(_, p)| p).collect())
    }

    /// Remove a saved snapshot.
    pub fn delete_snapshot(&self, path: &Path) -> LayercastResult<()> {
        std::fs::remove_file(path)
            .with_context(|| format!("delete snapshot '{}'", path.display()))?;
        Ok(())
    }
}

fn is_snapshot_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let name = name.to_ascii_lowercase();
    name.contains("screenshot") && (name.ends_with(".png") || name.ends_with(".jpg"))
}

#[cfg(test)]
#[path = "../../tests/unit/capture/snapshot.rs"]
mod tests;
