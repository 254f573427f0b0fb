//! Identifier to snapshot-source lookup, held without owning the sources.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use crate::assets::bitmap::Bitmap;
use crate::foundation::core::Rect;

/// Something the UI layer can render into a bitmap on request.
pub trait SnapshotSource: Send + Sync {
    /// Render the part of the source covered by `rect` (source pixel space).
    ///
    /// `None` when the source has nothing to show right now.
    fn snapshot(&self, rect: Rect) -> Option<Bitmap>;
}

/// Weak map from identifiers to [`SnapshotSource`]s.
///
/// Dropping the last strong reference elsewhere makes the entry unresolvable.
#[derive(Default)]
pub struct ViewRegistry {
    entries: HashMap<String, Weak<dyn SnapshotSource>>,
}

impl std::fmt::Debug for ViewRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewRegistry")
            .field("ids", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ViewRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `id` to `source`, replacing any previous binding.
    pub fn register(&mut self, id: impl Into<String>, source: &Arc<dyn SnapshotSource>) {
        let id = id.into();
        tracing::debug!(id = %id, "snapshot source registered");
        self.entries.insert(id, Arc::downgrade(source));
    }

    /// Resolve `id` while its source is still alive.
    pub fn find(&self, id: &str) -> Option<Arc<dyn SnapshotSource>> {
        self.entries.get(id).and_then(Weak::upgrade)
    }

    /// Forget `id`. Returns whether it was present.
    pub fn unregister(&mut self, id: &str) -> bool {
        self.entries.remove(id).is_some()
    }

    /// Drop entries whose sources are gone. Returns how many were removed.
    pub fn prune(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, w| w.strong_count() > 0);
        before - self.entries.len()
    }

    /// Number of entries, live or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Return `true` when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/registry.rs"]
mod tests;
