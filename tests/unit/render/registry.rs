use super::*;
use crate::foundation::core::Rgba8Premul;

struct Solid(Rgba8Premul);

impl SnapshotSource for Solid {
    fn snapshot(&self, rect: Rect) -> Option<Bitmap> {
        let (w, h) = (rect.width() as u32, rect.height() as u32);
        (w > 0 && h > 0).then(|| Bitmap::solid(w, h, self.0))
    }
}

#[test]
fn registry_never_owns_sources() {
    let mut reg = ViewRegistry::new();
    let source: Arc<dyn SnapshotSource> = Arc::new(Solid(Rgba8Premul::transparent()));
    reg.register("panel", &source);

    let found = reg.find("panel").unwrap();
    let bmp = found.snapshot(Rect::new(0.0, 0.0, 3.0, 2.0)).unwrap();
    assert_eq!((bmp.width, bmp.height), (3, 2));
    drop(found);

    drop(source);
    assert!(reg.find("panel").is_none());
    assert_eq!(reg.len(), 1);
    assert_eq!(reg.prune(), 1);
    assert!(reg.is_empty());
}

#[test]
fn register_replaces_and_unregister_removes() {
    let mut reg = ViewRegistry::new();
    let a: Arc<dyn SnapshotSource> = Arc::new(Solid(Rgba8Premul::transparent()));
    let b: Arc<dyn SnapshotSource> =
        Arc::new(Solid(Rgba8Premul::from_straight_rgba(0, 0, 255, 255)));
    reg.register("v", &a);
    reg.register("v", &b);
    let px = reg
        .find("v")
        .unwrap()
        .snapshot(Rect::new(0.0, 0.0, 1.0, 1.0))
        .unwrap();
    assert_eq!(px.rgba8_premul[2], 255);

    assert!(reg.unregister("v"));
    assert!(!reg.unregister("v"));
    assert!(reg.find("v").is_none());
}
