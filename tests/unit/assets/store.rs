use super::*;
use crate::foundation::core::{Rgba8Premul, SurfaceSize};

fn temp_root(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("layercast_store_{tag}_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn names_are_normalized() {
    assert_eq!(normalize_name("./a//b.png").unwrap(), "a/b.png");
    assert_eq!(normalize_name("a\\b.png").unwrap(), "a/b.png");
    assert!(normalize_name("/abs.png").is_err());
    assert!(normalize_name("../up.png").is_err());
    assert!(normalize_name("./").is_err());
}

#[test]
fn inserted_bitmaps_resolve_without_disk() {
    let store = AssetStore::new("/nonexistent");
    let bmp = Bitmap::solid(2, 2, Rgba8Premul::from_straight_rgba(1, 2, 3, 255));
    store.insert("logo", bmp.clone()).unwrap();
    assert_eq!(store.load("./logo").unwrap(), bmp);
}

#[test]
fn loads_png_and_svg_from_root_once() {
    let root = temp_root("load");
    image::RgbaImage::from_pixel(3, 2, image::Rgba([0, 255, 0, 255]))
        .save(root.join("green.png"))
        .unwrap();
    std::fs::write(
        root.join("dot.svg"),
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="4" height="6"><rect width="4" height="6" fill="blue"/></svg>"#,
    )
    .unwrap();

    let store = AssetStore::new(&root);
    let png = store.load("green.png").unwrap();
    assert_eq!(png.size(), SurfaceSize::new(3, 2));
    let svg = store.load("dot.svg").unwrap();
    assert_eq!(svg.size(), SurfaceSize::new(4, 6));
    assert_eq!(store.cached_len(), 2);

    std::fs::remove_file(root.join("green.png")).unwrap();
    assert!(store.load("green.png").is_ok());
    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn missing_file_mentions_path() {
    let store = AssetStore::new(temp_root("missing"));
    let err = store.load("absent.png").unwrap_err();
    assert!(err.to_string().contains("absent.png"));
}
