use super::*;

#[test]
fn anchor_offsets_are_distinct() {
    let offsets: Vec<(f32, f32)> = Anchor::ALL
        .iter()
        .map(|a| anchor_offset(*a, 0.4, 0.6))
        .collect();
    for (i, a) in offsets.iter().enumerate() {
        for b in &offsets[i + 1..] {
            assert_ne!(a, b);
        }
    }
    assert_eq!(anchor_offset(Anchor::Center, 0.4, 0.6), (0.0, 0.0));
    assert_eq!(anchor_offset(Anchor::LeftTop, 0.4, 0.6), (-0.2, 0.3));
    assert_eq!(anchor_offset(Anchor::RightBottom, 0.4, 0.6), (0.2, -0.3));
    assert_eq!(anchor_offset(Anchor::MiddleBottom, 0.4, 0.6), (0.0, -0.3));
}

#[test]
fn anchor_serde_is_snake_case() {
    let a: Anchor = serde_json::from_str("\"middle_bottom\"").unwrap();
    assert_eq!(a, Anchor::MiddleBottom);
    assert_eq!(serde_json::to_string(&Anchor::LeftTop).unwrap(), "\"left_top\"");
}

#[test]
fn zero_sized_inputs_yield_no_matrix() {
    let surface = SurfaceSize::new(640, 480);
    let region = CoordinateRegion::full_surface(surface);
    assert!(best_fit_matrix(0, 10, &region, surface, Anchor::Center).is_none());
    assert!(best_fit_matrix(10, 10, &region, SurfaceSize::new(0, 480), Anchor::Center).is_none());
    let empty = CoordinateRegion::from_rect(5.0, 5.0, 0.0, 10.0).unwrap();
    assert!(best_fit_matrix(10, 10, &empty, surface, Anchor::Center).is_none());
}

#[test]
fn matching_aspect_full_surface_is_identity() {
    let surface = SurfaceSize::new(640, 480);
    let region = CoordinateRegion::full_surface(surface);
    for anchor in Anchor::ALL {
        let m = best_fit_matrix(640, 480, &region, surface, anchor).unwrap();
        let expected = Matrix4([
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, -1.0, 0.0, //
            0.0, 0.0, -1.0, 1.0,
        ]);
        assert!(m.approx_eq(&expected, 1e-5), "{anchor:?}: {m:?}");
    }
}

#[test]
fn wide_image_is_squeezed_vertically() {
    let surface = SurfaceSize::new(400, 400);
    let region = CoordinateRegion::full_surface(surface);
    let m = best_fit_matrix(800, 400, &region, surface, Anchor::Center).unwrap();
    let top = m.transform_point([0.0, 1.0, 0.0, 1.0]);
    let right = m.transform_point([1.0, 0.0, 0.0, 1.0]);
    assert!((top[1] - 0.5).abs() < 1e-5, "{top:?}");
    assert!((right[0] - 1.0).abs() < 1e-5, "{right:?}");
}

#[test]
fn anchors_shift_the_letterboxed_image() {
    let surface = SurfaceSize::new(400, 400);
    let region = CoordinateRegion::full_surface(surface);
    let origin = |anchor| {
        best_fit_matrix(800, 400, &region, surface, anchor)
            .unwrap()
            .transform_point([0.0, 0.0, 0.0, 1.0])
    };
    let center = origin(Anchor::Center);
    let top = origin(Anchor::MiddleTop);
    let bottom = origin(Anchor::MiddleBottom);
    assert!(top[1] > center[1]);
    assert!(bottom[1] < center[1]);
    assert!((top[0] - center[0]).abs() < 1e-5);
}
