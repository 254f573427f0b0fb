use super::*;

#[test]
fn factory_reports_width_and_height() {
    let region = CoordinateRegion::from_rect(10.0, 20.0, 100.0, 50.0).unwrap();
    assert_eq!(region.width(), 100.0);
    assert_eq!(region.height(), 50.0);
    assert!(region.check().is_ok());
    assert_eq!(region.right_bottom, CoordinatePoint::new(110.0, 70.0));
}

#[test]
fn skewed_region_fails_check() {
    let mut region = CoordinateRegion::from_rect(10.0, 20.0, 100.0, 50.0).unwrap();
    region.left_bottom.x = 11.0;
    let err = region.check().unwrap_err();
    assert!(err.is_config());
    assert!(err.to_string().contains("lb=(11, 70)"));

    let mut region = CoordinateRegion::full_surface(SurfaceSize::new(64, 64));
    region.right_top.y = 1.0;
    assert!(region.check().is_err());
    assert!(region.surface_area(SurfaceSize::new(64, 64), 1.0, 1.0).is_err());
}

#[test]
fn non_finite_region_fails_check() {
    assert!(CoordinateRegion::from_rect(f32::NAN, 0.0, 1.0, 1.0).is_err());
}

#[test]
fn kurbo_rect_is_normalized_before_building() {
    let region = CoordinateRegion::from_kurbo(Rect::new(110.0, 70.0, 10.0, 20.0)).unwrap();
    assert_eq!(region.left_top, CoordinatePoint::new(10.0, 20.0));
    assert_eq!(region.width(), 100.0);
}

#[test]
fn full_surface_quad_is_the_unit_quad() {
    let surface = SurfaceSize::new(640, 480);
    let quad = CoordinateRegion::full_surface(surface).quad_vertices(surface);
    assert_eq!(
        quad,
        [
            -1.0, 1.0, 0.0, //
            -1.0, -1.0, 0.0, //
            1.0, -1.0, 0.0, //
            1.0, 1.0, 0.0,
        ]
    );
}

#[test]
fn surface_area_scales_with_boundaries() {
    let surface = SurfaceSize::new(200, 100);
    let region = CoordinateRegion::from_rect(0.0, 0.0, 100.0, 50.0).unwrap();
    let area = region.surface_area(surface, 2.0, 1.0).unwrap();
    assert_eq!(
        area,
        CoordinateArea {
            left: -2.0,
            top: 1.0,
            right: 0.0,
            bottom: 0.0
        }
    );
    assert_eq!(area.center(), (-1.0, 0.5));
    assert!(!region.is_empty());
    assert!(CoordinateRegion::full_surface(SurfaceSize::default()).is_empty());
}
