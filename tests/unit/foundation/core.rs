use super::*;

#[test]
fn fps_rejects_zero_parts() {
    assert!(Fps::new(0, 1).is_err());
    assert!(Fps::new(30, 0).is_err());
    assert!(Fps::new(30000, 1001).is_ok());
}

#[test]
fn fps_frame_math() {
    let fps = Fps::new(30, 1).unwrap();
    assert_eq!(fps.frame_duration(), Duration::from_nanos(33_333_333));
    assert_eq!(fps.frames_to_duration(30), Duration::from_secs(1));
    assert_eq!(fps.duration_to_frame_round(Duration::from_millis(1000)), 30);
    assert_eq!(fps.duration_to_frame_round(Duration::from_millis(49)), 1);
}

#[test]
fn surface_size_guards() {
    assert!(!SurfaceSize::new(0, 480).is_drawable());
    assert!(SurfaceSize::new(640, 480).is_drawable());
    assert_eq!(SurfaceSize::new(640, 480).rgba_len(), 640 * 480 * 4);
    assert_eq!(SurfaceSize::from_signed(-5, 10), SurfaceSize::new(0, 10));
    assert_eq!(SurfaceSize::new(0, 0).aspect_ratio(), None);
}

#[test]
fn visibility_defaults_to_invisible() {
    assert_eq!(Visibility::default(), Visibility::Invisible);
    assert!(Visibility::Visible.is_visible());
}

#[test]
fn rgba8_premul_from_straight() {
    let c = Rgba8Premul::from_straight_rgba(255, 128, 0, 128);
    assert_eq!(c.to_array(), [128, 64, 0, 128]);
}
