use super::*;

#[test]
fn odd_sizes_round_up_to_even() {
    assert_eq!(even_size(SurfaceSize::new(3, 5)), SurfaceSize::new(4, 6));
    assert_eq!(even_size(SurfaceSize::new(4, 6)), SurfaceSize::new(4, 6));
}

#[test]
fn padding_keeps_rows_and_blacks_out_the_rest() {
    let size = SurfaceSize::new(1, 1);
    let padded = even_size(size);
    let src = [10u8, 20, 30, 40];
    let mut scratch = vec![0u8; padded.rgba_len()];
    let out = pad_frame(&src, size, padded, &mut scratch);
    assert_eq!(&out[0..4], &[10, 20, 30, 255]);
    assert_eq!(&out[4..8], &[0, 0, 0, 255]);
    assert_eq!(out.len(), 16);
}

#[test]
fn even_frames_pass_through_untouched() {
    let size = SurfaceSize::new(2, 2);
    let src = vec![7u8; 16];
    let mut scratch = vec![0u8; 16];
    assert_eq!(pad_frame(&src, size, size, &mut scratch), &src[..]);
}

#[test]
fn zero_size_is_rejected_before_spawning() {
    let settings = VideoOutputSettings::new(SurfaceSize::new(0, 4), Fps::new(30, 1).unwrap(), 10, 30);
    let err = FfmpegEncoder::spawn(Path::new("unused.mp4"), &settings, true).unwrap_err();
    assert!(err.to_string().contains("non-zero"));
}
