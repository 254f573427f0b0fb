use super::*;

#[test]
fn mul_div255_rounds_to_nearest() {
    assert_eq!(mul_div255_u16(255, 255), 255);
    assert_eq!(mul_div255_u16(0, 255), 0);
    assert_eq!(mul_div255_u16(128, 128), 64);
    assert_eq!(mul_div255_u8(255, 1), 1);
}

#[test]
fn premultiply_zeroes_transparent_pixels() {
    let mut px = vec![200, 100, 50, 0, 255, 128, 0, 128];
    premultiply_rgba8_in_place(&mut px);
    assert_eq!(&px[0..4], &[0, 0, 0, 0]);
    assert_eq!(&px[4..8], &[128, 64, 0, 128]);
}

#[test]
fn align_to_rounds_up_to_multiple() {
    assert_eq!(align_to(0, 256), 0);
    assert_eq!(align_to(1, 256), 256);
    assert_eq!(align_to(2560, 256), 2560);
    assert_eq!(align_to(2561, 256), 2816);
}
