use super::*;

fn pair(w0: f32) -> [SourceSample; 2] {
    [
        SourceSample::new(0, 0.0, 0.0, w0),
        SourceSample::new(1, 0.0, 0.0, 1.0 - w0),
    ]
}

fn value(s: &SourceSample) -> f32 {
    if s.source == 0 { 100.0 } else { 200.0 }
}

#[test]
fn unmapped_pixels_have_no_value() {
    assert_eq!(blend_pixel(BlendMode::Weighted, &[], value), None);
}

#[test]
fn single_source_passes_through() {
    let one = [SourceSample::new(1, 0.0, 0.0, 0.3)];
    assert_eq!(blend_pixel(BlendMode::Weighted, &one, value), Some(200.0));
    assert_eq!(blend_pixel(BlendMode::HardSeam, &one, value), Some(200.0));
}

#[test]
fn weighted_is_convex_combination() {
    let v = blend_pixel(BlendMode::Weighted, &pair(0.25), value).unwrap();
    assert!((v - 175.0).abs() < 1e-4);
}

#[test]
fn hard_seam_takes_heaviest_then_first() {
    assert_eq!(blend_pixel(BlendMode::HardSeam, &pair(0.75), value), Some(100.0));
    assert_eq!(blend_pixel(BlendMode::HardSeam, &pair(0.25), value), Some(200.0));
    assert_eq!(blend_pixel(BlendMode::HardSeam, &pair(0.5), value), Some(100.0));
}
