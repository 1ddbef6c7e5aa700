use super::*;
use crate::foundation::core::Canvas;
use crate::frame::buffer::CameraFrame;

fn ramp() -> CameraFrame {
    // 4x2 gray: row 0 = 0,10,20,30; row 1 = 40,50,60,70
    let bytes: Vec<u8> = (0..8).map(|i| (i * 10) as u8).collect();
    CameraFrame::from_packed(PixelFormat::Gray8, Canvas::new(4, 2), &bytes).unwrap()
}

fn bilinear(f: &CameraFrame, x: f32, y: f32, edge: EdgePolicy) -> f32 {
    let v = f.view(None).unwrap();
    sample(v.plane(0), 0, x, y, Interpolation::Bilinear, edge, 7)
}

#[test]
fn integer_coordinates_are_exact() {
    let f = ramp();
    assert_eq!(bilinear(&f, 2.0, 1.0, EdgePolicy::default()), 60.0);
    assert_eq!(bilinear(&f, 0.0, 0.0, EdgePolicy::default()), 0.0);
}

#[test]
fn bilinear_interpolates_between_neighbours() {
    let f = ramp();
    assert!((bilinear(&f, 0.5, 0.0, EdgePolicy::default()) - 5.0).abs() < 1e-5);
    assert!((bilinear(&f, 1.5, 0.5, EdgePolicy::default()) - 35.0).abs() < 1e-5);
}

#[test]
fn fill_axis_uses_fill_value_past_the_edge() {
    let f = ramp();
    // Halfway between column 3 (30) and the fill value (7).
    assert!((bilinear(&f, 3.5, 0.0, EdgePolicy::default()) - 18.5).abs() < 1e-5);
    // More than one sample outside: fill outright.
    assert_eq!(bilinear(&f, -1.5, 0.0, EdgePolicy::default()), 7.0);
}

#[test]
fn wrap_axis_wraps_modulo_width() {
    let f = ramp();
    let edge = EdgePolicy::AZIMUTHAL;
    // Halfway between column 3 (30) and column 0 (0).
    assert!((bilinear(&f, 3.5, 0.0, edge) - 15.0).abs() < 1e-5);
    assert_eq!(bilinear(&f, -1.0, 1.0, edge), 70.0);
    assert_eq!(bilinear(&f, 4.0, 0.0, edge), 0.0);
}

#[test]
fn nearest_rounds_to_closest_pixel() {
    let f = ramp();
    let v = f.view(None).unwrap();
    let s = sample(
        v.plane(0),
        0,
        1.6,
        0.4,
        Interpolation::Nearest,
        EdgePolicy::default(),
        0,
    );
    assert_eq!(s, 20.0);
}

#[test]
fn biquadratic_is_exact_on_grid_and_bounded_between() {
    let f = ramp();
    let v = f.view(None).unwrap();
    let at = |x, y| {
        sample(
            v.plane(0),
            0,
            x,
            y,
            Interpolation::Biquadratic,
            EdgePolicy::default(),
            0,
        )
    };
    assert!((at(1.0, 0.0) - 10.0).abs() < 1e-4);
    let mid = at(1.5, 0.5);
    assert!(mid > 10.0 && mid < 60.0);
}

#[test]
fn rgb_luma_is_channel_mean() {
    let f = CameraFrame::from_packed(PixelFormat::Rgb24, Canvas::new(1, 1), &[30, 60, 90]).unwrap();
    let v = f.view(None).unwrap();
    let l = sample_luma(&v, 0.0, 0.0, Interpolation::Bilinear, EdgePolicy::default());
    assert!((l - 60.0).abs() < 1e-5);
}
