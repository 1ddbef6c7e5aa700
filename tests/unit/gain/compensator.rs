use super::*;
use crate::foundation::core::Canvas;
use crate::frame::buffer::{CameraFrame, PixelFormat};
use crate::gain::mode::{AdaptiveGainOpts, GainSchedule};
use crate::template::model::{SourceSample, TemplateBuilder};

fn gray(width: u32, value: u8) -> CameraFrame {
    let size = Canvas::new(width, 1);
    CameraFrame::from_packed(PixelFormat::Gray8, size, &vec![value; width as usize]).unwrap()
}

fn overlap_template(width: u32) -> MapperTemplate {
    let size = Canvas::new(width, 1);
    let mut b = TemplateBuilder::new(size, vec![size, size]);
    for x in 0..width {
        b.set(
            x,
            0,
            [
                SourceSample::new(0, x as f32, 0.0, 0.5),
                SourceSample::new(1, x as f32, 0.0, 0.5),
            ],
        );
    }
    b.build().unwrap()
}

#[test]
fn disabled_mode_is_unity_for_any_brightness() {
    let t = overlap_template(4);
    let mut g = GainCompensator::new(vec![GainMode::Disabled], 2, Interpolation::Bilinear).unwrap();
    for (a, b) in [(0u8, 255u8), (10, 200), (255, 255)] {
        let frames = [gray(4, a), gray(4, b)];
        let views: Vec<_> = frames.iter().map(|f| f.view(None).unwrap()).collect();
        let table = g.update(&views, [&t]).unwrap();
        assert_eq!(table.for_template(0), &[1.0, 1.0]);
    }
    assert_eq!(g.frames_observed(), 3);
}

#[test]
fn adaptive_mode_converges_with_smoothing() {
    let t = overlap_template(4);
    let opts = AdaptiveGainOpts {
        interval_frames: 1,
        smoothing: 0.5,
        ..AdaptiveGainOpts::default()
    };
    let mut g =
        GainCompensator::new(vec![GainMode::Adaptive(opts)], 2, Interpolation::Bilinear).unwrap();
    let frames = [gray(4, 100), gray(4, 150)];
    let views: Vec<_> = frames.iter().map(|f| f.view(None).unwrap()).collect();

    let first = g.update(&views, [&t]).unwrap().for_template(0).to_vec();
    assert!((first[0] - 1.0645).abs() < 1e-3, "{first:?}");
    assert!((first[1] - 0.9032).abs() < 1e-3, "{first:?}");

    for _ in 0..30 {
        g.update(&views, [&t]).unwrap();
    }
    let settled = g.gains().for_template(0);
    assert!((settled[0] - 1.129).abs() < 1e-2, "{settled:?}");
    assert!((settled[1] - 0.806).abs() < 1e-2, "{settled:?}");
}

#[test]
fn adaptive_mode_holds_gains_between_recomputations() {
    let t = overlap_template(4);
    let opts = AdaptiveGainOpts {
        warmup_frames: 1,
        interval_frames: 10,
        smoothing: 1.0,
        ..AdaptiveGainOpts::default()
    };
    let mut g =
        GainCompensator::new(vec![GainMode::Adaptive(opts)], 2, Interpolation::Bilinear).unwrap();
    let frames = [gray(4, 100), gray(4, 150)];
    let views: Vec<_> = frames.iter().map(|f| f.view(None).unwrap()).collect();

    assert_eq!(g.update(&views, [&t]).unwrap().for_template(0), &[1.0, 1.0]);
    let solved = g.update(&views, [&t]).unwrap().for_template(0).to_vec();
    assert_ne!(solved, vec![1.0, 1.0]);

    let swapped = [gray(4, 150), gray(4, 100)];
    let views: Vec<_> = swapped.iter().map(|f| f.view(None).unwrap()).collect();
    for _ in 0..5 {
        assert_eq!(g.update(&views, [&t]).unwrap().for_template(0), solved.as_slice());
    }
}

#[test]
fn adaptive_gains_are_clamped() {
    let t = overlap_template(4);
    let opts = AdaptiveGainOpts {
        interval_frames: 1,
        smoothing: 1.0,
        min_gain: 0.95,
        max_gain: 1.05,
        ..AdaptiveGainOpts::default()
    };
    let mut g =
        GainCompensator::new(vec![GainMode::Adaptive(opts)], 2, Interpolation::Bilinear).unwrap();
    let frames = [gray(4, 100), gray(4, 150)];
    let views: Vec<_> = frames.iter().map(|f| f.view(None).unwrap()).collect();
    assert_eq!(g.update(&views, [&t]).unwrap().for_template(0), &[1.05, 0.95]);
}

#[test]
fn static_and_scheduled_modes_follow_their_values() {
    let t = overlap_template(2);
    let schedule = GainSchedule {
        rows: vec![vec![1.0, 1.0], vec![1.2, 0.8]],
    };
    let mut g = GainCompensator::new(
        vec![
            GainMode::Static {
                gains: vec![0.9, 1.1],
            },
            GainMode::Scheduled(schedule),
        ],
        2,
        Interpolation::Nearest,
    )
    .unwrap();
    let frames = [gray(2, 100), gray(2, 100)];
    let views: Vec<_> = frames.iter().map(|f| f.view(None).unwrap()).collect();

    let table = g.update(&views, [&t, &t]).unwrap();
    assert_eq!(table.for_template(0), &[0.9, 1.1]);
    assert_eq!(table.for_template(1), &[1.0, 1.0]);
    for _ in 0..3 {
        let table = g.update(&views, [&t, &t]).unwrap();
        assert_eq!(table.for_template(1), &[1.2, 0.8]);
    }
}

#[test]
fn wrong_frame_or_template_count_is_rejected() {
    let t = overlap_template(2);
    let mut g = GainCompensator::new(vec![GainMode::Disabled], 2, Interpolation::Bilinear).unwrap();
    let frames = [gray(2, 1)];
    let views: Vec<_> = frames.iter().map(|f| f.view(None).unwrap()).collect();
    assert!(matches!(
        g.update(&views, [&t]),
        Err(StitchError::SizeMismatch(_))
    ));

    let frames = [gray(2, 1), gray(2, 1)];
    let views: Vec<_> = frames.iter().map(|f| f.view(None).unwrap()).collect();
    assert!(g.update(&views, [&t, &t]).is_err());
    assert!(g.update(&views, std::iter::empty()).is_err());
    assert_eq!(g.frames_observed(), 0);
}

#[test]
fn gain_table_defaults_to_unity_for_unknown_indices() {
    let mut table = GainTable::unity(1, 2);
    table.set(0, &[1.5, 0.5]);
    assert_eq!(table.get(0, 0), 1.5);
    assert_eq!(table.get(0, 9), 1.0);
    assert_eq!(table.get(3, 0), 1.0);
}

#[test]
fn rejected_template_count_leaves_gains_untouched() {
    let t = overlap_template(2);
    let adaptive = AdaptiveGainOpts {
        interval_frames: 1,
        ..AdaptiveGainOpts::default()
    };
    let mut g = GainCompensator::new(
        vec![
            GainMode::Static {
                gains: vec![2.0, 0.5],
            },
            GainMode::Adaptive(adaptive),
        ],
        2,
        Interpolation::Nearest,
    )
    .unwrap();
    let frames = [gray(2, 100), gray(2, 150)];
    let views: Vec<_> = frames.iter().map(|f| f.view(None).unwrap()).collect();

    assert!(matches!(
        g.update(&views, [&t]),
        Err(StitchError::Validation(_))
    ));
    assert!(g.update(&views, [&t, &t, &t]).is_err());
    assert_eq!(g.gains(), &GainTable::unity(2, 2));
    assert_eq!(g.frames_observed(), 0);

    let table = g.update(&views, [&t, &t]).unwrap();
    assert_eq!(table.for_template(0), &[2.0, 0.5]);
    assert!(table.for_template(1)[0] > 1.0);
}
