use super::*;
use crate::compositor::engine::{CompositeOpts, Compositor, OutputLayout, OutputSpec};
use crate::compositor::sample::Interpolation;
use crate::foundation::core::Canvas;
use crate::frame::buffer::PixelFormat;
use crate::frame::pool::FramePoolOpts;
use crate::gain::compensator::GainCompensator;
use crate::gain::mode::GainMode;
use crate::template::model::TemplateBuilder;
use std::sync::Arc;

fn pipeline() -> StitchPipeline {
    let size = Canvas::new(2, 2);
    let mut b = TemplateBuilder::new(size, vec![size]);
    for y in 0..2 {
        for x in 0..2 {
            b.map_single(x, y, 0, x as f32, y as f32);
        }
    }
    let compositor = Compositor::new(
        PixelFormat::Gray8,
        None,
        vec![OutputSpec::new(Arc::new(b.build().unwrap()))],
        OutputLayout::Separate,
        CompositeOpts::default(),
    )
    .unwrap();
    let gains = GainCompensator::new(vec![GainMode::Disabled], 1, Interpolation::Bilinear).unwrap();
    let stitcher = Stitcher::new(compositor, gains, None, FramePoolOpts::default()).unwrap();
    StitchPipeline::new(stitcher).unwrap()
}

fn set_of(value: u8) -> FrameSet {
    let frame =
        CameraFrame::from_packed(PixelFormat::Gray8, Canvas::new(2, 2), &[value; 4]).unwrap();
    FrameSet::new(vec![frame])
}

fn value_of(frame: &StitchedFrame) -> u8 {
    frame.outputs[0].pixel(0, 0, 0, 0)
}

#[test]
fn first_submit_only_primes() {
    let mut p = pipeline();
    p.submit(set_of(1)).unwrap();
    assert_eq!(p.state(), PipelineState::Primed);
    assert!(p.retrieve().unwrap().is_none());
}

#[test]
fn second_submit_releases_the_first_result() {
    let mut p = pipeline();
    p.submit(set_of(1)).unwrap();
    p.submit(set_of(2)).unwrap();
    let r = p.retrieve().unwrap().unwrap();
    assert_eq!(r.seq, FrameSeq(0));
    assert_eq!(value_of(&r), 1);
    assert_eq!(r.inputs.frames()[0].pixel(0, 0, 0, 0), 1);
}

#[test]
fn results_follow_submission_order_and_drain() {
    let mut p = pipeline();
    let mut seen = Vec::new();
    for v in 1..=6u8 {
        p.submit(set_of(v * 10)).unwrap();
        if let Some(r) = p.retrieve().unwrap() {
            seen.push(value_of(&r));
        }
    }
    let last = p.flush().unwrap().unwrap();
    seen.push(value_of(&last));
    assert_eq!(seen, vec![10, 20, 30, 40, 50, 60]);

    assert!(p.retrieve().unwrap().is_none());
    assert_eq!(p.state(), PipelineState::Empty);
    let stats = p.stats();
    assert_eq!(stats.submitted, 6);
    assert_eq!(stats.retrieved, 6);
}

#[test]
fn submit_over_an_unretrieved_result_is_a_protocol_error() {
    let mut p = pipeline();
    p.submit(set_of(1)).unwrap();
    p.submit(set_of(2)).unwrap();
    let err = p.submit(set_of(3)).unwrap_err();
    assert!(matches!(err, StitchError::Pipeline(_)));
    assert_eq!(value_of(&p.retrieve().unwrap().unwrap()), 1);
    p.submit(set_of(3)).unwrap();
    assert_eq!(value_of(&p.retrieve().unwrap().unwrap()), 2);
}

#[test]
fn wrong_input_count_is_rejected_before_queueing() {
    let mut p = pipeline();
    let err = p.submit(FrameSet::new(Vec::new())).unwrap_err();
    assert!(matches!(err, StitchError::SizeMismatch(_)));
    assert_eq!(p.state(), PipelineState::Empty);
}

#[test]
fn composition_failure_is_reported_for_its_cycle() {
    let mut p = pipeline();
    let wrong = CameraFrame::new(PixelFormat::Gray8, Canvas::new(4, 4)).unwrap();
    p.submit(FrameSet::new(vec![wrong])).unwrap();
    p.submit(set_of(7)).unwrap();
    let err = p.retrieve().unwrap_err();
    assert!(matches!(err, StitchError::SizeMismatch(_)));
    let r = p.flush().unwrap().unwrap();
    assert_eq!(value_of(&r), 7);
}

#[test]
fn recycled_outputs_return_to_the_pool() {
    let mut p = pipeline();
    p.submit(set_of(1)).unwrap();
    p.submit(set_of(2)).unwrap();
    let r0 = p.retrieve().unwrap().unwrap();
    p.recycle(r0.outputs).unwrap();
    p.submit(set_of(3)).unwrap();
    let r1 = p.retrieve().unwrap().unwrap();
    p.recycle(r1.outputs).unwrap();
    p.submit(set_of(4)).unwrap();
    let r2 = p.retrieve().unwrap().unwrap();
    assert_eq!(value_of(&r2), 3);
    assert_eq!(p.stats().pool.alloc_frames, 2);
}

#[test]
fn failed_hand_off_to_the_worker_leaves_slots_untouched() {
    let mut p = pipeline();
    p.worker.shutdown().unwrap();
    assert!(matches!(
        p.submit(set_of(1)),
        Err(StitchError::Pipeline(_))
    ));
    assert_eq!(p.state(), PipelineState::Empty);
    assert_eq!(p.stats().submitted, 0);
    assert!(p.retrieve().unwrap().is_none());
}
