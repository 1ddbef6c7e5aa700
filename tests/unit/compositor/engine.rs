use super::*;
use crate::foundation::core::RegionRect;
use crate::template::model::{EdgeMode, EdgePolicy, SourceSample, TemplateBuilder};

fn gray(size: Canvas, bytes: &[u8]) -> CameraFrame {
    CameraFrame::from_packed(PixelFormat::Gray8, size, bytes).unwrap()
}

fn scenario_template() -> Arc<MapperTemplate> {
    let size = Canvas::new(2, 2);
    let mut b = TemplateBuilder::new(size, vec![size, size]);
    b.map_single(0, 0, 0, 0.0, 0.0);
    b.set(
        1,
        1,
        [
            SourceSample::new(0, 0.0, 0.0, 0.5),
            SourceSample::new(1, 1.0, 1.0, 0.5),
        ],
    );
    Arc::new(b.build().unwrap())
}

fn separate(format: PixelFormat, templates: Vec<Arc<MapperTemplate>>) -> Compositor {
    let outputs = templates.into_iter().map(OutputSpec::new).collect();
    Compositor::new(
        format,
        None,
        outputs,
        OutputLayout::Separate,
        CompositeOpts::default(),
    )
    .unwrap()
}

#[test]
fn two_by_two_scenario() {
    let size = Canvas::new(2, 2);
    let c = separate(PixelFormat::Gray8, vec![scenario_template()]);
    let set = FrameSet::new(vec![
        gray(size, &[10, 20, 30, 40]),
        gray(size, &[50, 60, 70, 80]),
    ]);
    let out = c.composite(&set, &GainTable::unity(1, 2)).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].pixel(0, 0, 0, 0), 10);
    assert_eq!(out[0].pixel(0, 0, 1, 1), 45);
    assert_eq!(out[0].pixel(0, 0, 1, 0), 0);
    assert_eq!(out[0].pixel(0, 0, 0, 1), 0);
}

#[test]
fn overlap_applies_gain_before_weighting() {
    let size = Canvas::new(1, 1);
    let mut b = TemplateBuilder::new(size, vec![size, size]);
    b.set(
        0,
        0,
        [
            SourceSample::new(0, 0.0, 0.0, 0.25),
            SourceSample::new(1, 0.0, 0.0, 0.75),
        ],
    );
    let c = separate(PixelFormat::Gray8, vec![Arc::new(b.build().unwrap())]);
    let set = FrameSet::new(vec![gray(size, &[100]), gray(size, &[200])]);
    let mut gains = GainTable::unity(1, 2);
    gains.set(0, &[1.2, 0.8]);
    let out = c.composite(&set, &gains).unwrap();
    // 0.25 * 1.2 * 100 + 0.75 * 0.8 * 200 = 30 + 120
    assert_eq!(out[0].pixel(0, 0, 0, 0), 150);

    gains.set(0, &[2.0, 2.0]);
    let out = c.composite(&set, &gains).unwrap();
    assert_eq!(out[0].pixel(0, 0, 0, 0), 255);
}

#[test]
fn hard_seam_takes_the_heavier_source() {
    let size = Canvas::new(1, 1);
    let mut b = TemplateBuilder::new(size, vec![size, size]);
    b.set(
        0,
        0,
        [
            SourceSample::new(0, 0.0, 0.0, 0.4),
            SourceSample::new(1, 0.0, 0.0, 0.6),
        ],
    );
    let spec = OutputSpec::new(Arc::new(b.build().unwrap())).with_blend(BlendMode::HardSeam);
    let c = Compositor::new(
        PixelFormat::Gray8,
        None,
        vec![spec],
        OutputLayout::Separate,
        CompositeOpts::default(),
    )
    .unwrap();
    let set = FrameSet::new(vec![gray(size, &[10]), gray(size, &[90])]);
    let out = c.composite(&set, &GainTable::unity(1, 2)).unwrap();
    assert_eq!(out[0].pixel(0, 0, 0, 0), 90);
}

#[test]
fn yuv_chroma_follows_top_left_of_each_block() {
    let size = Canvas::new(2, 2);
    let mut b = TemplateBuilder::new(size, vec![size]);
    b.map_single(0, 0, 0, 0.0, 0.0);
    let mapped = Arc::new(b.build().unwrap());

    let mut b = TemplateBuilder::new(size, vec![size]);
    b.map_single(1, 1, 0, 1.0, 1.0);
    let corner_only = Arc::new(b.build().unwrap());

    let c = separate(PixelFormat::Yuv420p, vec![mapped, corner_only]);
    let input = CameraFrame::from_packed(PixelFormat::Yuv420p, size, &[200, 201, 202, 203, 30, 220])
        .unwrap();
    let out = c
        .composite(&FrameSet::new(vec![input]), &GainTable::unity(2, 1))
        .unwrap();

    assert_eq!(out[0].pixel(0, 0, 0, 0), 200);
    assert_eq!(out[0].pixel(0, 0, 1, 1), 0);
    assert_eq!(out[0].pixel(1, 0, 0, 0), 30);
    assert_eq!(out[0].pixel(2, 0, 0, 0), 220);

    assert_eq!(out[1].pixel(0, 0, 1, 1), 203);
    assert_eq!(out[1].pixel(1, 0, 0, 0), 128);
    assert_eq!(out[1].pixel(2, 0, 0, 0), 128);
}

#[test]
fn chroma_is_not_gained() {
    let size = Canvas::new(2, 2);
    let mut b = TemplateBuilder::new(size, vec![size]);
    b.map_single(0, 0, 0, 0.0, 0.0);
    let c = separate(PixelFormat::Yuvj420p, vec![Arc::new(b.build().unwrap())]);
    let input =
        CameraFrame::from_packed(PixelFormat::Yuvj420p, size, &[100, 0, 0, 0, 60, 70]).unwrap();
    let mut gains = GainTable::unity(1, 1);
    gains.set(0, &[1.5]);
    let out = c.composite(&FrameSet::new(vec![input]), &gains).unwrap();
    assert_eq!(out[0].pixel(0, 0, 0, 0), 150);
    assert_eq!(out[0].pixel(1, 0, 0, 0), 60);
    assert_eq!(out[0].pixel(2, 0, 0, 0), 70);
}

#[test]
fn rgb_gain_scales_every_channel() {
    let size = Canvas::new(1, 1);
    let mut b = TemplateBuilder::new(size, vec![size]);
    b.map_single(0, 0, 0, 0.0, 0.0);
    let c = separate(PixelFormat::Rgb24, vec![Arc::new(b.build().unwrap())]);
    let input = CameraFrame::from_packed(PixelFormat::Rgb24, size, &[10, 20, 30]).unwrap();
    let mut gains = GainTable::unity(1, 1);
    gains.set(0, &[2.0]);
    let out = c.composite(&FrameSet::new(vec![input]), &gains).unwrap();
    assert_eq!(out[0].plane(0).data, vec![20, 40, 60]);
}

#[test]
fn wrap_axis_blends_across_the_seam() {
    let src = Canvas::new(4, 1);
    let out = Canvas::new(1, 1);
    let mut b = TemplateBuilder::new(out, vec![src]).edge(EdgePolicy {
        x: EdgeMode::Wrap,
        y: EdgeMode::Fill,
    });
    b.map_single(0, 0, 0, 3.5, 0.0);
    let wrap = Arc::new(b.build().unwrap());

    let mut b = TemplateBuilder::new(out, vec![src]);
    b.map_single(0, 0, 0, 3.5, 0.0);
    let fill = Arc::new(b.build().unwrap());

    let c = Compositor::new(
        PixelFormat::Gray8,
        None,
        vec![OutputSpec::new(wrap), OutputSpec::new(fill)],
        OutputLayout::Separate,
        CompositeOpts {
            fill: Some([40, 0, 0]),
            ..CompositeOpts::default()
        },
    )
    .unwrap();
    let set = FrameSet::new(vec![gray(src, &[100, 0, 0, 200])]);
    let out = c.composite(&set, &GainTable::unity(2, 1)).unwrap();
    assert_eq!(out[0].pixel(0, 0, 0, 0), 150);
    assert_eq!(out[1].pixel(0, 0, 0, 0), 120);
}

#[test]
fn merged_layout_places_templates_by_region() {
    let size = Canvas::new(2, 2);
    let left = {
        let mut b = TemplateBuilder::new(size, vec![size])
            .region(RegionRect::new(0.0, 0.0, 0.5, 1.0).unwrap());
        b.map_single(0, 0, 0, 0.0, 0.0);
        Arc::new(b.build().unwrap())
    };
    let right = {
        let mut b = TemplateBuilder::new(size, vec![size])
            .region(RegionRect::new(0.5, 0.0, 0.5, 1.0).unwrap());
        b.map_single(1, 1, 0, 1.0, 1.0);
        Arc::new(b.build().unwrap())
    };
    let c = Compositor::new(
        PixelFormat::Gray8,
        None,
        vec![OutputSpec::new(left), OutputSpec::new(right)],
        OutputLayout::Merged {
            width: 4,
            height: 2,
        },
        CompositeOpts::default(),
    )
    .unwrap();
    assert_eq!(c.output_sizes(), &[Canvas::new(4, 2)]);

    let set = FrameSet::new(vec![gray(size, &[7, 0, 0, 9])]);
    let out = c.composite(&set, &GainTable::unity(2, 1)).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].plane(0).data, vec![7, 0, 0, 0, 0, 0, 0, 9]);
}

#[test]
fn merged_region_must_match_template_size() {
    let size = Canvas::new(2, 2);
    let t = Arc::new(TemplateBuilder::new(size, vec![size]).build().unwrap());
    let err = Compositor::new(
        PixelFormat::Gray8,
        None,
        vec![OutputSpec::new(t)],
        OutputLayout::Merged {
            width: 4,
            height: 2,
        },
        CompositeOpts::default(),
    )
    .unwrap_err();
    assert!(matches!(err, StitchError::SizeMismatch(_)));
}

#[test]
fn templates_must_agree_on_inputs() {
    let a = Arc::new(
        TemplateBuilder::new(Canvas::new(2, 2), vec![Canvas::new(2, 2)])
            .build()
            .unwrap(),
    );
    let b = Arc::new(
        TemplateBuilder::new(Canvas::new(2, 2), vec![Canvas::new(4, 2)])
            .build()
            .unwrap(),
    );
    let err = Compositor::new(
        PixelFormat::Gray8,
        None,
        vec![OutputSpec::new(a), OutputSpec::new(b)],
        OutputLayout::Separate,
        CompositeOpts::default(),
    )
    .unwrap_err();
    assert!(matches!(err, StitchError::SizeMismatch(_)));
}

#[test]
fn input_size_is_checked_after_crop() {
    let t = Arc::new({
        let mut b = TemplateBuilder::new(Canvas::new(1, 1), vec![Canvas::new(2, 1)]);
        b.map_single(0, 0, 0, 0.0, 0.0);
        b.build().unwrap()
    });
    let cropped = Compositor::new(
        PixelFormat::Gray8,
        Some(InputCrop { x: 1, width: 2 }),
        vec![OutputSpec::new(t.clone())],
        OutputLayout::Separate,
        CompositeOpts::default(),
    )
    .unwrap();
    let wide = FrameSet::new(vec![gray(Canvas::new(3, 1), &[1, 2, 3])]);
    let out = cropped.composite(&wide, &GainTable::unity(1, 1)).unwrap();
    assert_eq!(out[0].pixel(0, 0, 0, 0), 2);

    let plain = separate(PixelFormat::Gray8, vec![t]);
    let err = plain.composite(&wide, &GainTable::unity(1, 1)).unwrap_err();
    assert!(matches!(err, StitchError::SizeMismatch(_)));
    let err = plain
        .composite(&FrameSet::new(vec![]), &GainTable::unity(1, 1))
        .unwrap_err();
    assert!(matches!(err, StitchError::SizeMismatch(_)));
}

#[test]
#[should_panic(expected = "output frame size")]
fn wrong_output_buffer_is_a_precondition_violation() {
    let size = Canvas::new(2, 2);
    let c = separate(PixelFormat::Gray8, vec![scenario_template()]);
    let set = FrameSet::new(vec![gray(size, &[0; 4]), gray(size, &[0; 4])]);
    let mut outputs = vec![CameraFrame::new(PixelFormat::Gray8, Canvas::new(4, 4)).unwrap()];
    let _ = c.composite_into(&set, &GainTable::unity(1, 2), &mut outputs);
}

#[test]
fn zero_threads_is_rejected() {
    let err = Compositor::new(
        PixelFormat::Gray8,
        None,
        vec![OutputSpec::new(scenario_template())],
        OutputLayout::Separate,
        CompositeOpts {
            threads: Some(0),
            ..CompositeOpts::default()
        },
    )
    .unwrap_err();
    assert!(matches!(err, StitchError::Validation(_)));
}

#[test]
fn region_override_moves_a_template_on_the_canvas() {
    let size = Canvas::new(2, 2);
    let mut b = TemplateBuilder::new(size, vec![size]);
    b.map_single(0, 0, 0, 0.0, 0.0);
    let spec = OutputSpec::new(Arc::new(b.build().unwrap()))
        .with_region(RegionRect::new(0.5, 0.0, 0.5, 1.0).unwrap());
    let c = Compositor::new(
        PixelFormat::Gray8,
        None,
        vec![spec],
        OutputLayout::Merged {
            width: 4,
            height: 2,
        },
        CompositeOpts::default(),
    )
    .unwrap();
    let set = FrameSet::new(vec![gray(size, &[5, 0, 0, 0])]);
    let out = c.composite(&set, &GainTable::unity(1, 1)).unwrap();
    assert_eq!(out[0].plane(0).data, vec![0, 0, 5, 0, 0, 0, 0, 0]);
}

#[test]
fn gain_table_shape_is_checked() {
    let size = Canvas::new(2, 2);
    let c = separate(PixelFormat::Gray8, vec![scenario_template()]);
    let set = FrameSet::new(vec![
        gray(size, &[10, 20, 30, 40]),
        gray(size, &[50, 60, 70, 80]),
    ]);
    for gains in [
        GainTable::unity(1, 1),
        GainTable::unity(0, 2),
        GainTable::unity(2, 2),
    ] {
        assert!(matches!(
            c.composite(&set, &gains),
            Err(StitchError::SizeMismatch(_))
        ));
    }
    assert!(c.composite(&set, &GainTable::unity(1, 2)).is_ok());
}
