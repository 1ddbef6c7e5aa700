use crate::compositor::blend::blend_pixel;
use crate::compositor::sample::{Interpolation, sample};
use crate::foundation::core::{Canvas, PixelRect, RegionRect};
use crate::foundation::error::{StitchError, StitchResult};
use crate::foundation::math::round_to_u8;
use crate::frame::buffer::{CameraFrame, FrameView, InputCrop, PixelFormat, Plane};
use crate::frame::set::FrameSet;
use crate::gain::compensator::GainTable;
use crate::template::model::{BlendMode, MapperTemplate};
use rayon::prelude::*;
use std::sync::Arc;

/// Sampling options shared by every output.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CompositeOpts {
    /// Source sampling filter.
    pub interpolation: Interpolation,
    /// Value taken by neighbours outside a fill axis: one per plane, or one per channel for
    /// `rgb24`. `None` uses the no-signal value.
    pub fill: Option<[u8; 3]>,
    /// Rayon worker count; `None` uses the rayon default.
    pub threads: Option<usize>,
}

/// How templates map onto output frames.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "layout", rename_all = "snake_case")]
pub enum OutputLayout {
    /// One output frame per template, sized by the template.
    #[default]
    Separate,
    /// Every template writes into its region of one shared canvas.
    Merged {
        /// Canvas width.
        width: u32,
        /// Canvas height.
        height: u32,
    },
}

/// One configured output template.
#[derive(Clone, Debug)]
pub struct OutputSpec {
    /// Shared, immutable template.
    pub template: Arc<MapperTemplate>,
    /// Blend mode used for this template's overlaps.
    pub blend: BlendMode,
    /// Placement on a merged canvas.
    pub region: RegionRect,
}

impl OutputSpec {
    /// Use the template's own blend tag.
    pub fn new(template: Arc<MapperTemplate>) -> Self {
        let blend = template.blend_mode();
        let region = template.region();
        Self {
            template,
            blend,
            region,
        }
    }

    /// Override the blend mode.
    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }

    /// Override the merged-canvas placement.
    pub fn with_region(mut self, region: RegionRect) -> Self {
        self.region = region;
        self
    }
}

/// Samples N input frames through M templates.
#[derive(Debug)]
pub struct Compositor {
    format: PixelFormat,
    crop: Option<InputCrop>,
    opts: CompositeOpts,
    outputs: Vec<OutputSpec>,
    inputs: Vec<Canvas>,
    placement: Vec<(usize, PixelRect)>,
    frames: Vec<Canvas>,
    prefill: bool,
    pool: rayon::ThreadPool,
}

impl Compositor {
    /// Validate the output configuration.
    ///
    /// Templates must agree on the number and size of inputs. In a merged layout every
    /// template region resolved on the canvas must have exactly the template's size.
    pub fn new(
        format: PixelFormat,
        crop: Option<InputCrop>,
        outputs: Vec<OutputSpec>,
        layout: OutputLayout,
        opts: CompositeOpts,
    ) -> StitchResult<Self> {
        let Some(first) = outputs.first() else {
            return Err(StitchError::validation("compositor needs at least one template"));
        };
        let inputs = first.template.input_sizes().to_vec();
        for (t, out) in outputs.iter().enumerate() {
            if out.template.input_sizes() != inputs.as_slice() {
                return Err(StitchError::size_mismatch(format!(
                    "template {t} declares inputs {:?}, template 0 declares {:?}",
                    out.template.input_sizes(),
                    inputs
                )));
            }
            format.check_size(out.template.output_size())?;
        }
        for size in &inputs {
            format.check_size(*size)?;
        }

        let (placement, frames, prefill) = match layout {
            OutputLayout::Separate => {
                let placement = outputs
                    .iter()
                    .enumerate()
                    .map(|(t, o)| (t, rect_at_origin(o.template.output_size())))
                    .collect();
                let frames = outputs.iter().map(|o| o.template.output_size()).collect();
                (placement, frames, false)
            }
            OutputLayout::Merged { width, height } => {
                let canvas = Canvas::new(width, height);
                format.check_size(canvas)?;
                let placement = merged_placement(format, canvas, &outputs)?;
                let covered: u64 = placement
                    .iter()
                    .map(|(_, r)| u64::from(r.width) * u64::from(r.height))
                    .sum();
                let overlapping = placement.iter().enumerate().any(|(i, (_, a))| {
                    placement[i + 1..].iter().any(|(_, b)| a.intersects(*b))
                });
                if overlapping {
                    tracing::warn!("merged template regions overlap, later templates win");
                }
                let full = covered == u64::from(width) * u64::from(height) && !overlapping;
                (placement, vec![canvas], !full)
            }
        };

        let pool = build_thread_pool(opts.threads)?;
        tracing::debug!(
            format = ?format,
            templates = outputs.len(),
            frames = frames.len(),
            "compositor ready"
        );
        Ok(Self {
            format,
            crop,
            opts,
            outputs,
            inputs,
            placement,
            frames,
            prefill,
            pool,
        })
    }

    /// Pixel format of inputs and outputs.
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Number of inputs every frame set must carry.
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Expected size of every input after cropping.
    pub fn input_sizes(&self) -> &[Canvas] {
        &self.inputs
    }

    /// Sizes of the frames produced per cycle.
    pub fn output_sizes(&self) -> &[Canvas] {
        &self.frames
    }

    /// Configured outputs.
    pub fn outputs(&self) -> &[OutputSpec] {
        &self.outputs
    }

    /// Templates in output order.
    pub fn templates(&self) -> impl Iterator<Item = &MapperTemplate> {
        self.outputs.iter().map(|o| o.template.as_ref())
    }

    /// Check a frame set against the configuration and view it through the crop.
    pub fn prepare<'f>(&self, inputs: &'f FrameSet) -> StitchResult<Vec<FrameView<'f>>> {
        if inputs.len() != self.inputs.len() {
            return Err(StitchError::size_mismatch(format!(
                "frame set has {} frames, templates expect {}",
                inputs.len(),
                self.inputs.len()
            )));
        }
        inputs
            .frames()
            .iter()
            .zip(&self.inputs)
            .enumerate()
            .map(|(i, (frame, expected))| {
                if frame.format() != self.format {
                    return Err(StitchError::size_mismatch(format!(
                        "input {i} is {:?}, expected {:?}",
                        frame.format(),
                        self.format
                    )));
                }
                let view = frame.view(self.crop)?;
                if view.size() != *expected {
                    return Err(StitchError::size_mismatch(format!(
                        "input {i} is {} after crop, template expects {expected}",
                        view.size()
                    )));
                }
                Ok(view)
            })
            .collect()
    }

    /// Composite into freshly allocated frames.
    pub fn composite(&self, inputs: &FrameSet, gains: &GainTable) -> StitchResult<Vec<CameraFrame>> {
        let mut outputs = self
            .frames
            .iter()
            .map(|size| CameraFrame::new(self.format, *size))
            .collect::<StitchResult<Vec<_>>>()?;
        self.composite_into(inputs, gains, &mut outputs)?;
        Ok(outputs)
    }

    /// Composite into caller-provided frames.
    ///
    /// # Panics
    ///
    /// When `outputs` does not match [`Compositor::output_sizes`] in count, size or format.
    pub fn composite_into(
        &self,
        inputs: &FrameSet,
        gains: &GainTable,
        outputs: &mut [CameraFrame],
    ) -> StitchResult<()> {
        self.check_gains(gains)?;
        let views = self.prepare(inputs)?;
        self.render(&views, gains, outputs);
        Ok(())
    }

    /// A gain table needs one row per template and one gain per input.
    fn check_gains(&self, gains: &GainTable) -> StitchResult<()> {
        if gains.templates() != self.outputs.len() {
            return Err(StitchError::size_mismatch(format!(
                "gain table covers {} templates, compositor has {}",
                gains.templates(),
                self.outputs.len()
            )));
        }
        for t in 0..gains.templates() {
            let row = gains.for_template(t).len();
            if row != self.inputs.len() {
                return Err(StitchError::size_mismatch(format!(
                    "gain row {t} has {row} gains for {} inputs",
                    self.inputs.len()
                )));
            }
        }
        Ok(())
    }

    /// Write every template into `outputs` from already prepared views.
    #[tracing::instrument(skip_all, fields(templates = self.outputs.len()))]
    pub(crate) fn render(&self, views: &[FrameView<'_>], gains: &GainTable, outputs: &mut [CameraFrame]) {
        assert_eq!(outputs.len(), self.frames.len(), "output frame count");
        for (out, size) in outputs.iter_mut().zip(&self.frames) {
            assert_eq!(out.size(), *size, "output frame size");
            assert_eq!(out.format(), self.format, "output frame format");
            if self.prefill {
                out.fill_no_signal();
            }
        }

        self.pool.install(|| {
            for (t, (frame, rect)) in self.placement.iter().enumerate() {
                let spec = &self.outputs[t];
                let gain = gains.for_template(t);
                let target = &mut outputs[*frame];
                self.render_primary(spec, views, gain, target.plane_mut(0), *rect);
                if self.format.is_chroma_subsampled() {
                    let (_, chroma) = target.planes_mut().split_at_mut(1);
                    let (u, v) = chroma.split_at_mut(1);
                    self.render_chroma(spec, views, &mut u[0], &mut v[0], *rect);
                }
            }
        });
    }

    fn fill(&self, plane: usize, ch: usize) -> u8 {
        match (self.opts.fill, self.format) {
            (Some(f), PixelFormat::Rgb24) => f[ch],
            (Some(f), _) => f[plane],
            (None, format) => format.no_signal(plane),
        }
    }

    /// Luma, gray or packed RGB plane; gain applies to every channel here.
    fn render_primary(
        &self,
        spec: &OutputSpec,
        views: &[FrameView<'_>],
        gain: &[f32],
        plane: &mut Plane,
        rect: PixelRect,
    ) {
        let template = spec.template.as_ref();
        let edge = template.edge_policy();
        let channels = self.format.channels(0);
        let sentinel = self.format.no_signal(0);
        let interpolation = self.opts.interpolation;
        let fills: Vec<u8> = (0..channels).map(|ch| self.fill(0, ch)).collect();
        let tw = rect.width as usize;
        let (x0, y0) = (rect.x as usize * channels, rect.y as usize);
        let stride = plane.stride;

        plane
            .data
            .par_chunks_mut(stride)
            .skip(y0)
            .take(rect.height as usize)
            .enumerate()
            .for_each(|(y, row)| {
                let row = &mut row[x0..x0 + tw * channels];
                for x in 0..tw {
                    let entries = template.lookup_index(y * tw + x);
                    for ch in 0..channels {
                        let value = blend_pixel(spec.blend, entries, |s| {
                            let src = usize::from(s.source);
                            let v = sample(
                                views[src].plane(0),
                                ch,
                                s.x,
                                s.y,
                                interpolation,
                                edge,
                                fills[ch],
                            );
                            v * gain[src]
                        });
                        row[x * channels + ch] = value.map_or(sentinel, round_to_u8);
                    }
                }
            });
    }

    /// Both chroma planes at half resolution, one value per 2x2 luma block, without gain.
    fn render_chroma(
        &self,
        spec: &OutputSpec,
        views: &[FrameView<'_>],
        u: &mut Plane,
        v: &mut Plane,
        rect: PixelRect,
    ) {
        let template = spec.template.as_ref();
        let edge = template.edge_policy();
        let interpolation = self.opts.interpolation;
        let tw = rect.width as usize;
        let (cw, ch) = (tw / 2, rect.height as usize / 2);
        let (cx0, cy0) = (rect.x as usize / 2, rect.y as usize / 2);
        let sentinel = [self.format.no_signal(1), self.format.no_signal(2)];
        let fills = [self.fill(1, 0), self.fill(2, 0)];
        let (us, vs) = (u.stride, v.stride);

        u.data
            .par_chunks_mut(us)
            .zip(v.data.par_chunks_mut(vs))
            .skip(cy0)
            .take(ch)
            .enumerate()
            .for_each(|(cy, (urow, vrow))| {
                let mut rows = [&mut urow[cx0..cx0 + cw], &mut vrow[cx0..cx0 + cw]];
                for cx in 0..cw {
                    let entries = template.lookup_index(2 * cy * tw + 2 * cx);
                    for (p, row) in rows.iter_mut().enumerate() {
                        let value = blend_pixel(spec.blend, entries, |s| {
                            sample(
                                views[usize::from(s.source)].plane(p + 1),
                                0,
                                s.x * 0.5,
                                s.y * 0.5,
                                interpolation,
                                edge,
                                fills[p],
                            )
                        });
                        row[cx] = value.map_or(sentinel[p], round_to_u8);
                    }
                }
            });
    }
}

fn rect_at_origin(size: Canvas) -> PixelRect {
    PixelRect {
        x: 0,
        y: 0,
        width: size.width,
        height: size.height,
    }
}

fn merged_placement(
    format: PixelFormat,
    canvas: Canvas,
    outputs: &[OutputSpec],
) -> StitchResult<Vec<(usize, PixelRect)>> {
    outputs
        .iter()
        .enumerate()
        .map(|(t, out)| {
            let rect = out.region.to_pixels(canvas);
            let size = out.template.output_size();
            if rect.size() != size || !rect.fits(canvas) {
                return Err(StitchError::size_mismatch(format!(
                    "template {t} is {size} but its region covers {} of the {canvas} canvas",
                    rect.size()
                )));
            }
            if format.is_chroma_subsampled() && (rect.x % 2 != 0 || rect.y % 2 != 0) {
                return Err(StitchError::validation(format!(
                    "template {t} region starts at odd offset ({}, {}) on a chroma-subsampled canvas",
                    rect.x, rect.y
                )));
            }
            Ok((0, rect))
        })
        .collect()
}

fn build_thread_pool(threads: Option<usize>) -> StitchResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(StitchError::validation(
            "compositor 'threads' must be >= 1 when set",
        ));
    }

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| StitchError::exhausted(format!("failed to build rayon thread pool: {e}")))
}

#[cfg(test)]
#[path = "../../tests/unit/compositor/engine.rs"]
mod tests;
