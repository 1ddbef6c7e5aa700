use crate::compositor::sample::{Interpolation, sample_luma};
use crate::foundation::error::{StitchError, StitchResult};
use crate::frame::buffer::FrameView;
use crate::gain::mode::GainMode;
use crate::gain::solve::{OverlapStats, solve_gains};
use crate::template::model::MapperTemplate;

/// Gain multipliers per output template per source.
#[derive(Clone, Debug, PartialEq)]
pub struct GainTable {
    gains: Vec<Vec<f32>>,
}

impl GainTable {
    /// All gains 1.
    pub fn unity(templates: usize, sources: usize) -> Self {
        Self {
            gains: vec![vec![1.0; sources]; templates],
        }
    }

    /// Number of templates covered.
    pub fn templates(&self) -> usize {
        self.gains.len()
    }

    /// Gains of every source for one template.
    ///
    /// # Panics
    ///
    /// When `template` is not below [`GainTable::templates`].
    pub fn for_template(&self, template: usize) -> &[f32] {
        &self.gains[template]
    }

    /// Gain of `source` in `template`; 1 when either index is unknown.
    pub fn get(&self, template: usize, source: usize) -> f32 {
        self.gains
            .get(template)
            .and_then(|g| g.get(source))
            .copied()
            .unwrap_or(1.0)
    }

    /// Replace the gains of one template.
    pub fn set(&mut self, template: usize, gains: &[f32]) {
        let row = &mut self.gains[template];
        assert_eq!(row.len(), gains.len(), "gain row length");
        row.copy_from_slice(gains);
    }
}

#[derive(Debug)]
struct TemplateGain {
    mode: GainMode,
    recomputed: u32,
}

/// Keeps per-template gain state across frames.
///
/// `update` is called once per composition cycle. Disabled, static and scheduled modes are
/// pure functions of the update count. Adaptive mode follows [`AdaptiveGainOpts`] and holds
/// its gains between recomputations.
///
/// [`AdaptiveGainOpts`]: crate::gain::mode::AdaptiveGainOpts
#[derive(Debug)]
pub struct GainCompensator {
    inputs: usize,
    interpolation: Interpolation,
    states: Vec<TemplateGain>,
    table: GainTable,
    frames_observed: u64,
}

impl GainCompensator {
    /// One mode per output template.
    pub fn new(
        modes: Vec<GainMode>,
        inputs: usize,
        interpolation: Interpolation,
    ) -> StitchResult<Self> {
        for mode in &modes {
            mode.validate(inputs)?;
        }
        let table = GainTable::unity(modes.len(), inputs);
        let states = modes
            .into_iter()
            .map(|mode| TemplateGain {
                mode,
                recomputed: 0,
            })
            .collect();
        Ok(Self {
            inputs,
            interpolation,
            states,
            table,
            frames_observed: 0,
        })
    }

    /// Current gains.
    pub fn gains(&self) -> &GainTable {
        &self.table
    }

    /// Number of templates this compensator tracks.
    pub fn templates(&self) -> usize {
        self.states.len()
    }

    /// Update calls so far.
    pub fn frames_observed(&self) -> u64 {
        self.frames_observed
    }

    /// Observe one frame set and return the gains to composite it with.
    #[tracing::instrument(skip_all, fields(frame = self.frames_observed))]
    pub fn update<'t>(
        &mut self,
        frames: &[FrameView<'_>],
        templates: impl IntoIterator<Item = &'t MapperTemplate>,
    ) -> StitchResult<&GainTable> {
        if frames.len() != self.inputs {
            return Err(StitchError::size_mismatch(format!(
                "gain update got {} frames for {} inputs",
                frames.len(),
                self.inputs
            )));
        }

        let templates: Vec<&MapperTemplate> = templates.into_iter().collect();
        if templates.len() != self.states.len() {
            return Err(StitchError::validation(format!(
                "gain update got {} templates, {} configured",
                templates.len(),
                self.states.len()
            )));
        }

        let frame = self.frames_observed;
        for (t, (state, template)) in self.states.iter_mut().zip(templates).enumerate() {
            match &state.mode {
                GainMode::Disabled => {}
                GainMode::Static { gains } => self.table.set(t, gains),
                GainMode::Scheduled(schedule) => self.table.set(t, schedule.row(frame)),
                GainMode::Adaptive(opts) => {
                    if !opts.is_due(frame, state.recomputed) {
                        continue;
                    }
                    state.recomputed += 1;
                    let stats = overlap_stats(
                        template,
                        frames,
                        self.interpolation,
                        opts.sample_step,
                    );
                    if stats.is_empty() {
                        tracing::debug!(template = t, "no overlap samples, keeping previous gains");
                        continue;
                    }
                    let Some(solved) = solve_gains(&stats) else {
                        tracing::warn!(template = t, "gain solve is singular, keeping previous gains");
                        continue;
                    };
                    let held = self.table.for_template(t);
                    let next: Vec<f32> = held
                        .iter()
                        .zip(&solved)
                        .map(|(&g, &s)| {
                            (g + opts.smoothing * (s - g)).clamp(opts.min_gain, opts.max_gain)
                        })
                        .collect();
                    tracing::debug!(template = t, gains = ?next, "gains recomputed");
                    self.table.set(t, &next);
                }
            }
        }
        self.frames_observed += 1;
        Ok(&self.table)
    }
}

/// Measure source brightness at every `step`-th overlap pixel of `template`.
fn overlap_stats(
    template: &MapperTemplate,
    frames: &[FrameView<'_>],
    interpolation: Interpolation,
    step: usize,
) -> OverlapStats {
    let mut stats = OverlapStats::new(frames.len());
    let edge = template.edge_policy();
    let mut samples = smallvec::SmallVec::<[(usize, f32); 4]>::new();
    for i in template.overlap_pixels().step_by(step.max(1)) {
        samples.clear();
        for s in template.lookup_index(i) {
            let source = usize::from(s.source);
            let Some(view) = frames.get(source) else {
                continue;
            };
            samples.push((source, sample_luma(view, s.x, s.y, interpolation, edge)));
        }
        stats.observe(&samples);
    }
    stats
}

#[cfg(test)]
#[path = "../../tests/unit/gain/compensator.rs"]
mod tests;
