use crate::foundation::error::{StitchError, StitchResult};
use crate::template::model::GainHint;
use std::path::Path;

/// Exposure compensation policy for one output template.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum GainMode {
    /// Gain is 1 for every source.
    Disabled,
    /// Fixed multiplier per source, never recomputed.
    Static {
        /// One multiplier per input.
        gains: Vec<f32>,
    },
    /// Per-frame multipliers read from a schedule.
    Scheduled(GainSchedule),
    /// Equalize brightness across overlaps on a fixed cadence.
    Adaptive(AdaptiveGainOpts),
}

impl GainMode {
    /// The mode a template asks for when the configuration does not override it.
    pub fn from_hint(hint: GainHint) -> Self {
        match hint {
            GainHint::Off => Self::Disabled,
            GainHint::Adaptive => Self::Adaptive(AdaptiveGainOpts::default()),
        }
    }

    /// Check the mode against the number of inputs.
    pub fn validate(&self, inputs: usize) -> StitchResult<()> {
        match self {
            Self::Disabled => Ok(()),
            Self::Static { gains } => {
                if gains.len() != inputs {
                    return Err(StitchError::validation(format!(
                        "static gain lists {} values for {inputs} inputs",
                        gains.len()
                    )));
                }
                check_multipliers(gains)
            }
            Self::Scheduled(schedule) => schedule.validate(inputs),
            Self::Adaptive(opts) => opts.validate(),
        }
    }
}

fn check_multipliers(values: &[f32]) -> StitchResult<()> {
    if let Some(v) = values.iter().find(|v| !v.is_finite() || **v <= 0.0) {
        return Err(StitchError::validation(format!(
            "gain multipliers must be finite and > 0, got {v}"
        )));
    }
    Ok(())
}

/// Deterministic adaptive-gain policy.
///
/// Update call `n` (0-based) recomputes when `n >= warmup_frames` and
/// `(n - warmup_frames) % interval_frames == 0`, until `freeze_after` recomputations have run.
/// Each recomputation moves the held gains towards the least-squares solution by `smoothing`
/// (`g += smoothing * (solved - g)`) and clamps into `[min_gain, max_gain]`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AdaptiveGainOpts {
    /// Update calls to skip before the first recomputation.
    pub warmup_frames: u64,
    /// Update calls between recomputations.
    pub interval_frames: u64,
    /// Exponential moving average factor in `(0, 1]`.
    pub smoothing: f32,
    /// Lower gain bound.
    pub min_gain: f32,
    /// Upper gain bound.
    pub max_gain: f32,
    /// Measure every n-th overlap pixel.
    pub sample_step: usize,
    /// Stop recomputing after this many recomputations.
    pub freeze_after: Option<u32>,
}

impl Default for AdaptiveGainOpts {
    fn default() -> Self {
        Self {
            warmup_frames: 0,
            interval_frames: 30,
            smoothing: 0.5,
            min_gain: 0.5,
            max_gain: 2.0,
            sample_step: 1,
            freeze_after: None,
        }
    }
}

impl AdaptiveGainOpts {
    /// Check ranges.
    pub fn validate(&self) -> StitchResult<()> {
        if self.interval_frames == 0 {
            return Err(StitchError::validation("adaptive gain interval must be >= 1"));
        }
        if self.sample_step == 0 {
            return Err(StitchError::validation("adaptive gain sample_step must be >= 1"));
        }
        if !(self.smoothing > 0.0 && self.smoothing <= 1.0) {
            return Err(StitchError::validation("adaptive gain smoothing must be in (0, 1]"));
        }
        if !(self.min_gain.is_finite() && self.max_gain.is_finite())
            || self.min_gain <= 0.0
            || self.min_gain > 1.0
            || self.max_gain < 1.0
        {
            return Err(StitchError::validation(
                "adaptive gain bounds must satisfy 0 < min_gain <= 1 <= max_gain",
            ));
        }
        Ok(())
    }

    pub(crate) fn is_due(&self, frame: u64, recomputed: u32) -> bool {
        if self.freeze_after.is_some_and(|n| recomputed >= n) {
            return false;
        }
        frame >= self.warmup_frames && (frame - self.warmup_frames) % self.interval_frames == 0
    }
}

/// Per-frame gain rows; frame `i` uses row `i`, later frames reuse the last row.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GainSchedule {
    /// One row of per-input multipliers per frame.
    pub rows: Vec<Vec<f32>>,
}

impl GainSchedule {
    /// Parse the whitespace-separated text form: a frame count followed by
    /// `count * inputs` multipliers in frame-major order.
    pub fn parse(text: &str, inputs: usize) -> StitchResult<Self> {
        let mut tokens = text.split_whitespace();
        let count: usize = tokens
            .next()
            .ok_or_else(|| StitchError::validation("gain schedule is empty"))?
            .parse()
            .map_err(|e| StitchError::validation(format!("gain schedule frame count: {e}")))?;

        let mut rows = Vec::with_capacity(count.min(1 << 16));
        for frame in 0..count {
            let mut row = Vec::with_capacity(inputs);
            for input in 0..inputs {
                let tok = tokens.next().ok_or_else(|| {
                    StitchError::validation(format!(
                        "gain schedule ends early at frame {frame}, input {input}"
                    ))
                })?;
                row.push(tok.parse::<f32>().map_err(|e| {
                    StitchError::validation(format!("gain schedule value '{tok}': {e}"))
                })?);
            }
            rows.push(row);
        }
        if tokens.next().is_some() {
            return Err(StitchError::validation(
                "gain schedule has more values than declared",
            ));
        }
        let schedule = Self { rows };
        schedule.validate(inputs)?;
        Ok(schedule)
    }

    /// Read and parse a schedule file.
    pub fn from_path(path: impl AsRef<Path>, inputs: usize) -> StitchResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            StitchError::validation(format!("read gain schedule '{}': {e}", path.display()))
        })?;
        let schedule = Self::parse(&text, inputs)?;
        tracing::info!(path = %path.display(), frames = schedule.rows.len(), "gains read");
        Ok(schedule)
    }

    /// Check row shape and values.
    pub fn validate(&self, inputs: usize) -> StitchResult<()> {
        if self.rows.is_empty() {
            return Err(StitchError::validation("gain schedule has no frames"));
        }
        for (i, row) in self.rows.iter().enumerate() {
            if row.len() != inputs {
                return Err(StitchError::validation(format!(
                    "gain schedule frame {i} has {} values for {inputs} inputs",
                    row.len()
                )));
            }
            check_multipliers(row)?;
        }
        Ok(())
    }

    /// Row for update call `frame`.
    pub fn row(&self, frame: u64) -> &[f32] {
        let last = self.rows.len() - 1;
        let i = usize::try_from(frame).map_or(last, |f| f.min(last));
        &self.rows[i]
    }
}

#[cfg(test)]
#[path = "../../tests/unit/gain/mode.rs"]
mod tests;
