use crate::foundation::core::{Canvas, RegionRect};
use crate::foundation::error::{StitchError, StitchResult};
use smallvec::SmallVec;

/// Largest accepted template or input dimension.
pub const MAX_TEMPLATE_DIM: u32 = 1 << 16;

/// Weights of a multi-source pixel must sum to 1 within this tolerance.
pub const WEIGHT_SUM_TOLERANCE: f32 = 1e-3;

/// One contribution to an output pixel: a fractional coordinate in one source camera.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SourceSample {
    /// Input camera index.
    pub source: u16,
    /// Fractional source column.
    pub x: f32,
    /// Fractional source row.
    pub y: f32,
    /// Blend weight of this contribution.
    pub weight: f32,
}

impl SourceSample {
    /// Build a sample.
    pub fn new(source: u16, x: f32, y: f32, weight: f32) -> Self {
        Self {
            source,
            x,
            y,
            weight,
        }
    }
}

/// How overlapping contributions are combined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    /// Convex combination using the template weights.
    #[default]
    Weighted,
    /// The highest-weight contribution wins; ties go to the first listed.
    HardSeam,
}

impl BlendMode {
    pub(crate) fn to_tag(self) -> u8 {
        match self {
            Self::Weighted => 0,
            Self::HardSeam => 1,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Weighted),
            1 => Some(Self::HardSeam),
            _ => None,
        }
    }
}

/// Gain policy recommended by the template author.
///
/// Static and scheduled multipliers are external values, so a template can only say whether
/// compensation should run at all.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GainHint {
    /// Leave samples untouched.
    #[default]
    Off,
    /// Equalize exposure across overlaps.
    Adaptive,
}

impl GainHint {
    pub(crate) fn to_tag(self) -> u8 {
        match self {
            Self::Off => 0,
            Self::Adaptive => 1,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Off),
            1 => Some(Self::Adaptive),
            _ => None,
        }
    }
}

/// Behaviour for source neighbours that fall outside the frame on one axis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeMode {
    /// Use the caller-supplied fill value.
    #[default]
    Fill,
    /// Wrap modulo the source dimension (azimuthal sources).
    Wrap,
}

impl EdgeMode {
    pub(crate) fn to_tag(self) -> u8 {
        match self {
            Self::Fill => 0,
            Self::Wrap => 1,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Fill),
            1 => Some(Self::Wrap),
            _ => None,
        }
    }
}

/// Per-axis edge behaviour.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct EdgePolicy {
    /// Horizontal axis.
    pub x: EdgeMode,
    /// Vertical axis.
    pub y: EdgeMode,
}

impl EdgePolicy {
    /// Wrap horizontally (360° azimuth), fill vertically.
    pub const AZIMUTHAL: Self = Self {
        x: EdgeMode::Wrap,
        y: EdgeMode::Fill,
    };
}

/// Coverage counters of a template.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TemplateStats {
    /// Pixels with at least one source.
    pub mapped: u64,
    /// Pixels with no source.
    pub unmapped: u64,
    /// Pixels with two or more sources.
    pub overlap: u64,
    /// Largest source count seen on a single pixel.
    pub max_sources: usize,
}

/// Immutable per-output-pixel mapping onto one or more source cameras.
///
/// Samples are stored contiguously; `offsets[i]..offsets[i + 1]` indexes the samples of output
/// pixel `i` (row-major). An empty range means the pixel is unmapped.
#[derive(Clone, Debug, PartialEq)]
pub struct MapperTemplate {
    pub(crate) out_size: Canvas,
    pub(crate) inputs: Vec<Canvas>,
    pub(crate) region: RegionRect,
    pub(crate) blend: BlendMode,
    pub(crate) gain: GainHint,
    pub(crate) edge: EdgePolicy,
    pub(crate) offsets: Vec<u32>,
    pub(crate) samples: Vec<SourceSample>,
}

impl MapperTemplate {
    /// Output `(width, height)`.
    pub fn output_size(&self) -> Canvas {
        self.out_size
    }

    /// Source frame sizes the template was computed for, by input index.
    pub fn input_sizes(&self) -> &[Canvas] {
        &self.inputs
    }

    /// Number of source cameras.
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Placement of this output inside a larger canvas.
    pub fn region(&self) -> RegionRect {
        self.region
    }

    /// Default blend mode.
    pub fn blend_mode(&self) -> BlendMode {
        self.blend
    }

    /// Recommended gain policy.
    pub fn gain_hint(&self) -> GainHint {
        self.gain
    }

    /// Edge behaviour for out-of-frame neighbours.
    pub fn edge_policy(&self) -> EdgePolicy {
        self.edge
    }

    /// Contributions for output pixel `(x, y)`; empty when unmapped.
    ///
    /// Panics if the coordinate is outside [`Self::output_size`].
    #[inline]
    pub fn lookup(&self, x: u32, y: u32) -> &[SourceSample] {
        assert!(
            x < self.out_size.width && y < self.out_size.height,
            "lookup ({x},{y}) outside template {}",
            self.out_size
        );
        self.lookup_index(y as usize * self.out_size.width as usize + x as usize)
    }

    #[inline]
    pub(crate) fn lookup_index(&self, i: usize) -> &[SourceSample] {
        let start = self.offsets[i] as usize;
        let end = self.offsets[i + 1] as usize;
        &self.samples[start..end]
    }

    /// Row-major indices of pixels covered by two or more sources.
    pub fn overlap_pixels(&self) -> impl Iterator<Item = usize> + '_ {
        self.offsets
            .windows(2)
            .enumerate()
            .filter(|(_, w)| w[1] - w[0] >= 2)
            .map(|(i, _)| i)
    }

    /// Coverage counters.
    pub fn stats(&self) -> TemplateStats {
        let mut st = TemplateStats::default();
        for w in self.offsets.windows(2) {
            let n = (w[1] - w[0]) as usize;
            match n {
                0 => st.unmapped += 1,
                1 => st.mapped += 1,
                _ => {
                    st.mapped += 1;
                    st.overlap += 1;
                }
            }
            st.max_sources = st.max_sources.max(n);
        }
        st
    }
}

/// Incrementally assembles a [`MapperTemplate`], e.g. one computed at runtime before dumping it.
#[derive(Clone, Debug)]
pub struct TemplateBuilder {
    out_size: Canvas,
    inputs: Vec<Canvas>,
    region: RegionRect,
    blend: BlendMode,
    gain: GainHint,
    edge: EdgePolicy,
    entries: Vec<SmallVec<[SourceSample; 2]>>,
}

impl TemplateBuilder {
    /// Start an all-unmapped template of `out_size` over sources of the given sizes.
    ///
    /// Nothing is allocated for an output size outside `1..=MAX_TEMPLATE_DIM`; such a builder
    /// ignores `set` and fails in [`TemplateBuilder::build`].
    pub fn new(out_size: Canvas, inputs: Vec<Canvas>) -> Self {
        let area = if dims_in_range(out_size) {
            out_size.area().unwrap_or(0)
        } else {
            0
        };
        Self {
            out_size,
            inputs,
            region: RegionRect::FULL,
            blend: BlendMode::default(),
            gain: GainHint::default(),
            edge: EdgePolicy::default(),
            entries: vec![SmallVec::new(); area],
        }
    }

    /// Set the normalized placement.
    pub fn region(mut self, region: RegionRect) -> Self {
        self.region = region;
        self
    }

    /// Set the default blend mode.
    pub fn blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }

    /// Set the recommended gain policy.
    pub fn gain(mut self, gain: GainHint) -> Self {
        self.gain = gain;
        self
    }

    /// Set the edge policy.
    pub fn edge(mut self, edge: EdgePolicy) -> Self {
        self.edge = edge;
        self
    }

    /// Replace the contributions of output pixel `(x, y)`. Out-of-range pixels are ignored.
    pub fn set(&mut self, x: u32, y: u32, samples: impl IntoIterator<Item = SourceSample>) {
        if x >= self.out_size.width || y >= self.out_size.height {
            return;
        }
        let i = y as usize * self.out_size.width as usize + x as usize;
        if let Some(entry) = self.entries.get_mut(i) {
            *entry = samples.into_iter().collect();
        }
    }

    /// Map output pixel `(x, y)` to a single source coordinate.
    pub fn map_single(&mut self, x: u32, y: u32, source: u16, sx: f32, sy: f32) {
        self.set(x, y, [SourceSample::new(source, sx, sy, 1.0)]);
    }

    /// Validate and freeze the template.
    pub fn build(self) -> StitchResult<MapperTemplate> {
        validate_header(self.out_size, &self.inputs, &self.region)?;
        if self.out_size.area() != Some(self.entries.len()) {
            return Err(StitchError::malformed(format!(
                "output size {} does not fit in memory",
                self.out_size
            )));
        }
        let mut offsets = Vec::with_capacity(self.entries.len() + 1);
        let mut samples = Vec::new();
        offsets.push(0u32);
        for (i, entry) in self.entries.iter().enumerate() {
            validate_entry(i, entry, &self.inputs)?;
            samples.extend_from_slice(entry);
            let end = u32::try_from(samples.len())
                .map_err(|_| StitchError::malformed("template holds more than u32::MAX samples"))?;
            offsets.push(end);
        }
        Ok(MapperTemplate {
            out_size: self.out_size,
            inputs: self.inputs,
            region: self.region,
            blend: self.blend,
            gain: self.gain,
            edge: self.edge,
            offsets,
            samples,
        })
    }
}

fn dims_in_range(size: Canvas) -> bool {
    !size.is_empty() && size.width <= MAX_TEMPLATE_DIM && size.height <= MAX_TEMPLATE_DIM
}

pub(crate) fn validate_header(
    out_size: Canvas,
    inputs: &[Canvas],
    region: &RegionRect,
) -> StitchResult<()> {
    if !dims_in_range(out_size) {
        return Err(StitchError::malformed(format!(
            "output size {out_size} outside 1..={MAX_TEMPLATE_DIM}"
        )));
    }
    if inputs.is_empty() || inputs.len() > usize::from(u16::MAX) + 1 {
        return Err(StitchError::malformed(format!(
            "input count {} outside 1..=65536",
            inputs.len()
        )));
    }
    for (i, s) in inputs.iter().enumerate() {
        if !dims_in_range(*s) {
            return Err(StitchError::malformed(format!("input {i} has invalid size {s}")));
        }
    }
    region
        .validate()
        .map_err(|e| StitchError::malformed(format!("region: {e}")))
}

pub(crate) fn validate_entry(
    pixel: usize,
    entry: &[SourceSample],
    inputs: &[Canvas],
) -> StitchResult<()> {
    if entry.len() > usize::from(u8::MAX) {
        return Err(StitchError::malformed(format!(
            "pixel {pixel} lists {} sources (max 255)",
            entry.len()
        )));
    }
    let mut weight_sum = 0.0f32;
    for s in entry {
        let size = inputs.get(usize::from(s.source)).ok_or_else(|| {
            StitchError::malformed(format!(
                "pixel {pixel} references source {} of {}",
                s.source,
                inputs.len()
            ))
        })?;
        if !(s.x.is_finite() && s.y.is_finite() && s.weight.is_finite()) {
            return Err(StitchError::malformed(format!("pixel {pixel} has non-finite values")));
        }
        // At most one sample outside the frame on either side.
        if s.x < -1.0 || s.x > size.width as f32 || s.y < -1.0 || s.y > size.height as f32 {
            return Err(StitchError::malformed(format!(
                "pixel {pixel} maps to ({}, {}) outside source {} ({size})",
                s.x, s.y, s.source
            )));
        }
        if s.weight < 0.0 {
            return Err(StitchError::malformed(format!("pixel {pixel} has a negative weight")));
        }
        weight_sum += s.weight;
    }
    if entry.len() > 1 && (weight_sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(StitchError::malformed(format!(
            "pixel {pixel} weights sum to {weight_sum}, expected 1"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/template/model.rs"]
mod tests;
