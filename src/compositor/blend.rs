use crate::template::model::{BlendMode, SourceSample};

/// Contribution that wins a hard seam: highest weight, first listed on ties.
pub(crate) fn dominant(entries: &[SourceSample]) -> Option<&SourceSample> {
    entries
        .iter()
        .reduce(|best, s| if s.weight > best.weight { s } else { best })
}

/// Combine the contributions of one output pixel.
///
/// `value_of` returns the gain-corrected sample of one contribution. Returns `None` for an
/// unmapped pixel. A single contribution passes through regardless of its weight.
#[inline]
pub(crate) fn blend_pixel(
    mode: BlendMode,
    entries: &[SourceSample],
    mut value_of: impl FnMut(&SourceSample) -> f32,
) -> Option<f32> {
    match (entries, mode) {
        ([], _) => None,
        ([only], _) => Some(value_of(only)),
        (_, BlendMode::HardSeam) => dominant(entries).map(value_of),
        (_, BlendMode::Weighted) => Some(entries.iter().map(|s| s.weight * value_of(s)).sum()),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/compositor/blend.rs"]
mod tests;
