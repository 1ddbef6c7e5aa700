//! Remap, gain correction and seam blending.

pub(crate) mod blend;
/// Template-driven composition of frame sets.
pub mod engine;
/// Downscaled preview output.
pub mod preview;
/// Source sampling filters.
pub mod sample;
