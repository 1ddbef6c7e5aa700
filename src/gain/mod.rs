//! Exposure compensation across overlapping cameras.

/// Per-template gain state.
pub mod compensator;
/// Gain policies and schedules.
pub mod mode;
pub(crate) mod solve;
