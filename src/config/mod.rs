//! JSON deployment configuration.

/// `StitchConfig` and pipeline construction from it.
pub mod stitch;
