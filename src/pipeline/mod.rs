//! Synchronous stitching core and the one-frame-deep asynchronous pipeline around it.

/// Two-slot bookkeeping and lifecycle states.
pub mod slots;
/// Submit/retrieve pipeline.
pub mod stitch_pipeline;
/// Gain update, composition and preview for one frame set.
pub mod stitcher;
mod worker;
