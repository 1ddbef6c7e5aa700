//! Camera frames, frame sets and the output buffer pool.

/// Planar and packed frame buffers and borrowed views.
pub mod buffer;
/// Bounded reuse pool for output frames.
pub mod pool;
/// Per-cycle frame sets and their assembly.
pub mod set;
