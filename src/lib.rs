//! Panostitch is a multi-camera panoramic stitching engine.
//!
//! Precomputed [`MapperTemplate`]s describe, for every output pixel, which cameras and
//! fractional source coordinates back it. Per cycle the engine:
//!
//! - collects one frame per camera into a [`FrameSet`] ([`FrameSetAssembler`])
//! - equalizes exposure across overlaps ([`GainCompensator`])
//! - samples, gain-corrects and blends into the outputs ([`Compositor`])
//!
//! [`StitchPipeline`] runs this on a worker thread behind a one-frame-deep submit/retrieve
//! interface; [`StitchConfig`] builds one from a JSON description.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

/// JSON deployment configuration.
pub mod config;
/// Composition of frame sets through templates.
pub mod compositor;
/// Frame buffers, frame sets and buffer pooling.
pub mod frame;
/// Exposure compensation.
pub mod gain;
/// Synchronous core and asynchronous pipeline.
pub mod pipeline;
/// Mapping templates and their binary format.
pub mod template;

pub use crate::foundation::core::{Canvas, FrameSeq, PixelRect, RegionRect};
pub use crate::foundation::error::{StitchError, StitchResult};

pub use crate::compositor::engine::{CompositeOpts, Compositor, OutputLayout, OutputSpec};
pub use crate::compositor::preview::render_preview;
pub use crate::compositor::sample::Interpolation;
pub use crate::config::stitch::{OutputConfig, StitchConfig};
pub use crate::frame::buffer::{CameraFrame, FrameView, InputCrop, PixelFormat, Plane, PlaneView};
pub use crate::frame::pool::{FramePool, FramePoolOpts, FramePoolStats};
pub use crate::frame::set::{Cycle, FrameSet, FrameSetAssembler};
pub use crate::gain::compensator::{GainCompensator, GainTable};
pub use crate::gain::mode::{AdaptiveGainOpts, GainMode, GainSchedule};
pub use crate::pipeline::slots::PipelineState;
pub use crate::pipeline::stitch_pipeline::{PipelineStats, StitchPipeline, StitchedFrame};
pub use crate::pipeline::stitcher::{StitchOutput, Stitcher};
pub use crate::template::io::{TEMPLATE_MAGIC, TEMPLATE_VERSION};
pub use crate::template::model::{
    BlendMode, EdgeMode, EdgePolicy, GainHint, MapperTemplate, SourceSample, TemplateBuilder,
    TemplateStats,
};
