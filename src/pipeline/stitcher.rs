use crate::compositor::engine::Compositor;
use crate::compositor::preview::render_preview;
use crate::foundation::core::Canvas;
use crate::foundation::error::{StitchError, StitchResult};
use crate::frame::buffer::CameraFrame;
use crate::frame::pool::{FramePool, FramePoolOpts, FramePoolStats};
use crate::frame::set::FrameSet;
use crate::gain::compensator::{GainCompensator, GainTable};
use std::time::Instant;

/// Frames produced by one composition cycle.
#[derive(Clone, Debug)]
pub struct StitchOutput {
    /// One frame per template, or a single canvas in merged layout.
    pub outputs: Vec<CameraFrame>,
    /// Downscaled copy of the first output, when configured.
    pub preview: Option<CameraFrame>,
}

/// Synchronous composition core: gain update, composite, preview.
///
/// Owns its output buffers through a [`FramePool`]; hand retrieved frames back with
/// [`Stitcher::recycle`] to reuse them.
pub struct Stitcher {
    compositor: Compositor,
    gains: GainCompensator,
    pool: FramePool,
    preview: Option<Canvas>,
}

impl Stitcher {
    /// Combine a compositor with a gain compensator tracking the same templates.
    pub fn new(
        compositor: Compositor,
        gains: GainCompensator,
        preview: Option<Canvas>,
        pool: FramePoolOpts,
    ) -> StitchResult<Self> {
        if gains.templates() != compositor.outputs().len() {
            return Err(StitchError::validation(format!(
                "gain compensator tracks {} templates, compositor has {}",
                gains.templates(),
                compositor.outputs().len()
            )));
        }
        if let Some(size) = preview {
            compositor.format().check_size(size)?;
        }
        Ok(Self {
            compositor,
            gains,
            pool: FramePool::new(pool),
            preview,
        })
    }

    /// The wrapped compositor.
    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    /// Gains used by the most recent cycle.
    pub fn gains(&self) -> &GainTable {
        self.gains.gains()
    }

    /// Output buffer pool counters.
    pub fn pool_stats(&self) -> FramePoolStats {
        self.pool.stats()
    }

    /// Compose one complete frame set.
    pub fn process(&mut self, set: &FrameSet) -> StitchResult<StitchOutput> {
        let t0 = Instant::now();
        let views = self.compositor.prepare(set)?;
        let t1 = Instant::now();
        let gains = self.gains.update(&views, self.compositor.templates())?;
        let t2 = Instant::now();

        let format = self.compositor.format();
        let mut outputs = self
            .compositor
            .output_sizes()
            .iter()
            .map(|size| self.pool.borrow(format, *size))
            .collect::<StitchResult<Vec<_>>>()?;
        self.compositor.render(&views, gains, &mut outputs);
        let t3 = Instant::now();

        let preview = match (self.preview, outputs.first()) {
            (Some(size), Some(first)) => Some(render_preview(first, size)?),
            _ => None,
        };
        let t4 = Instant::now();

        tracing::debug!(
            frame = self.gains.frames_observed(),
            prepare_us = (t1 - t0).as_micros() as u64,
            gain_us = (t2 - t1).as_micros() as u64,
            composite_us = (t3 - t2).as_micros() as u64,
            preview_us = (t4 - t3).as_micros() as u64,
            "cycle composed"
        );
        Ok(StitchOutput { outputs, preview })
    }

    /// Return output frames for reuse by later cycles.
    pub fn recycle(&mut self, frames: impl IntoIterator<Item = CameraFrame>) {
        for frame in frames {
            self.pool.release(frame);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/stitcher.rs"]
mod tests;
