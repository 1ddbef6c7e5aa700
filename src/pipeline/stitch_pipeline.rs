use crate::foundation::core::FrameSeq;
use crate::foundation::error::{StitchError, StitchResult};
use crate::frame::buffer::CameraFrame;
use crate::frame::pool::FramePoolStats;
use crate::frame::set::FrameSet;
use crate::pipeline::slots::{PipelineState, Slots};
use crate::pipeline::stitcher::Stitcher;
use crate::pipeline::worker::{Job, Worker};

/// Result of one cycle, handed back by [`StitchPipeline::retrieve`].
#[derive(Debug)]
pub struct StitchedFrame {
    /// Submission order of the frame set this was composed from.
    pub seq: FrameSeq,
    /// Composed frames, one per template or one merged canvas.
    pub outputs: Vec<CameraFrame>,
    /// Downscaled copy of the first output, when configured.
    pub preview: Option<CameraFrame>,
    /// The submitted input frames, released back to the caller.
    pub inputs: FrameSet,
}

/// Pipeline counters.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PipelineStats {
    /// Frame sets accepted by `submit`.
    pub submitted: u64,
    /// Cycles handed back by `retrieve`, including failed ones.
    pub retrieved: u64,
    /// Output buffer pool, as of the last retrieved cycle.
    pub pool: FramePoolStats,
}

/// One-frame-deep asynchronous stitching pipeline.
///
/// `submit` hands a frame set to a worker thread and returns immediately; `retrieve` returns the
/// result of the set submitted *before* the most recent one, blocking until the worker finishes
/// it. Results come back in submission order.
///
/// ```text
/// submit(a)            -> Primed
/// retrieve()  == None
/// submit(b)            -> Steady
/// retrieve()  == a
/// end_of_stream()      -> Draining
/// retrieve()  == b
/// retrieve()  == None  -> Empty
/// ```
///
/// Submitting while a result is still waiting to be retrieved is rejected with
/// [`StitchError::Pipeline`]; the pipeline never holds more than one finished cycle.
pub struct StitchPipeline {
    slots: Slots,
    worker: Worker,
    inputs: usize,
    stats: PipelineStats,
}

impl StitchPipeline {
    /// Start the worker thread.
    pub fn new(stitcher: Stitcher) -> StitchResult<Self> {
        let inputs = stitcher.compositor().input_count();
        let outputs = stitcher.compositor().output_sizes().len();
        let worker = Worker::spawn(stitcher)?;
        tracing::info!(inputs, outputs, "stitch pipeline started");
        Ok(Self {
            slots: Slots::new(),
            worker,
            inputs,
            stats: PipelineStats::default(),
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PipelineState {
        self.slots.state()
    }

    /// Counters so far.
    pub fn stats(&self) -> PipelineStats {
        self.stats.clone()
    }

    /// Queue a complete frame set for composition. Never waits for earlier cycles.
    pub fn submit(&mut self, set: FrameSet) -> StitchResult<()> {
        if set.len() != self.inputs {
            return Err(StitchError::size_mismatch(format!(
                "frame set has {} frames, pipeline expects {}",
                set.len(),
                self.inputs
            )));
        }
        let seq = self.slots.admit()?;
        self.worker.send(Job::Compose { seq, set })?;
        self.slots.commit(seq);
        self.stats.submitted += 1;
        Ok(())
    }

    /// Hand back the next finished cycle, or `None` when nothing is retrievable.
    ///
    /// A composition failure is reported here, for the cycle it belongs to; the pipeline stays
    /// usable afterwards.
    pub fn retrieve(&mut self) -> StitchResult<Option<StitchedFrame>> {
        let Some(seq) = self.slots.retrieve() else {
            return Ok(None);
        };
        let composed = self.worker.recv()?;
        if composed.seq != seq {
            return Err(StitchError::pipeline(format!(
                "worker returned frame {} while frame {} was expected",
                composed.seq.0, seq.0
            )));
        }
        self.stats.retrieved += 1;
        self.stats.pool = composed.pool;

        let out = composed.result?;
        Ok(Some(StitchedFrame {
            seq,
            outputs: out.outputs,
            preview: out.preview,
            inputs: composed.inputs,
        }))
    }

    /// Upstream has ended; the next `retrieve` calls drain what is left.
    pub fn end_of_stream(&mut self) {
        tracing::debug!(in_flight = self.slots.in_flight(), "end of stream");
        self.slots.end_of_stream();
    }

    /// `end_of_stream` followed by `retrieve`.
    pub fn flush(&mut self) -> StitchResult<Option<StitchedFrame>> {
        self.end_of_stream();
        self.retrieve()
    }

    /// Return output frames to the worker's buffer pool.
    pub fn recycle(&mut self, frames: impl IntoIterator<Item = CameraFrame>) -> StitchResult<()> {
        let frames: Vec<_> = frames.into_iter().collect();
        if frames.is_empty() {
            return Ok(());
        }
        self.worker.send(Job::Recycle(frames))
    }
}

impl Drop for StitchPipeline {
    fn drop(&mut self) {
        if self.slots.in_flight() > 0 {
            tracing::warn!(
                in_flight = self.slots.in_flight(),
                "stitch pipeline dropped with undelivered frames"
            );
        }
        tracing::info!(
            submitted = self.stats.submitted,
            retrieved = self.stats.retrieved,
            "stitch pipeline stopped"
        );
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/stitch_pipeline.rs"]
mod tests;
