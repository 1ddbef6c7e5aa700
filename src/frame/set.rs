use crate::foundation::error::{StitchError, StitchResult};
use crate::frame::buffer::CameraFrame;

/// One time-aligned frame per configured input, in input order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameSet {
    frames: Vec<CameraFrame>,
}

impl FrameSet {
    /// Wrap frames already ordered by input index.
    pub fn new(frames: Vec<CameraFrame>) -> Self {
        Self { frames }
    }

    /// Number of inputs.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// `true` when the set holds no frames.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Borrow the frames.
    pub fn frames(&self) -> &[CameraFrame] {
        &self.frames
    }

    /// Borrow the frame of input `i`.
    pub fn get(&self, i: usize) -> Option<&CameraFrame> {
        self.frames.get(i)
    }

    /// Give the frames back to the caller.
    pub fn into_frames(self) -> Vec<CameraFrame> {
        self.frames
    }
}

/// Outcome of feeding a frame into a [`FrameSetAssembler`].
#[derive(Debug)]
pub enum Cycle {
    /// At least one input has not delivered a frame yet; skip this cycle.
    Incomplete,
    /// Every input delivered; the set is ready for composition.
    Ready(FrameSet),
    /// An input closed permanently; drain the pipeline.
    EndOfStream,
}

/// Collects one frame per input into a [`FrameSet`].
///
/// Timestamp alignment is the host's job; the assembler only guarantees that a set is never
/// released with an input missing.
#[derive(Debug)]
pub struct FrameSetAssembler {
    slots: Vec<Option<CameraFrame>>,
    closed: bool,
}

impl FrameSetAssembler {
    /// Create an assembler for `inputs` streams.
    pub fn new(inputs: usize) -> Self {
        Self {
            slots: (0..inputs).map(|_| None).collect(),
            closed: false,
        }
    }

    /// Deliver the next frame of `input`.
    pub fn push(&mut self, input: usize, frame: CameraFrame) -> StitchResult<Cycle> {
        if self.closed {
            return Ok(Cycle::EndOfStream);
        }
        let n = self.slots.len();
        let slot = self
            .slots
            .get_mut(input)
            .ok_or_else(|| StitchError::validation(format!("input {input} out of range 0..{n}")))?;
        if slot.is_some() {
            return Err(StitchError::pipeline(format!(
                "input {input} delivered a second frame before the set was complete"
            )));
        }
        *slot = Some(frame);

        if self.slots.iter().any(Option::is_none) {
            return Ok(Cycle::Incomplete);
        }
        let frames = self.slots.iter_mut().filter_map(Option::take).collect();
        Ok(Cycle::Ready(FrameSet::new(frames)))
    }

    /// Mark `input` as permanently closed. Partially assembled frames are discarded.
    pub fn close(&mut self, input: usize) -> Cycle {
        tracing::debug!(input, "input closed, discarding partial frame set");
        self.closed = true;
        self.slots.iter_mut().for_each(|s| *s = None);
        Cycle::EndOfStream
    }

    /// Inputs that still owe a frame for the current cycle.
    pub fn missing_inputs(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_none())
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/frame/set.rs"]
mod tests;
