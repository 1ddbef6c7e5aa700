use crate::foundation::core::FrameSeq;
use crate::foundation::error::{StitchError, StitchResult};

/// Lifecycle of the one-deep pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    /// Nothing in flight.
    Empty,
    /// One set submitted, nothing retrievable yet.
    Primed,
    /// Each submit makes the previous set retrievable.
    Steady,
    /// Upstream ended; remaining results are handed out without further submits.
    Draining,
}

/// Two-generation slot bookkeeping: the set being composed and the one ready to hand back.
///
/// Slots only hold sequence numbers. The frames themselves travel with the worker job and come
/// back with its result, so ownership moves exactly once per `retrieve`.
#[derive(Debug)]
pub(crate) struct Slots {
    state: PipelineState,
    pending: Option<FrameSeq>,
    ready: Option<FrameSeq>,
    next: u64,
}

impl Slots {
    pub(crate) fn new() -> Self {
        Self {
            state: PipelineState::Empty,
            pending: None,
            ready: None,
            next: 0,
        }
    }

    pub(crate) fn state(&self) -> PipelineState {
        self.state
    }

    /// Number of submitted sets whose result has not been retrieved.
    pub(crate) fn in_flight(&self) -> usize {
        usize::from(self.pending.is_some()) + usize::from(self.ready.is_some())
    }

    /// Sequence number the next submit would get, or why it is refused. Changes nothing.
    pub(crate) fn admit(&self) -> StitchResult<FrameSeq> {
        if self.state == PipelineState::Draining {
            return Err(StitchError::pipeline("submit after end of stream"));
        }
        if let Some(seq) = self.ready {
            return Err(StitchError::pipeline(format!(
                "submit while frame {} is still waiting to be retrieved",
                seq.0
            )));
        }
        Ok(FrameSeq(self.next))
    }

    /// Record `seq`, previously returned by `admit`, as submitted.
    pub(crate) fn commit(&mut self, seq: FrameSeq) {
        debug_assert_eq!(seq.0, self.next, "commit out of order");
        self.next += 1;
        self.ready = self.pending.replace(seq);
        self.state = match self.state {
            PipelineState::Empty => PipelineState::Primed,
            _ => PipelineState::Steady,
        };
    }

    /// Take the next retrievable sequence number, if any.
    pub(crate) fn retrieve(&mut self) -> Option<FrameSeq> {
        if let Some(seq) = self.ready.take() {
            return Some(seq);
        }
        if self.state != PipelineState::Draining {
            return None;
        }
        match self.pending.take() {
            Some(seq) => Some(seq),
            None => {
                self.state = PipelineState::Empty;
                None
            }
        }
    }

    /// Upstream has ended; an empty pipeline stays empty.
    pub(crate) fn end_of_stream(&mut self) {
        if self.in_flight() > 0 {
            self.state = PipelineState::Draining;
        } else {
            self.state = PipelineState::Empty;
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/slots.rs"]
mod tests;
