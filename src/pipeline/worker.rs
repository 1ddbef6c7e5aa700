use crate::foundation::core::FrameSeq;
use crate::foundation::error::{StitchError, StitchResult};
use crate::frame::buffer::CameraFrame;
use crate::frame::pool::FramePoolStats;
use crate::frame::set::FrameSet;
use crate::pipeline::stitcher::{StitchOutput, Stitcher};
use std::sync::mpsc;
use std::thread::JoinHandle;

pub(crate) enum Job {
    Compose { seq: FrameSeq, set: FrameSet },
    Recycle(Vec<CameraFrame>),
}

pub(crate) struct Composed {
    pub(crate) seq: FrameSeq,
    pub(crate) result: StitchResult<StitchOutput>,
    pub(crate) inputs: FrameSet,
    pub(crate) pool: FramePoolStats,
}

/// Dedicated composition thread. Jobs are handled strictly in the order they were sent.
pub(crate) struct Worker {
    jobs: Option<mpsc::Sender<Job>>,
    results: mpsc::Receiver<Composed>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub(crate) fn spawn(mut stitcher: Stitcher) -> StitchResult<Self> {
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let (res_tx, res_rx) = mpsc::channel::<Composed>();

        let handle = std::thread::Builder::new()
            .name("panostitch-worker".to_owned())
            .spawn(move || {
                for job in job_rx {
                    match job {
                        Job::Compose { seq, set } => {
                            let result = stitcher.process(&set);
                            let composed = Composed {
                                seq,
                                result,
                                inputs: set,
                                pool: stitcher.pool_stats(),
                            };
                            if res_tx.send(composed).is_err() {
                                break;
                            }
                        }
                        Job::Recycle(frames) => stitcher.recycle(frames),
                    }
                }
            })
            .map_err(|e| StitchError::exhausted(format!("failed to spawn worker thread: {e}")))?;

        Ok(Self {
            jobs: Some(job_tx),
            results: res_rx,
            handle: Some(handle),
        })
    }

    pub(crate) fn send(&self, job: Job) -> StitchResult<()> {
        let Some(jobs) = self.jobs.as_ref() else {
            return Err(StitchError::pipeline("worker is shut down"));
        };
        jobs.send(job)
            .map_err(|_| StitchError::pipeline("worker thread is not accepting jobs"))
    }

    /// Block until the next composed cycle arrives.
    pub(crate) fn recv(&self) -> StitchResult<Composed> {
        self.results
            .recv()
            .map_err(|_| StitchError::pipeline("worker thread stopped unexpectedly"))
    }

    pub(crate) fn shutdown(&mut self) -> StitchResult<()> {
        drop(self.jobs.take());
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| StitchError::pipeline("worker thread panicked")),
            None => Ok(()),
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!(error = %e, "worker shutdown");
        }
    }
}
