use crate::foundation::core::Canvas;
use crate::foundation::error::StitchResult;
use crate::frame::buffer::{CameraFrame, PixelFormat};
use std::collections::HashMap;

/// Pool configuration for recycled output frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FramePoolOpts {
    /// Maximum bytes retained across all buckets.
    pub max_pool_bytes: usize,
    /// Maximum number of retained frames per (w,h,format) bucket.
    pub max_frames_per_bucket: usize,
}

impl Default for FramePoolOpts {
    fn default() -> Self {
        Self {
            // Two generations of a few 4K outputs.
            max_pool_bytes: 128 * 1024 * 1024,
            max_frames_per_bucket: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct FrameKey {
    w: u32,
    h: u32,
    format: PixelFormat,
}

impl FrameKey {
    fn of(format: PixelFormat, size: Canvas) -> Self {
        Self {
            w: size.width,
            h: size.height,
            format,
        }
    }

    fn byte_len(self) -> usize {
        self.format
            .frame_bytes(Canvas::new(self.w, self.h))
            .unwrap_or(usize::MAX)
    }
}

/// Allocation and retention counters.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FramePoolStats {
    /// Frames currently held by the pool.
    pub retained_frames: usize,
    /// Bytes currently held by the pool.
    pub retained_bytes: usize,
    /// Frames allocated because no pooled frame was available.
    pub alloc_frames: u64,
    /// Bytes allocated because no pooled frame was available.
    pub alloc_bytes: u64,
    /// Frames handed back that the pool declined to keep.
    pub dropped_on_release: u64,
}

/// Bounded pool of output frames reused across pipeline cycles.
///
/// Keyed by `(width, height, format)`. Frames coming out of the pool keep whatever pixels they
/// held; the compositor overwrites every pixel it owns.
pub struct FramePool {
    opts: FramePoolOpts,
    stats: FramePoolStats,
    buckets: HashMap<FrameKey, Vec<CameraFrame>>,
}

impl FramePool {
    /// Create an empty pool.
    pub fn new(opts: FramePoolOpts) -> Self {
        Self {
            opts,
            stats: FramePoolStats::default(),
            buckets: HashMap::new(),
        }
    }

    /// Snapshot of the pool counters.
    pub fn stats(&self) -> FramePoolStats {
        self.stats.clone()
    }

    /// Take a frame from the pool or allocate a fresh one.
    pub fn borrow(&mut self, format: PixelFormat, size: Canvas) -> StitchResult<CameraFrame> {
        let key = FrameKey::of(format, size);
        if let Some(frame) = self.buckets.get_mut(&key).and_then(Vec::pop) {
            self.stats.retained_frames = self.stats.retained_frames.saturating_sub(1);
            self.stats.retained_bytes = self.stats.retained_bytes.saturating_sub(key.byte_len());
            return Ok(frame);
        }

        let frame = CameraFrame::new(format, size)?;
        self.stats.alloc_frames = self.stats.alloc_frames.saturating_add(1);
        self.stats.alloc_bytes = self.stats.alloc_bytes.saturating_add(key.byte_len() as u64);
        Ok(frame)
    }

    /// Hand a frame back for reuse. Frames over the configured caps are dropped.
    pub fn release(&mut self, frame: CameraFrame) {
        if self.opts.max_pool_bytes == 0 || self.opts.max_frames_per_bucket == 0 {
            self.stats.dropped_on_release = self.stats.dropped_on_release.saturating_add(1);
            return;
        }

        let key = FrameKey::of(frame.format(), frame.size());
        let bytes = key.byte_len();
        if self.stats.retained_bytes.saturating_add(bytes) > self.opts.max_pool_bytes {
            self.stats.dropped_on_release = self.stats.dropped_on_release.saturating_add(1);
            return;
        }

        let bucket = self.buckets.entry(key).or_default();
        if bucket.len() >= self.opts.max_frames_per_bucket {
            self.stats.dropped_on_release = self.stats.dropped_on_release.saturating_add(1);
            return;
        }

        bucket.push(frame);
        self.stats.retained_frames = self.stats.retained_frames.saturating_add(1);
        self.stats.retained_bytes = self.stats.retained_bytes.saturating_add(bytes);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/frame/pool.rs"]
mod tests;
