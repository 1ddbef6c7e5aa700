use crate::foundation::error::{StitchError, StitchResult};

/// Monotonic sequence number assigned to each submitted frame set.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameSeq(pub u64);

/// Pixel dimensions of a frame, template or canvas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Canvas {
    /// Create a canvas of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels, or `None` on overflow.
    pub fn area(self) -> Option<usize> {
        (self.width as usize).checked_mul(self.height as usize)
    }

    /// `true` when either dimension is zero.
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for Canvas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Sub-region of a larger canvas in normalized `[0, 1]` coordinates.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RegionRect {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width as a fraction of the canvas width.
    pub width: f64,
    /// Height as a fraction of the canvas height.
    pub height: f64,
}

impl Default for RegionRect {
    fn default() -> Self {
        Self::FULL
    }
}

impl RegionRect {
    /// The whole canvas.
    pub const FULL: Self = Self {
        x: 0.0,
        y: 0.0,
        width: 1.0,
        height: 1.0,
    };

    /// Create a validated region that lies inside the unit square.
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> StitchResult<Self> {
        let r = Self {
            x,
            y,
            width,
            height,
        };
        r.validate()?;
        Ok(r)
    }

    /// Check that the region is finite, non-empty and inside `[0, 1]`.
    pub fn validate(&self) -> StitchResult<()> {
        let vals = [self.x, self.y, self.width, self.height];
        if vals.iter().any(|v| !v.is_finite()) {
            return Err(StitchError::validation("region values must be finite"));
        }
        if self.x < 0.0 || self.y < 0.0 || self.width <= 0.0 || self.height <= 0.0 {
            return Err(StitchError::validation(
                "region origin must be >= 0 and extent > 0",
            ));
        }
        // Small slack for values like 0.1 + 0.9 that do not sum to exactly 1.
        const EPS: f64 = 1e-9;
        if self.x + self.width > 1.0 + EPS || self.y + self.height > 1.0 + EPS {
            return Err(StitchError::validation(
                "region must lie inside the unit square",
            ));
        }
        Ok(())
    }

    /// Resolve into integer pixels on `canvas`.
    pub fn to_pixels(&self, canvas: Canvas) -> PixelRect {
        let w = f64::from(canvas.width);
        let h = f64::from(canvas.height);
        let x0 = (self.x * w).round() as u32;
        let y0 = (self.y * h).round() as u32;
        let x1 = ((self.x + self.width) * w).round().min(w) as u32;
        let y1 = ((self.y + self.height) * h).round().min(h) as u32;
        PixelRect {
            x: x0,
            y: y0,
            width: x1.saturating_sub(x0),
            height: y1.saturating_sub(y0),
        }
    }
}

/// Integer pixel rectangle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRect {
    /// Left column.
    pub x: u32,
    /// Top row.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl PixelRect {
    /// Size of the rectangle.
    pub fn size(self) -> Canvas {
        Canvas::new(self.width, self.height)
    }

    /// `true` when the rectangle fits in `canvas`.
    pub fn fits(self, canvas: Canvas) -> bool {
        u64::from(self.x) + u64::from(self.width) <= u64::from(canvas.width)
            && u64::from(self.y) + u64::from(self.height) <= u64::from(canvas.height)
    }

    /// `true` when the two rectangles share at least one pixel.
    pub fn intersects(self, other: PixelRect) -> bool {
        self.x < other.x + other.width
            && other.x < self.x + self.width
            && self.y < other.y + other.height
            && other.y < self.y + self.height
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
