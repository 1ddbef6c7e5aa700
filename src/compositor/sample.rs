use crate::frame::buffer::{FrameView, PixelFormat, PlaneView};
use crate::template::model::{EdgeMode, EdgePolicy};

/// Source sampling filter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    /// Closest source pixel.
    Nearest,
    /// Four-neighbour linear interpolation.
    #[default]
    Bilinear,
    /// Four-neighbour interpolation weighted by `(1 - dx^2) * (1 - dy^2)` per corner.
    Biquadratic,
}

/// Map an integer coordinate onto `0..len`, or `None` when it falls outside a fill axis.
#[inline]
fn resolve(c: i64, len: u32, mode: EdgeMode) -> Option<usize> {
    let n = i64::from(len);
    if (0..n).contains(&c) {
        return Some(c as usize);
    }
    match mode {
        EdgeMode::Fill => None,
        EdgeMode::Wrap => Some(c.rem_euclid(n) as usize),
    }
}

#[inline]
fn outside(v: f32, len: u32, mode: EdgeMode) -> bool {
    mode == EdgeMode::Fill && (v < -1.0 || v > len as f32)
}

/// Sample channel `ch` of `plane` at fractional `(x, y)`.
///
/// Neighbours outside the plane wrap or take `fill` according to `edge`; a coordinate further
/// than one sample outside a fill axis yields `fill` outright.
#[inline]
pub(crate) fn sample(
    plane: &PlaneView<'_>,
    ch: usize,
    x: f32,
    y: f32,
    interpolation: Interpolation,
    edge: EdgePolicy,
    fill: u8,
) -> f32 {
    let (w, h) = (plane.width, plane.height);
    if outside(x, w, edge.x) || outside(y, h, edge.y) {
        return f32::from(fill);
    }

    let fetch = |ix: i64, iy: i64| -> f32 {
        match (resolve(ix, w, edge.x), resolve(iy, h, edge.y)) {
            (Some(px), Some(py)) => f32::from(plane.get(px, py, ch)),
            _ => f32::from(fill),
        }
    };

    match interpolation {
        Interpolation::Nearest => fetch((x + 0.5).floor() as i64, (y + 0.5).floor() as i64),
        Interpolation::Bilinear => {
            let x0 = x.floor();
            let y0 = y.floor();
            let fx = x - x0;
            let fy = y - y0;
            let (ix, iy) = (x0 as i64, y0 as i64);

            let v00 = fetch(ix, iy);
            let v10 = fetch(ix + 1, iy);
            let v01 = fetch(ix, iy + 1);
            let v11 = fetch(ix + 1, iy + 1);

            let top = v00 * (1.0 - fx) + v10 * fx;
            let bottom = v01 * (1.0 - fx) + v11 * fx;
            top * (1.0 - fy) + bottom * fy
        }
        Interpolation::Biquadratic => {
            let x0 = x.floor();
            let y0 = y.floor();
            let (ix, iy) = (x0 as i64, y0 as i64);
            let mut acc = 0.0f32;
            let mut norm = 0.0f32;
            for (dx, dy) in [(0i64, 0i64), (1, 0), (0, 1), (1, 1)] {
                let cx = x0 + dx as f32;
                let cy = y0 + dy as f32;
                let (ddx, ddy) = ((cx - x).abs(), (cy - y).abs());
                let wgt = (1.0 - ddx * ddx) * (1.0 - ddy * ddy);
                acc += wgt * fetch(ix + dx, iy + dy);
                norm += wgt;
            }
            acc / norm
        }
    }
}

/// Brightness of a frame at `(x, y)`: luma for gray/YUV, channel mean for RGB.
pub(crate) fn sample_luma(
    view: &FrameView<'_>,
    x: f32,
    y: f32,
    interpolation: Interpolation,
    edge: EdgePolicy,
) -> f32 {
    let plane = view.plane(0);
    match view.format() {
        PixelFormat::Rgb24 => {
            (0..3)
                .map(|ch| sample(plane, ch, x, y, interpolation, edge, 0))
                .sum::<f32>()
                / 3.0
        }
        _ => sample(plane, 0, x, y, interpolation, edge, 0),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/compositor/sample.rs"]
mod tests;
