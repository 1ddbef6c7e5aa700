use crate::foundation::error::{StitchError, StitchResult};

/// Round a floating-point pixel value into `0..=255`, clamping instead of wrapping.
///
/// NaN maps to 0.
pub(crate) fn round_to_u8(v: f32) -> u8 {
    if v.is_nan() || v <= 0.0 {
        return 0;
    }
    if v >= 255.0 {
        return 255;
    }
    (v + 0.5) as u8
}

/// Allocate a byte buffer filled with `value`, reporting allocation failure instead of aborting.
pub(crate) fn alloc_filled(len: usize, value: u8) -> StitchResult<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|e| StitchError::exhausted(format!("allocate {len} byte buffer: {e}")))?;
    buf.resize(len, value);
    Ok(buf)
}

/// `a * b` for buffer sizing, or a [`StitchError::ResourceExhaustion`] on overflow.
pub(crate) fn checked_len(a: usize, b: usize) -> StitchResult<usize> {
    a.checked_mul(b)
        .ok_or_else(|| StitchError::exhausted(format!("buffer size overflow: {a} * {b}")))
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/math.rs"]
mod tests;
