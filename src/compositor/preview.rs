use crate::foundation::core::Canvas;
use crate::foundation::error::{StitchError, StitchResult};
use crate::frame::buffer::{CameraFrame, PixelFormat, Plane};
use image::imageops::{FilterType, resize};
use image::{GrayImage, RgbImage};

/// Resample `frame` to `size`, plane by plane, keeping its pixel format.
pub fn render_preview(frame: &CameraFrame, size: Canvas) -> StitchResult<CameraFrame> {
    let format = frame.format();
    format.check_size(size)?;
    let mut out = CameraFrame::new(format, size)?;

    for (p, src) in frame.planes().iter().enumerate() {
        let target = format.plane_size(p, size);
        let packed = packed_rows(src, format.channels(p));
        let resized: Vec<u8> = match format {
            PixelFormat::Rgb24 => {
                let img = RgbImage::from_raw(src.width, src.height, packed)
                    .ok_or_else(|| StitchError::size_mismatch("preview source plane"))?;
                resize(&img, target.width, target.height, FilterType::Triangle).into_raw()
            }
            _ => {
                let img = GrayImage::from_raw(src.width, src.height, packed)
                    .ok_or_else(|| StitchError::size_mismatch("preview source plane"))?;
                resize(&img, target.width, target.height, FilterType::Triangle).into_raw()
            }
        };
        out.plane_mut(p).data.copy_from_slice(&resized);
    }
    Ok(out)
}

fn packed_rows(plane: &Plane, channels: usize) -> Vec<u8> {
    let row = plane.width as usize * channels;
    if plane.stride == row {
        return plane.data[..row * plane.height as usize].to_vec();
    }
    (0..plane.height as usize)
        .flat_map(|y| &plane.data[y * plane.stride..y * plane.stride + row])
        .copied()
        .collect()
}

#[cfg(test)]
#[path = "../../tests/unit/compositor/preview.rs"]
mod tests;
