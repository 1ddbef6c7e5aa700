use crate::foundation::core::Canvas;
use crate::foundation::error::{StitchError, StitchResult};
use crate::foundation::math::{alloc_filled, checked_len};
use smallvec::SmallVec;
use std::io::{Read, Write};

/// Pixel layouts understood by the compositor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// Single 8-bit luma plane.
    Gray8,
    /// Planar Y, U, V with 2x2 subsampled chroma (limited range).
    Yuv420p,
    /// Planar Y, U, V with 2x2 subsampled chroma (full range).
    Yuvj420p,
    /// Packed 8-bit RGB.
    Rgb24,
}

impl PixelFormat {
    /// Number of planes in a frame.
    pub fn plane_count(self) -> usize {
        match self {
            Self::Gray8 | Self::Rgb24 => 1,
            Self::Yuv420p | Self::Yuvj420p => 3,
        }
    }

    /// Interleaved channels per pixel of `plane`.
    pub fn channels(self, _plane: usize) -> usize {
        match self {
            Self::Rgb24 => 3,
            _ => 1,
        }
    }

    /// `true` for formats whose chroma planes are stored at half resolution.
    pub fn is_chroma_subsampled(self) -> bool {
        matches!(self, Self::Yuv420p | Self::Yuvj420p)
    }

    /// Horizontal and vertical subsampling factor of `plane`.
    pub fn subsampling(self, plane: usize) -> u32 {
        if plane > 0 && self.is_chroma_subsampled() {
            2
        } else {
            1
        }
    }

    /// Dimensions of `plane` for a frame of size `canvas`.
    pub fn plane_size(self, plane: usize, canvas: Canvas) -> Canvas {
        let s = self.subsampling(plane);
        Canvas::new(canvas.width / s, canvas.height / s)
    }

    /// The "no signal" value written for unmapped pixels in `plane`.
    ///
    /// Chroma uses the neutral 128; zero chroma would render green.
    pub fn no_signal(self, plane: usize) -> u8 {
        if plane > 0 && self.is_chroma_subsampled() {
            128
        } else {
            0
        }
    }

    /// Check that `canvas` is representable in this format.
    pub fn check_size(self, canvas: Canvas) -> StitchResult<()> {
        if canvas.is_empty() {
            return Err(StitchError::validation(format!(
                "{self:?} frame must be non-empty, got {canvas}"
            )));
        }
        if self.is_chroma_subsampled() && (canvas.width % 2 != 0 || canvas.height % 2 != 0) {
            return Err(StitchError::validation(format!(
                "{self:?} frame dimensions must be even, got {canvas}"
            )));
        }
        Ok(())
    }

    /// Size in bytes of a tightly packed frame.
    pub fn frame_bytes(self, canvas: Canvas) -> StitchResult<usize> {
        let mut total = 0usize;
        for p in 0..self.plane_count() {
            let ps = self.plane_size(p, canvas);
            let row = checked_len(ps.width as usize, self.channels(p))?;
            total = total
                .checked_add(checked_len(row, ps.height as usize)?)
                .ok_or_else(|| StitchError::exhausted("frame size overflow"))?;
        }
        Ok(total)
    }
}

/// Optional horizontal crop applied to every input before sampling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct InputCrop {
    /// First column kept.
    pub x: u32,
    /// Number of columns kept.
    pub width: u32,
}

/// One plane of pixel data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Plane {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Bytes between the starts of consecutive rows.
    pub stride: usize,
    /// Row-major bytes, at least `stride * (height - 1) + width * channels` long.
    pub data: Vec<u8>,
}

/// A rectangular multi-plane pixel buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraFrame {
    format: PixelFormat,
    size: Canvas,
    planes: SmallVec<[Plane; 3]>,
}

impl CameraFrame {
    /// Allocate a tightly packed frame filled with the "no signal" value.
    pub fn new(format: PixelFormat, size: Canvas) -> StitchResult<Self> {
        format.check_size(size)?;
        let mut planes = SmallVec::new();
        for p in 0..format.plane_count() {
            let ps = format.plane_size(p, size);
            let stride = checked_len(ps.width as usize, format.channels(p))?;
            let len = checked_len(stride, ps.height as usize)?;
            planes.push(Plane {
                width: ps.width,
                height: ps.height,
                stride,
                data: alloc_filled(len, format.no_signal(p))?,
            });
        }
        Ok(Self {
            format,
            size,
            planes,
        })
    }

    /// Wrap caller-provided planes, validating their geometry.
    pub fn from_planes(
        format: PixelFormat,
        size: Canvas,
        planes: Vec<Plane>,
    ) -> StitchResult<Self> {
        format.check_size(size)?;
        if planes.len() != format.plane_count() {
            return Err(StitchError::size_mismatch(format!(
                "{format:?} expects {} planes, got {}",
                format.plane_count(),
                planes.len()
            )));
        }
        for (p, plane) in planes.iter().enumerate() {
            let expect = format.plane_size(p, size);
            if plane.width != expect.width || plane.height != expect.height {
                return Err(StitchError::size_mismatch(format!(
                    "plane {p} is {}x{}, expected {expect}",
                    plane.width, plane.height
                )));
            }
            let row = plane.width as usize * format.channels(p);
            if plane.stride < row {
                return Err(StitchError::size_mismatch(format!(
                    "plane {p} stride {} is shorter than a row ({row} bytes)",
                    plane.stride
                )));
            }
            let needed = plane.stride * (plane.height as usize - 1) + row;
            if plane.data.len() < needed {
                return Err(StitchError::size_mismatch(format!(
                    "plane {p} holds {} bytes, needs {needed}",
                    plane.data.len()
                )));
            }
        }
        Ok(Self {
            format,
            size,
            planes: planes.into_iter().collect(),
        })
    }

    /// Build a frame from tightly packed bytes (all planes back to back).
    pub fn from_packed(format: PixelFormat, size: Canvas, bytes: &[u8]) -> StitchResult<Self> {
        let expected = format.frame_bytes(size)?;
        if bytes.len() != expected {
            return Err(StitchError::size_mismatch(format!(
                "packed {format:?} {size} frame needs {expected} bytes, got {}",
                bytes.len()
            )));
        }
        let mut frame = Self::new(format, size)?;
        let mut off = 0usize;
        for plane in frame.planes.iter_mut() {
            let len = plane.data.len();
            plane.data.copy_from_slice(&bytes[off..off + len]);
            off += len;
        }
        Ok(frame)
    }

    /// Read one tightly packed frame. Returns `Ok(None)` on a clean end of stream.
    pub fn read_packed<R: Read>(
        r: &mut R,
        format: PixelFormat,
        size: Canvas,
    ) -> StitchResult<Option<Self>> {
        let mut frame = Self::new(format, size)?;
        for (p, plane) in frame.planes.iter_mut().enumerate() {
            let mut filled = 0usize;
            while filled < plane.data.len() {
                let n = r.read(&mut plane.data[filled..])?;
                if n == 0 {
                    if p == 0 && filled == 0 {
                        return Ok(None);
                    }
                    return Err(StitchError::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "truncated raw frame",
                    )));
                }
                filled += n;
            }
        }
        Ok(Some(frame))
    }

    /// Write the frame tightly packed, dropping any row padding.
    pub fn write_packed<W: Write>(&self, w: &mut W) -> StitchResult<()> {
        for (p, plane) in self.planes.iter().enumerate() {
            let row = plane.width as usize * self.format.channels(p);
            for y in 0..plane.height as usize {
                let start = y * plane.stride;
                w.write_all(&plane.data[start..start + row])?;
            }
        }
        Ok(())
    }

    /// Pixel format.
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Frame size (luma resolution).
    pub fn size(&self) -> Canvas {
        self.size
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.size.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.size.height
    }

    /// Borrow plane `p`.
    pub fn plane(&self, p: usize) -> &Plane {
        &self.planes[p]
    }

    /// Mutably borrow plane `p`.
    pub fn plane_mut(&mut self, p: usize) -> &mut Plane {
        &mut self.planes[p]
    }

    /// All planes in format order.
    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    pub(crate) fn planes_mut(&mut self) -> &mut [Plane] {
        &mut self.planes
    }

    /// Read one channel value. Panics when out of bounds.
    pub fn pixel(&self, plane: usize, channel: usize, x: u32, y: u32) -> u8 {
        let pl = &self.planes[plane];
        let ch = self.format.channels(plane);
        pl.data[y as usize * pl.stride + x as usize * ch + channel]
    }

    /// Write one channel value. Panics when out of bounds.
    pub fn set_pixel(&mut self, plane: usize, channel: usize, x: u32, y: u32, v: u8) {
        let ch = self.format.channels(plane);
        let pl = &mut self.planes[plane];
        pl.data[y as usize * pl.stride + x as usize * ch + channel] = v;
    }

    /// Overwrite every plane with its "no signal" value.
    pub fn fill_no_signal(&mut self) {
        for (p, plane) in self.planes.iter_mut().enumerate() {
            plane.data.fill(self.format.no_signal(p));
        }
    }

    /// Borrow the frame for sampling, optionally restricted to a horizontal crop.
    pub fn view(&self, crop: Option<InputCrop>) -> StitchResult<FrameView<'_>> {
        let (x0, width) = match crop {
            None => (0, self.size.width),
            Some(c) => {
                if c.width == 0 || u64::from(c.x) + u64::from(c.width) > u64::from(self.size.width)
                {
                    return Err(StitchError::size_mismatch(format!(
                        "crop {}+{} exceeds frame width {}",
                        c.x, c.width, self.size.width
                    )));
                }
                if self.format.is_chroma_subsampled() && (c.x % 2 != 0 || c.width % 2 != 0) {
                    return Err(StitchError::size_mismatch(
                        "crop must be even-aligned for subsampled chroma",
                    ));
                }
                (c.x, c.width)
            }
        };

        let mut planes = SmallVec::new();
        for (p, plane) in self.planes.iter().enumerate() {
            let s = self.format.subsampling(p);
            let channels = self.format.channels(p);
            let offset = (x0 / s) as usize * channels;
            planes.push(PlaneView {
                data: &plane.data[offset..],
                width: width / s,
                height: plane.height,
                stride: plane.stride,
                channels,
            });
        }
        Ok(FrameView {
            format: self.format,
            size: Canvas::new(width, self.size.height),
            planes,
        })
    }

    /// Convert to an RGB image (BT.601) for previews and snapshots.
    pub fn to_rgb_image(&self) -> image::RgbImage {
        let (w, h) = (self.size.width, self.size.height);
        match self.format {
            PixelFormat::Gray8 => image::RgbImage::from_fn(w, h, |x, y| {
                let v = self.pixel(0, 0, x, y);
                image::Rgb([v, v, v])
            }),
            PixelFormat::Rgb24 => image::RgbImage::from_fn(w, h, |x, y| {
                image::Rgb([
                    self.pixel(0, 0, x, y),
                    self.pixel(0, 1, x, y),
                    self.pixel(0, 2, x, y),
                ])
            }),
            PixelFormat::Yuv420p | PixelFormat::Yuvj420p => {
                let full_range = self.format == PixelFormat::Yuvj420p;
                image::RgbImage::from_fn(w, h, |x, y| {
                    let luma = f32::from(self.pixel(0, 0, x, y));
                    let u = f32::from(self.pixel(1, 0, x / 2, y / 2)) - 128.0;
                    let v = f32::from(self.pixel(2, 0, x / 2, y / 2)) - 128.0;
                    image::Rgb(yuv_to_rgb(luma, u, v, full_range))
                })
            }
        }
    }
}

fn yuv_to_rgb(luma: f32, u: f32, v: f32, full_range: bool) -> [u8; 3] {
    use crate::foundation::math::round_to_u8;
    let (l, u, v) = if full_range {
        (luma, u, v)
    } else {
        (
            (luma - 16.0) * (255.0 / 219.0),
            u * (255.0 / 224.0),
            v * (255.0 / 224.0),
        )
    };
    [
        round_to_u8(l + 1.402 * v),
        round_to_u8(l - 0.344_136 * u - 0.714_136 * v),
        round_to_u8(l + 1.772 * u),
    ]
}

/// Borrowed, possibly cropped, read-only view of one plane.
#[derive(Clone, Copy, Debug)]
pub struct PlaneView<'a> {
    pub(crate) data: &'a [u8],
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) stride: usize,
    pub(crate) channels: usize,
}

impl PlaneView<'_> {
    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Read channel `ch` at an in-bounds pixel.
    #[inline]
    pub fn get(&self, x: usize, y: usize, ch: usize) -> u8 {
        self.data[y * self.stride + x * self.channels + ch]
    }
}

/// Borrowed view of a whole frame, as seen by the sampler.
#[derive(Clone, Debug)]
pub struct FrameView<'a> {
    format: PixelFormat,
    size: Canvas,
    planes: SmallVec<[PlaneView<'a>; 3]>,
}

impl<'a> FrameView<'a> {
    /// Pixel format of the underlying frame.
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Visible size after cropping.
    pub fn size(&self) -> Canvas {
        self.size
    }

    /// Borrow plane `p`.
    pub fn plane(&self, p: usize) -> &PlaneView<'a> {
        &self.planes[p]
    }
}

#[cfg(test)]
#[path = "../../tests/unit/frame/buffer.rs"]
mod tests;
