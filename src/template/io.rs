//! Binary template format.
//!
//! Layout (little endian):
//!
//! ```text
//! magic      b"PSTM"
//! version    u32            (1)
//! out        u32 w, u32 h
//! inputs     u32 n, then n x (u32 w, u32 h)
//! region     4 x f64        (x, y, width, height; normalized)
//! tags       u8 blend, u8 gain, u8 edge_x, u8 edge_y
//! entries    u64 count      (must equal w * h)
//! table      count x (u8 k, then k x (u16 source, f32 x, f32 y, f32 weight))
//! ```
//!
//! Nothing may follow the table. The encoding is canonical, so `save(load(bytes)) == bytes`.

use crate::foundation::core::{Canvas, RegionRect};
use crate::foundation::error::{StitchError, StitchResult};
use crate::template::model::{
    BlendMode, EdgeMode, EdgePolicy, GainHint, MapperTemplate, SourceSample, validate_entry,
    validate_header,
};
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;
use xxhash_rust::xxh3::Xxh3;

/// Leading bytes of every template stream.
pub const TEMPLATE_MAGIC: [u8; 4] = *b"PSTM";
/// Current format version.
pub const TEMPLATE_VERSION: u32 = 1;

const PREALLOC_ENTRIES: usize = 1 << 20;

impl MapperTemplate {
    /// Parse a template from a binary stream.
    ///
    /// Any structural problem, including truncation, yields [`StitchError::MalformedTemplate`];
    /// no partially initialized template is ever returned.
    #[tracing::instrument(skip_all)]
    pub fn load<R: Read>(r: R) -> StitchResult<Self> {
        let mut r = TemplateReader {
            inner: BufReader::new(r),
        };

        let magic = r.array::<4>("magic")?;
        if magic != TEMPLATE_MAGIC {
            return Err(StitchError::malformed(format!("bad magic {magic:02x?}")));
        }
        let version = r.u32("version")?;
        if version != TEMPLATE_VERSION {
            return Err(StitchError::malformed(format!(
                "unsupported version {version} (expected {TEMPLATE_VERSION})"
            )));
        }

        let out_size = Canvas::new(r.u32("output width")?, r.u32("output height")?);
        let n_inputs = r.u32("input count")? as usize;
        if n_inputs == 0 || n_inputs > usize::from(u16::MAX) + 1 {
            return Err(StitchError::malformed(format!(
                "input count {n_inputs} outside 1..=65536"
            )));
        }
        let mut inputs = Vec::with_capacity(n_inputs);
        for _ in 0..n_inputs {
            inputs.push(Canvas::new(r.u32("input width")?, r.u32("input height")?));
        }
        let region = RegionRect {
            x: r.f64("region")?,
            y: r.f64("region")?,
            width: r.f64("region")?,
            height: r.f64("region")?,
        };
        let blend = BlendMode::from_tag(r.u8("blend tag")?)
            .ok_or_else(|| StitchError::malformed("unknown blend tag"))?;
        let gain = GainHint::from_tag(r.u8("gain tag")?)
            .ok_or_else(|| StitchError::malformed("unknown gain tag"))?;
        let edge = EdgePolicy {
            x: EdgeMode::from_tag(r.u8("edge tag")?)
                .ok_or_else(|| StitchError::malformed("unknown horizontal edge tag"))?,
            y: EdgeMode::from_tag(r.u8("edge tag")?)
                .ok_or_else(|| StitchError::malformed("unknown vertical edge tag"))?,
        };
        validate_header(out_size, &inputs, &region)?;

        let declared = r.u64("entry count")?;
        let area = u64::from(out_size.width) * u64::from(out_size.height);
        if declared != area {
            return Err(StitchError::malformed(format!(
                "declared {declared} entries for a {out_size} output ({area} pixels)"
            )));
        }

        // The declared area is untrusted until the table has actually been read.
        let area = area as usize;
        let mut offsets = Vec::with_capacity(area.min(PREALLOC_ENTRIES) + 1);
        offsets.push(0u32);
        let mut samples = Vec::with_capacity(area.min(PREALLOC_ENTRIES));
        let mut entry = Vec::<SourceSample>::with_capacity(4);
        for pixel in 0..area {
            let k = r.u8("entry length")?;
            entry.clear();
            for _ in 0..k {
                entry.push(SourceSample {
                    source: r.u16("source index")?,
                    x: r.f32("source x")?,
                    y: r.f32("source y")?,
                    weight: r.f32("weight")?,
                });
            }
            validate_entry(pixel, &entry, &inputs)?;
            samples.extend_from_slice(&entry);
            let end = u32::try_from(samples.len())
                .map_err(|_| StitchError::malformed("template holds more than u32::MAX samples"))?;
            offsets.push(end);
        }

        let mut probe = [0u8; 1];
        match r.inner.read(&mut probe) {
            Ok(0) => {}
            Ok(_) => return Err(StitchError::malformed("trailing bytes after coordinate table")),
            Err(e) => return Err(StitchError::Io(e)),
        }

        Ok(Self {
            out_size,
            inputs,
            region,
            blend,
            gain,
            edge,
            offsets,
            samples,
        })
    }

    /// Serialize the template in the canonical binary layout.
    pub fn save<W: Write>(&self, w: W) -> StitchResult<()> {
        let mut w = BufWriter::new(w);
        w.write_all(&TEMPLATE_MAGIC)?;
        w.write_all(&TEMPLATE_VERSION.to_le_bytes())?;
        w.write_all(&self.out_size.width.to_le_bytes())?;
        w.write_all(&self.out_size.height.to_le_bytes())?;
        w.write_all(&(self.inputs.len() as u32).to_le_bytes())?;
        for s in &self.inputs {
            w.write_all(&s.width.to_le_bytes())?;
            w.write_all(&s.height.to_le_bytes())?;
        }
        for v in [
            self.region.x,
            self.region.y,
            self.region.width,
            self.region.height,
        ] {
            w.write_all(&v.to_le_bytes())?;
        }
        w.write_all(&[
            self.blend.to_tag(),
            self.gain.to_tag(),
            self.edge.x.to_tag(),
            self.edge.y.to_tag(),
        ])?;

        let area = self.offsets.len() - 1;
        w.write_all(&(area as u64).to_le_bytes())?;
        for i in 0..area {
            let entry = self.lookup_index(i);
            w.write_all(&[entry.len() as u8])?;
            for s in entry {
                w.write_all(&s.source.to_le_bytes())?;
                w.write_all(&s.x.to_le_bytes())?;
                w.write_all(&s.y.to_le_bytes())?;
                w.write_all(&s.weight.to_le_bytes())?;
            }
        }
        w.flush()?;
        Ok(())
    }

    /// Load a template from a file on disk.
    pub fn load_path(path: impl AsRef<Path>) -> StitchResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            StitchError::Other(
                anyhow::Error::new(e).context(format!("open template '{}'", path.display())),
            )
        })?;
        let t = Self::load(f).map_err(|e| match e {
            StitchError::MalformedTemplate(msg) => {
                StitchError::malformed(format!("'{}': {msg}", path.display()))
            }
            other => other,
        })?;
        tracing::info!(
            path = %path.display(),
            size = %t.out_size,
            inputs = t.inputs.len(),
            "loaded template"
        );
        Ok(t)
    }

    /// Write the template to a file on disk, replacing any existing file.
    pub fn save_path(&self, path: impl AsRef<Path>) -> StitchResult<()> {
        let path = path.as_ref();
        let f = File::create(path).map_err(|e| {
            StitchError::Other(
                anyhow::Error::new(e).context(format!("create template '{}'", path.display())),
            )
        })?;
        self.save(f)?;
        tracing::info!(path = %path.display(), size = %self.out_size, "saved template");
        Ok(())
    }

    /// 64-bit xxh3 hash of the encoded template.
    pub fn fingerprint(&self) -> u64 {
        let mut h = HashWriter(Xxh3::new());
        // Writing into a hasher cannot fail.
        let _ = self.save(&mut h);
        h.0.digest()
    }
}

struct HashWriter(Xxh3);

impl Write for HashWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

struct TemplateReader<R> {
    inner: BufReader<R>,
}

impl<R: Read> TemplateReader<R> {
    fn array<const N: usize>(&mut self, what: &str) -> StitchResult<[u8; N]> {
        let mut buf = [0u8; N];
        self.inner.read_exact(&mut buf).map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                StitchError::malformed(format!("truncated stream while reading {what}"))
            } else {
                StitchError::Io(e)
            }
        })?;
        Ok(buf)
    }

    fn u8(&mut self, what: &str) -> StitchResult<u8> {
        Ok(self.array::<1>(what)?[0])
    }

    fn u16(&mut self, what: &str) -> StitchResult<u16> {
        Ok(u16::from_le_bytes(self.array(what)?))
    }

    fn u32(&mut self, what: &str) -> StitchResult<u32> {
        Ok(u32::from_le_bytes(self.array(what)?))
    }

    fn u64(&mut self, what: &str) -> StitchResult<u64> {
        Ok(u64::from_le_bytes(self.array(what)?))
    }

    fn f32(&mut self, what: &str) -> StitchResult<f32> {
        Ok(f32::from_le_bytes(self.array(what)?))
    }

    fn f64(&mut self, what: &str) -> StitchResult<f64> {
        Ok(f64::from_le_bytes(self.array(what)?))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/template/io.rs"]
mod tests;
