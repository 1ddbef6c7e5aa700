use crate::compositor::engine::{CompositeOpts, Compositor, OutputLayout, OutputSpec};
use crate::compositor::sample::Interpolation;
use crate::foundation::core::{Canvas, RegionRect};
use crate::foundation::error::{StitchError, StitchResult};
use crate::frame::buffer::{InputCrop, PixelFormat};
use crate::frame::pool::FramePoolOpts;
use crate::gain::compensator::GainCompensator;
use crate::gain::mode::{GainMode, GainSchedule};
use crate::pipeline::stitch_pipeline::StitchPipeline;
use crate::pipeline::stitcher::Stitcher;
use crate::template::model::{BlendMode, MapperTemplate};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One output template and its per-output overrides.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Template file, relative to the config file when loaded with `from_path`.
    pub template: PathBuf,
    /// Blend override; the template's tag otherwise.
    #[serde(default)]
    pub blend: Option<BlendMode>,
    /// Gain override; the template's gain hint otherwise.
    #[serde(default)]
    pub gain: Option<GainMode>,
    /// Per-frame gains file, an alternative to `gain`.
    #[serde(default)]
    pub gain_schedule: Option<PathBuf>,
    /// Placement override on the merged canvas.
    #[serde(default)]
    pub region: Option<RegionRect>,
}

/// Deployment configuration, already typed.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StitchConfig {
    /// Number of input streams.
    pub inputs: usize,
    /// Pixel format shared by inputs and outputs.
    pub input_format: PixelFormat,
    /// Horizontal crop applied to every input.
    #[serde(default)]
    pub crop: Option<InputCrop>,
    /// Output templates, in output order.
    pub outputs: Vec<OutputConfig>,
    /// Merge every template into one canvas of this size.
    #[serde(default)]
    pub canvas: Option<Canvas>,
    /// Size of the downscaled preview of the first output.
    #[serde(default)]
    pub preview: Option<Canvas>,
    /// Source sampling filter.
    #[serde(default)]
    pub interpolation: Interpolation,
    /// Fill value for out-of-range neighbours; see [`CompositeOpts::fill`].
    #[serde(default)]
    pub fill: Option<[u8; 3]>,
    /// Rayon worker count for row-parallel composition.
    #[serde(default)]
    pub worker_threads: Option<usize>,
    /// Output buffer pool limits.
    #[serde(default)]
    pub pool: FramePoolOpts,
}

impl StitchConfig {
    /// Parse and validate JSON.
    pub fn from_reader<R: std::io::Read>(r: R) -> StitchResult<Self> {
        let cfg: Self = serde_json::from_reader(r)
            .map_err(|e| StitchError::validation(format!("parse stitch config JSON: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a JSON file; relative template and schedule paths resolve against its directory.
    pub fn from_path(path: impl AsRef<Path>) -> StitchResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            StitchError::validation(format!("open stitch config '{}': {e}", path.display()))
        })?;
        let mut cfg = Self::from_reader(BufReader::new(f))?;
        if let Some(dir) = path.parent() {
            cfg.resolve_relative_to(dir);
        }
        Ok(cfg)
    }

    fn resolve_relative_to(&mut self, dir: &Path) {
        let rebase = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = dir.join(&*p);
            }
        };
        for out in &mut self.outputs {
            rebase(&mut out.template);
            if let Some(schedule) = out.gain_schedule.as_mut() {
                rebase(schedule);
            }
        }
    }

    /// Reject inconsistent values before any template is read.
    pub fn validate(&self) -> StitchResult<()> {
        if self.inputs == 0 || self.inputs > usize::from(u16::MAX) {
            return Err(StitchError::validation(format!(
                "'inputs' must be in 1..={}, got {}",
                u16::MAX,
                self.inputs
            )));
        }
        if self.outputs.is_empty() {
            return Err(StitchError::validation("'outputs' must list at least one template"));
        }
        if let Some(crop) = self.crop {
            if crop.width == 0 {
                return Err(StitchError::validation("'crop.width' must be >= 1"));
            }
            if self.input_format.is_chroma_subsampled() && (crop.x % 2 != 0 || crop.width % 2 != 0)
            {
                return Err(StitchError::validation(
                    "'crop' must be even-aligned for chroma-subsampled formats",
                ));
            }
        }
        if let Some(canvas) = self.canvas {
            self.input_format.check_size(canvas)?;
        }
        if let Some(preview) = self.preview {
            self.input_format.check_size(preview)?;
        }
        if self.worker_threads == Some(0) {
            return Err(StitchError::validation("'worker_threads' must be >= 1 when set"));
        }

        for (i, out) in self.outputs.iter().enumerate() {
            if out.gain.is_some() && out.gain_schedule.is_some() {
                return Err(StitchError::validation(format!(
                    "output {i}: 'gain' and 'gain_schedule' are mutually exclusive"
                )));
            }
            if let Some(gain) = &out.gain {
                gain.validate(self.inputs)
                    .map_err(|e| StitchError::validation(format!("output {i}: {e}")))?;
            }
            if let Some(region) = out.region {
                region.validate()?;
                if self.canvas.is_none() {
                    return Err(StitchError::validation(format!(
                        "output {i}: 'region' needs a merged 'canvas'"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Output layout implied by `canvas`.
    pub fn layout(&self) -> OutputLayout {
        match self.canvas {
            Some(c) => OutputLayout::Merged {
                width: c.width,
                height: c.height,
            },
            None => OutputLayout::Separate,
        }
    }

    /// Load every template and check it against the input count.
    pub fn load_templates(&self) -> StitchResult<Vec<Arc<MapperTemplate>>> {
        self.outputs
            .iter()
            .map(|out| {
                let t = MapperTemplate::load_path(&out.template)?;
                if t.input_count() != self.inputs {
                    return Err(StitchError::size_mismatch(format!(
                        "template '{}' maps {} inputs, config declares {}",
                        out.template.display(),
                        t.input_count(),
                        self.inputs
                    )));
                }
                Ok(Arc::new(t))
            })
            .collect()
    }

    /// Build the synchronous core from already loaded templates.
    pub fn build_stitcher(&self, templates: Vec<Arc<MapperTemplate>>) -> StitchResult<Stitcher> {
        if templates.len() != self.outputs.len() {
            return Err(StitchError::validation(format!(
                "{} templates for {} configured outputs",
                templates.len(),
                self.outputs.len()
            )));
        }

        let mut specs = Vec::with_capacity(templates.len());
        let mut modes = Vec::with_capacity(templates.len());
        for (out, template) in self.outputs.iter().zip(templates) {
            modes.push(match (&out.gain, &out.gain_schedule) {
                (Some(mode), _) => mode.clone(),
                (None, Some(path)) => {
                    GainMode::Scheduled(GainSchedule::from_path(path, self.inputs)?)
                }
                (None, None) => GainMode::from_hint(template.gain_hint()),
            });
            let mut spec = OutputSpec::new(template);
            if let Some(blend) = out.blend {
                spec = spec.with_blend(blend);
            }
            if let Some(region) = out.region {
                spec = spec.with_region(region);
            }
            specs.push(spec);
        }

        let opts = CompositeOpts {
            interpolation: self.interpolation,
            fill: self.fill,
            threads: self.worker_threads,
        };
        let compositor = Compositor::new(self.input_format, self.crop, specs, self.layout(), opts)?;
        let gains = GainCompensator::new(modes, self.inputs, self.interpolation)?;
        Stitcher::new(compositor, gains, self.preview, self.pool)
    }

    /// Load templates and start an asynchronous pipeline.
    pub fn build_pipeline(&self) -> StitchResult<StitchPipeline> {
        let templates = self.load_templates()?;
        StitchPipeline::new(self.build_stitcher(templates)?)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/config/stitch.rs"]
mod tests;
