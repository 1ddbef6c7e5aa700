use std::fs::File;
use std::io::{BufReader, BufWriter, Write as _};
use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use panostitch::{
    CameraFrame, Canvas, Cycle, FrameSetAssembler, MapperTemplate, StitchConfig, StitchPipeline,
    StitchedFrame,
};

#[derive(Parser, Debug)]
#[command(name = "panostitch", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a template's geometry, tags and coverage.
    Info(InfoArgs),
    /// Stitch raw input streams into raw output frames.
    Stitch(StitchArgs),
}

#[derive(Parser, Debug)]
struct InfoArgs {
    /// Template file.
    #[arg(long)]
    template: PathBuf,
}

#[derive(Parser, Debug)]
struct StitchArgs {
    /// Stitch config JSON.
    #[arg(long)]
    config: PathBuf,

    /// Raw input stream, once per configured input, in input order.
    #[arg(long = "input", required = true)]
    inputs: Vec<PathBuf>,

    /// Width of the raw input frames before cropping. Defaults to the template input width.
    #[arg(long)]
    input_width: Option<u32>,

    /// Raw output file; every cycle's outputs are written back to back.
    #[arg(long)]
    out: PathBuf,

    /// Raw preview output file.
    #[arg(long)]
    preview_out: Option<PathBuf>,

    /// Stop after this many frame sets.
    #[arg(long)]
    frames: Option<u64>,

    /// Write the first output of the first cycle as a PNG.
    #[arg(long)]
    png: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Info(args) => cmd_info(args),
        Command::Stitch(args) => cmd_stitch(args),
    }
}

fn cmd_info(args: InfoArgs) -> anyhow::Result<()> {
    let t = MapperTemplate::load_path(&args.template)?;
    let stats = t.stats();
    let inputs: Vec<String> = t.input_sizes().iter().map(ToString::to_string).collect();
    let region = t.region();

    println!("template:    {}", args.template.display());
    println!("output:      {}", t.output_size());
    println!("inputs:      {} [{}]", t.input_count(), inputs.join(", "));
    println!(
        "region:      x={} y={} w={} h={}",
        region.x, region.y, region.width, region.height
    );
    println!("blend:       {:?}", t.blend_mode());
    println!("gain:        {:?}", t.gain_hint());
    println!("edge:        x={:?} y={:?}", t.edge_policy().x, t.edge_policy().y);
    println!(
        "coverage:    mapped={} unmapped={} overlap={} max_sources={}",
        stats.mapped, stats.unmapped, stats.overlap, stats.max_sources
    );
    println!("fingerprint: {:016x}", t.fingerprint());
    Ok(())
}

struct Sinks {
    out: BufWriter<File>,
    preview: Option<BufWriter<File>>,
    png: Option<PathBuf>,
    cycles: u64,
}

impl Sinks {
    fn deliver(&mut self, frame: &StitchedFrame) -> anyhow::Result<()> {
        for output in &frame.outputs {
            output.write_packed(&mut self.out)?;
        }
        if let (Some(w), Some(preview)) = (self.preview.as_mut(), frame.preview.as_ref()) {
            preview.write_packed(w)?;
        }
        if let (Some(path), Some(first)) = (self.png.take(), frame.outputs.first()) {
            first
                .to_rgb_image()
                .save(&path)
                .with_context(|| format!("write png '{}'", path.display()))?;
            eprintln!("wrote {}", path.display());
        }
        self.cycles += 1;
        Ok(())
    }
}

fn create(path: &PathBuf) -> anyhow::Result<BufWriter<File>> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    let f = File::create(path).with_context(|| format!("create '{}'", path.display()))?;
    Ok(BufWriter::new(f))
}

fn cmd_stitch(args: StitchArgs) -> anyhow::Result<()> {
    let cfg = StitchConfig::from_path(&args.config)?;
    anyhow::ensure!(
        args.inputs.len() == cfg.inputs,
        "config declares {} inputs, {} --input given",
        cfg.inputs,
        args.inputs.len()
    );

    let templates = cfg.load_templates()?;
    let input_sizes: Vec<Canvas> = templates[0]
        .input_sizes()
        .iter()
        .map(|s| Canvas::new(args.input_width.unwrap_or(s.width), s.height))
        .collect();
    let mut pipeline = StitchPipeline::new(cfg.build_stitcher(templates)?)?;

    let mut readers = args
        .inputs
        .iter()
        .map(|p| {
            File::open(p)
                .map(BufReader::new)
                .with_context(|| format!("open input '{}'", p.display()))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut sinks = Sinks {
        out: create(&args.out)?,
        preview: args.preview_out.as_ref().map(create).transpose()?,
        png: args.png.clone(),
        cycles: 0,
    };

    let mut assembler = FrameSetAssembler::new(cfg.inputs);
    let mut submitted = 0u64;
    'cycles: while args.frames.is_none_or(|n| submitted < n) {
        for (i, r) in readers.iter_mut().enumerate() {
            let cycle = match CameraFrame::read_packed(r, cfg.input_format, input_sizes[i])
                .with_context(|| format!("read input {i}"))?
            {
                Some(frame) => assembler.push(i, frame)?,
                None => assembler.close(i),
            };
            match cycle {
                Cycle::Incomplete => {}
                Cycle::Ready(set) => {
                    pipeline.submit(set)?;
                    submitted += 1;
                    deliver(&mut pipeline, &mut sinks)?;
                }
                Cycle::EndOfStream => break 'cycles,
            }
        }
    }

    pipeline.end_of_stream();
    while deliver(&mut pipeline, &mut sinks)? {}
    sinks.out.flush()?;
    if let Some(w) = sinks.preview.as_mut() {
        w.flush()?;
    }

    let stats = pipeline.stats();
    eprintln!(
        "stitched {} of {} frame sets into {} (pool: {} allocated, {} retained)",
        sinks.cycles,
        stats.submitted,
        args.out.display(),
        stats.pool.alloc_frames,
        stats.pool.retained_frames
    );
    Ok(())
}

/// Hand the next finished cycle to the sinks; `false` when nothing was retrievable.
fn deliver(pipeline: &mut StitchPipeline, sinks: &mut Sinks) -> anyhow::Result<bool> {
    let Some(frame) = pipeline.retrieve()? else {
        return Ok(false);
    };
    sinks.deliver(&frame)?;
    pipeline.recycle(frame.outputs)?;
    Ok(true)
}
