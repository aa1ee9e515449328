use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use globset::{Glob, GlobSet, GlobSetBuilder};
use image::RgbaImage;
use serde::Deserialize;
use tex_bake_core::codec::process_encoder;
use tex_bake_core::config::{
    BasisSettings, FileType, JpegSettings, PackDefinition, PackerOptions, PngSettings,
    ProjectSettings, ScaleFilter,
};
use tex_bake_core::coordinator::RunCoordinator;
use tex_bake_core::error::{PipelineError, Result as CoreResult};
use tex_bake_core::events::{FnSink, PackEvent};
use tex_bake_core::layout::{LayoutProvider, PageRaster};
use tex_bake_core::node::{
    format_compression_rate, PackStatus, META_COMPRESSION_RATE, META_PAGE_COUNT, META_TOTAL_BYTES,
};
use tex_bake_core::pipeline::{CancelToken, PipelineContext};
use tex_bake_core::platform::{basis_supported, CapabilityKey, BASIS_SUPPORTED};
use tracing::{error, info};
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(
    name = "tex-bake",
    about = "Bake folders of images into texture atlas page files",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action=ArgAction::Count, global=true, help_heading = "Logging")]
    verbose: u8,
    /// Quiet mode (overrides verbose)
    #[arg(
        short,
        long,
        default_value_t = false,
        global = true,
        help_heading = "Logging"
    )]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Bake every pack of a project into page files
    Bake(BakeArgs),
    /// Print the detected platform and codec support table
    Platform,
}

#[derive(Parser, Debug, Clone)]
struct BakeArgs {
    // Input/Output
    /// Project root. Every direct subdirectory becomes one pack; a
    /// directory without subdirectories is baked as a single pack.
    #[arg(help_heading = "Input/Output")]
    input: PathBuf,
    /// Output directory
    #[arg(short, long, default_value = "out", help_heading = "Input/Output")]
    out_dir: PathBuf,
    /// YAML project file (settings + explicit pack list; overrides flags)
    #[arg(long, help_heading = "Input/Output")]
    config: Option<PathBuf>,
    /// Include patterns (glob). If set, only matching files are considered
    #[arg(long, help_heading = "Input/Output")]
    include: Vec<String>,
    /// Exclude patterns (glob). Matching files are ignored
    #[arg(long, help_heading = "Input/Output")]
    exclude: Vec<String>,

    // File type
    /// Page file type: png | jpeg | basis
    #[arg(long, value_parser = ["png", "jpeg", "basis"], default_value = "png", help_heading = "File Type")]
    file_type: String,
    /// JPEG quality (1..=100)
    #[arg(long, default_value_t = 90, help_heading = "File Type")]
    jpeg_quality: u8,
    /// Basis: emit KTX2 container instead of .basis
    #[arg(long, default_value_t = false, help_heading = "File Type")]
    ktx2: bool,
    /// Basis: UASTC mode instead of ETC1S
    #[arg(long, default_value_t = false, help_heading = "File Type")]
    uastc: bool,
    /// Basis: ETC1S compression effort (0..=6)
    #[arg(long, default_value_t = 1, help_heading = "File Type")]
    compression_level: u32,
    /// Basis: quality level (1..=255)
    #[arg(long, default_value_t = 128, help_heading = "File Type")]
    quality_level: u32,

    // Layout
    /// Minification filter (mipmap filters request mipmap generation):
    /// nearest|linear|mipmap|mipmap_nearest_nearest|mipmap_linear_nearest|mipmap_nearest_linear|mipmap_linear_linear
    #[arg(long, default_value = "nearest", help_heading = "Layout")]
    min_filter: String,
    /// Magnification filter
    #[arg(long, default_value = "nearest", help_heading = "Layout")]
    mag_filter: String,
    /// Padding between frames
    #[arg(long, default_value_t = 2, help_heading = "Layout")]
    padding: u32,
    /// Max page width
    #[arg(long, default_value_t = 2048, help_heading = "Layout")]
    max_width: u32,
    /// Max page height
    #[arg(long, default_value_t = 2048, help_heading = "Layout")]
    max_height: u32,
    /// Round page dims up to power of two
    #[arg(long, default_value_t = false, help_heading = "Layout")]
    pow2: bool,
    /// Force square pages
    #[arg(long, default_value_t = false, help_heading = "Layout")]
    square: bool,

    // Run
    /// Upper bound (ms) a page writer waits for the shared codec
    #[arg(long, help_heading = "Run")]
    codec_wait_timeout: Option<u64>,
    /// Bake packs on worker threads (requires the `parallel` feature)
    #[arg(long, default_value_t = false, help_heading = "Run")]
    parallel: bool,
}

/// YAML project file: project-wide settings plus an explicit pack list.
#[derive(Debug, Deserialize)]
struct ProjectFile {
    #[serde(default)]
    settings: ProjectSettings,
    #[serde(default)]
    packs: Vec<PackDefinition>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing_with_level(cli.quiet, cli.verbose);
    match &cli.command {
        Commands::Bake(args) => run_bake(args),
        Commands::Platform => {
            print_platform();
            Ok(())
        }
    }
}

fn run_bake(args: &BakeArgs) -> anyhow::Result<()> {
    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("create out_dir {}", args.out_dir.display()))?;

    let (settings, packs) = if let Some(path) = &args.config {
        let file = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let project: ProjectFile = serde_yaml::from_str(&file)
            .with_context(|| format!("parse project file {}", path.display()))?;
        let packs = if project.packs.is_empty() {
            discover_packs(&args.input)?
        } else {
            project.packs
        };
        (project.settings, packs)
    } else {
        (settings_from_flags(args)?, discover_packs(&args.input)?)
    };
    anyhow::ensure!(!packs.is_empty(), "no packs found under {}", args.input.display());
    info!(
        packs = packs.len(),
        file_type = settings.file_type.name(),
        "project loaded"
    );

    let layout = ShelfLayout::new(&args.include, &args.exclude)?;
    let ctx = PipelineContext::new(process_encoder(), &settings);
    if let FileType::Basis(_) = settings.file_type {
        if !basis_supported(ctx.platform) {
            // Fail the run up front with the same message the pipeline
            // would produce per pack.
            error!(platform = %ctx.platform, "codec unavailable on this platform");
        }
    }
    let coordinator = RunCoordinator::with_context(ctx);

    let sink = FnSink(|event: PackEvent| match event.status {
        PackStatus::Running => info!(pack = %event.pack, "pack started"),
        PackStatus::Succeeded => info!(pack = %event.pack, "pack finished"),
        PackStatus::Failed => {
            error!(pack = %event.pack, error = event.error.as_deref().unwrap_or("?"), "pack failed")
        }
        PackStatus::Pending => {}
    });
    let results = coordinator.run_all(
        packs,
        &settings,
        &layout,
        &args.out_dir,
        &sink,
        &CancelToken::new(),
    );

    let mut failed = 0usize;
    for result in &results {
        if result.succeeded() {
            let pages = result
                .metadata_value(META_PAGE_COUNT)
                .and_then(serde_json::Value::as_u64)
                .unwrap_or(0);
            let bytes = result
                .metadata_value(META_TOTAL_BYTES)
                .and_then(serde_json::Value::as_u64)
                .unwrap_or(0);
            let rate = result
                .metadata_value(META_COMPRESSION_RATE)
                .and_then(serde_json::Value::as_f64)
                .map(format_compression_rate)
                .unwrap_or_else(|| "n/a".into());
            info!(
                pack = %result.pack,
                pages,
                bytes,
                compression = %rate,
                "ok"
            );
        } else {
            failed += 1;
        }
    }
    if failed > 0 {
        anyhow::bail!("{failed} of {} packs failed", results.len());
    }
    Ok(())
}

fn settings_from_flags(args: &BakeArgs) -> anyhow::Result<ProjectSettings> {
    let file_type = match args.file_type.as_str() {
        "jpeg" => FileType::Jpeg(JpegSettings {
            quality: args.jpeg_quality,
        }),
        "basis" => FileType::Basis(BasisSettings {
            ktx2: args.ktx2,
            uastc: args.uastc,
            compression_level: args.compression_level,
            quality_level: args.quality_level,
        }),
        _ => FileType::Png(PngSettings::default()),
    };
    Ok(ProjectSettings {
        file_type,
        packer: PackerOptions {
            min_filter: parse_filter(&args.min_filter)?,
            mag_filter: parse_filter(&args.mag_filter)?,
            padding: args.padding,
            extrude: 0,
            max_width: args.max_width,
            max_height: args.max_height,
            power_of_two: args.pow2,
            square: args.square,
        },
        codec_wait_timeout_ms: args.codec_wait_timeout,
        parallel: args.parallel,
    })
}

fn parse_filter(s: &str) -> anyhow::Result<ScaleFilter> {
    s.parse()
        .map_err(|_| anyhow::anyhow!("unknown scale filter: {s}"))
}

/// Every direct subdirectory of `input` becomes one pack named after the
/// directory. A leaf directory is baked as a single pack.
fn discover_packs(input: &Path) -> anyhow::Result<Vec<PackDefinition>> {
    anyhow::ensure!(input.is_dir(), "input {} is not a directory", input.display());
    let mut packs: Vec<PackDefinition> = Vec::new();
    let mut entries: Vec<PathBuf> = fs::read_dir(input)
        .with_context(|| format!("read {}", input.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    entries.sort();
    for dir in entries {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        packs.push(PackDefinition::new(name, dir));
    }
    if packs.is_empty() {
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "atlas".into());
        packs.push(PackDefinition::new(name, input));
    }
    Ok(packs)
}

fn print_platform() {
    let key = CapabilityKey::detect();
    println!("platform: {key}");
    println!(
        "basis universal: {}",
        if basis_supported(key) {
            "supported"
        } else {
            "not supported"
        }
    );
    println!("supported platforms:");
    for supported in BASIS_SUPPORTED {
        println!("  {supported}");
    }
}

/// Minimal shelf placement: frames sorted by height, laid out left to
/// right on shelves, new page when a shelf does not fit. Stands in for a
/// real rectangle packer, which is an external collaborator.
struct ShelfLayout {
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

impl ShelfLayout {
    fn new(include: &[String], exclude: &[String]) -> anyhow::Result<Self> {
        Ok(Self {
            include: build_globset(include)?,
            exclude: build_globset(exclude)?,
        })
    }

    fn gather_frames(&self, dir: &Path) -> CoreResult<Vec<RgbaImage>> {
        let mut paths: Vec<PathBuf> = WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| p.is_file() && is_image(p) && !self.skipped(p))
            .collect();
        paths.sort();

        let mut frames = Vec::with_capacity(paths.len());
        for path in paths {
            let image = image::open(&path)?.into_rgba8();
            frames.push(image);
        }
        Ok(frames)
    }

    fn skipped(&self, path: &Path) -> bool {
        if let Some(inc) = &self.include {
            if !inc.is_match(path) {
                return true;
            }
        }
        if let Some(exc) = &self.exclude {
            if exc.is_match(path) {
                return true;
            }
        }
        false
    }
}

impl LayoutProvider for ShelfLayout {
    fn layout(&self, pack: &PackDefinition, options: &PackerOptions) -> CoreResult<Vec<PageRaster>> {
        let mut frames = self.gather_frames(&pack.source_dir)?;
        if frames.is_empty() {
            return Ok(Vec::new());
        }
        frames.sort_by(|a, b| b.height().cmp(&a.height()));

        let pad = options.padding;
        for frame in &frames {
            if frame.width() > options.max_width || frame.height() > options.max_height {
                return Err(PipelineError::Layout(format!(
                    "frame {}x{} exceeds page limits {}x{} in pack `{}`",
                    frame.width(),
                    frame.height(),
                    options.max_width,
                    options.max_height,
                    pack.canonical_name()
                )));
            }
        }

        // Place frames into (page, x, y) slots.
        let mut placements: Vec<(usize, u32, u32, usize)> = Vec::with_capacity(frames.len());
        let mut page_extents: Vec<(u32, u32)> = Vec::new();
        let (mut page, mut x, mut y, mut shelf) = (0usize, 0u32, 0u32, 0u32);
        page_extents.push((0, 0));
        for (i, frame) in frames.iter().enumerate() {
            let (w, h) = frame.dimensions();
            if x > 0 && x + w > options.max_width {
                x = 0;
                y += shelf + pad;
                shelf = 0;
            }
            if y + h > options.max_height {
                page += 1;
                page_extents.push((0, 0));
                x = 0;
                y = 0;
                shelf = 0;
            }
            placements.push((page, x, y, i));
            let extent = &mut page_extents[page];
            extent.0 = extent.0.max(x + w);
            extent.1 = extent.1.max(y + h);
            x += w + pad;
            shelf = shelf.max(h);
        }

        let mut pages = Vec::with_capacity(page_extents.len());
        for (index, &(mut w, mut h)) in page_extents.iter().enumerate() {
            if options.power_of_two {
                w = w.next_power_of_two();
                h = h.next_power_of_two();
            }
            if options.square {
                let side = w.max(h);
                w = side;
                h = side;
            }
            pages.push(PageRaster::new(index, RgbaImage::new(w, h)));
        }
        for &(page, px, py, i) in &placements {
            image::imageops::replace(&mut pages[page].rgba, &frames[i], px as i64, py as i64);
        }
        Ok(pages)
    }
}

fn build_globset(patterns: &[String]) -> anyhow::Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(Some(builder.build()?))
}

fn is_image(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()),
        Some(ref e) if e == "png" || e == "jpg" || e == "jpeg"
    )
}

fn init_tracing_with_level(quiet: bool, verbose: u8) {
    let level = if quiet {
        "error".to_string()
    } else {
        match verbose {
            0 => "info".into(),
            1 => "debug".into(),
            _ => "trace".into(),
        }
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(level)
        .with_target(false)
        .try_init();
}
