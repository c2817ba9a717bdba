// ============================================================================
// PaintCore CLI: headless batch editing via command-line arguments
// ============================================================================
//
// Usage examples:
//   paintcore --input photo.png --filter invert --output result.png
//   paintcore -i photo.jpg -f brightness=20 -f blur=2 -o out.png
//   paintcore -i "shots/*.png" --crop 10,10,200,150 --output-dir cropped/
//   paintcore -i art.pcore --output flat.png
//
// Each input is opened in its own EditorSession over the local backend, so
// filters land in history and crops go through the same path as the editor.

use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use image::ImageFormat;

use crate::canvas::Document;
use crate::error::{EditorError, EditorResult};
use crate::geometry::{PixelRect, RectF};
use crate::ops::filters::FilterParams;
use crate::project::EditorSession;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// PaintCore headless image processor.
#[derive(Parser, Debug)]
#[command(
    name = "paintcore",
    version,
    about = "PaintCore headless batch image editor",
    long_about = "Apply filters and crops to images or .pcore projects without a UI.\n\n\
                  Example:\n  \
                  paintcore --input photo.png --filter grayscale --output result.png\n  \
                  paintcore -i \"*.jpg\" -f contrast=30 --output-dir out/"
)]
pub struct CliArgs {
    /// Input file(s): .pcore projects or raster images. Glob patterns accepted.
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Filter to apply to the active layer, in order. Repeatable.
    /// One of: invert, grayscale, brightness=N, contrast=N, saturation=N, blur=R.
    #[arg(short, long = "filter", value_name = "FILTER", value_parser = parse_filter)]
    pub filters: Vec<FilterParams>,

    /// Crop every layer to X,Y,W,H after filtering.
    #[arg(short, long, value_name = "X,Y,W,H", value_parser = parse_crop)]
    pub crop: Option<PixelRect>,

    /// Output file. `.pcore` writes a project; anything else exports the
    /// flattened image. Only valid for single-file input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing; files keep their stem.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output type when --output is not given: `pcore` or an image
    /// extension such as png, jpg, webp.
    #[arg(long, default_value = "png", value_name = "EXT", value_parser = parse_output_format)]
    pub format: OutputFormat,

    /// Debug-level logging and per-file timing.
    #[arg(short, long)]
    pub verbose: bool,
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        log::error!("cli: no input files matched the given pattern(s)");
        return ExitCode::FAILURE;
    }

    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        log::error!(
            "cli: {} input files given but --output only accepts a single file; use --output-dir",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        log::error!("cli: could not create output directory '{}': {}", dir.display(), e);
        return ExitCode::FAILURE;
    }

    let total = inputs.len();
    let mut any_failure = false;
    let mut namer = OutputNamer::new(args.format, args.output_dir.clone());

    for (idx, input) in inputs.iter().enumerate() {
        log::info!("cli: [{}/{}] {} ({:?})", idx + 1, total, input.path.display(), input.kind);
        let file_start = Instant::now();

        let Some(output_path) = args.output.clone().or_else(|| namer.name_for(input)) else {
            log::error!("cli: cannot determine output path for '{}'", input.path.display());
            any_failure = true;
            continue;
        };

        match process(input, &output_path, &args.filters, args.crop) {
            Ok(()) => log::info!(
                "cli: -> {} ({:.0}ms)",
                output_path.display(),
                file_start.elapsed().as_secs_f64() * 1000.0
            ),
            Err(e) => {
                log::error!("cli: {}: {}", input.path.display(), e);
                any_failure = true;
            }
        }
    }

    if any_failure {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

/// Load, filter, crop and save one file.
pub fn run_one(
    input: &Path,
    output: &Path,
    filters: &[FilterParams],
    crop: Option<PixelRect>,
) -> EditorResult<()> {
    process(&BatchInput::new(input), output, filters, crop)
}

fn process(
    input: &BatchInput,
    output: &Path,
    filters: &[FilterParams],
    crop: Option<PixelRect>,
) -> EditorResult<()> {
    let document = input.load()?;
    let mut session = EditorSession::with_local_backend(document);

    for filter in filters {
        session.apply_filter(*filter)?;
    }

    if let Some(rect) = crop {
        session.set_crop_region(RectF::new(
            rect.x as f64,
            rect.y as f64,
            rect.width as f64,
            rect.height as f64,
        ))?;
        let result = session.commit_crop()?;
        log::debug!("cli: cropped to {}x{}", result.new_width, result.new_height);
    }

    for notice in session.poll_sync() {
        if notice.is_failure() {
            log::warn!("cli: backend task '{}' failed", notice.task());
        }
    }
    session.save(output)
}

// ============================================================================
// Argument parsers
// ============================================================================

/// `invert`, `grayscale`, or `name=value` for the parameterised filters.
pub fn parse_filter(raw: &str) -> Result<FilterParams, String> {
    let (name, value) = match raw.split_once('=') {
        Some((n, v)) => (n.trim(), Some(v.trim())),
        None => (raw.trim(), None),
    };
    let number = |what: &str| -> Result<f32, String> {
        value
            .ok_or_else(|| format!("filter '{}' needs a value, e.g. {}=10", what, what))?
            .parse::<f32>()
            .map_err(|e| format!("invalid value for '{}': {}", what, e))
    };
    match name.to_ascii_lowercase().as_str() {
        "invert" => Ok(FilterParams::Invert),
        "grayscale" | "greyscale" => Ok(FilterParams::Grayscale),
        "brightness" => Ok(FilterParams::Brightness {
            value: number("brightness")?.round() as i32,
        }),
        "contrast" => Ok(FilterParams::Contrast {
            value: number("contrast")?,
        }),
        "saturation" => Ok(FilterParams::Saturation {
            value: number("saturation")?,
        }),
        "blur" => {
            let radius = number("blur")?;
            if radius < 0.0 {
                return Err("blur radius must not be negative".into());
            }
            Ok(FilterParams::GaussianBlur { radius })
        }
        other => Err(format!("unknown filter '{}'", other)),
    }
}

/// `X,Y,W,H` with non-zero width and height.
pub fn parse_crop(raw: &str) -> Result<PixelRect, String> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    let [x, y, w, h] = parts.as_slice() else {
        return Err(format!("expected X,Y,W,H, got '{}'", raw));
    };
    let int = |s: &str| s.parse::<i32>().map_err(|e| format!("'{}': {}", s, e));
    let size = |s: &str| s.parse::<u32>().map_err(|e| format!("'{}': {}", s, e));
    let rect = PixelRect::new(int(*x)?, int(*y)?, size(*w)?, size(*h)?);
    if rect.is_empty() {
        return Err(EditorError::InvalidOperation("crop size must be greater than zero".into())
            .to_string());
    }
    Ok(rect)
}

// ============================================================================
// Inputs and outputs
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputKind {
    /// `.pcore`, read with every layer intact.
    Project,
    /// Anything `image` decodes; opens as one layer.
    Raster,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchInput {
    pub path: PathBuf,
    pub kind: InputKind,
}

impl BatchInput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let kind = if crate::io::is_project_path(&path) {
            InputKind::Project
        } else {
            InputKind::Raster
        };
        Self { path, kind }
    }

    pub fn load(&self) -> EditorResult<Document> {
        match self.kind {
            InputKind::Project => {
                let file = BufReader::new(File::open(&self.path)?);
                let mut doc = crate::io::read_project(file)?;
                doc.source_path = Some(self.path.clone());
                Ok(doc)
            }
            InputKind::Raster => crate::io::load_document(&self.path),
        }
    }
}

/// Expand each pattern with `glob`, keeping first-seen order and skipping
/// directories and duplicates. A pattern with no glob match is still taken
/// literally when it names an existing file.
pub fn resolve_inputs(patterns: &[String]) -> Vec<BatchInput> {
    let mut seen = HashSet::new();
    let mut inputs = Vec::new();
    for pattern in patterns {
        let mut paths: Vec<PathBuf> = match glob::glob(pattern) {
            Ok(entries) => entries.flatten().collect(),
            Err(e) => {
                log::warn!("cli: invalid glob '{}': {}", pattern, e);
                Vec::new()
            }
        };
        if paths.is_empty() && Path::new(pattern).is_file() {
            paths.push(PathBuf::from(pattern));
        }
        if paths.is_empty() {
            log::warn!("cli: pattern '{}' matched no files", pattern);
        }
        for path in paths.into_iter().filter(|p| p.is_file()) {
            if seen.insert(path.clone()) {
                inputs.push(BatchInput::new(path));
            }
        }
    }
    inputs
}

/// What each output is written as when `--output` is not given.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Project,
    Image(ImageFormat),
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Project => crate::io::PROJECT_EXTENSION,
            OutputFormat::Image(f) => f.extensions_str().first().copied().unwrap_or("png"),
        }
    }
}

/// `pcore` or any extension `image` can encode.
pub fn parse_output_format(raw: &str) -> Result<OutputFormat, String> {
    let ext = raw.trim().trim_start_matches('.');
    if ext.eq_ignore_ascii_case(crate::io::PROJECT_EXTENSION) {
        return Ok(OutputFormat::Project);
    }
    ImageFormat::from_extension(ext)
        .filter(|f| f.writing_enabled())
        .map(OutputFormat::Image)
        .ok_or_else(|| format!("unsupported output format '{}'", raw))
}

/// Hands out output paths for a batch: `<stem>.<ext>` in the output
/// directory (or next to the input), with `_out` or a numeric suffix when
/// the name would overwrite the input or an earlier output.
pub struct OutputNamer {
    format: OutputFormat,
    dir: Option<PathBuf>,
    taken: HashSet<PathBuf>,
}

impl OutputNamer {
    pub fn new(format: OutputFormat, dir: Option<PathBuf>) -> Self {
        Self {
            format,
            dir,
            taken: HashSet::new(),
        }
    }

    pub fn name_for(&mut self, input: &BatchInput) -> Option<PathBuf> {
        let stem = input.path.file_stem()?.to_string_lossy().into_owned();
        let dir = match &self.dir {
            Some(d) => d.clone(),
            None => input.path.parent().unwrap_or(Path::new(".")).to_path_buf(),
        };
        let ext = self.format.extension();
        let mut candidate = dir.join(format!("{}.{}", stem, ext));
        if candidate == input.path {
            candidate = dir.join(format!("{}_out.{}", stem, ext));
        }
        let mut n = 1;
        while self.taken.contains(&candidate) || candidate == input.path {
            candidate = dir.join(format!("{}_{}.{}", stem, n, ext));
            n += 1;
        }
        self.taken.insert(candidate.clone());
        Some(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_names_and_values() {
        assert_eq!(parse_filter("invert"), Ok(FilterParams::Invert));
        assert_eq!(parse_filter("Greyscale"), Ok(FilterParams::Grayscale));
        assert_eq!(
            parse_filter("brightness=-20"),
            Ok(FilterParams::Brightness { value: -20 })
        );
        assert_eq!(
            parse_filter("blur = 2.5"),
            Ok(FilterParams::GaussianBlur { radius: 2.5 })
        );
        assert!(parse_filter("contrast").is_err());
        assert!(parse_filter("blur=-1").is_err());
        assert!(parse_filter("sharpen=3").is_err());
    }

    #[test]
    fn crop_rect_parsing() {
        assert_eq!(parse_crop("10, 10,50,50"), Ok(PixelRect::new(10, 10, 50, 50)));
        assert_eq!(parse_crop("-5,0,3,4"), Ok(PixelRect::new(-5, 0, 3, 4)));
        assert!(parse_crop("1,2,3").is_err());
        assert!(parse_crop("0,0,0,10").is_err());
        assert!(parse_crop("0,0,-1,10").is_err());
    }

    #[test]
    fn output_format_choices() {
        assert_eq!(parse_output_format("pcore"), Ok(OutputFormat::Project));
        assert_eq!(parse_output_format(".PNG"), Ok(OutputFormat::Image(ImageFormat::Png)));
        assert_eq!(parse_output_format("jpeg"), Ok(OutputFormat::Image(ImageFormat::Jpeg)));
        assert_eq!(OutputFormat::Project.extension(), "pcore");
        assert!(parse_output_format("docx").is_err());
    }

    #[test]
    fn input_kind_follows_extension() {
        assert_eq!(BatchInput::new("a/b.pcore").kind, InputKind::Project);
        assert_eq!(BatchInput::new("a/b.PCORE").kind, InputKind::Project);
        assert_eq!(BatchInput::new("a/b.png").kind, InputKind::Raster);
    }

    #[test]
    fn clap_accepts_repeated_filters() {
        let args = CliArgs::try_parse_from([
            "paintcore", "-i", "a.png", "-f", "invert", "--filter", "contrast=15", "--crop",
            "1,2,3,4", "-o", "b.png",
        ])
        .unwrap();
        assert_eq!(args.format, OutputFormat::Image(ImageFormat::Png));
        assert_eq!(args.filters.len(), 2);
        assert_eq!(args.crop, Some(PixelRect::new(1, 2, 3, 4)));
        assert!(!args.verbose);
        assert!(CliArgs::try_parse_from(["paintcore", "-f", "invert"]).is_err());
    }
}
