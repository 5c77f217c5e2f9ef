//! cilia-measure: measure cilium lengths in detector boxes of one image.
//!
//! Resolves the image's calibration sidecar, measures every filament box
//! and prints one report row per kept detection. Optional outputs:
//!
//! - per-box stage timings and counts (`--diagnostics`)
//! - intermediate rasters as PNGs (`--dump-stages DIR`)
//! - the image with boxes drawn on it (`--annotate OUT`)
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin cilia-measure -- [OPTIONS] <IMAGE_PATH>
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`); logs go to stderr.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use cilia_io::ImageReport;
use cilia_pipeline::diagnostics::{Clock, measure_with_diagnostics};
use cilia_pipeline::types::RgbImage;
use cilia_pipeline::{BoundingBox, Calibration, Detection, MeasureConfig};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Measure cilium lengths inside detector bounding boxes.
///
/// Lengths are scaled by the `ContourSize` calibration found in the
/// image's `_metadata.xml` sidecar; without one they are reported as
/// unknown.
#[derive(Parser)]
#[command(name = "cilia-measure", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, TIFF).
    image_path: PathBuf,

    /// A detection box; repeatable. Append `:n` for a non-filament box.
    #[arg(long = "box", value_name = "X1,Y1,X2,Y2[:n]", value_parser = parse_box)]
    boxes: Vec<Detection>,

    /// JSON file of detections (`[{"bbox": [x1, y1, x2, y2], "is_filament": true}]`).
    #[arg(long, value_name = "FILE")]
    detections: Option<PathBuf>,

    /// Settings JSON (detection tool config or a `MeasureConfig`).
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Top brightness percentage kept as foreground; overrides `--config`.
    #[arg(long, value_name = "P")]
    decay_percent: Option<f64>,

    /// Maximum branch pruning passes; overrides `--config`.
    #[arg(long, value_name = "N")]
    max_prune_passes: Option<usize>,

    /// Output the report (and diagnostics) as JSON.
    #[arg(long)]
    json: bool,

    /// Print per-box stage diagnostics to stderr.
    #[arg(long)]
    diagnostics: bool,

    /// Write each filament box's intermediate rasters into this directory.
    #[arg(long, value_name = "DIR")]
    dump_stages: Option<PathBuf>,

    /// Write the image with green filament and red other boxes drawn on it.
    #[arg(long, value_name = "OUT")]
    annotate: Option<PathBuf>,
}

/// Parse `X1,Y1,X2,Y2` with an optional `:n` (non-filament) or `:f`
/// suffix.
fn parse_box(text: &str) -> Result<Detection, String> {
    let (coords, is_filament) = match text.split_once(':') {
        None => (text, true),
        Some((coords, "f")) => (coords, true),
        Some((coords, "n")) => (coords, false),
        Some((_, flag)) => {
            return Err(format!("unknown box flag `{flag}` (expected `f` or `n`)"));
        }
    };

    let values = coords
        .split(',')
        .map(|token| {
            let token = token.trim();
            token
                .parse::<u32>()
                .map_err(|e| format!("invalid coordinate `{token}`: {e}"))
        })
        .collect::<Result<Vec<u32>, String>>()?;
    let [x1, y1, x2, y2] = <[u32; 4]>::try_from(values)
        .map_err(|v| format!("expected 4 coordinates, got {}", v.len()))?;

    Ok(Detection {
        bbox: BoundingBox::new(x1, y1, x2, y2),
        is_filament,
    })
}

/// Build a [`MeasureConfig`] from the settings file and flag overrides.
fn config_from_cli(cli: &Cli) -> Result<MeasureConfig, String> {
    let mut config = match cli.config {
        Some(ref path) => cilia_io::load_config(path).map_err(|e| e.to_string())?,
        None => MeasureConfig::default(),
    };
    if let Some(decay_percent) = cli.decay_percent {
        config.decay_percent = decay_percent;
    }
    if let Some(max_prune_passes) = cli.max_prune_passes {
        config.max_prune_passes = max_prune_passes;
    }
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

/// Detections from `--detections` followed by every `--box`.
fn detections_from_cli(cli: &Cli) -> Result<Vec<Detection>, String> {
    let mut detections = match cli.detections {
        Some(ref path) => cilia_io::load_detections(path).map_err(|e| e.to_string())?,
        None => Vec::new(),
    };
    detections.extend_from_slice(&cli.boxes);
    Ok(detections)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{msg}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), String> {
    let config = config_from_cli(cli)?;
    let detections = detections_from_cli(cli)?;
    if detections.is_empty() {
        tracing::warn!("no detections given, nothing to measure");
    }

    let ImageReport {
        image,
        calibration,
        report,
    } = cilia_io::measure_image(&cli.image_path, &detections, &config)
        .map_err(|e| e.to_string())?;

    if cli.json {
        let json = serde_json::to_string_pretty(&report.rows)
            .map_err(|e| format!("Error serializing report: {e}"))?;
        println!("{json}");
    } else {
        for row in &report.rows {
            println!("{row}");
        }
    }

    if cli.diagnostics || cli.dump_stages.is_some() {
        inspect_boxes(cli, &image, calibration, &detections, &config)?;
    }

    if let Some(ref out) = cli.annotate {
        let canvas = cilia_io::annotate(&image, &report.rows);
        cilia_io::save_rgb(&canvas, out).map_err(|e| e.to_string())?;
        tracing::info!(path = %out.display(), "annotated image written");
    }

    Ok(())
}

/// Re-run every filament box with timing, printing diagnostics and
/// dumping stage rasters as requested.
fn inspect_boxes(
    cli: &Cli,
    image: &RgbImage,
    calibration: Option<Calibration>,
    detections: &[Detection],
    config: &MeasureConfig,
) -> Result<(), String> {
    if let Some(ref dir) = cli.dump_stages {
        std::fs::create_dir_all(dir)
            .map_err(|e| format!("Error creating {}: {e}", dir.display()))?;
    }
    let stem = cli
        .image_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");

    let clock = StdClock::new();
    for (index, detection) in detections.iter().enumerate() {
        if !detection.is_filament {
            continue;
        }
        let (staged, diagnostics) =
            match measure_with_diagnostics(image, detection.bbox, calibration, config, &clock) {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(detection = index, error = %e, "skipping inspection");
                    continue;
                }
            };

        if cli.diagnostics {
            if cli.json {
                let json = serde_json::to_string_pretty(&diagnostics)
                    .map_err(|e| format!("Error serializing diagnostics: {e}"))?;
                eprintln!("{json}");
            } else {
                eprintln!("{}", diagnostics.report());
            }
        }

        if let Some(ref dir) = cli.dump_stages {
            let written = cilia_io::save_stages(dir, &format!("{stem}_box{index}"), &staged)
                .map_err(|e| e.to_string())?;
            tracing::info!(detection = index, files = written.len(), dir = %dir.display(), "stages written");
        }
    }
    Ok(())
}

/// [`Clock`] backed by [`std::time::Instant`], measured from creation.
struct StdClock {
    origin: Instant,
}

impl StdClock {
    fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for StdClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}
