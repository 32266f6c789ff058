// Helipad command line interface
// Runs landing pad detection on a live camera or a still image

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use helipad_eye::pipeline::DetectionResult;
use helipad_eye::{overlay, CameraRegistry, DetectionStage, LandingConfig, PipelineHandle, PipelineScheduler, Template};
use opencv::{core::Vector, highgui, imgcodecs, prelude::*};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const STATS_INTERVAL: Duration = Duration::from_secs(5);
const ESC: i32 = 27;

#[derive(Parser)]
#[command(name = "helipad")]
#[command(about = "Landing pad detection for a downward-facing camera", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (JSON)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Directory holding template images
    #[arg(long, global = true)]
    template_dir: Option<PathBuf>,

    /// Template name, resolved as <template-dir>/<name>.png
    #[arg(long, global = true)]
    template: Option<String>,

    /// Shape similarity threshold (lower is stricter)
    #[arg(long, global = true)]
    threshold: Option<f64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect continuously on a camera until Ctrl-C
    Run {
        /// Camera device index
        #[arg(long)]
        camera: Option<u32>,

        /// Show annotated frame and mask windows (ESC quits)
        #[arg(long)]
        display: bool,

        /// Print one JSON line per stable guidance update
        #[arg(long)]
        json: bool,
    },

    /// Run one detection cycle on an image file
    Detect {
        /// Input image
        image: PathBuf,

        /// Write the annotated image here
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let mut config = match &cli.config {
        Some(path) => LandingConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => LandingConfig::default(),
    };
    if let Some(dir) = &cli.template_dir {
        config.template.dir = dir.clone();
    }
    if let Some(name) = &cli.template {
        config.template.name = name.clone();
    }
    if let Some(threshold) = cli.threshold {
        config.matcher.threshold = threshold;
    }

    match cli.command {
        Commands::Run { camera, display, json } => {
            if let Some(id) = camera {
                config.camera.camera_id = id;
            }
            config.validate().map_err(|e| anyhow!("Invalid configuration: {}", e))?;
            run(config, display, json).await
        }
        Commands::Detect { image, output } => {
            config.validate().map_err(|e| anyhow!("Invalid configuration: {}", e))?;
            detect(&config, &image, output.as_deref())
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    let level: tracing::Level = level
        .parse()
        .map_err(|_| anyhow!("Invalid log level: {} (expected error, warn, info, debug or trace)", level))?;
    tracing_subscriber::fmt().with_max_level(level).with_target(false).init();
    Ok(())
}

fn load_template(config: &LandingConfig) -> anyhow::Result<Template> {
    let path = Template::resolve_path(&config.template).context("Template lookup failed")?;
    Template::load(&path, &config.preprocess).with_context(|| format!("Failed to load template {}", path.display()))
}

async fn run(config: LandingConfig, display: bool, json: bool) -> anyhow::Result<()> {
    let template = load_template(&config)?;

    let registry = Arc::new(CameraRegistry::new());
    let camera_id = config.camera.camera_id;
    let lease = registry
        .open(camera_id, "helipad-cli", &config.camera)
        .with_context(|| format!("Failed to open camera {}", camera_id))?;

    let stage = DetectionStage::with_template(template, &config);
    let handle = PipelineScheduler::new(Arc::new(lease), stage, config.scheduler.clone())
        .start()
        .context("Failed to start pipeline")?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, shutting down");
                stop.store(true, Ordering::Release);
            }
        });
    }

    let consumer = tokio::task::spawn_blocking(move || consume(handle, &stop, display, json));
    consumer.await.context("Consumer task panicked")??;

    registry.release_all();
    info!("Shutdown complete");
    Ok(())
}

fn consume(mut handle: PipelineHandle, stop: &AtomicBool, display: bool, json: bool) -> anyhow::Result<()> {
    let mut last_report = Instant::now();
    let mut last_captured = 0;

    while !stop.load(Ordering::Acquire) {
        if let Some(result) = handle.next_result(Duration::from_millis(50)) {
            report(&result, json)?;
            if display {
                show(result)?;
            }
        }

        if display && highgui::wait_key(1)? == ESC {
            info!("ESC pressed, shutting down");
            break;
        }

        let elapsed = last_report.elapsed();
        if elapsed >= STATS_INTERVAL {
            let stats = handle.stats();
            let fps = (stats.frames_captured - last_captured) as f64 / elapsed.as_secs_f64();
            info!(
                "{:.1} fps captured, {} cycles, detection rate {:.0}%, {} escalations, {} capture misses",
                fps,
                stats.detection_cycles,
                stats.detection_rate() * 100.0,
                stats.escalations,
                stats.capture_misses
            );
            last_captured = stats.frames_captured;
            last_report = Instant::now();
        }
    }

    handle.stop();
    if display {
        highgui::destroy_all_windows()?;
    }
    Ok(())
}

fn report(result: &DetectionResult, json: bool) -> anyhow::Result<()> {
    let Some(guidance) = &result.guidance else {
        return Ok(());
    };
    if json {
        println!("{}", serde_json::to_string(&result.summary())?);
    } else {
        info!(
            "Move: {} (offset {}, {}){}",
            guidance,
            guidance.offset.0,
            guidance.offset.1,
            if guidance.inside_pad { "" } else { " outside pad" }
        );
    }
    Ok(())
}

fn show(result: DetectionResult) -> anyhow::Result<()> {
    let mut frame = result.annotated;
    overlay::draw_guidance(&mut frame, result.guidance.as_ref())?;
    highgui::imshow("helipad", &frame)?;
    highgui::imshow("helipad mask", &result.mask)?;
    Ok(())
}

fn detect(config: &LandingConfig, image: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    let template = load_template(config)?;
    let path = image.to_str().ok_or_else(|| anyhow!("Non UTF-8 path: {}", image.display()))?;
    let frame = imgcodecs::imread(path, imgcodecs::IMREAD_COLOR)?;
    if frame.empty() {
        return Err(anyhow!("Could not read image {}", image.display()));
    }

    let mut stage = DetectionStage::with_template(template, config);
    let result = stage.process(&frame).context("Detection failed")?;
    println!("{}", serde_json::to_string_pretty(&result.summary())?);

    match (&result.shape_match, &result.candidate) {
        (Some(m), _) => info!("Match at {:?} (similarity {:.3})", m.bounding_box, m.similarity),
        (None, Some(c)) => warn!("Found a {} but no glyph inside it", c.label()),
        (None, None) => warn!("Nothing found"),
    }

    if let Some(out) = output {
        let out_str = out.to_str().ok_or_else(|| anyhow!("Non UTF-8 path: {}", out.display()))?;
        if !imgcodecs::imwrite(out_str, &result.annotated, &Vector::new())? {
            return Err(anyhow!("Could not write {}", out.display()));
        }
        info!("Annotated image written to {}", out.display());
    }
    Ok(())
}
