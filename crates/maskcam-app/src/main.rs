use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, watch};
use tracing_subscriber::EnvFilter;

use maskcam_app::config::Config;
use maskcam_app::engine::{CycleOutcome, Engine, EngineEvent};
use maskcam_app::view::{self, PipelinePhase, ViewSnapshot};
use maskcam_hw::{CameraSource, StillImageSource};

#[derive(Parser)]
#[command(name = "maskcam", about = "Face-mask detection demo pipeline")]
struct Cli {
    /// Optional TOML config file; MASKCAM_* env vars override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run live inference from a camera
    Run {
        /// V4L2 device path override
        #[arg(long)]
        device: Option<String>,
    },
    /// Run one inference cycle over a still image and write the rasters
    Image {
        path: PathBuf,
        /// Output directory for the overlay and face-crop PNGs
        #[arg(long, default_value = "maskcam-out")]
        out_dir: PathBuf,
    },
    /// List available capture devices
    Devices,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { device } => {
            if let Some(device) = device {
                config.camera_device = device;
            }
            run_live(config).await
        }
        Commands::Image { path, out_dir } => run_still(&config, &path, &out_dir),
        Commands::Devices => {
            let devices = CameraSource::list_devices();
            if devices.is_empty() {
                println!("no video capture devices found");
            }
            for device in devices {
                println!("{}\t{} ({})", device.path, device.name, device.driver);
            }
            Ok(())
        }
    }
}

async fn run_live(config: Config) -> Result<()> {
    let source = CameraSource::open(
        &config.camera_device,
        config.capture_width,
        config.capture_height,
    )
    .context("failed to open camera")?;

    let (view_tx, view_rx) = view::view_channel();
    let mut engine = Engine::new(
        Box::new(source),
        (config.view_width, config.view_height),
        config.score_threshold,
        view_tx,
    );
    engine.load_models(
        &config.detection_model_path(),
        &config.classification_model_path(),
    )?;

    let (event_tx, event_rx) = mpsc::channel(8);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown requested");
        let _ = event_tx.send(EngineEvent::Shutdown).await;
    });
    tokio::spawn(report_snapshots(view_rx));

    engine.run(event_rx, config.tick_period()).await;
    tracing::info!("maskcam stopped");
    Ok(())
}

/// Log each published snapshot — the terminal stand-in for the score panel.
async fn report_snapshots(mut rx: watch::Receiver<ViewSnapshot>) {
    while rx.changed().await.is_ok() {
        let snapshot = rx.borrow_and_update().clone();
        match snapshot.phase {
            PipelinePhase::ModelsLoading {
                detection,
                classification,
            } => {
                tracing::info!(
                    detection = %format_args!("{:.0}%", detection * 100.0),
                    classification = %format_args!("{:.0}%", classification * 100.0),
                    "downloading models"
                );
            }
            _ => {
                let faces = snapshot.face_scores.iter().flatten().count();
                if faces > 0 {
                    tracing::info!(
                        faces,
                        scores = ?snapshot.face_scores,
                        labels = ?snapshot.labels(),
                        "frame"
                    );
                }
            }
        }
    }
}

fn run_still(config: &Config, path: &Path, out_dir: &Path) -> Result<()> {
    let source = StillImageSource::open(path).context("failed to load test image")?;

    let (view_tx, view_rx) = view::view_channel();
    let mut engine = Engine::new(
        Box::new(source),
        (config.view_width, config.view_height),
        config.score_threshold,
        view_tx,
    );
    engine.load_models(
        &config.detection_model_path(),
        &config.classification_model_path(),
    )?;

    match engine.run_cycle()? {
        CycleOutcome::Completed { detections } => {
            tracing::info!(detections, "cycle completed")
        }
        other => tracing::warn!(outcome = ?other, "cycle did not run"),
    }

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    let snapshot = view_rx.borrow().clone();
    let targets = engine.render_targets();
    targets.overlay().save(out_dir.join("overlay.png"))?;
    for (i, slot) in targets.slots().iter().enumerate() {
        if snapshot.face_scores[i].is_some() {
            slot.save(out_dir.join(format!("face_{i}.png")))?;
        }
    }

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
