// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/structwatch

//! StructWatch - structural health monitoring daemon

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use structwatch::sensors::SourceKind;
use structwatch::{Config, Monitor, VERSION};

/// StructWatch - structural health monitoring
#[derive(Parser, Debug)]
#[command(name = "structwatch")]
#[command(author = "bad-antics")]
#[command(version = VERSION)]
#[command(about = "Dual-rate accelerometer/LVDT acquisition with event detection")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,

    /// Disable accelerometers
    #[arg(long)]
    no_accel: bool,

    /// Disable LVDTs
    #[arg(long)]
    no_lvdt: bool,

    /// Accelerometer sampling rate in Hz
    #[arg(long)]
    accel_rate: Option<f64>,

    /// LVDT sampling rate in Hz
    #[arg(long)]
    lvdt_rate: Option<f64>,

    /// Output directory for event files
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Sensor source: simulated or hardware
    #[arg(long, value_parser = parse_source)]
    source: Option<SourceKind>,
}

fn parse_source(s: &str) -> Result<SourceKind, String> {
    match s.to_ascii_lowercase().as_str() {
        "simulated" | "sim" => Ok(SourceKind::Simulated),
        "hardware" | "hw" => Ok(SourceKind::Hardware),
        other => Err(format!("unknown source '{}', expected simulated or hardware", other)),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.trace {
        Level::TRACE
    } else if args.debug {
        Level::DEBUG
    } else {
        Level::INFO
    };

    // RUST_LOG directives refine the level chosen on the command line
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(log_level).into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("StructWatch v{} - structural health monitoring", VERSION);

    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;
    apply_overrides(&mut config, &args);
    config.validate()?;

    info!("Configuration loaded from {:?}", config_path);
    info!(
        "Accel: {} @ {} Hz, LVDT: {} @ {} Hz, events -> {:?}",
        config.sampling.enable_accel,
        config.sampling.accel_rate_hz,
        config.sampling.enable_displacement,
        config.sampling.displacement_rate_hz,
        config.storage.events_dir()
    );
    if config.storage.record_samples {
        info!("Raw samples -> {:?}", config.storage.samples_path());
    }
    info!(
        "Trigger: accel {:.3} m/s², disp {:.3} mm; pre {}s, post {}s, min {}s",
        config.detection.trigger_acceleration,
        config.detection.trigger_displacement,
        config.detection.pre_event_seconds,
        config.detection.post_event_seconds,
        config.detection.min_event_duration_seconds
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config))
}

fn apply_overrides(config: &mut Config, args: &Args) {
    if args.no_accel {
        config.sampling.enable_accel = false;
    }
    if args.no_lvdt {
        config.sampling.enable_displacement = false;
    }
    if let Some(rate) = args.accel_rate {
        config.sampling.accel_rate_hz = rate;
    }
    if let Some(rate) = args.lvdt_rate {
        config.sampling.displacement_rate_hz = rate;
    }
    if let Some(dir) = &args.output_dir {
        config.storage.output_dir = dir.clone();
    }
    if let Some(source) = args.source {
        config.sampling.source = source;
    }
}

/// Run until Ctrl+C or an acquisition failure, logging status periodically
async fn run(config: Config) -> Result<()> {
    let monitor = Monitor::from_config(&config)?;
    let metrics = monitor.metrics();

    info!("Monitoring running, press Ctrl+C to stop");

    let mut status = tokio::time::interval(Duration::from_secs_f64(
        config.performance.status_interval_secs.max(0.1),
    ));
    let mut health = tokio::time::interval(Duration::from_millis(100));

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Shutdown signal received, stopping...");
                break;
            }
            _ = status.tick() => {
                info!("{}", metrics.snapshot());
            }
            _ = health.tick() => {
                if !monitor.is_running() {
                    warn!("Acquisition stopped on its own");
                    break;
                }
            }
        }
    }

    monitor.stop();
    let summary = tokio::task::spawn_blocking(move || monitor.wait()).await??;
    info!(
        "StructWatch shutdown complete ({} events, {} raw samples recorded)",
        summary.detection.event_count, summary.recording.samples_recorded
    );
    Ok(())
}
