// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/crashguard-rs

//! CrashGuard - Real-Time Vehicle Crash Detection
//!
//! Runs the crash monitor against the built-in drive simulator and logs
//! every event it publishes.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crashguard::core::{EventPayload, FnTrigger, MonitorEvent};
use crashguard::{train_forest, Config, CrashMonitor, CrashReport, DriveSimulator, Scenario, VERSION};

/// CrashGuard - Real-Time Vehicle Crash Detection
#[derive(Parser, Debug)]
#[command(name = "crashguard")]
#[command(author = "CrashGuard Project")]
#[command(version = VERSION)]
#[command(about = "Isolation-forest crash detection over speed and acceleration telemetry")]
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

    /// Simulated drive to run
    #[arg(long, value_enum, default_value = "crash")]
    scenario: ScenarioArg,

    /// Stop after this many ticks (runs until Ctrl+C when absent)
    #[arg(long)]
    ticks: Option<u64>,

    /// Override the sampling interval
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Seed both the model and the simulator
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ScenarioArg {
    Cruise,
    Crash,
    Braking,
    Dropout,
}

impl From<ScenarioArg> for Scenario {
    fn from(arg: ScenarioArg) -> Self {
        match arg {
            ScenarioArg::Cruise => Scenario::Cruise,
            ScenarioArg::Crash => Scenario::Crash { at_tick: 8 },
            ScenarioArg::Braking => Scenario::HardBraking { at_tick: 8 },
            ScenarioArg::Dropout => Scenario::SensorDropout {
                from_tick: 5,
                ticks: 3,
            },
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;

    // Initialize logging
    let log_level = if args.trace {
        Level::TRACE
    } else if args.debug {
        Level::DEBUG
    } else {
        Level::from_str(&config.log_level).unwrap_or(Level::INFO)
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("🚗 {} v{} - Real-Time Vehicle Crash Detection", config.app_name, VERSION);
    info!("Configuration loaded from {:?}", config_path);

    // Override with command line args
    if let Some(ms) = args.interval_ms {
        config.detection.sampling_interval_ms = ms;
    }
    if let Some(seed) = args.seed {
        config.model.seed = Some(seed);
        config.simulation.seed = Some(seed);
    }
    config.validate()?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config, args.scenario.into(), args.ticks))
}

async fn run(config: Config, scenario: Scenario, ticks: Option<u64>) -> Result<()> {
    let forest = Arc::new(train_forest(&config.model)?);
    let sim = Arc::new(DriveSimulator::new("drive-sim", scenario, &config.simulation));
    let poll = config.detection.sampling_interval();

    let trigger = Arc::new(FnTrigger(|report: &CrashReport| {
        error!("🚨 Emergency trigger fired at {}: {}", report.timestamp, report.reason);
    }));

    let mut monitor =
        CrashMonitor::new(config, forest, sim.clone(), sim.clone())?.with_trigger(trigger);

    let mut events = monitor.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(n)) => warn!("Event printer lagged, {} events skipped", n),
                Err(RecvError::Closed) => break,
            }
        }
    });

    info!("Running scenario {:?}", scenario);
    monitor.start().await?;

    let run_until = async {
        match ticks {
            Some(n) => {
                while sim.tick() < n {
                    tokio::time::sleep(poll).await;
                }
            }
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = run_until => info!("Simulated {} ticks", sim.tick()),
        res = tokio::signal::ctrl_c() => {
            res?;
            info!("Shutdown signal received, cleaning up...");
        }
    }

    monitor.stop().await?;

    let stats = monitor.stats().await;
    info!(
        "Ticks: {} (scored {}, skipped {}), crashes: {}, dismissals: {}, sensor faults: {}",
        stats.ticks, stats.scored, stats.skipped, stats.crashes, stats.dismissals, stats.sensor_faults
    );

    // Closing the bus lets the printer drain and exit
    drop(monitor);
    let _ = printer.await;

    info!("CrashGuard shutdown complete");
    Ok(())
}

fn log_event(event: &MonitorEvent) {
    match &event.payload {
        EventPayload::ScoreUpdate { score, speed } => {
            debug!("#{} score {:.3} at {:.1} m/s", event.id, score, speed)
        }
        EventPayload::CrashDetected(report) => {
            error!("#{} CRASH {} ({:.0}% anomalous)", event.id, report.id, report.anomaly_ratio * 100.0)
        }
        EventPayload::AnomalyDismissed {
            anomaly_ratio,
            final_speed,
        } => info!(
            "#{} anomaly dismissed: ratio {:.0}%, speed {:.1} m/s",
            event.id,
            anomaly_ratio * 100.0,
            final_speed
        ),
        EventPayload::Error { message } => warn!("#{} {}", event.id, message),
        EventPayload::Status { running } => info!("#{} monitor running: {}", event.id, running),
    }
}
