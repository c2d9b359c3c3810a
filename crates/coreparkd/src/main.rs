//! coreparkd: the corepark daemon.
//!
//! Runs the parking controller against the host CPU pool, or against a
//! simulated pool with a synthetic load wave when `--dry-run` is given.
//!
//! # Usage
//!
//! ```text
//! coreparkd run --config /etc/corepark.toml
//! coreparkd run --dry-run --set min_active=2 --set unit5.down_rate=2
//! coreparkd status --dry-run
//! coreparkd print-config --config /etc/corepark.toml
//! ```
//!
//! The controller is enabled on startup unless `--set enabled=0` is given.
//! `SIGUSR1` and `SIGUSR2` deliver suspend and resume edges. Ctrl-C
//! disables the controller, which brings every parked CPU back online.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use corepark_core::sim::SimPool;
use corepark_core::{Controller, ControllerConfig, Platform, PowerEvent};
use corepark_sysfs::SysfsPlatform;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(name = "coreparkd", about = "corepark CPU parking daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the controller until interrupted.
    Run {
        /// TOML configuration file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Drive a simulated 8-unit pool instead of the host CPUs.
        #[arg(long)]
        dry_run: bool,

        /// Override a tunable after startup, as `name=value`.
        #[arg(long = "set", value_name = "NAME=VALUE")]
        overrides: Vec<String>,

        /// Seconds between pool status reports.
        #[arg(long, default_value = "10")]
        status_interval: u64,
    },
    /// Print a one-off pool status snapshot as JSON.
    Status {
        #[arg(long)]
        config: Option<PathBuf>,

        /// Report on a simulated 8-unit pool instead of the host CPUs.
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the effective configuration as TOML.
    PrintConfig {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Run {
            config,
            dry_run,
            overrides,
            status_interval,
        } => {
            let config = load_config(config.as_deref())?;
            run(config, dry_run, overrides, Duration::from_secs(status_interval)).await
        }
        Command::Status { config, dry_run } => {
            let config = load_config(config.as_deref())?;
            let platform: Arc<dyn Platform> = if dry_run {
                Arc::new(SimPool::big_little())
            } else {
                Arc::new(SysfsPlatform::host()?)
            };
            let controller = Controller::new(platform, &config)?;
            println!("{}", serde_json::to_string_pretty(&controller.status())?);
            Ok(())
        }
        Command::PrintConfig { config } => {
            let config = load_config(config.as_deref())?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,corepark=debug,coreparkd=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<ControllerConfig> {
    match path {
        Some(path) => ControllerConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(ControllerConfig::default()),
    }
}

async fn run(
    config: ControllerConfig,
    dry_run: bool,
    overrides: Vec<String>,
    status_interval: Duration,
) -> anyhow::Result<()> {
    info!(dry_run, "coreparkd starting");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut load_task = None;

    let platform: Arc<dyn Platform> = if dry_run {
        let pool = Arc::new(SimPool::big_little());
        load_task = Some(tokio::spawn(drive_synthetic_load(
            pool.clone(),
            shutdown_rx.clone(),
        )));
        pool
    } else {
        Arc::new(SysfsPlatform::host()?)
    };

    let controller = Arc::new(Controller::new(platform, &config)?);
    controller.enable().await?;
    for entry in &overrides {
        let (name, value) = entry
            .split_once('=')
            .with_context(|| format!("override {entry:?} is not name=value"))?;
        let changed = controller.store(name, value).await?;
        debug!(name, value, changed, "override applied");
    }

    let status_task = tokio::spawn(report_status(
        controller.clone(),
        status_interval,
        shutdown_rx.clone(),
    ));

    let mut suspend = signal(SignalKind::user_defined1())?;
    let mut resume = signal(SignalKind::user_defined2())?;
    loop {
        tokio::select! {
            _ = suspend.recv() => {
                controller.notify(PowerEvent::Suspend);
            }
            _ = resume.recv() => {
                controller.notify(PowerEvent::Resume);
            }
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for ctrl-c")?;
                info!("shutdown signal received");
                break;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    controller.disable().await?;
    let _ = status_task.await;
    if let Some(task) = load_task {
        let _ = task.await;
    }

    info!("coreparkd stopped");
    Ok(())
}

async fn report_status(
    controller: Arc<Controller>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                let status = controller.status();
                match serde_json::to_string(&status) {
                    Ok(json) => debug!(
                        active = status.active_count,
                        suspended = status.suspended,
                        pressure = status.last_pressure,
                        status = %json,
                        "pool status"
                    ),
                    Err(e) => warn!(error = %e, "failed to encode status"),
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

/// Sweep every simulated unit through a slow sine wave, phase-shifted per
/// unit, and derive pending work from the mean load.
async fn drive_synthetic_load(pool: Arc<SimPool>, mut shutdown: watch::Receiver<bool>) {
    const STEP: Duration = Duration::from_millis(100);
    let units = pool.pool_size();
    let mut phase = 0.0f64;

    loop {
        let mut total = 0u32;
        for unit in 0..units {
            let wave = (phase + unit as f64 * 0.6).sin();
            let load = (50.0 + 48.0 * wave).round() as u32;
            pool.set_load(unit, load);
            total += load;
        }
        pool.set_pending(u64::from(total / 100));
        phase += 0.05;

        tokio::select! {
            _ = tokio::time::sleep(STEP) => {}
            _ = shutdown.changed() => break,
        }
    }
}
