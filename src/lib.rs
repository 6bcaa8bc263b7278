pub mod config;
pub mod dispatch;
pub mod driver;
pub mod events;
pub mod gesture;
pub mod settings;
pub mod source;
pub mod tracker;
mod utils;

use std::{io::BufReader, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use tokio::{runtime::Handle, sync::mpsc};

use config::{Cli, CliCommand, RunArgs, SourceChoice};
use dispatch::{CommandDispatcher, RecordingDispatcher, ShellDispatcher};
use driver::DriverController;
use settings::SettingsStore;
use source::{DetectionSource, LineSource, SimulatedSource};
use tracker::GestureController;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging (reads RUST_LOG env var); stdout is reserved for events
    let level = if config::debug_enabled() {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    let settings = Arc::new(SettingsStore::new(cli.settings.clone())?);

    match cli.command {
        CliCommand::Show => {
            print!("{}", settings.snapshot().render());
            Ok(())
        }
        CliCommand::Bind { gesture, command } => {
            let command = command.join(" ");
            settings.update_binding(gesture, command.clone())?;
            if command.is_empty() {
                info!("Unbound {} in {}", gesture, settings.path().display());
            } else {
                info!("Bound {} to '{}' in {}", gesture, command, settings.path().display());
            }
            Ok(())
        }
        CliCommand::Countdown { secs } => {
            settings.update_countdown(secs)?;
            info!("Countdown set to {}s in {}", secs, settings.path().display());
            Ok(())
        }
        CliCommand::Run(args) => {
            info!("gesturectl {} starting...", env!("CARGO_PKG_VERSION"));
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to start async runtime")?;
            let result = runtime.block_on(run_detection(args, settings));
            runtime.shutdown_timeout(SHUTDOWN_GRACE);
            result
        }
    }
}

async fn run_detection(args: RunArgs, settings: Arc<SettingsStore>) -> Result<()> {
    let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
    let dispatcher: Arc<dyn CommandDispatcher> = if args.dry_run {
        drop(outcome_tx);
        Arc::new(RecordingDispatcher::default())
    } else {
        Arc::new(ShellDispatcher::new(Handle::current()).with_reports(outcome_tx))
    };

    let controller = GestureController::new(args.tracker_config(), settings, dispatcher);
    let frame_task = tokio::spawn(events::forward_frames(controller.subscribe()));
    let outcome_task = tokio::spawn(events::forward_outcomes(outcome_rx));

    let source: Box<dyn DetectionSource> = match args.source {
        SourceChoice::Stdin => Box::new(LineSource::new(
            BufReader::new(std::io::stdin()),
            args.min_confidence,
        )),
        SourceChoice::Simulate => Box::new(SimulatedSource::demo(args.tick_interval())),
    };

    let mut driver = DriverController::new();
    driver.start(args.driver_kind(), controller, source)?;

    let result = tokio::select! {
        result = driver.wait() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, stopping driver");
            match tokio::time::timeout(SHUTDOWN_GRACE, driver.stop()).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("Driver still blocked on its source after {}ms; leaving it behind", SHUTDOWN_GRACE.as_millis());
                    Ok(())
                }
            }
        }
    };

    // Let the last frame reach stdout; commands still running are not waited on
    let _ = tokio::time::timeout(SHUTDOWN_GRACE, frame_task).await;
    outcome_task.abort();

    info!("gesturectl stopped");
    result
}
