//! onair Agent
//!
//! Keeps a studio "on air" light in step with the lecture schedule, the
//! presenter's dial and the recorder.

mod config;
mod console;
mod crash;
mod error;
mod indicator;
mod input;
mod logging;
mod recorder;
mod schedule;
mod session;
mod sync;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use config::Config;
use error::DialError;
use indicator::{find_indicator_ports, open_indicators, IndicatorDriver};
use input::{find_devices, follow_recording, DialListener};
use recorder::CommandRecorder;
use schedule::{ScheduleClient, SchedulePoller};
use session::{IdentityPatterns, SessionTracker};
use sync::{create_engine_channels, EngineCommand, EngineHandle, SyncEngine};

/// How long shutdown waits for the dial thread
const DIAL_STOP_TIMEOUT: Duration = Duration::from_secs(2);

struct Args {
    config_path: Option<PathBuf>,
    list_devices: bool,
    check_schedule: bool,
}

fn main() -> Result<()> {
    let raw_args: Vec<String> = std::env::args().skip(1).collect();

    if raw_args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    let args = parse_args(&raw_args)?;

    let _log_guard = logging::init_logging()?;
    match logging::get_log_dir().and_then(|dir| Ok(crash::init_crash_handler(&dir)?)) {
        Ok(path) => info!("Crash log: {:?}", path),
        Err(e) => warn!("Failed to set up crash log: {}", e),
    }

    info!("onair Agent starting...");

    let config = match &args.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    info!("Configuration loaded from {:?}", config.config_path());

    if args.list_devices {
        list_devices(&config);
        return Ok(());
    }

    let runtime = Arc::new(
        tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?,
    );

    let client = ScheduleClient::new(config.schedule.url.clone(), config.request_timeout())?;

    if args.check_schedule {
        let mut poller = SchedulePoller::new();
        let windows = runtime.block_on(poller.poll(&client)).to_vec();
        for window in &windows {
            println!(
                "{} .. {}  {} [{}] {}",
                schedule::timezone::to_civil(window.start),
                schedule::timezone::to_civil(window.end),
                window.organizer_name,
                window.series,
                window.subject
            );
        }
        println!("{} windows", windows.len());
        return Ok(());
    }

    // Indicators
    let driver = IndicatorDriver::new(open_indicators(&config.indicator));
    info!("{} indicator device(s) attached", driver.device_count());
    let tracker = SessionTracker::new(driver, config.upcoming_lead());

    // Engine
    let (cmd_tx, cmd_rx, status_tx, status_rx) = create_engine_channels();
    let engine = SyncEngine::new(
        tracker,
        Box::new(CommandRecorder::new(config.recorder.clone())),
        client,
        cmd_rx,
        status_tx,
        config.poll_interval(),
        config.recorder.default_series.clone(),
    );

    let engine_runtime = runtime.clone();
    let engine_thread = std::thread::spawn(move || {
        engine_runtime.block_on(async move {
            let mut engine = engine;
            if let Err(e) = engine.run().await {
                error!("Sync engine error: {}", e);
            }
        });
    });

    let handle = EngineHandle::new(cmd_tx.clone());

    // Dial
    let mut dial_listener = if config.dial.enabled {
        match DialListener::start(&config.dial, config.toggle_event()?, handle.clone()) {
            Ok(listener) => Some(listener),
            Err(DialError::DeviceNotFound { filter }) => {
                warn!("No dial matching {:?} found, continuing without one", filter);
                None
            }
            Err(e) => {
                error!("Failed to open dial: {}", e);
                None
            }
        }
    } else {
        info!("Dial disabled in configuration");
        None
    };

    let dial_controls = dial_listener.as_ref().map(DialListener::controls);
    if let Some(controls) = &dial_controls {
        if config.dial.led_follows_recording {
            runtime.spawn(follow_recording(controls.clone(), status_rx.resubscribe()));
        }
    }

    // Operator console
    let patterns = IdentityPatterns::from_config(&config.lookup)?;
    runtime.spawn(console::run_console(handle, patterns, dial_controls, status_rx));

    // Set up Ctrl+C handler that sends shutdown command
    let ctrl_c_tx = cmd_tx.clone();
    let ctrl_c_runtime = runtime.clone();
    ctrlc::set_handler(move || {
        info!("Ctrl+C received, shutting down...");
        let tx = ctrl_c_tx.clone();
        ctrl_c_runtime.spawn(async move {
            let _ = tx.send(EngineCommand::Shutdown).await;
        });
    })?;

    info!("Press Enter to toggle recording, Ctrl+C to exit...");
    let _ = engine_thread.join();

    if let Some(listener) = dial_listener.as_mut() {
        listener.stop(DIAL_STOP_TIMEOUT);
    }

    info!("Shutdown complete");
    Ok(())
}

fn parse_args(args: &[String]) -> Result<Args> {
    let mut parsed = Args {
        config_path: None,
        list_devices: false,
        check_schedule: false,
    };

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = iter.next().context("--config needs a path")?;
                parsed.config_path = Some(PathBuf::from(path));
            }
            "--list-devices" => parsed.list_devices = true,
            "--check-schedule" => parsed.check_schedule = true,
            other => anyhow::bail!("Unknown argument: {} (see --help)", other),
        }
    }

    Ok(parsed)
}

fn list_devices(config: &Config) {
    println!("Dials matching {:?}:", config.dial.name_filter);
    match find_devices(&config.dial.name_filter) {
        Ok(paths) => {
            for path in paths {
                println!("    {}", path.display());
            }
        }
        Err(e) => println!("    none ({})", e),
    }

    println!("Indicator ports:");
    let ports = find_indicator_ports(&config.indicator);
    if ports.is_empty() {
        println!("    none");
    }
    for port in ports {
        println!("    {} ({})", port.path, port.description);
    }
}

fn print_help() {
    println!("onair Agent - studio recording light controller");
    println!();
    println!("USAGE:");
    println!("    onair-agent [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help              Print this help message");
    println!("    -c, --config <PATH>     Use this config file");
    println!("        --list-devices      Print dial and indicator candidates and exit");
    println!("        --check-schedule    Fetch the schedule once, print it and exit");
    println!();
    println!("ENVIRONMENT:");
    println!("    RUST_LOG              Set log level (e.g., debug, info, warn)");
    println!("    ONAIR_LOG_PATH        Log directory");
    println!("    ONAIR_SCHEDULE_URL    Schedule feed URL, overrides the config file");
}
