//! Crash diagnostics
//!
//! Panics anywhere in the agent, including the dial thread, are appended
//! with a backtrace to `crash.log` in the log directory. The file is
//! written synchronously so the report survives the process going down.

use std::fs::OpenOptions;
use std::io::Write;
use std::panic::PanicInfo;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::error;

static CRASH_LOG_PATH: OnceLock<PathBuf> = OnceLock::new();

const CRASH_LOG_FILENAME: &str = "crash.log";

/// Install the panic hook. Call early in main, after logging is up.
pub fn init_crash_handler(log_dir: &Path) -> std::io::Result<PathBuf> {
    let crash_log_path = log_dir.join(CRASH_LOG_FILENAME);

    // Fail now rather than inside the hook if the file can't be created
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&crash_log_path)?;

    let _ = CRASH_LOG_PATH.set(crash_log_path.clone());

    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        handle_panic(panic_info);
        default_hook(panic_info);
    }));

    Ok(crash_log_path)
}

fn handle_panic(panic_info: &PanicInfo) {
    let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic payload".to_string()
    };

    let location = panic_info
        .location()
        .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()))
        .unwrap_or_else(|| "unknown location".to_string());

    let thread = std::thread::current();
    let report = format_report(
        &chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
        thread.name().unwrap_or("unnamed"),
        &location,
        &message,
        &std::backtrace::Backtrace::force_capture().to_string(),
    );

    if let Some(path) = CRASH_LOG_PATH.get() {
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = file.write_all(report.as_bytes());
            let _ = file.sync_all();
        }
    }

    // May not reach the file if the process is going down
    error!(
        "PANIC in thread {} at {}: {} (see crash.log for backtrace)",
        thread.name().unwrap_or("unnamed"),
        location,
        message
    );
}

fn format_report(timestamp: &str, thread: &str, location: &str, message: &str, backtrace: &str) -> String {
    let separator = "=".repeat(80);
    format!(
        "\n{sep}\nPANIC at {ts} in thread {thread}\n{sep}\nLocation: {loc}\nMessage: {msg}\n\nBacktrace:\n{bt}\n{sep}\n",
        sep = separator,
        ts = timestamp,
        thread = thread,
        loc = location,
        msg = message,
        bt = backtrace,
    )
}
