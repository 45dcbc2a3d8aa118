//! Recorder boundary
//!
//! The agent does not record anything itself; it asks an external recorder
//! to start and stop. [`CommandRecorder`] drives one through configured
//! commands and passes the request in `ONAIR_*` environment variables.

use anyhow::{Context, Result};
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::RecorderConfig;
use crate::session::RecordingRequest;

/// How long a recorder process gets to exit after SIGTERM
const STOP_GRACE: Duration = Duration::from_secs(2);

/// External recording subsystem
pub trait Recorder: Send {
    fn start(&mut self, request: &RecordingRequest) -> Result<()>;

    /// Ask the recorder to stop. Must not wait for the recorder to finish.
    fn stop(&mut self) -> Result<()>;

    /// True once, when a recording ended on the recorder's side
    fn take_finished(&mut self) -> bool {
        false
    }
}

/// Runs configured commands to start and stop recording.
/// With no commands configured it only logs.
pub struct CommandRecorder {
    config: RecorderConfig,
    process: Option<Child>,
}

impl CommandRecorder {
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            process: None,
        }
    }

    fn command(argv: &[String]) -> Option<Command> {
        let (program, args) = argv.split_first()?;
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        Some(command)
    }

    fn request_env(request: &RecordingRequest) -> Vec<(&'static str, String)> {
        vec![
            ("ONAIR_RECORDING_ID", request.id.clone()),
            ("ONAIR_TITLE", request.title.clone()),
            ("ONAIR_PRESENTER", request.presenter.clone().unwrap_or_default()),
            ("ONAIR_SOURCE", request.source.clone().unwrap_or_default()),
            ("ONAIR_SERIES_ID", request.series.clone().unwrap_or_default()),
            ("ONAIR_SERIES_TITLE", request.series_title.clone().unwrap_or_default()),
            ("ONAIR_TAKE", request.take.to_string()),
        ]
    }

    /// Terminate a still-running recorder process without blocking the caller
    fn terminate(mut process: Child) {
        #[cfg(unix)]
        {
            // SAFETY: plain signal delivery to a child we spawned
            unsafe {
                libc::kill(process.id() as i32, libc::SIGTERM);
            }
        }
        #[cfg(not(unix))]
        {
            let _ = process.kill();
        }

        std::thread::spawn(move || {
            std::thread::sleep(STOP_GRACE);
            match process.try_wait() {
                Ok(None) => {
                    warn!("Recorder did not stop gracefully, killing...");
                    let _ = process.kill();
                    let _ = process.wait();
                }
                Ok(Some(status)) => debug!("Recorder exited with status: {:?}", status),
                Err(e) => error!("Error checking recorder status: {}", e),
            }
        });
    }
}

impl Recorder for CommandRecorder {
    fn start(&mut self, request: &RecordingRequest) -> Result<()> {
        info!("Recorder start: {} ({})", request.title, request.id);

        let Some(mut command) = Self::command(&self.config.start_command) else {
            debug!("No recorder start command configured");
            return Ok(());
        };

        let process = command
            .envs(Self::request_env(request))
            .spawn()
            .with_context(|| format!("Failed to launch recorder {:?}", self.config.start_command))?;

        self.process = Some(process);
        Ok(())
    }

    /// Returns once the stop command is launched. The command is waited on,
    /// and the recorder process terminated after it, on a separate thread.
    fn stop(&mut self) -> Result<()> {
        info!("Recorder stop");
        let process = self.process.take();

        let Some(mut command) = Self::command(&self.config.stop_command) else {
            if let Some(process) = process {
                Self::terminate(process);
            }
            return Ok(());
        };

        let mut stopper = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                if let Some(process) = process {
                    Self::terminate(process);
                }
                return Err(anyhow::Error::new(e).context(format!(
                    "Failed to run recorder stop {:?}",
                    self.config.stop_command
                )));
            }
        };

        std::thread::spawn(move || {
            match stopper.wait() {
                Ok(status) if !status.success() => {
                    warn!("Recorder stop command exited with {}", status)
                }
                Ok(status) => debug!("Recorder stop command exited with {}", status),
                Err(e) => error!("Error waiting for recorder stop command: {}", e),
            }
            if let Some(process) = process {
                Self::terminate(process);
            }
        });
        Ok(())
    }

    fn take_finished(&mut self) -> bool {
        let Some(process) = self.process.as_mut() else {
            return false;
        };

        match process.try_wait() {
            Ok(Some(status)) => {
                info!("Recorder process exited: {}", status);
                self.process = None;
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!("Failed to check recorder process status: {}", e);
                false
            }
        }
    }
}
