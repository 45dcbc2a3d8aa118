//! Dial listener thread
//!
//! Owns the dial on a dedicated thread and forwards the toggle gesture to
//! the sync engine. The thread ends on cancellation or device failure; a
//! failure is reported to the engine as `DialLost`.
//!
//! The dial's LED can follow the recording state through [`follow_recording`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::{find_devices, Dial, DialControls, DialEvent, DialEventKind};
use crate::config::DialConfig;
use crate::error::DialError;
use crate::sync::{EngineCommand, EngineHandle, EngineStatus};

pub struct DialListener {
    cancel: Arc<AtomicBool>,
    controls: DialControls,
    thread: Option<JoinHandle<()>>,
}

impl DialListener {
    /// Find and open the first matching dial, then start listening on it
    pub fn start(
        config: &DialConfig,
        toggle: DialEventKind,
        handle: EngineHandle,
    ) -> Result<Self, DialError> {
        let devices = find_devices(&config.name_filter)?;
        let path = &devices[0];
        if devices.len() > 1 {
            info!("{} dials found, using {:?}", devices.len(), path);
        }

        let dial = Dial::open(path, config.ignore_multiple_twists)?;
        Ok(Self::spawn(dial, toggle, handle))
    }

    /// Listen on an already opened dial
    pub fn spawn(mut dial: Dial, toggle: DialEventKind, handle: EngineHandle) -> Self {
        if let Err(e) = dial.led_off() {
            debug!("Could not reset dial LED: {}", e);
        }
        dial.on(DialEventKind::Press, |_| debug!("Dial pressed"));

        let toggle_handle = handle.clone();
        dial.on(toggle, move |event: DialEvent| {
            info!("Dial {} toggles recording", event.kind());
            if let Err(e) = toggle_handle.blocking_send(EngineCommand::ToggleRecording) {
                warn!("Dropped dial toggle: {}", e);
            }
        });

        let controls = dial.controls();
        let cancel = Arc::new(AtomicBool::new(false));
        let thread_cancel = cancel.clone();
        let thread = thread::spawn(move || {
            let path = dial.path().to_path_buf();
            if let Err(e) = dial.listen(thread_cancel) {
                let reason = format!("{} ({:?})", e, path);
                if handle.blocking_send(EngineCommand::DialLost(reason)).is_err() {
                    debug!("Engine gone before dial loss could be reported");
                }
            }
        });

        Self {
            cancel,
            controls,
            thread: Some(thread),
        }
    }

    pub fn controls(&self) -> DialControls {
        self.controls.clone()
    }

    /// Ask the thread to stop and wait at most `timeout` for it
    pub fn stop(&mut self, timeout: Duration) {
        self.cancel.store(true, Ordering::SeqCst);

        let Some(thread) = self.thread.take() else {
            return;
        };

        let deadline = Instant::now() + timeout;
        while !thread.is_finished() {
            if Instant::now() >= deadline {
                warn!("Dial thread did not stop within {:?}, detaching", timeout);
                return;
            }
            thread::sleep(Duration::from_millis(20));
        }
        let _ = thread.join();
        info!("Dial listener stopped");
    }
}

impl Drop for DialListener {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
    }
}

/// Light the dial while recording and darken it otherwise, until the engine goes away
pub async fn follow_recording(
    controls: DialControls,
    mut status_rx: broadcast::Receiver<EngineStatus>,
) {
    let mut lit = None;
    loop {
        match status_rx.recv().await {
            Ok(EngineStatus::Updated(snapshot)) => {
                if lit == Some(snapshot.recording) {
                    continue;
                }
                lit = Some(snapshot.recording);
                if snapshot.recording {
                    controls.led_on();
                } else {
                    controls.led_off();
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(n)) => {
                debug!("Dial LED skipped {} updates", n)
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    controls.led_off();
}
