//! Synchronization engine - keeps the status light in step with schedule, dial and recorder

mod engine;

pub use engine::{create_engine_channels, SyncEngine};

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::error::SelectionError;
use crate::indicator::IndicatorStatus;
use crate::session::{IdentityKind, IdentityPatterns, ManualSelection, SessionDetails};

/// Commands that can be sent to the sync engine
#[derive(Debug, Clone)]
pub enum EngineCommand {
    /// Start if idle, stop if recording (dial button, Enter key)
    ToggleRecording,
    /// Manually start recording
    StartRecording,
    /// Manually stop recording
    StopRecording,
    /// The recorder finished on its own
    RecordingFinished,
    /// Use a manually selected identity
    SetManualSession(SessionDetails),
    /// Drop the manual identity
    ClearManualSession,
    /// The dial listener stopped because of a device error
    DialLost(String),
    /// Shutdown the engine
    Shutdown,
}

/// Snapshot of the engine state after a change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSnapshot {
    pub status: IndicatorStatus,
    pub recording: bool,
    /// Details being recorded, else the effective session
    pub session: Option<SessionDetails>,
    /// Whether the session is a manual selection
    pub manual: bool,
    pub window_end: Option<DateTime<Utc>>,
}

/// Status updates from the sync engine
#[derive(Debug, Clone)]
pub enum EngineStatus {
    /// State after handling a command or poll
    Updated(EngineSnapshot),
    /// The dial is gone; manual dial input is unavailable
    DialLost(String),
    /// An error occurred
    Error(String),
}

/// Cloneable front door to the engine for the dial thread and UI callers
#[derive(Clone)]
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    pub fn new(cmd_tx: mpsc::Sender<EngineCommand>) -> Self {
        Self { cmd_tx }
    }

    pub async fn send(&self, cmd: EngineCommand) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|e| anyhow::anyhow!("Engine is not running: {}", e))
    }

    /// For callers outside the async runtime (dial thread)
    pub fn blocking_send(&self, cmd: EngineCommand) -> Result<()> {
        self.cmd_tx
            .blocking_send(cmd)
            .map_err(|e| anyhow::anyhow!("Engine is not running: {}", e))
    }

    /// Validate a manual selection and hand it to the engine.
    /// Invalid selections never reach the tracker, and a stopped engine is an error.
    pub async fn select_manual(
        &self,
        selection: &ManualSelection,
        patterns: &IdentityPatterns,
    ) -> Result<IdentityKind, SelectionError> {
        let (kind, details) = selection.validate(patterns)?;
        if let Err(e) = self.send(EngineCommand::SetManualSession(details)).await {
            tracing::warn!("Manual selection dropped: {}", e);
            return Err(SelectionError::EngineUnavailable);
        }
        Ok(kind)
    }
}
