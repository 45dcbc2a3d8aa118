//! Error types for the agent's components
//!
//! Each component boundary gets its own enum so callers can decide whether a
//! condition is absorbed (logged, feature degrades) or propagated.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the dial input source
#[derive(Debug, Error)]
pub enum DialError {
    /// No input device matched the name filter
    #[error("no input device matching {filter:?} found")]
    DeviceNotFound { filter: String },

    /// The device went away while listening (ENODEV)
    #[error("input device {device:?} was disconnected")]
    DeviceDisconnected { device: PathBuf },

    /// Any other I/O failure on the device
    #[error("I/O error on input device {device:?}: {source}")]
    Io {
        device: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An event kind name that does not map to a dial event
    #[error("unknown dial event {0:?}")]
    UnknownDialEvent(String),
}

/// Errors from fetching or parsing the schedule feed
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("schedule request failed: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("schedule feed returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("malformed schedule feed: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid timestamp {value:?} in schedule feed: {source}")]
    Timestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

impl ScheduleError {
    /// True for network-level failures, false for malformed feeds
    pub fn is_fetch_error(&self) -> bool {
        matches!(self, ScheduleError::Fetch(_) | ScheduleError::Status(_))
    }
}

/// Errors from indicator devices
#[derive(Debug, Error)]
pub enum IndicatorError {
    #[error("failed to write to indicator {device}: {source}")]
    Write {
        device: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open indicator {device}: {source}")]
    Open {
        device: String,
        #[source]
        source: serialport::Error,
    },
}

/// Rejections of a manual session selection
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("no user identifier given")]
    EmptyIdentifier,

    #[error("{0:?} is neither a lecturer nor a learner identifier")]
    UnrecognizedIdentifier(String),

    #[error("selected user has no display name")]
    MissingName,

    #[error("selection not applied, the engine is not running")]
    EngineUnavailable,
}
