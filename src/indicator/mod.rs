//! Indicator driver - turns a status into LED commands on attached devices

pub(crate) mod driver;
mod serial;

pub use driver::{IndicatorDevice, IndicatorDriver, WriterIndicator};
pub use serial::{find_indicator_ports, open_indicators, IndicatorPort};

use std::fmt;

/// What the status light should show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndicatorStatus {
    #[default]
    Idle,
    Scheduled,
    Recording,
    Upcoming,
    Error,
}

impl IndicatorStatus {
    /// Numeric status code
    pub fn code(self) -> u8 {
        match self {
            IndicatorStatus::Idle => 0,
            IndicatorStatus::Scheduled => 1,
            IndicatorStatus::Recording => 2,
            IndicatorStatus::Upcoming => 3,
            IndicatorStatus::Error => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(IndicatorStatus::Idle),
            1 => Some(IndicatorStatus::Scheduled),
            2 => Some(IndicatorStatus::Recording),
            3 => Some(IndicatorStatus::Upcoming),
            4 => Some(IndicatorStatus::Error),
            _ => None,
        }
    }

    /// LED colour for this status
    pub fn command(self) -> LedCommand {
        match self {
            IndicatorStatus::Idle | IndicatorStatus::Error => LedCommand::OFF,
            IndicatorStatus::Recording => LedCommand::RED,
            IndicatorStatus::Scheduled | IndicatorStatus::Upcoming => LedCommand::GREEN,
        }
    }
}

impl fmt::Display for IndicatorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IndicatorStatus::Idle => "idle",
            IndicatorStatus::Scheduled => "scheduled",
            IndicatorStatus::Recording => "recording",
            IndicatorStatus::Upcoming => "upcoming",
            IndicatorStatus::Error => "error",
        };
        f.write_str(name)
    }
}

/// `SetLed,<r>,<g>,<b>;` with on/off flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedCommand {
    pub red: bool,
    pub green: bool,
    pub blue: bool,
}

impl LedCommand {
    pub const OFF: LedCommand = LedCommand {
        red: false,
        green: false,
        blue: false,
    };
    pub const RED: LedCommand = LedCommand {
        red: true,
        green: false,
        blue: false,
    };
    pub const GREEN: LedCommand = LedCommand {
        red: false,
        green: true,
        blue: false,
    };
}

impl fmt::Display for LedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SetLed,{},{},{};",
            self.red as u8, self.green as u8, self.blue as u8
        )
    }
}
