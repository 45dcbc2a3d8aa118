//! Configuration management for onair Agent

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::input::DialEventKind;

/// Environment variable that overrides `schedule.url`
const SCHEDULE_URL_ENV: &str = "ONAIR_SCHEDULE_URL";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Schedule feed configuration
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Dial input configuration
    #[serde(default)]
    pub dial: DialConfig,

    /// Indicator device configuration
    #[serde(default)]
    pub indicator: IndicatorConfig,

    /// Manual selection identifier patterns
    #[serde(default)]
    pub lookup: LookupConfig,

    /// External recorder configuration
    #[serde(default)]
    pub recorder: RecorderConfig,

    /// Path to config file (not serialized)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Event feed URL
    #[serde(default = "default_schedule_url")]
    pub url: String,

    /// How often the feed is polled (seconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Upper bound on a single feed request (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// A window starting within this many seconds shows as upcoming
    #[serde(default = "default_upcoming_lead")]
    pub upcoming_lead_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialConfig {
    /// Whether to look for a dial at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Substring matched against input device names
    #[serde(default = "default_dial_name_filter")]
    pub name_filter: String,

    /// Only report the first twist until the dial is released
    #[serde(default)]
    pub ignore_multiple_twists: bool,

    /// Dial event that toggles recording (press, release, turn_left, ...)
    #[serde(default = "default_toggle_event")]
    pub toggle_event: String,

    /// Light the dial's LED while recording
    #[serde(default = "default_true")]
    pub led_follows_recording: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorConfig {
    /// Serial baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// A port whose USB description contains one of these is an indicator
    #[serde(default = "default_description_markers")]
    pub description_markers: Vec<String>,

    /// A port whose path starts with one of these is an indicator
    #[serde(default = "default_path_prefixes")]
    pub path_prefixes: Vec<String>,

    /// Wait after opening ports before the first command (ms)
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupConfig {
    /// Identifiers matching this are lecturers
    #[serde(default = "default_lecturer_pattern")]
    pub lecturer_pattern: String,

    /// Identifiers matching this are learners
    #[serde(default = "default_learner_pattern")]
    pub learner_pattern: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Command run when a recording starts (argv)
    #[serde(default)]
    pub start_command: Vec<String>,

    /// Command run when a recording stops (argv)
    #[serde(default)]
    pub stop_command: Vec<String>,

    /// Series used for recordings without session details
    pub default_series: Option<String>,
}

// Default value functions
fn default_schedule_url() -> String {
    "https://camonitor.uct.ac.za/obs-api/event/".to_string()
}

fn default_poll_interval() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    10
}

fn default_upcoming_lead() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_dial_name_filter() -> String {
    "PowerMate".to_string()
}

fn default_toggle_event() -> String {
    "release".to_string()
}

fn default_baud_rate() -> u32 {
    115_200
}

fn default_description_markers() -> Vec<String> {
    vec!["Serial".to_string(), "Arduino".to_string()]
}

fn default_path_prefixes() -> Vec<String> {
    vec!["/dev/ttyACM".to_string()]
}

fn default_settle_delay() -> u64 {
    2000 // Arduino boards reset when the port opens
}

fn default_lecturer_pattern() -> String {
    "[0-9]{8}|[Tt][0-9]{7}".to_string()
}

fn default_learner_pattern() -> String {
    "[a-zA-Z]{6}[0-9]{3}".to_string()
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            url: default_schedule_url(),
            poll_interval_secs: default_poll_interval(),
            request_timeout_secs: default_request_timeout(),
            upcoming_lead_secs: default_upcoming_lead(),
        }
    }
}

impl Default for DialConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name_filter: default_dial_name_filter(),
            ignore_multiple_twists: false,
            toggle_event: default_toggle_event(),
            led_follows_recording: true,
        }
    }
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            baud_rate: default_baud_rate(),
            description_markers: default_description_markers(),
            path_prefixes: default_path_prefixes(),
            settle_delay_ms: default_settle_delay(),
        }
    }
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            lecturer_pattern: default_lecturer_pattern(),
            learner_pattern: default_learner_pattern(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schedule: ScheduleConfig::default(),
            dial: DialConfig::default(),
            indicator: IndicatorConfig::default(),
            lookup: LookupConfig::default(),
            recorder: RecorderConfig::default(),
            config_path: None,
        }
    }
}

impl Config {
    /// Load configuration from default location or create default
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path, creating it if missing
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let mut config = if config_path.exists() {
            let contents = std::fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

            toml::from_str::<Config>(&contents)
                .with_context(|| format!("Failed to parse config file: {:?}", config_path))?
        } else {
            let mut config = Config::default();
            config.config_path = Some(config_path.to_path_buf());
            config.save()?;
            config
        };

        config.config_path = Some(config_path.to_path_buf());
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = match &self.config_path {
            Some(path) => path.clone(),
            None => Self::default_config_path()?,
        };

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    /// Get the config file path
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Get default config path
    fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = directories::ProjectDirs::from("dev", "onair", "agent")
            .context("Failed to determine config directory")?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(SCHEDULE_URL_ENV) {
            if !url.trim().is_empty() {
                self.schedule.url = url;
            }
        }
    }

    /// Reject settings that can only be programming or setup mistakes
    pub fn validate(&self) -> Result<()> {
        if self.schedule.poll_interval_secs == 0 {
            anyhow::bail!("schedule.poll_interval_secs must be greater than zero");
        }
        reqwest::Url::parse(&self.schedule.url)
            .with_context(|| format!("Invalid schedule.url: {}", self.schedule.url))?;
        self.toggle_event()?;
        regex::Regex::new(&self.lookup.lecturer_pattern)
            .context("Invalid lookup.lecturer_pattern")?;
        regex::Regex::new(&self.lookup.learner_pattern)
            .context("Invalid lookup.learner_pattern")?;
        Ok(())
    }

    /// Dial event bound to toggling the recording
    pub fn toggle_event(&self) -> Result<DialEventKind> {
        self.dial
            .toggle_event
            .parse()
            .with_context(|| format!("Invalid dial.toggle_event: {}", self.dial.toggle_event))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.schedule.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.schedule.request_timeout_secs)
    }

    pub fn upcoming_lead(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.schedule.upcoming_lead_secs as i64)
    }
}
