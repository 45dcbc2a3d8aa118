//! Dial event classification and dispatch

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::{open_backend, DialBackend, RawRecord, RecordKind};
use crate::error::DialError;

/// How long a single fetch may block before the cancel flag is rechecked
const FETCH_TIMEOUT: Duration = Duration::from_millis(250);

/// LED level meaning no change is pending
const NO_LED_REQUEST: u16 = u16::MAX;

pub const LED_FULL: u8 = 255;

/// A semantic dial gesture. Magnitudes are absolute values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialEvent {
    Press,
    Release,
    TurnLeft(u32),
    TurnRight(u32),
    TwistLeft(u32),
    TwistRight(u32),
}

/// Handler registration key for [`DialEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DialEventKind {
    Press,
    Release,
    TurnLeft,
    TurnRight,
    TwistLeft,
    TwistRight,
}

impl DialEvent {
    pub fn kind(&self) -> DialEventKind {
        match self {
            DialEvent::Press => DialEventKind::Press,
            DialEvent::Release => DialEventKind::Release,
            DialEvent::TurnLeft(_) => DialEventKind::TurnLeft,
            DialEvent::TurnRight(_) => DialEventKind::TurnRight,
            DialEvent::TwistLeft(_) => DialEventKind::TwistLeft,
            DialEvent::TwistRight(_) => DialEventKind::TwistRight,
        }
    }
}

impl FromStr for DialEventKind {
    type Err = DialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "press" => Ok(DialEventKind::Press),
            // "depress" is what the PowerMate docs call it
            "release" | "depress" => Ok(DialEventKind::Release),
            "turn_left" => Ok(DialEventKind::TurnLeft),
            "turn_right" => Ok(DialEventKind::TurnRight),
            "twist_left" => Ok(DialEventKind::TwistLeft),
            "twist_right" => Ok(DialEventKind::TwistRight),
            _ => Err(DialError::UnknownDialEvent(s.to_string())),
        }
    }
}

impl fmt::Display for DialEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DialEventKind::Press => "press",
            DialEventKind::Release => "release",
            DialEventKind::TurnLeft => "turn_left",
            DialEventKind::TurnRight => "turn_right",
            DialEventKind::TwistLeft => "twist_left",
            DialEventKind::TwistRight => "twist_right",
        };
        f.write_str(name)
    }
}

/// Press/twist latches that turn raw records into gestures
#[derive(Debug, Default)]
pub struct DialClassifier {
    pressed: bool,
    has_twisted: bool,
    ignore_multiple_twists: bool,
}

impl DialClassifier {
    pub fn new(ignore_multiple_twists: bool) -> Self {
        Self {
            ignore_multiple_twists,
            ..Self::default()
        }
    }

    /// Classify one raw record. Returns None for records that produce no gesture.
    pub fn classify(&mut self, record: RawRecord) -> Option<DialEvent> {
        match record.kind {
            RecordKind::Key if record.value == 0 => {
                self.pressed = false;
                self.has_twisted = false;
                Some(DialEvent::Release)
            }
            RecordKind::Key => {
                self.pressed = true;
                Some(DialEvent::Press)
            }
            RecordKind::Relative => {
                let magnitude = record.value.unsigned_abs();
                let right = record.value > 0;

                if !self.pressed {
                    return Some(if right {
                        DialEvent::TurnRight(magnitude)
                    } else {
                        DialEvent::TurnLeft(magnitude)
                    });
                }

                if self.has_twisted {
                    return None;
                }
                if self.ignore_multiple_twists {
                    self.has_twisted = true;
                }
                Some(if right {
                    DialEvent::TwistRight(magnitude)
                } else {
                    DialEvent::TwistLeft(magnitude)
                })
            }
            RecordKind::Sync | RecordKind::Other => None,
        }
    }
}

pub type DialHandler = Box<dyn FnMut(DialEvent) + Send>;

/// Steers a dial from other threads while it listens
#[derive(Debug, Clone)]
pub struct DialControls {
    ignore_all_events: Arc<AtomicBool>,
    led_request: Arc<AtomicU16>,
}

impl Default for DialControls {
    fn default() -> Self {
        Self {
            ignore_all_events: Arc::new(AtomicBool::new(false)),
            led_request: Arc::new(AtomicU16::new(NO_LED_REQUEST)),
        }
    }
}

impl DialControls {
    /// While set, records are read and dropped without reaching any handler
    pub fn ignore_all_events(&self, value: bool) {
        self.ignore_all_events.store(value, Ordering::SeqCst);
    }

    pub fn is_ignoring_events(&self) -> bool {
        self.ignore_all_events.load(Ordering::SeqCst)
    }

    /// Ask the listening dial to set its LED. Only the latest request is applied.
    pub fn request_brightness(&self, level: u8) {
        self.led_request.store(level as u16, Ordering::SeqCst);
    }

    pub fn led_on(&self) {
        self.request_brightness(LED_FULL);
    }

    pub fn led_off(&self) {
        self.request_brightness(0);
    }

    fn take_led_request(&self) -> Option<u8> {
        match self.led_request.swap(NO_LED_REQUEST, Ordering::SeqCst) {
            NO_LED_REQUEST => None,
            level => Some(level as u8),
        }
    }
}

/// An opened dial with its registered handlers
pub struct Dial {
    backend: Box<dyn DialBackend>,
    classifier: DialClassifier,
    handlers: HashMap<DialEventKind, DialHandler>,
    controls: DialControls,
}

impl Dial {
    /// Open the dial at `path`
    pub fn open(path: &Path, ignore_multiple_twists: bool) -> Result<Self, DialError> {
        let backend = open_backend(path)?;
        Ok(Self::with_backend(backend, ignore_multiple_twists))
    }

    pub fn with_backend(backend: Box<dyn DialBackend>, ignore_multiple_twists: bool) -> Self {
        Self {
            backend,
            classifier: DialClassifier::new(ignore_multiple_twists),
            handlers: HashMap::new(),
            controls: DialControls::default(),
        }
    }

    pub fn path(&self) -> &Path {
        self.backend.path()
    }

    /// Handle for muting the dial or changing its LED from another thread
    pub fn controls(&self) -> DialControls {
        self.controls.clone()
    }

    /// Set the LED right away
    pub fn set_brightness(&mut self, level: u8) -> Result<(), DialError> {
        debug!("Dial LED brightness {}", level);
        self.backend.set_led(level)
    }

    pub fn led_off(&mut self) -> Result<(), DialError> {
        self.set_brightness(0)
    }

    /// Register the handler for `kind`, replacing any previous one
    pub fn on<F>(&mut self, kind: DialEventKind, handler: F)
    where
        F: FnMut(DialEvent) + Send + 'static,
    {
        self.handlers.insert(kind, Box::new(handler));
    }

    /// Block reading the device until cancelled or the device fails.
    ///
    /// Device errors end the loop and are returned; restarting is up to the caller.
    pub fn listen(mut self, cancel: Arc<AtomicBool>) -> Result<(), DialError> {
        info!("Listening on dial {:?}", self.backend.path());

        while !cancel.load(Ordering::SeqCst) {
            // LED write failures are not fatal
            if let Some(level) = self.controls.take_led_request() {
                if let Err(e) = self.set_brightness(level) {
                    warn!("Failed to set dial LED: {}", e);
                }
            }

            let records = match self.backend.fetch(FETCH_TIMEOUT) {
                Ok(records) => records,
                Err(e) => {
                    match &e {
                        DialError::DeviceDisconnected { .. } => error!("Dial unplugged"),
                        other => error!("Dial read failed: {}", other),
                    }
                    return Err(e);
                }
            };

            for record in records {
                if record.kind == RecordKind::Sync || self.controls.is_ignoring_events() {
                    continue;
                }
                debug!("Processing dial record: {:?}", record);

                if let Some(event) = self.classifier.classify(record) {
                    self.dispatch(event);
                }
            }
        }

        info!("Listen cancelled on dial {:?}", self.backend.path());
        Ok(())
    }

    fn dispatch(&mut self, event: DialEvent) {
        if let Some(handler) = self.handlers.get_mut(&event.kind()) {
            handler(event);
        }
    }
}
