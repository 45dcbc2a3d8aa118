//! Dial input source
//!
//! Reads press/release/turn/twist gestures from a PowerMate-style dial.

mod backend;
mod dial;
mod listener;

#[cfg(target_os = "linux")]
pub(crate) mod evdev_backend;

pub use backend::*;
pub use dial::*;
pub use listener::{follow_recording, DialListener};
