//! Recording session tracking

mod details;
mod selection;
mod tracker;

pub use details::{RecordingRequest, SessionDetails};
pub use selection::{IdentityKind, IdentityPatterns, ManualSelection};
pub use tracker::{SessionTracker, StartOutcome};
