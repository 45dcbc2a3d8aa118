//! Schedule poller - fetches the event feed and decides which window is current

mod feed;
mod poller;
pub mod timezone;

pub use feed::{parse_feed, ScheduleFacts, ScheduleWindow};
pub use poller::{ScheduleClient, SchedulePoller};
