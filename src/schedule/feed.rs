//! Schedule feed format and window matching

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::error::ScheduleError;

/// One calendar entry as the feed sends it
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedEvent {
    start: FeedTime,
    end: FeedTime,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    organizer: Option<FeedOrganizer>,
    #[serde(default)]
    oc_series: Option<String>,
    #[serde(default)]
    oc_series_title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedTime {
    date_time: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedOrganizer {
    email_address: FeedEmailAddress,
}

#[derive(Debug, Deserialize)]
struct FeedEmailAddress {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    address: Option<String>,
}

/// A scheduled recording slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub series: String,
    pub series_title: String,
    pub subject: String,
    pub organizer_name: String,
    pub organizer_email: String,
}

impl ScheduleWindow {
    /// Current iff strictly inside the window
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        self.start < now && now < self.end
    }
}

/// Parse a feed body into windows, in feed order.
/// Any malformed record fails the whole feed.
pub fn parse_feed(body: &str) -> Result<Vec<ScheduleWindow>, ScheduleError> {
    let events: Vec<FeedEvent> = serde_json::from_str(body)?;

    events
        .into_iter()
        .map(|event| {
            let (organizer_name, organizer_email) = match event.organizer {
                Some(org) => (
                    org.email_address.name.unwrap_or_default(),
                    org.email_address.address.unwrap_or_default(),
                ),
                None => (String::new(), String::new()),
            };

            Ok(ScheduleWindow {
                start: parse_feed_time(&event.start.date_time)?,
                end: parse_feed_time(&event.end.date_time)?,
                series: event.oc_series.unwrap_or_default(),
                series_title: event.oc_series_title.unwrap_or_default(),
                subject: event.subject.unwrap_or_default(),
                organizer_name,
                organizer_email,
            })
        })
        .collect()
}

/// Feed times carry no zone and are UTC
pub fn parse_feed_time(value: &str) -> Result<DateTime<Utc>, ScheduleError> {
    let value = value.trim();
    let with_zone = format!("{}Z", value);

    DateTime::parse_from_rfc3339(&with_zone)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .map(|t| t.with_timezone(&Utc))
        .map_err(|source| ScheduleError::Timestamp {
            value: value.to_string(),
            source,
        })
}

/// The window current at `now`. Later feed entries win over earlier ones.
pub fn match_window(now: DateTime<Utc>, windows: &[ScheduleWindow]) -> Option<&ScheduleWindow> {
    windows.iter().filter(|w| w.contains(now)).last()
}

/// What the tracker needs to know about the schedule at one instant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleFacts {
    /// The window `now` falls in, if any
    pub current: Option<ScheduleWindow>,
    /// Start of the earliest window that has not started yet
    pub next_start: Option<DateTime<Utc>>,
}

impl ScheduleFacts {
    pub fn derive(now: DateTime<Utc>, windows: &[ScheduleWindow]) -> Self {
        Self {
            current: match_window(now, windows).cloned(),
            next_start: windows.iter().map(|w| w.start).filter(|s| *s > now).min(),
        }
    }

    /// Whether the next window starts within `lead` of `now`
    pub fn is_upcoming(&self, now: DateTime<Utc>, lead: Duration) -> bool {
        self.next_start.is_some_and(|start| start - now <= lead)
    }
}
