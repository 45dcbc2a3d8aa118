//! Session identity and the recording request built from it

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::schedule::ScheduleWindow;

/// Who and what is being recorded
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SessionDetails {
    pub series: String,
    pub series_title: String,
    pub title: String,
    pub organizer: String,
    pub organizer_email: String,
    pub take: u32,
}

impl SessionDetails {
    /// Fresh session for a schedule window, take 0
    pub fn from_window(window: &ScheduleWindow) -> Self {
        Self {
            series: window.series.clone(),
            series_title: window.series_title.clone(),
            title: window.subject.clone(),
            organizer: window.organizer_name.clone(),
            organizer_email: window.organizer_email.clone(),
            take: 0,
        }
    }

    /// Caption shown while this session is live
    pub fn live_caption(&self) -> String {
        format!("Live with {}", self.organizer)
    }
}

/// What the recorder is asked to record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordingRequest {
    pub id: String,
    pub title: String,
    pub presenter: Option<String>,
    pub source: Option<String>,
    pub series: Option<String>,
    pub series_title: Option<String>,
    pub take: u32,
}

impl RecordingRequest {
    /// Request for a take of a known session
    pub fn for_session(details: &SessionDetails) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: format!("{} - Take #{}", details.organizer, details.take),
            presenter: Some(details.organizer.clone()),
            source: Some(format!("Personal[{}]", details.series)),
            series: Some(details.series.clone()),
            series_title: Some(details.series_title.clone()),
            take: details.take,
        }
    }

    /// Request when nobody is scheduled or selected
    pub fn unscheduled(now: DateTime<Utc>, default_series: Option<&str>) -> Self {
        let started = now.format("%Y-%m-%dT%H:%M:%S");
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: format!("Recording started at {}", started),
            presenter: None,
            source: None,
            series: default_series.map(str::to_string),
            series_title: None,
            take: 0,
        }
    }
}
