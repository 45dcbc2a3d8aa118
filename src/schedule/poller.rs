//! Schedule feed polling

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info, warn};

use super::{parse_feed, ScheduleWindow};
use crate::error::ScheduleError;

/// HTTP client for the event feed
#[derive(Clone)]
pub struct ScheduleClient {
    client: Client,
    url: String,
}

impl ScheduleClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ScheduleError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch and parse the whole feed
    pub async fn fetch(&self) -> Result<Vec<ScheduleWindow>, ScheduleError> {
        debug!("Fetching schedule from {}", self.url);

        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScheduleError::Status(status));
        }

        let body = response.text().await?;
        parse_feed(&body)
    }
}

/// Holds the most recent successfully fetched windows
#[derive(Debug, Default)]
pub struct SchedulePoller {
    windows: Vec<ScheduleWindow>,
    polls: u64,
    failures: u64,
}

impl SchedulePoller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn windows(&self) -> &[ScheduleWindow] {
        &self.windows
    }

    /// Apply a fetch result. Failures keep the previous snapshot.
    pub fn apply(&mut self, result: Result<Vec<ScheduleWindow>, ScheduleError>) -> bool {
        self.polls += 1;
        match result {
            Ok(windows) => {
                info!("Schedule updated: {} events", windows.len());
                self.windows = windows;
                true
            }
            Err(e) => {
                self.failures += 1;
                if e.is_fetch_error() {
                    warn!("Schedule fetch failed, keeping previous schedule: {}", e);
                } else {
                    warn!("Schedule feed unreadable, keeping previous schedule: {}", e);
                }
                false
            }
        }
    }

    /// Fetch once and apply the result
    pub async fn poll(&mut self, client: &ScheduleClient) -> &[ScheduleWindow] {
        let result = client.fetch().await;
        self.apply(result);
        &self.windows
    }

    pub fn failure_count(&self) -> u64 {
        self.failures
    }

    pub fn poll_count(&self) -> u64 {
        self.polls
    }
}
