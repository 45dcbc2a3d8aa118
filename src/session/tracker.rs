//! Recording session tracker
//!
//! Merges schedule facts, manual overrides and recording transitions into
//! one indicator status. Not thread-safe on its own: the engine owns the
//! tracker and is the only caller.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use super::SessionDetails;
use crate::indicator::{IndicatorDriver, IndicatorStatus};
use crate::schedule::ScheduleFacts;

/// Status implied by the tracker's inputs
pub fn derive_status(
    is_recording: bool,
    now: DateTime<Utc>,
    window_end: Option<DateTime<Utc>>,
    has_manual: bool,
    upcoming: bool,
) -> IndicatorStatus {
    if is_recording {
        IndicatorStatus::Recording
    } else if window_end.is_some_and(|end| now < end) || has_manual {
        IndicatorStatus::Scheduled
    } else if upcoming {
        IndicatorStatus::Upcoming
    } else {
        IndicatorStatus::Idle
    }
}

/// Result of a start request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// A recording was already running, nothing changed
    AlreadyRecording,
    /// Recording started with these details (None when nobody is scheduled or selected)
    Started(Option<SessionDetails>),
}

/// Which details had their take counter bumped by the running start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TakeSource {
    Manual,
    Schedule,
}

pub struct SessionTracker {
    driver: IndicatorDriver,
    status: IndicatorStatus,
    is_recording: bool,
    schedule_details: Option<SessionDetails>,
    manual_details: Option<SessionDetails>,
    /// Details captured when the current recording started
    recording_details: Option<SessionDetails>,
    take_source: Option<TakeSource>,
    window_end: Option<DateTime<Utc>>,
    upcoming: bool,
    upcoming_lead: Duration,
}

impl SessionTracker {
    pub fn new(driver: IndicatorDriver, upcoming_lead: Duration) -> Self {
        Self {
            driver,
            status: IndicatorStatus::Idle,
            is_recording: false,
            schedule_details: None,
            manual_details: None,
            recording_details: None,
            take_source: None,
            window_end: None,
            upcoming: false,
            upcoming_lead,
        }
    }

    /// Push the current status to the indicators even if unchanged
    pub fn assert_status(&mut self) {
        self.driver.set_status(self.status);
    }

    pub fn status(&self) -> IndicatorStatus {
        self.status
    }

    pub fn is_recording(&self) -> bool {
        self.is_recording
    }

    /// Effective session: the manual override if set, else the scheduled one
    pub fn session(&self) -> Option<&SessionDetails> {
        self.manual_details.as_ref().or(self.schedule_details.as_ref())
    }

    pub fn schedule_session(&self) -> Option<&SessionDetails> {
        self.schedule_details.as_ref()
    }

    pub fn manual_session(&self) -> Option<&SessionDetails> {
        self.manual_details.as_ref()
    }

    pub fn recording_session(&self) -> Option<&SessionDetails> {
        self.recording_details.as_ref()
    }

    pub fn window_end(&self) -> Option<DateTime<Utc>> {
        self.window_end
    }

    /// Apply the schedule as seen at `now`
    pub fn apply_schedule(&mut self, now: DateTime<Utc>, facts: &ScheduleFacts) {
        match &facts.current {
            Some(window) => {
                self.window_end = Some(window.end);

                let is_new = self
                    .schedule_details
                    .as_ref()
                    .map_or(true, |details| details.series != window.series);

                if is_new {
                    info!(
                        "Scheduled session: {} [{}] until {}",
                        window.organizer_name, window.series, window.end
                    );
                    self.schedule_details = Some(SessionDetails::from_window(window));
                    if self.manual_details.take().is_some() {
                        info!("Manual session cleared by new scheduled session");
                    }
                }
            }
            None => {
                if self.schedule_details.is_some() {
                    info!("No current scheduled session");
                }
                self.window_end = None;
                self.schedule_details = None;
            }
        }

        self.upcoming = facts.is_upcoming(now, self.upcoming_lead);
        self.refresh(now);
    }

    /// Start a recording. The manual override wins over the schedule.
    pub fn start_recording(&mut self, now: DateTime<Utc>) -> StartOutcome {
        if self.is_recording {
            debug!("Start requested while already recording");
            return StartOutcome::AlreadyRecording;
        }

        self.is_recording = true;

        let (source, details) = match (&mut self.manual_details, &mut self.schedule_details) {
            (Some(details), _) => (Some(TakeSource::Manual), Some(details)),
            (None, Some(details)) => (Some(TakeSource::Schedule), Some(details)),
            (None, None) => (None, None),
        };
        let active = details.map(|details| {
            details.take += 1;
            details.clone()
        });
        self.take_source = source;

        match &active {
            Some(details) => info!(
                "Recording started: {} - Take #{}",
                details.organizer, details.take
            ),
            None => info!("Recording started without session details"),
        }

        self.recording_details = active.clone();
        self.transition(IndicatorStatus::Recording);
        debug!("Recording started at {}", now);
        StartOutcome::Started(active)
    }

    /// Stop the recording. Returns false if nothing was recording.
    pub fn stop_recording(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_recording {
            debug!("Stop requested while not recording");
            return false;
        }

        self.is_recording = false;
        self.recording_details = None;
        self.take_source = None;

        match self.window_end {
            Some(end) if now < end => info!("Recording stopped, still in scheduled time"),
            Some(_) => info!("Recording stopped, past scheduled time"),
            None => info!("Recording stopped, no scheduled time"),
        }

        self.refresh(now);
        true
    }

    /// The recorder refused to start: back out, including the take, and show the error
    pub fn recording_failed(&mut self) {
        let details = match self.take_source.take() {
            Some(TakeSource::Manual) => self.manual_details.as_mut(),
            Some(TakeSource::Schedule) => self.schedule_details.as_mut(),
            None => None,
        };
        if let Some(details) = details {
            details.take = details.take.saturating_sub(1);
            debug!("Take counter for {} back to {}", details.series, details.take);
        }

        self.is_recording = false;
        self.recording_details = None;
        self.transition(IndicatorStatus::Error);
    }

    /// Use a manually chosen identity instead of the scheduled one
    pub fn set_manual_session(&mut self, now: DateTime<Utc>, details: SessionDetails) {
        info!("Manual session set: {} [{}]", details.organizer, details.series);
        self.manual_details = Some(details);
        self.refresh(now);
    }

    /// Drop the manual identity, falling back to the schedule
    pub fn clear_manual_session(&mut self, now: DateTime<Utc>) {
        if self.manual_details.take().is_some() {
            info!("Manual session cleared");
        }
        self.refresh(now);
    }

    /// Final all-off before exit
    pub fn shutdown(&mut self) {
        self.status = IndicatorStatus::Idle;
        self.driver.set_status(IndicatorStatus::Idle);
    }

    fn refresh(&mut self, now: DateTime<Utc>) {
        // Schedule changes never interrupt a recording's light
        if self.is_recording {
            return;
        }

        let status = derive_status(
            self.is_recording,
            now,
            self.window_end,
            self.manual_details.is_some(),
            self.upcoming,
        );
        self.transition(status);
    }

    fn transition(&mut self, status: IndicatorStatus) {
        if status == self.status {
            return;
        }
        debug!("Status {} -> {}", self.status, status);
        self.status = status;
        self.driver.set_status(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::driver::tests::RecordingDevice;
    use crate::schedule::ScheduleWindow;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 12, 0, 0).unwrap()
    }

    fn window(series: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> ScheduleWindow {
        ScheduleWindow {
            start,
            end,
            series: series.to_string(),
            series_title: format!("{} title", series),
            subject: "Lecture".to_string(),
            organizer_name: "A".to_string(),
            organizer_email: "a@example.org".to_string(),
        }
    }

    fn current(series: &str) -> ScheduleFacts {
        ScheduleFacts {
            current: Some(window(
                series,
                now() - Duration::minutes(10),
                now() + Duration::minutes(10),
            )),
            next_start: None,
        }
    }

    fn manual(name: &str) -> SessionDetails {
        SessionDetails {
            series: format!("P-{}", name),
            series_title: "Personal".to_string(),
            title: name.to_string(),
            organizer: name.to_string(),
            organizer_email: format!("{}@example.org", name),
            take: 0,
        }
    }

    /// Tracker with two attached devices
    fn tracker() -> (SessionTracker, RecordingDevice, RecordingDevice) {
        let a = RecordingDevice::default();
        let b = RecordingDevice::default();
        let driver = IndicatorDriver::new(vec![Box::new(a.clone()), Box::new(b.clone())]);
        (SessionTracker::new(driver, Duration::seconds(1000)), a, b)
    }

    fn last_sent(device: &RecordingDevice) -> Option<String> {
        device.sent.lock().unwrap().last().cloned()
    }

    #[test]
    fn test_current_window_schedules_session() {
        let (mut tracker, a, _) = tracker();

        tracker.apply_schedule(now(), &current("S1"));

        assert_eq!(tracker.status(), IndicatorStatus::Scheduled);
        let session = tracker.session().unwrap();
        assert_eq!(session.series, "S1");
        assert_eq!(session.organizer, "A");
        assert_eq!(session.take, 0);
        assert_eq!(last_sent(&a).as_deref(), Some("SetLed,0,1,0;"));
    }

    #[test]
    fn test_start_increments_take_and_lights_red() {
        let (mut tracker, a, b) = tracker();
        tracker.apply_schedule(now(), &current("S1"));

        let outcome = tracker.start_recording(now());

        assert_eq!(tracker.status(), IndicatorStatus::Recording);
        assert_eq!(tracker.session().unwrap().take, 1);
        match outcome {
            StartOutcome::Started(Some(details)) => assert_eq!(details.take, 1),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(last_sent(&a).as_deref(), Some("SetLed,1,0,0;"));
        assert_eq!(last_sent(&b).as_deref(), Some("SetLed,1,0,0;"));
    }

    #[test]
    fn test_stop_inside_window_reverts_to_scheduled() {
        let (mut tracker, a, _) = tracker();
        tracker.apply_schedule(now(), &current("S1"));
        tracker.start_recording(now());

        assert!(tracker.stop_recording(now() + Duration::minutes(5)));

        assert_eq!(tracker.status(), IndicatorStatus::Scheduled);
        assert!(tracker.recording_session().is_none());
        assert_eq!(last_sent(&a).as_deref(), Some("SetLed,0,1,0;"));
    }

    #[test]
    fn test_stop_after_window_end_goes_idle() {
        let (mut tracker, a, _) = tracker();
        tracker.apply_schedule(now(), &current("S1"));
        tracker.start_recording(now());

        tracker.stop_recording(now() + Duration::minutes(30));

        assert_eq!(tracker.status(), IndicatorStatus::Idle);
        assert_eq!(last_sent(&a).as_deref(), Some("SetLed,0,0,0;"));
    }

    #[test]
    fn test_polls_never_change_recording_light() {
        let (mut tracker, a, _) = tracker();
        tracker.apply_schedule(now(), &current("S1"));
        tracker.start_recording(now());
        let sent_before = a.sent.lock().unwrap().len();

        let later = now() + Duration::hours(2);
        tracker.apply_schedule(later, &ScheduleFacts::default());
        assert_eq!(tracker.status(), IndicatorStatus::Recording);
        tracker.apply_schedule(later, &current("S2"));
        assert_eq!(tracker.status(), IndicatorStatus::Recording);
        tracker.clear_manual_session(later);
        tracker.set_manual_session(later, manual("m"));
        assert_eq!(tracker.status(), IndicatorStatus::Recording);

        assert_eq!(a.sent.lock().unwrap().len(), sent_before);
        assert!(tracker.recording_session().is_some());
    }

    #[test]
    fn test_unchanged_status_is_not_resent() {
        let (mut tracker, a, _) = tracker();
        tracker.apply_schedule(now(), &current("S1"));
        tracker.apply_schedule(now() + Duration::seconds(30), &current("S1"));
        tracker.apply_schedule(now() + Duration::seconds(60), &current("S1"));

        assert_eq!(a.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_same_series_keeps_take_counter() {
        let (mut tracker, _, _) = tracker();
        tracker.apply_schedule(now(), &current("S1"));
        tracker.start_recording(now());
        tracker.stop_recording(now());
        tracker.apply_schedule(now(), &current("S1"));
        tracker.start_recording(now());

        assert_eq!(tracker.session().unwrap().take, 2);
    }

    #[test]
    fn test_new_series_resets_take_and_clears_manual() {
        let (mut tracker, _, _) = tracker();
        tracker.apply_schedule(now(), &current("S1"));
        tracker.start_recording(now());
        tracker.stop_recording(now());
        tracker.set_manual_session(now(), manual("m"));

        tracker.apply_schedule(now(), &current("S2"));

        assert!(tracker.manual_session().is_none());
        let session = tracker.session().unwrap();
        assert_eq!(session.series, "S2");
        assert_eq!(session.take, 0);
    }

    #[test]
    fn test_manual_override_wins_when_recording() {
        let (mut tracker, _, _) = tracker();
        tracker.apply_schedule(now(), &current("S1"));
        tracker.set_manual_session(now(), manual("m"));

        match tracker.start_recording(now()) {
            StartOutcome::Started(Some(details)) => {
                assert_eq!(details.organizer, "m");
                assert_eq!(details.take, 1);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(tracker.schedule_session().unwrap().take, 0);
    }

    #[test]
    fn test_clear_manual_falls_back_to_schedule() {
        let (mut tracker, _, _) = tracker();
        tracker.apply_schedule(now(), &current("S1"));
        tracker.set_manual_session(now(), manual("m"));
        assert_eq!(tracker.session().unwrap().organizer, "m");

        tracker.clear_manual_session(now());
        assert_eq!(tracker.session().unwrap().series, "S1");
        assert_eq!(tracker.status(), IndicatorStatus::Scheduled);
    }

    #[test]
    fn test_manual_without_window() {
        let (mut tracker, a, _) = tracker();
        tracker.apply_schedule(now(), &ScheduleFacts::default());
        assert_eq!(tracker.status(), IndicatorStatus::Idle);

        tracker.set_manual_session(now(), manual("m"));
        assert_eq!(tracker.status(), IndicatorStatus::Scheduled);

        // Polls without a window keep the manual session
        tracker.apply_schedule(now(), &ScheduleFacts::default());
        assert_eq!(tracker.session().unwrap().organizer, "m");
        assert_eq!(tracker.status(), IndicatorStatus::Scheduled);

        tracker.clear_manual_session(now());
        assert!(tracker.session().is_none());
        assert_eq!(tracker.status(), IndicatorStatus::Idle);
        assert_eq!(last_sent(&a).as_deref(), Some("SetLed,0,0,0;"));
    }

    #[test]
    fn test_window_ending_clears_session() {
        let (mut tracker, _, _) = tracker();
        tracker.apply_schedule(now(), &current("S1"));

        tracker.apply_schedule(now() + Duration::hours(1), &ScheduleFacts::default());

        assert!(tracker.session().is_none());
        assert!(tracker.window_end().is_none());
        assert_eq!(tracker.status(), IndicatorStatus::Idle);
    }

    #[test]
    fn test_upcoming_window() {
        let (mut tracker, a, _) = tracker();
        let facts = ScheduleFacts {
            current: None,
            next_start: Some(now() + Duration::minutes(5)),
        };

        tracker.apply_schedule(now(), &facts);

        assert_eq!(tracker.status(), IndicatorStatus::Upcoming);
        assert_eq!(last_sent(&a).as_deref(), Some("SetLed,0,1,0;"));
    }

    #[test]
    fn test_start_without_session() {
        let (mut tracker, _, _) = tracker();
        assert_eq!(tracker.start_recording(now()), StartOutcome::Started(None));
        assert_eq!(tracker.start_recording(now()), StartOutcome::AlreadyRecording);
        assert!(tracker.stop_recording(now()));
        assert!(!tracker.stop_recording(now()));
        assert_eq!(tracker.status(), IndicatorStatus::Idle);
    }

    #[test]
    fn test_recording_failure_shows_error_until_next_poll() {
        let (mut tracker, a, _) = tracker();
        tracker.apply_schedule(now(), &current("S1"));
        tracker.start_recording(now());

        tracker.recording_failed();
        assert!(!tracker.is_recording());
        assert_eq!(tracker.status(), IndicatorStatus::Error);
        assert_eq!(last_sent(&a).as_deref(), Some("SetLed,0,0,0;"));

        tracker.apply_schedule(now(), &current("S1"));
        assert_eq!(tracker.status(), IndicatorStatus::Scheduled);
    }

    #[test]
    fn test_failed_start_does_not_use_up_a_take() {
        let (mut tracker, _, _) = tracker();
        tracker.apply_schedule(now(), &current("S1"));

        tracker.start_recording(now());
        tracker.recording_failed();
        assert_eq!(tracker.session().unwrap().take, 0);

        match tracker.start_recording(now()) {
            StartOutcome::Started(Some(details)) => assert_eq!(details.take, 1),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_failed_manual_start_restores_manual_take() {
        let (mut tracker, _, _) = tracker();
        tracker.apply_schedule(now(), &current("S1"));
        tracker.set_manual_session(now(), manual("m"));

        tracker.start_recording(now());
        tracker.recording_failed();

        assert_eq!(tracker.manual_session().unwrap().take, 0);
        assert_eq!(tracker.schedule_session().unwrap().take, 0);
    }

    #[test]
    fn test_shutdown_turns_lights_off() {
        let (mut tracker, a, b) = tracker();
        tracker.apply_schedule(now(), &current("S1"));
        tracker.start_recording(now());

        tracker.shutdown();

        assert_eq!(last_sent(&a).as_deref(), Some("SetLed,0,0,0;"));
        assert_eq!(last_sent(&b).as_deref(), Some("SetLed,0,0,0;"));
    }

    #[test]
    fn test_derive_status_table() {
        let t = now();
        let end = Some(t + Duration::minutes(1));
        assert_eq!(derive_status(true, t, None, false, false), IndicatorStatus::Recording);
        assert_eq!(derive_status(false, t, end, false, false), IndicatorStatus::Scheduled);
        assert_eq!(derive_status(false, t, Some(t), false, false), IndicatorStatus::Idle);
        assert_eq!(derive_status(false, t, None, true, false), IndicatorStatus::Scheduled);
        assert_eq!(derive_status(false, t, None, false, true), IndicatorStatus::Upcoming);
        assert_eq!(derive_status(false, t, None, false, false), IndicatorStatus::Idle);
    }
}
