//! Synchronization engine
//!
//! The engine exclusively owns the session tracker. Timer ticks, schedule
//! poll results, dial presses and UI calls all arrive as messages on one
//! loop, so tracker state is only ever touched from here.
//!
//! Feed requests run on a spawned task with a bounded timeout and report
//! back over a channel, so a stalled request never holds up commands.

use anyhow::Result;
use chrono::Utc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::ScheduleError;
use crate::recorder::Recorder;
use crate::schedule::{timezone, ScheduleClient, ScheduleFacts, SchedulePoller, ScheduleWindow};
use crate::session::{RecordingRequest, SessionTracker, StartOutcome};

use super::{EngineCommand, EngineSnapshot, EngineStatus};

type PollResult = Result<Vec<ScheduleWindow>, ScheduleError>;

/// The synchronization engine coordinates schedule, recorder and indicators
pub struct SyncEngine {
    /// Session state and indicator output
    tracker: SessionTracker,
    /// External recorder
    recorder: Box<dyn Recorder>,
    /// Most recent schedule snapshot
    poller: SchedulePoller,
    /// Feed client, cloned into each fetch task
    client: ScheduleClient,
    /// Command receiver
    cmd_rx: mpsc::Receiver<EngineCommand>,
    /// Status broadcaster
    status_tx: broadcast::Sender<EngineStatus>,
    /// Feed poll interval
    poll_interval: Duration,
    /// Series for recordings without session details
    default_series: Option<String>,
}

impl SyncEngine {
    /// Create a new sync engine
    pub fn new(
        tracker: SessionTracker,
        recorder: Box<dyn Recorder>,
        client: ScheduleClient,
        cmd_rx: mpsc::Receiver<EngineCommand>,
        status_tx: broadcast::Sender<EngineStatus>,
        poll_interval: Duration,
        default_series: Option<String>,
    ) -> Self {
        Self {
            tracker,
            recorder,
            poller: SchedulePoller::new(),
            client,
            cmd_rx,
            status_tx,
            poll_interval,
            default_series,
        }
    }

    /// Run the engine main loop until shutdown
    pub async fn run(&mut self) -> Result<()> {
        info!(
            "Sync engine starting, polling {} every {:?}",
            self.client.url(),
            self.poll_interval
        );

        // Make sure the light matches the (idle) initial state
        self.tracker.assert_status();
        self.publish();

        let (poll_tx, mut poll_rx) = mpsc::channel::<PollResult>(1);
        let mut fetch_in_flight = false;

        let mut poll_timer = tokio::time::interval(self.poll_interval);
        poll_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                // Handle commands
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(EngineCommand::Shutdown) => {
                            info!("Shutdown command received");
                            break;
                        }
                        Some(cmd) => self.handle_command(cmd),
                        None => {
                            info!("All command senders dropped");
                            break;
                        }
                    }
                }

                // Apply finished feed requests
                Some(result) = poll_rx.recv() => {
                    fetch_in_flight = false;
                    self.poller.apply(result);
                    self.apply_schedule();
                }

                // Kick off the next feed request and re-check the snapshot against the clock
                _ = poll_timer.tick() => {
                    if self.recorder.take_finished() {
                        self.handle_command(EngineCommand::RecordingFinished);
                    }

                    if fetch_in_flight {
                        debug!("Previous schedule request still running, skipping this tick");
                    } else {
                        fetch_in_flight = true;
                        let client = self.client.clone();
                        let tx = poll_tx.clone();
                        tokio::spawn(async move {
                            let result = client.fetch().await;
                            let _ = tx.send(result).await;
                        });
                    }

                    self.apply_schedule();
                }
            }
        }

        self.shutdown();
        info!(
            "Sync engine stopped after {} schedule polls ({} failed)",
            self.poller.poll_count(),
            self.poller.failure_count()
        );
        Ok(())
    }

    fn handle_command(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::ToggleRecording => {
                if self.tracker.is_recording() {
                    self.stop_recording();
                } else {
                    self.start_recording();
                }
            }
            EngineCommand::StartRecording => self.start_recording(),
            EngineCommand::StopRecording => self.stop_recording(),
            EngineCommand::RecordingFinished => {
                if self.tracker.stop_recording(Utc::now()) {
                    info!("Recorder reported recording finished");
                }
            }
            EngineCommand::SetManualSession(details) => {
                self.tracker.set_manual_session(Utc::now(), details);
            }
            EngineCommand::ClearManualSession => {
                self.tracker.clear_manual_session(Utc::now());
            }
            EngineCommand::DialLost(reason) => {
                error!("Dial input lost: {}", reason);
                let _ = self.status_tx.send(EngineStatus::DialLost(reason));
            }
            EngineCommand::Shutdown => {}
        }
        self.publish();
    }

    fn start_recording(&mut self) {
        let now = Utc::now();
        let details = match self.tracker.start_recording(now) {
            StartOutcome::AlreadyRecording => return,
            StartOutcome::Started(details) => details,
        };

        let request = match details {
            Some(details) => RecordingRequest::for_session(&details),
            None => RecordingRequest::unscheduled(now, self.default_series.as_deref()),
        };

        if let Err(e) = self.recorder.start(&request) {
            error!("Failed to start recording: {:#}", e);
            self.tracker.recording_failed();
            let _ = self
                .status_tx
                .send(EngineStatus::Error("Recording failed to start".to_string()));
        }
    }

    fn stop_recording(&mut self) {
        if !self.tracker.stop_recording(Utc::now()) {
            return;
        }
        if let Err(e) = self.recorder.stop() {
            error!("Failed to stop recording: {:#}", e);
            let _ = self
                .status_tx
                .send(EngineStatus::Error("Recording failed to stop".to_string()));
        }
    }

    fn apply_schedule(&mut self) {
        let now = Utc::now();
        debug!(
            "Checking calendar events at {} [recording: {}]",
            timezone::to_civil(now),
            self.tracker.is_recording()
        );

        let facts = ScheduleFacts::derive(now, self.poller.windows());
        self.tracker.apply_schedule(now, &facts);
        self.publish();
    }

    fn publish(&self) {
        let _ = self.status_tx.send(EngineStatus::Updated(EngineSnapshot {
            status: self.tracker.status(),
            recording: self.tracker.is_recording(),
            session: self
                .tracker
                .recording_session()
                .or(self.tracker.session())
                .cloned(),
            manual: self.tracker.manual_session().is_some(),
            window_end: self.tracker.window_end(),
        }));
    }

    fn shutdown(&mut self) {
        if self.tracker.is_recording() {
            warn!("Shutting down while recording, stopping recorder");
            if let Err(e) = self.recorder.stop() {
                error!("Failed to stop recording on shutdown: {:#}", e);
            }
        }
        self.tracker.shutdown();
    }
}

/// Create command and status channels for the engine
pub fn create_engine_channels() -> (
    mpsc::Sender<EngineCommand>,
    mpsc::Receiver<EngineCommand>,
    broadcast::Sender<EngineStatus>,
    broadcast::Receiver<EngineStatus>,
) {
    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let (status_tx, status_rx) = broadcast::channel(16);
    (cmd_tx, cmd_rx, status_tx, status_rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LookupConfig;
    use crate::error::SelectionError;
    use crate::indicator::driver::tests::RecordingDevice;
    use crate::indicator::{IndicatorDriver, IndicatorStatus};
    use crate::session::{IdentityPatterns, ManualSelection};
    use crate::sync::EngineHandle;
    use std::sync::{Arc, Mutex};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Records start/stop calls; fails the next `failing_starts` starts
    #[derive(Clone, Default)]
    struct FakeRecorder {
        calls: Arc<Mutex<Vec<String>>>,
        failing_starts: Arc<Mutex<usize>>,
    }

    impl FakeRecorder {
        fn failing(starts: usize) -> Self {
            Self {
                failing_starts: Arc::new(Mutex::new(starts)),
                ..Self::default()
            }
        }
    }

    impl Recorder for FakeRecorder {
        fn start(&mut self, request: &RecordingRequest) -> Result<()> {
            self.calls.lock().unwrap().push(format!("start {}", request.title));
            let mut failing = self.failing_starts.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                anyhow::bail!("recorder offline");
            }
            Ok(())
        }

        fn stop(&mut self) -> Result<()> {
            self.calls.lock().unwrap().push("stop".to_string());
            Ok(())
        }
    }

    fn feed_with_current_window() -> String {
        let now = Utc::now();
        let fmt = "%Y-%m-%dT%H:%M:%S";
        format!(
            r#"[{{
                "start": {{"dateTime": "{}"}},
                "end": {{"dateTime": "{}"}},
                "subject": "Lecture",
                "organizer": {{"emailAddress": {{"name": "A", "address": "a@example.org"}}}},
                "ocSeries": "S1",
                "ocSeriesTitle": "Series One"
            }}]"#,
            (now - chrono::Duration::minutes(10)).format(fmt),
            (now + chrono::Duration::minutes(10)).format(fmt),
        )
    }

    struct Harness {
        handle: EngineHandle,
        status_rx: broadcast::Receiver<EngineStatus>,
        device: RecordingDevice,
        recorder: FakeRecorder,
        task: tokio::task::JoinHandle<()>,
        _server: MockServer,
    }

    async fn start_engine(body: String, recorder: FakeRecorder) -> Harness {
        start_engine_with(body, Box::new(recorder.clone()), recorder).await
    }

    /// Engine driving `engine_recorder`; `recorder` is what the harness exposes
    async fn start_engine_with(
        body: String,
        engine_recorder: Box<dyn Recorder>,
        recorder: FakeRecorder,
    ) -> Harness {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let device = RecordingDevice::default();
        let driver = IndicatorDriver::new(vec![Box::new(device.clone())]);
        let tracker = SessionTracker::new(driver, chrono::Duration::seconds(1000));
        let client = ScheduleClient::new(server.uri(), Duration::from_secs(2)).unwrap();

        let (cmd_tx, cmd_rx, status_tx, status_rx) = create_engine_channels();
        let mut engine = SyncEngine::new(
            tracker,
            engine_recorder,
            client,
            cmd_rx,
            status_tx,
            Duration::from_secs(3600),
            None,
        );
        let task = tokio::spawn(async move {
            engine.run().await.unwrap();
        });

        Harness {
            handle: EngineHandle::new(cmd_tx),
            status_rx,
            device,
            recorder,
            task,
            _server: server,
        }
    }

    /// Wait for a snapshot matching `pred`
    async fn wait_for(
        rx: &mut broadcast::Receiver<EngineStatus>,
        pred: impl Fn(&EngineSnapshot) -> bool,
    ) -> EngineSnapshot {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match rx.recv().await {
                    Ok(EngineStatus::Updated(snapshot)) if pred(&snapshot) => return snapshot,
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(e) => panic!("status channel closed: {}", e),
                }
            }
        })
        .await
        .expect("timed out waiting for engine status")
    }

    #[tokio::test]
    async fn test_schedule_record_stop_shutdown() {
        let mut h = start_engine(feed_with_current_window(), FakeRecorder::default()).await;

        let snapshot = wait_for(&mut h.status_rx, |s| s.status == IndicatorStatus::Scheduled).await;
        assert_eq!(snapshot.session.unwrap().series, "S1");

        h.handle.send(EngineCommand::ToggleRecording).await.unwrap();
        let snapshot = wait_for(&mut h.status_rx, |s| s.recording).await;
        assert_eq!(snapshot.status, IndicatorStatus::Recording);
        assert_eq!(snapshot.session.unwrap().take, 1);

        h.handle.send(EngineCommand::ToggleRecording).await.unwrap();
        let snapshot = wait_for(&mut h.status_rx, |s| !s.recording).await;
        assert_eq!(snapshot.status, IndicatorStatus::Scheduled);

        h.handle.send(EngineCommand::Shutdown).await.unwrap();
        h.task.await.unwrap();

        assert_eq!(
            *h.device.sent.lock().unwrap(),
            vec![
                "SetLed,0,0,0;".to_string(),
                "SetLed,0,1,0;".to_string(),
                "SetLed,1,0,0;".to_string(),
                "SetLed,0,1,0;".to_string(),
                "SetLed,0,0,0;".to_string(),
            ]
        );
        assert_eq!(
            *h.recorder.calls.lock().unwrap(),
            vec!["start A - Take #1".to_string(), "stop".to_string()]
        );
    }

    #[tokio::test]
    async fn test_failed_start_shows_error() {
        let mut h = start_engine("[]".to_string(), FakeRecorder::failing(1)).await;

        h.handle.send(EngineCommand::StartRecording).await.unwrap();
        let snapshot = wait_for(&mut h.status_rx, |s| s.status == IndicatorStatus::Error).await;
        assert!(!snapshot.recording);

        h.handle.send(EngineCommand::Shutdown).await.unwrap();
        h.task.await.unwrap();
        assert_eq!(h.device.sent.lock().unwrap().last().unwrap(), "SetLed,0,0,0;");
    }

    #[tokio::test]
    async fn test_manual_selection_goes_through_validation() {
        let mut h = start_engine("[]".to_string(), FakeRecorder::default()).await;
        let patterns = IdentityPatterns::from_config(&LookupConfig::default()).unwrap();

        let invalid = ManualSelection {
            user_id: "nobody".to_string(),
            name: "Nobody".to_string(),
            ..ManualSelection::default()
        };
        assert_eq!(
            h.handle.select_manual(&invalid, &patterns).await.unwrap_err(),
            SelectionError::UnrecognizedIdentifier("nobody".to_string())
        );

        let valid = ManualSelection {
            user_id: "01234567".to_string(),
            name: "B Lecturer".to_string(),
            email: "b@example.org".to_string(),
            series_id: "P-2".to_string(),
            series_title: "Personal".to_string(),
        };
        h.handle.select_manual(&valid, &patterns).await.unwrap();
        let snapshot = wait_for(&mut h.status_rx, |s| s.session.is_some()).await;
        assert_eq!(snapshot.session.unwrap().organizer, "B Lecturer");
        assert_eq!(snapshot.status, IndicatorStatus::Scheduled);

        h.handle.send(EngineCommand::StartRecording).await.unwrap();
        wait_for(&mut h.status_rx, |s| s.recording).await;

        // Shutdown mid-recording stops the recorder and turns the light off
        h.handle.send(EngineCommand::Shutdown).await.unwrap();
        h.task.await.unwrap();
        assert_eq!(
            *h.recorder.calls.lock().unwrap(),
            vec!["start B Lecturer - Take #1".to_string(), "stop".to_string()]
        );
        assert_eq!(h.device.sent.lock().unwrap().last().unwrap(), "SetLed,0,0,0;");
    }

    #[tokio::test]
    async fn test_failed_start_keeps_take_number() {
        let mut h = start_engine(feed_with_current_window(), FakeRecorder::failing(1)).await;
        wait_for(&mut h.status_rx, |s| s.status == IndicatorStatus::Scheduled).await;

        h.handle.send(EngineCommand::StartRecording).await.unwrap();
        let snapshot = wait_for(&mut h.status_rx, |s| s.status == IndicatorStatus::Error).await;
        assert_eq!(snapshot.session.unwrap().take, 0);

        h.handle.send(EngineCommand::StartRecording).await.unwrap();
        let snapshot = wait_for(&mut h.status_rx, |s| s.recording).await;
        assert_eq!(snapshot.session.unwrap().take, 1);

        h.handle.send(EngineCommand::Shutdown).await.unwrap();
        h.task.await.unwrap();
        assert_eq!(
            *h.recorder.calls.lock().unwrap(),
            vec![
                "start A - Take #1".to_string(),
                "start A - Take #1".to_string(),
                "stop".to_string(),
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_slow_recorder_stop_does_not_stall_commands() {
        use crate::config::RecorderConfig;
        use crate::recorder::CommandRecorder;

        let recorder = CommandRecorder::new(RecorderConfig {
            stop_command: vec!["sleep".to_string(), "3".to_string()],
            ..RecorderConfig::default()
        });
        let mut h = start_engine_with(
            "[]".to_string(),
            Box::new(recorder),
            FakeRecorder::default(),
        )
        .await;

        h.handle.send(EngineCommand::StartRecording).await.unwrap();
        wait_for(&mut h.status_rx, |s| s.recording).await;

        let started = std::time::Instant::now();
        h.handle.send(EngineCommand::StopRecording).await.unwrap();
        wait_for(&mut h.status_rx, |s| !s.recording).await;
        h.handle.send(EngineCommand::StartRecording).await.unwrap();
        wait_for(&mut h.status_rx, |s| s.recording).await;
        assert!(started.elapsed() < Duration::from_secs(1));

        h.handle.send(EngineCommand::Shutdown).await.unwrap();
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_dial_leaves_engine_running() {
        use crate::config::DialConfig;
        use crate::error::DialError;
        use crate::input::{DialEventKind, DialListener};

        let mut h = start_engine(feed_with_current_window(), FakeRecorder::default()).await;
        wait_for(&mut h.status_rx, |s| s.status == IndicatorStatus::Scheduled).await;

        let config = DialConfig {
            name_filter: "no-such-dial-attached".to_string(),
            ..DialConfig::default()
        };
        let handle = h.handle.clone();
        let result = tokio::task::spawn_blocking(move || {
            DialListener::start(&config, DialEventKind::Release, handle)
        })
        .await
        .unwrap();
        assert!(matches!(result, Err(DialError::DeviceNotFound { .. })));

        // Toggling without a dial still drives the light
        h.handle.send(EngineCommand::ToggleRecording).await.unwrap();
        let snapshot = wait_for(&mut h.status_rx, |s| s.recording).await;
        assert_eq!(snapshot.status, IndicatorStatus::Recording);

        h.handle.send(EngineCommand::Shutdown).await.unwrap();
        h.task.await.unwrap();
        assert_eq!(
            *h.device.sent.lock().unwrap(),
            vec![
                "SetLed,0,0,0;".to_string(),
                "SetLed,0,1,0;".to_string(),
                "SetLed,1,0,0;".to_string(),
                "SetLed,0,0,0;".to_string(),
            ]
        );
    }
}
