use log_watcher::{
    ClassifiedEntry, Error, JsonLinesSink, LifecycleKind, Result, Severity, Sink, StopCause,
    WatchEvent, Watcher, WatcherConfig, WatcherState,
};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_test::{assert_err, assert_ok};

const WAIT: Duration = Duration::from_secs(5);

/// Poll `condition` until it holds or `timeout` passes.
async fn wait_for<F: FnMut() -> bool>(mut condition: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

struct LogFile {
    path: PathBuf,
    _dir: tempfile::TempDir,
}

impl LogFile {
    fn new(history: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, history).unwrap();
        Self { path, _dir: dir }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, line: &str) {
        let mut file = OpenOptions::new().append(true).open(&self.path).unwrap();
        writeln!(file, "{}", line).unwrap();
        file.flush().unwrap();
    }

    fn truncate(&self) {
        File::create(&self.path).unwrap();
    }

    fn rotate(&self) {
        std::fs::rename(&self.path, self.path.with_extension("log.1")).unwrap();
        File::create(&self.path).unwrap();
    }

    fn remove(&self) {
        std::fs::remove_file(&self.path).unwrap();
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<WatchEvent>>,
}

impl RecordingSink {
    fn events(&self) -> Vec<WatchEvent> {
        self.events.lock().unwrap().clone()
    }

    fn entries(&self) -> Vec<ClassifiedEntry> {
        self.events()
            .iter()
            .filter_map(|e| e.as_entry().cloned())
            .collect()
    }

    fn lifecycle(&self) -> Vec<LifecycleKind> {
        self.events()
            .iter()
            .filter_map(|e| e.as_lifecycle().map(|l| l.kind.clone()))
            .collect()
    }

    fn count_of(&self, event_type: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .count()
    }
}

impl Sink for RecordingSink {
    fn handle(&self, event: &WatchEvent) -> Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

struct FailingSink;

impl Sink for FailingSink {
    fn handle(&self, _event: &WatchEvent) -> Result<()> {
        Err(Error::Sink {
            message: "downstream unavailable".to_string(),
        })
    }
}

struct PanickingSink;

impl Sink for PanickingSink {
    fn handle(&self, _event: &WatchEvent) -> Result<()> {
        panic!("sink exploded");
    }
}

fn config(min_severity: &str) -> WatcherConfig {
    WatcherConfig::builder()
        .poll_interval(0.01)
        .retry_delay(0.01)
        .min_severity(min_severity)
        .use_colors(false)
        .build()
        .unwrap()
}

/// Starts `watcher` on its own task and waits until it is polling.
async fn spawn_running(watcher: &Arc<Watcher>) -> JoinHandle<Result<()>> {
    let handle = tokio::spawn({
        let watcher = watcher.clone();
        async move { watcher.start().await }
    });
    assert!(wait_for(|| watcher.is_running(), WAIT).await);
    handle
}

fn recording_watcher(file: &LogFile, config: WatcherConfig) -> (Arc<Watcher>, Arc<RecordingSink>) {
    let watcher = Arc::new(Watcher::new(file.path(), config));
    let recorder = Arc::new(RecordingSink::default());
    watcher.add_sink(recorder.clone());
    (watcher, recorder)
}

#[tokio::test]
async fn test_existing_content_is_not_replayed() {
    let file = LogFile::new("ERROR: old failure\nWARN: old warning\n");
    let (watcher, recorder) = recording_watcher(&file, config("DEBUG"));
    let handle = spawn_running(&watcher).await;

    file.append("ERROR: fresh failure");
    assert!(wait_for(|| !recorder.entries().is_empty(), WAIT).await);
    tokio::time::sleep(Duration::from_millis(50)).await;

    watcher.stop();
    assert_ok!(handle.await.unwrap());

    let entries = recorder.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].message(), "fresh failure");
}

#[tokio::test]
async fn test_error_line_reaches_every_sink_once() {
    let file = LogFile::new("");
    let (watcher, recorder) = recording_watcher(&file, config("WARN"));
    let second = Arc::new(RecordingSink::default());
    watcher.add_sink(second.clone());
    let handle = spawn_running(&watcher).await;

    file.append("ERROR: db down");
    assert!(wait_for(|| second.entries().len() == 1, WAIT).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    watcher.stop();
    assert_ok!(handle.await.unwrap());

    for sink in [&recorder, &second] {
        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].severity(), Severity::Error);
        assert_eq!(entries[0].message(), "db down");
        assert_eq!(entries[0].raw_line(), "ERROR: db down");
    }
}

#[tokio::test]
async fn test_unmarked_line_defaults_to_info() {
    for minimum in ["INFO", "DEBUG"] {
        let file = LogFile::new("");
        let (watcher, recorder) = recording_watcher(&file, config(minimum));
        let handle = spawn_running(&watcher).await;

        file.append("hello world");
        assert!(wait_for(|| recorder.entries().len() == 1, WAIT).await);
        watcher.stop();
        assert_ok!(handle.await.unwrap());

        let entry = &recorder.entries()[0];
        assert_eq!(entry.severity(), Severity::Info);
        assert_eq!(entry.message(), "hello world");
    }
}

#[tokio::test]
async fn test_blank_lines_are_classified() {
    let file = LogFile::new("");
    let (watcher, recorder) = recording_watcher(&file, config("DEBUG"));
    let handle = spawn_running(&watcher).await;

    file.append("");
    file.append("last");
    assert!(wait_for(|| recorder.entries().len() == 2, WAIT).await);
    watcher.stop();
    assert_ok!(handle.await.unwrap());

    let entries = recorder.entries();
    assert_eq!(entries[0].severity(), Severity::Info);
    assert_eq!(entries[0].message(), "");
    assert_eq!(entries[1].message(), "last");
    assert_eq!(watcher.stats().unwrap().log_entries.total_lines, 2);
}

#[tokio::test]
async fn test_lines_below_minimum_are_filtered() {
    let file = LogFile::new("");
    let (watcher, recorder) = recording_watcher(&file, config("WARN"));
    let handle = spawn_running(&watcher).await;

    file.append("INFO: request served");
    file.append("DEBUG: cache hit");
    file.append("WARNING: disk at 91%");
    assert!(wait_for(|| recorder.entries().len() == 1, WAIT).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    watcher.stop();
    assert_ok!(handle.await.unwrap());

    let entries = recorder.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].severity(), Severity::Warn);
    assert_eq!(entries[0].message(), "disk at 91%");

    let stats = watcher.stats().unwrap();
    assert_eq!(stats.log_entries.total_lines, 1);
    assert_eq!(stats.log_entries.by_severity[&Severity::Info], 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_rotation_is_reported_before_new_lines() {
    let file = LogFile::new("");
    let (watcher, recorder) = recording_watcher(&file, config("DEBUG"));
    let handle = spawn_running(&watcher).await;

    file.append("ERROR: before rotation");
    assert!(wait_for(|| recorder.entries().len() == 1, WAIT).await);

    file.rotate();
    assert!(wait_for(|| recorder.count_of("file_rotation") == 1, WAIT).await);
    file.append("ERROR: after rotation");
    assert!(wait_for(|| recorder.entries().len() == 2, WAIT).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    watcher.stop();
    assert_ok!(handle.await.unwrap());

    assert_eq!(recorder.count_of("file_rotation"), 1);
    let events = recorder.events();
    let rotated_at = events
        .iter()
        .position(|e| e.event_type() == "file_rotation")
        .unwrap();
    let new_line_at = events
        .iter()
        .position(|e| e.as_entry().is_some_and(|entry| entry.message() == "after rotation"))
        .unwrap();
    assert!(rotated_at < new_line_at);

    let rotated = recorder
        .lifecycle()
        .into_iter()
        .find_map(|kind| match kind {
            LifecycleKind::Rotated {
                old_identity,
                new_identity,
            } => Some((old_identity, new_identity)),
            _ => None,
        })
        .unwrap();
    assert_ne!(rotated.0, rotated.1);
}

#[tokio::test]
async fn test_truncation_restarts_from_beginning() {
    let history = "INFO: filler line that makes the file longer than what comes next\n".repeat(4);
    let file = LogFile::new(&history);
    let (watcher, recorder) = recording_watcher(&file, config("DEBUG"));
    let handle = spawn_running(&watcher).await;

    file.truncate();
    assert!(wait_for(|| recorder.count_of("file_truncated") == 1, WAIT).await);
    file.append("ERROR: after truncate");
    assert!(wait_for(|| recorder.entries().len() == 1, WAIT).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    watcher.stop();
    assert_ok!(handle.await.unwrap());

    assert_eq!(recorder.count_of("file_truncated"), 1);
    assert!(recorder.lifecycle().contains(&LifecycleKind::Truncated {
        old_size: history.len() as u64,
        new_size: 0,
    }));
    assert_eq!(recorder.entries()[0].message(), "after truncate");
}

#[tokio::test]
async fn test_failing_sinks_do_not_block_others() {
    let file = LogFile::new("");
    let watcher = Arc::new(Watcher::new(file.path(), config("DEBUG")));
    watcher.add_sink(Arc::new(FailingSink));
    watcher.add_sink(Arc::new(PanickingSink));
    let recorder = Arc::new(RecordingSink::default());
    watcher.add_sink(recorder.clone());
    let handle = spawn_running(&watcher).await;

    file.append("ERROR: first");
    file.append("WARN: second");
    assert!(wait_for(|| recorder.entries().len() == 2, WAIT).await);
    watcher.stop();
    assert_ok!(handle.await.unwrap());

    let stats = watcher.stats().unwrap();
    assert_eq!(stats.log_entries.total_lines, 2);
    assert_eq!(stats.log_entries.by_severity[&Severity::Error], 1);
    assert_eq!(stats.log_entries.by_severity[&Severity::Warn], 1);
    assert!(stats.errors.sink_failures >= 4);
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let file = LogFile::new("");
    let config = WatcherConfig::builder()
        .poll_interval(0.01)
        .retry_delay(0.01)
        .max_retries(2)
        .build()
        .unwrap();
    let (watcher, recorder) = recording_watcher(&file, config);
    let handle = spawn_running(&watcher).await;

    file.remove();
    let result = tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();

    assert!(matches!(result, Err(Error::RetriesExhausted { attempts: 2 })));
    assert_eq!(watcher.state(), WatcherState::Errored);
    assert_eq!(watcher.stop_cause(), Some(StopCause::RetriesExhausted));
    assert_eq!(watcher.retry_count(), 2);
    // One failed poll plus two failed reopen attempts.
    assert_eq!(recorder.count_of("file_error"), 3);
    assert!(recorder.lifecycle().contains(&LifecycleKind::StateChanged {
        old_state: WatcherState::Running,
        new_state: WatcherState::Errored,
    }));

    // Terminal: a new watcher is needed.
    watcher.stop();
    assert_eq!(watcher.state(), WatcherState::Stopped);
    assert_eq!(watcher.stop_cause(), Some(StopCause::RetriesExhausted));
    assert!(matches!(
        watcher.start().await,
        Err(Error::InvalidState { .. })
    ));
}

#[tokio::test]
async fn test_restart_disabled_fails_immediately() {
    let file = LogFile::new("");
    let config = WatcherConfig::builder()
        .poll_interval(0.01)
        .restart_on_error(false)
        .build()
        .unwrap();
    let (watcher, recorder) = recording_watcher(&file, config);
    let handle = spawn_running(&watcher).await;

    file.remove();
    let result = tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();

    assert!(matches!(result, Err(Error::RetriesExhausted { attempts: 0 })));
    assert_eq!(watcher.state(), WatcherState::Errored);
    assert_eq!(recorder.count_of("file_error"), 1);
}

#[tokio::test]
async fn test_recovers_when_file_reappears() {
    let file = LogFile::new("");
    let config = WatcherConfig::builder()
        .poll_interval(0.01)
        .retry_delay(0.2)
        .max_retries(5)
        .min_severity("DEBUG")
        .build()
        .unwrap();
    let (watcher, recorder) = recording_watcher(&file, config);
    let handle = spawn_running(&watcher).await;

    file.remove();
    // First reopen attempt is waiting out its delay.
    assert!(wait_for(|| watcher.retry_count() == 1, WAIT).await);
    File::create(file.path()).unwrap();
    assert!(wait_for(|| watcher.retry_count() == 0, WAIT).await);
    assert_eq!(recorder.count_of("file_error"), 1);

    file.append("ERROR: back again");
    assert!(wait_for(|| recorder.entries().len() == 1, WAIT).await);
    assert!(watcher.is_running());
    // Recreating the file is at most one identity change.
    assert!(recorder.count_of("file_rotation") <= 1);

    watcher.stop();
    assert_ok!(handle.await.unwrap());
    assert_eq!(watcher.stop_cause(), Some(StopCause::Requested));
}

#[tokio::test]
async fn test_requested_stop_is_clean() {
    let file = LogFile::new("");
    let (watcher, recorder) = recording_watcher(&file, config("WARN"));
    let handle = spawn_running(&watcher).await;

    watcher.stop();
    watcher.stop();
    assert_ok!(handle.await.unwrap());

    assert_eq!(watcher.state(), WatcherState::Stopped);
    assert_eq!(watcher.stop_cause(), Some(StopCause::Requested));
    assert_eq!(
        recorder.lifecycle(),
        vec![
            LifecycleKind::StateChanged {
                old_state: WatcherState::Stopped,
                new_state: WatcherState::Running,
            },
            LifecycleKind::StateChanged {
                old_state: WatcherState::Running,
                new_state: WatcherState::Stopped,
            },
        ]
    );

    let timing = watcher.stats().unwrap().timing;
    assert!(timing.started_at.is_some());
    assert!(timing.finished_at.is_some());
}

#[tokio::test]
async fn test_stopped_watcher_can_start_again() {
    let file = LogFile::new("");
    let (watcher, recorder) = recording_watcher(&file, config("DEBUG"));

    let handle = spawn_running(&watcher).await;
    watcher.stop();
    assert_ok!(handle.await.unwrap());

    let handle = spawn_running(&watcher).await;
    file.append("ERROR: second run");
    assert!(wait_for(|| recorder.entries().len() == 1, WAIT).await);
    watcher.stop();
    assert_ok!(handle.await.unwrap());
}

#[tokio::test]
async fn test_pause_keeps_cursor() {
    let file = LogFile::new("");
    let (watcher, recorder) = recording_watcher(&file, config("DEBUG"));
    let handle = spawn_running(&watcher).await;

    watcher.pause();
    assert_eq!(watcher.state(), WatcherState::Paused);
    file.append("ERROR: written while paused");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(recorder.entries().is_empty());

    watcher.resume();
    assert!(wait_for(|| recorder.entries().len() == 1, WAIT).await);
    assert_eq!(recorder.entries()[0].message(), "written while paused");

    watcher.stop();
    assert_ok!(handle.await.unwrap());
}

#[tokio::test]
async fn test_start_requires_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let watcher = Watcher::new(dir.path().join("nope.log"), config("WARN"));

    let err = assert_err!(watcher.start().await);
    assert!(matches!(err, Error::FileNotFound { .. }));
    assert_eq!(watcher.state(), WatcherState::Stopped);
}

#[tokio::test]
async fn test_concurrent_start_rejected() {
    let file = LogFile::new("");
    let (watcher, _recorder) = recording_watcher(&file, config("WARN"));
    let handle = spawn_running(&watcher).await;

    let err = assert_err!(watcher.start().await);
    assert!(matches!(err, Error::InvalidState { .. }));

    watcher.stop();
    assert_ok!(handle.await.unwrap());
}

#[tokio::test]
async fn test_subscription_stream() {
    let file = LogFile::new("");
    let watcher = Arc::new(Watcher::new(file.path(), config("DEBUG")));
    let mut events = watcher.subscribe();
    let handle = spawn_running(&watcher).await;

    file.append("WARN: queue backing up");

    let mut entry = None;
    while entry.is_none() {
        let event = tokio::time::timeout(WAIT, events.next())
            .await
            .unwrap()
            .unwrap();
        entry = event.as_entry().cloned();
    }
    let entry = entry.unwrap();
    assert_eq!(entry.severity(), Severity::Warn);
    assert_eq!(entry.message(), "queue backing up");

    watcher.stop();
    assert_ok!(handle.await.unwrap());
}

#[tokio::test]
async fn test_json_output_file() {
    let file = LogFile::new("");
    let out_dir = tempfile::tempdir().unwrap();
    let out_path = out_dir.path().join("out/events.jsonl");

    let watcher = Arc::new(Watcher::new(file.path(), config("WARN")));
    watcher.add_sink(Arc::new(JsonLinesSink::create(&out_path).unwrap()));
    let handle = spawn_running(&watcher).await;

    file.append("ERROR: db down");
    assert!(
        wait_for(
            || std::fs::read_to_string(&out_path)
                .map(|s| s.contains("log_entry"))
                .unwrap_or(false),
            WAIT
        )
        .await
    );
    watcher.stop();
    assert_ok!(handle.await.unwrap());

    let records: Vec<serde_json::Value> = std::fs::read_to_string(&out_path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    let entry = records
        .iter()
        .find(|r| r["event_type"] == "log_entry")
        .unwrap();
    assert_eq!(entry["level"], "ERROR");
    assert_eq!(entry["parsed_message"], "db down");
    assert!(records.iter().any(|r| r["event_type"] == "state_changed"));
}
