//! The watch loop: lifecycle state machine, retry policy and fan-out.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{Instrument, Span, debug, error, info, info_span, trace, warn};

use crate::classify::{KeywordClassifier, LineClassifier};
use crate::config::WatcherConfig;
use crate::error::{Error, Result};
use crate::event::{ClassifiedEntry, LifecycleKind, WatchEvent};
use crate::severity::SeverityFilter;
use crate::sink::{Sink, StatsCollector, StatsSnapshot, lock};
use crate::state::{StopCause, WatcherState};
use crate::stream::{self, EventStream};
use crate::tail::TailEngine;

/// Tails one file and fans its classified lines out to sinks.
///
/// Share it as `Arc<Watcher>`: one task awaits [`Watcher::start`] for the
/// lifetime of the watch while any other task or thread may call
/// [`Watcher::stop`], [`Watcher::pause`], [`Watcher::resume`] or change the
/// sink list. State, retry counter, sinks and stats are internally
/// synchronized. Stopping is cooperative: it takes effect between poll
/// cycles, and a read blocked in the OS is not interrupted.
///
/// A stop request stays pending until a watch loop observes it, so a
/// `stop` issued after `start` was spawned but before it began polling still
/// ends that run. Sinks only ever run on the polling task while a loop is
/// active: state changes requested from other threads are queued and
/// delivered at the next cycle boundary, after any entry already being
/// dispatched.
pub struct Watcher {
    path: PathBuf,
    source: String,
    config: WatcherConfig,
    filter: SeverityFilter,
    classifier: Arc<dyn LineClassifier>,
    sinks: RwLock<Vec<Arc<dyn Sink>>>,
    stats: Option<Arc<StatsCollector>>,
    engine: tokio::sync::Mutex<TailEngine>,
    state: Mutex<WatcherState>,
    stop_cause: Mutex<Option<StopCause>>,
    stop_requested: AtomicBool,
    pending: Mutex<Vec<LifecycleKind>>,
    wake: Notify,
    retry_count: AtomicU32,
    span: Span,
}

impl Watcher {
    /// Creates a stopped watcher. The file does not need to exist yet.
    pub fn new<P: AsRef<Path>>(path: P, config: WatcherConfig) -> Self {
        let path = path.as_ref().to_path_buf();
        let engine = TailEngine::new(&path, config.encoding(), config.follow_rotation());
        let stats = config.collect_stats().then(|| Arc::new(StatsCollector::new()));
        let sinks: Vec<Arc<dyn Sink>> = stats
            .iter()
            .map(|stats| Arc::clone(stats) as Arc<dyn Sink>)
            .collect();
        let span = info_span!("log_watcher", path = %path.display());

        debug!(parent: &span, "created watcher");

        Self {
            source: path.display().to_string(),
            filter: SeverityFilter::new(config.min_severity()),
            classifier: Arc::new(KeywordClassifier::new()),
            sinks: RwLock::new(sinks),
            stats,
            engine: tokio::sync::Mutex::new(engine),
            state: Mutex::new(WatcherState::Stopped),
            stop_cause: Mutex::new(None),
            stop_requested: AtomicBool::new(false),
            pending: Mutex::new(Vec::new()),
            wake: Notify::new(),
            retry_count: AtomicU32::new(0),
            span,
            path,
            config,
        }
    }

    /// Replaces the default keyword classifier.
    pub fn with_classifier<C: LineClassifier + 'static>(mut self, classifier: C) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Label stamped on every entry as its source. Defaults to the path.
    pub fn with_source_label(mut self, label: impl Into<String>) -> Self {
        self.source = label.into();
        self
    }

    /// Replaces the default minimum-severity filter built from the config.
    pub fn with_filter(mut self, filter: SeverityFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Span all watcher logging is recorded under.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn add_sink(&self, sink: Arc<dyn Sink>) {
        debug!(parent: &self.span, sink = sink.name(), "added sink");
        self.sinks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(sink);
    }

    /// Removes `sink` by pointer identity. Returns whether it was registered.
    pub fn remove_sink(&self, sink: &Arc<dyn Sink>) -> bool {
        let mut sinks = self.sinks.write().unwrap_or_else(|e| e.into_inner());
        let before = sinks.len();
        sinks.retain(|s| !Arc::ptr_eq(s, sink));
        let removed = sinks.len() != before;
        if removed {
            debug!(parent: &self.span, sink = sink.name(), "removed sink");
        }
        removed
    }

    /// Registers a channel sink and returns its receiving end.
    pub fn subscribe(&self) -> EventStream {
        let (sink, stream) = stream::channel();
        self.add_sink(Arc::new(sink));
        stream
    }

    /// Opens the file at its end and polls until [`Watcher::stop`] is called
    /// or reopen attempts run out.
    ///
    /// Returns `Ok(())` after a requested stop and
    /// [`Error::RetriesExhausted`] after a terminal read failure; in the
    /// latter case the watcher stays [`WatcherState::Errored`] and cannot be
    /// started again.
    pub async fn start(&self) -> Result<()> {
        let span = self.span.clone();
        self.run().instrument(span).await
    }

    async fn run(&self) -> Result<()> {
        let mut engine = self.engine.try_lock().map_err(|_| Error::InvalidState {
            message: "watch loop is already running".to_string(),
        })?;

        let result = self.run_locked(&mut engine).await;

        // The stop request, if any, belonged to this run.
        self.stop_requested.store(false, Ordering::SeqCst);
        drop(engine);
        self.flush_pending();
        result
    }

    async fn run_locked(&self, engine: &mut TailEngine) -> Result<()> {
        let state = self.state();
        if state != WatcherState::Stopped {
            return Err(Error::InvalidState {
                message: format!("cannot start from {}", state),
            });
        }
        if self.stop_cause() == Some(StopCause::RetriesExhausted) {
            return Err(Error::InvalidState {
                message: "watcher failed permanently, create a new one".to_string(),
            });
        }

        self.retry_count.store(0, Ordering::SeqCst);
        *lock(&self.stop_cause) = None;

        if let Err(e) = engine.open().await {
            error!(error = %e, "failed to open file");
            return Err(e);
        }
        if self.stop_requested.load(Ordering::SeqCst) {
            engine.close();
            *lock(&self.stop_cause) = Some(StopCause::Requested);
            return Ok(());
        }

        if let Some(stats) = &self.stats {
            stats.mark_started();
        }
        info!(
            min_severity = %self.filter.minimum(),
            poll_interval = ?self.config.poll_interval(),
            follow_rotation = self.config.follow_rotation(),
            cursor = engine.cursor(),
            "watching file"
        );
        self.transition(&[WatcherState::Stopped], WatcherState::Running);
        self.flush_pending();

        let result = self.watch_loop(engine).await;

        engine.close();
        if let Some(stats) = &self.stats {
            stats.finalize();
        }
        match &result {
            Ok(()) => {
                self.transition(
                    &[WatcherState::Running, WatcherState::Paused],
                    WatcherState::Stopped,
                );
                *lock(&self.stop_cause) = Some(StopCause::Requested);
                info!("watch stopped");
            }
            Err(e) => error!(error = %e, "watch ended with error"),
        }
        self.flush_pending();
        result
    }

    async fn watch_loop(&self, engine: &mut TailEngine) -> Result<()> {
        loop {
            self.flush_pending();
            if self.stop_requested.load(Ordering::SeqCst) {
                return Ok(());
            }

            match self.state() {
                WatcherState::Running => self.poll_cycle(engine).await?,
                WatcherState::Paused => trace!("paused, skipping poll"),
                WatcherState::Stopped => return Ok(()),
                WatcherState::Errored => {
                    return Err(Error::RetriesExhausted {
                        attempts: self.retry_count(),
                    });
                }
            }

            self.sleep(self.config.poll_interval()).await;
        }
    }

    /// Sleeps for `duration`, returning early when `stop` is called.
    async fn sleep(&self, duration: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.wake.notified() => {}
        }
    }

    async fn poll_cycle(&self, engine: &mut TailEngine) -> Result<()> {
        let mut events = Vec::new();
        let result = engine.poll_once(&mut events).await;

        for kind in events {
            self.emit(kind);
        }

        match result {
            Ok(line) => {
                self.retry_count.store(0, Ordering::SeqCst);
                if let Some(line) = line {
                    self.process_line(&line);
                }
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "read failed");
                self.emit(LifecycleKind::ReadError {
                    description: e.to_string(),
                });
                self.recover(engine).await
            }
        }
    }

    /// Reopens the file up to `max_retries` times, then gives up.
    async fn recover(&self, engine: &mut TailEngine) -> Result<()> {
        let max_retries = self.config.max_retries();
        if !self.config.restart_on_error() {
            warn!("restart on error disabled");
            return self.fail();
        }

        while self.retry_count() < max_retries {
            if self.stop_requested.load(Ordering::SeqCst) {
                return Ok(());
            }

            let attempt = self.retry_count.fetch_add(1, Ordering::SeqCst) + 1;
            warn!(
                attempt,
                max_retries,
                delay = ?self.config.retry_delay(),
                "reopening file after read failure"
            );
            self.sleep(self.config.retry_delay()).await;
            if self.stop_requested.load(Ordering::SeqCst) {
                return Ok(());
            }

            let previous = engine.identity();
            match engine.open().await {
                Ok(()) => {
                    info!(attempt, "reopened file");
                    self.retry_count.store(0, Ordering::SeqCst);
                    if let (Some(old), Some(new)) = (previous, engine.identity()) {
                        if old != new && self.config.follow_rotation() {
                            self.emit(LifecycleKind::Rotated {
                                old_identity: old,
                                new_identity: new,
                            });
                        }
                    }
                    return Ok(());
                }
                Err(e) => {
                    error!(attempt, max_retries, error = %e, "reopen failed");
                    self.emit(LifecycleKind::ReadError {
                        description: format!(
                            "reopen attempt {}/{} failed: {}",
                            attempt, max_retries, e
                        ),
                    });
                }
            }
        }

        self.fail()
    }

    fn fail(&self) -> Result<()> {
        let attempts = self.retry_count();
        error!(attempts, "giving up on file");

        *lock(&self.stop_cause) = Some(StopCause::RetriesExhausted);
        self.transition(
            &[WatcherState::Running, WatcherState::Paused],
            WatcherState::Errored,
        );
        self.flush_pending();
        self.stop_requested.store(true, Ordering::SeqCst);

        Err(Error::RetriesExhausted { attempts })
    }

    fn process_line(&self, line: &str) {
        let classified = panic::catch_unwind(AssertUnwindSafe(|| self.classifier.classify(line)));
        let classification = match classified {
            Ok(Ok(classification)) => classification,
            Ok(Err(e)) => {
                warn!(error = %e, line, "dropping line that failed classification");
                self.record_dropped_line();
                return;
            }
            Err(_) => {
                error!(line, "classifier panicked, dropping line");
                self.record_dropped_line();
                return;
            }
        };

        if !self.filter.admits(classification.severity) {
            trace!(severity = %classification.severity, "below minimum severity");
            return;
        }

        let entry = ClassifiedEntry::new(
            line,
            classification.severity,
            classification.message,
            self.source.as_str(),
        );
        self.dispatch(&WatchEvent::Entry(entry));
    }

    fn emit(&self, kind: LifecycleKind) {
        self.dispatch(&WatchEvent::from(kind));
    }

    /// Delivers `event` to every sink in registration order.
    fn dispatch(&self, event: &WatchEvent) {
        let sinks: Vec<Arc<dyn Sink>> = self
            .sinks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let mut closed = Vec::new();

        for sink in &sinks {
            match panic::catch_unwind(AssertUnwindSafe(|| sink.handle(event))) {
                Ok(Ok(())) => {}
                Ok(Err(Error::StreamClosed)) => closed.push(Arc::clone(sink)),
                Ok(Err(e)) => {
                    warn!(
                        sink = sink.name(),
                        event_type = event.event_type(),
                        error = %e,
                        "sink failed"
                    );
                    self.record_sink_failure();
                }
                Err(_) => {
                    error!(
                        sink = sink.name(),
                        event_type = event.event_type(),
                        "sink panicked"
                    );
                    self.record_sink_failure();
                }
            }
        }

        for sink in &closed {
            self.remove_sink(sink);
        }
    }

    fn record_dropped_line(&self) {
        if let Some(stats) = &self.stats {
            stats.record_dropped_line();
        }
    }

    fn record_sink_failure(&self) {
        if let Some(stats) = &self.stats {
            stats.record_sink_failure();
        }
    }

    /// Queues a lifecycle notice raised outside the poll cycle.
    ///
    /// With no loop holding the engine, nothing else would deliver it, so it
    /// goes out right away on the caller's thread.
    fn announce(&self, kind: LifecycleKind) {
        lock(&self.pending).push(kind);
        let idle = self.engine.try_lock().is_ok();
        if idle {
            self.flush_pending();
        }
    }

    fn flush_pending(&self) {
        let pending = std::mem::take(&mut *lock(&self.pending));
        for kind in pending {
            self.emit(kind);
        }
    }

    /// Moves to `to` if the current state is one of `from`, announcing
    /// `StateChanged`. Returns the previous state on success.
    fn transition(&self, from: &[WatcherState], to: WatcherState) -> Option<WatcherState> {
        let old = {
            let mut state = lock(&self.state);
            let old = *state;
            if !from.contains(&old) {
                return None;
            }
            *state = to;
            old
        };

        if old != to {
            self.announce(LifecycleKind::StateChanged {
                old_state: old,
                new_state: to,
            });
        }
        Some(old)
    }

    /// Suspends polling, keeping the handle and cursor. Only valid while
    /// running; otherwise logs a warning and does nothing.
    pub fn pause(&self) {
        let _enter = self.span.enter();
        match self.transition(&[WatcherState::Running], WatcherState::Paused) {
            Some(_) => info!("watch paused"),
            None => warn!(state = %self.state(), "cannot pause"),
        }
    }

    /// Resumes polling after [`Watcher::pause`].
    pub fn resume(&self) {
        let _enter = self.span.enter();
        match self.transition(&[WatcherState::Paused], WatcherState::Running) {
            Some(_) => info!("watch resumed"),
            None => warn!(state = %self.state(), "cannot resume"),
        }
    }

    /// Requests the watch loop to end. Safe from any state and any thread;
    /// calling it again has no further effect.
    ///
    /// The request is consumed by the next watch loop to observe it. Calling
    /// `stop` on a watcher that is not running therefore also ends the next
    /// `start` right after it opens the file.
    pub fn stop(&self) {
        let _enter = self.span.enter();
        self.stop_requested.store(true, Ordering::SeqCst);
        self.wake.notify_one();

        let previous = self.transition(
            &[
                WatcherState::Running,
                WatcherState::Paused,
                WatcherState::Errored,
            ],
            WatcherState::Stopped,
        );
        if let Some(previous) = previous {
            info!(%previous, "stop requested");
        }

        // While the loop runs it holds the engine and closes it on exit.
        if let Ok(mut engine) = self.engine.try_lock() {
            engine.close();
        }
        if let Some(stats) = &self.stats {
            stats.finalize();
        }
    }

    pub fn state(&self) -> WatcherState {
        *lock(&self.state)
    }

    pub fn is_running(&self) -> bool {
        self.state() == WatcherState::Running
    }

    /// Why the last watch ended, once it has.
    pub fn stop_cause(&self) -> Option<StopCause> {
        *lock(&self.stop_cause)
    }

    /// Consecutive failed reopen attempts so far.
    pub fn retry_count(&self) -> u32 {
        self.retry_count.load(Ordering::SeqCst)
    }

    /// Snapshot of the built-in stats sink, when stats are enabled.
    pub fn stats(&self) -> Option<StatsSnapshot> {
        self.stats.as_ref().map(|stats| stats.snapshot())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }
}
