//! The per-host instance monitor.
//!
//! An [`InstanceMonitor`] owns one streaming connection to one host. Its
//! worker reads the feed line by line, turns accepted lines into events and
//! pushes them to the [`Dispatcher`], reconnecting through transient failures
//! until it is stopped, the host turns out to be unusable, or nobody is
//! listening any more.
//!
//! State only ever moves forward:
//!
//! ```text
//! NotStarted -> Running -> StopRequested -> CleanedUp
//! ```
//!
//! Status queries read two atomics and never wait on the worker.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use streamwatch_types::{HostTarget, MonitorState};
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

use crate::parser::{parse_line, LineOutcome};
use crate::{
    ConnectionManager, Dispatcher, GateVerdict, LatencyGate, MonitorError, MonitorPool,
    MonitorRegistry, MonitorSettings, Transport,
};

/// Streams metric events from a single host.
///
/// Shared as `Arc<InstanceMonitor>`; [`start`](Self::start) hands a clone to
/// the worker it spawns.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use streamwatch_monitor::{
///     Dispatcher, HttpTransport, InstanceMonitor, MonitorPool, MonitorRegistry,
///     MonitorSettings,
/// };
/// use streamwatch_types::{HostTarget, MetricEvent};
///
/// struct Print;
/// impl Dispatcher for Print {
///     fn push(&self, _host: &HostTarget, events: Vec<MetricEvent>) -> bool {
///         println!("{:?}", events);
///         true
///     }
///     fn notify_host_lost(&self, _host: &HostTarget) {}
/// }
/// struct NoRegistry;
/// impl MonitorRegistry for NoRegistry {
///     fn deregister(&self, _name: &str) {}
/// }
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let host = HostTarget::builder()
///         .hostname("api-1")
///         .url("http://api-1:8080/tenacity/metrics.stream")
///         .build();
///
///     let monitor = Arc::new(InstanceMonitor::new(
///         host,
///         Arc::new(HttpTransport::builder().build()?),
///         Arc::new(Print),
///         Arc::new(NoRegistry),
///         Arc::new(MonitorSettings::default()),
///         Arc::new(MonitorPool::current()),
///     ));
///     monitor.start();
///     monitor.wait_stopped().await;
///     Ok(())
/// }
/// ```
pub struct InstanceMonitor {
    target: HostTarget,
    transport: Arc<dyn Transport>,
    dispatcher: Arc<dyn Dispatcher>,
    registry: Arc<dyn MonitorRegistry>,
    settings: Arc<MonitorSettings>,
    pool: Arc<MonitorPool>,

    state: AtomicU8,
    started: AtomicBool,
    cleaned: AtomicBool,
    last_event_ms: AtomicI64,
    forwarded: AtomicU64,
    discarded: AtomicU64,
    stop_tx: watch::Sender<bool>,
    stopped: Notify,
}

impl InstanceMonitor {
    pub fn new(
        target: HostTarget,
        transport: Arc<dyn Transport>,
        dispatcher: Arc<dyn Dispatcher>,
        registry: Arc<dyn MonitorRegistry>,
        settings: Arc<MonitorSettings>,
        pool: Arc<MonitorPool>,
    ) -> Self {
        info!(host = target.hostname(), cluster = target.cluster(), url = target.url(), "Created host monitor");
        let (stop_tx, _) = watch::channel(false);
        Self {
            target,
            transport,
            dispatcher,
            registry,
            settings,
            pool,
            state: AtomicU8::new(MonitorState::NotStarted.as_u8()),
            started: AtomicBool::new(false),
            cleaned: AtomicBool::new(false),
            last_event_ms: AtomicI64::new(-1),
            forwarded: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
            stop_tx,
            stopped: Notify::new(),
        }
    }

    /// The monitor's name; this is the host's hostname.
    pub fn name(&self) -> &str {
        self.target.hostname()
    }

    pub fn target(&self) -> &HostTarget {
        &self.target
    }

    pub fn state(&self) -> MonitorState {
        MonitorState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.state() == MonitorState::Running
    }

    /// True once the monitor has cleaned up: the connection is released, the
    /// host reported lost and the monitor deregistered.
    pub fn has_stopped(&self) -> bool {
        self.state() == MonitorState::CleanedUp
    }

    /// True once a stop has been requested, whether or not cleanup has run.
    pub fn stop_requested(&self) -> bool {
        self.state() >= MonitorState::StopRequested
    }

    /// Epoch millis of the last event read from the host, `-1` before the first.
    pub fn last_event_update_ms(&self) -> i64 {
        self.last_event_ms.load(Ordering::SeqCst)
    }

    /// Events dropped by the latency gate.
    pub fn discarded_events(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }

    /// Events handed to the dispatcher.
    pub fn forwarded_events(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    /// Start streaming on the monitor's pool.
    ///
    /// Only the first call on a monitor that has not been stopped does
    /// anything. Returns immediately; failures show up through
    /// [`state`](Self::state) and the logs.
    pub fn start(self: &Arc<Self>) {
        if self.state() != MonitorState::NotStarted {
            return;
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let worker = Worker {
            connection: ConnectionManager::new(&self.target, self.transport.clone()),
            gate: LatencyGate::new(),
            stop_rx: self.stop_tx.subscribe(),
            monitor: self.clone(),
        };

        if let Err(e) = self.pool.spawn(worker.run()) {
            // The rejected future dropped the worker, which ran cleanup.
            warn!(host = self.name(), error = %e, "Could not start host monitor");
        }
    }

    /// Ask the monitor to stop.
    ///
    /// Interrupts a blocked read or a reconnect backoff. Safe to call at any
    /// time and any number of times.
    pub fn stop(&self) {
        let previous = self.advance(MonitorState::StopRequested);
        if previous < MonitorState::StopRequested {
            info!(host = self.name(), "Host monitor stop requested");
        }
        self.stop_tx.send_replace(true);
    }

    /// Wait until the monitor has cleaned up.
    ///
    /// Also returns for a monitor that was stopped before it ever started.
    pub async fn wait_stopped(&self) {
        loop {
            let notified = self.stopped.notified();
            if self.is_finished() {
                return;
            }
            notified.await;
        }
    }

    fn is_finished(&self) -> bool {
        match self.state() {
            MonitorState::CleanedUp => true,
            MonitorState::StopRequested => !self.started.load(Ordering::SeqCst),
            _ => false,
        }
    }

    /// Move the state forward to `to`. Never moves it back.
    ///
    /// Returns the state before the call.
    fn advance(&self, to: MonitorState) -> MonitorState {
        MonitorState::from_u8(self.state.fetch_max(to.as_u8(), Ordering::SeqCst))
    }

    /// Enter `Running`, unless a stop got there first.
    fn enter_running(&self) -> bool {
        self.state
            .compare_exchange(
                MonitorState::NotStarted.as_u8(),
                MonitorState::Running.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Report the host as gone and mark the monitor cleaned up, exactly once.
    fn finish(&self) {
        self.advance(MonitorState::StopRequested);
        if self.cleaned.swap(true, Ordering::SeqCst) {
            return;
        }
        self.dispatcher.notify_host_lost(&self.target);
        self.registry.deregister(self.name());
        self.advance(MonitorState::CleanedUp);
        self.stopped.notify_waiters();
        info!(host = self.name(), cluster = self.target.cluster(), "Host monitor cleaned up");
    }
}

impl std::fmt::Debug for InstanceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceMonitor")
            .field("host", &self.target.hostname())
            .field("state", &self.state())
            .field("last_event_ms", &self.last_event_update_ms())
            .finish()
    }
}

/// The task side of a monitor. Dropping it runs cleanup, so every exit path
/// (return, panic, abort) releases the connection and reports the host lost.
struct Worker {
    monitor: Arc<InstanceMonitor>,
    connection: ConnectionManager,
    gate: LatencyGate,
    stop_rx: watch::Receiver<bool>,
}

impl Worker {
    async fn run(mut self) {
        if !self.monitor.enter_running() {
            debug!(host = self.monitor.name(), "Monitor stopped before it began streaming");
            return;
        }

        if let Err(e) = self.reconnect().await {
            self.log_exit(&e);
            return;
        }

        while self.monitor.is_running() {
            let line = tokio::select! {
                biased;
                _ = stop_signal(&mut self.stop_rx) => break,
                line = self.connection.next_line() => line,
            };

            let result = match line {
                Ok(Some(line)) => {
                    self.handle_line(&line);
                    Ok(())
                }
                Ok(None) => {
                    info!(host = self.monitor.name(), "No more data from connection, reconnecting");
                    self.reconnect().await
                }
                Err(e) => {
                    info!(host = self.monitor.name(), error = %e, "Read failed, reconnecting");
                    self.reconnect().await
                }
            };

            if let Err(e) = result {
                self.log_exit(&e);
                break;
            }
        }
    }

    /// Parse one raw line and forward it if it survives the gate.
    fn handle_line(&mut self, line: &str) {
        let monitor = &*self.monitor;
        let settings = &*monitor.settings;
        let host = monitor.name();
        let verbose = settings.debug_enabled_for(host);
        let now = now_ms();

        if self.gate.should_skip_line(now, settings) {
            return;
        }

        let mut event = match parse_line(line, host, now) {
            LineOutcome::Event(event) => event,
            LineOutcome::Skipped => return,
            LineOutcome::Malformed(reason) => {
                if verbose {
                    info!(host, reason = %reason, line, "Dropping malformed line");
                } else {
                    debug!(host, reason = %reason, "Dropping malformed line");
                }
                return;
            }
        };

        if let GateVerdict::Discard { latency_ms } = self.gate.evaluate(&mut event, now, settings) {
            monitor.discarded.fetch_add(1, Ordering::Relaxed);
            if verbose {
                info!(host, latency_ms, skip_until = self.gate.skip_until_ms(), "Discarding latent event to catch up");
            } else {
                debug!(host, latency_ms, skip_until = self.gate.skip_until_ms(), "Discarding latent event to catch up");
            }
            return;
        }

        monitor.last_event_ms.store(now, Ordering::SeqCst);
        monitor.forwarded.fetch_add(1, Ordering::Relaxed);
        if !monitor.dispatcher.push(&monitor.target, vec![event]) {
            info!(host, cluster = monitor.target.cluster(), "No more listeners for host, stopping monitor");
            monitor.advance(MonitorState::StopRequested);
        }
    }

    /// Re-establish the connection, retrying transient failures with the
    /// configured backoff for as long as the monitor is running.
    async fn reconnect(&mut self) -> Result<(), MonitorError> {
        let monitor = self.monitor.clone();
        let host = monitor.name();
        let cluster = monitor.target.cluster();

        while monitor.is_running() {
            self.connection.release();
            info!(host, cluster, "Initialising host connection");

            let opened = tokio::select! {
                biased;
                _ = stop_signal(&mut self.stop_rx) => {
                    info!(host, "Monitor interrupted while connecting");
                    monitor.advance(MonitorState::StopRequested);
                    break;
                }
                opened = self.connection.open() => opened,
            };
            let err = match opened {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            if err.is_fatal() {
                warn!(host, cluster, error = %err, "Host connection failed, will not retry");
                monitor.advance(MonitorState::StopRequested);
                return Err(err.into());
            }

            let backoff = monitor.settings.reconnect_backoff();
            warn!(host, cluster, error = %err, ?backoff, "Host connection failed, will retry");

            tokio::select! {
                biased;
                _ = stop_signal(&mut self.stop_rx) => {
                    warn!(host, "Monitor interrupted during reconnect backoff");
                    monitor.advance(MonitorState::StopRequested);
                }
                _ = tokio::time::sleep(backoff) => {}
            }
        }

        Err(MonitorError::GaveUp)
    }

    fn log_exit(&self, err: &MonitorError) {
        let target = &self.monitor.target;
        warn!(host = target.hostname(), cluster = target.cluster(), error = %err, "Stopping host monitor");
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.monitor.advance(MonitorState::StopRequested);
        self.connection.release();
        self.monitor.finish();
    }
}

/// Resolves once a stop has been signalled.
async fn stop_signal(rx: &mut watch::Receiver<bool>) {
    loop {
        let stop = *rx.borrow_and_update();
        if stop {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConnectError, LineSource, ReaderLineSource};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::io::{self, Cursor};
    use std::time::Duration;
    use streamwatch_types::MetricEvent;

    /// One scripted connection attempt.
    enum Attempt {
        Fail(ConnectError),
        Serve(&'static str),
        /// Serve the lines, then fail the next read with a reset.
        ServeThenReset(&'static str),
        /// Never finish connecting.
        Hang,
    }

    /// Plays back scripted attempts, then serves a connection that stays
    /// open without ever producing a line.
    struct ScriptedTransport {
        script: Mutex<VecDeque<Attempt>>,
        attempts: Mutex<Vec<tokio::time::Instant>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Attempt>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                attempts: Mutex::default(),
            })
        }

        fn attempts(&self) -> usize {
            self.attempts.lock().len()
        }
    }

    struct Idle;

    struct ResetAfter(VecDeque<String>);

    #[async_trait]
    impl LineSource for ResetAfter {
        async fn next_line(&mut self) -> io::Result<Option<String>> {
            match self.0.pop_front() {
                Some(line) => Ok(Some(line)),
                None => Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset by peer")),
            }
        }
    }

    #[async_trait]
    impl LineSource for Idle {
        async fn next_line(&mut self) -> io::Result<Option<String>> {
            std::future::pending().await
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn connect(
            &self,
            _url: &str,
            _route: Option<&str>,
        ) -> Result<Box<dyn LineSource>, ConnectError> {
            self.attempts.lock().push(tokio::time::Instant::now());
            let next = self.script.lock().pop_front();
            match next {
                Some(Attempt::Fail(e)) => Err(e),
                Some(Attempt::Serve(body)) => Ok(Box::new(ReaderLineSource::new(Cursor::new(body)))),
                Some(Attempt::ServeThenReset(body)) => {
                    Ok(Box::new(ResetAfter(body.lines().map(str::to_string).collect())))
                }
                Some(Attempt::Hang) => std::future::pending().await,
                None => Ok(Box::new(Idle)),
            }
        }
    }

    struct RecordingDispatcher {
        events: Mutex<Vec<MetricEvent>>,
        lost: AtomicU64,
        keep_going: AtomicBool,
    }

    impl RecordingDispatcher {
        fn new(keep_going: bool) -> Arc<Self> {
            Arc::new(Self {
                events: Mutex::default(),
                lost: AtomicU64::new(0),
                keep_going: AtomicBool::new(keep_going),
            })
        }
    }

    impl Dispatcher for RecordingDispatcher {
        fn push(&self, _host: &HostTarget, events: Vec<MetricEvent>) -> bool {
            self.events.lock().extend(events);
            self.keep_going.load(Ordering::SeqCst)
        }

        fn notify_host_lost(&self, _host: &HostTarget) {
            self.lost.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct RecordingRegistry {
        removed: Mutex<Vec<String>>,
    }

    impl MonitorRegistry for RecordingRegistry {
        fn deregister(&self, monitor_name: &str) {
            self.removed.lock().push(monitor_name.to_string());
        }
    }

    struct Harness {
        monitor: Arc<InstanceMonitor>,
        transport: Arc<ScriptedTransport>,
        dispatcher: Arc<RecordingDispatcher>,
        registry: Arc<RecordingRegistry>,
    }

    fn harness(script: Vec<Attempt>, keep_going: bool) -> Harness {
        let transport = ScriptedTransport::new(script);
        let dispatcher = RecordingDispatcher::new(keep_going);
        let registry = Arc::new(RecordingRegistry::default());
        let target = HostTarget::builder()
            .hostname("h1")
            .cluster("c1")
            .url("http://h1:8080/tenacity/metrics.stream")
            .build();
        let monitor = Arc::new(InstanceMonitor::new(
            target,
            transport.clone(),
            dispatcher.clone(),
            registry.clone(),
            Arc::new(MonitorSettings::default()),
            Arc::new(MonitorPool::current()),
        ));
        Harness {
            monitor,
            transport,
            dispatcher,
            registry,
        }
    }

    async fn eventually(what: &str, check: impl Fn() -> bool) {
        let waited = tokio::time::timeout(Duration::from_secs(30), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(waited.is_ok(), "timed out waiting for {}", what);
    }

    async fn stopped(monitor: &InstanceMonitor) {
        tokio::time::timeout(Duration::from_secs(30), monitor.wait_stopped())
            .await
            .expect("monitor did not stop");
    }

    #[tokio::test]
    async fn forwards_parsed_event() {
        let h = harness(
            vec![Attempt::Serve("data: {\"type\":\"t\",\"name\":\"n\",\"count\":5}\n")],
            true,
        );
        h.monitor.start();
        eventually("an event", || !h.dispatcher.events.lock().is_empty()).await;

        let events = h.dispatcher.events.lock().clone();
        assert_eq!(events[0].event_type, "t");
        assert_eq!(events[0].name, "n");
        assert_eq!(events[0].numeric("count"), Some(5));
        assert_eq!(events[0].reporting_hosts(), 1);
        assert_eq!(events[0].host, "h1");
        assert!(h.monitor.last_event_update_ms() > 0);
        assert_eq!(h.monitor.forwarded_events(), 1);

        h.monitor.stop();
        stopped(&h.monitor).await;
    }

    #[tokio::test]
    async fn lines_without_type_are_not_forwarded() {
        let h = harness(
            vec![Attempt::Serve(
                "data: {\"name\":\"n\",\"count\":5}\n: ping\ndata: {\"type\":\"t\",\"name\":\"ok\"}\n",
            )],
            true,
        );
        h.monitor.start();
        eventually("an event", || !h.dispatcher.events.lock().is_empty()).await;

        let events = h.dispatcher.events.lock().clone();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "ok");

        h.monitor.stop();
        stopped(&h.monitor).await;
    }

    #[tokio::test]
    async fn misconfigured_host_stops_without_retry() {
        let h = harness(
            vec![Attempt::Fail(ConnectError::MisconfiguredHost {
                status: 404,
                body: "not found".into(),
            })],
            true,
        );
        h.monitor.start();
        stopped(&h.monitor).await;

        assert_eq!(h.transport.attempts(), 1);
        assert_eq!(h.monitor.state(), MonitorState::CleanedUp);
        assert_eq!(h.dispatcher.lost.load(Ordering::SeqCst), 1);
        assert_eq!(*h.registry.removed.lock(), vec!["h1".to_string()]);
    }

    #[tokio::test]
    async fn unresolvable_host_stops_without_retry() {
        let h = harness(vec![Attempt::Fail(ConnectError::Unresolvable("h1".into()))], true);
        h.monitor.start();
        stopped(&h.monitor).await;
        assert_eq!(h.transport.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_after_backoff() {
        let h = harness(
            vec![
                Attempt::Fail(ConnectError::Io("connection refused".into())),
                Attempt::Fail(ConnectError::Io("connection reset".into())),
                Attempt::Serve("data: {\"type\":\"t\",\"name\":\"n\"}\n"),
            ],
            true,
        );
        h.monitor.start();
        eventually("an event", || !h.dispatcher.events.lock().is_empty()).await;

        let attempts = h.transport.attempts.lock().clone();
        assert!(attempts.len() >= 3);
        assert!(attempts[1] - attempts[0] >= Duration::from_millis(1000));
        assert!(attempts[2] - attempts[1] >= Duration::from_millis(1000));
        assert!(h.monitor.is_running());

        h.monitor.stop();
        stopped(&h.monitor).await;
    }

    #[tokio::test(start_paused = true)]
    async fn end_of_stream_reconnects() {
        let h = harness(
            vec![
                Attempt::Serve("data: {\"type\":\"t\",\"name\":\"first\"}\n"),
                Attempt::Serve("data: {\"type\":\"t\",\"name\":\"second\"}\n"),
            ],
            true,
        );
        h.monitor.start();
        eventually("two events", || h.dispatcher.events.lock().len() == 2).await;
        eventually("third connection", || h.transport.attempts() == 3).await;
        assert_eq!(h.dispatcher.events.lock()[1].name, "second");

        h.monitor.stop();
        stopped(&h.monitor).await;
    }

    #[tokio::test(start_paused = true)]
    async fn read_error_reconnects() {
        let h = harness(
            vec![
                Attempt::ServeThenReset("data: {\"type\":\"t\",\"name\":\"first\"}\n"),
                Attempt::Fail(ConnectError::Io("connection refused".into())),
                Attempt::Serve("data: {\"type\":\"t\",\"name\":\"second\"}\n"),
            ],
            true,
        );
        h.monitor.start();
        eventually("two events", || h.dispatcher.events.lock().len() == 2).await;

        let attempts = h.transport.attempts.lock().clone();
        assert!(attempts.len() >= 3);
        assert!(attempts[2] - attempts[1] >= Duration::from_millis(1000));
        assert_eq!(h.dispatcher.events.lock()[0].name, "first");
        assert_eq!(h.dispatcher.events.lock()[1].name, "second");
        assert!(h.monitor.is_running());
        assert_eq!(h.dispatcher.lost.load(Ordering::SeqCst), 0);

        h.monitor.stop();
        stopped(&h.monitor).await;
    }

    #[tokio::test]
    async fn stop_interrupts_hung_connect() {
        let h = harness(vec![Attempt::Hang], true);
        h.monitor.start();
        eventually("first attempt", || h.transport.attempts() == 1).await;
        assert!(h.monitor.is_running());
        assert!(!h.monitor.has_stopped());

        h.monitor.stop();
        stopped(&h.monitor).await;
        assert!(h.monitor.has_stopped());
        assert_eq!(h.transport.attempts(), 1);
        assert_eq!(h.dispatcher.lost.load(Ordering::SeqCst), 1);
        assert_eq!(*h.registry.removed.lock(), vec!["h1".to_string()]);
    }

    #[tokio::test]
    async fn no_listeners_stops_and_cleans_up_once() {
        let h = harness(
            vec![Attempt::Serve(
                "data: {\"type\":\"t\",\"name\":\"a\"}\ndata: {\"type\":\"t\",\"name\":\"b\"}\n",
            )],
            false,
        );
        h.monitor.start();
        stopped(&h.monitor).await;

        assert_eq!(h.dispatcher.events.lock().len(), 1);
        h.monitor.stop();
        h.monitor.stop();
        assert_eq!(h.dispatcher.lost.load(Ordering::SeqCst), 1);
        assert_eq!(h.registry.removed.lock().len(), 1);
        assert_eq!(h.monitor.state(), MonitorState::CleanedUp);
    }

    #[tokio::test]
    async fn stop_interrupts_blocked_read() {
        let h = harness(vec![], true);
        h.monitor.start();
        eventually("running", || h.monitor.is_running() && h.transport.attempts() == 1).await;

        h.monitor.stop();
        assert!(h.monitor.stop_requested());
        stopped(&h.monitor).await;
        assert!(h.monitor.has_stopped());
        assert_eq!(h.dispatcher.lost.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_interrupts_backoff() {
        let h = harness(
            vec![Attempt::Fail(ConnectError::Io("connection refused".into()))],
            true,
        );
        h.monitor.settings.set_reconnect_backoff_ms(60_000);
        h.monitor.start();
        eventually("first attempt", || h.transport.attempts() == 1).await;

        h.monitor.stop();
        stopped(&h.monitor).await;
        assert_eq!(h.transport.attempts(), 1);
    }

    #[tokio::test]
    async fn start_is_a_no_op_after_stop() {
        let h = harness(vec![], true);
        h.monitor.stop();
        h.monitor.start();

        stopped(&h.monitor).await;
        assert_eq!(h.monitor.state(), MonitorState::StopRequested);
        assert_eq!(h.transport.attempts(), 0);
        assert_eq!(h.dispatcher.lost.load(Ordering::SeqCst), 0);
        assert!(h.registry.removed.lock().is_empty());
    }

    #[tokio::test]
    async fn double_start_spawns_one_worker() {
        let h = harness(vec![], true);
        h.monitor.start();
        h.monitor.start();
        eventually("running", || h.monitor.is_running() && h.transport.attempts() == 1).await;
        h.monitor.start();
        tokio::task::yield_now().await;
        assert_eq!(h.transport.attempts(), 1);

        h.monitor.stop();
        stopped(&h.monitor).await;
    }

    #[tokio::test]
    async fn state_never_moves_backwards() {
        let h = harness(vec![], true);
        assert_eq!(h.monitor.state(), MonitorState::NotStarted);
        assert_eq!(h.monitor.last_event_update_ms(), -1);

        h.monitor.start();
        eventually("running", || h.monitor.is_running()).await;
        h.monitor.stop();
        stopped(&h.monitor).await;

        assert_eq!(h.monitor.advance(MonitorState::Running), MonitorState::CleanedUp);
        assert!(!h.monitor.enter_running());
        assert_eq!(h.monitor.state(), MonitorState::CleanedUp);
    }

    #[tokio::test]
    async fn latent_event_opens_skip_window() {
        // The second line arrives inside the cooldown window and is never parsed.
        let h = harness(
            vec![Attempt::Serve(
                "data: {\"type\":\"t\",\"name\":\"old\",\"currentTime\":1}\ndata: {\"type\":\"t\",\"name\":\"fresh\"}\n",
            )],
            true,
        );
        h.monitor.settings.set_skip_delay_ms(60_000);
        h.monitor.start();
        eventually("a discard", || h.monitor.discarded_events() == 1).await;
        eventually("reconnect", || h.transport.attempts() == 2).await;

        assert!(h.dispatcher.events.lock().is_empty());
        assert_eq!(h.monitor.last_event_update_ms(), -1);

        h.monitor.stop();
        stopped(&h.monitor).await;
    }

    #[tokio::test]
    async fn disabled_skip_logic_forwards_latent_events() {
        let h = harness(
            vec![Attempt::Serve(
                "data: {\"type\":\"t\",\"name\":\"old\",\"currentTime\":1}\ndata: {\"type\":\"t\",\"name\":\"fresh\"}\n",
            )],
            true,
        );
        h.monitor.settings.set_skip_logic_enabled(false);
        h.monitor.start();
        eventually("two events", || h.dispatcher.events.lock().len() == 2).await;
        assert_eq!(h.monitor.discarded_events(), 0);

        h.monitor.stop();
        stopped(&h.monitor).await;
    }

    #[tokio::test]
    async fn closed_pool_cleans_up_immediately() {
        let h = harness(vec![], true);
        h.monitor.pool.close();
        h.monitor.start();

        stopped(&h.monitor).await;
        assert_eq!(h.monitor.state(), MonitorState::CleanedUp);
        assert_eq!(h.dispatcher.lost.load(Ordering::SeqCst), 1);
        assert_eq!(h.transport.attempts(), 0);
    }
}
