//! # Recording Session (lifecycle controller)
//!
//! Drives one recording from start to the saved snapshot.
//!
//! ```text
//!  NotStarted ──run()──▶ Recording ──first stop request──▶ Stopped ──▶ save (once)
//! ```
//!
//! Stop requests come from the signal listener (SIGINT/SIGTERM), from the
//! optional countdown timer, or from any other holder of a [`StopHandle`].
//! The first request wins and fixes the [`StopReason`]; later ones are
//! no-ops.
//!
//! The control loop is the only reader and writer of the [`Aggregator`]. It
//! waits on the stop signal, the error channel and both event channels at
//! once, with the stop branch checked first. Allocations are polled before
//! deallocations: a `free` can only follow the `malloc` that produced its
//! address, so when both are queued the allocation must be applied first.
//! Stopping does not drain the
//! channels: events still queued at that instant are discarded and counted
//! in [`SessionStats::discarded_at_stop`].

use log::{error, info, warn};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::aggregator::Aggregator;
use super::display::{display_countdown, display_session_summary};
use crate::domain::{Pid, ProbeError, RecordError};
use crate::probe::{event_channels, EventReceivers, ProbeLauncher, ProbeProcesses, ProbeScripts};
use crate::snapshot;

/// Burst capacity of each session channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// Settings for one recording session
#[derive(Debug, Clone)]
pub struct RecordConfig {
    pub pid: Pid,
    /// Snapshot destination; a timestamped name in the working directory if `None`
    pub output: Option<PathBuf>,
    /// Stop automatically after this many seconds; `<= 0` records until stopped
    pub duration_secs: i64,
    pub channel_capacity: usize,
}

impl RecordConfig {
    #[must_use]
    pub fn new(pid: Pid) -> Self {
        Self { pid, output: None, duration_secs: -1, channel_capacity: DEFAULT_CHANNEL_CAPACITY }
    }

    /// Countdown length, if the timer is enabled
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        u64::try_from(self.duration_secs)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// Why the session stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// SIGINT or SIGTERM
    Interrupted,
    /// Countdown reached zero
    DurationElapsed,
    /// Programmatic request
    Requested,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Interrupted => write!(f, "interrupted"),
            StopReason::DurationElapsed => write!(f, "duration limit reached"),
            StopReason::Requested => write!(f, "stop requested"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotStarted,
    Recording,
    Stopped,
}

/// Cloneable, idempotent stop trigger
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<Option<StopReason>>>,
}

impl StopHandle {
    /// Request the session to stop.
    ///
    /// Returns `true` if this call was the one that stopped it.
    pub fn request_stop(&self, reason: StopReason) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        })
    }

    /// Reason of the winning stop request, if any
    #[must_use]
    pub fn reason(&self) -> Option<StopReason> {
        *self.tx.borrow()
    }
}

/// Counters reported when the session ends
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    pub parse_errors: u64,
    pub diagnostics: u64,
    pub launch_errors: u64,
    pub stream_errors: u64,
    /// Events still queued when the stop request was observed
    pub discarded_at_stop: usize,
    pub elapsed: Duration,
    pub stop_reason: Option<StopReason>,
}

/// Owns the aggregate for one session and runs its control loop
#[derive(Debug)]
pub struct Recorder {
    config: RecordConfig,
    state: SessionState,
    aggregator: Aggregator,
    stats: SessionStats,
    stop_tx: Arc<watch::Sender<Option<StopReason>>>,
    stop_rx: watch::Receiver<Option<StopReason>>,
}

impl Recorder {
    #[must_use]
    pub fn new(config: RecordConfig) -> Self {
        let (stop_tx, stop_rx) = watch::channel(None);
        Self {
            config,
            state: SessionState::NotStarted,
            aggregator: Aggregator::new(),
            stats: SessionStats::default(),
            stop_tx: Arc::new(stop_tx),
            stop_rx,
        }
    }

    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle { tx: Arc::clone(&self.stop_tx) }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// In-memory aggregate; still available when saving failed
    #[must_use]
    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    #[must_use]
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Record until stopped, then save the snapshot exactly once.
    ///
    /// Returns the path the snapshot was written to.
    ///
    /// # Errors
    /// - [`RecordError::AlreadyStarted`] if this recorder already ran
    /// - [`RecordError::NoData`] if nothing at all was recorded
    /// - [`RecordError::Snapshot`] if writing the snapshot failed
    pub async fn run(&mut self, receivers: EventReceivers) -> Result<PathBuf, RecordError> {
        if self.state != SessionState::NotStarted {
            return Err(RecordError::AlreadyStarted);
        }
        self.state = SessionState::Recording;
        let started = Instant::now();

        let timer = self.config.duration().map(|limit| {
            info!("Recording stops automatically after {}s", limit.as_secs());
            tokio::spawn(countdown(limit.as_secs(), self.stop_handle()))
        });

        let reason = self.control_loop(receivers).await;

        if let Some(timer) = timer {
            timer.abort();
        }
        self.state = SessionState::Stopped;
        self.stats.elapsed = started.elapsed();
        self.stats.stop_reason = Some(reason);
        info!("Recording stopped: {reason}");
        display_session_summary(&self.aggregator, &self.stats);

        self.persist()
    }

    async fn control_loop(&mut self, mut rx: EventReceivers) -> StopReason {
        let mut stop_rx = self.stop_rx.clone();

        let reason = loop {
            tokio::select! {
                biased;

                stop = stop_rx.wait_for(Option::is_some) => {
                    // The sender lives in `self`, so the channel cannot close here
                    break stop.ok().and_then(|r| *r).unwrap_or(StopReason::Requested);
                }
                Some(err) = rx.errors.recv() => self.on_probe_error(&err),
                Some(event) = rx.allocations.recv() => self.aggregator.on_allocation(event),
                Some(event) = rx.deallocations.recv() => self.aggregator.on_deallocation(event),
            }
        };

        self.stats.discarded_at_stop = rx.allocations.len() + rx.deallocations.len();
        if self.stats.discarded_at_stop > 0 {
            warn!(
                "{} in-flight events were discarded at stop",
                self.stats.discarded_at_stop
            );
        }
        rx.allocations.close();
        rx.deallocations.close();
        rx.errors.close();

        reason
    }

    fn on_probe_error(&mut self, err: &ProbeError) {
        match err {
            ProbeError::Launch(_) => {
                self.stats.launch_errors += 1;
                error!("probe: {err}");
            }
            ProbeError::Parse { .. } => {
                self.stats.parse_errors += 1;
                warn!("probe: {err}");
            }
            ProbeError::Diagnostic { .. } => {
                self.stats.diagnostics += 1;
                warn!("probe: {err}");
            }
            ProbeError::Stream { .. } => {
                self.stats.stream_errors += 1;
                error!("probe: {err}");
            }
        }
    }

    fn persist(&self) -> Result<PathBuf, RecordError> {
        if self.aggregator.is_empty() {
            return Err(RecordError::NoData);
        }
        let path = snapshot::save(
            self.aggregator.snapshot(),
            self.config.output.as_deref(),
            self.config.pid,
        )?;
        Ok(path)
    }
}

/// Tick once per second and request a stop when `total_secs` have elapsed
async fn countdown(total_secs: u64, stop: StopHandle) {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    // The first tick completes immediately
    ticker.tick().await;

    let mut left = total_secs;
    while left > 0 {
        ticker.tick().await;
        left -= 1;
        display_countdown(left);
    }
    stop.request_stop(StopReason::DurationElapsed);
}

/// Exit status after a second interrupt, as the default SIGINT action reports it
pub const EXIT_INTERRUPTED: i32 = 130;

/// Translate SIGINT/SIGTERM into a stop request.
///
/// The first signal stops the session gracefully. Once a handler is
/// installed the default action never runs again, so a second signal exits
/// the process with [`EXIT_INTERRUPTED`] instead of waiting for the save.
///
/// # Errors
/// Returns an error if the signal handlers cannot be installed.
pub fn spawn_signal_listener(stop: StopHandle) -> std::io::Result<JoinHandle<()>> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    Ok(tokio::spawn(async move {
        tokio::select! {
            Some(()) = interrupt.recv() => {}
            Some(()) = terminate.recv() => {}
            else => return,
        }
        stop.request_stop(StopReason::Interrupted);
        info!("Stopping; signal again to exit without saving");

        tokio::select! {
            Some(()) = interrupt.recv() => {}
            Some(()) = terminate.recv() => {}
            else => return,
        }
        warn!("Second signal received, exiting before the snapshot is saved");
        std::process::exit(EXIT_INTERRUPTED);
    }))
}

/// A finished session: the recorder (for inspection) and the save outcome
#[derive(Debug)]
pub struct SessionOutcome {
    pub recorder: Recorder,
    pub probes: ProbeProcesses,
    pub saved: Result<PathBuf, RecordError>,
}

/// Launch both probes, record until stopped, and save the snapshot
pub async fn record(
    config: RecordConfig,
    scripts: &ProbeScripts,
    launcher: &ProbeLauncher,
) -> SessionOutcome {
    let (senders, receivers) = event_channels(config.channel_capacity);
    let mut recorder = Recorder::new(config);

    let signals = match spawn_signal_listener(recorder.stop_handle()) {
        Ok(handle) => Some(handle),
        Err(e) => {
            error!("Failed to install signal handlers, only the timer can stop: {e}");
            None
        }
    };
    let probes = launcher.launch(scripts, senders);

    let saved = recorder.run(receivers).await;
    if let Some(signals) = signals {
        signals.abort();
    }

    SessionOutcome { recorder, probes, saved }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Address;
    use crate::events::{AllocationEvent, DeallocationEvent};
    use tempfile::tempdir;

    fn alloc(size: i64, addr: u64) -> AllocationEvent {
        AllocationEvent::new(size, Address(addr), vec!["site".to_string()])
    }

    #[test]
    fn test_stop_handle_first_request_wins() {
        let recorder = Recorder::new(RecordConfig::new(Pid(1)));
        let handle = recorder.stop_handle();

        assert!(handle.request_stop(StopReason::DurationElapsed));
        assert!(!handle.request_stop(StopReason::Interrupted));
        assert!(!recorder.stop_handle().request_stop(StopReason::Requested));
        assert_eq!(handle.reason(), Some(StopReason::DurationElapsed));
    }

    #[test]
    fn test_duration_disabled_when_not_positive() {
        let mut config = RecordConfig::new(Pid(1));
        assert_eq!(config.duration(), None);
        config.duration_secs = 0;
        assert_eq!(config.duration(), None);
        config.duration_secs = 3;
        assert_eq!(config.duration(), Some(Duration::from_secs(3)));
    }

    #[tokio::test]
    async fn test_events_then_stop_saves_snapshot() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("out.track");
        let config = RecordConfig { output: Some(output.clone()), ..RecordConfig::new(Pid(7)) };

        let (senders, receivers) = event_channels(8);
        let mut recorder = Recorder::new(config);
        let stop = recorder.stop_handle();

        let producer = tokio::spawn(async move {
            senders.allocations.send(alloc(128, 0x1000)).await.unwrap();
            senders
                .deallocations
                .send(DeallocationEvent::new(Address(0x1000), vec!["other".to_string()]))
                .await
                .unwrap();
            senders.allocations.send(alloc(64, 0x2000)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
            stop.request_stop(StopReason::Requested);
        });

        let saved = recorder.run(receivers).await.unwrap();
        producer.await.unwrap();

        assert_eq!(saved, output);
        assert_eq!(recorder.state(), SessionState::Stopped);
        assert_eq!(recorder.stats().stop_reason, Some(StopReason::Requested));

        let loaded = snapshot::load(&output).unwrap();
        assert_eq!(&loaded, recorder.aggregator().snapshot());
        assert_eq!(loaded.live.len(), 1);
        assert!(loaded.live.contains_key(&Address(0x2000)));
    }

    #[tokio::test]
    async fn test_queued_malloc_applied_before_its_free() {
        let (senders, receivers) = event_channels(8);
        senders.allocations.send(alloc(128, 0x1000)).await.unwrap();
        senders
            .deallocations
            .send(DeallocationEvent::new(Address(0x1000), vec!["release".to_string()]))
            .await
            .unwrap();

        let mut recorder = Recorder::new(RecordConfig::new(Pid(1)));
        let stop = recorder.stop_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            stop.request_stop(StopReason::Requested);
        });

        let dir = tempdir().unwrap();
        recorder.config.output = Some(dir.path().join("pair.track"));
        recorder.run(receivers).await.unwrap();

        let agg = recorder.aggregator();
        assert!(agg.snapshot().live.is_empty());
        assert_eq!(agg.unmatched_deallocations, 0);
        assert_eq!((agg.allocation_count, agg.deallocation_count), (1, 1));
        drop(senders);
    }

    #[tokio::test]
    #[allow(unsafe_code)] // raising a signal at ourselves
    async fn test_signal_requests_stop() {
        let recorder = Recorder::new(RecordConfig::new(Pid(1)));
        let handle = recorder.stop_handle();
        let listener = spawn_signal_listener(recorder.stop_handle()).unwrap();

        assert_eq!(unsafe { libc::kill(libc::getpid(), libc::SIGTERM) }, 0);

        let mut stop_rx = recorder.stop_rx.clone();
        tokio::time::timeout(Duration::from_secs(5), stop_rx.wait_for(Option::is_some))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(handle.reason(), Some(StopReason::Interrupted));
        listener.abort();
    }

    #[tokio::test]
    async fn test_stop_before_start_discards_queued_events() {
        let (senders, receivers) = event_channels(8);
        for addr in 0..3 {
            senders.allocations.send(alloc(1, addr)).await.unwrap();
        }

        let mut recorder = Recorder::new(RecordConfig::new(Pid(1)));
        recorder.stop_handle().request_stop(StopReason::Interrupted);

        let result = recorder.run(receivers).await;
        assert!(matches!(result, Err(RecordError::NoData)));
        assert_eq!(recorder.stats().discarded_at_stop, 3);
        assert_eq!(recorder.stats().stop_reason, Some(StopReason::Interrupted));

        // Producers see the closed channel
        assert!(senders.allocations.send(alloc(1, 9)).await.is_err());
    }

    #[tokio::test]
    async fn test_probe_errors_are_counted_not_fatal() {
        let (senders, receivers) = event_channels(8);
        let mut recorder = Recorder::new(RecordConfig::new(Pid(1)));
        let stop = recorder.stop_handle();

        tokio::spawn(async move {
            senders
                .errors
                .send(ProbeError::Diagnostic {
                    probe: memtrack_common::ProbeKind::Allocation,
                    line: "WARNING: probe overhead".to_string(),
                })
                .await
                .unwrap();
            senders
                .errors
                .send(ProbeError::Parse {
                    probe: memtrack_common::ProbeKind::Deallocation,
                    source: crate::domain::ParseError::Truncated { lines: 0, expected: 4 },
                })
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
            stop.request_stop(StopReason::Requested);
        });

        assert!(matches!(recorder.run(receivers).await, Err(RecordError::NoData)));
        assert_eq!(recorder.stats().diagnostics, 1);
        assert_eq!(recorder.stats().parse_errors, 1);
    }

    #[tokio::test]
    async fn test_timer_stops_idle_session() {
        let (_senders, receivers) = event_channels(4);
        let mut recorder =
            Recorder::new(RecordConfig { duration_secs: 2, ..RecordConfig::new(Pid(1)) });

        let started = Instant::now();
        let result = recorder.run(receivers).await;

        assert!(matches!(result, Err(RecordError::NoData)));
        assert!(started.elapsed() >= Duration::from_millis(1900));
        assert_eq!(recorder.stats().stop_reason, Some(StopReason::DurationElapsed));
    }

    #[tokio::test]
    async fn test_run_only_once() {
        let mut recorder = Recorder::new(RecordConfig::new(Pid(1)));
        recorder.stop_handle().request_stop(StopReason::Requested);

        let (_s1, r1) = event_channels(1);
        assert!(matches!(recorder.run(r1).await, Err(RecordError::NoData)));

        let (_s2, r2) = event_channels(1);
        assert!(matches!(recorder.run(r2).await, Err(RecordError::AlreadyStarted)));
    }
}
