//! # Process Launcher
//!
//! Starts the two probe subprocesses through a shell and wires their streams
//! to the pump tasks. Launch failures are not returned to the caller: they
//! are queued on the shared error channel like every other probe-side
//! problem, and a failure on one probe does not stop the other from being
//! attempted.
//!
//! The launcher never kills what it started. A tracer attached with `-x`
//! exits with its target, takes the terminal's SIGINT along with memtrack,
//! and dies on SIGPIPE once memtrack has exited and its stdout is closed.

use log::{error, info};
use memtrack_common::ProbeKind;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::BufReader;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::mpsc::{self, Receiver, Sender};

use super::script::ProbeScripts;
use super::stream::{pump_diagnostics, pump_records};
use crate::domain::{LaunchError, ProbeError};
use crate::events::{AllocationEvent, DeallocationEvent};

const DEFAULT_SHELL: &str = "/bin/sh";

/// Producer halves of the session channels
#[derive(Debug, Clone)]
pub struct EventSenders {
    pub allocations: Sender<AllocationEvent>,
    pub deallocations: Sender<DeallocationEvent>,
    pub errors: Sender<ProbeError>,
}

/// Consumer halves of the session channels, owned by the control loop
#[derive(Debug)]
pub struct EventReceivers {
    pub allocations: Receiver<AllocationEvent>,
    pub deallocations: Receiver<DeallocationEvent>,
    pub errors: Receiver<ProbeError>,
}

/// Create the three bounded session channels
///
/// # Panics
/// Panics if `capacity` is zero.
#[must_use]
pub fn event_channels(capacity: usize) -> (EventSenders, EventReceivers) {
    let (alloc_tx, alloc_rx) = mpsc::channel(capacity);
    let (free_tx, free_rx) = mpsc::channel(capacity);
    let (err_tx, err_rx) = mpsc::channel(capacity);
    (
        EventSenders { allocations: alloc_tx, deallocations: free_tx, errors: err_tx },
        EventReceivers { allocations: alloc_rx, deallocations: free_rx, errors: err_rx },
    )
}

/// A started probe subprocess
#[derive(Debug)]
pub struct ProbeProcess {
    pub kind: ProbeKind,
    pub child: Child,
}

/// Probe subprocesses that started successfully
#[derive(Debug, Default)]
pub struct ProbeProcesses {
    pub processes: Vec<ProbeProcess>,
}

impl ProbeProcesses {
    /// OS process ids of the running probes
    #[must_use]
    pub fn ids(&self) -> Vec<(ProbeKind, Option<u32>)> {
        self.processes.iter().map(|p| (p.kind, p.child.id())).collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }
}

/// Spawns probe commands through a shell
#[derive(Debug, Clone)]
pub struct ProbeLauncher {
    shell: PathBuf,
}

impl Default for ProbeLauncher {
    fn default() -> Self {
        Self { shell: PathBuf::from(DEFAULT_SHELL) }
    }
}

impl ProbeLauncher {
    /// Use `shell` (invoked as `<shell> -c <script>`) instead of `/bin/sh`
    #[must_use]
    pub fn with_shell(shell: impl Into<PathBuf>) -> Self {
        Self { shell: shell.into() }
    }

    /// Start both probes and the four pump tasks.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn launch(&self, scripts: &ProbeScripts, senders: EventSenders) -> ProbeProcesses {
        let mut started = ProbeProcesses::default();

        for kind in [ProbeKind::Allocation, ProbeKind::Deallocation] {
            match self.spawn_probe(kind, scripts.for_kind(kind)) {
                Ok((child, stdout, stderr)) => {
                    info!("{kind} probe started (pid {:?})", child.id());
                    tokio::spawn(pump_diagnostics(
                        BufReader::new(stderr),
                        kind,
                        senders.errors.clone(),
                    ));
                    match kind {
                        ProbeKind::Allocation => {
                            tokio::spawn(pump_records(
                                BufReader::new(stdout),
                                senders.allocations.clone(),
                                senders.errors.clone(),
                            ));
                        }
                        ProbeKind::Deallocation => {
                            tokio::spawn(pump_records(
                                BufReader::new(stdout),
                                senders.deallocations.clone(),
                                senders.errors.clone(),
                            ));
                        }
                    }
                    started.processes.push(ProbeProcess { kind, child });
                }
                Err(err) => {
                    error!("{err}");
                    // The control loop is not draining yet; don't block on it
                    let errors = senders.errors.clone();
                    tokio::spawn(async move {
                        let _ = errors.send(ProbeError::Launch(err)).await;
                    });
                }
            }
        }

        started
    }

    fn spawn_probe(
        &self,
        kind: ProbeKind,
        script: &str,
    ) -> Result<(Child, ChildStdout, ChildStderr), LaunchError> {
        let mut child = Command::new(&self.shell)
            .arg("-c")
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| LaunchError::Spawn { probe: kind, source })?;

        let stdout = child
            .stdout
            .take()
            .ok_or(LaunchError::MissingStream { probe: kind, stream: "stdout" })?;
        let stderr = child
            .stderr
            .take()
            .ok_or(LaunchError::MissingStream { probe: kind, stream: "stderr" })?;

        Ok((child, stdout, stderr))
    }
}
