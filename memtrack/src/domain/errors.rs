//! Structured error types for memtrack
//!
//! Using thiserror for automatic Display implementation and error chaining.

use memtrack_common::ProbeKind;
use std::num::ParseIntError;
use std::path::PathBuf;
use thiserror::Error;

/// A probe subprocess could not be brought up
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Failed to start {probe} probe: {source}")]
    Spawn {
        probe: ProbeKind,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open {stream} of {probe} probe")]
    MissingStream { probe: ProbeKind, stream: &'static str },
}

/// A completed record block could not be decoded
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Record has {lines} lines, expected at least {expected}")]
    Truncated { lines: usize, expected: usize },

    #[error("Expected a line starting with {expected:?}, found {line:?}")]
    MissingField { expected: &'static str, line: String },

    #[error("Invalid {field} value {value:?}: {source}")]
    InvalidNumber {
        field: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error("Expected sentinel {expected:?}, found {line:?}")]
    MissingSentinel { expected: &'static str, line: String },

    #[error("Negative allocation size {0}")]
    NegativeSize(i64),
}

/// Everything the probe side reports on the shared error channel
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error("Failed to parse {probe} record: {source}")]
    Parse {
        probe: ProbeKind,
        #[source]
        source: ParseError,
    },

    #[error("{probe} probe stderr: {line}")]
    Diagnostic { probe: ProbeKind, line: String },

    #[error("Failed to read {probe} probe {stream}: {source}")]
    Stream {
        probe: ProbeKind,
        stream: &'static str,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Failed to access snapshot file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed snapshot: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Unsupported snapshot format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
}

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("No data to save (maybe the recording time is too short, or the probes never attached)")]
    NoData,

    #[error("Recording session was already started")]
    AlreadyStarted,

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}
