//! Offline analysis of saved snapshots
//!
//! Pure functions over a [`Snapshot`](crate::snapshot::Snapshot); nothing here
//! touches the probes or the filesystem.

pub mod leak_report;

pub use leak_report::{CallSiteSummary, LeakReport, ReportTotals};
