//! Probe side of a recording session
//!
//! Everything between the SystemTap runtime and the aggregator:
//! - Rendering the `malloc`/`free` probe programs
//! - Launching them as subprocesses
//! - Delimiting and decoding their text output
//! - Pumping decoded events onto bounded channels

pub mod block_parser;
pub mod launcher;
pub mod script;
pub mod stream;

// Re-export common types
pub use block_parser::{BlockParser, DecodeRecord, ParserState};
pub use launcher::{event_channels, EventReceivers, EventSenders, ProbeLauncher, ProbeProcesses};
pub use script::{build_allocation_probe, build_deallocation_probe, ProbeScripts, TargetBinaries};
pub use stream::{pump_diagnostics, pump_records};
