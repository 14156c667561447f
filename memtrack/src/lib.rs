//! # memtrack - Live malloc/free Tracer
//!
//! memtrack attaches SystemTap probes to `malloc` and `free` in a running
//! process, folds every event into per-call-site statistics and a live
//! allocation index, and saves the result for offline leak analysis.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Target Process (-x <pid>)                    │
//! └───────────────┬───────────────────────────────┬─────────────────┘
//!                 │ malloc return                 │ free entry
//!                 ▼                               ▼
//! ┌───────────────────────────┐   ┌───────────────────────────┐
//! │  stap (allocation probe)  │   │ stap (deallocation probe) │
//! └──────┬─────────────┬──────┘   └──────┬─────────────┬──────┘
//!        │ stdout      │ stderr          │ stdout      │ stderr
//!        ▼             ▼                 ▼             ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  pump tasks: BlockParser ──▶ decode ──▶ bounded channels        │
//! └───────────────────────────────┬─────────────────────────────────┘
//!                                 │ allocations / deallocations / errors
//!                                 ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  Recorder control loop (single owner)                           │
//! │    stop signal ▸ errors ▸ deallocations ▸ allocations           │
//! │                     │                                           │
//! │                     ▼                                           │
//! │               Aggregator ──on stop──▶ snapshot::save (once)     │
//! └─────────────────────────────────────────────────────────────────┘
//!
//!   memtrack report:  snapshot::load ──▶ LeakReport ──▶ text
//! ```
//!
//! ## Module Structure
//!
//! - [`probe`]: probe program rendering, subprocess launch, record parsing
//!   and the pump tasks feeding the session channels
//! - [`recording`]: the session lifecycle (start, stop triggers, single
//!   save) and the aggregator it owns
//! - [`snapshot`]: the persisted aggregate and its on-disk format
//! - [`analysis`]: rankings computed from a saved snapshot
//! - [`events`]: decoded records and per-site statistics
//! - [`domain`]: newtypes (Pid, Address, Fingerprint) and error enums
//! - [`preflight`], [`process_lookup`]: environment checks and binary
//!   path resolution, run before a recording starts
//! - [`cli`]: command-line arguments
//!
//! ## Typical Usage
//!
//! ```bash
//! # Record until Ctrl+C
//! sudo memtrack record --pid <PID>
//!
//! # Record for 60 seconds into a named file
//! sudo memtrack record --pid <PID> --time 60 --out server.track
//!
//! # Show the top leak candidates
//! memtrack report --input server.track --top 20
//! ```
//!
//! ## Key Concepts
//!
//! - **Record block**: one probe hit, framed by `---===` / `===---` with the
//!   backtrace inside `***===` / `===***`
//! - **Fingerprint**: CRC-32 of a backtrace, used as the call-site key
//! - **Live index**: allocations not yet seen freed, keyed by address

pub mod analysis;
pub mod cli;
pub mod domain;
pub mod events;
pub mod preflight;
pub mod probe;
pub mod process_lookup;
pub mod recording;
pub mod snapshot;
