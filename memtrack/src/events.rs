//! Event and statistics records
//!
//! Data structures passed from the block parsers to the aggregator, and the
//! per-call-site statistics the aggregator accumulates. All of them are
//! serializable because they end up verbatim in a snapshot.

use serde::{Deserialize, Serialize};

use crate::domain::{Address, Fingerprint};

/// One observed return from `malloc`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationEvent {
    pub size_bytes: i64,
    pub address: Address,
    /// Frames as printed by the tracer, innermost first
    pub stack: Vec<String>,
    pub fingerprint: Fingerprint,
}

impl AllocationEvent {
    /// Build an event, fingerprinting the stack
    #[must_use]
    pub fn new(size_bytes: i64, address: Address, stack: Vec<String>) -> Self {
        let fingerprint = Fingerprint::of_stack(&stack);
        Self { size_bytes, address, stack, fingerprint }
    }
}

/// One observed entry into `free`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeallocationEvent {
    pub address: Address,
    pub stack: Vec<String>,
    pub fingerprint: Fingerprint,
}

impl DeallocationEvent {
    /// Build an event, fingerprinting the stack
    #[must_use]
    pub fn new(address: Address, stack: Vec<String>) -> Self {
        let fingerprint = Fingerprint::of_stack(&stack);
        Self { address, stack, fingerprint }
    }
}

/// Allocations made from one call site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationStat {
    pub count: i32,
    pub total_bytes: i64,
    /// Stack of the first allocation seen with this fingerprint
    pub sample_stack: Vec<String>,
}

/// Deallocations made from one call site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeallocationStat {
    pub count: i32,
    pub sample_stack: Vec<String>,
}
