//! # Aggregator
//!
//! Folds the allocation and deallocation streams into per-call-site
//! statistics and the live-allocation index.
//!
//! The aggregator is owned by the session's control loop and is never shared:
//! the pump tasks reach it only through channels, so it needs no lock.
//!
//! ## Live Index Semantics
//!
//! - An allocation inserts its address, replacing any stale entry. The
//!   allocator does not hand out an address that is still live, so a
//!   replaced entry was freed by a call we did not see.
//! - A deallocation removes its address. Freeing an unknown address is not an
//!   error: it was allocated before recording started, or freed twice.
//! - Nothing is ever evicted otherwise. Whatever is left at the end of the
//!   session is the leak candidate set.
//!
//! The two probe streams are buffered independently, so under heavy load a
//! `free` can be processed before the `malloc` that produced its address.
//! The entry then stays live although the memory was released. This is a
//! known limitation of last-write-wins on delivery order.

use log::debug;
use std::collections::hash_map::Entry;

use crate::events::{AllocationEvent, AllocationStat, DeallocationEvent, DeallocationStat};
use crate::snapshot::Snapshot;

/// Single-owner aggregation state
#[derive(Debug, Default)]
pub struct Aggregator {
    state: Snapshot,
    /// Allocation events applied
    pub allocation_count: u64,
    /// Deallocation events applied
    pub deallocation_count: u64,
    /// Deallocations whose address was not in the live index
    pub unmatched_deallocations: u64,
    /// Allocations that replaced a live entry at the same address
    pub replaced_allocations: u64,
}

impl Aggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one allocation
    pub fn on_allocation(&mut self, event: AllocationEvent) {
        self.allocation_count += 1;
        debug!(
            "malloc {} bytes at {} (stack {}, {} frames)",
            event.size_bytes,
            event.address,
            event.fingerprint,
            event.stack.len()
        );

        match self.state.malloc_stats.entry(event.fingerprint) {
            Entry::Occupied(mut slot) => {
                let stat = slot.get_mut();
                stat.count = stat.count.saturating_add(1);
                stat.total_bytes = stat.total_bytes.saturating_add(event.size_bytes);
            }
            Entry::Vacant(slot) => {
                slot.insert(AllocationStat {
                    count: 1,
                    total_bytes: event.size_bytes,
                    sample_stack: event.stack.clone(),
                });
            }
        }

        if self.state.live.insert(event.address, event).is_some() {
            self.replaced_allocations += 1;
        }
    }

    /// Apply one deallocation
    pub fn on_deallocation(&mut self, event: DeallocationEvent) {
        self.deallocation_count += 1;
        debug!(
            "free {} (stack {}, {} frames)",
            event.address,
            event.fingerprint,
            event.stack.len()
        );

        match self.state.free_stats.entry(event.fingerprint) {
            Entry::Occupied(mut slot) => {
                let stat = slot.get_mut();
                stat.count = stat.count.saturating_add(1);
            }
            Entry::Vacant(slot) => {
                slot.insert(DeallocationStat { count: 1, sample_stack: event.stack });
            }
        }

        if self.state.live.remove(&event.address).is_none() {
            self.unmatched_deallocations += 1;
        }
    }

    /// Current aggregate, borrowed for saving or inspection
    #[must_use]
    pub fn snapshot(&self) -> &Snapshot {
        &self.state
    }

    /// Consume the aggregator, keeping only the aggregate
    #[must_use]
    pub fn into_snapshot(self) -> Snapshot {
        self.state
    }

    /// True while nothing at all has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }
}
