//! Persisted session aggregate
//!
//! A [`Snapshot`] is the only thing a recording session leaves behind. The
//! report side reads it back wholesale.

pub mod store;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::{Address, Fingerprint};
use crate::events::{AllocationEvent, AllocationStat, DeallocationStat};

pub use store::{default_snapshot_path, load, save, FORMAT_VERSION};

/// Point-in-time copy of all aggregate state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Allocation statistics per call site
    pub malloc_stats: HashMap<Fingerprint, AllocationStat>,
    /// Deallocation statistics per call site
    pub free_stats: HashMap<Fingerprint, DeallocationStat>,
    /// Allocations not yet matched by a deallocation
    pub live: HashMap<Address, AllocationEvent>,
}

impl Snapshot {
    /// True if all three structures are empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.malloc_stats.is_empty() && self.free_stats.is_empty() && self.live.is_empty()
    }
}
