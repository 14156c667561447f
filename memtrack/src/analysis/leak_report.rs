//! Leak report built from a saved snapshot.
//!
//! Four rankings, all per call site:
//!
//! ```text
//! Snapshot
//!     │
//!     ├──► malloc_stats ──► top bytes / top count          (everything allocated)
//!     │
//!     └──► live ──regroup by fingerprint──► live top bytes / live top count
//! ```
//!
//! The live rankings are the leak candidates: memory allocated while
//! recording and never seen freed.
//!
//! Rankings are sorted descending on their key. Ties are broken by
//! fingerprint so the same snapshot always renders the same report.

use std::cmp::Reverse;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt::Write;

use crate::domain::Fingerprint;
use crate::snapshot::Snapshot;

/// One call site in a ranking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSiteSummary {
    pub fingerprint: Fingerprint,
    pub count: i64,
    pub total_bytes: i64,
    /// Sample stack, innermost frame first
    pub stack: Vec<String>,
}

/// Whole-session totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportTotals {
    pub allocation_count: i64,
    pub allocated_bytes: i64,
    pub deallocation_count: i64,
    pub live_count: usize,
    pub live_bytes: i64,
}

#[derive(Debug, Clone, Default)]
pub struct LeakReport {
    pub top_bytes: Vec<CallSiteSummary>,
    pub top_count: Vec<CallSiteSummary>,
    pub live_top_bytes: Vec<CallSiteSummary>,
    pub live_top_count: Vec<CallSiteSummary>,
    pub totals: ReportTotals,
}

impl LeakReport {
    #[must_use]
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let sites: Vec<CallSiteSummary> = snapshot
            .malloc_stats
            .iter()
            .map(|(fp, stat)| CallSiteSummary {
                fingerprint: *fp,
                count: i64::from(stat.count),
                total_bytes: stat.total_bytes,
                stack: stat.sample_stack.clone(),
            })
            .collect();

        let live_sites = group_live(snapshot);

        let totals = ReportTotals {
            allocation_count: sites.iter().map(|s| s.count).sum(),
            allocated_bytes: sites.iter().fold(0i64, |acc, s| acc.saturating_add(s.total_bytes)),
            deallocation_count: snapshot.free_stats.values().map(|s| i64::from(s.count)).sum(),
            live_count: snapshot.live.len(),
            live_bytes: live_sites.iter().fold(0i64, |acc, s| acc.saturating_add(s.total_bytes)),
        };

        Self {
            top_bytes: ranked(&sites, |s| s.total_bytes),
            top_count: ranked(&sites, |s| s.count),
            live_top_bytes: ranked(&live_sites, |s| s.total_bytes),
            live_top_count: ranked(&live_sites, |s| s.count),
            totals,
        }
    }

    /// Plain-text rendering of the first `top` entries of each ranking
    #[must_use]
    pub fn render(&self, top: usize) -> String {
        let mut out = String::new();
        let t = &self.totals;

        let _ = writeln!(out, "Allocations:   {} ({} bytes)", t.allocation_count, t.allocated_bytes);
        let _ = writeln!(out, "Deallocations: {}", t.deallocation_count);
        let _ = writeln!(out, "Still live:    {} ({} bytes)", t.live_count, t.live_bytes);

        for (title, sites) in [
            ("Top allocation sites by bytes", &self.top_bytes),
            ("Top allocation sites by count", &self.top_count),
            ("Top live allocation sites by bytes", &self.live_top_bytes),
            ("Top live allocation sites by count", &self.live_top_count),
        ] {
            let _ = writeln!(out, "\n== {title} ==");
            if sites.is_empty() {
                let _ = writeln!(out, "  (none)");
                continue;
            }
            for (rank, site) in sites.iter().take(top).enumerate() {
                let _ = writeln!(
                    out,
                    "\n#{} [{}] {} bytes in {} allocations",
                    rank + 1,
                    site.fingerprint,
                    site.total_bytes,
                    site.count
                );
                for frame in &site.stack {
                    let _ = writeln!(out, "    {frame}");
                }
            }
        }
        out
    }
}

/// Regroup the live index by call site
fn group_live(snapshot: &Snapshot) -> Vec<CallSiteSummary> {
    let mut by_site: HashMap<Fingerprint, CallSiteSummary> = HashMap::new();
    for event in snapshot.live.values() {
        match by_site.entry(event.fingerprint) {
            Entry::Occupied(mut slot) => {
                let site = slot.get_mut();
                site.count += 1;
                site.total_bytes = site.total_bytes.saturating_add(event.size_bytes);
            }
            Entry::Vacant(slot) => {
                slot.insert(CallSiteSummary {
                    fingerprint: event.fingerprint,
                    count: 1,
                    total_bytes: event.size_bytes,
                    stack: event.stack.clone(),
                });
            }
        }
    }
    by_site.into_values().collect()
}

fn ranked(sites: &[CallSiteSummary], key: impl Fn(&CallSiteSummary) -> i64) -> Vec<CallSiteSummary> {
    let mut out = sites.to_vec();
    out.sort_by_key(|s| (Reverse(key(s)), s.fingerprint));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Address;
    use crate::events::{AllocationEvent, DeallocationEvent};
    use crate::recording::Aggregator;

    fn stack(frame: &str) -> Vec<String> {
        vec![frame.to_string()]
    }

    /// big: 1 x 1000 bytes, freed
    /// many: 5 x 10 bytes, 3 still live
    /// leak: 2 x 300 bytes, both live
    fn sample() -> Snapshot {
        let mut agg = Aggregator::new();
        agg.on_allocation(AllocationEvent::new(1000, Address(0x1), stack("big")));
        agg.on_deallocation(DeallocationEvent::new(Address(0x1), stack("drop")));
        for addr in 0x10..0x15 {
            agg.on_allocation(AllocationEvent::new(10, Address(addr), stack("many")));
        }
        agg.on_deallocation(DeallocationEvent::new(Address(0x10), stack("drop")));
        agg.on_deallocation(DeallocationEvent::new(Address(0x11), stack("drop")));
        agg.on_allocation(AllocationEvent::new(300, Address(0x20), stack("leak")));
        agg.on_allocation(AllocationEvent::new(300, Address(0x21), stack("leak")));
        agg.into_snapshot()
    }

    fn names(sites: &[CallSiteSummary]) -> Vec<&str> {
        sites.iter().map(|s| s.stack[0].as_str()).collect()
    }

    #[test]
    fn test_rankings() {
        let report = LeakReport::from_snapshot(&sample());

        assert_eq!(names(&report.top_bytes), vec!["big", "leak", "many"]);
        assert_eq!(names(&report.top_count), vec!["many", "leak", "big"]);
        assert_eq!(names(&report.live_top_bytes), vec!["leak", "many"]);
        assert_eq!(names(&report.live_top_count), vec!["many", "leak"]);

        let many = &report.live_top_count[0];
        assert_eq!((many.count, many.total_bytes), (3, 30));
    }

    #[test]
    fn test_totals() {
        let totals = LeakReport::from_snapshot(&sample()).totals;
        assert_eq!(
            totals,
            ReportTotals {
                allocation_count: 8,
                allocated_bytes: 1650,
                deallocation_count: 3,
                live_count: 5,
                live_bytes: 630,
            }
        );
    }

    #[test]
    fn test_ties_are_deterministic() {
        let mut agg = Aggregator::new();
        for frame in ["x", "y", "z"] {
            agg.on_allocation(AllocationEvent::new(8, Address(u64::from(frame.as_bytes()[0])), stack(frame)));
        }
        let snap = agg.into_snapshot();

        let first = LeakReport::from_snapshot(&snap);
        let second = LeakReport::from_snapshot(&snap);
        assert_eq!(first.top_bytes, second.top_bytes);
        assert!(first.top_bytes.windows(2).all(|w| w[0].fingerprint < w[1].fingerprint));
    }

    #[test]
    fn test_render_limits_entries() {
        let text = LeakReport::from_snapshot(&sample()).render(1);

        assert!(text.contains("Still live:    5 (630 bytes)"));
        assert_eq!(text.matches("#1 ").count(), 4);
        assert!(!text.contains("#2 "));
        assert!(text.contains("    leak"));
    }

    #[test]
    fn test_empty_snapshot() {
        let report = LeakReport::from_snapshot(&Snapshot::default());
        assert!(report.top_bytes.is_empty());
        assert_eq!(report.totals, ReportTotals::default());
        assert_eq!(report.render(10).matches("(none)").count(), 4);
    }
}
