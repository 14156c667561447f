// Durations are shown with millisecond precision only
#![allow(clippy::cast_precision_loss)]

use std::io::Write;
use std::path::Path;

use super::aggregator::Aggregator;
use super::session::SessionStats;
use crate::domain::Pid;
use crate::probe::TargetBinaries;

/// Banner shown once both probes have been launched
pub fn display_start_banner(pid: Pid, binaries: &TargetBinaries, duration_secs: i64) {
    println!("\n🔍 Tracing malloc/free in {pid}");
    println!("   exec:      {}", binaries.exec_path.display());
    println!("   libc:      {}", binaries.libc_path.display());
    if let Some(libcxx) = &binaries.libcxx_path {
        println!("   libstdc++: {}", libcxx.display());
    }
    if duration_secs > 0 {
        println!("   Recording for {duration_secs}s (Ctrl+C stops early)\n");
    } else {
        println!("   Recording until Ctrl+C\n");
    }
}

/// Overwrite the countdown line in place
pub fn display_countdown(remaining_secs: u64) {
    print!("\r   {remaining_secs}s remaining   ");
    std::io::stdout().flush().ok();
}

/// End-of-session counters
pub fn display_session_summary(aggregator: &Aggregator, stats: &SessionStats) {
    let snapshot = aggregator.snapshot();
    let reason = stats.stop_reason.map_or_else(|| "unknown".to_string(), |r| r.to_string());

    println!("\n\n📊 Session ended after {:.1}s ({reason})", stats.elapsed.as_millis() as f64 / 1000.0);
    println!(
        "   Events:     {} malloc, {} free ({} free of unknown address)",
        aggregator.allocation_count, aggregator.deallocation_count, aggregator.unmatched_deallocations
    );
    println!(
        "   Call sites: {} malloc, {} free",
        snapshot.malloc_stats.len(),
        snapshot.free_stats.len()
    );
    println!("   Live:       {} allocations", snapshot.live.len());
    if stats.discarded_at_stop > 0 {
        println!("   ⚠️  {} queued events discarded at stop", stats.discarded_at_stop);
    }
    let problems = stats.parse_errors + stats.launch_errors + stats.stream_errors;
    if problems > 0 || stats.diagnostics > 0 {
        eprintln!(
            "stats: parse_errors={} launch_errors={} stream_errors={} diagnostics={}",
            stats.parse_errors, stats.launch_errors, stats.stream_errors, stats.diagnostics
        );
    }
}

/// Final line of a successful recording
pub fn display_saved(path: &Path) {
    println!("✓ Snapshot saved to {}", path.display());
    println!("   View it with: memtrack report --input {}", path.display());
}
