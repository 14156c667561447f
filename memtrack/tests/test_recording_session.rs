use memtrack::analysis::LeakReport;
use memtrack::domain::{Address, Fingerprint, Pid, RecordError};
use memtrack::probe::{ProbeLauncher, ProbeScripts};
use memtrack::recording::{record, RecordConfig, SessionState, StopReason};
use memtrack::snapshot;

/// Stand-in probes that print fixed records instead of tracing anything
fn canned_scripts() -> ProbeScripts {
    let allocation = [
        r"printf '%b' 'Missing separate debuginfos, use: debuginfo-install glibc\n'",
        r"printf '%b' '---===\nbytes=64\nreturn=0xbeef\n***===\nmain+0x10\n===***\n===---\n\n'",
        r"printf '%b' '---===\nbytes=32\nreturn=0xcafe\n***===\nworker+0x4\nmain+0x10\n===***\n===---\n\n'",
        r"printf '%b' '---===\nbytes=32\nreturn=0xf00d\n***===\nworker+0x4\nmain+0x10\n===***\n===---\n\n'",
    ]
    .join("; ");
    let deallocation = [
        // The two tracers are separate processes; give the malloc a head start
        "sleep 0.3",
        r"printf '%b' '---===\nmem=48879\n***===\ncleanup+0x8\n===***\n===---\n\n'",
        r"printf '%b' 'WARNING: probe overhead exceeded threshold\n' >&2",
    ]
    .join("; ");
    ProbeScripts { allocation, deallocation }
}

#[tokio::test]
async fn test_timed_session_records_and_saves() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("session.track");
    let config = RecordConfig {
        output: Some(output.clone()),
        duration_secs: 1,
        ..RecordConfig::new(Pid(1))
    };

    let outcome = record(config, &canned_scripts(), &ProbeLauncher::default()).await;
    let saved = outcome.saved.unwrap();
    assert_eq!(saved, output);

    let recorder = &outcome.recorder;
    assert_eq!(recorder.state(), SessionState::Stopped);
    assert_eq!(recorder.stats().stop_reason, Some(StopReason::DurationElapsed));
    assert_eq!(recorder.stats().diagnostics, 1);
    assert_eq!(recorder.stats().parse_errors, 0);
    assert_eq!(recorder.aggregator().allocation_count, 3);
    assert_eq!(recorder.aggregator().deallocation_count, 1);

    let snap = snapshot::load(&output).unwrap();
    assert_eq!(snap.malloc_stats.len(), 2);
    assert_eq!(snap.free_stats.len(), 1);

    let mut live: Vec<u64> = snap.live.keys().map(|a| a.0).collect();
    live.sort_unstable();
    assert_eq!(live, vec![0xcafe, 0xf00d]);

    let worker_site = Fingerprint::of_stack(&["worker+0x4", "main+0x10"]);
    let stat = &snap.malloc_stats[&worker_site];
    assert_eq!((stat.count, stat.total_bytes), (2, 64));
    assert_eq!(snap.live[&Address(0xcafe)].fingerprint, worker_site);
}

#[tokio::test]
async fn test_session_report_ranks_live_sites() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("ranked.track");
    let config = RecordConfig {
        output: Some(output.clone()),
        duration_secs: 1,
        ..RecordConfig::new(Pid(1))
    };

    let outcome = record(config, &canned_scripts(), &ProbeLauncher::default()).await;
    outcome.saved.unwrap();

    let report = LeakReport::from_snapshot(&snapshot::load(&output).unwrap());
    assert_eq!(report.totals.live_count, 2);
    assert_eq!(report.totals.live_bytes, 64);
    assert_eq!(report.live_top_bytes.len(), 1);
    assert_eq!(report.live_top_bytes[0].stack, vec!["worker+0x4", "main+0x10"]);
    assert_eq!(report.top_bytes[0].total_bytes, 64);
}

#[tokio::test]
async fn test_silent_probes_yield_no_data() {
    let scripts = ProbeScripts { allocation: "true".to_string(), deallocation: "true".to_string() };
    let config = RecordConfig { duration_secs: 1, ..RecordConfig::new(Pid(1)) };

    let outcome = record(config, &scripts, &ProbeLauncher::default()).await;
    assert!(matches!(outcome.saved, Err(RecordError::NoData)));
    assert_eq!(outcome.probes.ids().len(), 2);
}

#[tokio::test]
async fn test_failed_launch_is_not_fatal() {
    let config = RecordConfig { duration_secs: 1, ..RecordConfig::new(Pid(1)) };

    let outcome =
        record(config, &canned_scripts(), &ProbeLauncher::with_shell("/nonexistent/shell")).await;
    assert!(outcome.probes.is_empty());
    assert!(matches!(outcome.saved, Err(RecordError::NoData)));
    assert_eq!(outcome.recorder.stats().launch_errors, 2);
}
