//! # memtrack - Main Entry Point
//!
//! Two subcommands:
//! - **record** (`--pid <PID>`): trace malloc/free until stopped, save a snapshot
//! - **report** (`--input <FILE>`): print leak rankings of a saved snapshot

use anyhow::{Context, Result};
use clap::Parser;
use log::debug;

use memtrack::analysis::LeakReport;
use memtrack::cli::{Args, Command, RecordArgs, ReportArgs};
use memtrack::preflight::{check_debug_symbols, run_preflight_checks};
use memtrack::probe::{ProbeLauncher, ProbeScripts};
use memtrack::process_lookup::resolve_target_binaries;
use memtrack::recording::{self, display_saved, display_start_banner};
use memtrack::snapshot;

// Exit codes; usage errors exit with 2 from clap itself
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_NOPERM: i32 = 77;

fn main() {
    let args = Args::parse();
    env_logger::Builder::new().filter_level(args.log_level()).parse_default_env().init();

    std::process::exit(match run(args) {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    // Whole chain: a permission failure may sit under added context
    let msg = format!("{err:#}").to_lowercase();
    if msg.contains("permission denied") || msg.contains("requires root") {
        EXIT_NOPERM
    } else {
        EXIT_ERROR
    }
}

#[tokio::main]
async fn run(args: Args) -> Result<()> {
    match args.command {
        Command::Record(record_args) => record(&record_args).await,
        Command::Report(report_args) => report(&report_args),
    }
}

async fn record(args: &RecordArgs) -> Result<()> {
    let config = args.to_config();
    let pid = config.pid;

    // Rendering only needs /proc; tracing needs the whole environment
    if !args.print_scripts {
        run_preflight_checks(pid)?;
    }

    let binaries = resolve_target_binaries(pid)?;
    let scripts = ProbeScripts::render(pid, &binaries);

    if args.print_scripts {
        println!("{}\n\n{}", scripts.allocation, scripts.deallocation);
        return Ok(());
    }

    check_debug_symbols(&binaries.exec_path)?;

    debug!("allocation probe: {}", scripts.allocation);
    debug!("deallocation probe: {}", scripts.deallocation);

    display_start_banner(pid, &binaries, config.duration_secs);
    let outcome = recording::record(config, &scripts, &ProbeLauncher::default()).await;

    for (kind, id) in outcome.probes.ids() {
        debug!("{kind} probe process {id:?} left to exit with its target");
    }

    let path = outcome.saved.context("Recording produced no snapshot")?;
    display_saved(&path);
    Ok(())
}

fn report(args: &ReportArgs) -> Result<()> {
    let snapshot = snapshot::load(&args.input)
        .with_context(|| format!("Failed to load {}", args.input.display()))?;

    let report = LeakReport::from_snapshot(&snapshot);
    print!("{}", report.render(args.top));
    Ok(())
}
