//! CLI argument definitions

use clap::{Args as ClapArgs, Parser, Subcommand};
use log::LevelFilter;
use std::path::PathBuf;

use crate::domain::Pid;
use crate::recording::{RecordConfig, DEFAULT_CHANNEL_CAPACITY};

#[derive(Parser, Debug)]
#[command(
    name = "memtrack",
    version,
    about = "Trace malloc/free in a running process and report leak candidates",
    after_help = "\
EXAMPLES:
    sudo memtrack record --pid 1234                 Record until Ctrl+C
    sudo memtrack record --pid 1234 --time 60       Record for one minute
    memtrack report --input 20260101120000-1234.track"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Show progress information
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Show debug output, including every decoded record
    #[arg(short, long, global = true, hide = true)]
    pub debug: bool,
}

impl Args {
    /// Default log level; `RUST_LOG` still overrides it
    #[must_use]
    pub fn log_level(&self) -> LevelFilter {
        if self.debug {
            LevelFilter::Debug
        } else if self.verbose {
            LevelFilter::Info
        } else {
            LevelFilter::Warn
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Attach to a process and record malloc/free activity
    Record(RecordArgs),
    /// Print the leak report of a saved recording
    Report(ReportArgs),
}

#[derive(ClapArgs, Debug)]
pub struct RecordArgs {
    /// Process ID to trace
    #[arg(short, long)]
    pub pid: i32,

    /// Stop after N seconds (<= 0 records until interrupted)
    #[arg(short, long, default_value_t = -1, allow_negative_numbers = true)]
    pub time: i64,

    /// Snapshot file (default: <YYYYmmddHHMMSS>-<pid>.track)
    #[arg(short, long, value_name = "FILE")]
    pub out: Option<PathBuf>,

    /// Burst capacity of each event channel
    #[arg(long, default_value_t = DEFAULT_CHANNEL_CAPACITY, hide = true)]
    pub channel_capacity: usize,

    /// Print the rendered probe programs and exit
    #[arg(long, hide = true)]
    pub print_scripts: bool,
}

impl RecordArgs {
    #[must_use]
    pub fn to_config(&self) -> RecordConfig {
        RecordConfig {
            pid: Pid(self.pid),
            output: self.out.clone(),
            duration_secs: self.time,
            // Bounded channels need room for at least one event
            channel_capacity: self.channel_capacity.max(1),
        }
    }
}

#[derive(ClapArgs, Debug)]
pub struct ReportArgs {
    /// Snapshot written by `memtrack record`
    #[arg(short, long, value_name = "FILE")]
    pub input: PathBuf,

    /// Entries shown per ranking
    #[arg(long, default_value_t = 10)]
    pub top: usize,
}
