//! Pre-flight checks for memtrack
//!
//! Validates the tracing environment before any probe is launched.
//! Provides clear, actionable error messages when requirements aren't met.

#![allow(unsafe_code)] // geteuid() requires unsafe

use anyhow::{bail, Context, Result};
use log::{info, warn};
use object::{Object, ObjectSection};
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::domain::Pid;

/// SystemTap front end
pub const TRACER_COMMAND: &str = "stap";

/// Packages that give `sprint_ubacktrace()` symbolized glibc frames
const DEBUGINFO_PACKAGES: [&str; 3] = ["glibc-debuginfo", "glibc-debuginfo-common", "glibc-devel"];

/// Run all pre-flight checks before launching probes
///
/// # Errors
/// Returns an error describing the first unmet requirement
pub fn run_preflight_checks(pid: Pid) -> Result<()> {
    check_privileges()?;
    info!("check root user [ok]");
    check_tracer_installed()?;
    info!("check {TRACER_COMMAND} installed [ok]");
    check_debuginfo_packages()?;
    check_process_exists(pid)?;
    info!("check process {} running [ok]", pid.0);
    Ok(())
}

/// SystemTap inserts kernel modules; there is no unprivileged mode
fn check_privileges() -> Result<()> {
    if unsafe { libc::geteuid() } == 0 {
        return Ok(());
    }
    bail!(
        "Permission denied: memtrack requires root privileges to run SystemTap probes.\n\n\
         Run with: sudo memtrack record ..."
    );
}

fn check_tracer_installed() -> Result<()> {
    if find_on_path(TRACER_COMMAND).is_none() {
        bail!(
            "{TRACER_COMMAND} not found on PATH.\n\n\
             Install SystemTap first, e.g.: yum install systemtap"
        );
    }
    Ok(())
}

fn check_debuginfo_packages() -> Result<()> {
    if find_on_path("rpm").is_none() {
        warn!("rpm not available, skipping glibc debuginfo package check");
        return Ok(());
    }

    let mut missing = Vec::new();
    for package in DEBUGINFO_PACKAGES {
        if is_rpm_installed(package)? {
            info!("check {package} installed [ok]");
        } else {
            missing.push(package);
        }
    }

    if !missing.is_empty() {
        bail!(
            "Missing packages: {}\n\n\
             Stack traces through glibc need its debug info.\n\
             Install with: debuginfo-install glibc && yum install glibc-devel",
            missing.join(", ")
        );
    }
    Ok(())
}

/// `rpm -q` prints the full NVR on success and "package X is not installed" otherwise
fn is_rpm_installed(package: &str) -> Result<bool> {
    let output = Command::new("rpm")
        .args(["-q", package])
        .output()
        .with_context(|| format!("Failed to run rpm -q {package}"))?;
    Ok(output.status.success() && String::from_utf8_lossy(&output.stdout).starts_with(package))
}

/// Check if the target process exists
///
/// # Errors
/// Returns an error if `/proc/<pid>` does not exist
pub fn check_process_exists(pid: Pid) -> Result<()> {
    let proc_path = format!("/proc/{}", pid.0);
    if !Path::new(&proc_path).exists() {
        bail!(
            "Process {} not found.\n\n\
             Is the process still running? Check with: ps -p {}",
            pid.0,
            pid.0
        );
    }
    Ok(())
}

/// Warn if the executable carries no symbols to put in backtraces
///
/// # Errors
/// Returns an error if the binary cannot be read
pub fn check_debug_symbols(exec_path: &Path) -> Result<()> {
    let file_data = std::fs::read(exec_path)
        .with_context(|| format!("Failed to read binary: {}", exec_path.display()))?;

    let Ok(obj) = object::File::parse(&*file_data) else {
        // Not an object file; stap will complain on its own
        return Ok(());
    };

    let has_debug_info = obj.section_by_name(".debug_info").is_some_and(|s| s.size() > 0);
    let has_symtab = obj.section_by_name(".symtab").is_some_and(|s| s.size() > 0);

    if !has_debug_info && !has_symtab {
        warn!("{} is stripped, backtraces will show addresses only", exec_path.display());
    } else if !has_debug_info {
        info!("{} has no DWARF debug info, source locations unavailable", exec_path.display());
    }
    Ok(())
}

/// First executable file named `name` on `PATH`
#[must_use]
pub fn find_on_path(name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths).map(|dir| dir.join(name)).find(|candidate| candidate.is_file())
}
