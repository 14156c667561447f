//! # Probe Script Builder
//!
//! Renders the two SystemTap invocations memtrack runs against a target: a
//! return probe on `malloc` and an entry probe on `free`, both living in the
//! target's C runtime. The rendered text is a complete `/bin/sh -c` command
//! line, so the launcher does not need to know anything about `stap` flags.
//!
//! Each probe prints its payload between the sentinels defined in
//! [`memtrack_common`], which lets the block parser delimit records no matter
//! how many frames the backtrace has.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use memtrack_common::{
    ProbeKind, ALLOC_BYTES_PREFIX, FREE_MEM_PREFIX, OP_END, OP_START, STACK_END, STACK_START,
};

use crate::domain::Pid;

/// Binaries whose debug info the tracer needs to symbolize backtraces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetBinaries {
    /// Executable of the traced process
    pub exec_path: PathBuf,
    /// C runtime shared object (`malloc`/`free` live here)
    pub libc_path: PathBuf,
    /// C++ runtime shared object, if the target links one
    pub libcxx_path: Option<PathBuf>,
}

impl TargetBinaries {
    /// Paths passed to `stap -d`, in the order the tracer expects them.
    /// An empty C++ runtime path counts as absent.
    fn debug_info_paths(&self) -> impl Iterator<Item = &Path> {
        let libcxx = self
            .libcxx_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty());
        std::iter::once(self.libc_path.as_path())
            .chain(libcxx)
            .chain(std::iter::once(self.exec_path.as_path()))
    }
}

/// Both rendered probe commands for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeScripts {
    pub allocation: String,
    pub deallocation: String,
}

impl ProbeScripts {
    /// Render both probes for `pid`
    #[must_use]
    pub fn render(pid: Pid, binaries: &TargetBinaries) -> Self {
        Self {
            allocation: build_allocation_probe(pid, binaries),
            deallocation: build_deallocation_probe(pid, binaries),
        }
    }

    /// Command line for one half of the session
    #[must_use]
    pub fn for_kind(&self, kind: ProbeKind) -> &str {
        match kind {
            ProbeKind::Allocation => &self.allocation,
            ProbeKind::Deallocation => &self.deallocation,
        }
    }
}

/// Render the `malloc` return probe
///
/// Prints the requested size (captured at entry), the returned pointer and
/// the user-space backtrace.
#[must_use]
pub fn build_allocation_probe(pid: Pid, binaries: &TargetBinaries) -> String {
    let body = format!(
        "printf(\"{OP_START}\\n{ALLOC_BYTES_PREFIX}%d\\n%s\\n{STACK_START}\\n%s\\n{STACK_END}\\n{OP_END}\\n\\n\", \
         @entry($bytes), $$return, sprint_ubacktrace());"
    );
    render_command(pid, binaries, "function(\"malloc\").return", &body)
}

/// Render the `free` entry probe
///
/// Prints the freed pointer and the user-space backtrace.
#[must_use]
pub fn build_deallocation_probe(pid: Pid, binaries: &TargetBinaries) -> String {
    let body = format!(
        "printf(\"{OP_START}\\n{FREE_MEM_PREFIX}%d\\n{STACK_START}\\n%s\\n{STACK_END}\\n{OP_END}\\n\\n\", \
         $mem, sprint_ubacktrace());"
    );
    render_command(pid, binaries, "function(\"free\")", &body)
}

fn render_command(pid: Pid, binaries: &TargetBinaries, probe_point: &str, body: &str) -> String {
    let mut cmd = String::from("stap -v");
    for path in binaries.debug_info_paths() {
        let _ = write!(cmd, " -d {}", shell_quote(&path.to_string_lossy()));
    }
    let _ = write!(cmd, " -x {}", pid.0);

    // Filter on target() so forks of the traced process stay out
    let program = format!(
        "probe process(\"{}\").{probe_point} {{ if (pid() == target()) {{ {body} }} }}",
        binaries.libc_path.to_string_lossy()
    );
    let _ = write!(cmd, " -e {}", shell_quote(&program));
    cmd
}

/// Quote `s` as a single `/bin/sh` word
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
