//! Resolve the binaries a probe must load symbols for, from `/proc/<pid>`.

use anyhow::{Context, Result};
use log::{debug, warn};
use std::fs;
use std::path::PathBuf;

use crate::domain::Pid;
use crate::probe::TargetBinaries;

/// File name prefixes of the C runtime (`libc.so.6`, `libc-2.28.so`)
const LIBC_PREFIXES: &[&str] = &["libc.so", "libc-"];

/// File name prefixes of the C++ runtime
const LIBCXX_PREFIXES: &[&str] = &["libstdc++.so"];

/// Resolve binary path from PID via `/proc/<pid>/exe`.
///
/// # Errors
/// Returns error if the process doesn't exist or `/proc/<pid>/exe` is not readable.
pub fn resolve_exe_path(pid: Pid) -> Result<PathBuf> {
    let exe_link = format!("/proc/{}/exe", pid.0);
    fs::read_link(&exe_link).with_context(|| format!("Cannot read {exe_link}"))
}

/// Resolve the executable and the runtime libraries mapped into `pid`.
///
/// # Errors
/// - `/proc/<pid>/exe` or `/proc/<pid>/maps` cannot be read
/// - No C runtime is mapped (the `malloc`/`free` probes would have nothing to attach to)
pub fn resolve_target_binaries(pid: Pid) -> Result<TargetBinaries> {
    let exec_path = resolve_exe_path(pid)?;

    let maps_path = format!("/proc/{}/maps", pid.0);
    let maps = fs::read_to_string(&maps_path).with_context(|| {
        format!(
            "Cannot read {maps_path}\n\n\
             This usually means:\n\
             - The process doesn't exist (check: ps -p {})\n\
             - Permission denied (run with sudo)",
            pid.0
        )
    })?;

    let libc_path = find_mapped_library(&maps, LIBC_PREFIXES).with_context(|| {
        format!("No C runtime (libc) mapped in process {}; is it statically linked?", pid.0)
    })?;
    let libcxx_path = find_mapped_library(&maps, LIBCXX_PREFIXES);
    if libcxx_path.is_none() {
        warn!("libstdc++ not mapped in process {}, C++ frames will not be symbolized", pid.0);
    }

    debug!("exec={} libc={} libstdc++={:?}", exec_path.display(), libc_path.display(), libcxx_path);
    Ok(TargetBinaries { exec_path, libc_path, libcxx_path })
}

/// First file-backed mapping whose file name starts with one of `prefixes`.
///
/// Lines look like `start-end perms offset dev inode pathname`.
#[must_use]
pub fn find_mapped_library(maps: &str, prefixes: &[&str]) -> Option<PathBuf> {
    maps.lines().filter_map(mapping_path).find_map(|path| {
        let name = path.rsplit('/').next()?;
        prefixes.iter().any(|p| name.starts_with(p)).then(|| PathBuf::from(path))
    })
}

fn mapping_path(line: &str) -> Option<&str> {
    let mut rest = line;
    for _ in 0..5 {
        rest = rest.trim_start();
        let end = rest.find(char::is_whitespace)?;
        rest = &rest[end..];
    }
    let path = rest.trim();
    let path = path.strip_suffix(" (deleted)").unwrap_or(path);
    path.starts_with('/').then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAPS: &str = "\
55d0c0a00000-55d0c0a01000 r--p 00000000 fd:01 393217                     /opt/app/server
7f3a1c000000-7f3a1c021000 rw-p 00000000 00:00 0
7f3a1d200000-7f3a1d3c5000 r-xp 00000000 fd:01 1049090                    /usr/lib64/libcrypto.so.1.1
7f3a1d400000-7f3a1d5b7000 r-xp 00000000 fd:01 1048612                    /usr/lib64/libc-2.28.so
7f3a1d800000-7f3a1d987000 r-xp 00000000 fd:01 1050001                    /usr/lib64/libstdc++.so.6.0.25
7ffd5d9f2000-7ffd5da13000 rw-p 00000000 00:00 0                          [stack]
";

    #[test]
    fn test_finds_libc_not_libcrypto() {
        assert_eq!(
            find_mapped_library(MAPS, LIBC_PREFIXES),
            Some(PathBuf::from("/usr/lib64/libc-2.28.so"))
        );
    }

    #[test]
    fn test_finds_libstdcxx() {
        assert_eq!(
            find_mapped_library(MAPS, LIBCXX_PREFIXES),
            Some(PathBuf::from("/usr/lib64/libstdc++.so.6.0.25"))
        );
    }

    #[test]
    fn test_modern_libc_name() {
        let maps = "7f00-7f10 r-xp 00000000 08:01 42 /lib/x86_64-linux-gnu/libc.so.6\n";
        assert_eq!(
            find_mapped_library(maps, LIBC_PREFIXES),
            Some(PathBuf::from("/lib/x86_64-linux-gnu/libc.so.6"))
        );
    }

    #[test]
    fn test_missing_library() {
        let maps = "7f00-7f10 r-xp 00000000 08:01 42 /opt/app/static-server\n";
        assert_eq!(find_mapped_library(maps, LIBCXX_PREFIXES), None);
    }

    #[test]
    fn test_anonymous_and_pseudo_mappings_are_skipped() {
        assert_eq!(mapping_path("7f00-7f10 rw-p 00000000 00:00 0"), None);
        assert_eq!(mapping_path("7ffd-7ffe rw-p 00000000 00:00 0   [stack]"), None);
        assert_eq!(
            mapping_path("7f00-7f10 r-xp 00000000 08:01 42   /tmp/my lib.so (deleted)"),
            Some("/tmp/my lib.so")
        );
    }

    #[test]
    fn test_resolve_own_process() {
        let pid = Pid(i32::try_from(std::process::id()).unwrap());
        assert!(resolve_exe_path(pid).unwrap().is_absolute());
    }

    #[test]
    fn test_resolve_missing_process() {
        assert!(resolve_target_binaries(Pid(999_999_999)).is_err());
    }
}
