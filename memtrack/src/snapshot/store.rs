//! # Snapshot Store
//!
//! Persists a [`Snapshot`] as one gzip-compressed JSON document:
//!
//! ```text
//! { "format_version": 1, "snapshot": { "malloc_stats": {..}, "free_stats": {..}, "live": {..} } }
//! ```
//!
//! Saving writes a sibling `*.tmp` file and renames it over the destination,
//! so a failed save never leaves a half-written snapshot under the final
//! name.

use chrono::Local;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use super::Snapshot;
use crate::domain::{Pid, SnapshotError};

/// Bumped whenever the serialized layout changes
pub const FORMAT_VERSION: u32 = 1;

/// File extension of saved snapshots
pub const SNAPSHOT_EXTENSION: &str = "track";

#[derive(Serialize)]
struct SnapshotFileRef<'a> {
    format_version: u32,
    snapshot: &'a Snapshot,
}

#[derive(Deserialize)]
struct SnapshotFile {
    format_version: u32,
    snapshot: Snapshot,
}

/// Default snapshot name: `<YYYYmmddHHMMSS>-<pid>.track`
#[must_use]
pub fn default_snapshot_path(pid: Pid) -> PathBuf {
    PathBuf::from(format!(
        "{}-{}.{SNAPSHOT_EXTENSION}",
        Local::now().format("%Y%m%d%H%M%S"),
        pid.0
    ))
}

/// Save `snapshot` to `path`, or to [`default_snapshot_path`] when `None`.
///
/// Returns the path actually written.
///
/// # Errors
/// - [`SnapshotError::Io`] if the file cannot be created, written or renamed
/// - [`SnapshotError::Codec`] if serialization fails
pub fn save(snapshot: &Snapshot, path: Option<&Path>, pid: Pid) -> Result<PathBuf, SnapshotError> {
    let path = path.map_or_else(|| default_snapshot_path(pid), Path::to_path_buf);
    let tmp_path = tmp_path_for(&path);

    debug!(
        "Saving snapshot ({} malloc sites, {} free sites, {} live) to {}",
        snapshot.malloc_stats.len(),
        snapshot.free_stats.len(),
        snapshot.live.len(),
        path.display()
    );

    if let Err(err) = write_file(snapshot, &tmp_path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    fs::rename(&tmp_path, &path).map_err(|source| {
        let _ = fs::remove_file(&tmp_path);
        SnapshotError::Io { path: path.clone(), source }
    })?;

    info!("Snapshot written to {}", path.display());
    Ok(path)
}

/// Load a snapshot previously written by [`save`].
///
/// # Errors
/// - [`SnapshotError::Io`] if the file cannot be opened
/// - [`SnapshotError::Codec`] if the payload is malformed or truncated
/// - [`SnapshotError::UnsupportedVersion`] if it was written by an
///   incompatible format version
pub fn load(path: impl AsRef<Path>) -> Result<Snapshot, SnapshotError> {
    let path = path.as_ref();
    let file =
        File::open(path).map_err(|source| SnapshotError::Io { path: path.to_path_buf(), source })?;

    let reader = BufReader::new(GzDecoder::new(BufReader::new(file)));
    let decoded: SnapshotFile = serde_json::from_reader(reader)?;

    if decoded.format_version != FORMAT_VERSION {
        return Err(SnapshotError::UnsupportedVersion {
            found: decoded.format_version,
            expected: FORMAT_VERSION,
        });
    }
    Ok(decoded.snapshot)
}

fn write_file(snapshot: &Snapshot, path: &Path) -> Result<(), SnapshotError> {
    let io_err = |source| SnapshotError::Io { path: path.to_path_buf(), source };

    let file = File::create(path).map_err(io_err)?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    serde_json::to_writer(
        &mut encoder,
        &SnapshotFileRef { format_version: FORMAT_VERSION, snapshot },
    )?;

    let mut writer = encoder.finish().map_err(io_err)?;
    writer.flush().map_err(io_err)?;
    writer.get_ref().sync_all().map_err(io_err)?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(std::ffi::OsStr::to_os_string).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
