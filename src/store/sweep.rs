//! Age-based eviction of media directories.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::tile_store::{remove_dir_if_exists, TileStore};

/// A media directory the sweep could not process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepFailure {
    pub path: PathBuf,
    pub message: String,
}

/// Outcome of one eviction sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Whether anything was actually deleted
    pub dry_run: bool,

    /// Directories deleted (or that would be deleted in dry-run mode)
    pub deleted: Vec<PathBuf>,

    /// Number of directories kept
    pub kept: usize,

    /// Bytes freed (or that would be freed)
    pub bytes_freed: u64,

    /// Bytes held by kept directories
    pub bytes_kept: u64,

    /// Directories that failed to scan or delete; they count as kept
    pub errors: Vec<SweepFailure>,
}

/// Size and most recent use of one media directory.
struct DirUsage {
    bytes: u64,
    last_used: SystemTime,
}

impl TileStore {
    /// Delete media directories unused for longer than `max_age`.
    ///
    /// A directory's last use is the newest access or modification time of
    /// any file inside it. Failures on one directory are recorded in the
    /// report and the sweep moves on.
    pub fn sweep(&self, max_age: Duration, dry_run: bool) -> SweepReport {
        self.sweep_at(max_age, dry_run, SystemTime::now())
    }

    /// [`TileStore::sweep`] against an explicit clock.
    pub fn sweep_at(&self, max_age: Duration, dry_run: bool, now: SystemTime) -> SweepReport {
        let mut report = SweepReport {
            dry_run,
            ..SweepReport::default()
        };

        let mut dirs: Vec<PathBuf> = match fs::read_dir(self.root()) {
            Ok(entries) => entries
                .filter_map(Result::ok)
                .map(|entry| entry.path())
                .filter(|path| path.is_dir())
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return report,
            Err(e) => {
                report.errors.push(SweepFailure {
                    path: self.root().to_path_buf(),
                    message: e.to_string(),
                });
                return report;
            }
        };
        dirs.sort();

        for dir in dirs {
            let usage = match dir_usage(&dir) {
                Ok(usage) => usage,
                Err(message) => {
                    warn!(path = %dir.display(), %message, "failed to scan media directory");
                    report.kept += 1;
                    report.errors.push(SweepFailure { path: dir, message });
                    continue;
                }
            };

            let age = now
                .duration_since(usage.last_used)
                .unwrap_or(Duration::ZERO);
            if age <= max_age {
                report.kept += 1;
                report.bytes_kept += usage.bytes;
                continue;
            }

            if dry_run {
                debug!(path = %dir.display(), bytes = usage.bytes, "would evict");
            } else if let Err(e) = remove_dir_if_exists(&dir) {
                warn!(path = %dir.display(), error = %e, "failed to evict media directory");
                report.kept += 1;
                report.bytes_kept += usage.bytes;
                report.errors.push(SweepFailure {
                    path: dir,
                    message: e.to_string(),
                });
                continue;
            }

            report.bytes_freed += usage.bytes;
            report.deleted.push(dir);
        }

        if !dry_run && !report.deleted.is_empty() {
            self.invalidate_all();
        }

        info!(
            dry_run,
            deleted = report.deleted.len(),
            kept = report.kept,
            bytes_freed = report.bytes_freed,
            errors = report.errors.len(),
            "store sweep finished"
        );
        report
    }
}

fn dir_usage(dir: &Path) -> Result<DirUsage, String> {
    let mut bytes = 0;
    let mut last_used: Option<SystemTime> = None;

    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(|e| e.to_string())?;
        if !entry.file_type().is_file() {
            continue;
        }
        let meta = entry.metadata().map_err(|e| e.to_string())?;
        bytes += meta.len();

        let used = [meta.modified().ok(), meta.accessed().ok()]
            .into_iter()
            .flatten()
            .max();
        last_used = last_used.max(used);
    }

    let last_used = match last_used {
        Some(time) => time,
        None => fs::metadata(dir)
            .and_then(|meta| meta.modified())
            .map_err(|e| e.to_string())?,
    };

    Ok(DirUsage { bytes, last_used })
}
