//! Retention sweep over the shared jobs directory.
//!
//! Deletes files whose age exceeds the retention horizon, then prunes
//! directories the deletions emptied. The sweep is idempotent and
//! tolerant of races with live submissions: a file vanishing underneath
//! it or a directory gaining a fresh upload mid-sweep are non-errors.

use std::path::Path;
use std::time::{Duration, SystemTime};

use serde::Serialize;
use walkdir::WalkDir;

/// What one sweep removed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub files_removed: u64,
    pub dirs_removed: u64,
}

/// Sweep `root`, removing files older than `horizon` and any directory
/// left empty. `root` itself is never removed. A missing `root` is an
/// empty sweep, not an error.
pub fn sweep(root: &Path, horizon: Duration) -> SweepReport {
    let mut report = SweepReport::default();
    let now = SystemTime::now();

    // contents_first yields children before their parent, so a
    // directory emptied by this pass is removable in the same pass.
    for entry in WalkDir::new(root).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                // Already-gone entries are the expected race; anything
                // else is worth a log line but never aborts the sweep.
                if !is_not_found(&e) {
                    tracing::warn!(error = %e, "Sweep cannot read entry");
                }
                continue;
            }
        };
        let path = entry.path();

        if entry.file_type().is_dir() {
            if path == root {
                continue;
            }
            // Fails while non-empty, which is exactly the contract:
            // only directories this sweep emptied (or found empty) go.
            if std::fs::remove_dir(path).is_ok() {
                report.dirs_removed += 1;
                tracing::debug!(path = %path.display(), "Removed empty directory");
            }
            continue;
        }

        let age = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .and_then(|modified| now.duration_since(modified).ok());
        let Some(age) = age else {
            continue;
        };

        if age >= horizon {
            match std::fs::remove_file(path) {
                Ok(()) => {
                    report.files_removed += 1;
                    tracing::debug!(path = %path.display(), "Removed expired file");
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Sweep cannot remove file");
                }
            }
        }
    }

    report
}

fn is_not_found(e: &walkdir::Error) -> bool {
    e.io_error()
        .map(|io| io.kind() == std::io::ErrorKind::NotFound)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG: Duration = Duration::from_secs(60 * 60);
    const NOW: Duration = Duration::ZERO;

    #[test]
    fn expired_files_and_emptied_dirs_are_removed() {
        let root = tempfile::tempdir().unwrap();
        let job_dir = root.path().join("some-job");
        std::fs::create_dir(&job_dir).unwrap();
        std::fs::write(job_dir.join("content.png"), b"x").unwrap();
        std::fs::write(job_dir.join("result.jpg"), b"y").unwrap();

        // Zero horizon: everything just written is already expired.
        let report = sweep(root.path(), NOW);
        assert_eq!(
            report,
            SweepReport {
                files_removed: 2,
                dirs_removed: 1
            }
        );
        assert!(root.path().exists());
        assert!(!job_dir.exists());
    }

    #[test]
    fn fresh_files_survive() {
        let root = tempfile::tempdir().unwrap();
        let job_dir = root.path().join("some-job");
        std::fs::create_dir(&job_dir).unwrap();
        std::fs::write(job_dir.join("content.png"), b"x").unwrap();

        let report = sweep(root.path(), LONG);
        assert_eq!(report, SweepReport::default());
        assert!(job_dir.join("content.png").exists());
    }

    #[test]
    fn directory_with_surviving_file_is_kept() {
        let root = tempfile::tempdir().unwrap();
        let job_dir = root.path().join("some-job");
        std::fs::create_dir(&job_dir).unwrap();
        std::fs::write(job_dir.join("content.png"), b"x").unwrap();

        sweep(root.path(), LONG);
        assert!(job_dir.exists());
    }

    #[test]
    fn missing_root_is_an_empty_sweep() {
        let root = tempfile::tempdir().unwrap();
        let gone = root.path().join("never-created");
        assert_eq!(sweep(&gone, NOW), SweepReport::default());
    }

    #[test]
    fn sweep_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("old.png"), b"x").unwrap();

        let first = sweep(root.path(), NOW);
        assert_eq!(first.files_removed, 1);
        assert_eq!(sweep(root.path(), NOW), SweepReport::default());
    }

    #[test]
    fn nested_empty_directories_are_pruned_bottom_up() {
        let root = tempfile::tempdir().unwrap();
        let deep = root.path().join("a").join("b").join("c");
        std::fs::create_dir_all(&deep).unwrap();
        std::fs::write(deep.join("old.png"), b"x").unwrap();

        let report = sweep(root.path(), NOW);
        assert_eq!(report.files_removed, 1);
        assert_eq!(report.dirs_removed, 3);
        assert!(!root.path().join("a").exists());
    }
}
