//! Stale spool file cleanup, called from the session reaper.

use log::{debug, warn};
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

/// Delete spooled files in `dir` whose last modification is older than
/// `max_age`. Returns the number of files removed; failures on individual
/// files are logged and skipped so one bad entry cannot wedge the reaper.
pub fn delete_stale_files(dir: &Path, max_age: Duration) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    let now = SystemTime::now();
    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let stale = entry
            .metadata()
            .and_then(|md| md.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .map(|age| age > max_age)
            .unwrap_or(false);
        if !stale {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("reaped stale spool file {}", path.display());
                removed += 1;
            }
            Err(e) => warn!("could not remove stale spool file {}: {}", path.display(), e),
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_only_stale_files_removed() {
        let tmp = TempDir::new().unwrap();
        let old = tmp.path().join("old.blob");
        let fresh = tmp.path().join("fresh.blob");
        File::create(&old).unwrap().write_all(b"x").unwrap();
        File::create(&fresh).unwrap().write_all(b"y").unwrap();

        // Backdate the old file.
        let past = SystemTime::now() - Duration::from_secs(3600);
        let times = fs::FileTimes::new().set_modified(past);
        File::options()
            .write(true)
            .open(&old)
            .unwrap()
            .set_times(times)
            .unwrap();

        let removed = delete_stale_files(tmp.path(), Duration::from_secs(600));
        assert_eq!(removed, 1);
        assert!(!old.exists());
        assert!(fresh.exists());
    }

    #[test]
    fn test_missing_directory_is_noop() {
        let tmp = TempDir::new().unwrap();
        let gone = tmp.path().join("nope");
        assert_eq!(delete_stale_files(&gone, Duration::from_secs(1)), 0);
    }
}
