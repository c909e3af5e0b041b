//! Read-before-edit tracking.
//!
//! `file_read` records the mtime it saw for each file; `hashline_edit`
//! refuses to touch a file that was never read, or that changed on disk
//! since the last read. The model must re-read after any modification,
//! which keeps its hash anchors honest.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use parking_lot::Mutex;

/// Shared map of file path → mtime observed at the last `file_read`.
#[derive(Default)]
pub struct ReadTracker {
    reads: Mutex<HashMap<PathBuf, SystemTime>>,
}

impl ReadTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `path` was read with the given mtime.
    pub fn record_read(&self, path: &Path, mtime: SystemTime) {
        let _ = self.reads.lock().insert(path.to_owned(), mtime);
    }

    /// Why an edit of `path` must be denied, or `None` when it may proceed.
    ///
    /// `current_mtime` is the file's mtime right now; a mismatch with the
    /// recorded one means the file changed since the last read.
    #[must_use]
    pub fn edit_denial(&self, path: &Path, current_mtime: SystemTime) -> Option<String> {
        match self.reads.lock().get(path) {
            None => Some(format!(
                "`{}` must be read with file_read before it can be edited",
                path.display()
            )),
            Some(seen) if *seen != current_mtime => Some(format!(
                "`{}` changed since the last file_read; read it again before editing",
                path.display()
            )),
            Some(_) => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn path() -> PathBuf {
        PathBuf::from("/ws/a.rs")
    }

    #[test]
    fn unread_file_is_denied() {
        let tracker = ReadTracker::new();
        let denial = tracker.edit_denial(&path(), SystemTime::UNIX_EPOCH);
        assert!(denial.unwrap().contains("file_read"));
    }

    #[test]
    fn read_file_is_allowed() {
        let tracker = ReadTracker::new();
        let mtime = SystemTime::UNIX_EPOCH;
        tracker.record_read(&path(), mtime);
        assert!(tracker.edit_denial(&path(), mtime).is_none());
    }

    #[test]
    fn stale_read_is_denied() {
        let tracker = ReadTracker::new();
        let read_at = SystemTime::UNIX_EPOCH;
        tracker.record_read(&path(), read_at);

        let changed = read_at + Duration::from_secs(5);
        let denial = tracker.edit_denial(&path(), changed);
        assert!(denial.unwrap().contains("changed since"));
    }

    #[test]
    fn rereading_refreshes_the_record() {
        let tracker = ReadTracker::new();
        let first = SystemTime::UNIX_EPOCH;
        let second = first + Duration::from_secs(5);

        tracker.record_read(&path(), first);
        tracker.record_read(&path(), second);
        assert!(tracker.edit_denial(&path(), second).is_none());
    }
}
