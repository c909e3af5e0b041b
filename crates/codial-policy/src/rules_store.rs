//! User-managed rule list backed by `CODIAL.md`.
//!
//! Rules are free-form strings rendered as a markdown bullet list, 1-indexed
//! at the API surface. Each mutation rewrites the file atomically (temp file
//! in the same directory, fsync, rename, fsync parent) so a crash never
//! leaves a half-written rules file. Writers are serialized by a single
//! async lock; reads go straight to disk.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;

use crate::errors::PolicyError;

const FILE_HEADER: &str = "# CODIAL.md";
const LIST_HEADER: &str = "## Rules";

/// Append/remove/list store over the workspace `CODIAL.md`.
pub struct RulesStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl RulesStore {
    /// Create a store for the `CODIAL.md` under `workspace_root`.
    #[must_use]
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            path: workspace_root.into().join("CODIAL.md"),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current rules in file order.
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        read_rules(&self.path)
    }

    /// Append a rule and return the new list.
    ///
    /// Blank rules are ignored (the list is returned unchanged).
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Io`] when the rewrite fails.
    pub async fn append(&self, rule: &str) -> Result<Vec<String>, PolicyError> {
        let normalized = rule.trim();
        if normalized.is_empty() {
            return Ok(self.list());
        }

        let _guard = self.write_lock.lock().await;
        let mut rules = read_rules(&self.path);
        rules.push(normalized.to_owned());
        write_rules(&self.path, &rules)?;
        Ok(rules)
    }

    /// Remove the rule at a 1-based index and return the new list.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::IndexOutOfRange`] when `index` is `< 1` or
    /// greater than the list length; the file is untouched in that case.
    pub async fn remove(&self, index: usize) -> Result<Vec<String>, PolicyError> {
        let _guard = self.write_lock.lock().await;
        let mut rules = read_rules(&self.path);
        if index < 1 || index > rules.len() {
            return Err(PolicyError::IndexOutOfRange {
                index,
                len: rules.len(),
            });
        }
        let _ = rules.remove(index - 1);
        write_rules(&self.path, &rules)?;
        Ok(rules)
    }
}

/// Parse the bullet list out of the file; missing file means no rules.
fn read_rules(path: &Path) -> Vec<String> {
    let Ok(text) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    text.lines()
        .filter_map(|line| line.trim().strip_prefix("- ").map(|r| r.trim().to_owned()))
        .collect()
}

/// Render and atomically rewrite the rules file.
fn write_rules(path: &Path, rules: &[String]) -> Result<(), PolicyError> {
    let mut lines = vec![FILE_HEADER.to_owned(), String::new(), LIST_HEADER.to_owned(), String::new()];
    lines.extend(rules.iter().map(|rule| format!("- {rule}")));
    lines.push(String::new());
    atomic_write(path, lines.join("\n").as_bytes())?;
    Ok(())
}

/// Write via a uniquely-named temp file in the same directory, then rename.
fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| std::io::Error::other("path has no parent"))?;
    std::fs::create_dir_all(parent)?;

    let tmp_name = format!(
        ".{}.tmp-{}-{}",
        path.file_name().and_then(|v| v.to_str()).unwrap_or("rules"),
        std::process::id(),
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0),
    );
    let tmp_path = parent.join(tmp_name);

    {
        let mut file = std::fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&tmp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
    }

    std::fs::rename(&tmp_path, path)?;
    sync_parent_dir(parent)
}

#[cfg(unix)]
fn sync_parent_dir(parent: &Path) -> std::io::Result<()> {
    std::fs::File::open(parent)?.sync_all()
}

#[cfg(not(unix))]
fn sync_parent_dir(_parent: &Path) -> std::io::Result<()> {
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn list_empty_when_missing() {
        let ws = TempDir::new().unwrap();
        let store = RulesStore::new(ws.path());
        assert!(store.list().is_empty());
    }

    #[tokio::test]
    async fn append_then_list_roundtrips() {
        let ws = TempDir::new().unwrap();
        let store = RulesStore::new(ws.path());

        let rules = store.append("Always run tests").await.unwrap();
        assert_eq!(rules, vec!["Always run tests"]);
        assert_eq!(store.list(), vec!["Always run tests"]);
    }

    #[tokio::test]
    async fn append_preserves_order() {
        let ws = TempDir::new().unwrap();
        let store = RulesStore::new(ws.path());

        let _ = store.append("A").await.unwrap();
        let rules = store.append("B").await.unwrap();
        assert_eq!(rules, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn blank_append_is_noop() {
        let ws = TempDir::new().unwrap();
        let store = RulesStore::new(ws.path());
        let _ = store.append("A").await.unwrap();
        let rules = store.append("   ").await.unwrap();
        assert_eq!(rules, vec!["A"]);
    }

    #[tokio::test]
    async fn remove_is_one_indexed() {
        let ws = TempDir::new().unwrap();
        let store = RulesStore::new(ws.path());
        let _ = store.append("A").await.unwrap();
        let _ = store.append("B").await.unwrap();

        let rules = store.remove(1).await.unwrap();
        assert_eq!(rules, vec!["B"]);
    }

    #[tokio::test]
    async fn remove_out_of_range_fails_and_preserves_file() {
        let ws = TempDir::new().unwrap();
        let store = RulesStore::new(ws.path());
        let _ = store.append("A").await.unwrap();

        let err = store.remove(5).await.unwrap_err();
        assert!(matches!(err, PolicyError::IndexOutOfRange { index: 5, len: 1 }));
        assert_eq!(store.list(), vec!["A"]);

        let err = store.remove(0).await.unwrap_err();
        assert!(matches!(err, PolicyError::IndexOutOfRange { index: 0, .. }));
    }

    #[tokio::test]
    async fn file_is_markdown_with_headers() {
        let ws = TempDir::new().unwrap();
        let store = RulesStore::new(ws.path());
        let _ = store.append("Keep functions small").await.unwrap();

        let text = std::fs::read_to_string(store.path()).unwrap();
        assert!(text.starts_with("# CODIAL.md"));
        assert!(text.contains("## Rules"));
        assert!(text.contains("- Keep functions small"));
    }

    #[tokio::test]
    async fn no_temp_files_left_behind() {
        let ws = TempDir::new().unwrap();
        let store = RulesStore::new(ws.path());
        let _ = store.append("A").await.unwrap();
        let _ = store.remove(1).await.unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(ws.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn scenario_append_append_remove() {
        // append "A", append "B", remove 1 → ["B"]; remove 5 → out of range
        let ws = TempDir::new().unwrap();
        let store = RulesStore::new(ws.path());
        let _ = store.append("A").await.unwrap();
        let _ = store.append("B").await.unwrap();
        assert_eq!(store.remove(1).await.unwrap(), vec!["B"]);
        assert!(store.remove(5).await.is_err());
    }

    #[tokio::test]
    async fn concurrent_appends_all_land() {
        use std::sync::Arc;
        let ws = TempDir::new().unwrap();
        let store = Arc::new(RulesStore::new(ws.path()));

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.append(&format!("rule-{i}")).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.list().len(), 8);
    }
}
