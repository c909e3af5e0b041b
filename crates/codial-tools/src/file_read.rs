//! File read tool.
//!
//! Emits hashline output so every line carries an edit anchor, records the
//! file's mtime in the [`ReadTracker`] (the edit tool requires a prior
//! read), and lists directories when given one.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::hashline::tag_lines;
use crate::tool::{required_str, Tool, ToolOutcome};
use crate::tracker::ReadTracker;

/// Default and maximum lines returned per call.
const MAX_LINES: usize = 2000;
/// Cap on bytes decoded from one file.
const MAX_BYTES: usize = 500_000;

/// Reads file contents in hashline format, or lists a directory.
pub struct FileReadTool {
    workspace_root: PathBuf,
    reads: Arc<ReadTracker>,
    max_lines: usize,
    max_bytes: usize,
}

impl FileReadTool {
    /// Create the tool; reads are recorded into the shared tracker.
    #[must_use]
    pub fn new(workspace_root: impl Into<PathBuf>, reads: Arc<ReadTracker>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            reads,
            max_lines: MAX_LINES,
            max_bytes: MAX_BYTES,
        }
    }
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read a file in hashline format (lineno:tag| content); each line carries a short content tag used as an anchor by hashline_edit. A directory path returns a listing. offset/limit select a range."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File or directory to read; absolute, or relative to the workspace root."
                },
                "offset": {
                    "type": "integer",
                    "description": "First line to read (1-indexed); defaults to 1."
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum lines to read; defaults to 2000."
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, arguments: &Value) -> ToolOutcome {
        let raw_path = match required_str(arguments, "path") {
            Ok(path) => path,
            Err(outcome) => return outcome,
        };

        let target = resolve_in_workspace(&self.workspace_root, raw_path);
        if !target.exists() {
            return ToolOutcome::failure(format!("no such path: {}", target.display()));
        }

        if target.is_dir() {
            return read_directory(&target);
        }
        self.read_file(&target, arguments)
    }
}

impl FileReadTool {
    fn read_file(&self, target: &Path, arguments: &Value) -> ToolOutcome {
        let offset = positive_int(arguments, "offset").unwrap_or(1);
        let limit = positive_int(arguments, "limit")
            .unwrap_or(self.max_lines)
            .min(self.max_lines);

        let raw = match std::fs::read(target) {
            Ok(raw) => raw,
            Err(e) => return ToolOutcome::failure(format!("failed to read the file: {e}")),
        };

        if let Ok(metadata) = std::fs::metadata(target) {
            if let Ok(mtime) = metadata.modified() {
                self.reads.record_read(target, mtime);
            }
        }

        let truncated = raw.len() > self.max_bytes;
        let text = String::from_utf8_lossy(&raw[..raw.len().min(self.max_bytes)]).into_owned();
        let all_lines: Vec<&str> = text.lines().collect();
        let total_lines = all_lines.len();

        let start = offset - 1;
        let selected: Vec<&str> = all_lines
            .into_iter()
            .skip(start)
            .take(limit)
            .collect();
        let lines_returned = selected.len();

        ToolOutcome::success(tag_lines(&selected, offset).join("\n"))
            .with_meta("type", "file")
            .with_meta("total_lines", total_lines)
            .with_meta("offset", offset)
            .with_meta("lines_returned", lines_returned)
            .with_meta("byte_count", raw.len())
            .with_meta("truncated", truncated)
    }
}

/// List a directory: directories first, `/`-suffixed, then files.
fn read_directory(target: &Path) -> ToolOutcome {
    let entries = match std::fs::read_dir(target) {
        Ok(read_dir) => read_dir,
        Err(e) => return ToolOutcome::failure(format!("failed to list the directory: {e}")),
    };

    let mut rows: Vec<(bool, String)> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| {
            let is_dir = entry.path().is_dir();
            let name = entry.file_name().to_string_lossy().into_owned();
            (is_dir, name)
        })
        .collect();
    rows.sort_by(|a, b| (!a.0, &a.1).cmp(&(!b.0, &b.1)));

    let entry_count = rows.len();
    let listing: Vec<String> = rows
        .into_iter()
        .map(|(is_dir, name)| if is_dir { format!("{name}/") } else { name })
        .collect();

    ToolOutcome::success(listing.join("\n"))
        .with_meta("type", "directory")
        .with_meta("entry_count", entry_count)
}

/// Resolve a possibly-relative path under the workspace root.
pub(crate) fn resolve_in_workspace(workspace_root: &Path, raw: &str) -> PathBuf {
    let candidate = PathBuf::from(raw);
    if candidate.is_absolute() {
        candidate
    } else {
        workspace_root.join(candidate)
    }
}

/// Read a positive integer argument.
fn positive_int(arguments: &Value, key: &str) -> Option<usize> {
    arguments
        .get(key)
        .and_then(Value::as_u64)
        .filter(|n| *n >= 1)
        .map(|n| n as usize)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tool(ws: &TempDir) -> FileReadTool {
        FileReadTool::new(ws.path(), Arc::new(ReadTracker::new()))
    }

    #[tokio::test]
    async fn reads_file_in_hashline_format() {
        let ws = TempDir::new().unwrap();
        std::fs::write(ws.path().join("a.txt"), "first\nsecond\n").unwrap();

        let outcome = tool(&ws).execute(&json!({"path": "a.txt"})).await;
        assert!(outcome.ok);
        let lines: Vec<&str> = outcome.output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("1:"));
        assert!(lines[0].ends_with("| first"));
        assert!(lines[1].starts_with("2:"));
        assert_eq!(outcome.metadata["total_lines"], 2);
    }

    #[tokio::test]
    async fn offset_and_limit_select_range() {
        let ws = TempDir::new().unwrap();
        std::fs::write(ws.path().join("a.txt"), "l1\nl2\nl3\nl4\n").unwrap();

        let outcome = tool(&ws)
            .execute(&json!({"path": "a.txt", "offset": 2, "limit": 2}))
            .await;
        let lines: Vec<&str> = outcome.output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("2:"));
        assert!(lines[0].ends_with("| l2"));
        assert_eq!(outcome.metadata["lines_returned"], 2);
        assert_eq!(outcome.metadata["offset"], 2);
    }

    #[tokio::test]
    async fn directory_listing_dirs_first() {
        let ws = TempDir::new().unwrap();
        std::fs::create_dir(ws.path().join("zdir")).unwrap();
        std::fs::write(ws.path().join("afile.txt"), "x").unwrap();

        let outcome = tool(&ws).execute(&json!({"path": "."})).await;
        assert!(outcome.ok);
        let lines: Vec<&str> = outcome.output.lines().collect();
        assert_eq!(lines, vec!["zdir/", "afile.txt"]);
        assert_eq!(outcome.metadata["type"], "directory");
    }

    #[tokio::test]
    async fn missing_path_fails() {
        let ws = TempDir::new().unwrap();
        let outcome = tool(&ws).execute(&json!({"path": "ghost.txt"})).await;
        assert!(!outcome.ok);
        assert!(outcome.error.contains("no such path"));
    }

    #[tokio::test]
    async fn read_records_mtime_for_edit_gate() {
        let ws = TempDir::new().unwrap();
        let file = ws.path().join("a.txt");
        std::fs::write(&file, "content\n").unwrap();

        let reads = Arc::new(ReadTracker::new());
        let tool = FileReadTool::new(ws.path(), reads.clone());
        let _ = tool.execute(&json!({"path": "a.txt"})).await;

        let mtime = std::fs::metadata(&file).unwrap().modified().unwrap();
        assert!(reads.edit_denial(&file, mtime).is_none());
    }

    #[tokio::test]
    async fn absolute_path_bypasses_workspace_join() {
        let ws = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let file = other.path().join("elsewhere.txt");
        std::fs::write(&file, "remote\n").unwrap();

        let outcome = tool(&ws)
            .execute(&json!({"path": file.to_str().unwrap()}))
            .await;
        assert!(outcome.ok);
        assert!(outcome.output.contains("remote"));
    }
}
