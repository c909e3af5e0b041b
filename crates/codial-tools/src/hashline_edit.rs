//! Hashline-anchored file editing.
//!
//! Replaces or inserts line ranges addressed by the content tags that
//! `file_read` emits, instead of string replacement. The flow:
//!
//! 1. `file_read` the file and note each line's tag (required).
//! 2. Name the range with `start_hash`/`end_hash`, or an insertion point
//!    with `insert_after_hash`.
//! 3. The range is swapped for `new_content` (empty deletes it).
//!
//! Editing without a prior read, or after the file changed on disk, is
//! refused; the model must `file_read` again.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::file_read::resolve_in_workspace;
use crate::hashline::{resolve_tag, tag_index, tag_lines};
use crate::tool::{optional_str, required_str, Tool, ToolOutcome};
use crate::tracker::ReadTracker;

/// Context lines shown around the change in the preview.
const PREVIEW_CONTEXT: usize = 2;

/// Replaces or inserts line ranges by hash anchor.
pub struct HashlineEditTool {
    workspace_root: PathBuf,
    reads: Arc<ReadTracker>,
}

impl HashlineEditTool {
    /// Create the tool; edits are gated on the shared read tracker.
    #[must_use]
    pub fn new(workspace_root: impl Into<PathBuf>, reads: Arc<ReadTracker>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            reads,
        }
    }
}

#[async_trait]
impl Tool for HashlineEditTool {
    fn name(&self) -> &str {
        "hashline_edit"
    }

    fn description(&self) -> &str {
        "Edit a file using the hash anchors from file_read's lineno:tag| output. The file must have been read with file_read first, and re-read after any change. start_hash..end_hash is replaced by new_content (equal hashes edit one line; empty new_content deletes the range); insert_after_hash inserts new lines after the anchored line instead."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File to edit."
                },
                "start_hash": {
                    "type": "string",
                    "description": "Tag of the first line to replace (from file_read's lineno:tag| output)."
                },
                "end_hash": {
                    "type": "string",
                    "description": "Tag of the last line to replace; equal to start_hash for a single line."
                },
                "new_content": {
                    "type": "string",
                    "description": "Replacement text; empty deletes the range."
                },
                "insert_after_hash": {
                    "type": "string",
                    "description": "Insert new_content after this line instead of replacing a range."
                },
                "start_lineno": {
                    "type": "integer",
                    "description": "1-indexed line hint to disambiguate a repeated start tag."
                },
                "end_lineno": {
                    "type": "integer",
                    "description": "1-indexed line hint to disambiguate a repeated end tag."
                }
            },
            "required": ["path", "new_content"]
        })
    }

    async fn execute(&self, arguments: &Value) -> ToolOutcome {
        let raw_path = match required_str(arguments, "path") {
            Ok(path) => path,
            Err(outcome) => return outcome,
        };
        let Some(new_content) = arguments.get("new_content").and_then(Value::as_str) else {
            return ToolOutcome::failure("the `new_content` argument is required");
        };

        let target = resolve_in_workspace(&self.workspace_root, raw_path);
        if !target.is_file() {
            return ToolOutcome::failure(format!("no such file: {}", target.display()));
        }

        // Read gate: only files read through file_read (and unchanged
        // since) may be edited.
        match std::fs::metadata(&target).and_then(|m| m.modified()) {
            Ok(mtime) => {
                if let Some(denial) = self.reads.edit_denial(&target, mtime) {
                    return ToolOutcome::failure(denial);
                }
            }
            Err(e) => return ToolOutcome::failure(format!("failed to stat the file: {e}")),
        }

        let content = match std::fs::read_to_string(&target) {
            Ok(content) => content,
            Err(e) => return ToolOutcome::failure(format!("failed to read the file: {e}")),
        };
        let lines: Vec<&str> = content.lines().collect();
        let index = tag_index(&lines);

        let edit = if let Some(anchor) = optional_str(arguments, "insert_after_hash") {
            let hint = lineno_hint(arguments, "start_lineno");
            let Some(at) = resolve_tag(anchor, &index, hint) else {
                return ToolOutcome::failure(format!(
                    "no line matches insert_after_hash `{anchor}`"
                ));
            };
            Edit {
                start: at + 1,
                replaced: 0,
                action: "inserted",
            }
        } else {
            let Some(start_tag) = optional_str(arguments, "start_hash") else {
                return ToolOutcome::failure(
                    "the `start_hash` argument is required (use insert_after_hash for inserts)",
                );
            };
            let Some(end_tag) = optional_str(arguments, "end_hash") else {
                return ToolOutcome::failure("the `end_hash` argument is required");
            };

            let Some(start) = resolve_tag(start_tag, &index, lineno_hint(arguments, "start_lineno"))
            else {
                return ToolOutcome::failure(format!("no line matches start_hash `{start_tag}`"));
            };
            let Some(end) = resolve_tag(end_tag, &index, lineno_hint(arguments, "end_lineno")) else {
                return ToolOutcome::failure(format!("no line matches end_hash `{end_tag}`"));
            };

            let (start, end) = if start <= end { (start, end) } else { (end, start) };
            Edit {
                start,
                replaced: end - start + 1,
                action: if new_content.is_empty() { "deleted" } else { "replaced" },
            }
        };

        apply_edit(&target, &lines, new_content, &edit)
    }
}

/// A resolved edit: splice point, lines removed, and the action label.
struct Edit {
    start: usize,
    replaced: usize,
    action: &'static str,
}

fn lineno_hint(arguments: &Value, key: &str) -> Option<usize> {
    arguments
        .get(key)
        .and_then(Value::as_u64)
        .filter(|n| *n >= 1)
        .map(|n| (n - 1) as usize)
}

/// Splice the edit into the file and report a tagged preview.
fn apply_edit(target: &Path, lines: &[&str], new_content: &str, edit: &Edit) -> ToolOutcome {
    let new_lines: Vec<&str> = if new_content.is_empty() {
        Vec::new()
    } else {
        new_content.lines().collect()
    };
    let inserted = new_lines.len();

    let mut result: Vec<&str> = Vec::with_capacity(lines.len() - edit.replaced + inserted);
    result.extend_from_slice(&lines[..edit.start]);
    result.extend_from_slice(&new_lines);
    result.extend_from_slice(&lines[edit.start + edit.replaced..]);

    let mut text = result.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    if let Err(e) = std::fs::write(target, &text) {
        return ToolOutcome::failure(format!("failed to write the file: {e}"));
    }

    let affected = edit.replaced.max(inserted);
    let preview_start = edit.start.saturating_sub(PREVIEW_CONTEXT);
    let preview_end = (edit.start + inserted + PREVIEW_CONTEXT).min(result.len());
    let preview = tag_lines(&result[preview_start..preview_end], preview_start + 1);

    ToolOutcome::success(format!(
        "{} {affected} line(s).\n--- preview after change ---\n{}",
        edit.action,
        preview.join("\n"),
    ))
    .with_meta("action", edit.action)
    .with_meta("affected_start", edit.start + 1)
    .with_meta("affected_count", affected)
    .with_meta("total_lines", result.len())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_read::FileReadTool;
    use crate::hashline::line_tag;
    use tempfile::TempDir;

    /// Build the read/edit pair over one tracker, write the file, and read
    /// it so the edit gate is open.
    async fn setup(content: &str) -> (TempDir, HashlineEditTool) {
        let ws = TempDir::new().unwrap();
        std::fs::write(ws.path().join("code.rs"), content).unwrap();

        let reads = Arc::new(ReadTracker::new());
        let reader = FileReadTool::new(ws.path(), reads.clone());
        let read = reader.execute(&json!({"path": "code.rs"})).await;
        assert!(read.ok);

        let editor = HashlineEditTool::new(ws.path(), reads);
        (ws, editor)
    }

    #[tokio::test]
    async fn replaces_single_line() {
        let (ws, editor) = setup("fn a() {}\nfn b() {}\nfn c() {}\n").await;
        let tag = line_tag("fn b() {}");

        let outcome = editor
            .execute(&json!({
                "path": "code.rs",
                "start_hash": tag,
                "end_hash": tag,
                "new_content": "fn b_new() {}"
            }))
            .await;
        assert!(outcome.ok, "{}", outcome.error);
        assert_eq!(
            std::fs::read_to_string(ws.path().join("code.rs")).unwrap(),
            "fn a() {}\nfn b_new() {}\nfn c() {}\n"
        );
        assert_eq!(outcome.metadata["action"], "replaced");
    }

    #[tokio::test]
    async fn replaces_multi_line_range() {
        let (ws, editor) = setup("one\ntwo\nthree\nfour\n").await;

        let outcome = editor
            .execute(&json!({
                "path": "code.rs",
                "start_hash": line_tag("two"),
                "end_hash": line_tag("three"),
                "new_content": "middle"
            }))
            .await;
        assert!(outcome.ok);
        assert_eq!(
            std::fs::read_to_string(ws.path().join("code.rs")).unwrap(),
            "one\nmiddle\nfour\n"
        );
    }

    #[tokio::test]
    async fn empty_content_deletes_range() {
        let (ws, editor) = setup("keep\ndrop\nkeep2\n").await;

        let outcome = editor
            .execute(&json!({
                "path": "code.rs",
                "start_hash": line_tag("drop"),
                "end_hash": line_tag("drop"),
                "new_content": ""
            }))
            .await;
        assert!(outcome.ok);
        assert_eq!(outcome.metadata["action"], "deleted");
        assert_eq!(
            std::fs::read_to_string(ws.path().join("code.rs")).unwrap(),
            "keep\nkeep2\n"
        );
    }

    #[tokio::test]
    async fn insert_after_anchor() {
        let (ws, editor) = setup("first\nlast\n").await;

        let outcome = editor
            .execute(&json!({
                "path": "code.rs",
                "insert_after_hash": line_tag("first"),
                "new_content": "middle"
            }))
            .await;
        assert!(outcome.ok);
        assert_eq!(outcome.metadata["action"], "inserted");
        assert_eq!(
            std::fs::read_to_string(ws.path().join("code.rs")).unwrap(),
            "first\nmiddle\nlast\n"
        );
    }

    #[tokio::test]
    async fn repeated_tag_resolved_by_hint() {
        let (ws, editor) = setup("dup\nother\ndup\n").await;
        let tag = line_tag("dup");

        let outcome = editor
            .execute(&json!({
                "path": "code.rs",
                "start_hash": tag,
                "end_hash": tag,
                "start_lineno": 3,
                "end_lineno": 3,
                "new_content": "changed"
            }))
            .await;
        assert!(outcome.ok);
        assert_eq!(
            std::fs::read_to_string(ws.path().join("code.rs")).unwrap(),
            "dup\nother\nchanged\n"
        );
    }

    #[tokio::test]
    async fn edit_without_read_is_refused() {
        let ws = TempDir::new().unwrap();
        std::fs::write(ws.path().join("code.rs"), "line\n").unwrap();

        let editor = HashlineEditTool::new(ws.path(), Arc::new(ReadTracker::new()));
        let outcome = editor
            .execute(&json!({
                "path": "code.rs",
                "start_hash": line_tag("line"),
                "end_hash": line_tag("line"),
                "new_content": "x"
            }))
            .await;
        assert!(!outcome.ok);
        assert!(outcome.error.contains("file_read"));
    }

    #[tokio::test]
    async fn edit_after_external_change_is_refused() {
        let (ws, editor) = setup("line\n").await;

        // Simulate an external modification with a different mtime.
        let file = ws.path().join("code.rs");
        std::fs::write(&file, "line\nextra\n").unwrap();
        let bumped = std::time::SystemTime::now() + std::time::Duration::from_secs(10);
        let _ = filetime_set(&file, bumped);

        let outcome = editor
            .execute(&json!({
                "path": "code.rs",
                "start_hash": line_tag("line"),
                "end_hash": line_tag("line"),
                "new_content": "x"
            }))
            .await;
        assert!(!outcome.ok);
        assert!(outcome.error.contains("read it again"));
    }

    /// Bump a file's mtime without a filetime dependency.
    fn filetime_set(path: &Path, to: std::time::SystemTime) -> std::io::Result<()> {
        let file = std::fs::File::options().append(true).open(path)?;
        file.set_modified(to)
    }

    #[tokio::test]
    async fn unknown_anchor_fails() {
        let (_ws, editor) = setup("line\n").await;
        let outcome = editor
            .execute(&json!({
                "path": "code.rs",
                "start_hash": "zz",
                "end_hash": "zz",
                "new_content": "x"
            }))
            .await;
        assert!(!outcome.ok);
        assert!(outcome.error.contains("start_hash"));
    }

    #[tokio::test]
    async fn preview_uses_hashline_format() {
        let (_ws, editor) = setup("a\nb\nc\n").await;
        let outcome = editor
            .execute(&json!({
                "path": "code.rs",
                "start_hash": line_tag("b"),
                "end_hash": line_tag("b"),
                "new_content": "B"
            }))
            .await;
        assert!(outcome.output.contains("preview after change"));
        assert!(outcome.output.contains("| B"));
    }
}
