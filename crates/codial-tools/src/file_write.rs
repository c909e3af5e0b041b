//! File write tool.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::file_read::resolve_in_workspace;
use crate::tool::{required_str, Tool, ToolOutcome};

/// Creates or overwrites a file, creating parent directories as needed.
pub struct FileWriteTool {
    workspace_root: PathBuf,
}

impl FileWriteTool {
    /// Create the tool rooted at `workspace_root`.
    #[must_use]
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
        }
    }
}

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "file_write"
    }

    fn description(&self) -> &str {
        "Write text content to a file. Creates the file (and parent directories) when missing, overwrites when present."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path to write."
                },
                "content": {
                    "type": "string",
                    "description": "Text content to write."
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, arguments: &Value) -> ToolOutcome {
        let raw_path = match required_str(arguments, "path") {
            Ok(path) => path,
            Err(outcome) => return outcome,
        };
        let Some(content) = arguments.get("content").and_then(Value::as_str) else {
            return ToolOutcome::failure("the `content` argument is required");
        };

        let target = resolve_in_workspace(&self.workspace_root, raw_path);
        if let Some(parent) = target.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return ToolOutcome::failure(format!("failed to create parent directories: {e}"));
            }
        }
        if let Err(e) = std::fs::write(&target, content) {
            return ToolOutcome::failure(format!("failed to write the file: {e}"));
        }

        let line_count =
            content.matches('\n').count() + usize::from(!content.is_empty() && !content.ends_with('\n'));

        ToolOutcome::success(format!("wrote {}", target.display()))
            .with_meta("byte_count", content.len())
            .with_meta("line_count", line_count)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
