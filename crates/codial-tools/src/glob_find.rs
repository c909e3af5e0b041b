//! Glob search tool.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};
use walkdir::WalkDir;

use crate::file_read::resolve_in_workspace;
use crate::tool::{optional_str, required_str, Tool, ToolOutcome};

/// Cap on returned matches.
const MAX_RESULTS: usize = 1000;

/// Finds files by glob pattern (`**/*.rs`, `src/**/*.ts`, `*.json`, ...).
pub struct GlobTool {
    workspace_root: PathBuf,
    max_results: usize,
}

impl GlobTool {
    /// Create the tool rooted at `workspace_root`.
    #[must_use]
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            max_results: MAX_RESULTS,
        }
    }
}

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        "glob"
    }

    fn description(&self) -> &str {
        "Find files matching a glob pattern, e.g. **/*.rs, src/**/*.ts, *.json."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern, e.g. **/*.rs or src/**/*.ts."
                },
                "path": {
                    "type": "string",
                    "description": "Directory to search from; defaults to the workspace root."
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, arguments: &Value) -> ToolOutcome {
        let pattern = match required_str(arguments, "pattern") {
            Ok(pattern) => pattern,
            Err(outcome) => return outcome,
        };

        let matcher = match globset::GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
        {
            Ok(glob) => glob.compile_matcher(),
            Err(e) => return ToolOutcome::failure(format!("invalid glob pattern: {e}")),
        };

        let search_root = optional_str(arguments, "path")
            .map(|raw| resolve_in_workspace(&self.workspace_root, raw))
            .filter(|candidate| candidate.is_dir())
            .unwrap_or_else(|| self.workspace_root.clone());

        let mut matches: Vec<String> = Vec::new();
        for entry in WalkDir::new(&search_root).into_iter().filter_map(Result::ok) {
            let Ok(relative) = entry.path().strip_prefix(&search_root) else {
                continue;
            };
            if relative.as_os_str().is_empty() {
                continue;
            }
            if matcher.is_match(relative) {
                matches.push(entry.path().display().to_string());
            }
        }
        matches.sort();

        let total = matches.len();
        let truncated = total > self.max_results;
        matches.truncate(self.max_results);

        let output = if matches.is_empty() {
            "(no matching files)".to_owned()
        } else {
            matches.join("\n")
        };

        ToolOutcome::success(output)
            .with_meta("match_count", total)
            .with_meta("truncated", truncated)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> TempDir {
        let ws = TempDir::new().unwrap();
        std::fs::create_dir_all(ws.path().join("src/nested")).unwrap();
        std::fs::write(ws.path().join("top.rs"), "").unwrap();
        std::fs::write(ws.path().join("notes.txt"), "").unwrap();
        std::fs::write(ws.path().join("src/lib.rs"), "").unwrap();
        std::fs::write(ws.path().join("src/nested/deep.rs"), "").unwrap();
        ws
    }

    fn tool(ws: &TempDir) -> GlobTool {
        GlobTool::new(ws.path())
    }

    #[tokio::test]
    async fn top_level_pattern_matches_only_top() {
        let ws = setup();
        let outcome = tool(&ws).execute(&json!({"pattern": "*.rs"})).await;
        assert!(outcome.ok);
        assert!(outcome.output.contains("top.rs"));
        assert!(!outcome.output.contains("lib.rs"));
    }

    #[tokio::test]
    async fn recursive_pattern_matches_nested() {
        let ws = setup();
        let outcome = tool(&ws).execute(&json!({"pattern": "**/*.rs"})).await;
        assert!(outcome.output.contains("top.rs"));
        assert!(outcome.output.contains("lib.rs"));
        assert!(outcome.output.contains("deep.rs"));
        assert!(!outcome.output.contains("notes.txt"));
        assert_eq!(outcome.metadata["match_count"], 3);
    }

    #[tokio::test]
    async fn path_argument_narrows_root() {
        let ws = setup();
        let outcome = tool(&ws)
            .execute(&json!({"pattern": "**/*.rs", "path": "src"}))
            .await;
        assert!(outcome.output.contains("lib.rs"));
        assert!(!outcome.output.contains("top.rs"));
    }

    #[tokio::test]
    async fn no_matches_reported() {
        let ws = setup();
        let outcome = tool(&ws).execute(&json!({"pattern": "*.go"})).await;
        assert!(outcome.ok);
        assert_eq!(outcome.output, "(no matching files)");
        assert_eq!(outcome.metadata["match_count"], 0);
    }

    #[tokio::test]
    async fn invalid_pattern_fails() {
        let ws = setup();
        let outcome = tool(&ws).execute(&json!({"pattern": "a{b"})).await;
        assert!(!outcome.ok);
        assert!(outcome.error.contains("invalid glob"));
    }

    #[tokio::test]
    async fn missing_pattern_rejected() {
        let ws = setup();
        let outcome = tool(&ws).execute(&json!({})).await;
        assert!(!outcome.ok);
    }
}
