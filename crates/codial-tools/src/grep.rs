//! Regex content search tool.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};
use walkdir::WalkDir;

use crate::file_read::resolve_in_workspace;
use crate::tool::{optional_str, required_str, Tool, ToolOutcome};

/// Cap on returned match lines.
const MAX_RESULTS: usize = 500;
/// Files larger than this are skipped.
const MAX_FILE_BYTES: u64 = 1_000_000;

/// Searches file contents with a regex; returns `path:line: text` rows.
pub struct GrepTool {
    workspace_root: PathBuf,
    max_results: usize,
    max_file_bytes: u64,
}

impl GrepTool {
    /// Create the tool rooted at `workspace_root`.
    #[must_use]
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            max_results: MAX_RESULTS,
            max_file_bytes: MAX_FILE_BYTES,
        }
    }
}

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Search file contents with a regular expression; returns file path, line number, and the matching line."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Regular expression to search for."
                },
                "path": {
                    "type": "string",
                    "description": "Directory to search from; defaults to the workspace root."
                },
                "include": {
                    "type": "string",
                    "description": "Glob filter for files to search, e.g. *.rs or **/*.ts."
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
        let regex = match regex::Regex::new(pattern) {
            Ok(regex) => regex,
            Err(e) => return ToolOutcome::failure(format!("invalid regular expression: {e}")),
        };

        let include = match optional_str(arguments, "include") {
            Some(raw) => match globset::Glob::new(raw) {
                Ok(glob) => Some(glob.compile_matcher()),
                Err(e) => return ToolOutcome::failure(format!("invalid include glob: {e}")),
            },
            None => None,
        };

        let search_root = optional_str(arguments, "path")
            .map(|raw| resolve_in_workspace(&self.workspace_root, raw))
            .filter(|candidate| candidate.is_dir())
            .unwrap_or_else(|| self.workspace_root.clone());

        let mut results: Vec<String> = Vec::new();
        let mut file_count = 0usize;

        'files: for entry in WalkDir::new(&search_root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
        {
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.metadata().is_ok_and(|m| m.len() > self.max_file_bytes) {
                continue;
            }
            if let Some(matcher) = &include {
                let relative = entry.path().strip_prefix(&search_root).unwrap_or(entry.path());
                if !matcher.is_match(relative) && !matcher.is_match(entry.file_name()) {
                    continue;
                }
            }

            let Ok(raw) = std::fs::read(entry.path()) else {
                continue;
            };
            let text = String::from_utf8_lossy(&raw);

            let mut file_had_match = false;
            for (line_idx, line) in text.lines().enumerate() {
                if regex.is_match(line) {
                    results.push(format!("{}:{}: {}", entry.path().display(), line_idx + 1, line));
                    file_had_match = true;
                    if results.len() >= self.max_results {
                        if file_had_match {
                            file_count += 1;
                        }
                        break 'files;
                    }
                }
            }
            if file_had_match {
                file_count += 1;
            }
        }

        let truncated = results.len() >= self.max_results;
        let output = if results.is_empty() {
            "(no matches)".to_owned()
        } else {
            results.join("\n")
        };

        ToolOutcome::success(output)
            .with_meta("match_count", results.len())
            .with_meta("file_count", file_count)
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
        std::fs::create_dir_all(ws.path().join("src")).unwrap();
        std::fs::write(ws.path().join("src/a.rs"), "fn alpha() {}\nfn beta() {}\n").unwrap();
        std::fs::write(ws.path().join("src/b.txt"), "alpha in text\n").unwrap();
        ws
    }

    fn tool(ws: &TempDir) -> GrepTool {
        GrepTool::new(ws.path())
    }

    #[tokio::test]
    async fn finds_matches_with_line_numbers() {
        let ws = setup();
        let outcome = tool(&ws).execute(&json!({"pattern": "alpha"})).await;
        assert!(outcome.ok);
        assert!(outcome.output.contains("a.rs:1: fn alpha() {}"));
        assert!(outcome.output.contains("b.txt:1: alpha in text"));
        assert_eq!(outcome.metadata["file_count"], 2);
    }

    #[tokio::test]
    async fn include_glob_filters_files() {
        let ws = setup();
        let outcome = tool(&ws)
            .execute(&json!({"pattern": "alpha", "include": "*.rs"}))
            .await;
        assert!(outcome.output.contains("a.rs"));
        assert!(!outcome.output.contains("b.txt"));
    }

    #[tokio::test]
    async fn regex_syntax_is_honored() {
        let ws = setup();
        let outcome = tool(&ws).execute(&json!({"pattern": r"fn \w+\(\)"})).await;
        assert_eq!(outcome.metadata["match_count"], 2);
    }

    #[tokio::test]
    async fn no_matches_reported() {
        let ws = setup();
        let outcome = tool(&ws).execute(&json!({"pattern": "zzz_nothing"})).await;
        assert!(outcome.ok);
        assert_eq!(outcome.output, "(no matches)");
    }

    #[tokio::test]
    async fn invalid_regex_fails() {
        let ws = setup();
        let outcome = tool(&ws).execute(&json!({"pattern": "("})).await;
        assert!(!outcome.ok);
        assert!(outcome.error.contains("regular expression"));
    }

    #[tokio::test]
    async fn path_argument_narrows_root() {
        let ws = setup();
        std::fs::write(ws.path().join("outside.txt"), "alpha outside\n").unwrap();
        let outcome = tool(&ws)
            .execute(&json!({"pattern": "alpha", "path": "src"}))
            .await;
        assert!(!outcome.output.contains("outside.txt"));
    }
}
