//! Subagent definition discovery.
//!
//! A subagent is a named agent profile (`planner`, `implementer`,
//! `reviewer`, ...) stored as a markdown file with frontmatter. Definitions
//! are searched in order:
//!
//! 1. `~/.claude/agents/*.md` (user-global)
//! 2. `<workspace>/.claude/agents/*.md` (project, overrides global)

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::frontmatter::split_frontmatter;

/// Model value meaning "keep the session's configured model".
pub const MODEL_INHERIT: &str = "inherit";

/// A parsed subagent definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubagentSpec {
    /// Subagent name (frontmatter `name`, else the file stem).
    pub name: String,
    /// One-line description.
    pub description: String,
    /// System prompt (the markdown body).
    pub prompt: String,
    /// Model override, or [`MODEL_INHERIT`].
    pub model: String,
    /// MCP server profiles this subagent needs.
    pub mcp_servers: Vec<String>,
    /// Extra memory text appended to the system context.
    pub memory: Option<String>,
    /// Source file path.
    pub source_path: PathBuf,
}

impl SubagentSpec {
    /// Whether this subagent overrides the session model.
    #[must_use]
    pub fn overrides_model(&self) -> bool {
        self.model != MODEL_INHERIT
    }
}

/// The subagent search paths for a workspace, global first.
#[must_use]
pub fn default_search_paths(workspace_root: &Path, home_dir: &Path) -> Vec<PathBuf> {
    vec![
        home_dir.join(".claude").join("agents"),
        workspace_root.join(".claude").join("agents"),
    ]
}

/// Discover subagent definitions across the search paths.
///
/// Later paths override earlier ones on name collision, so project
/// definitions shadow user-global ones. Results are sorted by name.
#[must_use]
pub fn discover_subagents(search_paths: &[PathBuf]) -> Vec<SubagentSpec> {
    let mut found: std::collections::BTreeMap<String, SubagentSpec> =
        std::collections::BTreeMap::new();

    for base in search_paths {
        let Ok(read_dir) = std::fs::read_dir(base) else {
            continue;
        };
        let mut files: Vec<PathBuf> = read_dir
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("md"))
            .collect();
        files.sort();

        for path in files {
            match parse_subagent_file(&path) {
                Some(spec) => {
                    let _ = found.insert(spec.name.clone(), spec);
                }
                None => warn!(path = %path.display(), "skipping unreadable subagent file"),
            }
        }
    }

    found.into_values().collect()
}

/// Parse one subagent markdown file.
fn parse_subagent_file(path: &Path) -> Option<SubagentSpec> {
    let content = std::fs::read_to_string(path).ok()?;
    let (fm, prompt) = split_frontmatter(&content);

    let name = fm
        .get("name")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(str::to_owned)
        .or_else(|| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_owned)
        })?;

    let description = fm
        .get("description")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map_or_else(String::new, str::to_owned);

    let model = fm
        .get("model")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map_or_else(|| MODEL_INHERIT.to_owned(), str::to_owned);

    let mcp_servers = fm.get("mcpServers").map(|v| v.as_list()).unwrap_or_default();

    let memory = fm
        .get("memory")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(str::to_owned);

    Some(SubagentSpec {
        name,
        description,
        prompt: prompt.trim().to_owned(),
        model,
        mcp_servers,
        memory,
        source_path: path.to_owned(),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
