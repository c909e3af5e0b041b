//! Built-in tool registry.
//!
//! Central name → tool index. The turn engine merges [`specs`] into the
//! provider tool manifest ahead of MCP discovery and dispatches registered
//! names through [`call`]; unmatched names fall through to MCP.
//!
//! [`specs`]: ToolRegistry::specs
//! [`call`]: ToolRegistry::call

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use codial_bridge::ToolSpec;

use crate::file_read::FileReadTool;
use crate::file_write::FileWriteTool;
use crate::glob_find::GlobTool;
use crate::grep::GrepTool;
use crate::hashline_edit::HashlineEditTool;
use crate::shell::ShellTool;
use crate::tool::{Tool, ToolOutcome};
use crate::tracker::ReadTracker;
use crate::web_fetch::WebFetchTool;

/// Name → tool index, immutable once built.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool; a same-named tool is replaced.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        debug!(tool = tool.name(), "builtin tool registered");
        let _ = self.tools.insert(tool.name().to_owned(), tool);
    }

    /// Whether a tool name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Look up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// All registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Manifest entries for the provider bridge, sorted by name.
    #[must_use]
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.values().map(|tool| tool.spec()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// Dispatch a call by name.
    ///
    /// An unregistered name is a failed outcome, not an error: it travels
    /// back to the bridge like any other tool failure.
    pub async fn call(&self, name: &str, arguments: &Value) -> ToolOutcome {
        match self.tools.get(name) {
            Some(tool) => tool.execute(arguments).await,
            None => ToolOutcome::failure(format!("`{name}` is not a registered builtin tool")),
        }
    }
}

/// Build the registry with the full built-in set.
///
/// `file_read` and `hashline_edit` share one [`ReadTracker`]: reads record
/// the file's mtime, and edits are refused until the file has been read
/// (and re-read after changes).
#[must_use]
pub fn builtin_registry(workspace_root: &Path) -> ToolRegistry {
    let reads = Arc::new(ReadTracker::new());

    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(WebFetchTool::new()));
    registry.register(Arc::new(ShellTool::new(workspace_root)));
    registry.register(Arc::new(FileReadTool::new(workspace_root, reads.clone())));
    registry.register(Arc::new(HashlineEditTool::new(workspace_root, reads)));
    registry.register(Arc::new(FileWriteTool::new(workspace_root)));
    registry.register(Arc::new(GlobTool::new(workspace_root)));
    registry.register(Arc::new(GrepTool::new(workspace_root)));
    registry
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
