//! Policy loading.
//!
//! [`PolicyLoader`] reads the policy surface of a workspace into an
//! immutable [`PolicySnapshot`]:
//!
//! - the Claude memory chain (`~/.claude/CLAUDE.md` plus every `CLAUDE.md`
//!   walking upward from the workspace root)
//! - `RULES.md` ∪ `CODIAL.md` (operator rules plus user-managed rules)
//! - `AGENTS.md` (agent profiles and session defaults)
//! - skills and subagent definitions
//!
//! The loader is pure on its inputs: repeated loads over an unchanged
//! filesystem produce byte-identical snapshots, so [`PolicySnapshot::content_hash`]
//! can be used to detect policy drift. Missing optional files are not
//! errors.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::skills::{discover_skills, SkillSummary};
use crate::subagent::{default_search_paths, discover_subagents, SubagentSpec};

/// Placeholder used in summaries when a policy file is absent.
const SUMMARY_MISSING: &str = "not present";
/// Placeholder used in summaries when a policy file has no content.
const SUMMARY_EMPTY: &str = "empty";

// ─────────────────────────────────────────────────────────────────────────────
// PolicySnapshot
// ─────────────────────────────────────────────────────────────────────────────

/// Immutable aggregate of the workspace policy at one point in time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicySnapshot {
    /// Merged Claude memory chain text.
    pub memory_text: String,
    /// Merged rules text (`RULES.md` then `CODIAL.md`).
    pub rules_text: String,
    /// `AGENTS.md` text.
    pub agents_text: String,
    /// Discovered skills, sorted by name.
    pub skills: Vec<SkillSummary>,
    /// Discovered subagent definitions, sorted by name.
    pub subagents: Vec<SubagentSpec>,
}

impl PolicySnapshot {
    /// First line of the rules text, truncated.
    #[must_use]
    pub fn rules_summary(&self) -> String {
        headline(&self.rules_text)
    }

    /// First line of the agents text, truncated.
    #[must_use]
    pub fn agents_summary(&self) -> String {
        headline(&self.agents_text)
    }

    /// First line of the memory text, truncated.
    #[must_use]
    pub fn memory_summary(&self) -> String {
        headline(&self.memory_text)
    }

    /// Comma-joined skill names.
    #[must_use]
    pub fn skills_summary(&self) -> String {
        if self.skills.is_empty() {
            return SUMMARY_MISSING.to_owned();
        }
        self.skills
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Names of all discovered skills.
    #[must_use]
    pub fn available_skills(&self) -> Vec<&str> {
        self.skills.iter().map(|s| s.name.as_str()).collect()
    }

    /// Find a subagent definition by name.
    #[must_use]
    pub fn subagent(&self, name: &str) -> Option<&SubagentSpec> {
        self.subagents.iter().find(|s| s.name == name)
    }

    /// SHA-256 hex digest over the snapshot content.
    ///
    /// Identical filesystem state yields an identical hash.
    #[must_use]
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.memory_text.as_bytes());
        hasher.update([0]);
        hasher.update(self.rules_text.as_bytes());
        hasher.update([0]);
        hasher.update(self.agents_text.as_bytes());
        hasher.update([0]);
        for skill in &self.skills {
            hasher.update(skill.name.as_bytes());
            hasher.update([0]);
            hasher.update(skill.description.as_bytes());
            hasher.update([0]);
        }
        for subagent in &self.subagents {
            hasher.update(subagent.name.as_bytes());
            hasher.update([0]);
            hasher.update(subagent.prompt.as_bytes());
            hasher.update([0]);
            hasher.update(subagent.model.as_bytes());
            hasher.update([0]);
        }
        hex(&hasher.finalize())
    }
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// First non-empty line of a text, truncated to 200 characters.
fn headline(text: &str) -> String {
    if text.is_empty() {
        return SUMMARY_MISSING.to_owned();
    }
    for line in text.lines() {
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            return trimmed.chars().take(200).collect();
        }
    }
    SUMMARY_EMPTY.to_owned()
}

// ─────────────────────────────────────────────────────────────────────────────
// AgentDefaults
// ─────────────────────────────────────────────────────────────────────────────

/// Session defaults declared in `AGENTS.md`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AgentDefaults {
    /// `default_provider`.
    pub provider: Option<String>,
    /// `default_model`.
    pub model: Option<String>,
    /// `default_mcp_enabled`.
    pub mcp_enabled: Option<bool>,
    /// `default_mcp_profile`.
    pub mcp_profile_name: Option<String>,
}

/// Extract session defaults from `AGENTS.md` text.
///
/// Recognized lines have the form `key: value`; unknown keys and comment
/// lines are ignored.
#[must_use]
pub fn extract_agent_defaults(agents_text: &str) -> AgentDefaults {
    let mut defaults = AgentDefaults::default();

    for raw_line in agents_text.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();
        if value.is_empty() {
            continue;
        }

        match key.as_str() {
            "default_provider" => defaults.provider = Some(value.to_owned()),
            "default_model" => defaults.model = Some(value.to_owned()),
            "default_mcp_enabled" => match value.to_lowercase().as_str() {
                "true" | "yes" | "1" => defaults.mcp_enabled = Some(true),
                "false" | "no" | "0" => defaults.mcp_enabled = Some(false),
                _ => {}
            },
            "default_mcp_profile" => defaults.mcp_profile_name = Some(value.to_owned()),
            _ => {}
        }
    }

    defaults
}

// ─────────────────────────────────────────────────────────────────────────────
// PolicyLoader
// ─────────────────────────────────────────────────────────────────────────────

/// Loads [`PolicySnapshot`]s for one workspace.
#[derive(Clone, Debug)]
pub struct PolicyLoader {
    workspace_root: PathBuf,
    home_dir: PathBuf,
}

impl PolicyLoader {
    /// Create a loader rooted at `workspace_root`, resolving the user-global
    /// chain under `$HOME`.
    #[must_use]
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_owned());
        Self::with_home(workspace_root, PathBuf::from(home))
    }

    /// Create a loader with an explicit home directory.
    #[must_use]
    pub fn with_home(workspace_root: impl Into<PathBuf>, home_dir: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            home_dir: home_dir.into(),
        }
    }

    /// The workspace root this loader reads from.
    #[must_use]
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Load a fresh snapshot from the filesystem.
    #[must_use]
    pub fn load(&self) -> PolicySnapshot {
        let memory_text = self.load_memory_chain();
        let rules_text = merge_sections(&[
            read_if_present(&self.workspace_root.join("RULES.md")),
            read_if_present(&self.workspace_root.join("CODIAL.md")),
        ]);
        let agents_text = read_if_present(&self.workspace_root.join("AGENTS.md")).unwrap_or_default();

        let skills = discover_skills(&self.workspace_root);
        let subagents =
            discover_subagents(&default_search_paths(&self.workspace_root, &self.home_dir));

        PolicySnapshot {
            memory_text,
            rules_text,
            agents_text,
            skills,
            subagents,
        }
    }

    /// Merge `~/.claude/CLAUDE.md` with every `CLAUDE.md` found walking
    /// upward from the workspace root.
    fn load_memory_chain(&self) -> String {
        let mut parts: Vec<String> = Vec::new();

        if let Some(text) = read_if_present(&self.home_dir.join(".claude").join("CLAUDE.md")) {
            parts.push(text);
        }

        let mut current = self.workspace_root.clone();
        loop {
            if let Some(text) = read_if_present(&current.join("CLAUDE.md")) {
                parts.push(text);
            }
            let Some(parent) = current.parent() else {
                break;
            };
            if parent == current {
                break;
            }
            current = parent.to_owned();
        }

        parts.join("\n\n")
    }
}

fn read_if_present(path: &Path) -> Option<String> {
    if path.is_file() {
        std::fs::read_to_string(path).ok()
    } else {
        None
    }
}

fn merge_sections(sections: &[Option<String>]) -> String {
    sections
        .iter()
        .flatten()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n\n")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
