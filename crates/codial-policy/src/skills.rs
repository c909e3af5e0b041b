//! Skill discovery.
//!
//! Skills come from two places under the workspace root:
//!
//! - `.claude/skills/*/SKILL.md` — markdown with frontmatter
//! - `skills/*.yaml` — flat key-value skill declarations
//!
//! Unreadable or nameless files log a warning and are skipped; a missing
//! skills directory is not an error.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::frontmatter::{extract_description, split_frontmatter};

/// A discovered skill, reduced to what the system context needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkillSummary {
    /// Skill name (frontmatter `name`, else the directory/file name).
    pub name: String,
    /// One-line description.
    pub description: String,
    /// Source file path.
    pub path: PathBuf,
}

/// Discover all skills under a workspace root.
///
/// Later sources win on name collision; results are sorted by name so
/// snapshots hash deterministically.
#[must_use]
pub fn discover_skills(workspace_root: &Path) -> Vec<SkillSummary> {
    let mut found: Vec<SkillSummary> = Vec::new();

    for skill in scan_skill_md_dir(&workspace_root.join(".claude").join("skills")) {
        found.push(skill);
    }
    for skill in scan_yaml_dir(&workspace_root.join("skills")) {
        found.push(skill);
    }

    // Dedup by name, later entries winning.
    let mut deduped: std::collections::BTreeMap<String, SkillSummary> =
        std::collections::BTreeMap::new();
    for skill in found {
        let _ = deduped.insert(skill.name.clone(), skill);
    }
    deduped.into_values().collect()
}

/// Scan `<dir>/*/SKILL.md` files.
fn scan_skill_md_dir(dir: &Path) -> Vec<SkillSummary> {
    let mut skills = Vec::new();
    for entry in sorted_entries(dir) {
        let skill_md = entry.join("SKILL.md");
        if !skill_md.is_file() {
            continue;
        }
        match parse_skill_md(&skill_md) {
            Some(skill) => skills.push(skill),
            None => warn!(path = %skill_md.display(), "skipping unreadable skill file"),
        }
    }
    skills
}

/// Scan `<dir>/*.yaml` files.
fn scan_yaml_dir(dir: &Path) -> Vec<SkillSummary> {
    let mut skills = Vec::new();
    for path in sorted_entries(dir) {
        if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
            continue;
        }
        match parse_skill_yaml(&path) {
            Some(skill) => skills.push(skill),
            None => warn!(path = %path.display(), "skipping unreadable skill file"),
        }
    }
    skills
}

/// Parse a `SKILL.md` file into a summary.
fn parse_skill_md(path: &Path) -> Option<SkillSummary> {
    let content = std::fs::read_to_string(path).ok()?;
    let (fm, body) = split_frontmatter(&content);

    let name = fm
        .get("name")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(str::to_owned)
        .or_else(|| {
            path.parent()
                .and_then(Path::file_name)
                .and_then(|n| n.to_str())
                .map(str::to_owned)
        })?;

    let description = fm
        .get("description")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| extract_description(&body));

    Some(SkillSummary {
        name,
        description,
        path: path.to_owned(),
    })
}

/// Parse a flat `*.yaml` skill declaration.
///
/// Only `name:` and `description:` lines are read; `name` defaults to the
/// file stem.
fn parse_skill_yaml(path: &Path) -> Option<SkillSummary> {
    let content = std::fs::read_to_string(path).ok()?;

    let mut name: Option<String> = None;
    let mut description = String::new();
    for line in content.lines() {
        let trimmed = line.trim();
        if let Some(value) = trimmed.strip_prefix("name:") {
            let value = value.trim();
            if !value.is_empty() {
                name = Some(value.to_owned());
            }
        } else if let Some(value) = trimmed.strip_prefix("description:") {
            description = value.trim().to_owned();
        }
    }

    let name = name.or_else(|| {
        path.file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_owned)
    })?;

    Some(SkillSummary {
        name,
        description,
        path: path.to_owned(),
    })
}

/// Sorted directory entries; empty when the directory is absent.
fn sorted_entries(dir: &Path) -> Vec<PathBuf> {
    let Ok(read_dir) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut entries: Vec<PathBuf> = read_dir.filter_map(|e| e.ok().map(|e| e.path())).collect();
    entries.sort();
    entries
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn missing_dirs_yield_empty() {
        let ws = TempDir::new().unwrap();
        assert!(discover_skills(ws.path()).is_empty());
    }

    #[test]
    fn discovers_skill_md() {
        let ws = TempDir::new().unwrap();
        write(
            &ws.path().join(".claude/skills/review/SKILL.md"),
            "---\nname: review\ndescription: Review a diff\n---\nSteps.",
        );
        let skills = discover_skills(ws.path());
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].name, "review");
        assert_eq!(skills[0].description, "Review a diff");
    }

    #[test]
    fn skill_md_name_defaults_to_dir() {
        let ws = TempDir::new().unwrap();
        write(
            &ws.path().join(".claude/skills/deploy/SKILL.md"),
            "No frontmatter, first line is the description.",
        );
        let skills = discover_skills(ws.path());
        assert_eq!(skills[0].name, "deploy");
        assert_eq!(
            skills[0].description,
            "No frontmatter, first line is the description."
        );
    }

    #[test]
    fn discovers_yaml_skills() {
        let ws = TempDir::new().unwrap();
        write(
            &ws.path().join("skills/lint.yaml"),
            "name: lint\ndescription: Run the linter\n",
        );
        let skills = discover_skills(ws.path());
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].name, "lint");
        assert_eq!(skills[0].description, "Run the linter");
    }

    #[test]
    fn yaml_name_defaults_to_stem() {
        let ws = TempDir::new().unwrap();
        write(&ws.path().join("skills/format.yaml"), "description: fmt\n");
        let skills = discover_skills(ws.path());
        assert_eq!(skills[0].name, "format");
    }

    #[test]
    fn non_yaml_files_ignored() {
        let ws = TempDir::new().unwrap();
        write(&ws.path().join("skills/notes.txt"), "not a skill");
        assert!(discover_skills(ws.path()).is_empty());
    }

    #[test]
    fn yaml_overrides_skill_md_on_name_collision() {
        let ws = TempDir::new().unwrap();
        write(
            &ws.path().join(".claude/skills/lint/SKILL.md"),
            "---\nname: lint\ndescription: md version\n---\nx",
        );
        write(
            &ws.path().join("skills/lint.yaml"),
            "name: lint\ndescription: yaml version\n",
        );
        let skills = discover_skills(ws.path());
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].description, "yaml version");
    }

    #[test]
    fn results_sorted_by_name() {
        let ws = TempDir::new().unwrap();
        write(&ws.path().join("skills/zeta.yaml"), "description: z\n");
        write(&ws.path().join("skills/alpha.yaml"), "description: a\n");
        let skills = discover_skills(ws.path());
        assert_eq!(skills[0].name, "alpha");
        assert_eq!(skills[1].name, "zeta");
    }
}
