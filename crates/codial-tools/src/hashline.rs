//! Hashline formatting.
//!
//! Every line of a file read gets a short content tag:
//! `lineno:tag| content`, e.g. `1:a3| def hello():`. The tag hashes the
//! whitespace-trimmed line, so it stays stable across indentation changes
//! and gives the edit tool a deterministic anchor.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

/// Tag length in hex characters (2 → 256 buckets).
const TAG_LEN: usize = 2;

/// Content tag for one line.
#[must_use]
pub fn line_tag(content: &str) -> String {
    let digest = Sha256::digest(content.trim().as_bytes());
    format!("{:02x}", digest[0])[..TAG_LEN].to_owned()
}

/// Apply `lineno:tag| content` to a slice of lines, numbering from `start`
/// (1-indexed).
#[must_use]
pub fn tag_lines(lines: &[&str], start: usize) -> Vec<String> {
    lines
        .iter()
        .enumerate()
        .map(|(offset, line)| format!("{}:{}| {line}", start + offset, line_tag(line)))
        .collect()
}

/// Build a tag → line-index map (0-indexed; a tag may hit several lines).
#[must_use]
pub fn tag_index(lines: &[&str]) -> HashMap<String, Vec<usize>> {
    let mut index: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, line) in lines.iter().enumerate() {
        index.entry(line_tag(line)).or_default().push(idx);
    }
    index
}

/// Resolve a tag to one 0-indexed line.
///
/// When the tag is ambiguous, the line closest to `hint` (0-indexed) wins;
/// without a hint the first occurrence does.
#[must_use]
pub fn resolve_tag(
    tag: &str,
    index: &HashMap<String, Vec<usize>>,
    hint: Option<usize>,
) -> Option<usize> {
    let candidates = index.get(tag)?;
    match (candidates.as_slice(), hint) {
        ([only], _) => Some(*only),
        (many, Some(hint)) => many.iter().copied().min_by_key(|idx| idx.abs_diff(hint)),
        (many, None) => many.first().copied(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
