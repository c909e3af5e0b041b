//! Frontmatter parsing for policy markdown files.
//!
//! Skill and subagent files carry optional YAML frontmatter delimited by
//! `---`. Only a small YAML subset is needed (key-value pairs, booleans,
//! quoted strings, inline and multi-line arrays), so this is a hand-written
//! parser with no YAML dependency.

use std::collections::BTreeMap;

/// A parsed frontmatter value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrontmatterValue {
    /// A scalar string (quotes stripped).
    Str(String),
    /// A boolean (`true`/`false`, case-insensitive).
    Bool(bool),
    /// An array of strings.
    List(Vec<String>),
}

impl FrontmatterValue {
    /// The value as a string slice, if scalar.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The value as a bool, if boolean.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The value as a list; a scalar is treated as a one-element list.
    #[must_use]
    pub fn as_list(&self) -> Vec<String> {
        match self {
            Self::List(items) => items.clone(),
            Self::Str(s) if !s.is_empty() => vec![s.clone()],
            _ => Vec::new(),
        }
    }
}

/// Parsed frontmatter: ordered keys → values.
pub type Frontmatter = BTreeMap<String, FrontmatterValue>;

/// Split a document into `(frontmatter, body)`.
///
/// A document starts frontmatter with `---` on the first non-blank line and
/// closes it with a line starting `---`. Missing or unclosed frontmatter
/// yields an empty map and the full content as body.
#[must_use]
pub fn split_frontmatter(content: &str) -> (Frontmatter, String) {
    let trimmed = content.trim_start();
    if !trimmed.starts_with("---") {
        return (Frontmatter::new(), content.to_owned());
    }

    let after_first = &trimmed[3..];
    let after_first = after_first.strip_prefix('\n').unwrap_or(after_first);

    let Some(end_idx) = after_first.find("\n---") else {
        // No closing delimiter: the whole document is body.
        return (Frontmatter::new(), content.to_owned());
    };

    let yaml = &after_first[..end_idx];
    let body_start = end_idx + 4;
    let body = if body_start < after_first.len() {
        let rest = &after_first[body_start..];
        rest.strip_prefix('\n').unwrap_or(rest).to_owned()
    } else {
        String::new()
    };

    (parse_yaml_subset(yaml), body)
}

/// Parse the YAML subset into a [`Frontmatter`] map.
fn parse_yaml_subset(yaml: &str) -> Frontmatter {
    let mut map = Frontmatter::new();
    let lines: Vec<&str> = yaml.lines().collect();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i].trim();
        i += 1;

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };

        let key = key.trim().to_owned();
        let value = value.trim();

        let parsed = if value.is_empty() || value.starts_with('[') {
            FrontmatterValue::List(parse_array_value(value, &lines, &mut i))
        } else if let Some(b) = parse_bool(value) {
            FrontmatterValue::Bool(b)
        } else {
            FrontmatterValue::Str(unquote(value))
        };

        let _ = map.insert(key, parsed);
    }

    map
}

/// Parse an array value, either inline `[a, b]` or multi-line `- item`.
fn parse_array_value(value: &str, lines: &[&str], i: &mut usize) -> Vec<String> {
    if value.starts_with('[') {
        return parse_inline_array(value);
    }

    // Empty scalar: look for `- item` continuation lines.
    let mut items = Vec::new();
    while *i < lines.len() {
        let trimmed = lines[*i].trim();
        if let Some(item) = trimmed.strip_prefix("- ") {
            items.push(unquote(item.trim()));
            *i += 1;
        } else if trimmed.starts_with('-') && trimmed.len() > 1 {
            items.push(unquote(trimmed[1..].trim()));
            *i += 1;
        } else {
            break;
        }
    }
    items
}

/// Parse an inline array like `[item1, item2]`.
fn parse_inline_array(value: &str) -> Vec<String> {
    let inner = value.trim_start_matches('[').trim_end_matches(']').trim();
    if inner.is_empty() {
        return Vec::new();
    }
    inner.split(',').map(|s| unquote(s.trim())).collect()
}

fn parse_bool(value: &str) -> Option<bool> {
    match unquote(value).to_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Remove surrounding quotes from a string value.
fn unquote(s: &str) -> String {
    let trimmed = s.trim();
    if (trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2)
        || (trimmed.starts_with('\'') && trimmed.ends_with('\'') && trimmed.len() >= 2)
    {
        trimmed[1..trimmed.len() - 1].to_owned()
    } else {
        trimmed.to_owned()
    }
}

/// Extract a one-line description from a markdown body.
///
/// Returns the first non-header, non-empty, non-rule line outside code
/// blocks, truncated to 200 characters.
#[must_use]
pub fn extract_description(content: &str) -> String {
    let mut in_code_block = false;

    for line in content.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with("```") {
            in_code_block = !in_code_block;
            continue;
        }
        if in_code_block || trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if is_horizontal_rule(trimmed) {
            continue;
        }

        return trimmed.chars().take(200).collect();
    }

    String::new()
}

/// Check if a line is a markdown horizontal rule.
fn is_horizontal_rule(line: &str) -> bool {
    if line.len() < 3 {
        return false;
    }
    let first = line.chars().next().unwrap_or(' ');
    if first != '-' && first != '*' && first != '_' {
        return false;
    }
    line.chars().all(|c| c == first)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
