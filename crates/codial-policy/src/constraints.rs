//! Provider and model constraints declared in rules text.
//!
//! Rules files may contain lines of the form:
//!
//! ```text
//! allow_providers: github-copilot-sdk
//! deny_models: gpt-4, gpt-4-turbo
//! - deny_providers: openai-api
//! ```
//!
//! An `allow_*` set, when non-empty, is exclusive; `deny_*` always wins.
//! Enforcement happens in the turn engine before the bridge is called, and
//! violations fail fast.

use std::collections::BTreeSet;

use crate::errors::PolicyError;

/// Parsed constraint sets.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PolicyConstraints {
    /// Exclusive provider allowlist (empty = allow all).
    pub allow_providers: BTreeSet<String>,
    /// Provider denylist.
    pub deny_providers: BTreeSet<String>,
    /// Exclusive model allowlist (empty = allow all).
    pub allow_models: BTreeSet<String>,
    /// Model denylist.
    pub deny_models: BTreeSet<String>,
}

/// Parse constraint lines out of rules text.
///
/// Unrecognized lines are ignored; values are comma-separated and a leading
/// list dash is tolerated.
#[must_use]
pub fn parse_policy_constraints(rules_text: &str) -> PolicyConstraints {
    let mut constraints = PolicyConstraints::default();

    for line in rules_text.lines() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }

        let mut candidate = stripped;
        if let Some(rest) = candidate.strip_prefix('-') {
            candidate = rest.trim();
        }
        let Some((key, value)) = candidate.split_once(':') else {
            continue;
        };

        let values: BTreeSet<String> = value
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
            .collect();

        match key.trim().to_lowercase().as_str() {
            "allow_providers" => constraints.allow_providers.extend(values),
            "deny_providers" => constraints.deny_providers.extend(values),
            "allow_models" => constraints.allow_models.extend(values),
            "deny_models" => constraints.deny_models.extend(values),
            _ => {}
        }
    }

    constraints
}

/// Enforce the constraints against a provider/model selection.
///
/// # Errors
///
/// Returns [`PolicyError::Violation`] when the selection is forbidden; the
/// session config is untouched by enforcement.
pub fn enforce_provider_and_model(
    provider: &str,
    model: &str,
    constraints: &PolicyConstraints,
) -> Result<(), PolicyError> {
    if !constraints.allow_providers.is_empty() && !constraints.allow_providers.contains(provider) {
        let allowed = join(&constraints.allow_providers);
        return Err(PolicyError::Violation(format!(
            "provider `{provider}` is not permitted by policy (allowed: {allowed})"
        )));
    }
    if constraints.deny_providers.contains(provider) {
        return Err(PolicyError::Violation(format!(
            "provider `{provider}` is denied by policy"
        )));
    }
    if !constraints.allow_models.is_empty() && !constraints.allow_models.contains(model) {
        let allowed = join(&constraints.allow_models);
        return Err(PolicyError::Violation(format!(
            "model `{model}` is not permitted by policy (allowed: {allowed})"
        )));
    }
    if constraints.deny_models.contains(model) {
        return Err(PolicyError::Violation(format!(
            "model `{model}` is denied by policy"
        )));
    }
    Ok(())
}

fn join(set: &BTreeSet<String>) -> String {
    set.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
