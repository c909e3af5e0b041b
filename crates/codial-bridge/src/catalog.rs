//! Provider catalog.
//!
//! The factory table maps known provider names to bridge constructors; the
//! operator-supplied enabled set filters it. Adding a provider means adding
//! one entry here, nothing else.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::http_bridge::HttpBridge;
use crate::provider::{BridgeError, BridgeResult, ProviderBridge};

/// The Copilot SDK bridge provider name.
pub const PROVIDER_COPILOT: &str = "github-copilot-sdk";

/// Every provider name the catalog can build.
pub const KNOWN_PROVIDER_NAMES: &[&str] = &[PROVIDER_COPILOT];

/// The settings slice the catalog needs to build bridges.
#[derive(Clone, Debug)]
pub struct BridgeSettings {
    /// Fallback provider when the enabled set is empty.
    pub default_provider_name: String,
    /// Operator-enabled provider names.
    pub enabled_provider_names: Vec<String>,
    /// Copilot bridge base URL.
    pub copilot_bridge_base_url: String,
    /// Copilot bridge bearer token (may be replaced by the auth bootstrap).
    pub copilot_bridge_token: String,
    /// Per-call bridge timeout.
    pub bridge_timeout: Duration,
}

/// Resolve and validate the enabled provider set.
///
/// An empty configured set falls back to the default provider name.
///
/// # Errors
///
/// Returns [`BridgeError::NotEnabled`] naming any configured provider the
/// catalog does not know.
pub fn validate_enabled_providers(
    configured: &[String],
    fallback_default: &str,
) -> BridgeResult<Vec<String>> {
    let resolved: Vec<String> = if configured.is_empty() {
        vec![fallback_default.to_owned()]
    } else {
        configured.to_vec()
    };

    for name in &resolved {
        if !KNOWN_PROVIDER_NAMES.contains(&name.as_str()) {
            return Err(BridgeError::NotEnabled {
                provider: name.clone(),
                enabled: KNOWN_PROVIDER_NAMES.join(", "),
            });
        }
    }

    Ok(resolved)
}

/// Pick the default provider for new sessions.
///
/// Prefers the policy-declared provider when it is enabled, otherwise the
/// first enabled provider.
#[must_use]
pub fn choose_default_provider(preferred: Option<&str>, enabled: &[String]) -> String {
    if let Some(preferred) = preferred {
        if enabled.iter().any(|name| name == preferred) {
            return preferred.to_owned();
        }
    }
    enabled.first().cloned().unwrap_or_default()
}

/// Build bridge clients for every enabled provider.
///
/// `copilot_token_override` replaces the configured token when the auth
/// bootstrap produced a fresher one.
///
/// # Errors
///
/// Propagates construction failures from the individual bridges.
pub fn build_bridges(
    settings: &BridgeSettings,
    enabled: &[String],
    copilot_token_override: Option<String>,
) -> BridgeResult<HashMap<String, Arc<dyn ProviderBridge>>> {
    let mut bridges: HashMap<String, Arc<dyn ProviderBridge>> = HashMap::new();

    for name in enabled {
        match name.as_str() {
            PROVIDER_COPILOT => {
                let token = copilot_token_override
                    .clone()
                    .unwrap_or_else(|| settings.copilot_bridge_token.clone());
                let bridge = HttpBridge::new(
                    PROVIDER_COPILOT,
                    settings.copilot_bridge_base_url.clone(),
                    Some(token),
                    settings.bridge_timeout,
                    "GitHub Copilot SDK",
                )?;
                let _ = bridges.insert(name.clone(), Arc::new(bridge));
            }
            _ => {
                // validate_enabled_providers runs first, so this is a bug.
                return Err(BridgeError::NotEnabled {
                    provider: name.clone(),
                    enabled: KNOWN_PROVIDER_NAMES.join(", "),
                });
            }
        }
    }

    Ok(bridges)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> BridgeSettings {
        BridgeSettings {
            default_provider_name: PROVIDER_COPILOT.to_owned(),
            enabled_provider_names: vec![PROVIDER_COPILOT.to_owned()],
            copilot_bridge_base_url: "http://bridge.local".into(),
            copilot_bridge_token: "tok".into(),
            bridge_timeout: Duration::from_secs(5),
        }
    }

    // -- validate_enabled_providers --

    #[test]
    fn empty_set_falls_back_to_default() {
        let enabled = validate_enabled_providers(&[], PROVIDER_COPILOT).unwrap();
        assert_eq!(enabled, vec![PROVIDER_COPILOT]);
    }

    #[test]
    fn known_providers_pass() {
        let configured = vec![PROVIDER_COPILOT.to_owned()];
        let enabled = validate_enabled_providers(&configured, PROVIDER_COPILOT).unwrap();
        assert_eq!(enabled, configured);
    }

    #[test]
    fn unknown_provider_rejected() {
        let configured = vec!["openai-api".to_owned()];
        let err = validate_enabled_providers(&configured, PROVIDER_COPILOT).unwrap_err();
        assert!(err.to_string().contains("openai-api"));
        assert_eq!(err.wire_code(), "PROVIDER_NOT_ENABLED");
    }

    // -- choose_default_provider --

    #[test]
    fn preferred_wins_when_enabled() {
        let enabled = vec!["a".to_owned(), "b".to_owned()];
        assert_eq!(choose_default_provider(Some("b"), &enabled), "b");
    }

    #[test]
    fn preferred_ignored_when_not_enabled() {
        let enabled = vec!["a".to_owned()];
        assert_eq!(choose_default_provider(Some("missing"), &enabled), "a");
    }

    #[test]
    fn no_preference_takes_first() {
        let enabled = vec!["a".to_owned(), "b".to_owned()];
        assert_eq!(choose_default_provider(None, &enabled), "a");
    }

    // -- build_bridges --

    #[test]
    fn builds_copilot_bridge() {
        let bridges = build_bridges(&settings(), &[PROVIDER_COPILOT.to_owned()], None).unwrap();
        assert_eq!(bridges.len(), 1);
        assert_eq!(bridges[PROVIDER_COPILOT].name(), PROVIDER_COPILOT);
    }

    #[test]
    fn token_override_applies() {
        // Construction succeeds either way; the override path is exercised.
        let bridges = build_bridges(
            &settings(),
            &[PROVIDER_COPILOT.to_owned()],
            Some("fresher-token".into()),
        )
        .unwrap();
        assert!(bridges.contains_key(PROVIDER_COPILOT));
    }
}
