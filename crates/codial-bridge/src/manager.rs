//! Provider manager.
//!
//! Resolves a session's configured provider name to a bridge client.
//! Bridges are built once at startup and shared; the manager itself is
//! immutable after construction.

use std::collections::HashMap;
use std::sync::Arc;

use crate::provider::{BridgeError, BridgeResult, ProviderBridge};

/// Shared, immutable registry of enabled provider bridges.
pub struct ProviderManager {
    bridges: HashMap<String, Arc<dyn ProviderBridge>>,
    enabled: Vec<String>,
}

impl ProviderManager {
    /// Create a manager over prebuilt bridges.
    #[must_use]
    pub fn new(bridges: HashMap<String, Arc<dyn ProviderBridge>>, enabled: Vec<String>) -> Self {
        Self { bridges, enabled }
    }

    /// The enabled provider names, in configuration order.
    #[must_use]
    pub fn enabled_names(&self) -> &[String] {
        &self.enabled
    }

    /// Whether a provider name is enabled.
    #[must_use]
    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.iter().any(|n| n == name)
    }

    /// Resolve a provider name to its bridge.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::NotEnabled`] when the name is not in the
    /// enabled set.
    pub fn resolve(&self, name: &str) -> BridgeResult<Arc<dyn ProviderBridge>> {
        self.bridges
            .get(name)
            .cloned()
            .ok_or_else(|| BridgeError::NotEnabled {
                provider: name.to_owned(),
                enabled: self.enabled.join(", "),
            })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
