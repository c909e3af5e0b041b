//! Service configuration from `CORE_*` environment variables.
//!
//! Every knob has a development default so the service boots bare; the
//! loader warns when the known dev tokens survive into what looks like a
//! real deployment.

use std::time::Duration;

use tracing::warn;

/// Development defaults that must not reach production.
const INSECURE_TOKENS: &[&str] = &["dev-core-token", "dev-internal-token", ""];

/// Full service configuration.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Bearer token required on `/v1/*`.
    pub api_token: String,
    /// Gateway base URL for event push.
    pub gateway_base_url: String,
    /// Shared `x-internal-token` for event push.
    pub gateway_internal_token: String,
    /// General outbound request timeout.
    pub request_timeout: Duration,
    /// Worker count for the turn pool.
    pub turn_worker_count: usize,
    /// Default provider name.
    pub default_provider_name: String,
    /// Enabled provider names (CSV in the environment).
    pub enabled_provider_names: Vec<String>,
    /// Copilot bridge base URL.
    pub copilot_bridge_base_url: String,
    /// Copilot bridge token.
    pub copilot_bridge_token: String,
    /// Whether the Copilot login endpoint may be called at startup.
    pub copilot_auto_login_enabled: bool,
    /// Copilot auth cache path.
    pub copilot_auth_cache_path: String,
    /// Copilot login endpoint path.
    pub copilot_login_endpoint: String,
    /// Provider bridge per-call timeout.
    pub provider_bridge_timeout: Duration,
    /// MCP server URL; empty disables MCP.
    pub mcp_server_url: String,
    /// MCP bearer token.
    pub mcp_server_token: String,
    /// MCP per-call timeout.
    pub mcp_request_timeout: Duration,
    /// Whether attachments are downloaded.
    pub attachment_download_enabled: bool,
    /// Attachment byte cap.
    pub attachment_download_max_bytes: u64,
    /// Attachment storage directory.
    pub attachment_storage_dir: String,
    /// Workspace root for policy files.
    pub workspace_root: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8081,
            api_token: "dev-core-token".into(),
            gateway_base_url: "http://localhost:8080".into(),
            gateway_internal_token: "dev-internal-token".into(),
            request_timeout: Duration::from_secs(10),
            turn_worker_count: 2,
            default_provider_name: "github-copilot-sdk".into(),
            enabled_provider_names: vec!["github-copilot-sdk".into()],
            copilot_bridge_base_url: String::new(),
            copilot_bridge_token: String::new(),
            copilot_auto_login_enabled: true,
            copilot_auth_cache_path: ".runtime/copilot-auth.json".into(),
            copilot_login_endpoint: "/v1/auth/login".into(),
            provider_bridge_timeout: Duration::from_secs(30),
            mcp_server_url: String::new(),
            mcp_server_token: String::new(),
            mcp_request_timeout: Duration::from_secs(15),
            attachment_download_enabled: false,
            attachment_download_max_bytes: 10_000_000,
            attachment_storage_dir: ".runtime/attachments".into(),
            workspace_root: ".".into(),
        }
    }
}

impl CoreConfig {
    /// Load from the process environment (`CORE_*` keys).
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary lookup function (tests use a map).
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let string = |key: &str, default: String| lookup(key).unwrap_or(default);
        let config = Self {
            host: string("CORE_HOST", defaults.host),
            port: parse_or(&lookup, "CORE_PORT", defaults.port),
            api_token: string("CORE_API_TOKEN", defaults.api_token),
            gateway_base_url: string("CORE_GATEWAY_BASE_URL", defaults.gateway_base_url),
            gateway_internal_token: string(
                "CORE_GATEWAY_INTERNAL_TOKEN",
                defaults.gateway_internal_token,
            ),
            request_timeout: parse_seconds(&lookup, "CORE_REQUEST_TIMEOUT_SECONDS", defaults.request_timeout),
            turn_worker_count: parse_or(&lookup, "CORE_TURN_WORKER_COUNT", defaults.turn_worker_count),
            default_provider_name: string(
                "CORE_DEFAULT_PROVIDER_NAME",
                defaults.default_provider_name,
            ),
            enabled_provider_names: lookup("CORE_ENABLED_PROVIDER_NAMES")
                .map(|csv| parse_csv(&csv))
                .filter(|names| !names.is_empty())
                .unwrap_or(defaults.enabled_provider_names),
            copilot_bridge_base_url: string(
                "CORE_COPILOT_BRIDGE_BASE_URL",
                defaults.copilot_bridge_base_url,
            ),
            copilot_bridge_token: string("CORE_COPILOT_BRIDGE_TOKEN", defaults.copilot_bridge_token),
            copilot_auto_login_enabled: parse_or(
                &lookup,
                "CORE_COPILOT_AUTO_LOGIN_ENABLED",
                defaults.copilot_auto_login_enabled,
            ),
            copilot_auth_cache_path: string(
                "CORE_COPILOT_AUTH_CACHE_PATH",
                defaults.copilot_auth_cache_path,
            ),
            copilot_login_endpoint: string(
                "CORE_COPILOT_LOGIN_ENDPOINT",
                defaults.copilot_login_endpoint,
            ),
            provider_bridge_timeout: parse_seconds(
                &lookup,
                "CORE_PROVIDER_BRIDGE_TIMEOUT_SECONDS",
                defaults.provider_bridge_timeout,
            ),
            mcp_server_url: string("CORE_MCP_SERVER_URL", defaults.mcp_server_url),
            mcp_server_token: string("CORE_MCP_SERVER_TOKEN", defaults.mcp_server_token),
            mcp_request_timeout: parse_seconds(
                &lookup,
                "CORE_MCP_REQUEST_TIMEOUT_SECONDS",
                defaults.mcp_request_timeout,
            ),
            attachment_download_enabled: parse_or(
                &lookup,
                "CORE_ATTACHMENT_DOWNLOAD_ENABLED",
                defaults.attachment_download_enabled,
            ),
            attachment_download_max_bytes: parse_or(
                &lookup,
                "CORE_ATTACHMENT_DOWNLOAD_MAX_BYTES",
                defaults.attachment_download_max_bytes,
            ),
            attachment_storage_dir: string(
                "CORE_ATTACHMENT_STORAGE_DIR",
                defaults.attachment_storage_dir,
            ),
            workspace_root: string("CORE_WORKSPACE_ROOT", defaults.workspace_root),
        };

        config.warn_insecure_tokens();
        config
    }

    /// Whether the readiness preconditions hold.
    #[must_use]
    pub fn is_ready_configured(&self) -> bool {
        !self.api_token.is_empty() && !self.gateway_base_url.is_empty()
    }

    fn warn_insecure_tokens(&self) {
        if INSECURE_TOKENS.contains(&self.api_token.as_str()) {
            warn!("CORE_API_TOKEN is a development default; replace it in production");
        }
        if INSECURE_TOKENS.contains(&self.gateway_internal_token.as_str()) {
            warn!("CORE_GATEWAY_INTERNAL_TOKEN is a development default; replace it in production");
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_seconds(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|raw| raw.trim().parse::<f64>().ok())
        .filter(|secs| *secs > 0.0)
        .map_or(default, Duration::from_secs_f64)
}

fn parse_csv(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_owned)
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(pairs: &[(&str, &str)]) -> CoreConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        CoreConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_without_env() {
        let config = from_map(&[]);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8081);
        assert_eq!(config.turn_worker_count, 2);
        assert_eq!(config.enabled_provider_names, vec!["github-copilot-sdk"]);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert!(!config.attachment_download_enabled);
        assert_eq!(config.attachment_storage_dir, ".runtime/attachments");
    }

    #[test]
    fn env_overrides_apply() {
        let config = from_map(&[
            ("CORE_HOST", "127.0.0.1"),
            ("CORE_PORT", "9999"),
            ("CORE_API_TOKEN", "real-token"),
            ("CORE_TURN_WORKER_COUNT", "4"),
            ("CORE_REQUEST_TIMEOUT_SECONDS", "2.5"),
            ("CORE_ATTACHMENT_DOWNLOAD_ENABLED", "true"),
        ]);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9999);
        assert_eq!(config.api_token, "real-token");
        assert_eq!(config.turn_worker_count, 4);
        assert_eq!(config.request_timeout, Duration::from_secs_f64(2.5));
        assert!(config.attachment_download_enabled);
    }

    #[test]
    fn provider_csv_parsed() {
        let config = from_map(&[(
            "CORE_ENABLED_PROVIDER_NAMES",
            " github-copilot-sdk , other-bridge ,",
        )]);
        assert_eq!(
            config.enabled_provider_names,
            vec!["github-copilot-sdk", "other-bridge"]
        );
    }

    #[test]
    fn empty_provider_csv_falls_back() {
        let config = from_map(&[("CORE_ENABLED_PROVIDER_NAMES", " , ")]);
        assert_eq!(config.enabled_provider_names, vec!["github-copilot-sdk"]);
    }

    #[test]
    fn unparseable_values_fall_back() {
        let config = from_map(&[
            ("CORE_PORT", "not-a-port"),
            ("CORE_REQUEST_TIMEOUT_SECONDS", "-3"),
        ]);
        assert_eq!(config.port, 8081);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn readiness_requires_token_and_gateway() {
        let ready = from_map(&[
            ("CORE_API_TOKEN", "tok"),
            ("CORE_GATEWAY_BASE_URL", "http://gw"),
        ]);
        assert!(ready.is_ready_configured());

        let mut missing = ready.clone();
        missing.api_token = String::new();
        assert!(!missing.is_ready_configured());

        let mut missing = ready;
        missing.gateway_base_url = String::new();
        assert!(!missing.is_ready_configured());
    }
}
