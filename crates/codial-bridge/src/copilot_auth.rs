//! Copilot auth bootstrap.
//!
//! Resolves the bridge token at startup, in order:
//!
//! 1. injected token (`CORE_COPILOT_BRIDGE_TOKEN`)
//! 2. cache file (`{token, obtained_at}` JSON)
//! 3. the bridge's login endpoint (when auto-login is enabled)
//!
//! On success the cache file is refreshed. The cache holds a credential, so
//! it is written atomically with permissions 0600. Login responses vary
//! between bridge builds; the token is accepted under several keys,
//! including nested under `data`.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};
use tracing::{info, instrument};

use crate::provider::{BridgeError, BridgeResult};

/// Token keys accepted in a login response.
const TOKEN_KEYS: &[&str] = &["token", "access_token", "bearer_token", "api_key"];

/// Configuration for the auth bootstrap.
#[derive(Clone, Debug)]
pub struct CopilotAuthConfig {
    /// Copilot bridge base URL.
    pub bridge_base_url: String,
    /// Injected token; when non-empty it wins outright.
    pub bridge_token: String,
    /// Per-call timeout for the login request.
    pub timeout: Duration,
    /// Cache file path; relative paths resolve under `workspace_root`.
    pub cache_path: String,
    /// Workspace root for relative cache paths.
    pub workspace_root: String,
    /// Whether to call the login endpoint when no token is available.
    pub auto_login_enabled: bool,
    /// Login endpoint path on the bridge (e.g. `/v1/auth/login`).
    pub login_endpoint: String,
}

/// Resolves and caches the Copilot bridge token.
pub struct CopilotAuthBootstrapper {
    config: CopilotAuthConfig,
}

impl CopilotAuthBootstrapper {
    /// Create a bootstrapper.
    #[must_use]
    pub fn new(config: CopilotAuthConfig) -> Self {
        Self { config }
    }

    /// Resolve a usable token, refreshing the cache on success.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Auth`] when no token can be obtained and
    /// auto-login is disabled or rejected; transient login failures map to
    /// [`BridgeError::Timeout`] / [`BridgeError::Api`].
    #[instrument(skip(self))]
    pub async fn ensure_token(&self) -> BridgeResult<String> {
        if !self.config.bridge_token.is_empty() {
            self.write_cached_token(&self.config.bridge_token)?;
            info!(source = "env", cache = %self.cache_file_path().display(), "copilot auth ready");
            return Ok(self.config.bridge_token.clone());
        }

        if let Some(token) = self.read_cached_token() {
            info!(source = "cache", cache = %self.cache_file_path().display(), "copilot auth ready");
            return Ok(token);
        }

        if !self.config.auto_login_enabled {
            return Err(BridgeError::Auth {
                message: "no Copilot token available and auto-login is disabled".into(),
            });
        }

        let token = self.request_login_token().await?;
        self.write_cached_token(&token)?;
        info!(source = "login", cache = %self.cache_file_path().display(), "copilot auth ready");
        Ok(token)
    }

    /// Resolve the cache file path against the workspace root.
    fn cache_file_path(&self) -> PathBuf {
        let candidate = PathBuf::from(&self.config.cache_path);
        if candidate.is_absolute() {
            candidate
        } else {
            PathBuf::from(&self.config.workspace_root).join(candidate)
        }
    }

    /// Read a cached token; any unreadable or malformed cache is ignored.
    fn read_cached_token(&self) -> Option<String> {
        let text = std::fs::read_to_string(self.cache_file_path()).ok()?;
        let payload: Value = serde_json::from_str(&text).ok()?;
        payload
            .get("token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_owned)
    }

    /// Write the cache file atomically with 0600 permissions.
    fn write_cached_token(&self, token: &str) -> BridgeResult<()> {
        let path = self.cache_file_path();
        let payload = json!({
            "token": token,
            "obtained_at": chrono::Utc::now().to_rfc3339(),
        });
        atomic_write_secret(&path, payload.to_string().as_bytes()).map_err(|e| {
            BridgeError::Transport {
                message: format!("failed to write auth cache: {e}"),
            }
        })
    }

    /// POST the login endpoint and extract a token from the response.
    async fn request_login_token(&self) -> BridgeResult<String> {
        let base_url = self.config.bridge_base_url.trim_end_matches('/');
        if base_url.is_empty() {
            return Err(BridgeError::NotConfigured {
                provider: "github-copilot-sdk".into(),
            });
        }

        let endpoint = self.config.login_endpoint.trim();
        let login_path = if endpoint.starts_with('/') {
            endpoint.to_owned()
        } else {
            format!("/{endpoint}")
        };

        let http = reqwest::Client::builder()
            .timeout(self.config.timeout)
            .build()
            .map_err(|e| BridgeError::Transport {
                message: e.to_string(),
            })?;

        let response = http
            .post(format!("{base_url}{login_path}"))
            .json(&json!({}))
            .send()
            .await
            .map_err(|e| BridgeError::from_reqwest("github-copilot-sdk", &e))?;

        let status = response.status().as_u16();
        if status >= 500 {
            return Err(BridgeError::Api {
                status,
                message: "Copilot login endpoint returned a server error".into(),
            });
        }
        if status >= 400 {
            return Err(BridgeError::Auth {
                message: format!("Copilot login was rejected (status {status})"),
            });
        }

        let body: Value = response.json().await.map_err(|_| BridgeError::Auth {
            message: "Copilot login response was not JSON".into(),
        })?;

        extract_token(&body).ok_or_else(|| BridgeError::Auth {
            message: "Copilot login response contained no token".into(),
        })
    }
}

/// Find a token under the accepted keys, including nested under `data`.
#[must_use]
pub fn extract_token(body: &Value) -> Option<String> {
    let obj = body.as_object()?;

    for key in TOKEN_KEYS {
        if let Some(token) = obj.get(*key).and_then(Value::as_str).filter(|t| !t.is_empty()) {
            return Some(token.to_owned());
        }
    }

    obj.get("data").and_then(extract_token)
}

/// Write a secret file: temp file in the same directory, 0600, then rename.
fn atomic_write_secret(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| std::io::Error::other("path has no parent"))?;
    std::fs::create_dir_all(parent)?;

    let tmp_name = format!(
        ".{}.tmp-{}-{}",
        path.file_name().and_then(|v| v.to_str()).unwrap_or("auth"),
        std::process::id(),
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0),
    );
    let tmp_path = parent.join(tmp_name);

    {
        let mut file = std::fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&tmp_path)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(content)?;
        file.sync_all()?;
    }

    std::fs::rename(&tmp_path, path)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
