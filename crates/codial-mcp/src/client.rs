//! MCP JSON-RPC client.
//!
//! One [`McpClient`] owns one logical connection to an MCP server. Requests
//! carry strictly-monotonic integer ids; responses are matched by id by the
//! HTTP request/response pairing. The lifecycle is:
//!
//! 1. `initialize` (no protocol/session headers yet)
//! 2. `notifications/initialized`
//! 3. ready — discovery, `tools/call`, `ping`
//!
//! The server may assign a session via the `MCP-Session-Id` response
//! header; once seen, it is echoed on every subsequent request, as is the
//! negotiated `MCP-Protocol-Version`.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::errors::McpError;
use crate::protocol::{
    McpInitializeResult, McpPrompt, McpResource, McpResourceTemplate, McpTool, JSONRPC_VERSION,
    MCP_PROTOCOL_VERSION,
};

/// Client identification sent in `initialize`.
const CLIENT_NAME: &str = "codial-core";
const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Mutable connection state guarded by one short lock.
#[derive(Debug, Default)]
struct ConnState {
    protocol_version: Option<String>,
    session_id: Option<String>,
    initialized: Option<McpInitializeResult>,
}

/// MCP client over HTTP JSON-RPC.
#[derive(Debug)]
pub struct McpClient {
    server_url: String,
    token: Option<String>,
    http: reqwest::Client,
    next_id: AtomicI64,
    state: Mutex<ConnState>,
}

impl McpClient {
    /// Create a client for `server_url` with an optional bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::NotConfigured`] when `server_url` is empty.
    pub fn new(
        server_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, McpError> {
        let server_url = server_url.trim_end_matches('/').to_owned();
        if server_url.is_empty() {
            return Err(McpError::NotConfigured);
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| McpError::Transport(e.to_string()))?;

        Ok(Self {
            server_url,
            token: token.filter(|t| !t.is_empty()),
            http,
            next_id: AtomicI64::new(0),
            state: Mutex::new(ConnState::default()),
        })
    }

    /// Strictly-monotonic request id.
    fn allocate_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Run the `initialize` handshake, idempotently.
    ///
    /// A second call returns the cached result without re-initializing.
    #[instrument(skip(self))]
    pub async fn ensure_initialized(&self) -> Result<McpInitializeResult, McpError> {
        if let Some(cached) = self.state.lock().initialized.clone() {
            return Ok(cached);
        }
        self.initialize().await
    }

    /// Run the `initialize` handshake unconditionally.
    pub async fn initialize(&self) -> Result<McpInitializeResult, McpError> {
        let params = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": CLIENT_NAME,
                "version": CLIENT_VERSION,
            },
        });

        // initialize must not carry the protocol/session headers.
        let result = self.request("initialize", params, false).await?;

        let protocol_version = result
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or(MCP_PROTOCOL_VERSION)
            .to_owned();

        let server_info = result.get("serverInfo");
        let init = McpInitializeResult {
            server_name: server_info
                .and_then(|s| s.get("name"))
                .and_then(Value::as_str)
                .map(str::to_owned),
            server_version: server_info
                .and_then(|s| s.get("version"))
                .and_then(Value::as_str)
                .map(str::to_owned),
            protocol_version: Some(protocol_version.clone()),
            instructions: result
                .get("instructions")
                .and_then(Value::as_str)
                .map(str::to_owned),
            session_id: self.state.lock().session_id.clone(),
        };

        self.state.lock().protocol_version = Some(protocol_version);

        self.notify("notifications/initialized").await?;

        // Session id may have arrived on either response.
        let mut init = init;
        let mut state = self.state.lock();
        init.session_id = state.session_id.clone();
        state.initialized = Some(init.clone());
        drop(state);
        debug!(server = ?init.server_name, "mcp initialized");
        Ok(init)
    }

    /// List all tools, following `nextCursor` pagination.
    pub async fn list_tools(&self) -> Result<Vec<McpTool>, McpError> {
        let items = self.list_paginated("tools/list", "tools").await?;
        Ok(parse_items(items))
    }

    /// List all prompts.
    pub async fn list_prompts(&self) -> Result<Vec<McpPrompt>, McpError> {
        let items = self.list_paginated("prompts/list", "prompts").await?;
        Ok(parse_items(items))
    }

    /// List all resources.
    pub async fn list_resources(&self) -> Result<Vec<McpResource>, McpError> {
        let items = self.list_paginated("resources/list", "resources").await?;
        Ok(parse_items(items))
    }

    /// List all resource templates.
    pub async fn list_resource_templates(&self) -> Result<Vec<McpResourceTemplate>, McpError> {
        let items = self
            .list_paginated("resources/templates/list", "resourceTemplates")
            .await?;
        Ok(parse_items(items))
    }

    /// Invoke a tool; returns the raw result object.
    #[instrument(skip(self, arguments), fields(tool = name))]
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, McpError> {
        let result = self
            .request("tools/call", json!({"name": name, "arguments": arguments}), true)
            .await?;
        if !result.is_object() {
            return Err(McpError::Protocol("tools/call result is not an object".into()));
        }
        Ok(result)
    }

    /// Liveness check against the server.
    pub async fn ping(&self) -> Result<(), McpError> {
        let _ = self.request("ping", json!({}), true).await?;
        Ok(())
    }

    /// Fetch all pages of a list method.
    ///
    /// A repeated `nextCursor` value is a protocol violation (it would loop
    /// forever otherwise).
    async fn list_paginated(&self, method: &str, list_key: &str) -> Result<Vec<Value>, McpError> {
        let mut items: Vec<Value> = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen_cursors: std::collections::HashSet<String> = std::collections::HashSet::new();

        loop {
            let params = match &cursor {
                Some(c) => json!({"cursor": c}),
                None => json!({}),
            };
            let result = self.request(method, params, true).await?;

            if let Some(page) = result.get(list_key).and_then(Value::as_array) {
                items.extend(page.iter().filter(|item| item.is_object()).cloned());
            }

            match result.get("nextCursor").and_then(Value::as_str) {
                Some(next) if !next.is_empty() => {
                    if !seen_cursors.insert(next.to_owned()) {
                        return Err(McpError::Protocol(format!(
                            "pagination cursor cycle detected in {method}"
                        )));
                    }
                    cursor = Some(next.to_owned());
                }
                _ => break,
            }
        }

        Ok(items)
    }

    /// Send a JSON-RPC request and return its `result` field.
    async fn request(
        &self,
        method: &str,
        params: Value,
        negotiated_headers: bool,
    ) -> Result<Value, McpError> {
        let id = self.allocate_id();
        let payload = json!({
            "jsonrpc": JSONRPC_VERSION,
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .send(payload, negotiated_headers, true)
            .await
            .map_err(|e| match e {
                SendFailure::Reqwest(err) => McpError::from_reqwest(method, &err),
                SendFailure::Server(status) => McpError::Server { status },
            })?;

        let data: Value = response
            .json()
            .await
            .map_err(|e| McpError::Protocol(format!("invalid JSON body: {e}")))?;

        parse_rpc_body(data)
    }

    /// Send a JSON-RPC notification (no id, no result expected).
    async fn notify(&self, method: &str) -> Result<(), McpError> {
        let payload = json!({
            "jsonrpc": JSONRPC_VERSION,
            "method": method,
        });

        let response = self
            .send(payload, true, false)
            .await
            .map_err(|e| match e {
                SendFailure::Reqwest(err) => McpError::from_reqwest(method, &err),
                SendFailure::Server(status) => McpError::Server { status },
            })?;

        // Notifications may return an empty body; an error object is still
        // surfaced if the server sends one.
        let bytes = response
            .bytes()
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;
        if bytes.is_empty() {
            return Ok(());
        }
        if let Ok(data) = serde_json::from_slice::<Value>(&bytes) {
            if data.get("error").is_some() {
                let _ = parse_rpc_body(data)?;
            }
        }
        Ok(())
    }

    /// POST one payload, capturing any `MCP-Session-Id` response header.
    async fn send(
        &self,
        payload: Value,
        negotiated_headers: bool,
        accept_header: bool,
    ) -> Result<reqwest::Response, SendFailure> {
        let mut request = self.http.post(&self.server_url).json(&payload);

        if accept_header {
            request = request.header("Accept", "application/json, text/event-stream");
        }
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if negotiated_headers {
            let state = self.state.lock();
            if let Some(version) = &state.protocol_version {
                request = request.header("MCP-Protocol-Version", version);
            }
            if let Some(session) = &state.session_id {
                request = request.header("MCP-Session-Id", session);
            }
        }

        let response = request.send().await.map_err(SendFailure::Reqwest)?;

        if let Some(session) = response
            .headers()
            .get("MCP-Session-Id")
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.is_empty())
        {
            self.state.lock().session_id = Some(session.to_owned());
        }

        let status = response.status();
        if status.is_server_error() {
            return Err(SendFailure::Server(status.as_u16()));
        }
        let response = response
            .error_for_status()
            .map_err(SendFailure::Reqwest)?;

        Ok(response)
    }
}

enum SendFailure {
    Reqwest(reqwest::Error),
    Server(u16),
}

/// Validate a JSON-RPC response body and extract its `result`.
fn parse_rpc_body(data: Value) -> Result<Value, McpError> {
    if !data.is_object() {
        return Err(McpError::Protocol("response is not a JSON object".into()));
    }

    if let Some(error) = data.get("error") {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(-32603);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown MCP error")
            .to_owned();
        return Err(McpError::Rpc { code, message });
    }

    match data.get("result") {
        Some(result) => Ok(result.clone()),
        None => Err(McpError::Protocol("response has neither result nor error".into())),
    }
}

/// Deserialize list items, skipping any that do not conform.
fn parse_items<T: serde::de::DeserializeOwned>(items: Vec<Value>) -> Vec<T> {
    items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> McpClient {
        McpClient::new("http://localhost:9", None, Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn empty_url_is_not_configured() {
        let err = McpClient::new("", None, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, McpError::NotConfigured));
    }

    #[test]
    fn trailing_slash_stripped() {
        let c = McpClient::new("http://host/mcp/", None, Duration::from_secs(1)).unwrap();
        assert_eq!(c.server_url, "http://host/mcp");
    }

    #[test]
    fn request_ids_strictly_monotonic() {
        let c = client();
        let a = c.allocate_id();
        let b = c.allocate_id();
        let d = c.allocate_id();
        assert_eq!((a, b, d), (1, 2, 3));
    }

    #[test]
    fn empty_token_treated_as_absent() {
        let c = McpClient::new("http://host", Some(String::new()), Duration::from_secs(1)).unwrap();
        assert!(c.token.is_none());
    }

    // -- parse_rpc_body --

    #[test]
    fn parse_body_extracts_result() {
        let result = parse_rpc_body(json!({"jsonrpc": "2.0", "id": 1, "result": {"ok": true}}));
        assert_eq!(result.unwrap()["ok"], true);
    }

    #[test]
    fn parse_body_surfaces_rpc_error() {
        let err = parse_rpc_body(json!({
            "jsonrpc": "2.0", "id": 1,
            "error": {"code": -32601, "message": "method not found"}
        }))
        .unwrap_err();
        match err {
            McpError::Rpc { code, message } => {
                assert_eq!(code, -32601);
                assert_eq!(message, "method not found");
            }
            other => panic!("expected rpc error, got {other:?}"),
        }
    }

    #[test]
    fn parse_body_rejects_missing_result() {
        let err = parse_rpc_body(json!({"jsonrpc": "2.0", "id": 1})).unwrap_err();
        assert!(matches!(err, McpError::Protocol(_)));
    }

    #[test]
    fn parse_body_rejects_non_object() {
        assert!(parse_rpc_body(json!([1, 2])).is_err());
    }

    #[test]
    fn parse_body_defaults_error_fields() {
        let err = parse_rpc_body(json!({"error": {}})).unwrap_err();
        match err {
            McpError::Rpc { code, message } => {
                assert_eq!(code, -32603);
                assert_eq!(message, "unknown MCP error");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    // -- parse_items --

    #[test]
    fn parse_items_skips_nonconforming() {
        let items = vec![
            json!({"name": "good"}),
            json!({"no_name_field": true}),
            json!({"name": "also-good"}),
        ];
        let tools: Vec<McpTool> = parse_items(items);
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "good");
    }
}
