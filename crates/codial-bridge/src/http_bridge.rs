//! HTTP provider bridge.
//!
//! Talks to an external bridge service implementing one vendor's protocol.
//! The wire contract is a single `POST {base}/v1/generate` carrying the
//! composed request; the response is either terminal text or a list of tool
//! requests. Parsing is deliberately tolerant: tool requests are accepted
//! under `tool_requests` or `tool_calls`, and call ids under `call_id` or
//! `id`, because bridge implementations differ.

use std::time::Duration;

use serde_json::{json, Value};
use tracing::instrument;

use codial_core::ids::ToolCallId;

use crate::provider::{
    BridgeError, BridgeRequest, BridgeResponse, BridgeResult, ProviderBridge, ToolRequest,
};

/// A provider bridge reached over HTTP.
pub struct HttpBridge {
    name: String,
    base_url: String,
    token: Option<String>,
    provider_hint: String,
    http: reqwest::Client,
}

impl HttpBridge {
    /// Create a bridge client.
    ///
    /// `provider_hint` is the human-readable vendor name used in error and
    /// summary text.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Transport`] when the HTTP client cannot be
    /// constructed.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
        provider_hint: impl Into<String>,
    ) -> BridgeResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BridgeError::Transport {
                message: e.to_string(),
            })?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            token: token.filter(|t| !t.is_empty()),
            provider_hint: provider_hint.into(),
            http,
        })
    }
}

#[async_trait::async_trait]
impl ProviderBridge for HttpBridge {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip_all, fields(provider = self.name, round = request.tool_call_round))]
    async fn generate(&self, request: &BridgeRequest) -> BridgeResult<BridgeResponse> {
        if self.base_url.is_empty() {
            return Err(BridgeError::NotConfigured {
                provider: self.name.clone(),
            });
        }

        let payload = build_payload(request);
        let mut http_request = self
            .http
            .post(format!("{}/v1/generate", self.base_url))
            .json(&payload);
        if let Some(token) = &self.token {
            http_request = http_request.bearer_auth(token);
        }

        let response = http_request
            .send()
            .await
            .map_err(|e| BridgeError::from_reqwest(&self.name, &e))?;

        let status = response.status().as_u16();
        match status {
            401 | 403 => {
                return Err(BridgeError::Auth {
                    message: format!("{} bridge rejected credentials ({status})", self.provider_hint),
                });
            }
            429 => {
                let retry_after_ms = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(codial_core::retry::retry_after_hint)
                    .map_or(1_000, |hint| hint.as_millis() as u64);
                return Err(BridgeError::RateLimited { retry_after_ms });
            }
            s if s >= 400 => {
                return Err(BridgeError::Api {
                    status: s,
                    message: format!("{} bridge returned {s}", self.provider_hint),
                });
            }
            _ => {}
        }

        let body: Value = response.json().await.map_err(|e| BridgeError::Protocol {
            message: format!("invalid JSON from {} bridge: {e}", self.provider_hint),
        })?;
        if !body.is_object() {
            return Err(BridgeError::Protocol {
                message: format!("{} bridge response is not an object", self.provider_hint),
            });
        }

        Ok(parse_response(&body, &self.provider_hint))
    }
}

/// Serialize a [`BridgeRequest`] into the bridge wire payload.
#[must_use]
pub fn build_payload(request: &BridgeRequest) -> Value {
    json!({
        "session_id": request.session_id,
        "user_id": request.user_id,
        "provider": request.provider,
        "model": request.model,
        "text": request.text,
        "mcp_enabled": request.mcp_enabled,
        "mcp_profile_name": request.mcp_profile_name,
        "system_context": request.system_context,
        "tool_call_round": request.tool_call_round,
        "tools": request.tool_specs,
        "tool_results": request.tool_results,
        "attachments": request.attachments,
    })
}

/// Parse a bridge response body.
fn parse_response(body: &Value, provider_hint: &str) -> BridgeResponse {
    let output_text = body
        .get("output_text")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_owned();

    let tool_requests = parse_tool_requests(body);

    let decision_summary = body
        .get("decision_summary")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or_else(|| {
            if tool_requests.is_empty() {
                format!("{provider_hint} produced a response")
            } else {
                format!("{provider_hint} requested tool calls")
            }
        });

    BridgeResponse {
        output_text,
        decision_summary,
        tool_requests,
    }
}

/// Extract tool requests, tolerating both key spellings.
///
/// Entries without a usable name are skipped; entries without a call id get
/// a fresh one so results can still be correlated within the round.
#[must_use]
pub fn parse_tool_requests(body: &Value) -> Vec<ToolRequest> {
    let raw = body
        .get("tool_requests")
        .and_then(Value::as_array)
        .or_else(|| body.get("tool_calls").and_then(Value::as_array));
    let Some(raw) = raw else {
        return Vec::new();
    };

    let mut requests = Vec::new();
    for item in raw {
        let Some(name) = item
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|n| !n.is_empty())
        else {
            continue;
        };

        let arguments = item
            .get("arguments")
            .filter(|v| v.is_object())
            .cloned()
            .unwrap_or_else(|| json!({}));

        let tool_call_id = item
            .get("call_id")
            .and_then(Value::as_str)
            .or_else(|| item.get("id").and_then(Value::as_str))
            .map_or_else(ToolCallId::new, ToolCallId::from);

        requests.push(ToolRequest {
            tool_call_id,
            name: name.to_owned(),
            arguments,
        });
    }

    requests
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
