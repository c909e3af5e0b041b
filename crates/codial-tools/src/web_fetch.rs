//! Web fetch tool.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tool::{required_str, Tool, ToolOutcome};

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
/// Cap on returned body bytes.
const MAX_BODY_BYTES: usize = 1_000_000;
/// Redirect hop limit.
const MAX_REDIRECTS: usize = 5;

/// Fetches text content from an HTTP(S) URL.
pub struct WebFetchTool {
    http: reqwest::Client,
    max_bytes: usize,
}

impl WebFetchTool {
    /// Create the tool with default limits.
    #[must_use]
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .unwrap_or_default();
        Self {
            http,
            max_bytes: MAX_BODY_BYTES,
        }
    }
}

impl Default for WebFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch text content from a URL: web pages, API responses, remote files."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "URL to fetch; must start with http:// or https://."
                },
                "method": {
                    "type": "string",
                    "enum": ["GET", "POST"],
                    "description": "HTTP method; defaults to GET."
                },
                "headers": {
                    "type": "object",
                    "description": "Extra HTTP headers.",
                    "additionalProperties": {"type": "string"}
                },
                "body": {
                    "type": "string",
                    "description": "Request body for POST."
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, arguments: &Value) -> ToolOutcome {
        let url = match required_str(arguments, "url") {
            Ok(url) => url,
            Err(outcome) => return outcome,
        };
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return ToolOutcome::failure("the url must start with http:// or https://");
        }

        let method = arguments.get("method").and_then(Value::as_str).unwrap_or("GET");
        let mut request = match method {
            "GET" => self.http.get(url),
            "POST" => {
                let mut post = self.http.post(url);
                if let Some(body) = arguments.get("body").and_then(Value::as_str) {
                    post = post.body(body.to_owned());
                }
                post
            }
            other => {
                return ToolOutcome::failure(format!("unsupported method `{other}`; use GET or POST"));
            }
        };

        if let Some(headers) = arguments.get("headers").and_then(Value::as_object) {
            for (name, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.header(name, value);
                }
            }
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return ToolOutcome::failure("the request timed out"),
            Err(e) => return ToolOutcome::failure(format!("http request failed: {e}")),
        };

        let status_code = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_owned();

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => return ToolOutcome::failure(format!("failed to read the response body: {e}")),
        };

        let truncated = bytes.len() > self.max_bytes;
        let text = String::from_utf8_lossy(&bytes[..bytes.len().min(self.max_bytes)]).into_owned();

        ToolOutcome::success(text)
            .with_meta("status_code", status_code)
            .with_meta("content_type", content_type)
            .with_meta("byte_count", bytes.len())
            .with_meta("truncated", truncated)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
