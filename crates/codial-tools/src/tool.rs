//! The built-in tool trait and its outcome type.

use async_trait::async_trait;
use serde_json::{Map, Value};

use codial_bridge::ToolSpec;

/// What one tool invocation produced.
///
/// Failures here are tool results, not engine errors: they travel back to
/// the provider bridge as `ok: false` so the model can react.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ToolOutcome {
    /// Whether the invocation succeeded.
    pub ok: bool,
    /// Text result on success.
    pub output: String,
    /// Error message on failure.
    pub error: String,
    /// Extra structured facts (byte counts, exit codes, ...).
    pub metadata: Map<String, Value>,
}

impl ToolOutcome {
    /// A successful outcome with text output.
    #[must_use]
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            ok: true,
            output: output.into(),
            ..Self::default()
        }
    }

    /// A failed outcome with an error message.
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: error.into(),
            ..Self::default()
        }
    }

    /// Attach a metadata field.
    #[must_use]
    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        let _ = self.metadata.insert(key.to_owned(), value.into());
        self
    }

    /// Render the success payload handed to the bridge:
    /// `{"output": ..., <metadata fields>}`.
    #[must_use]
    pub fn into_payload(self) -> Value {
        let mut map = self.metadata;
        let _ = map.insert("output".to_owned(), Value::String(self.output));
        Value::Object(map)
    }
}

/// One built-in tool.
///
/// Implementations must be `Send + Sync`; the registry shares them across
/// workers. Argument validation happens inside `execute`: a bad argument is
/// a failed [`ToolOutcome`], never a panic.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name the model calls.
    fn name(&self) -> &str;

    /// What the tool does, phrased for the model.
    fn description(&self) -> &str;

    /// JSON schema of the arguments object.
    fn input_schema(&self) -> Value;

    /// Run the tool.
    async fn execute(&self, arguments: &Value) -> ToolOutcome;

    /// The manifest entry handed to the provider bridge.
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_owned(),
            title: None,
            description: Some(self.description().to_owned()),
            input_schema: self.input_schema(),
            output_schema: None,
        }
    }
}

/// Read a required non-blank string argument.
pub(crate) fn required_str<'a>(arguments: &'a Value, key: &str) -> Result<&'a str, ToolOutcome> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolOutcome::failure(format!("the `{key}` argument is required")))
}

/// Read an optional non-blank string argument.
pub(crate) fn optional_str<'a>(arguments: &'a Value, key: &str) -> Option<&'a str> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
