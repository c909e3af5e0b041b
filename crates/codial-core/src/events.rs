//! Turn progress events.
//!
//! Each turn emits a sequence of structured events that the gateway renders
//! into the session channel. The envelope is the wire contract with the
//! gateway's `/internal/stream-events` endpoint: events carry
//! `(session_id, turn_id, type, payload)` and arrive in emission order per
//! turn.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::ErrorEnvelope;
use crate::ids::{SessionId, TraceId, TurnId};

// ─────────────────────────────────────────────────────────────────────────────
// TurnEventType
// ─────────────────────────────────────────────────────────────────────────────

/// The closed set of event types the gateway understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnEventType {
    /// The engine announced its execution plan.
    Plan,
    /// A discrete step happened (tool call, policy load, ingest, ...).
    Action,
    /// Round-boundary summary of what the provider decided.
    DecisionSummary,
    /// Incremental response text.
    ResponseDelta,
    /// Terminal event; exactly one per turn on success or budget exhaustion.
    Final,
    /// Terminal failure.
    Error,
}

impl TurnEventType {
    /// Wire name of the event type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Action => "action",
            Self::DecisionSummary => "decision_summary",
            Self::ResponseDelta => "response_delta",
            Self::Final => "final",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for TurnEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TurnEvent
// ─────────────────────────────────────────────────────────────────────────────

/// A single progress event scoped to `(session_id, turn_id)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TurnEvent {
    /// Owning session.
    pub session_id: SessionId,
    /// Owning turn.
    pub turn_id: TurnId,
    /// Trace ID of the originating request, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<TraceId>,
    /// Event type.
    #[serde(rename = "type")]
    pub event_type: TurnEventType,
    /// Type-specific payload; text-bearing events use `{"text": ...}`.
    pub payload: Value,
}

impl TurnEvent {
    /// Build an event with an arbitrary payload.
    #[must_use]
    pub fn new(
        session_id: SessionId,
        turn_id: TurnId,
        event_type: TurnEventType,
        payload: Value,
    ) -> Self {
        Self {
            session_id,
            turn_id,
            trace_id: None,
            event_type,
            payload,
        }
    }

    /// Attach the originating trace ID.
    #[must_use]
    pub fn with_trace(mut self, trace_id: TraceId) -> Self {
        self.trace_id = Some(trace_id);
        self
    }

    /// Build a text-payload event.
    #[must_use]
    pub fn text(
        session_id: SessionId,
        turn_id: TurnId,
        event_type: TurnEventType,
        text: impl Into<String>,
    ) -> Self {
        Self::new(session_id, turn_id, event_type, json!({ "text": text.into() }))
    }

    /// Build a terminal `error` event from an [`ErrorEnvelope`].
    #[must_use]
    pub fn from_error(session_id: SessionId, turn_id: TurnId, envelope: &ErrorEnvelope) -> Self {
        Self::new(
            session_id,
            turn_id,
            TurnEventType::Error,
            json!({
                "text": envelope.message,
                "error_code": envelope.error_code,
                "retryable": envelope.retryable,
            }),
        )
        .with_trace(envelope.trace_id.clone())
    }

    /// The `text` field of the payload, if present.
    #[must_use]
    pub fn payload_text(&self) -> Option<&str> {
        self.payload.get("text").and_then(Value::as_str)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::codes;

    fn ids() -> (SessionId, TurnId) {
        (SessionId::from("s-1"), TurnId::from("t-1"))
    }

    // -- TurnEventType --

    #[test]
    fn event_type_wire_names() {
        assert_eq!(TurnEventType::Plan.as_str(), "plan");
        assert_eq!(TurnEventType::DecisionSummary.as_str(), "decision_summary");
        assert_eq!(TurnEventType::ResponseDelta.as_str(), "response_delta");
        assert_eq!(TurnEventType::Final.as_str(), "final");
    }

    #[test]
    fn event_type_serde_snake_case() {
        let json = serde_json::to_string(&TurnEventType::DecisionSummary).unwrap();
        assert_eq!(json, "\"decision_summary\"");
        let back: TurnEventType = serde_json::from_str("\"response_delta\"").unwrap();
        assert_eq!(back, TurnEventType::ResponseDelta);
    }

    // -- TurnEvent --

    #[test]
    fn text_event_payload() {
        let (sid, tid) = ids();
        let event = TurnEvent::text(sid, tid, TurnEventType::Plan, "planning");
        assert_eq!(event.payload_text(), Some("planning"));
        assert_eq!(event.event_type, TurnEventType::Plan);
    }

    #[test]
    fn event_wire_shape() {
        let (sid, tid) = ids();
        let event = TurnEvent::text(sid, tid, TurnEventType::Action, "did a thing");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["session_id"], "s-1");
        assert_eq!(value["turn_id"], "t-1");
        assert_eq!(value["type"], "action");
        assert_eq!(value["payload"]["text"], "did a thing");
        assert!(value.get("trace_id").is_none(), "absent trace id is omitted");
    }

    #[test]
    fn event_with_trace_serializes_trace() {
        let (sid, tid) = ids();
        let event = TurnEvent::text(sid, tid, TurnEventType::Final, "done")
            .with_trace(TraceId::from("tr-1"));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["trace_id"], "tr-1");
    }

    #[test]
    fn error_event_from_envelope() {
        let (sid, tid) = ids();
        let envelope = ErrorEnvelope::new(
            codes::TOOL_BUDGET_EXCEEDED,
            "tool budget exhausted",
            TraceId::from("tr-2"),
            false,
        );
        let event = TurnEvent::from_error(sid, tid, &envelope);
        assert_eq!(event.event_type, TurnEventType::Error);
        assert_eq!(event.payload["error_code"], "TOOL_BUDGET_EXCEEDED");
        assert_eq!(event.payload["retryable"], false);
        assert_eq!(event.trace_id, Some(TraceId::from("tr-2")));
    }

    #[test]
    fn event_serde_roundtrip() {
        let (sid, tid) = ids();
        let event = TurnEvent::text(sid, tid, TurnEventType::ResponseDelta, "partial");
        let json = serde_json::to_string(&event).unwrap();
        let back: TurnEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn payload_text_absent_for_structured_payload() {
        let (sid, tid) = ids();
        let event = TurnEvent::new(sid, tid, TurnEventType::Action, json!({"tool": "fs.read"}));
        assert_eq!(event.payload_text(), None);
    }
}
