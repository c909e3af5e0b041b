//! REST surface.
//!
//! All `/v1/*` routes except health require `Authorization: Bearer
//! <CORE_API_TOKEN>`. Every mutating handler mints a trace ID; failures are
//! rendered as the wire [`ErrorEnvelope`] carrying it, and the same trace
//! ID lands in the log line.

use axum::extract::{Path, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use codial_core::attachments::TurnAttachment;
use codial_core::errors::{codes, ErrorEnvelope};
use codial_core::ids::{SessionId, TraceId};
use codial_runtime::{RuntimeError, SessionRecord, TurnSubmission};

use crate::container::AppState;
use crate::health::{readiness, HealthResponse};

// ─────────────────────────────────────────────────────────────────────────────
// Error rendering
// ─────────────────────────────────────────────────────────────────────────────

/// A handler failure: HTTP status plus the wire envelope.
pub struct ApiError {
    status: StatusCode,
    envelope: ErrorEnvelope,
}

impl ApiError {
    fn new(status: StatusCode, envelope: ErrorEnvelope) -> Self {
        Self { status, envelope }
    }

    fn from_runtime(error: &RuntimeError, trace_id: TraceId) -> Self {
        let envelope = error.to_envelope(trace_id);
        Self {
            status: status_for_code(&envelope.error_code),
            envelope,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.envelope)).into_response()
    }
}

/// Map a stable wire code to its HTTP status.
fn status_for_code(code: &str) -> StatusCode {
    match code {
        codes::SESSION_NOT_FOUND | codes::SUBAGENT_NOT_FOUND => StatusCode::NOT_FOUND,
        codes::SESSION_ENDED => StatusCode::CONFLICT,
        codes::PROVIDER_NOT_ENABLED
        | codes::INDEX_OUT_OF_RANGE
        | codes::POLICY_VIOLATION
        | codes::ATTACHMENT_REJECTED => StatusCode::BAD_REQUEST,
        codes::QUEUE_FULL | codes::SHUTDOWN => StatusCode::SERVICE_UNAVAILABLE,
        codes::AUTH_FAILED => StatusCode::UNAUTHORIZED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Auth middleware
// ─────────────────────────────────────────────────────────────────────────────

/// Bearer-token check for `/v1/*` (health excluded by routing).
async fn require_bearer(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let expected = format!("Bearer {}", state.config.api_token);
    let provided = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if provided != expected {
        let envelope =
            ErrorEnvelope::untraced(codes::AUTH_FAILED, "bearer token missing or invalid", false);
        return ApiError::new(StatusCode::UNAUTHORIZED, envelope).into_response();
    }
    next.run(request).await
}

// ─────────────────────────────────────────────────────────────────────────────
// DTOs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CreateSessionRequest {
    guild_id: String,
    requester_id: String,
    idempotency_key: String,
}

#[derive(Debug, Serialize)]
struct CreateSessionResponse {
    session_id: String,
    status: &'static str,
}

#[derive(Debug, Deserialize)]
struct BindChannelRequest {
    channel_id: String,
}

#[derive(Debug, Serialize)]
struct BindChannelResponse {
    session_id: String,
    channel_id: String,
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct EndSessionResponse {
    session_id: String,
    status: &'static str,
}

#[derive(Debug, Deserialize)]
struct SetProviderRequest {
    provider: String,
}

#[derive(Debug, Deserialize)]
struct SetModelRequest {
    model: String,
}

#[derive(Debug, Deserialize)]
struct SetMcpRequest {
    enabled: bool,
    #[serde(default)]
    profile_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SetSubagentRequest {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
struct SessionConfigResponse {
    session_id: String,
    provider: String,
    model: String,
    mcp_enabled: bool,
    mcp_profile_name: Option<String>,
    subagent_name: Option<String>,
}

impl SessionConfigResponse {
    fn from_record(record: &SessionRecord) -> Self {
        Self {
            session_id: record.session_id.to_string(),
            provider: record.config.provider.clone(),
            model: record.config.model.clone(),
            mcp_enabled: record.config.mcp_enabled,
            mcp_profile_name: record.config.mcp_profile_name.clone(),
            subagent_name: record.config.subagent_name.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubmitTurnRequest {
    // The path owns the session; a body session_id is accepted and ignored.
    #[serde(default)]
    #[allow(dead_code)]
    session_id: Option<String>,
    user_id: String,
    channel_id: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    attachments: Vec<TurnAttachment>,
    idempotency_key: String,
}

#[derive(Debug, Serialize)]
struct SubmitTurnResponse {
    status: &'static str,
    trace_id: String,
    turn_id: String,
}

#[derive(Debug, Deserialize)]
struct RuleAddRequest {
    rule: String,
}

#[derive(Debug, Deserialize)]
struct RuleRemoveRequest {
    index: usize,
}

#[derive(Debug, Serialize)]
struct RulesResponse {
    rules: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Build the full API router over the shared state.
pub fn api_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/v1/sessions", post(create_session))
        .route("/v1/sessions/{id}/bind-channel", post(bind_channel))
        .route("/v1/sessions/{id}/end", post(end_session))
        .route("/v1/sessions/{id}/provider", post(set_provider))
        .route("/v1/sessions/{id}/model", post(set_model))
        .route("/v1/sessions/{id}/mcp", post(set_mcp))
        .route("/v1/sessions/{id}/subagent", post(set_subagent))
        .route("/v1/sessions/{id}/turns", post(submit_turn))
        .route(
            "/v1/codial/rules",
            get(list_rules).post(add_rule).delete(remove_rule),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    let public = Router::new()
        .route("/v1/health/live", get(health_live))
        .route("/v1/health/ready", get(health_ready))
        .route("/metrics", get(render_metrics));

    protected.merge(public).with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Session handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<CreateSessionResponse>, ApiError> {
    let trace_id = TraceId::new();
    let record = state
        .sessions
        .create_session(&request.guild_id, &request.requester_id, &request.idempotency_key)
        .await
        .map_err(|e| fail(&e, trace_id.clone(), "create_session"))?;

    info!(%trace_id, session_id = %record.session_id, guild_id = %request.guild_id, "session create handled");
    Ok(Json(CreateSessionResponse {
        session_id: record.session_id.to_string(),
        status: record.status.as_str(),
    }))
}

async fn bind_channel(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<BindChannelRequest>,
) -> Result<Json<BindChannelResponse>, ApiError> {
    let trace_id = TraceId::new();
    let record = state
        .sessions
        .bind_channel(&SessionId::from(id), &request.channel_id)
        .await
        .map_err(|e| fail(&e, trace_id.clone(), "bind_channel"))?;

    info!(%trace_id, session_id = %record.session_id, channel_id = %request.channel_id, "channel bound");
    Ok(Json(BindChannelResponse {
        session_id: record.session_id.to_string(),
        channel_id: request.channel_id,
        status: record.status.as_str(),
    }))
}

async fn end_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EndSessionResponse>, ApiError> {
    let trace_id = TraceId::new();
    let record = state
        .sessions
        .end_session(&SessionId::from(id))
        .await
        .map_err(|e| fail(&e, trace_id.clone(), "end_session"))?;

    info!(%trace_id, session_id = %record.session_id, "session ended");
    Ok(Json(EndSessionResponse {
        session_id: record.session_id.to_string(),
        status: "ended",
    }))
}

async fn set_provider(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SetProviderRequest>,
) -> Result<Json<SessionConfigResponse>, ApiError> {
    let trace_id = TraceId::new();
    let record = state
        .sessions
        .set_provider(&SessionId::from(id), &request.provider)
        .await
        .map_err(|e| fail(&e, trace_id.clone(), "set_provider"))?;

    info!(%trace_id, session_id = %record.session_id, provider = %request.provider, "provider set");
    Ok(Json(SessionConfigResponse::from_record(&record)))
}

async fn set_model(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SetModelRequest>,
) -> Result<Json<SessionConfigResponse>, ApiError> {
    let trace_id = TraceId::new();
    let record = state
        .sessions
        .set_model(&SessionId::from(id), &request.model)
        .await
        .map_err(|e| fail(&e, trace_id.clone(), "set_model"))?;

    info!(%trace_id, session_id = %record.session_id, model = %request.model, "model set");
    Ok(Json(SessionConfigResponse::from_record(&record)))
}

async fn set_mcp(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SetMcpRequest>,
) -> Result<Json<SessionConfigResponse>, ApiError> {
    let trace_id = TraceId::new();
    let record = state
        .sessions
        .set_mcp(&SessionId::from(id), request.enabled, request.profile_name.as_deref())
        .await
        .map_err(|e| fail(&e, trace_id.clone(), "set_mcp"))?;

    info!(%trace_id, session_id = %record.session_id, enabled = request.enabled, "mcp configured");
    Ok(Json(SessionConfigResponse::from_record(&record)))
}

async fn set_subagent(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SetSubagentRequest>,
) -> Result<Json<SessionConfigResponse>, ApiError> {
    let trace_id = TraceId::new();
    let record = state
        .sessions
        .set_subagent(&SessionId::from(id), request.name.as_deref())
        .await
        .map_err(|e| fail(&e, trace_id.clone(), "set_subagent"))?;

    info!(%trace_id, session_id = %record.session_id, subagent = ?record.config.subagent_name, "subagent set");
    Ok(Json(SessionConfigResponse::from_record(&record)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Turn handler
// ─────────────────────────────────────────────────────────────────────────────

async fn submit_turn(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SubmitTurnRequest>,
) -> Result<(StatusCode, Json<SubmitTurnResponse>), ApiError> {
    let trace_id = TraceId::new();
    let session_id = SessionId::from(id);
    let attachment_count = request.attachments.len();

    let accepted = state
        .turns
        .submit_turn(
            &session_id,
            TurnSubmission {
                user_id: request.user_id.clone(),
                channel_id: request.channel_id.clone(),
                text: request.text,
                attachments: request.attachments,
                idempotency_key: request.idempotency_key,
            },
        )
        .await
        .map_err(|e| fail(&e, trace_id, "submit_turn"))?;

    info!(
        trace_id = %accepted.trace_id,
        %session_id,
        turn_id = %accepted.turn_id,
        user_id = %request.user_id,
        attachment_count,
        "turn accepted"
    );
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitTurnResponse {
            status: "accepted",
            trace_id: accepted.trace_id.to_string(),
            turn_id: accepted.turn_id.to_string(),
        }),
    ))
}

// ─────────────────────────────────────────────────────────────────────────────
// Rules handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn list_rules(State(state): State<AppState>) -> Json<RulesResponse> {
    Json(RulesResponse {
        rules: state.rules.list(),
    })
}

async fn add_rule(
    State(state): State<AppState>,
    Json(request): Json<RuleAddRequest>,
) -> Result<Json<RulesResponse>, ApiError> {
    let trace_id = TraceId::new();
    let rules = state.rules.append(&request.rule).await.map_err(|e| {
        warn!(%trace_id, error = %e, "rule append failed");
        ApiError::new(
            status_for_code(e.wire_code()),
            ErrorEnvelope::new(e.wire_code(), e.to_string(), trace_id.clone(), false),
        )
    })?;

    info!(%trace_id, count = rules.len(), "rule appended");
    Ok(Json(RulesResponse { rules }))
}

async fn remove_rule(
    State(state): State<AppState>,
    Json(request): Json<RuleRemoveRequest>,
) -> Result<Json<RulesResponse>, ApiError> {
    let trace_id = TraceId::new();
    let rules = state.rules.remove(request.index).await.map_err(|e| {
        warn!(%trace_id, index = request.index, error = %e, "rule removal failed");
        ApiError::new(
            status_for_code(e.wire_code()),
            ErrorEnvelope::new(e.wire_code(), e.to_string(), trace_id.clone(), false),
        )
    })?;

    info!(%trace_id, index = request.index, count = rules.len(), "rule removed");
    Ok(Json(RulesResponse { rules }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Health + metrics
// ─────────────────────────────────────────────────────────────────────────────

async fn health_live() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

async fn health_ready(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let response = readiness(
        state.config.is_ready_configured(),
        state.workers_running.load(std::sync::atomic::Ordering::SeqCst),
    );
    let status = if response.status == "ok" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}

async fn render_metrics(State(state): State<AppState>) -> String {
    state
        .metrics_handle
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default()
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn fail(error: &RuntimeError, trace_id: TraceId, operation: &str) -> ApiError {
    warn!(%trace_id, operation, error = %error, code = error.wire_code(), "request failed");
    ApiError::from_runtime(error, trace_id)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_contract() {
        assert_eq!(status_for_code(codes::SESSION_NOT_FOUND), StatusCode::NOT_FOUND);
        assert_eq!(status_for_code(codes::SUBAGENT_NOT_FOUND), StatusCode::NOT_FOUND);
        assert_eq!(status_for_code(codes::SESSION_ENDED), StatusCode::CONFLICT);
        assert_eq!(status_for_code(codes::PROVIDER_NOT_ENABLED), StatusCode::BAD_REQUEST);
        assert_eq!(status_for_code(codes::INDEX_OUT_OF_RANGE), StatusCode::BAD_REQUEST);
        assert_eq!(status_for_code(codes::QUEUE_FULL), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_for_code(codes::SHUTDOWN), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_for_code(codes::AUTH_FAILED), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for_code(codes::INTERNAL_ERROR), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status_for_code("SOMETHING_NEW"), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
