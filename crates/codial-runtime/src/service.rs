//! Session and turn use-cases.
//!
//! The services sit between the REST surface and the stores: they own
//! validation (provider enablement, subagent existence, session
//! lifecycle), default seeding from `AGENTS.md`, and the idempotency
//! discipline for session creation and turn submission.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, instrument};

use codial_bridge::{choose_default_provider, ProviderManager};
use codial_core::attachments::TurnAttachment;
use codial_core::ids::{SessionId, TraceId, TurnId};
use codial_policy::{extract_agent_defaults, PolicyLoader};

use crate::errors::RuntimeError;
use crate::idempotency::{IdempotencyIndex, IdempotencyScope};
use crate::queue::{TurnQueue, TurnTask};
use crate::session_store::{SessionConfig, SessionRecord, SessionStatus, SessionStore};
use crate::turn_store::{TurnRecord, TurnStore};

/// Model used when `AGENTS.md` declares none.
const DEFAULT_MODEL: &str = "gpt-5-mini";
/// MCP toggle used when `AGENTS.md` declares none.
const DEFAULT_MCP_ENABLED: bool = true;
/// MCP profile used when `AGENTS.md` declares none.
const DEFAULT_MCP_PROFILE: &str = "default";

// ─────────────────────────────────────────────────────────────────────────────
// SessionService
// ─────────────────────────────────────────────────────────────────────────────

/// Session lifecycle and configuration use-cases.
pub struct SessionService {
    store: Arc<SessionStore>,
    policy: Arc<PolicyLoader>,
    providers: Arc<ProviderManager>,
    idempotency: Arc<IdempotencyIndex>,
}

impl SessionService {
    /// Create the service.
    #[must_use]
    pub fn new(
        store: Arc<SessionStore>,
        policy: Arc<PolicyLoader>,
        providers: Arc<ProviderManager>,
        idempotency: Arc<IdempotencyIndex>,
    ) -> Self {
        Self {
            store,
            policy,
            providers,
            idempotency,
        }
    }

    /// Create a session, idempotent on `idempotency_key`.
    ///
    /// Defaults come from the current `AGENTS.md`; the default provider is
    /// constrained to the enabled set.
    ///
    /// # Errors
    ///
    /// Store failures; a repeated key within TTL returns the original
    /// session without creating anything.
    #[instrument(skip(self))]
    pub async fn create_session(
        &self,
        guild_id: &str,
        requester_id: &str,
        idempotency_key: &str,
    ) -> Result<SessionRecord, RuntimeError> {
        let value = self
            .idempotency
            .execute(IdempotencyScope::SessionCreate, idempotency_key, || async {
                let snapshot = self.policy.load();
                let defaults = extract_agent_defaults(&snapshot.agents_text);

                let provider = choose_default_provider(
                    defaults.provider.as_deref(),
                    self.providers.enabled_names(),
                );
                let config = SessionConfig {
                    provider,
                    model: defaults.model.unwrap_or_else(|| DEFAULT_MODEL.to_owned()),
                    mcp_enabled: defaults.mcp_enabled.unwrap_or(DEFAULT_MCP_ENABLED),
                    mcp_profile_name: Some(
                        defaults
                            .mcp_profile_name
                            .unwrap_or_else(|| DEFAULT_MCP_PROFILE.to_owned()),
                    ),
                    subagent_name: None,
                };

                let record = SessionRecord::new(guild_id, requester_id, config);
                let session_id = record.session_id.clone();
                self.store.insert(record);
                info!(%session_id, guild_id, "session created");
                Ok::<_, RuntimeError>(json!(session_id.as_str()))
            })
            .await?;

        let session_id = SessionId::from(value.as_str().unwrap_or_default());
        self.store.get(&session_id).await
    }

    /// Read a session.
    pub async fn get(&self, session_id: &SessionId) -> Result<SessionRecord, RuntimeError> {
        self.store.get(session_id).await
    }

    /// Bind the Discord channel.
    pub async fn bind_channel(
        &self,
        session_id: &SessionId,
        channel_id: &str,
    ) -> Result<SessionRecord, RuntimeError> {
        self.store.bind_channel(session_id, channel_id).await
    }

    /// End the session (idempotent); cancels any in-flight turn.
    pub async fn end_session(&self, session_id: &SessionId) -> Result<SessionRecord, RuntimeError> {
        self.store.end(session_id).await
    }

    /// Set the provider, validating it against the enabled set.
    ///
    /// # Errors
    ///
    /// `PROVIDER_NOT_ENABLED` when the value is outside the enabled set;
    /// the session config is unchanged in that case.
    pub async fn set_provider(
        &self,
        session_id: &SessionId,
        provider: &str,
    ) -> Result<SessionRecord, RuntimeError> {
        if !self.providers.is_enabled(provider) {
            return Err(RuntimeError::Bridge(codial_bridge::BridgeError::NotEnabled {
                provider: provider.to_owned(),
                enabled: self.providers.enabled_names().join(", "),
            }));
        }
        self.store.set_provider(session_id, provider).await
    }

    /// Set the model (free-form).
    pub async fn set_model(
        &self,
        session_id: &SessionId,
        model: &str,
    ) -> Result<SessionRecord, RuntimeError> {
        self.store.set_model(session_id, model).await
    }

    /// Set the MCP toggle and profile.
    pub async fn set_mcp(
        &self,
        session_id: &SessionId,
        enabled: bool,
        profile_name: Option<&str>,
    ) -> Result<SessionRecord, RuntimeError> {
        self.store.set_mcp(session_id, enabled, profile_name).await
    }

    /// Set or clear the subagent, validating that a definition exists.
    ///
    /// # Errors
    ///
    /// `SUBAGENT_NOT_FOUND` when a non-empty name has no definition on
    /// disk.
    pub async fn set_subagent(
        &self,
        session_id: &SessionId,
        name: Option<&str>,
    ) -> Result<SessionRecord, RuntimeError> {
        let normalized = name.map(str::trim).filter(|n| !n.is_empty());

        if let Some(requested) = normalized {
            let snapshot = self.policy.load();
            if snapshot.subagent(requested).is_none() {
                return Err(RuntimeError::SubagentNotFound(requested.to_owned()));
            }
        }

        self.store.set_subagent(session_id, normalized).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TurnsService
// ─────────────────────────────────────────────────────────────────────────────

/// A turn submission from the REST surface.
#[derive(Clone, Debug)]
pub struct TurnSubmission {
    /// Submitting user.
    pub user_id: String,
    /// Channel the command came from.
    pub channel_id: String,
    /// User text (may be empty when only attachments are sent).
    pub text: Option<String>,
    /// Attachment references.
    pub attachments: Vec<TurnAttachment>,
    /// Caller idempotency key.
    pub idempotency_key: String,
}

/// Acknowledgement of an accepted turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnAccepted {
    /// Assigned turn ID.
    pub turn_id: TurnId,
    /// Assigned trace ID.
    pub trace_id: TraceId,
}

/// Turn submission use-cases.
pub struct TurnsService {
    sessions: Arc<SessionStore>,
    turns: Arc<TurnStore>,
    queue: TurnQueue,
    idempotency: Arc<IdempotencyIndex>,
}

impl TurnsService {
    /// Create the service.
    #[must_use]
    pub fn new(
        sessions: Arc<SessionStore>,
        turns: Arc<TurnStore>,
        queue: TurnQueue,
        idempotency: Arc<IdempotencyIndex>,
    ) -> Self {
        Self {
            sessions,
            turns,
            queue,
            idempotency,
        }
    }

    /// Accept a turn, idempotent on the submission key.
    ///
    /// The session's current config is snapshotted into the task; later
    /// config changes do not affect queued turns.
    ///
    /// # Errors
    ///
    /// - `SESSION_ENDED` when the session is terminal
    /// - `QUEUE_FULL` on backpressure (never cached, so a retry re-runs)
    #[instrument(skip(self, submission), fields(session_id = %session_id))]
    pub async fn submit_turn(
        &self,
        session_id: &SessionId,
        submission: TurnSubmission,
    ) -> Result<TurnAccepted, RuntimeError> {
        let session = self.sessions.get(session_id).await?;
        if session.status == SessionStatus::Ended {
            return Err(RuntimeError::SessionEnded(session_id.to_string()));
        }

        let value = self
            .idempotency
            .execute(
                IdempotencyScope::TurnSubmit,
                &submission.idempotency_key,
                || async {
                    let turn_id = TurnId::new();
                    let trace_id = TraceId::new();

                    let task = TurnTask {
                        turn_id: turn_id.clone(),
                        trace_id: trace_id.clone(),
                        session_id: session_id.clone(),
                        user_id: submission.user_id.clone(),
                        channel_id: submission.channel_id.clone(),
                        text: submission.text.clone().unwrap_or_default(),
                        attachments: submission.attachments.clone(),
                        provider: session.config.provider.clone(),
                        model: session.config.model.clone(),
                        mcp_enabled: session.config.mcp_enabled,
                        mcp_profile_name: session.config.mcp_profile_name.clone(),
                        subagent_name: session.config.subagent_name.clone(),
                    };

                    self.turns.insert(TurnRecord::queued(
                        turn_id.clone(),
                        session_id.clone(),
                        submission.user_id.clone(),
                        trace_id.clone(),
                    ));

                    if let Err(e) = self.queue.try_enqueue(task) {
                        // Roll the record back so a retry starts clean.
                        self.turns.remove(&turn_id);
                        return Err(e);
                    }

                    info!(
                        %turn_id,
                        %trace_id,
                        attachment_count = submission.attachments.len(),
                        "turn accepted"
                    );
                    Ok(json!({
                        "turn_id": turn_id.as_str(),
                        "trace_id": trace_id.as_str(),
                    }))
                },
            )
            .await?;

        Ok(TurnAccepted {
            turn_id: TurnId::from(value["turn_id"].as_str().unwrap_or_default()),
            trace_id: TraceId::from(value["trace_id"].as_str().unwrap_or_default()),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
