//! Session store.
//!
//! Concurrent map of session records. Each session owns three pieces of
//! coordination state:
//!
//! - a record lock serializing config mutations,
//! - a turn lock held for a turn's whole duration, so one session never
//!   executes two turns concurrently,
//! - a cancellation token cancelled when the session ends, propagated into
//!   any in-flight turn.
//!
//! Lifecycle is `active → ended`, one-way and idempotent. Ended sessions
//! stay addressable for reads but reject every write.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use codial_core::ids::SessionId;

use crate::errors::RuntimeError;

// ─────────────────────────────────────────────────────────────────────────────
// Records
// ─────────────────────────────────────────────────────────────────────────────

/// Session lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Accepting config mutations and turns.
    Active,
    /// Terminal; rejects all writes.
    Ended,
}

impl SessionStatus {
    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Ended => "ended",
        }
    }
}

/// Per-session configuration, seeded from `AGENTS.md` at create time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Selected provider (always in the enabled set).
    pub provider: String,
    /// Selected model (free-form).
    pub model: String,
    /// Whether MCP tooling is enabled.
    pub mcp_enabled: bool,
    /// Selected MCP profile.
    pub mcp_profile_name: Option<String>,
    /// Selected subagent, when any.
    pub subagent_name: Option<String>,
}

/// One session record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionRecord {
    /// Session ID.
    pub session_id: SessionId,
    /// Discord guild the session belongs to.
    pub guild_id: String,
    /// User who requested the session.
    pub requester_id: String,
    /// Bound Discord channel, once known.
    pub channel_id: Option<String>,
    /// Lifecycle state.
    pub status: SessionStatus,
    /// Current configuration.
    pub config: SessionConfig,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// End time, once ended.
    pub ended_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    /// Create a fresh active record.
    #[must_use]
    pub fn new(guild_id: impl Into<String>, requester_id: impl Into<String>, config: SessionConfig) -> Self {
        Self {
            session_id: SessionId::new(),
            guild_id: guild_id.into(),
            requester_id: requester_id.into(),
            channel_id: None,
            status: SessionStatus::Active,
            config,
            created_at: Utc::now(),
            ended_at: None,
        }
    }
}

/// Per-session entry: record plus coordination state.
struct SessionEntry {
    record: RwLock<SessionRecord>,
    turn_lock: Arc<Mutex<()>>,
    cancel: CancellationToken,
}

// ─────────────────────────────────────────────────────────────────────────────
// SessionStore
// ─────────────────────────────────────────────────────────────────────────────

/// Concurrent session map. The map lock covers insert/lookup; everything
/// per-session goes through that session's own locks.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<SessionId, Arc<SessionEntry>>,
}

impl SessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions (any status).
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Insert a freshly created record.
    pub fn insert(&self, record: SessionRecord) {
        let session_id = record.session_id.clone();
        let entry = Arc::new(SessionEntry {
            record: RwLock::new(record),
            turn_lock: Arc::new(Mutex::new(())),
            cancel: CancellationToken::new(),
        });
        let _ = self.sessions.insert(session_id.clone(), entry);
        debug!(%session_id, "session inserted");
    }

    fn entry(&self, session_id: &SessionId) -> Result<Arc<SessionEntry>, RuntimeError> {
        self.sessions
            .get(session_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| RuntimeError::SessionNotFound(session_id.to_string()))
    }

    /// Read a session snapshot.
    pub async fn get(&self, session_id: &SessionId) -> Result<SessionRecord, RuntimeError> {
        let entry = self.entry(session_id)?;
        let record = entry.record.read().await;
        Ok(record.clone())
    }

    /// The session's cancellation token.
    pub fn cancel_token(&self, session_id: &SessionId) -> Result<CancellationToken, RuntimeError> {
        Ok(self.entry(session_id)?.cancel.clone())
    }

    /// Acquire the per-session turn lock; held for a turn's duration.
    pub async fn acquire_turn_lock(
        &self,
        session_id: &SessionId,
    ) -> Result<OwnedMutexGuard<()>, RuntimeError> {
        let lock = self.entry(session_id)?.turn_lock.clone();
        Ok(lock.lock_owned().await)
    }

    /// Bind the Discord channel.
    pub async fn bind_channel(
        &self,
        session_id: &SessionId,
        channel_id: &str,
    ) -> Result<SessionRecord, RuntimeError> {
        self.mutate(session_id, |record| {
            record.channel_id = Some(channel_id.to_owned());
        })
        .await
    }

    /// End the session. Idempotent; cancels the session token.
    pub async fn end(&self, session_id: &SessionId) -> Result<SessionRecord, RuntimeError> {
        let entry = self.entry(session_id)?;
        let mut record = entry.record.write().await;
        if record.status != SessionStatus::Ended {
            record.status = SessionStatus::Ended;
            record.ended_at = Some(Utc::now());
            entry.cancel.cancel();
            debug!(%session_id, "session ended");
        }
        Ok(record.clone())
    }

    /// Set the provider. Enablement is validated by the caller; the store
    /// only enforces lifecycle.
    pub async fn set_provider(
        &self,
        session_id: &SessionId,
        provider: &str,
    ) -> Result<SessionRecord, RuntimeError> {
        self.mutate(session_id, |record| {
            record.config.provider = provider.to_owned();
        })
        .await
    }

    /// Set the model.
    pub async fn set_model(
        &self,
        session_id: &SessionId,
        model: &str,
    ) -> Result<SessionRecord, RuntimeError> {
        self.mutate(session_id, |record| {
            record.config.model = model.to_owned();
        })
        .await
    }

    /// Set the MCP toggle and profile.
    pub async fn set_mcp(
        &self,
        session_id: &SessionId,
        enabled: bool,
        profile_name: Option<&str>,
    ) -> Result<SessionRecord, RuntimeError> {
        self.mutate(session_id, |record| {
            record.config.mcp_enabled = enabled;
            record.config.mcp_profile_name = profile_name.map(str::to_owned);
        })
        .await
    }

    /// Set or clear the subagent. Existence is validated by the caller.
    pub async fn set_subagent(
        &self,
        session_id: &SessionId,
        name: Option<&str>,
    ) -> Result<SessionRecord, RuntimeError> {
        self.mutate(session_id, |record| {
            record.config.subagent_name = name.map(str::to_owned);
        })
        .await
    }

    /// Apply a mutation under the record lock, rejecting ended sessions.
    async fn mutate(
        &self,
        session_id: &SessionId,
        apply: impl FnOnce(&mut SessionRecord),
    ) -> Result<SessionRecord, RuntimeError> {
        let entry = self.entry(session_id)?;
        let mut record = entry.record.write().await;
        if record.status == SessionStatus::Ended {
            return Err(RuntimeError::SessionEnded(session_id.to_string()));
        }
        apply(&mut record);
        Ok(record.clone())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
