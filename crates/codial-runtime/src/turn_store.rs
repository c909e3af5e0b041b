//! Turn store.
//!
//! Tracks every accepted turn through `queued → running → completed|failed`.
//! A turn is owned by the store while queued and by the executing worker
//! while running; only that worker moves it to a terminal state.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use codial_core::ids::{SessionId, TraceId, TurnId};

/// Turn lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    /// Accepted, waiting for a worker.
    Queued,
    /// A worker is executing it.
    Running,
    /// Finished successfully (terminal).
    Completed,
    /// Finished with an error (terminal).
    Failed,
}

/// One turn record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnRecord {
    /// Turn ID.
    pub turn_id: TurnId,
    /// Owning session.
    pub session_id: SessionId,
    /// Submitting user.
    pub user_id: String,
    /// Trace ID minted at submission.
    pub trace_id: TraceId,
    /// Lifecycle state.
    pub status: TurnStatus,
    /// When the worker picked it up.
    pub started_at: Option<DateTime<Utc>>,
    /// When it reached a terminal state.
    pub ended_at: Option<DateTime<Utc>>,
    /// Wire code of the failure, when failed.
    pub error_code: Option<String>,
}

impl TurnRecord {
    /// Create a queued record.
    #[must_use]
    pub fn queued(turn_id: TurnId, session_id: SessionId, user_id: impl Into<String>, trace_id: TraceId) -> Self {
        Self {
            turn_id,
            session_id,
            user_id: user_id.into(),
            trace_id,
            status: TurnStatus::Queued,
            started_at: None,
            ended_at: None,
            error_code: None,
        }
    }
}

/// Concurrent map of turn records.
#[derive(Default)]
pub struct TurnStore {
    turns: DashMap<TurnId, TurnRecord>,
}

impl TurnStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a queued record.
    pub fn insert(&self, record: TurnRecord) {
        let _ = self.turns.insert(record.turn_id.clone(), record);
    }

    /// Read a turn snapshot.
    #[must_use]
    pub fn get(&self, turn_id: &TurnId) -> Option<TurnRecord> {
        self.turns.get(turn_id).map(|r| r.clone())
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Mark a turn running.
    pub fn mark_running(&self, turn_id: &TurnId) {
        if let Some(mut record) = self.turns.get_mut(turn_id) {
            record.status = TurnStatus::Running;
            record.started_at = Some(Utc::now());
        }
    }

    /// Mark a turn completed.
    pub fn mark_completed(&self, turn_id: &TurnId) {
        if let Some(mut record) = self.turns.get_mut(turn_id) {
            record.status = TurnStatus::Completed;
            record.ended_at = Some(Utc::now());
        }
    }

    /// Remove a record (submission rolled back before acceptance).
    pub fn remove(&self, turn_id: &TurnId) {
        let _ = self.turns.remove(turn_id);
    }

    /// Mark a turn failed with a wire code.
    pub fn mark_failed(&self, turn_id: &TurnId, error_code: &str) {
        if let Some(mut record) = self.turns.get_mut(turn_id) {
            record.status = TurnStatus::Failed;
            record.ended_at = Some(Utc::now());
            record.error_code = Some(error_code.to_owned());
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
