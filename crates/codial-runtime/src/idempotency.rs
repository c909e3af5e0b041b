//! Idempotency index.
//!
//! TTL-bounded cache of `(scope, key)` → the response produced by the first
//! successful call. Concurrent duplicates racing the first call serialize
//! per key: the winner runs the operation while holding the key's slot
//! lock, and losers await the lock and read the stored value. Failures are
//! never cached, so a retry after an error really re-runs the operation.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Mutex;

/// Scope of an idempotency key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IdempotencyScope {
    /// `POST /v1/sessions`.
    SessionCreate,
    /// `POST /v1/sessions/{id}/turns`.
    TurnSubmit,
}

/// A cached first-success response.
#[derive(Debug, Default)]
struct Slot {
    value: Option<(Value, Instant)>,
}

/// Default TTL for cached responses.
pub const DEFAULT_TTL: Duration = Duration::from_secs(15 * 60);
/// Entry-count threshold that triggers a prune of expired slots.
const PRUNE_THRESHOLD: usize = 4096;

/// Bounded TTL cache with per-key winner/loser serialization.
pub struct IdempotencyIndex {
    ttl: Duration,
    slots: DashMap<(IdempotencyScope, String), Arc<Mutex<Slot>>>,
}

impl IdempotencyIndex {
    /// Create an index with the default TTL.
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    /// Create an index with an explicit TTL.
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: DashMap::new(),
        }
    }

    /// Number of tracked keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Run `op` under the key, or return the stored first-success response.
    ///
    /// - fresh key: runs `op`; caches the value on `Ok`
    /// - repeat within TTL: returns the stored value verbatim, no side effects
    /// - repeat after a failure or expiry: runs `op` again
    ///
    /// # Errors
    ///
    /// Propagates `op`'s error unchanged (and uncached).
    pub async fn execute<F, Fut, E>(
        &self,
        scope: IdempotencyScope,
        key: &str,
        op: F,
    ) -> Result<Value, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, E>>,
    {
        self.maybe_prune();

        let slot = self
            .slots
            .entry((scope, key.to_owned()))
            .or_insert_with(|| Arc::new(Mutex::new(Slot::default())))
            .clone();

        let mut guard = slot.lock().await;

        if let Some((value, stored_at)) = &guard.value {
            if stored_at.elapsed() <= self.ttl {
                metrics::counter!("idempotency_hits_total").increment(1);
                return Ok(value.clone());
            }
        }

        let value = op().await?;
        guard.value = Some((value.clone(), Instant::now()));
        Ok(value)
    }

    /// Drop expired entries once the map grows past the prune threshold.
    fn maybe_prune(&self) {
        if self.slots.len() < PRUNE_THRESHOLD {
            return;
        }
        let ttl = self.ttl;
        self.slots.retain(|_, slot| {
            // A locked slot has a call in flight; keep it.
            match slot.try_lock() {
                Ok(guard) => match &guard.value {
                    Some((_, stored_at)) => stored_at.elapsed() <= ttl,
                    None => true,
                },
                Err(_) => true,
            }
        });
    }
}

impl Default for IdempotencyIndex {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn first_call_runs_and_caches() {
        let index = IdempotencyIndex::new();
        let calls = AtomicU32::new(0);

        let value = index
            .execute(IdempotencyScope::SessionCreate, "k1", || async {
                let _ = calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ()>(json!({"session_id": "s-1"}))
            })
            .await
            .unwrap();
        assert_eq!(value["session_id"], "s-1");

        let repeat = index
            .execute(IdempotencyScope::SessionCreate, "k1", || async {
                let _ = calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ()>(json!({"session_id": "s-2"}))
            })
            .await
            .unwrap();
        assert_eq!(repeat["session_id"], "s-1", "repeat must return the first response");
        assert_eq!(calls.load(Ordering::SeqCst), 1, "side effect must run once");
    }

    #[tokio::test]
    async fn scopes_are_independent() {
        let index = IdempotencyIndex::new();

        let _ = index
            .execute(IdempotencyScope::SessionCreate, "k", || async {
                Ok::<_, ()>(json!("create"))
            })
            .await
            .unwrap();
        let turn = index
            .execute(IdempotencyScope::TurnSubmit, "k", || async {
                Ok::<_, ()>(json!("submit"))
            })
            .await
            .unwrap();
        assert_eq!(turn, json!("submit"));
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let index = IdempotencyIndex::new();
        let calls = AtomicU32::new(0);

        let first: Result<Value, &str> = index
            .execute(IdempotencyScope::TurnSubmit, "k", || async {
                let _ = calls.fetch_add(1, Ordering::SeqCst);
                Err("queue full")
            })
            .await;
        assert!(first.is_err());

        let second = index
            .execute(IdempotencyScope::TurnSubmit, "k", || async {
                let _ = calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &str>(json!("accepted"))
            })
            .await
            .unwrap();
        assert_eq!(second, json!("accepted"));
        assert_eq!(calls.load(Ordering::SeqCst), 2, "failed call must not shadow a retry");
    }

    #[tokio::test]
    async fn expired_entries_rerun() {
        let index = IdempotencyIndex::with_ttl(Duration::from_millis(20));

        let _ = index
            .execute(IdempotencyScope::SessionCreate, "k", || async {
                Ok::<_, ()>(json!("first"))
            })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;

        let second = index
            .execute(IdempotencyScope::SessionCreate, "k", || async {
                Ok::<_, ()>(json!("second"))
            })
            .await
            .unwrap();
        assert_eq!(second, json!("second"));
    }

    #[tokio::test]
    async fn racing_duplicates_serialize_per_key() {
        let index = Arc::new(IdempotencyIndex::new());
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let index = index.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                index
                    .execute(IdempotencyScope::TurnSubmit, "race", move || async move {
                        let _ = calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        Ok::<_, ()>(json!("winner"))
                    })
                    .await
                    .unwrap()
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), json!("winner"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1, "losers must await the winner");
    }

    #[tokio::test]
    async fn distinct_keys_do_not_serialize() {
        let index = Arc::new(IdempotencyIndex::new());

        let a = index.execute(IdempotencyScope::TurnSubmit, "a", || async {
            Ok::<_, ()>(json!("a"))
        });
        let b = index.execute(IdempotencyScope::TurnSubmit, "b", || async {
            Ok::<_, ()>(json!("b"))
        });
        let (a, b) = tokio::join!(a, b);
        assert_eq!(a.unwrap(), json!("a"));
        assert_eq!(b.unwrap(), json!("b"));
        assert_eq!(index.len(), 2);
    }
}
