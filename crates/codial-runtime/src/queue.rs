//! Turn queue and worker pool.
//!
//! A bounded mpsc channel feeds a fixed set of worker tasks. Enqueue is
//! non-blocking: a saturated queue surfaces `QUEUE_FULL` to the caller.
//! Each worker serializes turns per session via the session's turn lock,
//! re-checks the session's status at dequeue (turns queued behind an `end`
//! are dropped as cancelled), and runs the engine under the session's
//! cancellation token plus the whole-turn wall-clock budget.
//!
//! Graceful shutdown: new enqueues are refused, in-flight and queued turns
//! get a drain deadline, then the hard-cancel token fires and whatever is
//! left is marked `failed` with `SHUTDOWN`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use codial_core::attachments::TurnAttachment;
use codial_core::ids::{SessionId, TraceId, TurnId};

use crate::engine::TurnEngine;
use crate::errors::RuntimeError;
use crate::session_store::{SessionStatus, SessionStore};
use crate::turn_store::TurnStore;

/// Default worker count.
pub const DEFAULT_WORKER_COUNT: usize = 2;
/// Default queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// One accepted turn, snapshotting the session config at submission.
#[derive(Clone, Debug)]
pub struct TurnTask {
    /// Turn ID.
    pub turn_id: TurnId,
    /// Trace ID minted at submission.
    pub trace_id: TraceId,
    /// Owning session.
    pub session_id: SessionId,
    /// Submitting user.
    pub user_id: String,
    /// Channel the turn came from.
    pub channel_id: String,
    /// User text.
    pub text: String,
    /// Attachment references.
    pub attachments: Vec<TurnAttachment>,
    /// Provider at submission time.
    pub provider: String,
    /// Model at submission time.
    pub model: String,
    /// MCP toggle at submission time.
    pub mcp_enabled: bool,
    /// MCP profile at submission time.
    pub mcp_profile_name: Option<String>,
    /// Subagent at submission time.
    pub subagent_name: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// TurnQueue
// ─────────────────────────────────────────────────────────────────────────────

/// Producer side of the bounded turn queue.
#[derive(Clone)]
pub struct TurnQueue {
    sender: mpsc::Sender<TurnTask>,
    closing: Arc<AtomicBool>,
    pending: Arc<AtomicUsize>,
}

impl TurnQueue {
    /// Enqueue without blocking.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::Shutdown`] once graceful shutdown started
    /// - [`RuntimeError::QueueFull`] when the queue is saturated
    pub fn try_enqueue(&self, task: TurnTask) -> Result<(), RuntimeError> {
        if self.closing.load(Ordering::SeqCst) {
            return Err(RuntimeError::Shutdown);
        }
        match self.sender.try_send(task) {
            Ok(()) => {
                let _ = self.pending.fetch_add(1, Ordering::SeqCst);
                metrics::counter!("turns_enqueued_total").increment(1);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                metrics::counter!("turns_rejected_total", "reason" => "queue_full").increment(1);
                Err(RuntimeError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(RuntimeError::Shutdown),
        }
    }

    /// Turns accepted but not yet finished (queued + in flight).
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// A queue with no worker pool behind it, for tests that only exercise
    /// submission.
    #[cfg(test)]
    pub(crate) fn standalone(capacity: usize) -> (Self, mpsc::Receiver<TurnTask>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (
            Self {
                sender,
                closing: Arc::new(AtomicBool::new(false)),
                pending: Arc::new(AtomicUsize::new(0)),
            },
            receiver,
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// WorkerPool
// ─────────────────────────────────────────────────────────────────────────────

/// Fixed pool of turn workers.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    receiver: Arc<Mutex<mpsc::Receiver<TurnTask>>>,
    closing: Arc<AtomicBool>,
    hard_cancel: CancellationToken,
    pending: Arc<AtomicUsize>,
    drained: Arc<Notify>,
    turns: Arc<TurnStore>,
}

/// Everything a worker needs.
struct WorkerContext {
    engine: Arc<TurnEngine>,
    sessions: Arc<SessionStore>,
    turns: Arc<TurnStore>,
    turn_timeout: Duration,
    hard_cancel: CancellationToken,
    pending: Arc<AtomicUsize>,
    drained: Arc<Notify>,
}

impl WorkerPool {
    /// Start `worker_count` workers over a fresh queue of `capacity`.
    #[must_use]
    pub fn start(
        worker_count: usize,
        capacity: usize,
        engine: Arc<TurnEngine>,
        sessions: Arc<SessionStore>,
        turns: Arc<TurnStore>,
        turn_timeout: Duration,
    ) -> (TurnQueue, Self) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let closing = Arc::new(AtomicBool::new(false));
        let hard_cancel = CancellationToken::new();
        let pending = Arc::new(AtomicUsize::new(0));
        let drained = Arc::new(Notify::new());

        let mut handles = Vec::with_capacity(worker_count.max(1));
        for index in 0..worker_count.max(1) {
            let context = WorkerContext {
                engine: engine.clone(),
                sessions: sessions.clone(),
                turns: turns.clone(),
                turn_timeout,
                hard_cancel: hard_cancel.clone(),
                pending: pending.clone(),
                drained: drained.clone(),
            };
            let receiver = receiver.clone();
            handles.push(tokio::spawn(worker_loop(index, receiver, context)));
        }

        let queue = TurnQueue {
            sender,
            closing: closing.clone(),
            pending: pending.clone(),
        };
        let pool = Self {
            handles,
            receiver,
            closing,
            hard_cancel,
            pending,
            drained,
            turns,
        };
        (queue, pool)
    }

    /// Whether shutdown has started.
    #[must_use]
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Graceful shutdown.
    ///
    /// 1. Refuse new enqueues.
    /// 2. Wait up to `drain_deadline` for queued + in-flight turns.
    /// 3. Fire the hard-cancel token; mark whatever is left `SHUTDOWN`.
    pub async fn shutdown(self, drain_deadline: Duration) {
        self.closing.store(true, Ordering::SeqCst);
        info!(pending = self.pending.load(Ordering::SeqCst), "worker pool draining");

        let drain = async {
            while self.pending.load(Ordering::SeqCst) > 0 {
                self.drained.notified().await;
            }
        };
        if tokio::time::timeout(drain_deadline, drain).await.is_err() {
            warn!(
                pending = self.pending.load(Ordering::SeqCst),
                "drain deadline expired, cancelling remaining turns"
            );
        }

        self.hard_cancel.cancel();

        for handle in self.handles {
            let _ = handle.await;
        }

        // Whatever never reached a worker is failed with SHUTDOWN.
        let mut receiver = self.receiver.lock().await;
        while let Ok(task) = receiver.try_recv() {
            self.turns
                .mark_failed(&task.turn_id, codial_core::errors::codes::SHUTDOWN);
            let _ = self.pending.fetch_sub(1, Ordering::SeqCst);
        }
        info!("worker pool stopped");
    }
}

/// One worker: dequeue → run → mark terminal, forever.
async fn worker_loop(
    index: usize,
    receiver: Arc<Mutex<mpsc::Receiver<TurnTask>>>,
    context: WorkerContext,
) {
    debug!(worker = index, "turn worker started");
    loop {
        let task = tokio::select! {
            () = context.hard_cancel.cancelled() => break,
            task = recv_next(&receiver) => match task {
                Some(task) => task,
                None => break,
            },
        };

        process_one(&context, task).await;

        if context.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            // notify_one stores a permit, so a drain that checks pending
            // just before this decrement still wakes up.
            context.drained.notify_one();
        }
    }
    debug!(worker = index, "turn worker stopped");
}

async fn recv_next(receiver: &Arc<Mutex<mpsc::Receiver<TurnTask>>>) -> Option<TurnTask> {
    receiver.lock().await.recv().await
}

/// Run one task through the engine with session serialization, status
/// re-check, cancellation, and the wall-clock budget.
async fn process_one(context: &WorkerContext, task: TurnTask) {
    // Re-check the session at dequeue: an `end` may have raced the queue.
    let session = match context.sessions.get(&task.session_id).await {
        Ok(session) => session,
        Err(e) => {
            context.turns.mark_failed(&task.turn_id, e.wire_code());
            return;
        }
    };
    if session.status == SessionStatus::Ended {
        let error = RuntimeError::Cancelled;
        context.turns.mark_failed(&task.turn_id, error.wire_code());
        context.engine.emit_error(&task, &error).await;
        return;
    }

    // One turn at a time per session, held for the turn's duration.
    let turn_guard = match context.sessions.acquire_turn_lock(&task.session_id).await {
        Ok(guard) => guard,
        Err(e) => {
            context.turns.mark_failed(&task.turn_id, e.wire_code());
            return;
        }
    };

    let session_cancel = match context.sessions.cancel_token(&task.session_id) {
        Ok(token) => token,
        Err(e) => {
            context.turns.mark_failed(&task.turn_id, e.wire_code());
            return;
        }
    };

    // The turn observes both session end and pool hard-cancel.
    let turn_cancel = CancellationToken::new();
    let watcher = {
        let turn_cancel = turn_cancel.clone();
        let hard_cancel = context.hard_cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = session_cancel.cancelled() => turn_cancel.cancel(),
                () = hard_cancel.cancelled() => turn_cancel.cancel(),
            }
        })
    };

    context.turns.mark_running(&task.turn_id);
    let started = std::time::Instant::now();

    let outcome = tokio::time::timeout(
        context.turn_timeout,
        context.engine.process(&task, &turn_cancel),
    )
    .await;
    watcher.abort();

    match outcome {
        Ok(Ok(())) => {
            context.turns.mark_completed(&task.turn_id);
            metrics::counter!("turns_completed_total").increment(1);
            metrics::histogram!("turn_duration_seconds").record(started.elapsed().as_secs_f64());
        }
        Ok(Err(error)) => {
            // Shutdown-induced cancellation is recorded as SHUTDOWN.
            let error = match error {
                RuntimeError::Cancelled if context.hard_cancel.is_cancelled() => {
                    RuntimeError::Shutdown
                }
                other => other,
            };
            context.turns.mark_failed(&task.turn_id, error.wire_code());
            metrics::counter!("turns_failed_total", "code" => error.wire_code()).increment(1);

            // The budget path already emitted its terminal `final` event.
            if !matches!(error, RuntimeError::ToolBudgetExceeded { .. }) {
                context.engine.emit_error(&task, &error).await;
            }
            drop(turn_guard);
            return;
        }
        Err(_elapsed) => {
            let error = RuntimeError::TurnTimeout {
                seconds: context.turn_timeout.as_secs(),
            };
            context.turns.mark_failed(&task.turn_id, error.wire_code());
            metrics::counter!("turns_failed_total", "code" => error.wire_code()).increment(1);
            context.engine.emit_error(&task, &error).await;
            drop(turn_guard);
            return;
        }
    }

    drop(turn_guard);
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
//
// Queue mechanics are tested here; full worker/engine behavior is covered
// by the crate integration tests where a stub bridge and gateway exist.
