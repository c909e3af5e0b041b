//! # codial-runtime
//!
//! The agent orchestrator: session and turn state machines, the bounded
//! worker pool, the turn engine with its tool loop, the gateway event
//! publisher, idempotency, and attachment ingest.
//!
//! Everything here is constructed explicitly at startup and torn down in
//! graceful shutdown; there are no hidden singletons.

#![deny(unsafe_code)]

pub mod engine;
pub mod errors;
pub mod idempotency;
pub mod ingest;
pub mod publisher;
pub mod queue;
pub mod service;
pub mod session_store;
pub mod turn_store;

pub use engine::TurnEngine;
pub use errors::RuntimeError;
pub use idempotency::{IdempotencyIndex, IdempotencyScope};
pub use ingest::AttachmentIngestor;
pub use publisher::{EventSink, GatewayPublisher};
pub use queue::{TurnQueue, TurnTask, WorkerPool};
pub use service::{SessionService, TurnAccepted, TurnSubmission, TurnsService};
pub use session_store::{SessionConfig, SessionRecord, SessionStatus, SessionStore};
pub use turn_store::{TurnRecord, TurnStatus, TurnStore};
