//! End-to-end turn pipeline tests: queue → worker → engine → events.
//!
//! The provider bridge is scripted in-process; MCP is an HTTP stub where a
//! test needs real `tools/call` traffic; events are captured by a
//! recording sink.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use codial_bridge::{
    BridgeError, BridgeRequest, BridgeResponse, ProviderBridge, ProviderManager, ToolRequest,
};
use codial_core::events::{TurnEvent, TurnEventType};
use codial_core::ids::{SessionId, ToolCallId};
use codial_core::retry::RetryConfig;
use codial_mcp::McpClient;
use codial_policy::PolicyLoader;
use codial_runtime::publisher::{EventSink, PublishError};
use codial_runtime::{
    AttachmentIngestor, IdempotencyIndex, SessionConfig, SessionRecord, SessionStore, TurnEngine,
    TurnStatus, TurnStore, TurnSubmission, TurnsService, WorkerPool,
};

// ─────────────────────────────────────────────────────────────────────────────
// Test doubles
// ─────────────────────────────────────────────────────────────────────────────

/// Captures every published event in order.
#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<TurnEvent>>,
}

impl RecordingSink {
    async fn events(&self) -> Vec<TurnEvent> {
        self.events.lock().await.clone()
    }

    async fn events_for_turn(&self, turn_id: &str) -> Vec<TurnEvent> {
        self.events
            .lock()
            .await
            .iter()
            .filter(|e| e.turn_id.as_str() == turn_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn publish(&self, event: &TurnEvent) -> Result<(), PublishError> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

/// Bridge scripted by round index.
enum Script {
    /// Round 0 requests one `fs.read` call; round 1 answers terminally.
    ToolThenDone,
    /// Round 0 requests the builtin `file_write`; round 1 answers
    /// terminally after checking the result.
    BuiltinWriteThenDone,
    /// Every round requests tools (never terminal).
    AlwaysTools,
    /// Terminal immediately.
    Immediate,
    /// Sleeps long enough to be cancelled.
    Slow,
}

struct ScriptedBridge {
    script: Script,
}

#[async_trait]
impl ProviderBridge for ScriptedBridge {
    fn name(&self) -> &str {
        "github-copilot-sdk"
    }

    async fn generate(&self, request: &BridgeRequest) -> Result<BridgeResponse, BridgeError> {
        match self.script {
            Script::ToolThenDone => {
                if request.tool_call_round == 0 {
                    Ok(BridgeResponse {
                        output_text: String::new(),
                        decision_summary: "reading a file first".into(),
                        tool_requests: vec![ToolRequest {
                            tool_call_id: ToolCallId::from("t1"),
                            name: "fs.read".into(),
                            arguments: json!({"path": "a"}),
                        }],
                    })
                } else {
                    // The tool result from the prior round must be present.
                    assert_eq!(request.tool_results.len(), 1);
                    assert_eq!(request.tool_results[0].tool_call_id.as_str(), "t1");
                    Ok(BridgeResponse {
                        output_text: "done".into(),
                        decision_summary: "answered with file contents".into(),
                        tool_requests: vec![],
                    })
                }
            }
            Script::BuiltinWriteThenDone => {
                if request.tool_call_round == 0 {
                    Ok(BridgeResponse {
                        output_text: String::new(),
                        decision_summary: "writing a file".into(),
                        tool_requests: vec![ToolRequest {
                            tool_call_id: ToolCallId::from("w1"),
                            name: "file_write".into(),
                            arguments: json!({"path": "notes.txt", "content": "from the loop\n"}),
                        }],
                    })
                } else {
                    let result = &request.tool_results[0];
                    assert!(result.ok, "builtin write must succeed: {:?}", result.error);
                    assert_eq!(result.tool_call_id.as_str(), "w1");
                    let payload = result.result.as_ref().unwrap();
                    assert!(payload["output"].as_str().unwrap().contains("notes.txt"));
                    Ok(BridgeResponse {
                        output_text: "file written".into(),
                        decision_summary: "confirmed the write".into(),
                        tool_requests: vec![],
                    })
                }
            }
            Script::AlwaysTools => Ok(BridgeResponse {
                output_text: String::new(),
                decision_summary: format!("round {} wants tools", request.tool_call_round),
                tool_requests: vec![ToolRequest {
                    tool_call_id: ToolCallId::new(),
                    name: "fs.read".into(),
                    arguments: json!({}),
                }],
            }),
            Script::Immediate => Ok(BridgeResponse {
                output_text: format!("echo: {}", request.text),
                decision_summary: "answered directly".into(),
                tool_requests: vec![],
            }),
            Script::Slow => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(BridgeResponse::default())
            }
        }
    }
}

/// Minimal MCP stub speaking just enough JSON-RPC for the engine.
async fn start_mcp_stub() -> String {
    use axum::routing::post;
    use axum::{Json, Router};

    async fn handler(Json(payload): Json<Value>) -> Json<Value> {
        let id = payload["id"].clone();
        let body = match payload["method"].as_str().unwrap_or("") {
            "initialize" => json!({
                "jsonrpc": "2.0", "id": id,
                "result": {
                    "protocolVersion": "2025-11-25",
                    "capabilities": {},
                    "serverInfo": {"name": "stub", "version": "0"}
                }
            }),
            "notifications/initialized" => json!({}),
            "tools/list" => json!({
                "jsonrpc": "2.0", "id": id,
                "result": {"tools": [
                    {"name": "fs.read", "inputSchema": {"type": "object"}}
                ]}
            }),
            "tools/call" => json!({
                "jsonrpc": "2.0", "id": id,
                "result": {"content": [{"type": "text", "text": "hello"}]}
            }),
            other => json!({
                "jsonrpc": "2.0", "id": id,
                "error": {"code": -32601, "message": format!("unknown {other}")}
            }),
        };
        Json(body)
    }

    let app = Router::new().route("/", post(handler));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _server = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

// ─────────────────────────────────────────────────────────────────────────────
// Fixture
// ─────────────────────────────────────────────────────────────────────────────

struct Pipeline {
    sink: Arc<RecordingSink>,
    sessions: Arc<SessionStore>,
    turns: Arc<TurnStore>,
    service: TurnsService,
    pool: WorkerPool,
    _workspace: tempfile::TempDir,
}

async fn start_pipeline(script: Script, mcp_url: Option<String>) -> Pipeline {
    let workspace = tempfile::TempDir::new().unwrap();
    let sink = Arc::new(RecordingSink::default());
    let sessions = Arc::new(SessionStore::new());
    let turns = Arc::new(TurnStore::new());

    let mut bridges: std::collections::HashMap<String, Arc<dyn ProviderBridge>> =
        std::collections::HashMap::new();
    let _ = bridges.insert(
        "github-copilot-sdk".to_owned(),
        Arc::new(ScriptedBridge { script }),
    );
    let providers = Arc::new(ProviderManager::new(
        bridges,
        vec!["github-copilot-sdk".to_owned()],
    ));

    let mcp = mcp_url.map(|url| {
        Arc::new(McpClient::new(&url, None, Duration::from_secs(2)).unwrap())
    });

    let engine = Arc::new(TurnEngine::new(
        sink.clone(),
        AttachmentIngestor::new(false, 1024, workspace.path().join("att"), Duration::from_secs(1))
            .unwrap(),
        Arc::new(codial_tools::builtin_registry(workspace.path())),
        mcp,
        providers,
        Arc::new(PolicyLoader::with_home(
            workspace.path(),
            workspace.path().join("home"),
        )),
        RetryConfig {
            max_retries: 1,
            base_delay_ms: 1,
            max_delay_ms: 5,
            jitter_factor: 0.0,
        },
    ));

    let (queue, pool) = WorkerPool::start(
        2,
        16,
        engine,
        sessions.clone(),
        turns.clone(),
        Duration::from_secs(10),
    );
    let service = TurnsService::new(
        sessions.clone(),
        turns.clone(),
        queue,
        Arc::new(IdempotencyIndex::new()),
    );

    Pipeline {
        sink,
        sessions,
        turns,
        service,
        pool,
        _workspace: workspace,
    }
}

fn session(mcp_enabled: bool) -> SessionRecord {
    SessionRecord::new(
        "g-1",
        "u-1",
        SessionConfig {
            provider: "github-copilot-sdk".into(),
            model: "gpt-5-mini".into(),
            mcp_enabled,
            mcp_profile_name: Some("default".into()),
            subagent_name: None,
        },
    )
}

fn submission(key: &str, text: &str) -> TurnSubmission {
    TurnSubmission {
        user_id: "u-1".into(),
        channel_id: "c-1".into(),
        text: Some(text.into()),
        attachments: vec![],
        idempotency_key: key.into(),
    }
}

/// Poll until the turn reaches a terminal status.
async fn wait_terminal(turns: &TurnStore, turn_id: &codial_core::ids::TurnId) -> TurnStatus {
    for _ in 0..200 {
        if let Some(record) = turns.get(turn_id) {
            if matches!(record.status, TurnStatus::Completed | TurnStatus::Failed) {
                return record.status;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("turn never reached a terminal status");
}

fn types(events: &[TurnEvent]) -> Vec<TurnEventType> {
    events.iter().map(|e| e.event_type).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenarios
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn immediate_answer_completes_turn() {
    let pipeline = start_pipeline(Script::Immediate, None).await;
    let record = session(false);
    let sid = record.session_id.clone();
    pipeline.sessions.insert(record);

    let accepted = pipeline
        .service
        .submit_turn(&sid, submission("k1", "hello"))
        .await
        .unwrap();
    let status = wait_terminal(&pipeline.turns, &accepted.turn_id).await;
    assert_eq!(status, TurnStatus::Completed);

    let events = pipeline.sink.events_for_turn(accepted.turn_id.as_str()).await;
    let kinds = types(&events);
    assert_eq!(kinds.first(), Some(&TurnEventType::Plan));
    assert_eq!(kinds.last(), Some(&TurnEventType::Final));
    assert!(kinds.contains(&TurnEventType::DecisionSummary));
    assert!(kinds.contains(&TurnEventType::ResponseDelta));

    let delta = events
        .iter()
        .find(|e| e.event_type == TurnEventType::ResponseDelta)
        .unwrap();
    assert_eq!(delta.payload_text(), Some("echo: hello"));
}

#[tokio::test]
async fn tool_loop_happy_path_orders_events() {
    let mcp_url = start_mcp_stub().await;
    let pipeline = start_pipeline(Script::ToolThenDone, Some(mcp_url)).await;
    let record = session(true);
    let sid = record.session_id.clone();
    pipeline.sessions.insert(record);

    let accepted = pipeline
        .service
        .submit_turn(&sid, submission("k1", "read the file"))
        .await
        .unwrap();
    let status = wait_terminal(&pipeline.turns, &accepted.turn_id).await;
    assert_eq!(status, TurnStatus::Completed);

    let events = pipeline.sink.events_for_turn(accepted.turn_id.as_str()).await;
    let kinds = types(&events);

    // plan first, final last, exactly one of each.
    assert_eq!(kinds.first(), Some(&TurnEventType::Plan));
    assert_eq!(kinds.last(), Some(&TurnEventType::Final));
    assert_eq!(kinds.iter().filter(|k| **k == TurnEventType::Plan).count(), 1);
    assert_eq!(kinds.iter().filter(|k| **k == TurnEventType::Final).count(), 1);

    // Round boundary (decision_summary) precedes the tool-result action,
    // which precedes the terminal answer's decision_summary.
    let first_decision = kinds
        .iter()
        .position(|k| *k == TurnEventType::DecisionSummary)
        .unwrap();
    let tool_action = events
        .iter()
        .position(|e| {
            e.event_type == TurnEventType::Action
                && e.payload_text().is_some_and(|t| t.contains("fs.read"))
                && e.payload_text().is_some_and(|t| t.contains("succeeded"))
        })
        .unwrap();
    let final_idx = kinds.iter().position(|k| *k == TurnEventType::Final).unwrap();
    assert!(first_decision < tool_action);
    assert!(tool_action < final_idx);

    // Two bridge rounds → two decision summaries.
    assert_eq!(
        kinds.iter().filter(|k| **k == TurnEventType::DecisionSummary).count(),
        2
    );
}

#[tokio::test]
async fn builtin_tool_dispatches_without_mcp() {
    // No MCP client at all: the builtin registry alone serves the call.
    let pipeline = start_pipeline(Script::BuiltinWriteThenDone, None).await;
    let record = session(false);
    let sid = record.session_id.clone();
    pipeline.sessions.insert(record);

    let accepted = pipeline
        .service
        .submit_turn(&sid, submission("k1", "write the notes"))
        .await
        .unwrap();
    let status = wait_terminal(&pipeline.turns, &accepted.turn_id).await;
    assert_eq!(status, TurnStatus::Completed);

    // The tool ran in-process and the file landed in the workspace.
    assert_eq!(
        std::fs::read_to_string(pipeline._workspace.path().join("notes.txt")).unwrap(),
        "from the loop\n"
    );

    let events = pipeline.sink.events_for_turn(accepted.turn_id.as_str()).await;
    assert!(events.iter().any(|e| {
        e.event_type == TurnEventType::Action
            && e.payload_text()
                .is_some_and(|t| t.contains("builtin tool `file_write` call succeeded"))
    }));
    assert!(events.iter().any(|e| {
        e.event_type == TurnEventType::Action
            && e.payload_text().is_some_and(|t| t.contains("registered 7 builtin tool(s)"))
    }));
}

#[tokio::test]
async fn tool_budget_exhaustion_fails_turn_after_five_rounds() {
    // MCP disabled: every tool call degrades to an error result, the bridge
    // keeps asking, and the budget runs out.
    let pipeline = start_pipeline(Script::AlwaysTools, None).await;
    let record = session(false);
    let sid = record.session_id.clone();
    pipeline.sessions.insert(record);

    let accepted = pipeline
        .service
        .submit_turn(&sid, submission("k1", "loop forever"))
        .await
        .unwrap();
    let status = wait_terminal(&pipeline.turns, &accepted.turn_id).await;
    assert_eq!(status, TurnStatus::Failed);

    let turn = pipeline.turns.get(&accepted.turn_id).unwrap();
    assert_eq!(turn.error_code.as_deref(), Some("TOOL_BUDGET_EXCEEDED"));

    let events = pipeline.sink.events_for_turn(accepted.turn_id.as_str()).await;
    let kinds = types(&events);

    // Exactly five rounds ran, then a terminal `final` with the budget text.
    assert_eq!(
        kinds.iter().filter(|k| **k == TurnEventType::DecisionSummary).count(),
        5
    );
    let last = events.last().unwrap();
    assert_eq!(last.event_type, TurnEventType::Final);
    assert!(last.payload_text().unwrap().contains("budget"));
}

#[tokio::test]
async fn concurrent_turns_keep_per_turn_order() {
    let pipeline = start_pipeline(Script::Immediate, None).await;

    let record_a = session(false);
    let record_b = session(false);
    let sid_a = record_a.session_id.clone();
    let sid_b = record_b.session_id.clone();
    pipeline.sessions.insert(record_a);
    pipeline.sessions.insert(record_b);

    let a = pipeline
        .service
        .submit_turn(&sid_a, submission("ka", "first"))
        .await
        .unwrap();
    let b = pipeline
        .service
        .submit_turn(&sid_b, submission("kb", "second"))
        .await
        .unwrap();

    assert_eq!(wait_terminal(&pipeline.turns, &a.turn_id).await, TurnStatus::Completed);
    assert_eq!(wait_terminal(&pipeline.turns, &b.turn_id).await, TurnStatus::Completed);

    // Per-turn subsequences are each plan → ... → final, regardless of
    // interleaving in the global order.
    for turn_id in [a.turn_id.as_str(), b.turn_id.as_str()] {
        let kinds = types(&pipeline.sink.events_for_turn(turn_id).await);
        assert_eq!(kinds.first(), Some(&TurnEventType::Plan), "turn {turn_id}");
        assert_eq!(kinds.last(), Some(&TurnEventType::Final), "turn {turn_id}");
    }

    // Both turns' events share the global stream.
    let all = pipeline.sink.events().await;
    let turn_ids: std::collections::HashSet<_> =
        all.iter().map(|e| e.turn_id.as_str().to_owned()).collect();
    assert_eq!(turn_ids.len(), 2);
}

#[tokio::test]
async fn ending_session_cancels_in_flight_turn() {
    let pipeline = start_pipeline(Script::Slow, None).await;
    let record = session(false);
    let sid = record.session_id.clone();
    pipeline.sessions.insert(record);

    let accepted = pipeline
        .service
        .submit_turn(&sid, submission("k1", "slow"))
        .await
        .unwrap();

    // Let the worker pick it up, then end the session.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let _ = pipeline.sessions.end(&sid).await.unwrap();

    let status = wait_terminal(&pipeline.turns, &accepted.turn_id).await;
    assert_eq!(status, TurnStatus::Failed);
    let turn = pipeline.turns.get(&accepted.turn_id).unwrap();
    assert_eq!(turn.error_code.as_deref(), Some("CANCELLED"));

    let events = pipeline.sink.events_for_turn(accepted.turn_id.as_str()).await;
    let last = events.last().unwrap();
    assert_eq!(last.event_type, TurnEventType::Error);
    assert_eq!(last.payload["error_code"], "CANCELLED");
}

#[tokio::test]
async fn graceful_shutdown_drains_in_flight_turns() {
    let pipeline = start_pipeline(Script::Immediate, None).await;
    let record = session(false);
    let sid = record.session_id.clone();
    pipeline.sessions.insert(record);

    let accepted = pipeline
        .service
        .submit_turn(&sid, submission("k1", "quick"))
        .await
        .unwrap();

    pipeline.pool.shutdown(Duration::from_secs(5)).await;

    let turn = pipeline.turns.get(&accepted.turn_id).unwrap();
    assert_eq!(turn.status, TurnStatus::Completed, "drained turn must finish");
}

#[tokio::test]
async fn shutdown_rejects_new_submissions() {
    let pipeline = start_pipeline(Script::Immediate, None).await;
    let record = session(false);
    let sid = record.session_id.clone();
    pipeline.sessions.insert(record);

    let service = pipeline.service;
    pipeline.pool.shutdown(Duration::from_millis(200)).await;

    let err = service.submit_turn(&sid, submission("k1", "late")).await.unwrap_err();
    assert_eq!(err.wire_code(), "SHUTDOWN");
}
