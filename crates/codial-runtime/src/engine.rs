//! Turn engine.
//!
//! Orchestrates one turn end to end: policy composition, subagent
//! application, attachment ingest, tool manifest assembly, and the bounded
//! tool loop against the provider bridge. Progress is emitted as
//! [`TurnEvent`]s; each publish is awaited so per-turn event order on the
//! wire matches emission order.
//!
//! Tools come from two layers. Built-in tools are always in the manifest
//! and dispatch in-process; MCP tools are appended behind them when the
//! turn has MCP enabled (a built-in name shadows a same-named MCP tool).
//! Requested names resolve built-in first, then MCP, and an unknown name
//! becomes a failed tool result.
//!
//! Retry discipline: only the bridge call retries, and only on transient
//! classes. A failed tool call is never retried — it becomes an
//! `ok: false` tool result for the next bridge round.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use codial_bridge::{
    BridgeRequest, BridgeResponse, ProviderManager, SystemContext, ToolRequest, ToolResult,
    ToolSpec,
};
use codial_core::events::{TurnEvent, TurnEventType};
use codial_core::retry::RetryConfig;
use codial_mcp::McpClient;
use codial_policy::{
    enforce_provider_and_model, parse_policy_constraints, PolicyLoader, PolicySnapshot,
    SubagentSpec,
};
use codial_tools::ToolRegistry;

use crate::errors::RuntimeError;
use crate::ingest::AttachmentIngestor;
use crate::publisher::EventSink;
use crate::queue::TurnTask;

/// Maximum provider-bridge rounds per turn.
pub const MAX_TOOL_ROUNDS: u32 = 5;

/// The per-turn state after subagent application.
struct EffectiveTurn {
    text: String,
    model: String,
    mcp_enabled: bool,
    mcp_profile_name: Option<String>,
    memory_summary: String,
    subagent_applied: Option<String>,
}

/// Turn orchestrator. Shared by all workers; holds only immutable
/// collaborators.
pub struct TurnEngine {
    sink: Arc<dyn EventSink>,
    ingestor: AttachmentIngestor,
    tools: Arc<ToolRegistry>,
    mcp: Option<Arc<McpClient>>,
    providers: Arc<ProviderManager>,
    policy: Arc<PolicyLoader>,
    retry: RetryConfig,
}

impl TurnEngine {
    /// Create an engine.
    #[must_use]
    pub fn new(
        sink: Arc<dyn EventSink>,
        ingestor: AttachmentIngestor,
        tools: Arc<ToolRegistry>,
        mcp: Option<Arc<McpClient>>,
        providers: Arc<ProviderManager>,
        policy: Arc<PolicyLoader>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            sink,
            ingestor,
            tools,
            mcp,
            providers,
            policy,
            retry,
        }
    }

    /// Execute one turn.
    ///
    /// # Errors
    ///
    /// Any [`RuntimeError`]; the caller (worker) renders it into the turn
    /// record and, except for the budget case which already emitted its
    /// `final`, an `error` event.
    #[instrument(skip_all, fields(session_id = %task.session_id, turn_id = %task.turn_id))]
    pub async fn process(
        &self,
        task: &TurnTask,
        cancel: &CancellationToken,
    ) -> Result<(), RuntimeError> {
        let snapshot = self.policy.load();
        let constraints = parse_policy_constraints(&snapshot.rules_text);
        let effective = self.apply_subagent(task, &snapshot);

        self.emit(
            task,
            TurnEventType::Plan,
            format!(
                "analyzing the request: provider=`{}`, model=`{}`, subagent=`{}`, attachments={}",
                task.provider,
                effective.model,
                task.subagent_name.as_deref().unwrap_or("none"),
                task.attachments.len(),
            ),
        )
        .await;
        self.emit(
            task,
            TurnEventType::Action,
            format!(
                "loaded policy snapshot {}: RULES=`{}`, AGENTS=`{}`, SKILLS=`{}`",
                &snapshot.content_hash()[..12],
                snapshot.rules_summary(),
                snapshot.agents_summary(),
                snapshot.skills_summary(),
            ),
        )
        .await;

        if let Some(name) = &effective.subagent_applied {
            self.emit(
                task,
                TurnEventType::Action,
                format!(
                    "applied subagent `{name}`: model=`{}`, mcp={}",
                    effective.model,
                    if effective.mcp_enabled { "on" } else { "off" },
                ),
            )
            .await;
        } else if let Some(requested) = &task.subagent_name {
            if snapshot.subagent(requested).is_none() {
                self.emit(
                    task,
                    TurnEventType::Action,
                    format!("subagent `{requested}` has no definition on disk; continuing with session config"),
                )
                .await;
            }
        }

        if cancel.is_cancelled() {
            return Err(RuntimeError::Cancelled);
        }

        let mut attachments = task.attachments.clone();
        let ingest = self.ingestor.ingest(&mut attachments).await?;
        self.emit(task, TurnEventType::Action, ingest.summary.clone()).await;

        let tool_specs = self.collect_tools(task, &effective, cancel).await?;

        enforce_provider_and_model(&task.provider, &effective.model, &constraints)?;

        let bridge = self.providers.resolve(&task.provider)?;
        let system_context = SystemContext {
            rules_summary: snapshot.rules_summary(),
            agents_summary: snapshot.agents_summary(),
            skills_summary: snapshot.skills_summary(),
            memory_summary: effective.memory_summary.clone(),
        };

        let mut tool_results: Vec<ToolResult> = Vec::new();

        for round in 0..MAX_TOOL_ROUNDS {
            let request = BridgeRequest {
                session_id: task.session_id.to_string(),
                user_id: task.user_id.clone(),
                provider: task.provider.clone(),
                model: effective.model.clone(),
                text: effective.text.clone(),
                attachments: attachments.clone(),
                mcp_enabled: effective.mcp_enabled,
                mcp_profile_name: effective.mcp_profile_name.clone(),
                system_context: system_context.clone(),
                tool_specs: tool_specs.clone(),
                tool_results: std::mem::take(&mut tool_results),
                tool_call_round: round,
            };

            let response = self.call_bridge(bridge.as_ref(), &request, cancel).await?;

            self.emit(task, TurnEventType::DecisionSummary, response.decision_summary.clone())
                .await;
            if !response.output_text.is_empty() {
                self.emit(task, TurnEventType::ResponseDelta, response.output_text.clone())
                    .await;
            }

            if response.is_terminal() {
                self.emit(task, TurnEventType::Final, "turn completed".to_owned()).await;
                info!(rounds = round + 1, "turn reached a terminal answer");
                return Ok(());
            }

            tool_results = self
                .dispatch_tool_calls(task, &response.tool_requests, effective.mcp_enabled, cancel)
                .await?;
        }

        // Budget exhausted: terminal `final` per contract, then the error.
        self.emit(
            task,
            TurnEventType::Final,
            format!("tool budget exhausted after {MAX_TOOL_ROUNDS} rounds without a terminal answer"),
        )
        .await;
        Err(RuntimeError::ToolBudgetExceeded {
            rounds: MAX_TOOL_ROUNDS,
        })
    }

    /// Publish a terminal `error` event for a failed turn.
    pub async fn emit_error(&self, task: &TurnTask, error: &RuntimeError) {
        let envelope = error.to_envelope(task.trace_id.clone());
        let event =
            TurnEvent::from_error(task.session_id.clone(), task.turn_id.clone(), &envelope);
        if let Err(publish_error) = self.sink.publish(&event).await {
            warn!(%publish_error, "failed to publish error event");
        }
    }

    /// Fold the session's subagent (if any) into the effective turn.
    fn apply_subagent(&self, task: &TurnTask, snapshot: &PolicySnapshot) -> EffectiveTurn {
        let mut effective = EffectiveTurn {
            text: task.text.clone(),
            model: task.model.clone(),
            mcp_enabled: task.mcp_enabled,
            mcp_profile_name: task.mcp_profile_name.clone(),
            memory_summary: snapshot.memory_summary(),
            subagent_applied: None,
        };

        let Some(spec) = task.subagent_name.as_deref().and_then(|n| snapshot.subagent(n)) else {
            return effective;
        };

        apply_subagent_spec(&mut effective, spec);
        effective.subagent_applied = Some(spec.name.clone());
        effective
    }

    /// Assemble the turn's tool manifest: built-in specs first, then MCP
    /// discoveries that do not collide with a built-in name.
    ///
    /// A transient `tools/list` failure degrades to the built-in set; an
    /// MCP initialization failure fails the turn.
    async fn collect_tools(
        &self,
        task: &TurnTask,
        effective: &EffectiveTurn,
        cancel: &CancellationToken,
    ) -> Result<Vec<ToolSpec>, RuntimeError> {
        let mut specs = self.tools.specs();
        self.emit(
            task,
            TurnEventType::Action,
            format!(
                "registered {} builtin tool(s): {}",
                specs.len(),
                self.tools.names().join(", "),
            ),
        )
        .await;

        let Some(mcp) = self.mcp.as_ref().filter(|_| effective.mcp_enabled) else {
            return Ok(specs);
        };

        let init = tokio::select! {
            () = cancel.cancelled() => return Err(RuntimeError::Cancelled),
            init = mcp.ensure_initialized() => init?,
        };
        let server_name = init.server_name.as_deref().unwrap_or("unknown server");

        let tools = tokio::select! {
            () = cancel.cancelled() => return Err(RuntimeError::Cancelled),
            tools = mcp.list_tools() => tools,
        };
        let tools = match tools {
            Ok(tools) => tools,
            Err(e) if e.is_retryable() => {
                warn!(error = %e, "mcp tool listing failed, continuing with builtin tools only");
                self.emit(
                    task,
                    TurnEventType::Action,
                    format!("connected to MCP server `{server_name}` but tool listing failed; this turn uses builtin tools only"),
                )
                .await;
                return Ok(specs);
            }
            Err(e) => return Err(e.into()),
        };

        self.emit(
            task,
            TurnEventType::Action,
            format!(
                "connected to MCP server `{server_name}` (protocol `{}`); discovered {} tool(s)",
                init.protocol_version.as_deref().unwrap_or("unknown"),
                tools.len(),
            ),
        )
        .await;

        specs.extend(
            tools
                .into_iter()
                .filter(|tool| !self.tools.contains(&tool.name))
                .map(|tool| ToolSpec {
                    name: tool.name,
                    title: tool.title,
                    description: tool.description,
                    input_schema: tool.input_schema,
                    output_schema: tool.output_schema,
                }),
        );
        Ok(specs)
    }

    /// Call the bridge with transient retry and cancellation.
    async fn call_bridge(
        &self,
        bridge: &dyn codial_bridge::ProviderBridge,
        request: &BridgeRequest,
        cancel: &CancellationToken,
    ) -> Result<BridgeResponse, RuntimeError> {
        let mut attempt: u32 = 0;
        loop {
            let result = tokio::select! {
                () = cancel.cancelled() => return Err(RuntimeError::Cancelled),
                result = bridge.generate(request) => result,
            };

            match result {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    let backoff = self.retry.backoff_delay(attempt);
                    let delay = e
                        .retry_after_ms()
                        .map_or(backoff, |ra| backoff.max(Duration::from_millis(ra)));
                    metrics::counter!("bridge_retries_total").increment(1);
                    warn!(error = %e, attempt, delay_ms = delay.as_millis() as u64, "bridge call failed, retrying");

                    tokio::select! {
                        () = cancel.cancelled() => return Err(RuntimeError::Cancelled),
                        () = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Execute one round of tool requests.
    ///
    /// A built-in name runs in-process; everything else goes to MCP.
    /// Failures become `ok: false` results for the next bridge round; only
    /// cancellation aborts the round.
    async fn dispatch_tool_calls(
        &self,
        task: &TurnTask,
        requests: &[ToolRequest],
        mcp_enabled: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<ToolResult>, RuntimeError> {
        let mut results = Vec::with_capacity(requests.len());

        for request in requests {
            if cancel.is_cancelled() {
                return Err(RuntimeError::Cancelled);
            }

            let result = if self.tools.contains(&request.name) {
                self.call_builtin_tool(task, request, cancel).await?
            } else if let Some(mcp) = self.mcp.as_ref().filter(|_| mcp_enabled) {
                self.call_mcp_tool(task, request, mcp, cancel).await?
            } else {
                self.emit(
                    task,
                    TurnEventType::Action,
                    format!(
                        "tool `{}` is unavailable: not a builtin tool, and MCP is disabled for this turn",
                        request.name
                    ),
                )
                .await;
                ToolResult::err(
                    request.tool_call_id.clone(),
                    &request.name,
                    "not a builtin tool, and MCP is disabled for this turn",
                )
            };
            results.push(result);
        }

        Ok(results)
    }

    /// Run one built-in tool call.
    async fn call_builtin_tool(
        &self,
        task: &TurnTask,
        request: &ToolRequest,
        cancel: &CancellationToken,
    ) -> Result<ToolResult, RuntimeError> {
        let outcome = tokio::select! {
            () = cancel.cancelled() => return Err(RuntimeError::Cancelled),
            outcome = self.tools.call(&request.name, &request.arguments) => outcome,
        };

        let status = if outcome.ok { "succeeded" } else { "failed" };
        self.emit(
            task,
            TurnEventType::Action,
            format!("builtin tool `{}` call {status}", request.name),
        )
        .await;

        Ok(if outcome.ok {
            ToolResult::ok(request.tool_call_id.clone(), &request.name, outcome.into_payload())
        } else {
            ToolResult::err(request.tool_call_id.clone(), &request.name, outcome.error)
        })
    }

    /// Run one MCP tool call.
    async fn call_mcp_tool(
        &self,
        task: &TurnTask,
        request: &ToolRequest,
        mcp: &Arc<McpClient>,
        cancel: &CancellationToken,
    ) -> Result<ToolResult, RuntimeError> {
        let call = tokio::select! {
            () = cancel.cancelled() => return Err(RuntimeError::Cancelled),
            call = mcp.call_tool(&request.name, request.arguments.clone()) => call,
        };

        Ok(match call {
            Ok(value) => {
                self.emit(
                    task,
                    TurnEventType::Action,
                    format!("tool `{}` call succeeded", request.name),
                )
                .await;
                ToolResult::ok(request.tool_call_id.clone(), &request.name, value)
            }
            Err(e) => {
                self.emit(
                    task,
                    TurnEventType::Action,
                    format!("tool `{}` call failed: {e}", request.name),
                )
                .await;
                ToolResult::err(request.tool_call_id.clone(), &request.name, e.to_string())
            }
        })
    }

    /// Emit one text event; delivery failures are logged, not fatal.
    async fn emit(&self, task: &TurnTask, event_type: TurnEventType, text: String) {
        let event = TurnEvent::text(task.session_id.clone(), task.turn_id.clone(), event_type, text)
            .with_trace(task.trace_id.clone());
        if let Err(publish_error) = self.sink.publish(&event).await {
            warn!(%publish_error, event_type = %event.event_type, "failed to publish event");
        }
    }
}

/// Apply a subagent definition to the effective turn state.
fn apply_subagent_spec(effective: &mut EffectiveTurn, spec: &SubagentSpec) {
    if spec.overrides_model() {
        effective.model = spec.model.clone();
    }
    if !spec.prompt.is_empty() {
        effective.text = if effective.text.is_empty() {
            spec.prompt.clone()
        } else {
            format!("{}\n\nUser request:\n{}", spec.prompt, effective.text)
        };
    }
    if !spec.mcp_servers.is_empty() {
        effective.mcp_enabled = true;
        if effective.mcp_profile_name.is_none() {
            effective.mcp_profile_name = Some(spec.mcp_servers[0].clone());
        }
    }
    if let Some(memory) = &spec.memory {
        effective.memory_summary = format!("{}, subagent-memory={memory}", effective.memory_summary);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
