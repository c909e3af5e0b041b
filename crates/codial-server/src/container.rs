//! Process container.
//!
//! Builds the whole runtime explicitly at startup — stores, publisher,
//! bridges, engine, worker pool, services — and hands back the state the
//! request handlers need plus the handles graceful shutdown tears down.
//! No hidden singletons: everything flows through [`AppState`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics_exporter_prometheus::PrometheusHandle;
use tracing::info;

use codial_bridge::{
    build_bridges, validate_enabled_providers, BridgeError, BridgeSettings, CopilotAuthBootstrapper,
    CopilotAuthConfig, ProviderManager,
};
use codial_core::retry::RetryConfig;
use codial_mcp::{McpClient, McpError};
use codial_policy::{PolicyLoader, RulesStore};
use codial_runtime::publisher::PublishError;
use codial_runtime::{
    AttachmentIngestor, GatewayPublisher, IdempotencyIndex, RuntimeError, SessionService,
    SessionStore, TurnEngine, TurnStore, TurnsService, WorkerPool,
};
use codial_tools::builtin_registry;

use crate::config::CoreConfig;

/// Queue capacity for accepted turns.
const TURN_QUEUE_CAPACITY: usize = 1000;
/// Wall-clock budget for one whole turn (all rounds included).
const TURN_WALL_CLOCK_BUDGET: Duration = Duration::from_secs(300);
/// Drain deadline during graceful shutdown.
pub const DRAIN_DEADLINE: Duration = Duration::from_secs(30);

/// Failures assembling the runtime.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// Provider catalog or auth bootstrap failure.
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// Runtime component construction failure.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// MCP client construction failure.
    #[error(transparent)]
    Mcp(#[from] McpError),

    /// Gateway publisher construction failure.
    #[error(transparent)]
    Publisher(#[from] PublishError),
}

/// Shared state for request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Arc<CoreConfig>,
    /// Session use-cases.
    pub sessions: Arc<SessionService>,
    /// Turn submission use-cases.
    pub turns: Arc<TurnsService>,
    /// `CODIAL.md` rule store.
    pub rules: Arc<RulesStore>,
    /// Set while the worker pool is running (readiness).
    pub workers_running: Arc<AtomicBool>,
    /// Server start time.
    pub start_time: Instant,
    /// Prometheus render handle, when metrics are installed.
    pub metrics_handle: Option<Arc<PrometheusHandle>>,
}

/// The pieces graceful shutdown must tear down.
pub struct RuntimeHandles {
    worker_pool: WorkerPool,
    workers_running: Arc<AtomicBool>,
}

impl RuntimeHandles {
    /// Drain and stop the worker pool.
    pub async fn shutdown(self, drain_deadline: Duration) {
        self.workers_running.store(false, Ordering::SeqCst);
        self.worker_pool.shutdown(drain_deadline).await;
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

impl std::fmt::Debug for RuntimeHandles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeHandles").finish_non_exhaustive()
    }
}

/// Assemble the runtime from configuration.
///
/// # Errors
///
/// Fails when the provider set is invalid, the Copilot auth bootstrap
/// cannot produce a token, or a component cannot be constructed.
pub async fn build_runtime(
    config: CoreConfig,
    metrics_handle: Option<PrometheusHandle>,
) -> Result<(AppState, RuntimeHandles), ContainerError> {
    let config = Arc::new(config);

    let policy = Arc::new(PolicyLoader::new(config.workspace_root.clone()));
    let rules = Arc::new(RulesStore::new(config.workspace_root.clone()));
    let idempotency = Arc::new(IdempotencyIndex::new());
    let session_store = Arc::new(SessionStore::new());
    let turn_store = Arc::new(TurnStore::new());

    let publisher = Arc::new(GatewayPublisher::new(
        &config.gateway_base_url,
        config.gateway_internal_token.clone(),
        config.request_timeout,
        RetryConfig::default(),
    )?);

    let ingestor = AttachmentIngestor::new(
        config.attachment_download_enabled,
        config.attachment_download_max_bytes,
        config.attachment_storage_dir.clone(),
        config.request_timeout,
    )?;

    let mcp = if config.mcp_server_url.is_empty() {
        None
    } else {
        Some(Arc::new(McpClient::new(
            &config.mcp_server_url,
            Some(config.mcp_server_token.clone()),
            config.mcp_request_timeout,
        )?))
    };

    let enabled = validate_enabled_providers(
        &config.enabled_provider_names,
        &config.default_provider_name,
    )?;

    let copilot_token_override = if enabled.iter().any(|n| n == codial_bridge::catalog::PROVIDER_COPILOT) {
        let bootstrapper = CopilotAuthBootstrapper::new(CopilotAuthConfig {
            bridge_base_url: config.copilot_bridge_base_url.clone(),
            bridge_token: config.copilot_bridge_token.clone(),
            timeout: config.provider_bridge_timeout,
            cache_path: config.copilot_auth_cache_path.clone(),
            workspace_root: config.workspace_root.clone(),
            auto_login_enabled: config.copilot_auto_login_enabled,
            login_endpoint: config.copilot_login_endpoint.clone(),
        });
        Some(bootstrapper.ensure_token().await?)
    } else {
        None
    };

    let bridge_settings = BridgeSettings {
        default_provider_name: config.default_provider_name.clone(),
        enabled_provider_names: enabled.clone(),
        copilot_bridge_base_url: config.copilot_bridge_base_url.clone(),
        copilot_bridge_token: config.copilot_bridge_token.clone(),
        bridge_timeout: config.provider_bridge_timeout,
    };
    let bridges = build_bridges(&bridge_settings, &enabled, copilot_token_override)?;
    let providers = Arc::new(ProviderManager::new(bridges, enabled));

    let tools = Arc::new(builtin_registry(std::path::Path::new(&config.workspace_root)));

    let engine = Arc::new(TurnEngine::new(
        publisher,
        ingestor,
        tools,
        mcp,
        providers.clone(),
        policy.clone(),
        RetryConfig::default(),
    ));

    let (queue, worker_pool) = WorkerPool::start(
        config.turn_worker_count.max(1),
        TURN_QUEUE_CAPACITY,
        engine,
        session_store.clone(),
        turn_store.clone(),
        TURN_WALL_CLOCK_BUDGET,
    );

    let sessions = Arc::new(SessionService::new(
        session_store.clone(),
        policy.clone(),
        providers,
        idempotency.clone(),
    ));
    let turns = Arc::new(TurnsService::new(
        session_store,
        turn_store,
        queue,
        idempotency,
    ));

    let workers_running = Arc::new(AtomicBool::new(true));
    info!(
        workers = config.turn_worker_count.max(1),
        workspace = %config.workspace_root,
        "runtime assembled"
    );

    let state = AppState {
        config,
        sessions,
        turns,
        rules,
        workers_running: workers_running.clone(),
        start_time: Instant::now(),
        metrics_handle: metrics_handle.map(Arc::new),
    };
    let handles = RuntimeHandles {
        worker_pool,
        workers_running,
    };
    Ok((state, handles))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
