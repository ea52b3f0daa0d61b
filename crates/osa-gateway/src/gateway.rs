// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! HTTP facade entry point: builds the axum router, wires JWT auth +
//! security middleware onto it, and serves it.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::sync::Mutex;

use osa_bus::{EventBus, PubSubBridge};
use osa_config::{AgentConfig, Config};
use osa_core::{Agent, AgentRuntimeContext, SessionRegistry};
use osa_memory::MemoryStore;
use osa_tools::{
    ApplyPatchTool, DeleteFileTool, EditFileTool, GlobFileSearchTool, GrepTool, ListDirTool,
    ReadFileTool, ReadLintsTool, RunTerminalCommandTool, SwitchModeTool, TodoItem, TodoWriteTool,
    ToolEvent, ToolRegistry, UpdateMemoryTool, WebFetchTool, WebSearchTool, WriteTool,
};

use crate::http::auth::{self, AuthState};
use crate::http::{routes, security};

/// Tracks whether the process's last Scheduler tick succeeded, for the
/// `/health` endpoint. A read-only projection, not new state.
#[derive(Default)]
pub struct HealthState {
    last_tick_ok: AtomicBool,
}

impl HealthState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { last_tick_ok: AtomicBool::new(true) })
    }

    pub fn record_tick(&self, ok: bool) {
        self.last_tick_ok.store(ok, Ordering::SeqCst);
    }

    pub fn last_tick_ok(&self) -> bool {
        self.last_tick_ok.load(Ordering::SeqCst)
    }
}

/// Builds one fresh [`Agent`] per session: the model provider is shared
/// (stateless HTTP client underneath), but the tool registry, mode lock,
/// and tool-event channel are per-session state and must not be shared
/// across concurrent sessions.
#[derive(Clone)]
pub struct SessionFactory {
    model: Arc<dyn osa_model::ModelProvider>,
    agent_config: Arc<AgentConfig>,
    max_ctx: usize,
    web_search_api_key: Option<String>,
    memory_file: Option<String>,
    machines: Arc<ArcSwap<HashMap<String, bool>>>,
    pub provider_configured: bool,
}

impl SessionFactory {
    pub fn from_config(
        config: &Config,
        machines: Arc<ArcSwap<HashMap<String, bool>>>,
    ) -> anyhow::Result<Self> {
        let model: Arc<dyn osa_model::ModelProvider> = Arc::from(osa_model::from_config(&config.model)?);
        let max_ctx = model.catalog_context_window().unwrap_or(128_000) as usize;
        let registry = osa_model::ProviderRegistry::new(config.model.provider.clone(), vec![]);
        let provider_configured = registry.configured(&config.model.provider);

        Ok(Self {
            model,
            agent_config: Arc::new(config.agent.clone()),
            max_ctx,
            web_search_api_key: config.tools.web.search.api_key.clone(),
            memory_file: config.tools.memory.memory_file.clone(),
            machines,
            provider_configured,
        })
    }

    pub fn build_agent(&self) -> Agent {
        let mode = Arc::new(Mutex::new(self.agent_config.default_mode));
        let (tool_tx, tool_rx) = tokio::sync::mpsc::channel::<ToolEvent>(64);
        let todos: Arc<Mutex<Vec<TodoItem>>> = Arc::new(Mutex::new(Vec::new()));

        let mut registry = ToolRegistry::new();
        registry.register(RunTerminalCommandTool::default());
        registry.register(ReadFileTool);
        registry.register(WriteTool);
        registry.register(EditFileTool);
        registry.register(GlobFileSearchTool);
        registry.register(GrepTool);
        registry.register(ListDirTool);
        registry.register(DeleteFileTool);
        registry.register(WebFetchTool);
        registry.register(WebSearchTool { api_key: self.web_search_api_key.clone() });
        registry.register(ApplyPatchTool);
        registry.register(ReadLintsTool);
        registry.register(UpdateMemoryTool { memory_file: self.memory_file.clone() });
        registry.register(TodoWriteTool::new(todos, tool_tx.clone()));
        registry.register(SwitchModeTool::new(mode.clone(), tool_tx));

        for (group, enabled) in (**self.machines.load()).iter() {
            registry.set_group_enabled(group.clone(), *enabled);
        }

        let runtime = AgentRuntimeContext::default();

        Agent::new(
            Arc::clone(&self.model),
            Arc::new(registry),
            Arc::clone(&self.agent_config),
            runtime,
            mode,
            tool_rx,
            self.max_ctx,
        )
    }
}

/// Shared axum state for every route.
#[derive(Clone)]
pub struct GatewayState {
    pub sessions: Arc<SessionRegistry>,
    pub bus: Arc<EventBus>,
    pub pubsub: Arc<PubSubBridge>,
    pub memory: Arc<MemoryStore>,
    pub machines: Arc<ArcSwap<HashMap<String, bool>>>,
    pub session_factory: SessionFactory,
    pub health: Arc<HealthState>,
    pub auth: AuthState,
}

impl auth::AsAuthState for GatewayState {
    fn auth_state(&self) -> &AuthState {
        &self.auth
    }
}

/// Assembles the full axum router: `/health` unauthenticated, everything
/// else behind JWT auth; security headers and CSRF checks apply to all
/// routes.
pub fn build_router(state: GatewayState) -> Router {
    let protected = Router::new()
        .route("/api/v1/orchestrate", post(routes::orchestrate))
        .route("/api/v1/orchestrate/:session_id/stream", get(routes::orchestrate_stream))
        .route("/api/v1/classify", post(routes::classify_route))
        .route("/api/v1/memory", post(routes::put_memory))
        .route("/api/v1/memory/:key", get(routes::get_memory))
        .route("/api/v1/memory/search", get(routes::search_memory))
        .route("/api/v1/machines", get(routes::get_machines).put(routes::put_machines))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::bearer_auth_mw::<GatewayState>,
        ));

    Router::new()
        .route("/health", get(routes::health))
        .merge(protected)
        .layer(middleware::from_fn(security::csrf_guard))
        .layer(middleware::from_fn(security::security_headers))
        .with_state(state)
}

/// Run the HTTP facade until `shutdown` resolves. Graceful shutdown sets
/// the cancellation flag on every live session before the listener stops
/// accepting connections — the caller is responsible for tying `shutdown`
/// to that cancellation.
#[allow(clippy::too_many_arguments)]
pub async fn serve(
    addr: SocketAddr,
    config: &Config,
    sessions: Arc<SessionRegistry>,
    bus: Arc<EventBus>,
    pubsub: Arc<PubSubBridge>,
    memory: Arc<MemoryStore>,
    health: Arc<HealthState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let secret = config
        .gateway
        .jwt_secret
        .clone()
        .or_else(|| std::env::var("OSA_JWT_SECRET").ok())
        .ok_or_else(|| {
            anyhow::anyhow!("gateway requires a JWT secret (config gateway.jwt_secret or $OSA_JWT_SECRET)")
        })?;

    let machines: Arc<ArcSwap<HashMap<String, bool>>> =
        Arc::new(ArcSwap::from_pointee(config.machines.clone()));

    let state = GatewayState {
        sessions,
        bus,
        pubsub,
        memory,
        machines: Arc::clone(&machines),
        session_factory: SessionFactory::from_config(config, machines)?,
        health,
        auth: AuthState::with_defaults(secret),
    };

    let router = build_router(state).into_make_service_with_connect_info::<SocketAddr>();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "gateway listening");
    axum::serve(listener, router).with_graceful_shutdown(shutdown).await?;
    Ok(())
}
