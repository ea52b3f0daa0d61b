// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Route handlers for the HTTP facade.

use std::collections::HashMap;
use std::convert::Infallible;
use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    response::{IntoResponse, Response},
    Json,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::json;

use osa_core::OsaError;
use osa_memory::MemoryKind;
use osa_signal::classify;

use crate::gateway::GatewayState;

// ── POST /api/v1/orchestrate ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct OrchestrateRequest {
    pub input: String,
    pub user_id: String,
    pub session_id: Option<String>,
    pub channel: Option<String>,
    #[serde(default)]
    pub context: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct OrchestrateResponse {
    pub session_id: String,
    pub output: String,
    pub signal: serde_json::Value,
    pub tools_used: Vec<String>,
    pub iteration_count: u32,
    pub execution_ms: u128,
}

pub async fn orchestrate(
    State(state): State<GatewayState>,
    Json(req): Json<OrchestrateRequest>,
) -> Response {
    let session_id = req.session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let channel = req.channel.unwrap_or_else(|| "http".to_string());
    let factory = state.session_factory.clone();

    let session = state
        .sessions
        .get_or_create(&session_id, move || factory.build_agent())
        .await;

    let started = Instant::now();
    let outcome = session
        .deliver(&state.bus, &req.user_id, &req.input, &channel)
        .await;
    let execution_ms = started.elapsed().as_millis();

    let signal = serde_json::to_value(&outcome.signal).unwrap_or(json!(null));

    if outcome.filtered {
        let err = OsaError::SignalFiltered(format!("weight {:.2}", outcome.signal.weight));
        return (
            axum::http::StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({
                "session_id": outcome.session_id,
                "signal": signal,
                "error": err.code(),
            })),
        )
            .into_response();
    }

    Json(OrchestrateResponse {
        session_id: outcome.session_id,
        output: outcome.output,
        signal,
        tools_used: outcome.tools_used,
        iteration_count: outcome.iteration_count,
        execution_ms,
    })
    .into_response()
}

// ── GET /api/v1/orchestrate/:session_id/stream ────────────────────────────────

pub async fn orchestrate_stream(
    State(state): State<GatewayState>,
    Path(session_id): Path<String>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let mailbox = state.pubsub.subscribe_session(session_id);
    let stream = futures::stream::unfold(mailbox, |mailbox| async move {
        let event = mailbox.recv().await;
        let sse = SseEvent::default()
            .event(event.event_type.topic_name())
            .json_data(&event.payload)
            .unwrap_or_else(|_| SseEvent::default().event("error"));
        Some((Ok(sse), mailbox))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

// ── POST /api/v1/classify ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ClassifyRequest {
    pub message: String,
    pub channel: Option<String>,
}

pub async fn classify_route(Json(req): Json<ClassifyRequest>) -> Response {
    let channel = req.channel.as_deref().unwrap_or("http");
    let signal = classify(&req.message, channel);
    Json(json!({ "signal": signal })).into_response()
}

// ── /api/v1/memory ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PutMemoryRequest {
    pub kind: MemoryKind,
    pub key: String,
    pub value: serde_json::Value,
}

pub async fn put_memory(
    State(state): State<GatewayState>,
    Json(req): Json<PutMemoryRequest>,
) -> Response {
    match state.memory.put(req.kind, &req.key, req.value) {
        Ok(record) => Json(record).into_response(),
        Err(e) => {
            let err = OsaError::ToolExecutionFailed(e.to_string());
            (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": err.code(), "detail": e.to_string() })),
            )
                .into_response()
        }
    }
}

pub async fn get_memory(
    State(state): State<GatewayState>,
    Path(key): Path<String>,
) -> Response {
    match state.memory.get(&key) {
        Some(record) => Json(record).into_response(),
        None => (axum::http::StatusCode::NOT_FOUND, "not found").into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

pub async fn search_memory(
    State(state): State<GatewayState>,
    Query(params): Query<SearchQuery>,
) -> Response {
    Json(state.memory.search(&params.q)).into_response()
}

// ── /api/v1/machines ───────────────────────────────────────────────────────────

pub async fn get_machines(State(state): State<GatewayState>) -> Response {
    Json((**state.machines.load()).clone()).into_response()
}

/// Toggles are read by [`crate::gateway::SessionFactory::build_agent`] when
/// a new session's tool registry is constructed, so a toggle flipped here
/// applies to sessions created afterward. Live sessions keep whatever
/// snapshot they started with — matching the Tool Registry's "agnostic to
/// what a group means" contract.
pub async fn put_machines(
    State(state): State<GatewayState>,
    Json(toggles): Json<HashMap<String, bool>>,
) -> Response {
    let mut next = (**state.machines.load()).clone();
    next.extend(toggles);
    state.machines.store(std::sync::Arc::new(next.clone()));
    Json(next).into_response()
}

// ── GET /health ────────────────────────────────────────────────────────────────

pub async fn health(State(state): State<GatewayState>) -> Response {
    Json(json!({
        "status": "ok",
        "provider_configured": state.session_factory.provider_configured,
        "scheduler_last_tick_ok": state.health.last_tick_ok(),
        "active_sessions": state.sessions.len().await,
    }))
    .into_response()
}
