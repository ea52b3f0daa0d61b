// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The Loop front door: `deliver(session_id, user_id, text, channel)` is the
//! single entry point every channel adapter, the HTTP facade, and the
//! Scheduler's synthetic deliveries call into.
//!
//! This module is the bridge between three already-complete pieces — the
//! pure [`osa_signal`] classifier/filter, the [`osa_bus`] event fan-out, and
//! [`Agent`]'s ReAct loop — none of which otherwise know about each other.
//! `SessionLoop::deliver` runs noise filtering and classification first
//! (the `classifying` state), then drives the agent loop and republishes
//! its internal [`AgentEvent`] stream onto the bus in the canonical shape
//! external subscribers expect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::json;
use tokio::sync::{mpsc, oneshot, Mutex};

use osa_bus::{Event, EventBus, EventType, Phase};
use osa_signal::{classify, filter, FilterOutcome, Signal};

use crate::agent::Agent;
use crate::events::AgentEvent;
use crate::session_log::SessionLog;

/// Outcome of one `deliver` call, shaped to back the HTTP facade's
/// `POST /api/v1/orchestrate` response.
#[derive(Debug, Clone)]
pub struct DeliverOutcome {
    pub session_id: String,
    pub output: String,
    pub signal: Signal,
    pub filtered: bool,
    pub tools_used: Vec<String>,
    pub iteration_count: u32,
    pub cancelled: bool,
}

/// One session's worth of agent state plus its cooperative-cancellation
/// flag. Owned exclusively by the [`SessionRegistry`] that created it;
/// external callers reach it only through `deliver`/`cancel`.
pub struct SessionLoop {
    pub session_id: String,
    agent: Mutex<Agent>,
    cancel_flag: Arc<AtomicBool>,
    log: SessionLog,
}

impl SessionLoop {
    pub fn new(session_id: impl Into<String>, agent: Agent) -> Arc<Self> {
        let session_id = session_id.into();
        let log = SessionLog::new(&session_id);
        Arc::new(Self {
            session_id,
            agent: Mutex::new(agent),
            cancel_flag: Arc::new(AtomicBool::new(false)),
            log,
        })
    }

    /// Set the cooperative cancellation flag. Checked between iterations
    /// and after tool fan-out by the underlying
    /// [`Agent`]; in-flight tool calls are awaited to their own timeout,
    /// never force-killed.
    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::SeqCst)
    }

    /// Front door: noise filter → classify → agent loop → `agent_response`.
    pub async fn deliver(
        self: &Arc<Self>,
        bus: &Arc<EventBus>,
        user_id: &str,
        text: &str,
        channel: &str,
    ) -> DeliverOutcome {
        let signal = classify(text, channel);
        self.log.append("user", text);

        match filter(text, channel) {
            FilterOutcome::Noise(reason) => {
                bus.publish(
                    &Event::new(
                        EventType::SignalFiltered,
                        json!({
                            "reason": format!("{reason:?}"),
                            "weight": signal.weight,
                            "user_id": user_id,
                        }),
                    )
                    .with_session(self.session_id.clone()),
                );
                DeliverOutcome {
                    session_id: self.session_id.clone(),
                    output: String::new(),
                    signal,
                    filtered: true,
                    tools_used: Vec::new(),
                    iteration_count: 0,
                    cancelled: false,
                }
            }
            FilterOutcome::Signal(weight) => {
                bus.publish(
                    &Event::new(
                        EventType::SignalClassified,
                        json!({
                            "mode": format!("{:?}", signal.mode),
                            "genre": format!("{:?}", signal.genre),
                            "message_type": format!("{:?}", signal.message_type),
                            "format": format!("{:?}", signal.format),
                            "weight": weight,
                            "user_id": user_id,
                        }),
                    )
                    .with_session(self.session_id.clone()),
                );

                self.cancel_flag.store(false, Ordering::SeqCst);
                let (tx, rx) = mpsc::channel(256);
                let (cancel_tx, cancel_rx) = oneshot::channel();
                let watch_flag = Arc::clone(&self.cancel_flag);
                let watcher = tokio::spawn(async move {
                    loop {
                        if watch_flag.load(Ordering::SeqCst) {
                            let _ = cancel_tx.send(());
                            return;
                        }
                        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                    }
                });

                let bridge = tokio::spawn(bridge_events(Arc::clone(bus), self.session_id.clone(), rx));

                let text = text.to_string();
                let run_result = {
                    let mut agent = self.agent.lock().await;
                    agent.submit_with_cancel(&text, tx, cancel_rx).await
                };
                watcher.abort();
                let bridged = bridge.await.unwrap_or_default();

                if let Err(e) = run_result {
                    tracing::error!(session_id = %self.session_id, error = %e, "agent loop returned an error");
                }

                if !bridged.final_text.is_empty() {
                    self.log.append("assistant", &bridged.final_text);
                }

                DeliverOutcome {
                    session_id: self.session_id.clone(),
                    output: bridged.final_text,
                    signal,
                    filtered: false,
                    tools_used: bridged.tools_used,
                    iteration_count: bridged.iteration_count,
                    cancelled: bridged.cancelled,
                }
            }
        }
    }
}

#[derive(Default)]
struct BridgedTurn {
    final_text: String,
    tools_used: Vec<String>,
    iteration_count: u32,
    cancelled: bool,
}

/// Pending `llm_response` payload for the iteration currently in flight,
/// buffered until every `tool_call(end)` for that iteration (if any) has
/// been published — see [`bridge_events`].
struct PendingUsage {
    input: u32,
    output: u32,
    cache_read: u32,
    cache_write: u32,
}

/// Drain one turn's [`AgentEvent`] stream and republish it onto the bus in
/// the canonical shape: `llm_request` precedes every `tool_call(start)`,
/// which precedes its matching `tool_call(end)`, which precedes
/// `llm_response`.
///
/// [`AgentEvent::TokenUsage`] arrives from [`Agent`] as soon as the model
/// call completes — *before* that iteration's tool calls are dispatched.
/// Publishing `llm_response` at that point would put it ahead of the
/// iteration's own `tool_call(start)`/`tool_call(end)` pair on the bus, so
/// the usage is buffered here and only turned into `llm_response` once the
/// iteration's tool fan-out (if any) has fully finished; the next
/// `llm_request` is only opened at that same point, immediately before the
/// next model call actually begins.
async fn bridge_events(
    bus: Arc<EventBus>,
    session_id: String,
    mut rx: mpsc::Receiver<AgentEvent>,
) -> BridgedTurn {
    let mut turn = BridgedTurn::default();
    let mut iteration = 1u32;
    let mut pending_usage: Option<PendingUsage> = None;
    // How many tool calls this iteration started/finished so far — once they
    // match (and at least one call was made) the iteration is done and its
    // buffered usage can be published as `llm_response`.
    let mut tool_started = 0usize;
    let mut tool_finished = 0usize;

    bus.publish(
        &Event::new(EventType::LlmRequest, json!({ "iteration": iteration }))
            .with_session(session_id.clone()),
    );

    while let Some(ev) = rx.recv().await {
        match ev {
            AgentEvent::ToolCallStarted(tc) => {
                turn.tools_used.push(tc.name.clone());
                tool_started += 1;
                bus.publish(
                    &Event::new(
                        EventType::ToolCall,
                        json!({ "id": tc.id, "name": tc.name, "args": tc.args }),
                    )
                    .with_session(session_id.clone())
                    .with_phase(Phase::Start),
                );
            }
            AgentEvent::ToolCallFinished {
                call_id,
                tool_name,
                output,
                is_error,
            } => {
                bus.publish(
                    &Event::new(
                        EventType::ToolCall,
                        json!({
                            "id": call_id,
                            "name": tool_name,
                            "ok": !is_error,
                            "output": output,
                        }),
                    )
                    .with_session(session_id.clone())
                    .with_phase(Phase::End),
                );
                tool_finished += 1;
                if tool_started > 0 && tool_finished == tool_started {
                    flush_iteration(&bus, &session_id, &mut iteration, &mut pending_usage, true);
                    tool_started = 0;
                    tool_finished = 0;
                }
            }
            AgentEvent::TokenUsage {
                input,
                output,
                cache_read,
                cache_write,
                ..
            } => {
                pending_usage = Some(PendingUsage {
                    input,
                    output,
                    cache_read,
                    cache_write,
                });
            }
            AgentEvent::TextComplete(text) => {
                turn.final_text = text;
            }
            AgentEvent::DoomLoopHalted { tool_names } => {
                turn.tools_used = tool_names;
            }
            AgentEvent::Aborted { partial_text } => {
                turn.cancelled = true;
                if !partial_text.is_empty() {
                    turn.final_text = partial_text;
                }
            }
            AgentEvent::TurnComplete => {
                // Zero-tool-call iterations (the final answer) never see a
                // ToolCallFinished, so their buffered usage is flushed here
                // instead. No further llm_request follows — the turn is over.
                flush_iteration(&bus, &session_id, &mut iteration, &mut pending_usage, false);
            }
            AgentEvent::Error(msg) => {
                tracing::warn!(session_id = %session_id, error = %msg, "agent reported a recoverable error");
            }
            _ => {}
        }
    }

    // Cancellation/abort can leave a buffered usage with no terminal event
    // to flush it (the stream just closes). Flush without opening another
    // llm_request, matching the TurnComplete path.
    flush_iteration(&bus, &session_id, &mut iteration, &mut pending_usage, false);

    turn.iteration_count = iteration.max(1);

    if turn.cancelled {
        bus.publish(
            &Event::new(EventType::AgentCancelled, json!({ "output": turn.final_text }))
                .with_session(session_id.clone()),
        );
    } else {
        bus.publish(
            &Event::new(
                EventType::AgentResponse,
                json!({
                    "output": turn.final_text,
                    "tools_used": turn.tools_used,
                    "iteration_count": turn.iteration_count,
                }),
            )
            .with_session(session_id),
        );
    }

    turn
}

/// Publish the buffered `llm_response` for the iteration currently tagged by
/// `*iteration`, if one is pending, then — only when `open_next` is true —
/// advance to the next iteration number and publish its `llm_request`. A
/// no-op when nothing is buffered, so callers can invoke it unconditionally
/// at every point an iteration might have just completed.
fn flush_iteration(
    bus: &Arc<EventBus>,
    session_id: &str,
    iteration: &mut u32,
    pending: &mut Option<PendingUsage>,
    open_next: bool,
) {
    let Some(usage) = pending.take() else {
        return;
    };
    bus.publish(
        &Event::new(
            EventType::LlmResponse,
            json!({
                "iteration": *iteration,
                "usage": {
                    "input_tokens": usage.input,
                    "output_tokens": usage.output,
                    "cache_read_tokens": usage.cache_read,
                    "cache_write_tokens": usage.cache_write,
                },
            }),
        )
        .with_session(session_id.to_string()),
    );
    if open_next {
        *iteration += 1;
        bus.publish(
            &Event::new(EventType::LlmRequest, json!({ "iteration": *iteration }))
                .with_session(session_id.to_string()),
        );
    }
}

/// Registry mapping `session_id` → its owned [`SessionLoop`]. Sessions are
/// created lazily on first
/// delivery and live until explicitly closed or process shutdown —
/// idle/ephemeral-session eviction is left to the caller (e.g. the
/// Scheduler drops its transient per-tick sessions immediately after use).
pub struct SessionRegistry {
    bus: Arc<EventBus>,
    sessions: Mutex<HashMap<String, Arc<SessionLoop>>>,
}

impl SessionRegistry {
    pub fn new(bus: Arc<EventBus>) -> Arc<Self> {
        Arc::new(Self {
            bus,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Look up a session, constructing a fresh [`SessionLoop`] with
    /// `factory` if none exists yet.
    pub async fn get_or_create<F>(&self, session_id: &str, factory: F) -> Arc<SessionLoop>
    where
        F: FnOnce() -> Agent,
    {
        let mut sessions = self.sessions.lock().await;
        if let Some(existing) = sessions.get(session_id) {
            return Arc::clone(existing);
        }
        let created = SessionLoop::new(session_id.to_string(), factory());
        sessions.insert(session_id.to_string(), Arc::clone(&created));
        created
    }

    pub async fn get(&self, session_id: &str) -> Option<Arc<SessionLoop>> {
        self.sessions.lock().await.get(session_id).cloned()
    }

    /// Explicit session close (channel disconnect for ephemeral sessions,
    /// or an operator-initiated teardown).
    pub async fn close(&self, session_id: &str) -> bool {
        self.sessions.lock().await.remove(session_id).is_some()
    }

    pub async fn cancel(&self, session_id: &str) -> bool {
        if let Some(s) = self.get(session_id).await {
            s.cancel();
            true
        } else {
            false
        }
    }

    /// Set the cooperative cancellation flag on every live session. Used
    /// during graceful shutdown to cancel in-flight turns before the HTTP
    /// listener stops accepting connections.
    pub async fn cancel_all(&self) {
        for session in self.sessions.lock().await.values() {
            session.cancel();
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}
