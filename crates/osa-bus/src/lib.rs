// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Event Bus and PubSub Bridge.
//!
//! `EventBus` is synchronous fan-out: `publish` calls every handler
//! registered for the event's type inline, in the producing task. Handlers
//! are expected to be fast (enqueue-and-return); a panicking handler is
//! caught and logged, it never aborts the producer or other handlers.
//!
//! `PubSubBridge` sits behind one bus subscription per event type plus a
//! wildcard subscription, and republishes every event to three topic
//! classes: the firehose (every event), a per-session topic, and a
//! per-type topic. Subscribers are mailboxes, not callbacks — each has its
//! own bounded queue; on overflow the oldest message is dropped and a
//! warning logged, so a slow subscriber never blocks the bus.

mod mailbox;

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use mailbox::Mailbox;

/// Which half of a tool call this event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Start,
    End,
}

/// `system_event` subtypes, folded into a typed enumeration (Open Question
/// decision, see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemEventKind {
    SchedulerTick,
    CircuitOpened,
    CircuitClosed,
    ProviderFallback,
    SessionCreated,
    SessionClosed,
}

/// The coarse discriminant used for bus subscription and the `osa:type:<type>`
/// topic name. This is the "type" atom from the data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    AgentThinking,
    AgentResponse,
    AgentCancelled,
    ToolCall,
    LlmRequest,
    LlmResponse,
    SignalClassified,
    SignalFiltered,
    SystemEvent,
    /// `external_trigger(trigger_id, payload)` — dispatched by an external
    /// caller (webhook, API) and consumed by the Scheduler's trigger
    /// dispatcher.
    ExternalTrigger,
}

impl EventType {
    pub fn topic_name(&self) -> &'static str {
        match self {
            EventType::AgentThinking => "agent_thinking",
            EventType::AgentResponse => "agent_response",
            EventType::AgentCancelled => "agent_cancelled",
            EventType::ToolCall => "tool_call",
            EventType::LlmRequest => "llm_request",
            EventType::LlmResponse => "llm_response",
            EventType::SignalClassified => "signal_classified",
            EventType::SignalFiltered => "signal_filtered",
            EventType::SystemEvent => "system_event",
            EventType::ExternalTrigger => "external_trigger",
        }
    }
}

/// A single event flowing through the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Only meaningful when `event_type == ToolCall`.
    pub phase: Option<Phase>,
    /// Only meaningful when `event_type == SystemEvent`.
    pub system_kind: Option<SystemEventKind>,
    pub session_id: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub payload: Value,
}

impl Event {
    pub fn new(event_type: EventType, payload: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type,
            phase: None,
            system_kind: None,
            session_id: None,
            timestamp: chrono::Utc::now(),
            payload,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn with_system_kind(mut self, kind: SystemEventKind) -> Self {
        self.system_kind = Some(kind);
        self
    }
}

pub type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Synchronous, in-process fan-out. The handler table is republished as an
/// immutable snapshot on every mutation (`arc-swap`), so publishing never
/// contends with registration.
#[derive(Default)]
pub struct EventBus {
    by_type: ArcSwap<HashMap<EventType, Vec<Handler>>>,
    wildcard: ArcSwap<Vec<Handler>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            by_type: ArcSwap::from_pointee(HashMap::new()),
            wildcard: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Subscribe a handler to one event type.
    pub fn subscribe(&self, event_type: EventType, handler: Handler) {
        let mut next = (**self.by_type.load()).clone();
        next.entry(event_type).or_default().push(handler);
        self.by_type.store(Arc::new(next));
    }

    /// Subscribe a handler to every event, regardless of type (used by
    /// [`crate::PubSubBridge`] for the firehose topic).
    pub fn subscribe_all(&self, handler: Handler) {
        let mut next = (**self.wildcard.load()).clone();
        next.push(handler);
        self.wildcard.store(Arc::new(next));
    }

    /// Fan out `event` to every matching handler inline. A handler that
    /// panics is caught and logged; it does not stop the remaining
    /// handlers or propagate to the caller.
    pub fn publish(&self, event: &Event) {
        let typed = self.by_type.load();
        if let Some(handlers) = typed.get(&event.event_type) {
            for h in handlers {
                Self::invoke(h, event);
            }
        }
        for h in self.wildcard.load().iter() {
            Self::invoke(h, event);
        }
    }

    fn invoke(handler: &Handler, event: &Event) {
        let result = catch_unwind(AssertUnwindSafe(|| handler(event)));
        if result.is_err() {
            tracing::error!(event_id = %event.id, event_type = ?event.event_type, "bus handler panicked");
        }
    }
}

/// Default per-subscriber mailbox capacity. Overflow drops the oldest
/// queued event and logs a warning; the bus never blocks on a slow
/// subscriber.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 256;

/// Three-tier fan-out: firehose (every event), per-session, per-type.
/// Subscribers receive their own [`Mailbox`]; publication into a mailbox
/// never blocks.
pub struct PubSubBridge {
    firehose: ArcSwap<Vec<Arc<Mailbox>>>,
    sessions: ArcSwap<HashMap<String, Vec<Arc<Mailbox>>>>,
    types: ArcSwap<HashMap<EventType, Vec<Arc<Mailbox>>>>,
    capacity: usize,
}

impl PubSubBridge {
    pub fn new() -> Arc<Self> {
        Self::with_capacity(DEFAULT_MAILBOX_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            firehose: ArcSwap::from_pointee(Vec::new()),
            sessions: ArcSwap::from_pointee(HashMap::new()),
            types: ArcSwap::from_pointee(HashMap::new()),
            capacity,
        })
    }

    /// Attach this bridge to `bus` as a wildcard subscriber so every
    /// published event is republished to `osa:events`, `osa:session:<id>`
    /// and `osa:type:<type>`.
    pub fn attach(self: &Arc<Self>, bus: &EventBus) {
        let bridge = Arc::clone(self);
        bus.subscribe_all(Arc::new(move |event: &Event| bridge.publish(event)));
    }

    pub fn subscribe_firehose(&self) -> Arc<Mailbox> {
        let mailbox = Arc::new(Mailbox::new(self.capacity));
        let mut next = (**self.firehose.load()).clone();
        next.push(Arc::clone(&mailbox));
        self.firehose.store(Arc::new(next));
        mailbox
    }

    pub fn subscribe_session(&self, session_id: impl Into<String>) -> Arc<Mailbox> {
        let mailbox = Arc::new(Mailbox::new(self.capacity));
        let mut next = (**self.sessions.load()).clone();
        next.entry(session_id.into()).or_default().push(Arc::clone(&mailbox));
        self.sessions.store(Arc::new(next));
        mailbox
    }

    pub fn subscribe_type(&self, event_type: EventType) -> Arc<Mailbox> {
        let mailbox = Arc::new(Mailbox::new(self.capacity));
        let mut next = (**self.types.load()).clone();
        next.entry(event_type).or_default().push(Arc::clone(&mailbox));
        self.types.store(Arc::new(next));
        mailbox
    }

    fn publish(&self, event: &Event) {
        for mailbox in self.firehose.load().iter() {
            mailbox.push(event.clone());
        }
        if let Some(session_id) = &event.session_id {
            if let Some(subs) = self.sessions.load().get(session_id) {
                for mailbox in subs {
                    mailbox.push(event.clone());
                }
            }
        }
        if let Some(subs) = self.types.load().get(&event.event_type) {
            for mailbox in subs {
                mailbox.push(event.clone());
            }
        }
    }
}
