// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The Channel contract: the trait boundary that external adapters
//! (Telegram, Slack, Matrix, Discord, WhatsApp, …) implement.
//! Concrete adapters are out of scope here — this crate only defines the
//! inbound/outbound shapes and a registry for the outbound half.
//!
//! Inbound: an adapter calls `osa_core::SessionRegistry::get_or_create` then
//! `SessionLoop::deliver(session_id, user_id, text, channel)` directly; that
//! path is defined in `osa-core`, not duplicated here.
//!
//! Outbound: an adapter implements [`OutboundChannel`] and registers itself
//! with a [`ChannelRegistry`]. The core looks up the registered sender by
//! channel name when an `agent_response` event fires for a session whose
//! channel matches, and invokes `send`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

/// Delivery options attached to an outbound send (reply threading, message
/// formatting hints). Left intentionally sparse — concrete adapters are out
/// of scope, so only the fields the core itself needs to pass through are
/// modeled.
#[derive(Debug, Clone, Default)]
pub struct SendOpts {
    /// Opaque id of the message being replied to, if any.
    pub reply_to: Option<String>,
    /// Render as markdown on adapters that support it.
    pub markdown: bool,
}

/// Outbound half of the Channel contract: an adapter registers a
/// `send(chat_id, text, opts)` function; the core invokes it when an
/// `agent_response` event fires for a session whose channel matches.
#[async_trait]
pub trait OutboundChannel: Send + Sync {
    /// The channel name this adapter answers for (e.g. `"telegram"`,
    /// `"slack"`). Matched against `Signal.channel` / the session's channel.
    fn name(&self) -> &str;

    async fn send(&self, chat_id: &str, text: &str, opts: SendOpts) -> anyhow::Result<()>;
}

/// Adapter-facing registry: one [`OutboundChannel`] per channel name, looked
/// up by the core's event-bus subscriber when routing `agent_response`
/// events back out to their originating channel. A channel with no
/// registered sender is a silent no-op (e.g. `"cli"` and `"webhook"`
/// sessions never need outbound delivery).
#[derive(Default)]
pub struct ChannelRegistry {
    channels: RwLock<HashMap<String, Arc<dyn OutboundChannel>>>,
}

impl ChannelRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            channels: RwLock::new(HashMap::new()),
        })
    }

    pub async fn register(&self, channel: Arc<dyn OutboundChannel>) {
        self.channels
            .write()
            .await
            .insert(channel.name().to_string(), channel);
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn OutboundChannel>> {
        self.channels.read().await.get(name).cloned()
    }

    /// Deliver to `chat_id` on `channel`, a no-op (logged) when no adapter
    /// is registered for that channel.
    pub async fn dispatch(&self, channel: &str, chat_id: &str, text: &str, opts: SendOpts) {
        match self.get(channel).await {
            Some(adapter) => {
                if let Err(e) = adapter.send(chat_id, text, opts).await {
                    tracing::warn!(channel, chat_id, error = %e, "outbound channel send failed");
                }
            }
            None => {
                tracing::debug!(channel, "no outbound adapter registered, dropping send");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingChannel {
        name: String,
        hits: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl OutboundChannel for RecordingChannel {
        fn name(&self) -> &str {
            &self.name
        }

        async fn send(&self, _chat_id: &str, _text: &str, _opts: SendOpts) -> anyhow::Result<()> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn dispatch_invokes_matching_adapter() {
        let registry = ChannelRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        registry
            .register(Arc::new(RecordingChannel {
                name: "telegram".into(),
                hits: Arc::clone(&hits),
            }))
            .await;

        registry
            .dispatch("telegram", "123", "hi", SendOpts::default())
            .await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dispatch_to_unregistered_channel_is_a_silent_noop() {
        let registry = ChannelRegistry::new();
        registry
            .dispatch("nonexistent", "123", "hi", SendOpts::default())
            .await;
    }

    #[tokio::test]
    async fn registry_get_returns_none_before_registration() {
        let registry = ChannelRegistry::new();
        assert!(registry.get("slack").await.is_none());
    }
}
