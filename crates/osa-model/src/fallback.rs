// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Provider Registry: model routing, fallback chain, streaming normalization.
//!
//! Holds a runtime-registrable map of named providers plus a configured
//! default and an ordered fallback chain. `chat` picks the requested (or
//! default) provider; on failure it retries the sub-tail of the fallback
//! chain starting just after the failing name, first success wins.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::response::{drain_stream, CanonicalResponse};
use crate::{CompletionRequest, ModelProvider, ResponseEvent};

/// Options accepted by [`ProviderRegistry::chat`].
#[derive(Debug, Clone, Default)]
pub struct ChatOpts {
    pub provider: Option<String>,
}

pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn ModelProvider>>,
    default_provider: String,
    fallback_chain: Vec<String>,
    configured_env: HashMap<String, bool>,
}

impl ProviderRegistry {
    pub fn new(default_provider: impl Into<String>, fallback_chain: Vec<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
            fallback_chain,
            configured_env: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn ModelProvider>) {
        let name = name.into();
        self.configured_env.insert(name.clone(), true);
        self.providers.insert(name, provider);
    }

    /// Boolean used by routing/UI: is this provider usable right now (API key
    /// present, or explicitly registered without needing one)?
    pub fn configured(&self, name: &str) -> bool {
        if self.providers.contains_key(name) {
            return true;
        }
        match crate::registry::get_driver(name) {
            Some(d) if !d.requires_api_key => true,
            Some(d) => d
                .default_api_key_env
                .map(|env| std::env::var(env).is_ok())
                .unwrap_or(false),
            None => false,
        }
    }

    fn chain_from(&self, start: &str) -> Vec<String> {
        match self.fallback_chain.iter().position(|p| p == start) {
            Some(pos) => self.fallback_chain[pos + 1..].to_vec(),
            None => Vec::new(),
        }
    }

    fn resolve_name<'a>(&self, opts: &'a ChatOpts) -> String {
        opts.provider
            .clone()
            .unwrap_or_else(|| self.default_provider.clone())
    }

    /// Try `name`, then the sub-tail of the fallback chain starting after it.
    /// First success wins; exhaustion returns the last error.
    pub async fn chat(
        &self,
        req: CompletionRequest,
        opts: ChatOpts,
    ) -> anyhow::Result<(String, CanonicalResponse)> {
        let primary = self.resolve_name(&opts);
        let mut candidates = vec![primary.clone()];
        candidates.extend(self.chain_from(&primary));

        let mut last_err: Option<anyhow::Error> = None;
        for name in candidates {
            let Some(provider) = self.providers.get(&name) else {
                last_err = Some(anyhow::anyhow!("provider_unavailable: {name} not registered"));
                continue;
            };
            match provider.complete(req.clone()).await {
                Ok(stream) => match drain_stream(stream, |_| {}).await {
                    Ok(resp) => return Ok((name, resp)),
                    Err(e) => {
                        warn!(provider = %name, error = %e, "provider stream failed, trying fallback");
                        last_err = Some(e);
                    }
                },
                Err(e) => {
                    warn!(provider = %name, error = %e, "provider call failed, trying fallback");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("provider_unavailable: no providers configured")))
    }

    /// Same fallback semantics as [`Self::chat`], but forwards every raw
    /// [`ResponseEvent`] to `on_event` as it streams in — including the
    /// `text_delta`s of whichever attempt ultimately wins. Failed attempts'
    /// partial events are not forwarded (the caller only sees one committed
    /// stream).
    pub async fn chat_stream(
        &self,
        req: CompletionRequest,
        opts: ChatOpts,
        mut on_event: impl FnMut(&ResponseEvent),
    ) -> anyhow::Result<(String, CanonicalResponse)> {
        let primary = self.resolve_name(&opts);
        let mut candidates = vec![primary.clone()];
        candidates.extend(self.chain_from(&primary));

        let mut last_err: Option<anyhow::Error> = None;
        for name in candidates {
            let Some(provider) = self.providers.get(&name) else {
                last_err = Some(anyhow::anyhow!("provider_unavailable: {name} not registered"));
                continue;
            };
            match provider.complete(req.clone()).await {
                Ok(stream) => match drain_stream(stream, &mut on_event).await {
                    Ok(resp) => return Ok((name, resp)),
                    Err(e) => last_err = Some(e),
                },
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("provider_unavailable: no providers configured")))
    }
}
