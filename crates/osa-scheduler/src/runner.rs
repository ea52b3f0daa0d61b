// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Capability interface the scheduler uses to run `agent`-type jobs and
//! heartbeat checklist items, without depending on the full agent loop's
//! construction machinery (model, tool registry, mode lock, event channel).
//!
//! Whatever wires up the running process constructs the real agent loop
//! once and hands the scheduler a thin implementation of this trait — the
//! same "capability interface with a fixed method set" pattern used at the
//! provider/channel/tool boundaries.

use async_trait::async_trait;

/// Runs a single piece of text through an agent loop to completion and
/// returns its final response.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run(&self, prompt: &str) -> Result<String, String>;
}

#[cfg(test)]
pub(crate) struct StubRunner {
    pub response: Result<String, String>,
}

#[cfg(test)]
#[async_trait]
impl AgentRunner for StubRunner {
    async fn run(&self, _prompt: &str) -> Result<String, String> {
        self.response.clone()
    }
}
