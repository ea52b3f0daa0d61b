// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Ordered pre/post hooks around tool execution.
//!
//! A pre-tool hook may block a single call by returning
//! [`HookOutcome::Block`]; the block reason becomes the tool's output,
//! exactly like a normal `tool_execution_failed` (a `tool_blocked_by_hook`
//! outcome — not retried by the hook itself). Hooks run in ascending
//! priority order; lower numbers run first.

use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;

use crate::{ToolCall, ToolOutput};

/// Result of a pre-tool hook.
#[derive(Debug, Clone)]
pub enum HookOutcome {
    Continue,
    Block(String),
}

#[async_trait]
pub trait PreToolHook: Send + Sync {
    /// Lower runs first. Default mid-priority.
    fn priority(&self) -> i32 {
        0
    }
    async fn before(&self, call: &ToolCall) -> HookOutcome;
}

#[async_trait]
pub trait PostToolHook: Send + Sync {
    fn priority(&self) -> i32 {
        0
    }
    async fn after(&self, call: &ToolCall, output: &ToolOutput);
}

/// Ordered hook pipeline. Registration is a read-copy-update over an
/// immutable snapshot, matching the Tool Registry's lock-free reader
/// pattern — a hook run never contends with hook registration.
pub struct HookRegistry {
    pre: ArcSwap<Vec<Arc<dyn PreToolHook>>>,
    post: ArcSwap<Vec<Arc<dyn PostToolHook>>>,
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HookRegistry {
    pub fn new() -> Self {
        Self {
            pre: ArcSwap::from_pointee(Vec::new()),
            post: ArcSwap::from_pointee(Vec::new()),
        }
    }

    pub fn register_pre(&self, hook: Arc<dyn PreToolHook>) {
        let mut next = (**self.pre.load()).clone();
        next.push(hook);
        next.sort_by_key(|h| h.priority());
        self.pre.store(Arc::new(next));
    }

    pub fn register_post(&self, hook: Arc<dyn PostToolHook>) {
        let mut next = (**self.post.load()).clone();
        next.push(hook);
        next.sort_by_key(|h| h.priority());
        self.post.store(Arc::new(next));
    }

    /// Run pre-tool hooks in priority order. Returns `Some(reason)` on the
    /// first block; hooks after the blocking one do not run (the call is
    /// already rejected).
    pub async fn run_pre(&self, call: &ToolCall) -> Option<String> {
        for hook in self.pre.load().iter() {
            if let HookOutcome::Block(reason) = hook.before(call).await {
                return Some(reason);
            }
        }
        None
    }

    /// Run post-tool hooks in priority order. Hooks observe but cannot
    /// alter the already-final output.
    pub async fn run_post(&self, call: &ToolCall, output: &ToolOutput) {
        for hook in self.post.load().iter() {
            hook.after(call, output).await;
        }
    }

    pub fn pre_count(&self) -> usize {
        self.pre.load().len()
    }

    pub fn post_count(&self) -> usize {
        self.post.load().len()
    }
}
