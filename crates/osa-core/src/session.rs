// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use osa_model::Message;
use uuid::Uuid;

/// One saved turn in the conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub role: String,
    pub content: String,
}

/// In-memory conversation session.
#[derive(Debug)]
pub struct Session {
    pub id: String,
    /// Channel-facing user identity, set by the Loop front door on delivery.
    /// `None` for sessions constructed directly (e.g. the CI runner, tests)
    /// rather than via `Loop::deliver`.
    pub user_id: Option<String>,
    /// Inbound channel name ("cli", "telegram", "webhook", …), used to
    /// derive the signal `Format` and to route outbound replies.
    pub channel: Option<String>,
    pub messages: Vec<Message>,
    /// Approximate total token count for the current message list
    pub token_count: usize,
    /// Maximum context tokens (set from model config / provider limits)
    pub max_tokens: usize,
    /// Maximum output tokens the current model can produce, from its
    /// catalog entry. Reserved out of `max_tokens` when computing the
    /// usable input budget so a full-length response never overflows the
    /// context window.
    pub max_output_tokens: usize,
    /// Token overhead for content sent with every request but not stored in
    /// `messages` — tool schemas and the dynamic git/CI context block.
    /// Recomputed each turn by `Agent::estimate_schema_overhead`.
    pub schema_overhead: usize,
    /// Correction factor applied to the chars/4 token estimate, refined
    /// from each provider response's actual `input_tokens` count via
    /// [`Self::update_calibration`]. Starts at 1.0 (no correction).
    pub calibration_factor: f32,
    /// Running total of prompt-cache tokens read/written across the whole
    /// session, for UI display.
    pub cache_read_total: u64,
    pub cache_write_total: u64,
    /// Doom-loop detector state: the stable hash of
    /// the previous iteration's sorted tool-name multiset, and how many
    /// consecutive iterations matched it while every call in both
    /// iterations failed. Reset to `(None, 0)` whenever either condition
    /// breaks.
    pub last_tool_signature: Option<u64>,
    pub consecutive_failures: u32,
}

impl Session {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: None,
            channel: None,
            messages: Vec::new(),
            token_count: 0,
            max_tokens,
            max_output_tokens: 0,
            schema_overhead: 0,
            calibration_factor: 1.0,
            cache_read_total: 0,
            cache_write_total: 0,
            last_tool_signature: None,
            consecutive_failures: 0,
        }
    }

    /// Usable input budget: the context window minus room reserved for the
    /// model's own output. Zero when the model's output ceiling is unknown
    /// or meets/exceeds the window (callers treat 0 as "skip the check").
    pub fn input_budget(&self) -> usize {
        self.max_tokens.saturating_sub(self.max_output_tokens)
    }

    /// Fold in a cache-read/cache-write sample from a provider response.
    pub fn add_cache_usage(&mut self, cache_read_tokens: u32, cache_write_tokens: u32) {
        self.cache_read_total += cache_read_tokens as u64;
        self.cache_write_total += cache_write_tokens as u64;
    }

    /// Nudge `calibration_factor` towards `actual_input / estimated` using
    /// an exponential moving average, so the chars/4 estimate converges to
    /// the current model/workload's real tokenizer ratio over the session.
    pub fn update_calibration(&mut self, actual_input: u32, estimated: usize) {
        if estimated == 0 {
            return;
        }
        let sample = actual_input as f32 / estimated as f32;
        const ALPHA: f32 = 0.2;
        self.calibration_factor = (1.0 - ALPHA) * self.calibration_factor + ALPHA * sample;
        self.calibration_factor = self.calibration_factor.clamp(0.25, 4.0);
    }

    pub fn push(&mut self, msg: Message) {
        self.token_count += msg.approx_tokens();
        self.messages.push(msg);
    }

    pub fn push_many(&mut self, msgs: impl IntoIterator<Item = Message>) {
        for m in msgs { self.push(m); }
    }

    /// Fraction of context window consumed (0.0–1.0)
    pub fn context_fraction(&self) -> f32 {
        if self.max_tokens == 0 { return 0.0; }
        (self.token_count as f32) / (self.max_tokens as f32)
    }

    pub fn is_near_limit(&self, threshold: f32) -> bool {
        self.context_fraction() >= threshold
    }

    /// Recalculate token count from scratch (call after compaction).
    pub fn recalculate_tokens(&mut self) {
        self.token_count = self.messages.iter().map(|m| m.approx_tokens()).sum();
    }

    /// Replace the message list and recalculate token count (for resubmit / edit).
    pub fn replace_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
        self.recalculate_tokens();
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
