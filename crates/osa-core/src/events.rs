// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use osa_config::AgentMode;
use osa_tools::{events::TodoItem, ToolCall};

/// Events emitted by the agent during a single turn.
/// Consumers (CI runner, TUI) subscribe to these to drive their output.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// A text chunk streamed from the model
    TextDelta(String),
    /// A complete text response from the model (after streaming finishes)
    TextComplete(String),
    /// A thinking/reasoning chunk from the model (extended thinking API).
    /// Consumers should accumulate deltas and finalise them into a Thinking
    /// segment when the model signals the end of the reasoning block.
    ThinkingDelta(String),
    /// A complete thinking/reasoning block (accumulated from ThinkingDelta events).
    ThinkingComplete(String),
    /// The model has requested a tool call
    ToolCallStarted(ToolCall),
    /// A tool call finished
    ToolCallFinished {
        call_id: String,
        tool_name: String,
        output: String,
        is_error: bool,
    },
    /// Context was compacted; statistics for the UI
    ContextCompacted {
        tokens_before: usize,
        tokens_after: usize,
        strategy: CompactionStrategyUsed,
        turn: u32,
    },
    /// Current token usage update
    TokenUsage {
        input: u32,
        output: u32,
        /// Tokens served from the provider's prompt cache this turn.
        cache_read: u32,
        /// Tokens written into the provider's prompt cache this turn.
        cache_write: u32,
        /// Running total of cache-read tokens for the whole session.
        cache_read_total: u64,
        /// Running total of cache-write tokens for the whole session.
        cache_write_total: u64,
        /// The session's current context window size (may change if the
        /// model is switched mid-session).
        max_tokens: usize,
    },
    /// The agent has finished processing the current user turn
    TurnComplete,
    /// A recoverable error occurred
    Error(String),
    /// The todo list was updated
    TodoUpdate(Vec<TodoItem>),
    /// The agent mode was changed
    ModeChanged(AgentMode),
    /// The agent is asking the user a question (id links to QuestionAnswer)
    Question { id: String, questions: Vec<String> },
    /// Answer to a previous Question event
    QuestionAnswer { id: String, answer: String },
    /// Three consecutive iterations requested the same (sorted) tool-name
    /// multiset and every call in both iterations failed — a "doom loop
    /// halt". Terminal for the turn — no further model calls are made.
    DoomLoopHalted { tool_names: Vec<String> },
    /// The turn was cancelled mid-stream. Any text already streamed is
    /// committed to the session before this is sent.
    Aborted { partial_text: String },
}

/// Which compaction path actually ran, reported alongside
/// [`AgentEvent::ContextCompacted`] for UI/debugging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionStrategyUsed {
    /// LLM-summarised, fixed-section checkpoint.
    Structured,
    /// LLM-summarised, free-form narrative checkpoint.
    Narrative,
    /// No model call — old messages dropped deterministically because even
    /// a compaction prompt would not have fit the budget.
    Emergency,
}
