// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use osa_config::CompactionStrategy;
use osa_model::{Message, Role};
use osa_tools::OutputCategory;

// ─── Compaction prompts ───────────────────────────────────────────────────────

const SUMMARIZE_PROMPT: &str =
    "You are a context compaction assistant. Summarise the following conversation history \
     in a concise, information-dense way. Preserve all technical details, decisions, file \
     names, code snippets, and tool outputs that may be relevant to future work. \
     The summary will replace the original history to free up context space.";

const STRUCTURED_COMPACTION_PROMPT: &str = "\
You are a context compaction assistant for a software engineering agent. \
Produce a structured state checkpoint from the conversation history below. \
Use EXACTLY the following Markdown sections — do not add or remove sections. \
Be information-dense: preserve file paths, function names, error messages, \
code snippets, test names, and technical decisions verbatim where they matter.

## Active Task
Describe in 1-3 sentences what the agent is currently working on.

## Key Decisions & Rationale
List every significant technical decision made and why (bullet points). \
Include file or component names.

## Files & Artifacts
List every file that was read, modified, or created, with a brief note on what was done.

## Constraints & Requirements
List every requirement, constraint, or user preference that must be preserved.

## Pending Items
List every unfinished subtask or open question.

## Session Narrative
Write a dense technical summary (2-5 paragraphs) of what happened, \
capturing the essential flow of events, tool outputs, and reasoning. \
Focus on facts the agent will need to continue correctly.";

// ─── Public API ───────────────────────────────────────────────────────────────

/// Replace the conversation history with a single summarisation request using
/// the legacy narrative strategy.  Kept for backward compatibility and direct
/// use in tests; prefer [`compact_session_with_strategy`] for new callers.
pub fn compact_session(messages: &mut Vec<Message>, system_msg: Option<Message>) -> usize {
    compact_session_with_strategy(messages, system_msg, &CompactionStrategy::Narrative)
}

/// Strategy-aware compaction: restructures the message list so that the model
/// will produce a summary (or structured checkpoint) on the next turn.
///
/// The caller is responsible for actually invoking the model and rebuilding
/// the session from the resulting summary text.  This function only rewrites
/// the `messages` list to contain the compaction prompt.
pub fn compact_session_with_strategy(
    messages: &mut Vec<Message>,
    system_msg: Option<Message>,
    strategy: &CompactionStrategy,
) -> usize {
    let before = messages.len();
    let prompt = match strategy {
        CompactionStrategy::Structured => STRUCTURED_COMPACTION_PROMPT,
        CompactionStrategy::Narrative => SUMMARIZE_PROMPT,
    };
    let history_text = serialize_history(messages);
    let summary_request = Message::user(format!("{prompt}\n\n---\n\n{history_text}"));
    messages.clear();
    if let Some(sys) = system_msg {
        messages.push(sys);
    }
    messages.push(summary_request);
    before
}

/// Emergency fallback compaction used when the session is too large to fit even
/// a compaction prompt within the context window.
///
/// Drops all but the last `keep_n` non-system messages and prepends a canned
/// notice.  No model call is made — this is a purely deterministic operation
/// that always succeeds regardless of session size.
pub fn emergency_compact(
    messages: &mut Vec<Message>,
    system_msg: Option<Message>,
    keep_n: usize,
) -> usize {
    let before = messages.len();
    let non_system: Vec<Message> = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .cloned()
        .collect();
    let keep = keep_n.min(non_system.len());
    let preserved: Vec<Message> = non_system[non_system.len() - keep..].to_vec();
    let notice = Message::assistant(
        "[Context emergency-compacted: earlier history was dropped to prevent a \
         context-window overflow. The agent may lack full context for earlier \
         decisions. Proceed carefully and ask the user to re-provide any missing \
         requirements if needed.]",
    );
    messages.clear();
    if let Some(sys) = system_msg {
        messages.push(sys);
    }
    messages.push(notice);
    messages.extend(preserved);
    before
}

/// Deterministic, content-aware tool-result truncation.
///
/// Returns `content` unchanged when it fits within `cap_tokens`.
/// Otherwise applies a category-specific extraction strategy that preserves
/// the most useful portion of the output.  Dispatching on [`OutputCategory`]
/// (not on tool names) keeps this function independent of the tools crate's
/// concrete tool list; each tool declares its own category.
///
/// - [`OutputCategory::HeadTail`]: keep the first 60 + last 40 lines so both
///   the command preamble and the final result are visible.
/// - [`OutputCategory::MatchList`]: keep leading matches (highest relevance
///   first); the tail is not preserved because later matches are less relevant.
/// - [`OutputCategory::FileContent`]: balanced head + tail with a separator,
///   preserving both the imports/declarations and the most recent changes.
/// - [`OutputCategory::Generic`]: hard-truncate at the nearest line boundary.
///
/// Every truncated result ends with an explicit notice so the model knows
/// that additional content exists and how to retrieve it.
pub fn smart_truncate(content: &str, category: OutputCategory, cap_tokens: usize) -> String {
    if cap_tokens == 0 {
        return content.to_string();
    }
    let cap_chars = cap_tokens * 4;
    if content.len() <= cap_chars {
        return content.to_string();
    }
    let omitted_bytes = content.len().saturating_sub(cap_chars);
    match category {
        OutputCategory::HeadTail => head_tail_lines(
            content,
            cap_chars,
            60,
            40,
            &format!("[... {{lines}} lines / {omitted_bytes} bytes omitted ...]"),
        ),
        OutputCategory::MatchList => head_lines(
            content,
            cap_chars,
            &format!(
                "[... {{lines}} more matches omitted ({omitted_bytes} bytes); \
                     use a more specific pattern to see them ...]"
            ),
        ),
        OutputCategory::FileContent => head_tail_lines(
            content,
            cap_chars,
            usize::MAX,
            usize::MAX,
            &format!(
                "[... {{lines}} lines omitted ({omitted_bytes} bytes); \
                     use read_file with offset/limit to see more ...]"
            ),
        ),
        OutputCategory::Generic => {
            let cut = content[..cap_chars]
                .rfind('\n')
                .map(|p| p + 1)
                .unwrap_or(cap_chars);
            format!(
                "{}\n[... {omitted_bytes} bytes omitted; \
                 content truncated to fit context budget ...]",
                &content[..cut]
            )
        }
    }
}

// ─── Private helpers ──────────────────────────────────────────────────────────

/// Serialise a message list into plain text for inclusion in a compaction prompt.
fn serialize_history(messages: &[Message]) -> String {
    messages
        .iter()
        .filter(|m| !matches!(m.role, Role::System))
        .map(|m| {
            let role = match m.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
                Role::Tool => "Tool",
                Role::System => "System",
            };
            let text = match &m.content {
                osa_model::MessageContent::Text(t) => t.clone(),
                osa_model::MessageContent::ContentParts(parts) => parts
                    .iter()
                    .map(|p| match p {
                        osa_model::ContentPart::Text { text } => text.clone(),
                        osa_model::ContentPart::Image { .. } => "[image]".to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(" "),
                osa_model::MessageContent::ToolCall { function, .. } => {
                    format!("[tool_call: {}({})]", function.name, function.arguments)
                }
                osa_model::MessageContent::ToolResult { content, .. } => {
                    format!("[tool_result: {content}]")
                }
            };
            format!("{role}: {text}")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Keep only the leading lines that fit within `cap_chars`.
fn head_lines(content: &str, cap_chars: usize, notice_template: &str) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let mut kept = String::with_capacity(cap_chars);
    let mut kept_count = 0usize;
    for line in &lines {
        let needed = if kept.is_empty() {
            line.len()
        } else {
            line.len() + 1
        };
        if kept.len() + needed > cap_chars {
            break;
        }
        if !kept.is_empty() {
            kept.push('\n');
        }
        kept.push_str(line);
        kept_count += 1;
    }
    let omitted = lines.len().saturating_sub(kept_count);
    if omitted == 0 {
        return content[..cap_chars.min(content.len())].to_string();
    }
    let notice = notice_template.replace("{lines}", &omitted.to_string());
    format!("{kept}\n{notice}")
}

/// Keep `max_head` leading lines and `max_tail` trailing lines, inserting a
/// notice between them.  Pass `usize::MAX` to split evenly by character budget.
fn head_tail_lines(
    content: &str,
    cap_chars: usize,
    max_head: usize,
    max_tail: usize,
    notice_template: &str,
) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let half_cap = cap_chars / 2;

    // Head
    let mut head = String::with_capacity(half_cap);
    let mut head_count = 0usize;
    for line in lines.iter().take(max_head) {
        let needed = if head.is_empty() {
            line.len()
        } else {
            line.len() + 1
        };
        if head.len() + needed > half_cap {
            break;
        }
        if !head.is_empty() {
            head.push('\n');
        }
        head.push_str(line);
        head_count += 1;
    }

    // Tail (collect from the end)
    let mut tail_lines: Vec<&str> = Vec::new();
    let mut tail_chars = 0usize;
    for line in lines.iter().rev().take(max_tail) {
        let needed = if tail_lines.is_empty() {
            line.len()
        } else {
            line.len() + 1
        };
        if tail_chars + needed > half_cap {
            break;
        }
        tail_chars += needed;
        tail_lines.push(line);
    }
    tail_lines.reverse();
    let tail_count = tail_lines.len();
    let tail = tail_lines.join("\n");

    let omitted = lines.len().saturating_sub(head_count + tail_count);
    if omitted == 0 {
        return content[..cap_chars.min(content.len())].to_string();
    }
    let notice = notice_template.replace("{lines}", &omitted.to_string());
    format!("{head}\n{notice}\n{tail}")
}

// ─── Unit tests ───────────────────────────────────────────────────────────────
