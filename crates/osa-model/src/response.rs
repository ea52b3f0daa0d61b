// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Canonical response shape: every provider adapter's output is folded into
//! this before the agent loop ever sees it.

use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::provider::ResponseStream;
use crate::ResponseEvent;

/// A tool call normalized out of whatever wire format the provider used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    /// Raw JSON-encoded argument object, as produced by the model.
    pub arguments: String,
}

/// `{content, tool_calls}` — the only shape the agent core depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCallRequest>,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cache_read_tokens: u32,
    pub cache_write_tokens: u32,
}

/// Drain a [`ResponseStream`] into a single [`CanonicalResponse`], forwarding
/// each event to `on_event` as it arrives (used to fan `text_delta`s onto the
/// event bus while the final aggregate is still being assembled).
pub async fn drain_stream(
    mut stream: ResponseStream,
    mut on_event: impl FnMut(&ResponseEvent),
) -> anyhow::Result<CanonicalResponse> {
    let mut out = CanonicalResponse::default();
    let mut next_index = 0usize;
    while let Some(event) = stream.next().await {
        let event = event?;
        on_event(&event);
        match event {
            ResponseEvent::TextDelta(t) => out.content.push_str(&t),
            ResponseEvent::ThinkingDelta(_) => {}
            ResponseEvent::ToolCall {
                index,
                id,
                name,
                arguments,
            } => {
                let idx = if index >= out.tool_calls.len() {
                    let pad = index.max(next_index);
                    while out.tool_calls.len() <= pad {
                        out.tool_calls.push(ToolCallRequest {
                            id: String::new(),
                            name: String::new(),
                            arguments: String::new(),
                        });
                    }
                    pad
                } else {
                    index
                };
                next_index = next_index.max(idx + 1);
                let slot = &mut out.tool_calls[idx];
                if !id.is_empty() {
                    slot.id = id;
                }
                if !name.is_empty() {
                    slot.name = name;
                }
                slot.arguments.push_str(&arguments);
            }
            ResponseEvent::Usage {
                input_tokens,
                output_tokens,
                cache_read_tokens,
                cache_write_tokens,
            } => {
                out.input_tokens = input_tokens;
                out.output_tokens = output_tokens;
                out.cache_read_tokens = cache_read_tokens;
                out.cache_write_tokens = cache_write_tokens;
            }
            ResponseEvent::Done => break,
            ResponseEvent::MaxTokens => {}
            ResponseEvent::Error(e) => anyhow::bail!(e),
        }
    }
    out.tool_calls.retain(|c| !c.name.is_empty());
    Ok(out)
}
