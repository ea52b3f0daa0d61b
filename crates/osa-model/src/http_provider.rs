// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Generic OpenAI-compatible chat-completions driver.
//!
//! Most registered drivers (openai, groq, cerebras, together, openrouter,
//! ollama, vllm, ...) speak the same `POST /chat/completions` wire format.
//! Rather than hand-writing one adapter per vendor, this single driver is
//! parameterized by base URL, API key and model name; provider-specific
//! quirks beyond that are out of scope here — only the canonical
//! `{content, tool_calls}` shape this crate exposes matters to callers.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};

use crate::catalog::InputModality;
use crate::provider::ResponseStream;
use crate::{CompletionRequest, Message, MessageContent, ModelProvider, ResponseEvent, Role};

pub struct HttpCompatProvider {
    driver_id: String,
    model: String,
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpCompatProvider {
    pub fn new(
        driver_id: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            driver_id: driver_id.into(),
            model: model.into(),
            base_url: base_url.into(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn to_wire_messages(messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::Tool => "tool",
                };
                match &m.content {
                    MessageContent::Text(t) => json!({"role": role, "content": t}),
                    MessageContent::ContentParts(_) => json!({"role": role, "content": m.as_text()}),
                    MessageContent::ToolCall { tool_call_id, function } => json!({
                        "role": "assistant",
                        "tool_calls": [{
                            "id": tool_call_id,
                            "type": "function",
                            "function": {"name": function.name, "arguments": function.arguments},
                        }],
                    }),
                    MessageContent::ToolResult { tool_call_id, content } => json!({
                        "role": "tool",
                        "tool_call_id": tool_call_id,
                        "content": content.as_text(),
                    }),
                }
            })
            .collect()
    }

    fn build_body(&self, req: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": Self::to_wire_messages(&req.messages),
            "stream": req.stream,
        });
        if !req.tools.is_empty() {
            let tools: Vec<Value> = req
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        },
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
        }
        body
    }
}

#[async_trait]
impl ModelProvider for HttpCompatProvider {
    fn name(&self) -> &str {
        &self.driver_id
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn input_modalities(&self) -> Vec<InputModality> {
        crate::catalog::lookup(self.name(), self.model_name())
            .map(|e| e.input_modalities)
            .unwrap_or_else(|| vec![InputModality::Text])
    }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = self.build_body(&req);

        let mut rb = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            rb = rb.bearer_auth(key);
        }

        let resp = rb.send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("{} returned {status}: {text}", self.driver_id);
        }

        let value: Value = resp.json().await?;
        let choice = value
            .get("choices")
            .and_then(|c| c.get(0))
            .cloned()
            .unwrap_or(Value::Null);
        let message = choice.get("message").cloned().unwrap_or(Value::Null);
        let content = message
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let mut events = Vec::new();
        if !content.is_empty() {
            events.push(Ok(ResponseEvent::TextDelta(content)));
        }
        if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
            for (idx, call) in calls.iter().enumerate() {
                let id = call.get("id").and_then(Value::as_str).unwrap_or_default();
                let function = call.get("function").cloned().unwrap_or(Value::Null);
                let name = function
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let arguments = function
                    .get("arguments")
                    .and_then(Value::as_str)
                    .unwrap_or("{}");
                events.push(Ok(ResponseEvent::ToolCall {
                    index: idx,
                    id: id.to_string(),
                    name: name.to_string(),
                    arguments: arguments.to_string(),
                }));
            }
        }
        if let Some(usage) = value.get("usage") {
            events.push(Ok(ResponseEvent::Usage {
                input_tokens: usage
                    .get("prompt_tokens")
                    .and_then(Value::as_u64)
                    .unwrap_or(0) as u32,
                output_tokens: usage
                    .get("completion_tokens")
                    .and_then(Value::as_u64)
                    .unwrap_or(0) as u32,
                cache_read_tokens: 0,
                cache_write_tokens: 0,
            }));
        }
        if choice.get("finish_reason").and_then(Value::as_str) == Some("length") {
            events.push(Ok(ResponseEvent::MaxTokens));
        }
        events.push(Ok(ResponseEvent::Done));

        Ok(Box::pin(stream::iter(events)))
    }
}
