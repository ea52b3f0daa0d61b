// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::policy::ApprovalPolicy;
use crate::tool::{OutputCategory, Tool, ToolCall, ToolOutput};

const READ_LIMIT: usize = 200_000;

/// Built-in tool for file-system read/write operations.
pub struct FsTool;

#[async_trait]
impl Tool for FsTool {
    fn name(&self) -> &str { "fs" }

    fn description(&self) -> &str {
        "Read, write, or list files. Operations: read, write, append, list."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["read", "write", "append", "list"],
                    "description": "File system operation"
                },
                "path": {
                    "type": "string",
                    "description": "File or directory path"
                },
                "text": {
                    "type": "string",
                    "description": "Text content to write (required for write/append - set as empty for others)"
                }
            },
            "required": ["operation", "path", "text"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy { ApprovalPolicy::Auto }
    fn output_category(&self) -> OutputCategory { OutputCategory::FileContent }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let op = match call.args.get("operation").and_then(|v| v.as_str()) {
            Some(o) => o.to_string(),
            None => return ToolOutput::err(&call.id, "missing 'operation'"),
        };
        let path = match call.args.get("path").and_then(|v| v.as_str()) {
            Some(p) => p.to_string(),
            None => return ToolOutput::err(&call.id, "missing 'path'"),
        };

        debug!(op = %op, path = %path, "fs tool");

        match op.as_str() {
            "read" => {
                match tokio::fs::read(&path).await {
                    Ok(bytes) => {
                        let text = String::from_utf8_lossy(&bytes);
                        let content = if text.len() > READ_LIMIT {
                            format!("{}...[truncated]", &text[..READ_LIMIT])
                        } else {
                            text.to_string()
                        };
                        ToolOutput::ok(&call.id, content)
                    }
                    Err(e) => ToolOutput::err(&call.id, format!("read error: {e}")),
                }
            }
            "write" => {
                let content = match call.args.get("content").and_then(|v| v.as_str()) {
                    Some(c) => c,
                    None => return ToolOutput::err(
                        &call.id,
                        "write requires a 'content' field but it is missing. \
                         This usually means the JSON was truncated because the content was too \
                         large to fit in a single generation.",
                    ),
                };
                let truncated = call.args.get("__truncated").and_then(|v| v.as_bool()).unwrap_or(false);
                // Create parent directories if needed
                if let Some(parent) = std::path::Path::new(&path).parent() {
                    if !parent.as_os_str().is_empty() {
                        let _ = tokio::fs::create_dir_all(parent).await;
                    }
                }
                match tokio::fs::write(&path, content).await {
                    Ok(_) if truncated => ToolOutput::ok(
                        &call.id,
                        format!(
                            "Partial write: wrote {} bytes to {path}. \
                             The output was cut off by the token limit — this is not the complete \
                             content. Use the `append` operation to add the remaining content.",
                            content.len()
                        ),
                    ),
                    Ok(_) => ToolOutput::ok(&call.id, format!("wrote {} bytes to {path}", content.len())),
                    Err(e) => ToolOutput::err(&call.id, format!("write error: {e}")),
                }
            }
            "append" => {
                use tokio::io::AsyncWriteExt;
                let content = match call.args.get("content").and_then(|v| v.as_str()) {
                    Some(c) => c,
                    None => return ToolOutput::err(
                        &call.id,
                        "append requires a 'content' field but it is missing. \
                         This usually means the JSON was truncated because the content was too \
                         large to fit in a single generation.",
                    ),
                };
                let truncated = call.args.get("__truncated").and_then(|v| v.as_bool()).unwrap_or(false);
                match tokio::fs::OpenOptions::new().append(true).create(true).open(&path).await {
                    Ok(mut f) => match f.write_all(content.as_bytes()).await {
                        Ok(_) if truncated => ToolOutput::ok(
                            &call.id,
                            format!(
                                "Partial append: wrote {} bytes to {path}. \
                                 The output was cut off by the token limit. \
                                 Use another `append` call to add the remaining content.",
                                content.len()
                            ),
                        ),
                        Ok(_) => ToolOutput::ok(&call.id, format!("appended {} bytes to {path}", content.len())),
                        Err(e) => ToolOutput::err(&call.id, format!("write error: {e}")),
                    },
                    Err(e) => ToolOutput::err(&call.id, format!("open error: {e}")),
                }
            }
            "list" => {
                match tokio::fs::read_dir(&path).await {
                    Ok(mut rd) => {
                        let mut entries = Vec::new();
                        while let Ok(Some(entry)) = rd.next_entry().await {
                            let name = entry.file_name().to_string_lossy().to_string();
                            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
                            entries.push(if is_dir { format!("{name}/") } else { name });
                        }
                        entries.sort();
                        ToolOutput::ok(&call.id, entries.join("\n"))
                    }
                    Err(e) => ToolOutput::err(&call.id, format!("list error: {e}")),
                }
            }
            other => ToolOutput::err(&call.id, format!("unknown operation: {other}")),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
