// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! HEARTBEAT.md checklist parsing and rewriting.
//!
//! The file is the stateless source of truth: there is no separate "tasks
//! already run" store. Each tick re-parses the file, runs every unchecked
//! `- [ ] ...` item, and rewrites completed ones as `- [x] ... (completed
//! <RFC3339 timestamp>)` in place. Already-checked lines are left untouched,
//! so re-parsing a file that was just rewritten is a no-op.

use chrono::{DateTime, Utc};

use crate::model::HeartbeatTask;

const UNCHECKED_PREFIX: &str = "- [ ] ";
const CHECKED_PREFIX: &str = "- [x] ";

/// Parse every checklist line (checked or not) out of `content`.
pub fn parse(content: &str) -> Vec<HeartbeatTask> {
    content
        .lines()
        .enumerate()
        .filter_map(|(idx, line)| {
            if let Some(text) = line.strip_prefix(UNCHECKED_PREFIX) {
                Some(HeartbeatTask {
                    line_index: idx,
                    text: text.to_string(),
                    completed: false,
                })
            } else if let Some(text) = line.strip_prefix(CHECKED_PREFIX) {
                Some(HeartbeatTask {
                    line_index: idx,
                    text: text.to_string(),
                    completed: true,
                })
            } else {
                None
            }
        })
        .collect()
}

/// Only the unchecked items, in file order — what a heartbeat tick executes.
pub fn pending(content: &str) -> Vec<HeartbeatTask> {
    parse(content).into_iter().filter(|t| !t.completed).collect()
}

/// Rewrite the line at `task.line_index` as checked, appending a completion
/// timestamp. Leaves every other line byte-for-byte unchanged.
pub fn mark_completed(content: &str, task: &HeartbeatTask, completed_at: DateTime<Utc>) -> String {
    let mut lines: Vec<&str> = content.lines().collect();
    if let Some(line) = lines.get(task.line_index) {
        if let Some(text) = line.strip_prefix(UNCHECKED_PREFIX) {
            let rewritten = format!(
                "{CHECKED_PREFIX}{text} (completed {})",
                completed_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
            );
            let owned = rewritten;
            return replace_line(&lines, task.line_index, &owned, content.ends_with('\n'));
        }
    }
    lines.join("\n")
}

fn replace_line(lines: &[&str], index: usize, replacement: &str, trailing_newline: bool) -> String {
    let mut out: Vec<String> = lines.iter().map(|s| s.to_string()).collect();
    out[index] = replacement.to_string();
    let mut joined = out.join("\n");
    if trailing_newline {
        joined.push('\n');
    }
    joined
}
