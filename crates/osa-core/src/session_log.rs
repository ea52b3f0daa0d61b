// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Append-only per-session transcript log at `~/.osa/sessions/<id>.jsonl`.
//!
//! One file per session, one [`TurnRecord`] per line, written in the same
//! "open in append mode, serialize, newline" style as
//! `osa_memory::MemoryStore`. The log is a write-only audit trail — nothing
//! in this crate reads it back; it exists so an operator (or a future
//! replay tool) can reconstruct what a session said and did without
//! depending on the in-memory `Session` surviving a restart.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::session::TurnRecord;

/// Appends [`TurnRecord`]s for one session to `~/.osa/sessions/<id>.jsonl`.
pub struct SessionLog {
    path: PathBuf,
}

impl SessionLog {
    pub fn new(session_id: &str) -> Self {
        Self::at(Self::default_dir().join(format!("{session_id}.jsonl")))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.osa/sessions`, the default location.
    pub fn default_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".osa")
            .join("sessions")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one turn. Failures are logged, not propagated — a session
    /// transcript write must never fail the turn it is recording.
    pub fn append(&self, role: &str, content: &str) {
        let record = TurnRecord {
            id: Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now(),
            role: role.to_string(),
            content: content.to_string(),
        };
        if let Err(e) = self.append_record(&record) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to append session log record");
        }
    }

    fn append_record(&self, record: &TurnRecord) -> anyhow::Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let line = serde_json::to_string(record)?;
        writeln!(file, "{line}")?;
        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_writes_one_jsonl_line_per_call() {
        let dir = tempfile::tempdir().unwrap();
        let log = SessionLog::at(dir.path().join("s1.jsonl"));
        log.append("user", "hello");
        log.append("assistant", "hi there");

        let content = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: TurnRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.role, "user");
        assert_eq!(first.content, "hello");
    }

    #[test]
    fn default_dir_is_under_home_dot_osa_sessions() {
        let dir = SessionLog::default_dir();
        assert!(dir.ends_with(".osa/sessions"));
    }

    #[test]
    fn missing_parent_directory_is_created_on_first_append() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested").join("s2.jsonl");
        let log = SessionLog::at(&nested);
        log.append("user", "hi");
        assert!(nested.exists());
    }
}
