// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Episodic/semantic/procedural memory stores at `~/.osa/memory/*.jsonl`;
//! append-only, with periodic compaction left to a future pass.
//!
//! Each kind gets its own append-only JSONL file. A write never rewrites
//! history — `put` appends a new record; `get`/`search` resolve the current
//! value for a key by scanning to the last matching record, the same
//! "replay the log" model the session transcript (`~/.osa/sessions/<id>.jsonl`)
//! uses elsewhere in this runtime.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    /// A record of something that happened (an event, an observation).
    Episodic,
    /// A durable fact, keyed for recall (a preference, an identity).
    Semantic,
    /// A learned how-to (a procedure, a recipe).
    Procedural,
}

impl MemoryKind {
    fn file_name(self) -> &'static str {
        match self {
            MemoryKind::Episodic => "episodic.jsonl",
            MemoryKind::Semantic => "semantic.jsonl",
            MemoryKind::Procedural => "procedural.jsonl",
        }
    }

    fn all() -> [MemoryKind; 3] {
        [MemoryKind::Episodic, MemoryKind::Semantic, MemoryKind::Procedural]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub kind: MemoryKind,
    pub key: String,
    pub value: Value,
    pub timestamp: DateTime<Utc>,
}

/// Append-only JSONL memory store, one file per [`MemoryKind`] under `dir`.
pub struct MemoryStore {
    dir: PathBuf,
}

impl MemoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `~/.osa/memory`, the default location.
    pub fn default_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".osa")
            .join("memory")
    }

    fn path_for(&self, kind: MemoryKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    /// Append a new record for `key` under `kind`. Does not deduplicate —
    /// the log is append-only; the newest record for a key wins on replay.
    pub fn put(&self, kind: MemoryKind, key: &str, value: Value) -> anyhow::Result<MemoryRecord> {
        let record = MemoryRecord {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            key: key.to_string(),
            value,
            timestamp: Utc::now(),
        };
        self.append(kind, &record)?;
        Ok(record)
    }

    fn append(&self, kind: MemoryKind, record: &MemoryRecord) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(kind);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        let line = serde_json::to_string(record)?;
        writeln!(file, "{line}")?;
        file.flush()?;
        Ok(())
    }

    /// Read every record for `kind`, in append order. A corrupt line is
    /// logged and skipped rather than aborting the read.
    fn read_kind(&self, kind: MemoryKind) -> Vec<MemoryRecord> {
        read_jsonl(&self.path_for(kind))
    }

    /// Most recent record whose key exactly matches `key`, across all kinds.
    pub fn get(&self, key: &str) -> Option<MemoryRecord> {
        MemoryKind::all()
            .into_iter()
            .flat_map(|k| self.read_kind(k))
            .filter(|r| r.key == key)
            .max_by_key(|r| r.timestamp)
    }

    /// Case-insensitive substring search over key and value text, across all
    /// kinds. Results are deduplicated by key, keeping the newest record,
    /// and returned newest-first.
    pub fn search(&self, query: &str) -> Vec<MemoryRecord> {
        let needle = query.to_lowercase();
        let mut by_key: std::collections::HashMap<String, MemoryRecord> =
            std::collections::HashMap::new();

        for record in MemoryKind::all().into_iter().flat_map(|k| self.read_kind(k)) {
            let haystack = format!("{} {}", record.key, record.value);
            if !haystack.to_lowercase().contains(&needle) {
                continue;
            }
            by_key
                .entry(record.key.clone())
                .and_modify(|existing| {
                    if record.timestamp > existing.timestamp {
                        *existing = record.clone();
                    }
                })
                .or_insert(record);
        }

        let mut results: Vec<MemoryRecord> = by_key.into_values().collect();
        results.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        results
    }
}

fn read_jsonl(path: &Path) -> Vec<MemoryRecord> {
    let Ok(file) = std::fs::File::open(path) else {
        return Vec::new();
    };
    let mut records = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let Ok(line) = line else { continue };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<MemoryRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(path = %path.display(), line = i, error = %e, "corrupt memory record, skipping"),
        }
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(dir.path());
        store
            .put(MemoryKind::Semantic, "favorite_color", Value::String("teal".into()))
            .unwrap();
        let record = store.get("favorite_color").unwrap();
        assert_eq!(record.value, Value::String("teal".into()));
        assert_eq!(record.kind, MemoryKind::Semantic);
    }

    #[test]
    fn get_returns_newest_record_for_a_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(dir.path());
        store.put(MemoryKind::Episodic, "last_deploy", Value::String("v1".into())).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        store.put(MemoryKind::Episodic, "last_deploy", Value::String("v2".into())).unwrap();
        let record = store.get("last_deploy").unwrap();
        assert_eq!(record.value, Value::String("v2".into()));
    }

    #[test]
    fn get_missing_key_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(dir.path());
        assert!(store.get("nope").is_none());
    }

    #[test]
    fn search_matches_key_or_value_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(dir.path());
        store
            .put(MemoryKind::Procedural, "deploy_steps", Value::String("run the Release script".into()))
            .unwrap();
        store
            .put(MemoryKind::Semantic, "timezone", Value::String("UTC".into()))
            .unwrap();

        let hits = store.search("release");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key, "deploy_steps");
    }

    #[test]
    fn search_deduplicates_by_key_keeping_newest() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(dir.path());
        store.put(MemoryKind::Episodic, "status", Value::String("building".into())).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        store.put(MemoryKind::Episodic, "status", Value::String("deployed".into())).unwrap();

        let hits = store.search("status");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].value, Value::String("deployed".into()));
    }

    #[test]
    fn corrupt_line_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(dir.path());
        store.put(MemoryKind::Semantic, "ok_key", Value::String("ok_value".into())).unwrap();
        let mut file = OpenOptions::new()
            .append(true)
            .open(dir.path().join("semantic.jsonl"))
            .unwrap();
        writeln!(file, "not json at all").unwrap();

        let record = store.get("ok_key").unwrap();
        assert_eq!(record.value, Value::String("ok_value".into()));
    }

    #[test]
    fn missing_store_dir_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(dir.path().join("does-not-exist-yet"));
        assert!(store.get("anything").is_none());
        assert!(store.search("anything").is_empty());
    }
}
