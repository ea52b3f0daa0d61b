// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Atomic JSON-backed storage for cron jobs and triggers.
//!
//! Writes go to a sibling temp file and are renamed into place, so a crash
//! mid-write never corrupts the previous file. A malformed file on load is
//! logged and treated as empty rather than propagated as a hard error.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use tracing::warn;
use uuid::Uuid;

/// Write `value` to `path` atomically: serialize to a temp file in the same
/// directory, then rename over the destination.
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let tmp_path = dir.join(format!(".{}.{}.tmp", file_stem(path), Uuid::new_v4()));
    let body = serde_json::to_vec_pretty(value)?;
    std::fs::write(&tmp_path, &body)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

fn file_stem(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "store".to_string())
}

/// Load a JSON object `{ <root_key>: [...] }` of `T` from `path`. Missing
/// file, a missing key, or malformed JSON all log (the latter two) and
/// yield an empty vec rather than erroring, per the "keep the in-memory set
/// unchanged" persistence rule — e.g. `{"jobs": [...]}` for `CRONS.json`,
/// `{"triggers": [...]}` for `TRIGGERS.json`.
fn load_json<T: DeserializeOwned>(path: &Path, root_key: &str) -> Vec<T> {
    match std::fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(mut map)) => match map.remove(root_key) {
                Some(items) => match serde_json::from_value(items) {
                    Ok(items) => items,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "malformed scheduler store, ignoring");
                        Vec::new()
                    }
                },
                None => {
                    warn!(path = %path.display(), root_key, "scheduler store missing expected key, ignoring");
                    Vec::new()
                }
            },
            Ok(_) => {
                warn!(path = %path.display(), "scheduler store is not a JSON object, ignoring");
                Vec::new()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "malformed scheduler store, ignoring");
                Vec::new()
            }
        },
        Err(_) => Vec::new(),
    }
}

/// In-memory set of `T` (keyed by `id`) mirrored to a JSON file on disk as
/// `{ <root_key>: [...] }` — e.g. `root_key = "jobs"` for `CRONS.json`,
/// `root_key = "triggers"` for `TRIGGERS.json`.
pub struct JsonStore<T> {
    path: PathBuf,
    root_key: &'static str,
    items: RwLock<Vec<T>>,
}

impl<T> JsonStore<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    pub fn load(path: PathBuf, root_key: &'static str) -> Self {
        let items = load_json(&path, root_key);
        Self {
            path,
            root_key,
            items: RwLock::new(items),
        }
    }

    pub fn all(&self) -> Vec<T> {
        self.items.read().expect("store lock poisoned").clone()
    }

    fn persist(&self, items: &[T]) {
        let body = match serde_json::to_value(items) {
            Ok(v) => v,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to serialize scheduler store");
                return;
            }
        };
        let mut envelope = Map::new();
        envelope.insert(self.root_key.to_string(), body);
        if let Err(e) = atomic_write_json(&self.path, &Value::Object(envelope)) {
            warn!(path = %self.path.display(), error = %e, "failed to persist scheduler store");
        }
    }

    pub fn upsert(&self, item: T, id_of: impl Fn(&T) -> &str) {
        let mut guard = self.items.write().expect("store lock poisoned");
        let id = id_of(&item).to_string();
        if let Some(existing) = guard.iter_mut().find(|i| id_of(i) == id) {
            *existing = item;
        } else {
            guard.push(item);
        }
        self.persist(&guard);
    }

    pub fn remove(&self, id: &str, id_of: impl Fn(&T) -> &str) -> bool {
        let mut guard = self.items.write().expect("store lock poisoned");
        let before = guard.len();
        guard.retain(|i| id_of(i) != id);
        let removed = guard.len() != before;
        if removed {
            self.persist(&guard);
        }
        removed
    }

    /// Mutate the item matching `id` in place and persist the result.
    /// Returns false if no item matched.
    pub fn update_in_place(
        &self,
        id: &str,
        id_of: impl Fn(&T) -> &str,
        mutate: impl FnOnce(&mut T),
    ) -> bool {
        let mut guard = self.items.write().expect("store lock poisoned");
        let Some(item) = guard.iter_mut().find(|i| id_of(i) == id) else {
            return false;
        };
        mutate(item);
        self.persist(&guard);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Item {
        id: String,
        value: u32,
    }

    #[test]
    fn atomic_write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let items = vec![Item { id: "a".into(), value: 1 }];
        atomic_write_json(&path, &json!({ "items": items })).unwrap();
        let loaded: Vec<Item> = load_json(&path, "items");
        assert_eq!(loaded, items);
    }

    #[test]
    fn load_wraps_items_in_keyed_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let content = std::fs::read_to_string(&path);
        assert!(content.is_err());
        let store: JsonStore<Item> = JsonStore::load(path.clone(), "items");
        store.upsert(Item { id: "a".into(), value: 1 }, |i| &i.id);
        let raw = std::fs::read_to_string(&path).unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert!(value.get("items").is_some());
        assert_eq!(value.as_object().unwrap().len(), 1);
    }

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let store: JsonStore<Item> = JsonStore::load(path, "items");
        assert!(store.all().is_empty());
    }

    #[test]
    fn malformed_file_loads_as_empty_and_logs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "not json").unwrap();
        let store: JsonStore<Item> = JsonStore::load(path, "items");
        assert!(store.all().is_empty());
    }

    #[test]
    fn missing_key_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wrong_key.json");
        atomic_write_json(&path, &json!({ "other": [] })).unwrap();
        let store: JsonStore<Item> = JsonStore::load(path, "items");
        assert!(store.all().is_empty());
    }

    #[test]
    fn upsert_inserts_then_updates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store: JsonStore<Item> = JsonStore::load(path.clone(), "items");
        store.upsert(Item { id: "a".into(), value: 1 }, |i| &i.id);
        store.upsert(Item { id: "a".into(), value: 2 }, |i| &i.id);
        assert_eq!(store.all(), vec![Item { id: "a".into(), value: 2 }]);

        let reloaded: JsonStore<Item> = JsonStore::load(path, "items");
        assert_eq!(reloaded.all(), vec![Item { id: "a".into(), value: 2 }]);
    }

    #[test]
    fn remove_deletes_matching_item() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store: JsonStore<Item> = JsonStore::load(path, "items");
        store.upsert(Item { id: "a".into(), value: 1 }, |i| &i.id);
        assert!(store.remove("a", |i| &i.id));
        assert!(store.all().is_empty());
        assert!(!store.remove("a", |i| &i.id));
    }

    #[test]
    fn update_in_place_mutates_matching_item_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store: JsonStore<Item> = JsonStore::load(path, "items");
        store.upsert(Item { id: "a".into(), value: 1 }, |i| &i.id);
        store.upsert(Item { id: "b".into(), value: 1 }, |i| &i.id);
        let found = store.update_in_place("a", |i| &i.id, |i| i.value = 99);
        assert!(found);
        let items = store.all();
        assert_eq!(items.iter().find(|i| i.id == "a").unwrap().value, 99);
        assert_eq!(items.iter().find(|i| i.id == "b").unwrap().value, 1);
    }

    #[test]
    fn crash_between_write_and_rename_leaves_previous_file_intact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let original = vec![Item { id: "a".into(), value: 1 }];
        atomic_write_json(&path, &json!({ "items": original })).unwrap();

        // Simulate a crash: write the temp file but never rename it.
        let tmp_path = dir.path().join(".store.json.deadbeef.tmp");
        std::fs::write(&tmp_path, b"garbage").unwrap();

        let loaded: Vec<Item> = load_json(&path, "items");
        assert_eq!(loaded, original);
    }
}
