// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::Config;

/// Ordered list of config file locations searched from lowest to highest priority.
/// Later files override earlier ones. `~/.osa/config.json` is the canonical
/// location; the others exist so system packages and workspace-local
/// overrides layer on top of it.
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // 1. System-wide default
    paths.push(PathBuf::from("/etc/osa/config.json"));

    // 2. XDG / home — ~/.osa/config.json is the canonical user location.
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".osa/config.json"));
    }
    if let Some(cfg) = dirs::config_dir() {
        paths.push(cfg.join("osa/config.json"));
    }

    // 3. Workspace-local
    paths.push(PathBuf::from(".osa/config.json"));
    paths.push(PathBuf::from(".osa.json"));

    paths
}

/// Load configuration by merging all discovered JSON files.
/// The `extra` argument may provide an explicit path (e.g. `--config` CLI flag).
pub fn load(extra: Option<&Path>) -> anyhow::Result<Config> {
    let mut merged = serde_json::Value::Object(serde_json::Map::new());

    for path in config_search_paths() {
        if path.is_file() {
            debug!(path = %path.display(), "loading config layer");
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let layer: serde_json::Value = serde_json::from_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?;
            merge_json(&mut merged, layer);
        }
    }

    if let Some(p) = extra {
        debug!(path = %p.display(), "loading explicit config");
        let text =
            std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
        let layer: serde_json::Value =
            serde_json::from_str(&text).with_context(|| format!("parsing {}", p.display()))?;
        merge_json(&mut merged, layer);
    }

    // Deserialize the merged JSON value into Config, falling back to defaults
    // when the merged value is empty (no config files found).
    let config: Config = if matches!(merged, serde_json::Value::Object(ref m) if m.is_empty()) {
        Config::default()
    } else {
        serde_json::from_value(merged).unwrap_or_default()
    };
    Ok(config)
}

/// `~/.osa/config.json`, the canonical user config location.
/// `osa setup` writes here; `load`'s search path reads the same file back.
pub fn default_user_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".osa")
        .join("config.json")
}

/// Write `config` to `path` atomically: serialize to a temp file in the
/// same directory, then rename over the destination — the same
/// write-tmp-then-rename discipline `osa-scheduler`'s `JsonStore` uses for
/// `CRONS.json`/`TRIGGERS.json`, so a crash mid-write never corrupts an
/// existing `config.json`.
pub fn save(config: &Config, path: &Path) -> anyhow::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let tmp_path = dir.join(format!(".config.{}.tmp", uuid::Uuid::new_v4()));
    let body = serde_json::to_vec_pretty(config)?;
    std::fs::write(&tmp_path, &body)
        .with_context(|| format!("writing {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("renaming into {}", path.display()))?;
    Ok(())
}

/// Deep-merge `src` into `dst`; src wins on scalar conflicts.
fn merge_json(dst: &mut serde_json::Value, src: serde_json::Value) {
    match (dst, src) {
        (serde_json::Value::Object(d), serde_json::Value::Object(s)) => {
            for (k, v) in s {
                let entry = d
                    .entry(k)
                    .or_insert(serde_json::Value::Object(serde_json::Map::new()));
                merge_json(entry, v);
            }
        }
        (dst, src) => *dst = src,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn val(s: &str) -> serde_json::Value {
        serde_json::from_str(s).unwrap()
    }

    #[test]
    fn merge_scalar_src_wins() {
        let mut dst = val(r#"{"x": 1}"#);
        let src = val(r#"{"x": 2}"#);
        merge_json(&mut dst, src);
        assert_eq!(dst["x"].as_i64(), Some(2));
    }

    #[test]
    fn merge_preserves_keys_not_in_src() {
        let mut dst = val(r#"{"a": 1, "b": 2}"#);
        let src = val(r#"{"b": 99}"#);
        merge_json(&mut dst, src);
        assert_eq!(dst["a"].as_i64(), Some(1));
        assert_eq!(dst["b"].as_i64(), Some(99));
    }

    #[test]
    fn merge_nested_tables() {
        let mut dst = val(r#"{"model": {"provider": "openai", "name": "gpt-4o"}}"#);
        let src = val(r#"{"model": {"name": "gpt-4o-mini"}}"#);
        merge_json(&mut dst, src);
        assert_eq!(dst["model"]["provider"].as_str(), Some("openai"));
        assert_eq!(dst["model"]["name"].as_str(), Some("gpt-4o-mini"));
    }

    #[test]
    fn load_returns_error_when_explicit_path_missing() {
        let result = load(Some(Path::new("/tmp/osa_nonexistent_config_xyz.json")));
        assert!(result.is_err());
    }

    #[test]
    fn load_with_no_extra_path_returns_defaults() {
        let cfg = load(None).unwrap();
        assert_eq!(cfg.model.provider, "openai");
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut cfg = Config::default();
        cfg.model.provider = "anthropic".to_string();
        save(&cfg, &path).unwrap();

        let reloaded = load(Some(&path)).unwrap();
        assert_eq!(reloaded.model.provider, "anthropic");
    }

    #[test]
    fn default_user_config_path_ends_with_dot_osa_config_json() {
        assert!(default_user_config_path().ends_with(".osa/config.json"));
    }

    #[test]
    fn load_explicit_file_overrides_defaults() {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, r#"{{"model": {{"provider": "anthropic", "name": "test-model"}}}}"#).unwrap();
        let cfg = load(Some(f.path())).unwrap();
        assert_eq!(cfg.model.provider, "anthropic");
        assert_eq!(cfg.model.name, "test-model");
    }
}
