// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
pub mod catalog;
pub mod fallback;
pub mod http_provider;
pub mod registry;
pub mod response;
mod types;
mod provider;
mod mock;

pub use catalog::{ModelCatalogEntry, InputModality};
pub use types::*;
pub use provider::ModelProvider;
pub use http_provider::HttpCompatProvider;
pub use mock::{MockProvider, ScriptedMockProvider};
pub use registry::{DriverMeta, get_driver, list_drivers};
pub use fallback::{ChatOpts, ProviderRegistry};
pub use response::{CanonicalResponse, ToolCallRequest, drain_stream};

use osa_config::ModelConfig;

/// Construct a boxed [`ModelProvider`] from configuration.
///
/// Selects the driver by `cfg.provider`. Every driver except `mock` is built
/// from the same [`HttpCompatProvider`] — provider-specific wire formats are
/// not modeled here, only the canonical `{content, tool_calls}` shape this
/// crate exposes to callers. Run `osa list-providers` to see all ids.
pub fn from_config(cfg: &ModelConfig) -> anyhow::Result<Box<dyn ModelProvider>> {
    if cfg.provider == "mock" {
        return Ok(Box::new(MockProvider));
    }

    let Some(meta) = registry::get_driver(&cfg.provider) else {
        let known: Vec<&str> = registry::known_driver_ids().collect();
        anyhow::bail!(
            "unknown model provider '{}'. Run `osa list-providers` to see recognised \
             providers. Known providers: {}",
            cfg.provider,
            known.join(", "),
        );
    };

    let base_url = cfg
        .base_url
        .clone()
        .or_else(|| meta.default_base_url.map(String::from))
        .ok_or_else(|| {
            anyhow::anyhow!(
                "provider '{}' requires an explicit base_url in config",
                cfg.provider
            )
        })?;

    let api_key = resolve_api_key(cfg);
    if meta.requires_api_key && api_key.is_none() {
        anyhow::bail!(
            "provider '{}' requires an API key (set model.api_key or ${})",
            cfg.provider,
            meta.default_api_key_env.unwrap_or("<env var>"),
        );
    }

    Ok(Box::new(HttpCompatProvider::new(
        cfg.provider.clone(),
        cfg.name.clone(),
        base_url,
        api_key,
    )))
}

fn resolve_api_key(cfg: &ModelConfig) -> Option<String> {
    if let Some(k) = &cfg.api_key {
        return Some(k.clone());
    }
    if let Some(env) = &cfg.api_key_env {
        return std::env::var(env).ok();
    }
    if let Some(meta) = registry::get_driver(&cfg.provider) {
        if let Some(env_var) = meta.default_api_key_env {
            return std::env::var(env_var).ok();
        }
    }
    None
}

// ── Model-config resolution ───────────────────────────────────────────────────

/// Build a [`ModelConfig`] by applying `override_str` on top of `base`.
///
/// The override string may be:
/// - `"provider/model"` → sets both provider and model (e.g. `"anthropic/claude-opus-4-5"`)
/// - bare registered provider id (e.g. `"groq"`, `"ollama"`) → changes provider, keeps model name
/// - bare model name (no `/`, not a known provider id) → changes model name, keeps provider
///
/// When the provider changes, inherited `api_key` / `api_key_env` fields are
/// cleared so the correct credential env-var for the new provider is looked up.
pub fn resolve_model_cfg(base: &ModelConfig, override_str: &str) -> ModelConfig {
    let mut cfg = base.clone();
    let provider_changed;
    if let Some((provider, model)) = override_str.split_once('/') {
        provider_changed = provider != base.provider;
        cfg.provider = provider.to_string();
        cfg.name = model.to_string();
    } else if get_driver(override_str).is_some() {
        provider_changed = override_str != base.provider;
        cfg.provider = override_str.to_string();
    } else {
        cfg.name = override_str.to_string();
        provider_changed = false;
    }
    if provider_changed {
        cfg.api_key = None;
        cfg.api_key_env = None;
    }
    cfg
}

/// Resolve a [`ModelConfig`] using `override_str`, checking
/// `config.providers` for named custom providers first, then falling back to
/// catalog lookup and finally [`resolve_model_cfg`].
pub fn resolve_model_from_config(config: &osa_config::Config, override_str: &str) -> ModelConfig {
    let (provider_key, model_suffix) = if let Some((p, m)) = override_str.split_once('/') {
        (p, Some(m))
    } else {
        (override_str, None)
    };

    if let Some(named) = config.providers.get(provider_key) {
        let mut cfg = named.clone();
        if let Some(model) = model_suffix {
            cfg.name = model.to_string();
        }
        return cfg;
    }

    let catalog_entry = if let Some(model_name) = model_suffix {
        if get_driver(provider_key).is_some() {
            catalog::lookup(provider_key, model_name)
        } else {
            None
        }
    } else if get_driver(override_str).is_none() {
        catalog::lookup_by_model_name(override_str)
    } else {
        None
    };

    if let Some(entry) = catalog_entry {
        let mut cfg = ModelConfig {
            provider: entry.provider.clone(),
            name: entry.id.clone(),
            ..ModelConfig::default()
        };
        if cfg.provider == config.model.provider {
            cfg.api_key = config.model.api_key.clone();
            cfg.api_key_env = config.model.api_key_env.clone();
        }
        return cfg;
    }

    resolve_model_cfg(&config.model, override_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use osa_config::ModelConfig;

    fn minimal_config(provider: &str, model: &str) -> ModelConfig {
        ModelConfig {
            provider: provider.into(),
            name: model.into(),
            ..ModelConfig::default()
        }
    }

    #[test]
    fn from_config_mock_succeeds() {
        let cfg = minimal_config("mock", "mock-model");
        assert!(from_config(&cfg).is_ok());
    }

    #[test]
    fn from_config_openai_succeeds_with_key() {
        let cfg = ModelConfig {
            api_key: Some("sk-test".into()),
            ..minimal_config("openai", "gpt-4o")
        };
        assert!(from_config(&cfg).is_ok());
    }

    #[test]
    fn from_config_missing_api_key_is_error() {
        let cfg = minimal_config("openai", "gpt-4o");
        let err = from_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("requires an API key"));
    }

    #[test]
    fn from_config_ollama_requires_no_key() {
        let cfg = minimal_config("ollama", "llama3.2");
        assert!(from_config(&cfg).is_ok());
    }

    #[test]
    fn from_config_unknown_provider_returns_error() {
        let cfg = minimal_config("totally_unknown_provider_xyz", "some-model");
        let result = from_config(&cfg);
        assert!(result.is_err());
        let msg = result.err().unwrap().to_string();
        assert!(msg.contains("unknown model provider"));
    }

    #[test]
    fn from_config_error_message_suggests_list_providers() {
        let cfg = minimal_config("badprovider", "m");
        let msg = from_config(&cfg).err().unwrap().to_string();
        assert!(msg.contains("list-providers") || msg.contains("Known providers"));
    }

    #[test]
    fn from_config_provider_without_base_url_default_is_error() {
        let cfg = ModelConfig {
            api_key: Some("k".into()),
            ..minimal_config("litellm", "m")
        };
        let err = from_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn resolve_api_key_prefers_explicit_key() {
        let cfg = ModelConfig {
            api_key: Some("explicit-key".into()),
            api_key_env: Some("NONEXISTENT_ENV_VAR_XYZ".into()),
            ..ModelConfig::default()
        };
        let key = resolve_api_key(&cfg);
        assert_eq!(key.as_deref(), Some("explicit-key"));
    }

    // ── resolve_model_cfg ─────────────────────────────────────────────────────

    fn openai_base() -> ModelConfig {
        ModelConfig {
            provider: "openai".into(),
            name: "gpt-4o".into(),
            api_key_env: Some("OPENAI_API_KEY".into()),
            ..ModelConfig::default()
        }
    }

    #[test]
    fn resolve_slash_separated_sets_provider_and_name() {
        let cfg = resolve_model_cfg(&openai_base(), "anthropic/claude-opus-4-5");
        assert_eq!(cfg.provider, "anthropic");
        assert_eq!(cfg.name, "claude-opus-4-5");
    }

    #[test]
    fn resolve_slash_separated_clears_api_key_on_provider_change() {
        let cfg = resolve_model_cfg(&openai_base(), "anthropic/claude-opus-4-5");
        assert!(cfg.api_key_env.is_none(), "key env must be cleared when provider changes");
        assert!(cfg.api_key.is_none());
    }

    #[test]
    fn resolve_bare_model_name_keeps_provider() {
        let cfg = resolve_model_cfg(&openai_base(), "gpt-4o-mini");
        assert_eq!(cfg.provider, "openai");
        assert_eq!(cfg.name, "gpt-4o-mini");
        assert_eq!(cfg.api_key_env.as_deref(), Some("OPENAI_API_KEY"));
    }

    #[test]
    fn resolve_bare_provider_id_changes_provider_and_clears_key() {
        let cfg = resolve_model_cfg(&openai_base(), "anthropic");
        assert_eq!(cfg.provider, "anthropic");
        assert!(cfg.api_key_env.is_none());
    }

    #[test]
    fn resolve_same_provider_bare_id_keeps_key() {
        let cfg = resolve_model_cfg(&openai_base(), "openai");
        assert_eq!(cfg.provider, "openai");
        assert_eq!(cfg.api_key_env.as_deref(), Some("OPENAI_API_KEY"));
    }

    // ── resolve_model_from_config ─────────────────────────────────────────────

    fn config_with_named_provider() -> osa_config::Config {
        use std::collections::HashMap;
        let mut providers = HashMap::new();
        providers.insert(
            "my_ollama".into(),
            ModelConfig {
                provider: "openai".into(),
                base_url: Some("http://localhost:11434/v1".into()),
                name: "llama3.2".into(),
                api_key: Some("ollama".into()),
                ..ModelConfig::default()
            },
        );
        osa_config::Config {
            providers,
            ..osa_config::Config::default()
        }
    }

    #[test]
    fn resolve_from_config_named_provider_used_as_base() {
        let config = config_with_named_provider();
        let cfg = resolve_model_from_config(&config, "my_ollama");
        assert_eq!(cfg.provider, "openai");
        assert_eq!(cfg.name, "llama3.2");
        assert_eq!(cfg.base_url.as_deref(), Some("http://localhost:11434/v1"));
    }

    #[test]
    fn resolve_from_config_named_provider_with_model_override() {
        let config = config_with_named_provider();
        let cfg = resolve_model_from_config(&config, "my_ollama/codellama");
        assert_eq!(cfg.provider, "openai");
        assert_eq!(cfg.name, "codellama");
        assert_eq!(cfg.base_url.as_deref(), Some("http://localhost:11434/v1"));
    }

    #[test]
    fn resolve_from_config_falls_back_to_standard_resolution() {
        let config = config_with_named_provider();
        let cfg = resolve_model_from_config(&config, "anthropic/claude-opus-4-5");
        assert_eq!(cfg.provider, "anthropic");
        assert_eq!(cfg.name, "claude-opus-4-5");
    }

    #[test]
    fn resolve_from_config_bare_model_name_uses_config_model_as_base() {
        let config = config_with_named_provider();
        let cfg = resolve_model_from_config(&config, "gpt-4o-mini");
        assert_eq!(cfg.provider, "openai");
        assert_eq!(cfg.name, "gpt-4o-mini");
    }

    #[test]
    fn catalog_model_override_does_not_inherit_custom_base_url() {
        use std::collections::HashMap;
        let config = osa_config::Config {
            model: ModelConfig {
                provider: "openai".into(),
                name: "Qweb3-14B-Q8_0.gguf".into(),
                base_url: Some("https://my-local-llm.example.com/v1".into()),
                ..ModelConfig::default()
            },
            providers: HashMap::new(),
            ..osa_config::Config::default()
        };

        let cfg = resolve_model_from_config(&config, "gpt-4o");
        assert_eq!(cfg.provider, "openai");
        assert_eq!(cfg.name, "gpt-4o");
        assert!(cfg.base_url.is_none());
    }

    #[test]
    fn catalog_model_different_provider_clears_credentials() {
        use std::collections::HashMap;
        let config = osa_config::Config {
            model: ModelConfig {
                provider: "openai".into(),
                name: "gpt-4o".into(),
                api_key: Some("sk-openai-secret".into()),
                ..ModelConfig::default()
            },
            providers: HashMap::new(),
            ..osa_config::Config::default()
        };

        let cfg = resolve_model_from_config(&config, "claude-opus-4-6");
        assert_eq!(cfg.provider, "anthropic");
        assert_eq!(cfg.name, "claude-opus-4-6");
        assert!(cfg.api_key.is_none(), "OpenAI api_key must not leak to anthropic config");
    }
}
