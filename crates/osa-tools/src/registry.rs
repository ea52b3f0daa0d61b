// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arc_swap::ArcSwap;
use osa_config::AgentMode;

use crate::hooks::HookRegistry;
use crate::{Tool, ToolCall, ToolOutput};

/// A tool schema – mirrors osa_model::ToolSchema but keeps tools crate
/// independent from the model crate.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// One registered tool plus the opaque "machine" (capability group) names
/// it belongs to. A tool with an empty group set is always enabled —
/// groups are an additive restriction, never a requirement. "Machines" are
/// an opaque filter; the registry is agnostic to what a group means.
#[derive(Clone)]
struct Entry {
    tool: Arc<dyn Tool>,
    groups: Vec<String>,
}

/// Central registry holding all available tools.
///
/// Readers (`get`/`schemas`/`list_tools_direct`/`execute_direct`) go
/// through an immutable [`ArcSwap`] snapshot so concurrent reads never
/// contend with registration — a hot-reload / lock-free dispatcher pattern.
/// `register` serializes through whatever external synchronization the
/// owning worker uses (callers typically hold the only `Arc` during
/// boot-time registration, or a `Mutex` guarding mutation for hot
/// registration).
pub struct ToolRegistry {
    snapshot: ArcSwap<HashMap<String, Entry>>,
    disabled_groups: ArcSwap<HashSet<String>>,
    pub hooks: HookRegistry,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(HashMap::new()),
            disabled_groups: ArcSwap::from_pointee(HashSet::new()),
            hooks: HookRegistry::new(),
        }
    }

    /// Register a tool with no capability-group restriction (always visible).
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_for_groups(tool, &[]);
    }

    /// Register a tool belonging to one or more named capability groups
    /// ("machines"). The tool is hidden from readers while *any* of its
    /// groups is disabled via [`Self::set_group_enabled`].
    pub fn register_for_groups(&mut self, tool: impl Tool + 'static, groups: &[&str]) {
        let mut next = (**self.snapshot.load()).clone();
        next.insert(
            tool.name().to_string(),
            Entry {
                tool: Arc::new(tool),
                groups: groups.iter().map(|g| g.to_string()).collect(),
            },
        );
        self.snapshot.store(Arc::new(next));
    }

    /// Toggle a capability group. Re-publishes the snapshot's visible set
    /// (the underlying tool map is untouched; visibility is computed at
    /// read time from `disabled_groups`).
    pub fn set_group_enabled(&self, group: impl Into<String>, enabled: bool) {
        let group = group.into();
        let mut next = (**self.disabled_groups.load()).clone();
        if enabled {
            next.remove(&group);
        } else {
            next.insert(group);
        }
        self.disabled_groups.store(Arc::new(next));
    }

    fn is_visible(&self, entry: &Entry, disabled: &HashSet<String>) -> bool {
        entry.groups.iter().all(|g| !disabled.contains(g))
    }

    /// Lookup honouring group visibility — safe to call from inside a hook
    /// or a tool that recursively invokes the registry (re-entrant: never
    /// blocks on a concurrent `register`).
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        let snapshot = self.snapshot.load();
        let disabled = self.disabled_groups.load();
        snapshot
            .get(name)
            .filter(|e| self.is_visible(e, &disabled))
            .map(|e| Arc::clone(&e.tool))
    }

    /// Produce schemas for ALL registered, group-visible tools (mode-unfiltered).
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let snapshot = self.snapshot.load();
        let disabled = self.disabled_groups.load();
        let mut schemas: Vec<ToolSchema> = snapshot
            .values()
            .filter(|e| self.is_visible(e, &disabled))
            .map(|e| ToolSchema {
                name: e.tool.name().to_string(),
                description: e.tool.description().to_string(),
                parameters: e.tool.parameters_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Produce schemas only for tools available in the given mode.
    pub fn schemas_for_mode(&self, mode: AgentMode) -> Vec<ToolSchema> {
        let snapshot = self.snapshot.load();
        let disabled = self.disabled_groups.load();
        let mut schemas: Vec<ToolSchema> = snapshot
            .values()
            .filter(|e| self.is_visible(e, &disabled) && e.tool.modes().contains(&mode))
            .map(|e| ToolSchema {
                name: e.tool.name().to_string(),
                description: e.tool.description().to_string(),
                parameters: e.tool.parameters_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Direct execution against the published snapshot, bypassing hooks.
    /// Used by [`Self::execute`] and anywhere re-entrant/unguarded dispatch
    /// is appropriate.
    pub async fn execute_direct(&self, call: &ToolCall) -> ToolOutput {
        match self.get(&call.name) {
            Some(tool) => tool.execute(call).await,
            None => ToolOutput::err(&call.id, format!("unknown tool: {}", call.name)),
        }
    }

    /// Backward-compatible alias for [`Self::execute_direct`].
    pub async fn execute(&self, call: &ToolCall) -> ToolOutput {
        self.execute_direct(call).await
    }

    /// Guarded execution: runs pre-tool hooks, then the tool, then
    /// post-tool hooks. A blocking pre-hook short-circuits the tool call
    /// entirely and its
    /// reason becomes the output — `tool_blocked_by_hook`, not retried
    /// here (the caller/LLM decides whether to retry).
    pub async fn execute_guarded(&self, call: &ToolCall) -> ToolOutput {
        if let Some(reason) = self.hooks.run_pre(call).await {
            let output = ToolOutput::err(&call.id, reason);
            self.hooks.run_post(call, &output).await;
            return output;
        }
        let output = self.execute_direct(call).await;
        self.hooks.run_post(call, &output).await;
        output
    }

    /// Tool names visible under the published (group-filtered) snapshot.
    pub fn list_tools_direct(&self) -> Vec<String> {
        self.names()
    }

    pub fn names(&self) -> Vec<String> {
        let snapshot = self.snapshot.load();
        let disabled = self.disabled_groups.load();
        let mut names: Vec<String> = snapshot
            .iter()
            .filter(|(_, e)| self.is_visible(e, &disabled))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn names_for_mode(&self, mode: AgentMode) -> Vec<String> {
        let snapshot = self.snapshot.load();
        let disabled = self.disabled_groups.load();
        let mut names: Vec<String> = snapshot
            .values()
            .filter(|e| self.is_visible(e, &disabled) && e.tool.modes().contains(&mode))
            .map(|e| e.tool.name().to_string())
            .collect();
        names.sort();
        names
    }

    /// The `output_category` lookup used by the agent's smart-truncation
    /// pass, preserved from the pre-snapshot registry.
    pub fn output_category(&self, name: &str) -> crate::OutputCategory {
        self.get(name)
            .map(|t| t.output_category())
            .unwrap_or(crate::OutputCategory::Generic)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;
    use crate::policy::ApprovalPolicy;
    use crate::tool::{Tool, ToolCall, ToolOutput};

    /// Minimal no-op tool for registry tests.
    struct EchoTool {
        name: &'static str,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object" })
        }
        fn default_policy(&self) -> ApprovalPolicy {
            ApprovalPolicy::Auto
        }
        async fn execute(&self, call: &ToolCall) -> ToolOutput {
            ToolOutput::ok(&call.id, format!("echo:{}", call.args))
        }
    }

    #[test]
    fn register_and_get() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "echo" });
        assert!(reg.get("echo").is_some());
    }

    #[test]
    fn get_unknown_returns_none() {
        let reg = ToolRegistry::new();
        assert!(reg.get("nope").is_none());
    }

    #[test]
    fn names_returns_all_registered() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "a" });
        reg.register(EchoTool { name: "b" });
        let mut names = reg.names();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn schemas_contains_registered_tool() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "my_tool" });
        let schemas = reg.schemas();
        assert!(schemas.iter().any(|s| s.name == "my_tool"));
    }

    #[test]
    fn schemas_include_description() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "t" });
        let schemas = reg.schemas();
        assert_eq!(schemas[0].description, "echoes its input");
    }

    #[tokio::test]
    async fn execute_known_tool_succeeds() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "echo" });
        let call = ToolCall { id: "1".into(), name: "echo".into(), args: json!({"x":1}) };
        let out = reg.execute(&call).await;
        assert!(!out.is_error);
        assert!(out.content.starts_with("echo:"));
    }

    #[tokio::test]
    async fn execute_unknown_tool_returns_error() {
        let reg = ToolRegistry::new();
        let call = ToolCall { id: "x".into(), name: "missing".into(), args: json!({}) };
        let out = reg.execute(&call).await;
        assert!(out.is_error);
        assert!(out.content.contains("unknown tool"));
    }

    #[test]
    fn registering_same_name_twice_overwrites() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "t" });
        reg.register(EchoTool { name: "t" });
        assert_eq!(reg.names().len(), 1);
    }

    #[test]
    fn disabling_group_hides_its_tools() {
        let mut reg = ToolRegistry::new();
        reg.register_for_groups(EchoTool { name: "risky" }, &["shell"]);
        reg.register(EchoTool { name: "safe" });
        assert_eq!(reg.names(), vec!["risky", "safe"]);

        reg.set_group_enabled("shell", false);
        assert_eq!(reg.names(), vec!["safe"]);
        assert!(reg.get("risky").is_none());

        reg.set_group_enabled("shell", true);
        assert_eq!(reg.names(), vec!["risky", "safe"]);
    }

    #[tokio::test]
    async fn execute_guarded_runs_hooks_around_the_call() {
        use crate::hooks::{HookOutcome, PreToolHook};

        struct Block;
        #[async_trait]
        impl PreToolHook for Block {
            async fn before(&self, _call: &ToolCall) -> HookOutcome {
                HookOutcome::Block("nope".into())
            }
        }

        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "echo" });
        reg.hooks.register_pre(Arc::new(Block));

        let call = ToolCall { id: "1".into(), name: "echo".into(), args: json!({}) };
        let out = reg.execute_guarded(&call).await;
        assert!(out.is_error);
        assert_eq!(out.content, "nope");
    }
}
