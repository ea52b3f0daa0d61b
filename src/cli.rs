// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! CLI surface: interactive chat (default, no subcommand), `serve`
//! (headless HTTP facade + scheduler), `setup` (non-interactive config
//! bootstrap), `version`. A handful of read-only ops commands
//! (`list-models`, `list-providers`, `show-config`, `classify`,
//! `completions`) round out the ambient tooling a real multi-provider CLI
//! needs.

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use osa_config::AgentMode;

#[derive(Parser, Debug)]
#[command(
    name = "osa",
    about = "OSA — a long-running personal agent runtime",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// One-shot prompt. With a subcommand omitted, running `osa "text"`
    /// sends a single message through the agent loop and exits instead of
    /// opening the interactive chat.
    #[arg(value_name = "PROMPT")]
    pub prompt: Option<String>,

    /// Agent mode (research / plan / agent).
    #[arg(long, short = 'm', value_enum, default_value = "agent")]
    pub mode: AgentMode,

    /// Model override, e.g. "gpt-4o" or "anthropic/claude-opus-4-5".
    #[arg(long, short = 'M', env = "OSA_MODEL")]
    pub model: Option<String>,

    /// Path to config file (overrides auto-discovery).
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace).
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run headless: bind the HTTP facade and start the scheduler.
    /// Exits only on SIGINT/SIGTERM or a fatal startup error.
    Serve {
        /// Address to bind the HTTP facade to.
        #[arg(long, default_value = "127.0.0.1:8787")]
        addr: String,
    },

    /// Non-interactive config bootstrap: writes a valid `~/.osa/config.json`
    /// without hand-editing JSON. Not an interactive onboarding wizard —
    /// every value comes from flags.
    Setup {
        /// Provider id (run `osa list-providers` for the full list).
        #[arg(long)]
        provider: String,
        /// Default model name for this provider.
        #[arg(long)]
        model: String,
        /// Environment variable holding the API key (preferred over
        /// embedding a literal key in config.json).
        #[arg(long)]
        api_key_env: Option<String>,
        /// Literal API key. Prefer --api-key-env in checked-in configs.
        #[arg(long)]
        api_key: Option<String>,
        /// Base URL override (local proxies, self-hosted gateways, ollama…).
        #[arg(long)]
        base_url: Option<String>,
        /// HS256 JWT secret for the gateway. Falls back to $OSA_JWT_SECRET
        /// at `serve` time if omitted here.
        #[arg(long)]
        jwt_secret: Option<String>,
        /// Overwrite an existing config.json instead of failing.
        #[arg(long)]
        force: bool,
    },

    /// Print version information and exit.
    Version,

    /// Generate a shell completion script.
    #[command(hide = true)]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Print the effective (merged) configuration and exit.
    ShowConfig,

    /// Classify a message through the Signal Classifier without running
    /// the agent loop (mirrors `POST /api/v1/classify`).
    Classify {
        message: String,
        #[arg(long)]
        channel: Option<String>,
    },

    /// List available models for the configured provider(s).
    ListModels {
        /// Filter by provider id (e.g. "openai", "anthropic", "groq").
        #[arg(long, short = 'p')]
        provider: Option<String>,
        /// Query the provider API for the live list instead of the static
        /// catalog.
        #[arg(long)]
        refresh: bool,
        /// Output as JSON instead of a formatted table.
        #[arg(long)]
        json: bool,
    },

    /// List all supported model providers.
    ListProviders {
        #[arg(long, short = 'v')]
        verbose: bool,
        #[arg(long)]
        json: bool,
    },
}

pub fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "osa", &mut std::io::stdout());
}
