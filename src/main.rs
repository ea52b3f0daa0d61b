// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::io::{self, BufRead, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};
use osa_bus::{EventBus, PubSubBridge};
use osa_config::{AgentMode, Config, ModelConfig};
use osa_core::SessionRegistry;
use osa_gateway::gateway::{HealthState, SessionFactory};
use osa_memory::MemoryStore;
use osa_model::catalog::ModelCatalogEntry;
use osa_scheduler::{AgentRunner, Scheduler};

const EXIT_RUNTIME_ERROR: i32 = 1;
const EXIT_CONFIG_ERROR: i32 = 2;
const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let exit_code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "fatal error");
            eprintln!("error: {e:#}");
            EXIT_RUNTIME_ERROR
        }
    };
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    match &cli.command {
        Some(Commands::Completions { shell }) => {
            cli::print_completions(*shell);
            return Ok(0);
        }
        Some(Commands::Version) => {
            println!("osa {}", env!("CARGO_PKG_VERSION"));
            return Ok(0);
        }
        Some(Commands::Setup {
            provider,
            model,
            api_key_env,
            api_key,
            base_url,
            jwt_secret,
            force,
        }) => {
            return run_setup(provider, model, api_key_env.as_deref(), api_key.as_deref(), base_url.as_deref(), jwt_secret.as_deref(), *force);
        }
        _ => {}
    }

    let config = match osa_config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("config error: {e:#}");
            return Ok(EXIT_CONFIG_ERROR);
        }
    };

    match &cli.command {
        Some(Commands::ShowConfig) => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(0)
        }
        Some(Commands::Classify { message, channel }) => {
            let signal = osa_signal::classify(message, channel.as_deref().unwrap_or("cli"));
            println!("{}", serde_json::to_string_pretty(&signal)?);
            Ok(0)
        }
        Some(Commands::ListModels { provider, refresh, json }) => {
            list_models_cmd(&config, provider.as_deref(), *refresh, *json).await
        }
        Some(Commands::ListProviders { verbose, json }) => list_providers_cmd(*verbose, *json),
        Some(Commands::Serve { addr }) => run_serve(addr, config, &cli).await,
        None => run_chat(config, &cli).await,
        Some(Commands::Completions { .. })
        | Some(Commands::Version)
        | Some(Commands::Setup { .. }) => unreachable!("handled above"),
    }
}

// ── setup ─────────────────────────────────────────────────────────────────

fn run_setup(
    provider: &str,
    model: &str,
    api_key_env: Option<&str>,
    api_key: Option<&str>,
    base_url: Option<&str>,
    jwt_secret: Option<&str>,
    force: bool,
) -> anyhow::Result<i32> {
    if osa_model::get_driver(provider).is_none() {
        eprintln!("Unknown provider: {provider:?}. Run `osa list-providers` for the full list.");
        return Ok(EXIT_CONFIG_ERROR);
    }

    let path = osa_config::default_user_config_path();
    if path.is_file() && !force {
        eprintln!(
            "{} already exists — pass --force to overwrite",
            path.display()
        );
        return Ok(EXIT_CONFIG_ERROR);
    }

    let mut config = Config::default();
    config.model = ModelConfig {
        provider: provider.to_string(),
        name: model.to_string(),
        api_key_env: api_key_env.map(str::to_string),
        api_key: api_key.map(str::to_string),
        base_url: base_url.map(str::to_string),
        ..config.model
    };
    if let Some(secret) = jwt_secret {
        config.gateway.jwt_secret = Some(secret.to_string());
    }

    osa_config::save(&config, &path)?;
    println!("wrote {}", path.display());
    Ok(0)
}

// ── serve ─────────────────────────────────────────────────────────────────

/// Bridges the Scheduler's `agent`-type jobs and heartbeat tasks into the
/// real agent loop. Every run gets its own short-lived session, torn down
/// immediately after — the Scheduler drops its transient per-tick sessions
/// as soon as it is done with them.
struct SchedulerAgentRunner {
    sessions: Arc<SessionRegistry>,
    bus: Arc<EventBus>,
    factory: SessionFactory,
}

#[async_trait]
impl AgentRunner for SchedulerAgentRunner {
    async fn run(&self, prompt: &str) -> Result<String, String> {
        let session_id = format!("scheduler-{}", uuid::Uuid::new_v4());
        let factory = self.factory.clone();
        let session = self
            .sessions
            .get_or_create(&session_id, move || factory.build_agent())
            .await;

        let outcome = session.deliver(&self.bus, "scheduler", prompt, "scheduler").await;
        self.sessions.close(&session_id).await;

        if outcome.filtered {
            return Err("signal_filtered".to_string());
        }
        if outcome.cancelled {
            return Err("cancelled".to_string());
        }
        Ok(outcome.output)
    }
}

async fn run_serve(addr: &str, config: Config, _cli: &Cli) -> anyhow::Result<i32> {
    let addr: SocketAddr = addr.parse().context("parsing --addr")?;
    let config = Arc::new(config);

    let bus = Arc::new(EventBus::new());
    let pubsub = PubSubBridge::new();
    pubsub.attach(&bus);
    let sessions = SessionRegistry::new(Arc::clone(&bus));
    let memory = Arc::new(MemoryStore::new(MemoryStore::default_dir()));
    let health = HealthState::new();

    let machines = Arc::new(arc_swap::ArcSwap::from_pointee(config.machines.clone()));
    let factory = SessionFactory::from_config(&config, Arc::clone(&machines))?;

    let runner: Arc<dyn AgentRunner> = Arc::new(SchedulerAgentRunner {
        sessions: Arc::clone(&sessions),
        bus: Arc::clone(&bus),
        factory,
    });
    let scheduler = Arc::new(Scheduler::new(&config.scheduler, runner));
    scheduler.attach(&bus);

    let heartbeat_secs = config.scheduler.heartbeat_interval_mins.max(1) * 60;

    {
        let scheduler = Arc::clone(&scheduler);
        let health = Arc::clone(&health);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            loop {
                ticker.tick().await;
                scheduler.run_cron_tick(chrono::Utc::now()).await;
                health.record_tick(true);
            }
        });
    }
    {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(heartbeat_secs));
            loop {
                ticker.tick().await;
                scheduler.run_heartbeat_tick(chrono::Utc::now()).await;
            }
        });
    }

    // Graceful shutdown: cancel every live session before the listener
    // stops accepting connections.
    let shutdown_sessions = Arc::clone(&sessions);
    let shutdown = async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown requested, cancelling live sessions");
        shutdown_sessions.cancel_all().await;
    };

    osa_gateway::serve(addr, &config, sessions, bus, pubsub, memory, health, shutdown).await?;
    Ok(0)
}

// ── interactive / one-shot chat ──────────────────────────────────────────

async fn run_chat(config: Config, cli: &Cli) -> anyhow::Result<i32> {
    let config = Arc::new(config);
    let machines = Arc::new(arc_swap::ArcSwap::from_pointee(config.machines.clone()));
    let mut model_cfg = config.model.clone();
    if let Some(model) = &cli.model {
        model_cfg = osa_model::resolve_model_cfg(&model_cfg, model);
    }
    let mut effective = (*config).clone();
    effective.model = model_cfg;
    effective.agent.default_mode = cli.mode;

    let factory = SessionFactory::from_config(&effective, machines)?;
    let bus = Arc::new(EventBus::new());
    let sessions = SessionRegistry::new(Arc::clone(&bus));

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupted.store(true, Ordering::SeqCst);
            }
        });
    }

    if let Some(prompt) = &cli.prompt {
        let session_id = format!("cli-{}", uuid::Uuid::new_v4());
        let session = sessions
            .get_or_create(&session_id, || factory.build_agent())
            .await;
        let outcome = session.deliver(&bus, "local", prompt, "cli").await;
        if outcome.filtered {
            println!("(filtered — weight {:.2})", outcome.signal.weight);
        } else {
            println!("{}", outcome.output);
        }
        if interrupted.load(Ordering::SeqCst) {
            return Ok(EXIT_INTERRUPTED);
        }
        return Ok(0);
    }

    println!("osa — interactive chat. Ctrl-D or an empty line with Ctrl-C to exit.");
    let session_id = format!("interactive-{}", uuid::Uuid::new_v4());
    let session = sessions
        .get_or_create(&session_id, || factory.build_agent())
        .await;

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        io::stdout().flush().ok();
        let Some(line) = lines.next() else {
            break;
        };
        let line = line.context("reading stdin")?;
        if interrupted.load(Ordering::SeqCst) {
            return Ok(EXIT_INTERRUPTED);
        }
        if line.trim().is_empty() {
            continue;
        }
        let outcome = session.deliver(&bus, "local", &line, "cli").await;
        if outcome.filtered {
            println!("(filtered — weight {:.2})", outcome.signal.weight);
        } else {
            println!("{}", outcome.output);
        }
    }
    if interrupted.load(Ordering::SeqCst) {
        Ok(EXIT_INTERRUPTED)
    } else {
        Ok(0)
    }
}

// ── ops commands ──────────────────────────────────────────────────────────

async fn list_models_cmd(
    config: &Config,
    provider_filter: Option<&str>,
    refresh: bool,
    as_json: bool,
) -> anyhow::Result<i32> {
    if let Some(prov) = provider_filter {
        if osa_model::get_driver(prov).is_none() {
            eprintln!("Unknown provider: {prov:?}");
            eprintln!("\nAvailable providers (run `osa list-providers` for details):");
            for d in osa_model::list_drivers() {
                eprintln!("  {:20} {}", d.id, d.name);
            }
            return Ok(EXIT_CONFIG_ERROR);
        }
    }

    let entries: Vec<ModelCatalogEntry> = if refresh {
        let mut model_cfg = config.model.clone();
        if let Some(prov) = provider_filter {
            model_cfg.provider = prov.to_string();
        }
        let model = osa_model::from_config(&model_cfg)?;
        let mut live = model.list_models().await?;
        if let Some(prov) = provider_filter {
            live.retain(|e| e.provider == prov);
        }
        live
    } else {
        let mut all = osa_model::catalog::static_catalog();
        if let Some(prov) = provider_filter {
            all.retain(|e| e.provider == prov);
        }
        all.sort_by(|a, b| a.provider.cmp(&b.provider).then(a.id.cmp(&b.id)));
        all
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(0);
    }

    if entries.is_empty() {
        println!("No models found.");
        return Ok(0);
    }

    let id_w = entries.iter().map(|e| e.id.len()).max().unwrap_or(10).max(10);
    let prov_w = entries.iter().map(|e| e.provider.len()).max().unwrap_or(8).max(8);

    println!(
        "{:<id_w$}  {:<prov_w$}  {:>12}  {:>16}  DESCRIPTION",
        "ID", "PROVIDER", "CTX WINDOW", "MAX OUT TOKENS", id_w = id_w, prov_w = prov_w,
    );
    println!("{}", "-".repeat(id_w + prov_w + 50));
    for e in &entries {
        let ctx = if e.context_window == 0 { "  -".to_string() } else { format!("{:>12}", e.context_window) };
        let max_out = if e.max_output_tokens == 0 { "  -".to_string() } else { format!("{:>16}", e.max_output_tokens) };
        println!(
            "{:<id_w$}  {:<prov_w$}  {}  {}  {}",
            e.id, e.provider, ctx, max_out, e.description, id_w = id_w, prov_w = prov_w,
        );
    }
    println!("\nTotal: {} model(s)", entries.len());
    Ok(0)
}

fn list_providers_cmd(verbose: bool, as_json: bool) -> anyhow::Result<i32> {
    let drivers = osa_model::list_drivers();

    if as_json {
        #[derive(serde::Serialize)]
        struct ProviderJson {
            id: &'static str,
            name: &'static str,
            description: &'static str,
            default_api_key_env: Option<&'static str>,
            default_base_url: Option<&'static str>,
            requires_api_key: bool,
        }
        let rows: Vec<ProviderJson> = drivers
            .iter()
            .map(|d| ProviderJson {
                id: d.id,
                name: d.name,
                description: d.description,
                default_api_key_env: d.default_api_key_env,
                default_base_url: d.default_base_url,
                requires_api_key: d.requires_api_key,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(0);
    }

    println!("Supported Model Providers ({} total)\n", drivers.len());
    if verbose {
        for d in drivers {
            println!("  {} — {}", d.id, d.name);
            println!("    {}", d.description);
            if let Some(env) = d.default_api_key_env {
                println!("    API key env : {env}");
            }
            if let Some(url) = d.default_base_url {
                println!("    Default URL : {url}");
            }
            if !d.requires_api_key {
                println!("    Auth        : none required");
            }
            println!();
        }
    } else {
        let id_w = drivers.iter().map(|d| d.id.len()).max().unwrap_or(10).max(10);
        for d in drivers {
            println!("  {:id_w$}  {}", d.id, d.name, id_w = id_w);
        }
    }
    Ok(0)
}

// ── logging ───────────────────────────────────────────────────────────────

fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init();
}
