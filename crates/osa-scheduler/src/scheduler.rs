// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The Scheduler: cron tick, heartbeat tick, and trigger dispatch.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use reqwest::Client;
use serde_json::Value;
use tokio::process::Command;
use tracing::{info, warn};

use osa_bus::{Event, EventBus, EventType};
use osa_config::SchedulerConfig;

use crate::cron_expr::CronSchedule;
use crate::heartbeat;
use crate::model::{CronJob, JobType, OnFailure, Trigger};
use crate::runner::AgentRunner;
use crate::store::JsonStore;
use crate::template;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
const COMMAND_OUTPUT_CAP: usize = 100_000;

fn default_state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".osa")
}

fn resolve_path(configured: &Option<String>, default_name: &str) -> PathBuf {
    match configured {
        Some(p) => PathBuf::from(p),
        None => default_state_dir().join(default_name),
    }
}

/// Outcome of running one job body, independent of how it was triggered.
pub enum JobOutcome {
    Success(String),
    Failure(String),
}

pub struct Scheduler {
    crons: JsonStore<CronJob>,
    triggers: JsonStore<Trigger>,
    heartbeat_file: PathBuf,
    quiet_hours: Option<String>,
    circuit_threshold: u32,
    runner: Arc<dyn AgentRunner>,
    http: Client,
}

impl Scheduler {
    pub fn new(cfg: &SchedulerConfig, runner: Arc<dyn AgentRunner>) -> Self {
        let crons_path = resolve_path(&cfg.crons_file, "CRONS.json");
        let triggers_path = resolve_path(&cfg.triggers_file, "TRIGGERS.json");
        let heartbeat_file = resolve_path(&cfg.heartbeat_file, "HEARTBEAT.md");
        Self {
            crons: JsonStore::load(crons_path, "jobs"),
            triggers: JsonStore::load(triggers_path, "triggers"),
            heartbeat_file,
            quiet_hours: cfg.quiet_hours.clone(),
            circuit_threshold: cfg.circuit_breaker_threshold.max(1),
            runner,
            http: Client::new(),
        }
    }

    pub fn list_jobs(&self) -> Vec<CronJob> {
        self.crons.all()
    }

    pub fn list_triggers(&self) -> Vec<Trigger> {
        self.triggers.all()
    }

    pub fn add_job(&self, job: CronJob) {
        self.crons.upsert(job, |j| &j.id);
    }

    pub fn remove_job(&self, id: &str) -> bool {
        self.crons.remove(id, |j| &j.id)
    }

    pub fn add_trigger(&self, trigger: Trigger) {
        self.triggers.upsert(trigger, |t| &t.id);
    }

    pub fn remove_trigger(&self, id: &str) -> bool {
        self.triggers.remove(id, |t| &t.id)
    }

    /// Run every enabled, non-circuit-open cron job whose schedule matches
    /// `now`. Intended to be called once per minute.
    pub async fn run_cron_tick(&self, now: DateTime<Utc>) {
        for job in self.crons.all() {
            if !job.enabled || job.circuit_open {
                continue;
            }
            let schedule = match CronSchedule::parse(&job.schedule) {
                Ok(s) => s,
                Err(e) => {
                    warn!(job = %job.id, error = %e, "invalid cron schedule, skipping");
                    continue;
                }
            };
            if !schedule.matches(now) {
                continue;
            }
            info!(job = %job.id, name = %job.name, "cron tick firing");
            let outcome = self.execute(job.job_type, &job.body, job.url.as_deref()).await;
            self.record_outcome(&job.id, outcome);
        }
    }

    fn record_outcome(&self, job_id: &str, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Success(_) => {
                self.crons.update_in_place(job_id, |j| &j.id, |j| {
                    j.failure_count = 0;
                    j.circuit_open = false;
                });
            }
            JobOutcome::Failure(reason) => {
                let threshold = self.circuit_threshold;
                self.crons.update_in_place(job_id, |j| &j.id, |j| {
                    j.failure_count += 1;
                    if j.failure_count >= threshold {
                        j.circuit_open = true;
                    }
                });
                warn!(job = job_id, error = %reason, "cron job failed");
            }
        }
    }

    /// True if `now` falls inside the configured quiet-hours window. A
    /// missing config, or a window string that fails to parse, is treated
    /// as "not quiet" rather than blocking the heartbeat outright.
    pub fn is_quiet_hours(&self, now: DateTime<Utc>) -> bool {
        let Some(window) = &self.quiet_hours else {
            return false;
        };
        let Some((start, end)) = parse_quiet_window(window) else {
            warn!(window = %window, "malformed quiet_hours, treating as not quiet");
            return false;
        };
        let t = now.time();
        if start <= end {
            t >= start && t < end
        } else {
            // Window wraps midnight, e.g. "22:00-06:00".
            t >= start || t < end
        }
    }

    /// Parse HEARTBEAT.md, run every unchecked item as a synthetic agent
    /// delivery, and rewrite completed lines in place. Skipped entirely
    /// during quiet hours.
    pub async fn run_heartbeat_tick(&self, now: DateTime<Utc>) {
        if self.is_quiet_hours(now) {
            return;
        }
        let Ok(content) = std::fs::read_to_string(&self.heartbeat_file) else {
            return;
        };
        let pending = heartbeat::pending(&content);
        if pending.is_empty() {
            return;
        }
        let mut current = content;
        for task in pending {
            // Re-locate the task against the latest content: earlier
            // rewrites in this loop shift nothing (line count is preserved),
            // but re-parsing keeps this robust if that ever changes.
            let still_pending = heartbeat::pending(&current)
                .into_iter()
                .find(|t| t.line_index == task.line_index);
            let Some(task) = still_pending else { continue };

            match self.runner.run(&task.text).await {
                Ok(_) => {
                    current = heartbeat::mark_completed(&current, &task, Utc::now());
                }
                Err(e) => {
                    warn!(task = %task.text, error = %e, "heartbeat task failed, leaving unchecked");
                }
            }
        }
        if let Err(e) = std::fs::write(&self.heartbeat_file, &current) {
            warn!(path = %self.heartbeat_file.display(), error = %e, "failed to rewrite heartbeat file");
        }
    }

    /// Subscribe to `external_trigger` events on `bus`. Each matching event
    /// is handled on a spawned task so the synchronous bus dispatch is never
    /// blocked by job execution.
    pub fn attach(self: &Arc<Self>, bus: &EventBus) {
        let scheduler = Arc::clone(self);
        bus.subscribe(
            EventType::ExternalTrigger,
            Arc::new(move |event: &Event| {
                let scheduler = Arc::clone(&scheduler);
                let event = event.clone();
                tokio::spawn(async move { scheduler.handle_trigger_event(event).await });
            }),
        );
    }

    async fn handle_trigger_event(&self, event: Event) {
        let Some(trigger_id) = event.payload.get("trigger_id").and_then(|v| v.as_str()) else {
            warn!("external_trigger event missing trigger_id");
            return;
        };
        let payload = event
            .payload
            .get("payload")
            .cloned()
            .unwrap_or(Value::Null);

        let matching: Vec<Trigger> = self
            .triggers
            .all()
            .into_iter()
            .filter(|t| t.enabled && t.event == trigger_id)
            .collect();

        for trigger in matching {
            let body = template::interpolate(&trigger.body, &payload, Utc::now());
            info!(trigger = %trigger.id, "trigger dispatch firing");
            let outcome = self.execute(trigger.job_type, &body, trigger.url.as_deref()).await;
            if let (JobOutcome::Failure(reason), OnFailure::Agent) = (&outcome, trigger.on_failure) {
                let fallback_prompt = format!(
                    "A scheduled trigger named '{}' failed: {}. Decide whether any follow-up is needed.",
                    trigger.name, reason
                );
                let _ = self.runner.run(&fallback_prompt).await;
            }
        }
    }

    async fn execute(&self, job_type: JobType, body: &str, url: Option<&str>) -> JobOutcome {
        match job_type {
            JobType::Agent => match self.runner.run(body).await {
                Ok(out) => JobOutcome::Success(out),
                Err(e) => JobOutcome::Failure(e),
            },
            JobType::Command => self.execute_command(body).await,
            JobType::Webhook => self.execute_webhook(url, body).await,
        }
    }

    async fn execute_command(&self, cmdline: &str) -> JobOutcome {
        if let Err(reason) = osa_tools::shell_policy::validate(cmdline) {
            return JobOutcome::Failure(reason);
        }
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(cmdline);

        let result = tokio::time::timeout(COMMAND_TIMEOUT, cmd.output()).await;
        match result {
            Ok(Ok(output)) if output.status.success() => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                JobOutcome::Success(truncate(&stdout, COMMAND_OUTPUT_CAP))
            }
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                JobOutcome::Failure(format!(
                    "exit {}: {}",
                    output.status.code().unwrap_or(-1),
                    truncate(&stderr, COMMAND_OUTPUT_CAP)
                ))
            }
            Ok(Err(e)) => JobOutcome::Failure(format!("spawn error: {e}")),
            Err(_) => JobOutcome::Failure("command timed out after 30s".to_string()),
        }
    }

    async fn execute_webhook(&self, url: Option<&str>, body: &str) -> JobOutcome {
        let Some(raw_url) = url else {
            return JobOutcome::Failure("webhook job missing url".to_string());
        };
        let validated = match crate::webhook::validate_url(raw_url) {
            Ok(u) => u,
            Err(e) => return JobOutcome::Failure(e),
        };
        match crate::webhook::post(&self.http, &validated, body.to_string()).await {
            Ok((status, text)) if (200..300).contains(&status) => JobOutcome::Success(text),
            Ok((status, text)) => JobOutcome::Failure(format!("http {status}: {text}")),
            Err(e) => JobOutcome::Failure(e),
        }
    }
}

fn parse_quiet_window(spec: &str) -> Option<(NaiveTime, NaiveTime)> {
    let (start, end) = spec.split_once('-')?;
    let start = NaiveTime::parse_from_str(start.trim(), "%H:%M").ok()?;
    let end = NaiveTime::parse_from_str(end.trim(), "%H:%M").ok()?;
    Some((start, end))
}

fn truncate(s: &str, limit: usize) -> String {
    if s.len() <= limit {
        s.to_string()
    } else {
        format!("{}...[truncated {} bytes]", &s[..limit], s.len() - limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::StubRunner;
    use chrono::TimeZone;

    fn cfg(dir: &std::path::Path) -> SchedulerConfig {
        SchedulerConfig {
            heartbeat_interval_mins: 30,
            heartbeat_file: Some(dir.join("HEARTBEAT.md").to_string_lossy().to_string()),
            crons_file: Some(dir.join("CRONS.json").to_string_lossy().to_string()),
            triggers_file: Some(dir.join("TRIGGERS.json").to_string_lossy().to_string()),
            quiet_hours: None,
            circuit_breaker_threshold: 3,
        }
    }

    fn ok_runner() -> Arc<dyn AgentRunner> {
        Arc::new(StubRunner { response: Ok("done".to_string()) })
    }

    #[tokio::test]
    async fn scenario_cron_success_keeps_circuit_closed() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = Scheduler::new(&cfg(dir.path()), ok_runner());
        scheduler.add_job(CronJob {
            id: "j1".into(),
            name: "echo hi".into(),
            schedule: "*/5 * * * *".into(),
            job_type: JobType::Command,
            body: "echo hi".into(),
            url: None,
            enabled: true,
            on_failure: OnFailure::Ignore,
            failure_count: 0,
            circuit_open: false,
        });

        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 5, 0).unwrap();
        scheduler.run_cron_tick(at).await;

        let job = scheduler.list_jobs().into_iter().find(|j| j.id == "j1").unwrap();
        assert_eq!(job.failure_count, 0);
        assert!(!job.circuit_open);
    }

    #[tokio::test]
    async fn scenario_cron_circuit_opens_after_threshold_failures_and_then_skips() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = Scheduler::new(&cfg(dir.path()), ok_runner());
        scheduler.add_job(CronJob {
            id: "j1".into(),
            name: "always fails".into(),
            schedule: "*/5 * * * *".into(),
            job_type: JobType::Command,
            body: "exit 1".into(),
            url: None,
            enabled: true,
            on_failure: OnFailure::Ignore,
            failure_count: 0,
            circuit_open: false,
        });

        for minute in [5, 10, 15] {
            let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, minute, 0).unwrap();
            scheduler.run_cron_tick(at).await;
        }
        let job = scheduler.list_jobs().into_iter().find(|j| j.id == "j1").unwrap();
        assert_eq!(job.failure_count, 3);
        assert!(job.circuit_open);

        // A 4th tick must not attempt execution at all; failure_count stays put.
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 20, 0).unwrap();
        scheduler.run_cron_tick(at).await;
        let job = scheduler.list_jobs().into_iter().find(|j| j.id == "j1").unwrap();
        assert_eq!(job.failure_count, 3);
        assert!(job.circuit_open);
    }

    #[tokio::test]
    async fn scenario_shell_policy_blocks_destructive_command_job() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = Scheduler::new(&cfg(dir.path()), ok_runner());
        scheduler.add_job(CronJob {
            id: "j1".into(),
            name: "dangerous".into(),
            schedule: "* * * * *".into(),
            job_type: JobType::Command,
            body: "git push --force".into(),
            url: None,
            enabled: true,
            on_failure: OnFailure::Ignore,
            failure_count: 0,
            circuit_open: false,
        });
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        scheduler.run_cron_tick(at).await;
        let job = scheduler.list_jobs().into_iter().find(|j| j.id == "j1").unwrap();
        assert_eq!(job.failure_count, 1);
    }

    #[tokio::test]
    async fn scenario_heartbeat_completes_and_rewrites_checklist() {
        let dir = tempfile::tempdir().unwrap();
        let heartbeat_path = dir.path().join("HEARTBEAT.md");
        std::fs::write(&heartbeat_path, "- [ ] ping server\n").unwrap();
        let scheduler = Scheduler::new(&cfg(dir.path()), ok_runner());

        scheduler.run_heartbeat_tick(Utc::now()).await;

        let rewritten = std::fs::read_to_string(&heartbeat_path).unwrap();
        assert!(rewritten.starts_with("- [x] ping server (completed"));
    }

    #[tokio::test]
    async fn heartbeat_skipped_during_quiet_hours() {
        let dir = tempfile::tempdir().unwrap();
        let heartbeat_path = dir.path().join("HEARTBEAT.md");
        std::fs::write(&heartbeat_path, "- [ ] ping server\n").unwrap();
        let mut config = cfg(dir.path());
        config.quiet_hours = Some("00:00-23:59".to_string());
        let scheduler = Scheduler::new(&config, ok_runner());

        let noon = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        scheduler.run_heartbeat_tick(noon).await;

        let untouched = std::fs::read_to_string(&heartbeat_path).unwrap();
        assert_eq!(untouched, "- [ ] ping server\n");
    }

    #[test]
    fn malformed_quiet_hours_is_treated_as_not_quiet() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = cfg(dir.path());
        config.quiet_hours = Some("not-a-window".to_string());
        let scheduler = Scheduler::new(&config, ok_runner());
        assert!(!scheduler.is_quiet_hours(Utc::now()));
    }

    #[test]
    fn quiet_hours_window_wraps_midnight() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = cfg(dir.path());
        config.quiet_hours = Some("22:00-06:00".to_string());
        let scheduler = Scheduler::new(&config, ok_runner());
        assert!(scheduler.is_quiet_hours(Utc.with_ymd_and_hms(2026, 3, 1, 23, 0, 0).unwrap()));
        assert!(scheduler.is_quiet_hours(Utc.with_ymd_and_hms(2026, 3, 1, 2, 0, 0).unwrap()));
        assert!(!scheduler.is_quiet_hours(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()));
    }

    #[tokio::test]
    async fn disabled_job_never_fires() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = Scheduler::new(&cfg(dir.path()), ok_runner());
        scheduler.add_job(CronJob {
            id: "j1".into(),
            name: "disabled".into(),
            schedule: "* * * * *".into(),
            job_type: JobType::Command,
            body: "exit 1".into(),
            url: None,
            enabled: false,
            on_failure: OnFailure::Ignore,
            failure_count: 0,
            circuit_open: false,
        });
        scheduler.run_cron_tick(Utc::now()).await;
        let job = scheduler.list_jobs().into_iter().find(|j| j.id == "j1").unwrap();
        assert_eq!(job.failure_count, 0);
    }
}
