// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Persisted job/trigger types for the scheduler.

use serde::{Deserialize, Serialize};

/// What kind of work a cron job or trigger performs when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Agent,
    Command,
    Webhook,
}

/// What to do when a trigger's job execution fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnFailure {
    Agent,
    Ignore,
}

fn default_on_failure() -> OnFailure {
    OnFailure::Ignore
}

fn default_true() -> bool {
    true
}

/// A recurring cron-scheduled job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronJob {
    pub id: String,
    pub name: String,
    /// 5-field cron expression: `minute hour dom month dow`.
    pub schedule: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    /// Prompt text for `agent` jobs, shell command line for `command` jobs,
    /// or request body template for `webhook` jobs.
    pub body: String,
    /// Destination URL, required for `webhook` jobs only.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_on_failure")]
    pub on_failure: OnFailure,

    /// Consecutive failure count. Resets to 0 on any success.
    #[serde(default)]
    pub failure_count: u32,
    /// True once `failure_count` has reached the configured threshold;
    /// ticks are skipped while the circuit is open.
    #[serde(default)]
    pub circuit_open: bool,
}

/// An event-driven job fired by `external_trigger` events on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub id: String,
    pub name: String,
    /// The `trigger_id` this trigger matches against incoming events.
    pub event: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    /// Template body, interpolated with `{{payload}}` / `{{timestamp}}` /
    /// `{{payload.<key>}}` before execution.
    pub body: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_on_failure")]
    pub on_failure: OnFailure,
}

/// A single `- [ ] ...` / `- [x] ...` line parsed out of HEARTBEAT.md.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatTask {
    pub line_index: usize,
    pub text: String,
    pub completed: bool,
}
