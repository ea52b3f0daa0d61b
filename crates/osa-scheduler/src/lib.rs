// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Cron scheduler, heartbeat runner, and event-trigger dispatcher.
//!
//! Three independent timers share one job/trigger store:
//!
//! - a **cron tick**, driven once a minute, matching 5-field schedules
//!   against enabled, non-circuit-open [`model::CronJob`]s;
//! - a **heartbeat tick**, driven every `heartbeat_interval_mins`, executing
//!   the unchecked items in a markdown checklist file;
//! - a **trigger dispatcher**, subscribed to `external_trigger` events on
//!   the bus, matching [`model::Trigger`]s by event name and running their
//!   templated body.
//!
//! All three funnel into the same `agent` / `command` / `webhook` job
//! execution paths on [`scheduler::Scheduler`].

pub mod cron_expr;
pub mod heartbeat;
pub mod model;
pub mod runner;
pub mod scheduler;
pub mod store;
pub mod template;
pub mod webhook;

pub use model::{CronJob, HeartbeatTask, JobType, OnFailure, Trigger};
pub use runner::AgentRunner;
pub use scheduler::{JobOutcome, Scheduler};
