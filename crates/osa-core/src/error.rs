// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The error taxonomy: a fixed, closed set of machine-readable
//! codes for the failures that cross a boundary — HTTP response, CLI exit
//! code, or an operator-visible log line. Everything upstream of that
//! boundary still propagates as `anyhow::Error`; this type exists only at
//! the seam that needs to match on *which* failure happened.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OsaError {
    #[error("signal_filtered: {0}")]
    SignalFiltered(String),

    #[error("provider_unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("tool_execution_failed: {0}")]
    ToolExecutionFailed(String),

    #[error("tool_blocked_by_hook: {0}")]
    ToolBlockedByHook(String),

    #[error("context_overflow: {0}")]
    ContextOverflow(String),

    #[error("shell_policy_violation: {0}")]
    ShellPolicyViolation(String),

    #[error("scheduler_job_failed: {0}")]
    SchedulerJobFailed(String),

    #[error("invalid_config: {0}")]
    InvalidConfig(String),

    #[error("cancelled")]
    Cancelled,
}

impl OsaError {
    /// Machine-readable code, stable across `Display` wording changes —
    /// this is what HTTP error bodies and log fields key on.
    pub fn code(&self) -> &'static str {
        match self {
            Self::SignalFiltered(_) => "signal_filtered",
            Self::ProviderUnavailable(_) => "provider_unavailable",
            Self::ToolExecutionFailed(_) => "tool_execution_failed",
            Self::ToolBlockedByHook(_) => "tool_blocked_by_hook",
            Self::ContextOverflow(_) => "context_overflow",
            Self::ShellPolicyViolation(_) => "shell_policy_violation",
            Self::SchedulerJobFailed(_) => "scheduler_job_failed",
            Self::InvalidConfig(_) => "invalid_config",
            Self::Cancelled => "cancelled",
        }
    }
}
