// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod agent;
mod compact;
pub mod doom;
mod error;
mod events;
mod front_door;
mod prompts;
mod runtime_context;
mod session;
mod session_log;

pub use agent::Agent;
pub use compact::{
    compact_session, compact_session_with_strategy, emergency_compact, smart_truncate,
};
pub use error::OsaError;
pub use events::{AgentEvent, CompactionStrategyUsed};
pub use front_door::{DeliverOutcome, SessionLoop, SessionRegistry};
pub use prompts::system_prompt;
pub use runtime_context::AgentRuntimeContext;
pub use session::{Session, TurnRecord};
pub use session_log::SessionLog;
