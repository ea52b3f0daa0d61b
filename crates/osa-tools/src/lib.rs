// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod builtin;
pub mod events;
pub mod hooks;
pub mod policy;
pub mod registry;
pub mod shell_policy;
pub mod tool;

pub use events::{TodoItem, ToolEvent};
pub use hooks::{HookOutcome, HookRegistry, PostToolHook, PreToolHook};
pub use policy::{ApprovalPolicy, ToolPolicy};
pub use registry::{ToolRegistry, ToolSchema};
pub use tool::{OutputCategory, Tool, ToolCall, ToolOutput, ToolOutputPart};

// New tool exports
pub use builtin::apply_patch::ApplyPatchTool;
pub use builtin::ask_question::{AskQuestionTool, Question, QuestionRequest};
pub use builtin::delete_file::DeleteFileTool;
pub use builtin::edit_file::EditFileTool;
pub use builtin::fs::FsTool;
pub use builtin::find_file::FindFileTool;
pub use builtin::glob_file_search::GlobFileSearchTool;
pub use builtin::grep::GrepTool;
pub use builtin::list_dir::ListDirTool;
pub use builtin::read_file::ReadFileTool;
pub use builtin::read_lints::ReadLintsTool;
pub use builtin::run_terminal_command::RunTerminalCommandTool;
pub use builtin::search_codebase::SearchCodebaseTool;
pub use builtin::switch_mode::SwitchModeTool;
pub use builtin::todo_write::TodoWriteTool;
pub use builtin::update_memory::UpdateMemoryTool;
pub use builtin::web_fetch::WebFetchTool;
pub use builtin::web_search::WebSearchTool;
pub use builtin::write_file::WriteTool;

pub use builtin::shell::ShellTool;
