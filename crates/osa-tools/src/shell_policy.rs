// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Destructive-shell command gate.
//!
//! Shared between the `shell`/`run_terminal_command` tools and the
//! Scheduler's `command` job type: both must reject the same set of
//! known-dangerous command lines before ever spawning a subprocess.

use once_cell::sync::Lazy;
use regex::Regex;

static FORCE_PUSH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bgit\s+push\b.*(--force\b|(?:^|\s)-f\b|--force-with-lease\b)").unwrap());
static PUSH_REFSPEC_FORCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bgit\s+push\b[^|;&]*\s\+\S").unwrap());
static HARD_RESET: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bgit\s+reset\b.*--hard\b").unwrap());
static RECURSIVE_CLEAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bgit\s+clean\b.*-\w*d\w*f\w*|\bgit\s+clean\b.*-\w*f\w*d\w*").unwrap());
static WILDCARD_CHECKOUT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bgit\s+checkout\b\s+(--\s+)?(\.|\*)\s*$").unwrap());
static FORCE_BRANCH_DELETE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bgit\s+branch\b.*(-D\b|--delete\b.*--force\b|--force\b.*--delete\b)").unwrap());
static NO_VERIFY: Lazy<Regex> = Lazy::new(|| Regex::new(r"--no-verify\b").unwrap());

/// Rejects a command line that matches a known-destructive pattern.
///
/// Returns `Ok(())` when the command is safe to execute, or `Err(reason)`
/// with a short human-readable reason otherwise. Never inspects anything
/// beyond the literal command string — no shell evaluation is performed.
pub fn validate(cmdline: &str) -> Result<(), String> {
    let trimmed = cmdline.trim();
    if trimmed.is_empty() {
        return Err("blocked: empty command".to_string());
    }
    if NO_VERIFY.is_match(trimmed) {
        return Err("blocked: hook bypass (--no-verify)".to_string());
    }
    if FORCE_PUSH.is_match(trimmed) || PUSH_REFSPEC_FORCE.is_match(trimmed) {
        return Err("blocked: destructive git (force push)".to_string());
    }
    if HARD_RESET.is_match(trimmed) {
        return Err("blocked: destructive git (hard reset)".to_string());
    }
    if RECURSIVE_CLEAN.is_match(trimmed) {
        return Err("blocked: destructive git (recursive clean)".to_string());
    }
    if WILDCARD_CHECKOUT.is_match(trimmed) {
        return Err("blocked: destructive git (wildcard checkout)".to_string());
    }
    if FORCE_BRANCH_DELETE.is_match(trimmed) {
        return Err("blocked: destructive git (force branch delete)".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_command() {
        assert!(validate("").is_err());
        assert!(validate("   ").is_err());
    }

    #[test]
    fn rejects_force_push() {
        assert!(validate("git push --force").is_err());
        assert!(validate("git push -f origin main").is_err());
        assert!(validate("git push origin +main").is_err());
    }

    #[test]
    fn rejects_force_with_lease() {
        assert!(validate("git push --force-with-lease").is_err());
    }

    #[test]
    fn allows_plain_push() {
        assert!(validate("git push origin main").is_ok());
    }

    #[test]
    fn rejects_hard_reset() {
        assert!(validate("git reset --hard HEAD~1").is_err());
    }

    #[test]
    fn allows_soft_reset() {
        assert!(validate("git reset --soft HEAD~1").is_ok());
    }

    #[test]
    fn rejects_recursive_clean() {
        assert!(validate("git clean -fd").is_err());
        assert!(validate("git clean -dfx").is_err());
    }

    #[test]
    fn allows_dry_run_clean() {
        assert!(validate("git clean -n").is_ok());
    }

    #[test]
    fn rejects_wildcard_checkout() {
        assert!(validate("git checkout -- .").is_err());
        assert!(validate("git checkout .").is_err());
    }

    #[test]
    fn allows_named_file_checkout() {
        assert!(validate("git checkout -- src/main.rs").is_ok());
    }

    #[test]
    fn rejects_force_branch_delete() {
        assert!(validate("git branch -D feature/x").is_err());
        assert!(validate("git branch --delete --force feature/x").is_err());
    }

    #[test]
    fn allows_plain_branch_delete() {
        assert!(validate("git branch -d feature/x").is_ok());
    }

    #[test]
    fn rejects_no_verify() {
        assert!(validate("git commit -m test --no-verify").is_err());
    }

    #[test]
    fn allows_ordinary_commands() {
        assert!(validate("echo hi").is_ok());
        assert!(validate("cargo test").is_ok());
        assert!(validate("git status").is_ok());
    }

    #[test]
    fn scenario_from_spec_git_push_force_is_blocked() {
        let err = validate("git push --force").unwrap_err();
        assert!(err.contains("blocked: destructive git"));
    }
}
