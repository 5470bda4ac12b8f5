//! State-directory resolution (env-overridable).
//!
//! Layout under the state root:
//! - `skills/` — remote skill cache plus its `state.json` ledger.
//! - `runs/`   — per-run JSONL logs and optional prompt dumps.

use std::path::PathBuf;
use std::time::Duration;

use crate::errors::{ConfigError, WardenResult};

/// Default TTL for unpinned remote skill refs: one day.
pub const DEFAULT_SKILL_CACHE_TTL_SECS: u64 = 86_400;

/// Resolves the state root: `WARDEN_STATE_DIR`, else `~/.warden`.
pub fn state_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("WARDEN_STATE_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    match std::env::var_os("HOME") {
        Some(home) if !home.is_empty() => PathBuf::from(home).join(".warden"),
        _ => PathBuf::from(".warden"),
    }
}

/// TTL for unpinned remote refs: `WARDEN_SKILL_CACHE_TTL` seconds
/// (positive integer), else the one-day default.
pub fn skill_cache_ttl() -> WardenResult<Duration> {
    match std::env::var("WARDEN_SKILL_CACHE_TTL") {
        Ok(raw) if !raw.trim().is_empty() => parse_ttl_secs(raw.trim()).map(Duration::from_secs),
        _ => Ok(Duration::from_secs(DEFAULT_SKILL_CACHE_TTL_SECS)),
    }
}

/// Parses a positive integer number of seconds.
pub fn parse_ttl_secs(raw: &str) -> WardenResult<u64> {
    match raw.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(secs),
        _ => Err(ConfigError::InvalidNumber {
            var: "WARDEN_SKILL_CACHE_TTL",
            reason: "expected positive integer seconds",
        }
        .into()),
    }
}
