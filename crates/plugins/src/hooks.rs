//! Hook system — re-exports core types from `moltis-common` and adds config.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// Re-export all core hook types so downstream code can use `moltis_plugins::hooks::*`.
pub use moltis_common::hooks::{
    HookAction, HookEvent, HookHandler, HookPayload, HookRegistry, HookStats,
};

// ── Hook configuration ──────────────────────────────────────────────────────

/// Configuration for a single shell hook, loaded from TOML/config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellHookConfig {
    pub name: String,
    pub command: String,
    pub events: Vec<HookEvent>,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_timeout() -> u64 {
    10
}

/// Top-level hooks configuration section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HooksConfig {
    #[serde(default)]
    pub hooks: Vec<ShellHookConfig>,
}
