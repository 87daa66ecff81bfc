//! Detection of an existing OpenClaw installation.

use std::path::{Path, PathBuf};

use tracing::debug;

/// Result of scanning for an OpenClaw installation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct OpenClawDetection {
    /// Root directory (`~/.openclaw/` or `OPENCLAW_HOME`).
    pub home_dir: PathBuf,
    /// Whether `openclaw.json` exists.
    pub has_config: bool,
    /// Whether agent auth-profiles exist (credentials).
    pub has_credentials: bool,
    /// Whether `mcp-servers.json` exists at the root.
    pub has_mcp_servers: bool,
    /// Resolved workspace directory (respects `OPENCLAW_PROFILE`).
    pub workspace_dir: PathBuf,
    /// Whether the workspace has `MEMORY.md` or `memory/` directory.
    pub has_memory: bool,
    /// Whether workspace or managed skills directories exist.
    pub has_skills: bool,
    /// Agent IDs discovered under `agents/`.
    pub agent_ids: Vec<String>,
    /// Total session file count across all agents.
    pub session_count: usize,
    /// Names of configured but unsupported channels.
    pub unsupported_channels: Vec<String>,
}

/// Detect an OpenClaw installation.
///
/// Checks `OPENCLAW_HOME` env var first, then `~/.openclaw/`.
/// Returns `None` if the directory does not exist.
pub fn detect() -> Option<OpenClawDetection> {
    detect_at(resolve_home_dir()?)
}

/// Detect OpenClaw at a specific directory (for testing).
pub fn detect_at(home_dir: PathBuf) -> Option<OpenClawDetection> {
    if !home_dir.is_dir() {
        debug!(?home_dir, "OpenClaw home directory not found");
        return None;
    }

    debug!(?home_dir, "OpenClaw installation detected");

    let has_config = home_dir.join("openclaw.json").is_file();
    let has_mcp_servers = home_dir.join("mcp-servers.json").is_file();

    let workspace_dir = resolve_workspace_dir(&home_dir);
    let has_memory =
        workspace_dir.join("MEMORY.md").is_file() || workspace_dir.join("memory").is_dir();

    let has_skills = home_dir.join("skills").is_dir() || workspace_dir.join("skills").is_dir();

    let (agent_ids, session_count, has_credentials) = scan_agents(&home_dir);

    let unsupported_channels = if has_config {
        scan_unsupported_channels(&home_dir)
    } else {
        Vec::new()
    };

    Some(OpenClawDetection {
        home_dir,
        has_config,
        has_credentials,
        has_mcp_servers,
        workspace_dir,
        has_memory,
        has_skills,
        agent_ids,
        session_count,
        unsupported_channels,
    })
}

/// Resolve the OpenClaw home directory from env or default.
fn resolve_home_dir() -> Option<PathBuf> {
    if let Ok(home) = std::env::var("OPENCLAW_HOME") {
        let path = PathBuf::from(home);
        if path.is_dir() {
            return Some(path);
        }
    }

    dirs_next::home_dir().map(|home| home.join(".openclaw"))
}

/// Resolve the workspace directory, respecting `OPENCLAW_PROFILE`.
fn resolve_workspace_dir(home: &Path) -> PathBuf {
    let profile = std::env::var("OPENCLAW_PROFILE").ok();
    match profile.as_deref() {
        Some(p) if !p.is_empty() => home.join(format!("workspace-{p}")),
        _ => home.join("workspace"),
    }
}

/// Resolve the sessions directory for one agent, supporting both historical
/// and current OpenClaw layouts.
pub(crate) fn resolve_agent_sessions_dir(agent_dir: &Path) -> Option<PathBuf> {
    let nested = agent_dir.join("agent").join("sessions");
    if nested.is_dir() {
        return Some(nested);
    }

    let flat = agent_dir.join("sessions");
    if flat.is_dir() {
        return Some(flat);
    }

    None
}

/// Resolve auth-profiles path for one agent, supporting both historical and
/// current OpenClaw layouts.
pub(crate) fn resolve_agent_auth_profiles_path(agent_dir: &Path) -> Option<PathBuf> {
    let nested = agent_dir.join("agent").join("auth-profiles.json");
    if nested.is_file() {
        return Some(nested);
    }

    let flat = agent_dir.join("auth-profiles.json");
    if flat.is_file() {
        return Some(flat);
    }

    None
}

/// Scan `agents/` directory for agent IDs, session counts, and credentials.
fn scan_agents(home: &Path) -> (Vec<String>, usize, bool) {
    let agents_dir = home.join("agents");
    let mut agent_ids = Vec::new();
    let mut session_count = 0;
    let mut has_credentials = false;

    let Ok(entries) = std::fs::read_dir(&agents_dir) else {
        return (agent_ids, session_count, has_credentials);
    };

    for entry in entries.flatten() {
        let agent_dir = entry.path();
        if !agent_dir.is_dir() {
            continue;
        }
        if let Some(name) = agent_dir.file_name().and_then(|n| n.to_str()) {
            agent_ids.push(name.to_string());

            // Count sessions
            if let Some(sessions_dir) = resolve_agent_sessions_dir(&agent_dir)
                && let Ok(session_entries) = std::fs::read_dir(&sessions_dir)
            {
                session_count += session_entries
                    .flatten()
                    .filter(|e| e.path().extension().is_some_and(|ext| ext == "jsonl"))
                    .count();
            }

            // Check for auth-profiles.json
            if resolve_agent_auth_profiles_path(&agent_dir).is_some() {
                has_credentials = true;
            }
        }
    }

    agent_ids.sort();
    (agent_ids, session_count, has_credentials)
}

/// Scan the config for unsupported channel names.
fn scan_unsupported_channels(home: &Path) -> Vec<String> {
    let config_path = home.join("openclaw.json");
    let Ok(content) = std::fs::read_to_string(&config_path) else {
        return Vec::new();
    };
    let Ok(config) = json5::from_str::<crate::types::OpenClawConfig>(&content) else {
        return Vec::new();
    };

    let mut unsupported = Vec::new();
    if config.channels.whatsapp.is_some() {
        unsupported.push("whatsapp".to_string());
    }
    if config.channels.discord.is_some() {
        unsupported.push("discord".to_string());
    }
    if config.channels.slack.is_some() {
        unsupported.push("slack".to_string());
    }
    if config.channels.signal.is_some() {
        unsupported.push("signal".to_string());
    }
    if config.channels.imessage.is_some() {
        unsupported.push("imessage".to_string());
    }
    unsupported
}
