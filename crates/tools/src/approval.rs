use std::{collections::HashSet, sync::Arc, time::Duration};

use {
    anyhow::{Result, bail},
    serde::{Deserialize, Serialize},
    tokio::sync::{RwLock, oneshot},
    tracing::{debug, warn},
};

/// Outcome of an approval request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
    Approved,
    Denied,
    Timeout,
}

/// Approval mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[derive(Default)]
pub enum ApprovalMode {
    Off,
    #[default]
    OnMiss,
    Always,
}

impl ApprovalMode {
    /// Parse approval mode from config value.
    ///
    /// Accepts canonical values plus legacy aliases:
    /// - `on-miss` / `smart` -> `OnMiss`
    /// - `off` / `never` -> `Off`
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "off" | "never" => Some(Self::Off),
            "on-miss" | "on_miss" | "smart" => Some(Self::OnMiss),
            "always" => Some(Self::Always),
            _ => None,
        }
    }
}

/// Security level for exec commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum SecurityLevel {
    Deny,
    #[default]
    Allowlist,
    Full,
}

impl SecurityLevel {
    /// Parse security level from config value.
    ///
    /// Accepts canonical values plus schema aliases:
    /// - `allowlist` -> `Allowlist`
    /// - `permissive` / `full` -> `Full`
    /// - `strict` / `deny` -> `Deny`
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "allowlist" => Some(Self::Allowlist),
            "permissive" | "full" => Some(Self::Full),
            "strict" | "deny" => Some(Self::Deny),
            _ => None,
        }
    }
}

/// Well-known safe binaries that don't need approval.
pub const SAFE_BINS: &[&str] = &[
    "cat",
    "echo",
    "printf",
    "head",
    "tail",
    "wc",
    "sort",
    "uniq",
    "cut",
    "tr",
    "grep",
    "egrep",
    "fgrep",
    "awk",
    "sed",
    "jq",
    "yq",
    "date",
    "cal",
    "ls",
    "pwd",
    "whoami",
    "hostname",
    "uname",
    "env",
    "printenv",
    "basename",
    "dirname",
    "realpath",
    "readlink",
    "diff",
    "comm",
    "paste",
    "tee",
    "xargs",
    "true",
    "false",
    "test",
    "[",
    "seq",
    "yes",
    "rev",
    "fold",
    "expand",
    "unexpand",
    "md5sum",
    "sha256sum",
    "sha1sum",
    "b2sum",
    "file",
    "stat",
    "du",
    "df",
    "free",
    "which",
    "type",
    "command",
];

/// Extract the first command/binary from a shell command string.
fn extract_first_bin(command: &str) -> Option<&str> {
    let trimmed = command.trim();
    // Skip env var assignments at the start (e.g. `FOO=bar cmd`).
    let mut parts = trimmed.split_whitespace();
    for part in parts.by_ref() {
        if !part.contains('=') {
            // Strip path prefix (e.g. `/usr/bin/jq` → `jq`).
            return Some(part.rsplit('/').next().unwrap_or(part));
        }
    }
    None
}

/// Check if a command is on the safe bins list.
pub fn is_safe_command(command: &str) -> bool {
    if let Some(bin) = extract_first_bin(command) {
        SAFE_BINS.contains(&bin)
    } else {
        false
    }
}

/// Check if a command matches any pattern in an allowlist.
pub fn matches_allowlist(command: &str, allowlist: &[String]) -> bool {
    let bin = extract_first_bin(command).unwrap_or("");
    for pattern in allowlist {
        if pattern == "*" {
            return true;
        }
        if pattern == bin {
            return true;
        }
        // Prefix match with wildcard.
        if pattern.ends_with('*') {
            let prefix = &pattern[..pattern.len() - 1];
            if command.starts_with(prefix) || bin.starts_with(prefix) {
                return true;
            }
        }
    }
    false
}

/// Pending approval request waiting for gateway resolution.
struct PendingApproval {
    tx: oneshot::Sender<ApprovalDecision>,
}

/// The approval manager handles approval flow for exec commands.
pub struct ApprovalManager {
    pub mode: ApprovalMode,
    pub security_level: SecurityLevel,
    pub allowlist: Vec<String>,
    pub timeout: Duration,
    pending: Arc<RwLock<std::collections::HashMap<String, PendingApproval>>>,
    approved_commands: Arc<RwLock<HashSet<String>>>,
}

impl Default for ApprovalManager {
    fn default() -> Self {
        Self {
            mode: ApprovalMode::OnMiss,
            security_level: SecurityLevel::Allowlist,
            allowlist: Vec::new(),
            timeout: Duration::from_secs(120),
            pending: Arc::new(RwLock::new(std::collections::HashMap::new())),
            approved_commands: Arc::new(RwLock::new(HashSet::new())),
        }
    }
}

impl ApprovalManager {
    /// Decide whether a command needs approval.
    /// Returns Ok(()) if the command can proceed, Err if denied.
    pub async fn check_command(&self, command: &str) -> Result<ApprovalAction> {
        match self.security_level {
            SecurityLevel::Deny => bail!("exec denied: security level is 'deny'"),
            SecurityLevel::Full => return Ok(ApprovalAction::Proceed),
            SecurityLevel::Allowlist => {},
        }

        match self.mode {
            ApprovalMode::Off => Ok(ApprovalAction::Proceed),
            ApprovalMode::Always => Ok(ApprovalAction::NeedsApproval),
            ApprovalMode::OnMiss => {
                // Check safe bins.
                if is_safe_command(command) {
                    return Ok(ApprovalAction::Proceed);
                }
                // Check custom allowlist.
                if matches_allowlist(command, &self.allowlist) {
                    return Ok(ApprovalAction::Proceed);
                }
                // Check previously approved.
                if self.approved_commands.read().await.contains(command) {
                    return Ok(ApprovalAction::Proceed);
                }
                Ok(ApprovalAction::NeedsApproval)
            },
        }
    }

    /// Register a pending approval request. Returns an ID and a receiver for the decision.
    pub async fn create_request(
        &self,
        command: &str,
    ) -> (String, oneshot::Receiver<ApprovalDecision>) {
        let id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending
            .write()
            .await
            .insert(id.clone(), PendingApproval { tx });
        debug!(id = %id, command, "approval request created");
        (id, rx)
    }

    /// Resolve a pending approval request.
    pub async fn resolve(&self, id: &str, decision: ApprovalDecision, command: Option<&str>) {
        if let Some(pending) = self.pending.write().await.remove(id) {
            if decision == ApprovalDecision::Approved
                && let Some(cmd) = command
            {
                self.approved_commands.write().await.insert(cmd.to_string());
            }
            let _ = pending.tx.send(decision);
            debug!(id, "approval resolved");
        } else {
            warn!(id, "approval resolve: no pending request");
        }
    }

    /// Return the IDs of all pending approval requests.
    pub async fn pending_ids(&self) -> Vec<String> {
        self.pending.read().await.keys().cloned().collect()
    }

    /// Wait for an approval decision with timeout.
    pub async fn wait_for_decision(
        &self,
        rx: oneshot::Receiver<ApprovalDecision>,
    ) -> ApprovalDecision {
        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(decision)) => decision,
            Ok(Err(_)) => {
                warn!("approval channel closed");
                ApprovalDecision::Denied
            },
            Err(_) => {
                warn!("approval timed out");
                ApprovalDecision::Timeout
            },
        }
    }
}

/// Action to take after checking approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalAction {
    Proceed,
    NeedsApproval,
}
