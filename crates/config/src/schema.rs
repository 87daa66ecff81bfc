/// Config schema types (agents, channels, tools, session, gateway, plugins).
/// Corresponds to `src/config/types.ts` and `zod-schema.*.ts` in the TS codebase.
use std::collections::HashMap;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Agent identity (name, emoji, creature, vibe, soul).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentIdentity {
    pub name: Option<String>,
    pub emoji: Option<String>,
    pub creature: Option<String>,
    pub vibe: Option<String>,
    /// Freeform personality / soul text injected into the system prompt.
    pub soul: Option<String>,
}

/// User profile collected during onboarding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    pub name: Option<String>,
    pub timezone: Option<String>,
}

/// Resolved identity combining agent identity and user profile.
/// Used as the API response for `identity_get` and in the gon data blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedIdentity {
    pub name: String,
    pub emoji: Option<String>,
    pub creature: Option<String>,
    pub vibe: Option<String>,
    pub soul: Option<String>,
    pub user_name: Option<String>,
}

impl ResolvedIdentity {
    pub fn from_config(cfg: &MoltisConfig) -> Self {
        Self {
            name: cfg.identity.name.clone().unwrap_or_else(|| "moltis".into()),
            emoji: cfg.identity.emoji.clone(),
            creature: cfg.identity.creature.clone(),
            vibe: cfg.identity.vibe.clone(),
            soul: cfg.identity.soul.clone(),
            user_name: cfg.user.name.clone(),
        }
    }
}

impl Default for ResolvedIdentity {
    fn default() -> Self {
        Self {
            name: "moltis".into(),
            emoji: None,
            creature: None,
            vibe: None,
            soul: None,
            user_name: None,
        }
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MoltisConfig {
    pub server: ServerConfig,
    pub providers: ProvidersConfig,
    pub chat: ChatConfig,
    pub tools: ToolsConfig,
    pub skills: SkillsConfig,
    pub mcp: McpConfig,
    pub channels: ChannelsConfig,
    pub tls: TlsConfig,
    pub auth: AuthConfig,
    pub metrics: MetricsConfig,
    pub identity: AgentIdentity,
    pub user: UserProfile,
    pub hooks: Option<HooksConfig>,
    pub memory: MemoryEmbeddingConfig,
    pub tailscale: TailscaleConfig,
    pub failover: FailoverConfig,
    pub heartbeat: HeartbeatConfig,
}

/// Gateway server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to. Defaults to "127.0.0.1".
    pub bind: String,
    /// Port to listen on. When a new config is created, a random available port
    /// is generated so each installation gets a unique port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 0, // Will be replaced with a random port when config is created
        }
    }
}

/// Failover configuration for automatic model/provider failover.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FailoverConfig {
    /// Whether failover is enabled. Defaults to true.
    pub enabled: bool,
    /// Ordered list of fallback model IDs to try when the primary fails.
    /// If empty, the chain is built from all registered models.
    #[serde(default)]
    pub fallback_models: Vec<String>,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fallback_models: Vec::new(),
        }
    }
}

/// Heartbeat configuration — periodic health-check agent turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Whether the heartbeat is enabled. Defaults to true.
    pub enabled: bool,
    /// Interval between heartbeats (e.g. "30m", "1h"). Defaults to "30m".
    pub every: String,
    /// Provider/model override for heartbeat turns (e.g. "anthropic/claude-sonnet-4-20250514").
    pub model: Option<String>,
    /// Custom prompt override. If empty, the built-in default is used.
    pub prompt: Option<String>,
    /// Max characters for an acknowledgment reply before truncation. Defaults to 300.
    pub ack_max_chars: usize,
    /// Active hours window — heartbeats only run during this window.
    pub active_hours: ActiveHoursConfig,
    /// Whether heartbeat runs inside a sandbox. Defaults to true.
    #[serde(default = "default_true")]
    pub sandbox_enabled: bool,
    /// Override sandbox image for heartbeat. If `None`, uses the default image.
    pub sandbox_image: Option<String>,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            every: "30m".into(),
            model: None,
            prompt: None,
            ack_max_chars: 300,
            active_hours: ActiveHoursConfig::default(),
            sandbox_enabled: true,
            sandbox_image: None,
        }
    }
}

/// Active hours window for heartbeats.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActiveHoursConfig {
    /// Start time in HH:MM format. Defaults to "08:00".
    pub start: String,
    /// End time in HH:MM format. Defaults to "24:00" (midnight = always on until end of day).
    pub end: String,
    /// IANA timezone (e.g. "Europe/Paris") or "local". Defaults to "local".
    pub timezone: String,
}

impl Default for ActiveHoursConfig {
    fn default() -> Self {
        Self {
            start: "08:00".into(),
            end: "24:00".into(),
            timezone: "local".into(),
        }
    }
}

/// Tailscale Serve/Funnel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TailscaleConfig {
    /// Tailscale mode: "off", "serve", or "funnel".
    pub mode: String,
    /// Reset tailscale serve/funnel when the gateway shuts down.
    pub reset_on_exit: bool,
}

impl Default for TailscaleConfig {
    fn default() -> Self {
        Self {
            mode: "off".into(),
            reset_on_exit: true,
        }
    }
}

/// Memory embedding provider configuration.
///
/// Controls which embedding provider the memory system uses.
/// If not configured, the system auto-detects from available providers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryEmbeddingConfig {
    /// Embedding provider: "local", "ollama", "openai", "custom", or None for auto-detect.
    pub provider: Option<String>,
    /// Base URL for the embedding API (e.g. "http://localhost:11434/v1" for Ollama).
    pub base_url: Option<String>,
    /// Model name (e.g. "nomic-embed-text" for Ollama, "text-embedding-3-small" for OpenAI).
    pub model: Option<String>,
    /// API key (optional for local endpoints like Ollama).
    #[serde(
        default,
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub api_key: Option<Secret<String>>,
}

/// Hooks configuration section (shell hooks defined in config file).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HooksConfig {
    #[serde(default)]
    pub hooks: Vec<ShellHookConfigEntry>,
}

/// A single shell hook defined in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellHookConfigEntry {
    pub name: String,
    pub command: String,
    pub events: Vec<String>,
    #[serde(default = "default_hook_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_hook_timeout() -> u64 {
    10
}

/// Authentication configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// When true, authentication is explicitly disabled (no login required).
    pub disabled: bool,
}

/// Metrics and observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether metrics collection is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Whether to expose the `/metrics` Prometheus endpoint.
    #[serde(default = "default_true")]
    pub prometheus_endpoint: bool,
    /// Additional labels to add to all metrics.
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prometheus_endpoint: true,
            labels: HashMap::new(),
        }
    }
}

impl MoltisConfig {
    /// Returns `true` when both the agent name and user name have been set
    /// (i.e. the onboarding wizard has been completed).
    pub fn is_onboarded(&self) -> bool {
        self.identity.name.is_some() && self.user.name.is_some()
    }
}

/// Skills configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillsConfig {
    /// Whether the skills system is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Extra directories to search for skills.
    #[serde(default)]
    pub search_paths: Vec<String>,
    /// Skills to always load (by name) without explicit activation.
    #[serde(default)]
    pub auto_load: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// MCP (Model Context Protocol) server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct McpConfig {
    /// Configured MCP servers, keyed by server name.
    #[serde(default)]
    pub servers: HashMap<String, McpServerEntry>,
}

/// Configuration for a single MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerEntry {
    /// Command to spawn the server process (stdio transport).
    #[serde(default)]
    pub command: String,
    /// Arguments to the command.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment variables to set for the process.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Whether this server is enabled. Defaults to true.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Transport type: "stdio" (default) or "sse".
    #[serde(default)]
    pub transport: String,
    /// URL for SSE transport. Required when `transport` is "sse".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Channel configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    /// Telegram bot accounts, keyed by account ID.
    #[serde(default)]
    pub telegram: HashMap<String, serde_json::Value>,
}

/// TLS configuration for the gateway HTTPS server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Enable HTTPS with auto-generated certificates. Defaults to true.
    pub enabled: bool,
    /// Auto-generate a local CA and server certificate on first run.
    pub auto_generate: bool,
    /// Path to a custom server certificate (PEM). Overrides auto-generation.
    pub cert_path: Option<String>,
    /// Path to a custom server private key (PEM). Overrides auto-generation.
    pub key_path: Option<String>,
    /// Path to the CA certificate (PEM) used for trust instructions.
    pub ca_cert_path: Option<String>,
    /// Port for the plain-HTTP redirect/CA-download server.
    pub http_redirect_port: Option<u16>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_generate: true,
            cert_path: None,
            key_path: None,
            ca_cert_path: None,
            http_redirect_port: Some(18790),
        }
    }
}

/// Chat configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// How to handle messages that arrive while an agent run is active.
    pub message_queue_mode: MessageQueueMode,
}

/// Behaviour when `chat.send()` is called during an active run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageQueueMode {
    /// Queue each message; replay them one-by-one after the current run.
    #[default]
    Followup,
    /// Buffer messages; concatenate and process as a single message after the current run.
    Collect,
}

/// Tools configuration (exec, sandbox, policy, web).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub exec: ExecConfig,
    pub policy: ToolPolicyConfig,
    pub web: WebConfig,
    /// Maximum wall-clock seconds for an agent run (0 = no timeout). Default 600.
    #[serde(default = "default_agent_timeout_secs")]
    pub agent_timeout_secs: u64,
    /// Maximum bytes for a single tool result before truncation. Default 50KB.
    #[serde(default = "default_max_tool_result_bytes")]
    pub max_tool_result_bytes: usize,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            exec: ExecConfig::default(),
            policy: ToolPolicyConfig::default(),
            web: WebConfig::default(),
            agent_timeout_secs: default_agent_timeout_secs(),
            max_tool_result_bytes: default_max_tool_result_bytes(),
        }
    }
}

fn default_agent_timeout_secs() -> u64 {
    600
}

fn default_max_tool_result_bytes() -> usize {
    50_000
}

/// Web tools configuration (search, fetch).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub search: WebSearchConfig,
    pub fetch: WebFetchConfig,
}

/// Search provider selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SearchProvider {
    #[default]
    Brave,
    Perplexity,
}

/// Web search tool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSearchConfig {
    pub enabled: bool,
    /// Search provider.
    pub provider: SearchProvider,
    /// Brave Search API key (overrides `BRAVE_API_KEY` env var).
    #[serde(
        default,
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub api_key: Option<Secret<String>>,
    /// Maximum number of results to return (1-10).
    pub max_results: u8,
    /// HTTP request timeout in seconds.
    pub timeout_seconds: u64,
    /// In-memory cache TTL in minutes (0 to disable).
    pub cache_ttl_minutes: u64,
    /// Perplexity-specific settings.
    pub perplexity: PerplexityConfig,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: SearchProvider::default(),
            api_key: None,
            max_results: 5,
            timeout_seconds: 30,
            cache_ttl_minutes: 15,
            perplexity: PerplexityConfig::default(),
        }
    }
}

/// Perplexity search provider configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PerplexityConfig {
    /// API key (overrides `PERPLEXITY_API_KEY` / `OPENROUTER_API_KEY` env vars).
    #[serde(
        default,
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub api_key: Option<Secret<String>>,
    /// Base URL override. Auto-detected from key prefix if empty.
    pub base_url: Option<String>,
    /// Model to use.
    pub model: Option<String>,
}

/// Web fetch tool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebFetchConfig {
    pub enabled: bool,
    /// Maximum characters to return from fetched content.
    pub max_chars: usize,
    /// HTTP request timeout in seconds.
    pub timeout_seconds: u64,
    /// In-memory cache TTL in minutes (0 to disable).
    pub cache_ttl_minutes: u64,
    /// Maximum number of HTTP redirects to follow.
    pub max_redirects: u8,
    /// Use readability extraction for HTML pages.
    pub readability: bool,
}

impl Default for WebFetchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_chars: 50_000,
            timeout_seconds: 30,
            cache_ttl_minutes: 15,
            max_redirects: 3,
            readability: true,
        }
    }
}

/// Exec tool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecConfig {
    pub default_timeout_secs: u64,
    pub max_output_bytes: usize,
    pub approval_mode: String,
    pub security_level: String,
    pub allowlist: Vec<String>,
    pub sandbox: SandboxConfig,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 30,
            max_output_bytes: 200 * 1024,
            approval_mode: "on-miss".into(),
            security_level: "allowlist".into(),
            allowlist: Vec::new(),
            sandbox: SandboxConfig::default(),
        }
    }
}

/// Resource limits for sandboxed execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimitsConfig {
    /// Memory limit (e.g. "512M", "1G").
    pub memory_limit: Option<String>,
    /// CPU quota as a fraction (e.g. 0.5 = half a core, 2.0 = two cores).
    pub cpu_quota: Option<f64>,
    /// Maximum number of PIDs.
    pub pids_max: Option<u32>,
}

/// Sandbox configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub mode: String,
    pub scope: String,
    pub workspace_mount: String,
    pub image: Option<String>,
    pub container_prefix: Option<String>,
    pub no_network: bool,
    /// Backend: "auto" (default), "docker", or "apple-container".
    /// "auto" prefers Apple Container on macOS when available, falls back to Docker.
    pub backend: String,
    pub resource_limits: ResourceLimitsConfig,
    /// Packages to install via `apt-get` in the sandbox image.
    /// Set to an empty list to skip provisioning.
    #[serde(default = "default_sandbox_packages")]
    pub packages: Vec<String>,
}

/// Default packages installed in sandbox containers.
/// Inspired by GitHub Actions runner images — covers commonly needed
/// CLI tools, language runtimes, and utilities for LLM-driven tasks.
fn default_sandbox_packages() -> Vec<String> {
    [
        // Networking & HTTP
        "curl",
        "wget",
        "ca-certificates",
        "dnsutils",
        "netcat-openbsd",
        "openssh-client",
        "iproute2",
        "net-tools",
        // Language runtimes
        "python3",
        "python3-dev",
        "python3-pip",
        "python3-venv",
        "python-is-python3",
        "nodejs",
        "npm",
        "ruby",
        "ruby-dev",
        // Build toolchain & native deps
        "build-essential",
        "clang",
        "libclang-dev",
        "llvm-dev",
        "pkg-config",
        "libssl-dev",
        "libsqlite3-dev",
        "libyaml-dev",
        "liblzma-dev",
        "autoconf",
        "automake",
        "libtool",
        "bison",
        "flex",
        "dpkg-dev",
        "fakeroot",
        // Compression & archiving
        "zip",
        "unzip",
        "bzip2",
        "xz-utils",
        "p7zip-full",
        "tar",
        "zstd",
        "lz4",
        "pigz",
        // Common CLI utilities (mirrors GitHub runner image)
        "git",
        "gnupg2",
        "jq",
        "rsync",
        "file",
        "tree",
        "sqlite3",
        "sudo",
        "locales",
        "tzdata",
        "shellcheck",
        "patchelf",
        // Text processing & search
        "ripgrep",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            mode: "all".into(),
            scope: "session".into(),
            workspace_mount: "ro".into(),
            image: None,
            container_prefix: None,
            no_network: true,
            backend: "auto".into(),
            resource_limits: ResourceLimitsConfig::default(),
            packages: default_sandbox_packages(),
        }
    }
}

/// Tool policy configuration (allow/deny lists).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPolicyConfig {
    pub allow: Vec<String>,
    pub deny: Vec<String>,
    pub profile: Option<String>,
}

/// OAuth provider configuration (e.g. openai-codex).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthProviderConfig {
    pub client_id: String,
    pub auth_url: String,
    pub token_url: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub callback_port: u16,
}

/// LLM provider configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Provider-specific settings keyed by provider name.
    /// Known keys: "anthropic", "openai", "gemini", "groq", "xai", "deepseek"
    #[serde(flatten)]
    pub providers: HashMap<String, ProviderEntry>,
}

/// Configuration for a single LLM provider.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderEntry {
    /// Whether this provider is enabled. Defaults to true.
    pub enabled: bool,

    /// Override the API key (optional; env var still takes precedence if set).
    #[serde(
        default,
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub api_key: Option<Secret<String>>,

    /// Override the base URL.
    pub base_url: Option<String>,

    /// Default model ID for this provider.
    pub model: Option<String>,

    /// Optional alias for this provider instance.
    ///
    /// When set, this alias is used in metrics labels instead of the provider name.
    /// Useful when configuring multiple instances of the same provider type
    /// (e.g., "anthropic-work", "anthropic-personal").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl std::fmt::Debug for ProviderEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderEntry")
            .field("enabled", &self.enabled)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("alias", &self.alias)
            .finish()
    }
}

impl Default for ProviderEntry {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            base_url: None,
            model: None,
            alias: None,
        }
    }
}

// ── Serde helpers for Secret<String> ────────────────────────────────────────

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}

impl ProvidersConfig {
    /// Check if a provider is enabled (defaults to true if not configured).
    pub fn is_enabled(&self, name: &str) -> bool {
        self.providers.get(name).is_none_or(|e| e.enabled)
    }

    /// Get the configured entry for a provider, if any.
    pub fn get(&self, name: &str) -> Option<&ProviderEntry> {
        self.providers.get(name)
    }
}
