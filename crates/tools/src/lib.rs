//! Tool implementations and policy enforcement.
//!
//! Tools: bash/exec, browser, canvas, message, nodes, cron, sessions,
//! web fetch/search, memory, image gen, plus channel and plugin tools.
//!
//! Policy: multi-layered allow/deny (global, per-agent, per-provider,
//! per-group, per-sender, sandbox).

pub mod approval;
pub mod branch_session;
pub mod browser;
pub mod cron_tool;
pub mod exec;
pub mod image_cache;
pub mod location;
pub mod policy;
pub mod process;
pub mod sandbox;
pub mod sandbox_packages;
pub mod session_state;
pub mod skill_tools;
pub mod spawn_agent;
pub mod web_fetch;
pub mod web_search;
