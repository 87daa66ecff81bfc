//! Hook discovery from filesystem directories.
//!
//! Scans configured directories for hook definitions (`HOOK.md` files)
//! and produces [`ParsedHook`] entries.

use std::path::PathBuf;

use {async_trait::async_trait, tracing::warn};

use crate::hook_metadata::{ParsedHook, parse_hook_md};

/// Source of a discovered hook.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookSource {
    Project,
    User,
    Bundled,
}

/// Discovers hooks from the filesystem.
#[async_trait]
pub trait HookDiscoverer: Send + Sync {
    /// Scan configured paths and return all discovered hooks.
    async fn discover(&self) -> anyhow::Result<Vec<(ParsedHook, HookSource)>>;
}

/// Filesystem-based hook discoverer. Scans directories in priority order.
pub struct FsHookDiscoverer {
    search_paths: Vec<(PathBuf, HookSource)>,
}

impl FsHookDiscoverer {
    pub fn new(search_paths: Vec<(PathBuf, HookSource)>) -> Self {
        Self { search_paths }
    }

    /// Build the default search paths for hook discovery.
    ///
    /// Workspace root is always the configured data directory.
    pub fn default_paths() -> Vec<(PathBuf, HookSource)> {
        let workspace_root = moltis_config::data_dir();
        vec![
            (workspace_root.join(".moltis/hooks"), HookSource::Project),
            (moltis_config::data_dir().join("hooks"), HookSource::User),
        ]
    }
}

#[async_trait]
impl HookDiscoverer for FsHookDiscoverer {
    async fn discover(&self) -> anyhow::Result<Vec<(ParsedHook, HookSource)>> {
        let mut hooks = Vec::new();

        for (base_path, source) in &self.search_paths {
            if !base_path.is_dir() {
                continue;
            }

            let entries = match std::fs::read_dir(base_path) {
                Ok(e) => e,
                Err(_) => continue,
            };

            for entry in entries.flatten() {
                let hook_dir = entry.path();
                if !hook_dir.is_dir() {
                    continue;
                }

                let hook_md = hook_dir.join("HOOK.md");
                if !hook_md.is_file() {
                    continue;
                }

                let content = match std::fs::read_to_string(&hook_md) {
                    Ok(c) => c,
                    Err(e) => {
                        warn!(?hook_md, %e, "failed to read HOOK.md");
                        continue;
                    },
                };

                match parse_hook_md(&content, &hook_dir) {
                    Ok(parsed) => hooks.push((parsed, source.clone())),
                    Err(e) => warn!(?hook_dir, %e, "failed to parse HOOK.md"),
                }
            }
        }

        Ok(hooks)
    }
}
