use std::path::PathBuf;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// How streaming responses are delivered.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StreamMode {
    /// Patch a placeholder card in place as tokens arrive.
    #[default]
    EditInPlace,
    /// No streaming — send the final response as a single message.
    Off,
}

/// Configuration for a single Feishu app account.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeishuAccountConfig {
    /// App ID from the Feishu developer console (`cli_...`).
    pub app_id: String,

    /// App secret paired with `app_id`.
    #[serde(serialize_with = "serialize_secret")]
    pub app_secret: Secret<String>,

    /// How streaming responses are delivered.
    pub stream_mode: StreamMode,

    /// Minimum interval between in-place card patches (ms). Feishu rate
    /// limits message patches more aggressively than creates.
    pub edit_throttle_ms: u64,

    /// Characters to accumulate before the first streamed card is created.
    pub min_initial_chars: usize,

    /// Root directory of the local media cache. Defaults to
    /// `~/.aviary/media` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_root: Option<PathBuf>,
}

impl std::fmt::Debug for FeishuAccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeishuAccountConfig")
            .field("app_id", &self.app_id)
            .field("app_secret", &"[REDACTED]")
            .field("stream_mode", &self.stream_mode)
            .finish_non_exhaustive()
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

impl Default for FeishuAccountConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            app_secret: Secret::new(String::new()),
            stream_mode: StreamMode::default(),
            edit_throttle_ms: 1000,
            min_initial_chars: 20,
            media_root: None,
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let cfg = FeishuAccountConfig::default();
        assert!(cfg.app_id.is_empty());
        assert_eq!(cfg.stream_mode, StreamMode::EditInPlace);
        assert_eq!(cfg.edit_throttle_ms, 1000);
        assert_eq!(cfg.min_initial_chars, 20);
        assert!(cfg.media_root.is_none());
    }

    #[test]
    fn deserialize_from_json() {
        let json = r#"{
            "app_id": "cli_a1b2c3",
            "app_secret": "sekrit",
            "stream_mode": "off"
        }"#;
        let cfg: FeishuAccountConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.app_id, "cli_a1b2c3");
        assert_eq!(cfg.app_secret.expose_secret(), "sekrit");
        assert_eq!(cfg.stream_mode, StreamMode::Off);
        // defaults for unspecified fields
        assert_eq!(cfg.edit_throttle_ms, 1000);
    }

    #[test]
    fn serialize_roundtrip() {
        let cfg = FeishuAccountConfig {
            app_id: "cli_x".into(),
            app_secret: Secret::new("tok".into()),
            ..Default::default()
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: FeishuAccountConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg2.app_id, "cli_x");
        assert_eq!(cfg2.app_secret.expose_secret(), "tok");
    }

    #[test]
    fn debug_redacts_app_secret() {
        let cfg = FeishuAccountConfig {
            app_secret: Secret::new("sekrit".into()),
            ..Default::default()
        };
        let debug = format!("{cfg:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("sekrit"));
    }
}
