use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Conversation flavor, normalized across platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    Dm,
    Group,
    Channel,
}

/// Outbound reply payload: text plus optional media.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplyPayload {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<ReplyMedia>,
}

/// Media attached to a reply. `url` may be a local file path or a remote URL;
/// channel adapters document which forms they accept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyMedia {
    pub url: String,
    pub mime_type: String,
}

/// Normalized inbound message handed to the host dispatch pipeline.
///
/// `text` and `media_refs` are never both empty: normalizers drop such
/// events before they reach this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalMessage {
    pub text: String,
    pub media_refs: Vec<MediaRef>,
    pub sender_id: String,
    pub conversation_id: String,
}

/// Pointer to a remote binary resource plus, once resolved, its cached local
/// copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub remote_key: String,
    pub kind: MediaKind,
    /// Absent when the download failed. Callers treat this as "unavailable",
    /// not as an error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Audio,
    Other,
}

impl MediaKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Other => "other",
        }
    }
}
