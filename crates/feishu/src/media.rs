//! Local media cache.
//!
//! Inbound messages reference media by an opaque platform key. The resolver
//! downloads each referenced resource once, keyed by that remote key alone,
//! and hands out local paths. Failures degrade to a path-less [`MediaRef`]
//! so a broken download never aborts normalization of the rest of the
//! message.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    aviary_common::types::{MediaKind, MediaRef},
    tokio::fs,
    tracing::{debug, info, warn},
};

use crate::{
    error::{Context, Result},
    transport::FeishuTransport,
};

/// Default cache root: `~/.aviary/media`, or a relative fallback when the
/// home directory cannot be determined.
#[must_use]
pub fn default_media_root() -> PathBuf {
    dirs_next::home_dir().map_or_else(
        || PathBuf::from(".aviary/media"),
        |home| home.join(".aviary").join("media"),
    )
}

/// Content-addressed media cache for one account.
pub struct MediaResolver {
    root: PathBuf,
    transport: Arc<dyn FeishuTransport>,
}

impl MediaResolver {
    pub fn new(root: impl Into<PathBuf>, transport: Arc<dyn FeishuTransport>) -> Self {
        Self {
            root: root.into(),
            transport,
        }
    }

    /// Resolve a remote media key to a local file.
    ///
    /// The cache path is a function of `remote_key` and `kind` only;
    /// `context_id` (the carrying message's ID) is needed for the platform
    /// download call but never influences the path, so the same key fetched
    /// from two messages shares one cached file. A concurrent double-fetch
    /// of a cold key writes the same bytes to the same destination, which is
    /// why the check-then-write below needs no lock.
    ///
    /// Never fails: on any error the returned ref has no `local_path`.
    pub async fn fetch(&self, remote_key: &str, context_id: &str, kind: MediaKind) -> MediaRef {
        let path = self.cache_path(remote_key, kind);

        if fs::try_exists(&path).await.unwrap_or(false) {
            debug!(remote_key, path = %path.display(), "media cache hit");
            return MediaRef {
                remote_key: remote_key.to_string(),
                kind,
                local_path: Some(path),
                mime_type: None,
            };
        }

        match self.download(remote_key, context_id, kind, &path).await {
            Ok(bytes) => {
                info!(
                    remote_key,
                    context_id,
                    bytes,
                    path = %path.display(),
                    "media downloaded into cache"
                );
                MediaRef {
                    remote_key: remote_key.to_string(),
                    kind,
                    local_path: Some(path),
                    mime_type: None,
                }
            },
            Err(e) => {
                warn!(remote_key, context_id, error = %e, "media download failed");
                MediaRef {
                    remote_key: remote_key.to_string(),
                    kind,
                    local_path: None,
                    mime_type: None,
                }
            },
        }
    }

    async fn download(
        &self,
        remote_key: &str,
        context_id: &str,
        kind: MediaKind,
        dest: &Path,
    ) -> Result<u64> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create media dir {}", parent.display()))?;
        }
        let source = self.transport.fetch_media(context_id, remote_key, kind).await?;
        source
            .write_to(dest)
            .await
            .with_context(|| format!("write media to {}", dest.display()))
    }

    fn cache_path(&self, remote_key: &str, kind: MediaKind) -> PathBuf {
        let (dir, ext) = match kind {
            MediaKind::Image => ("images", "png"),
            MediaKind::Audio => ("audio", "ogg"),
            MediaKind::Other => ("files", "bin"),
        };
        self.root
            .join("feishu")
            .join(dir)
            .join(format!("{}.{ext}", sanitize_key(remote_key)))
    }
}

/// Keys come off the wire; squash anything that could escape the cache dir.
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use {
        super::*,
        crate::{
            error::Error,
            target::AddressMode,
            transport::{BufferSource, ByteSource},
        },
        async_trait::async_trait,
    };

    /// Serves a fixed byte blob, or fails every fetch when `bytes` is None.
    struct FakeTransport {
        bytes: Option<Vec<u8>>,
        fetch_calls: AtomicUsize,
    }

    impl FakeTransport {
        fn serving(bytes: &[u8]) -> Self {
            Self {
                bytes: Some(bytes.to_vec()),
                fetch_calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                bytes: None,
                fetch_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl FeishuTransport for FakeTransport {
        async fn create_message(
            &self,
            _mode: AddressMode,
            _receive_id: &str,
            _msg_type: &str,
            _content: String,
        ) -> Result<String> {
            Err(Error::message("create not expected in media tests"))
        }

        async fn update_message(&self, _message_id: &str, _content: String) -> Result<()> {
            Err(Error::message("update not expected in media tests"))
        }

        async fn fetch_media(
            &self,
            _message_id: &str,
            _key: &str,
            _kind: MediaKind,
        ) -> Result<Box<dyn ByteSource>> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            match &self.bytes {
                Some(b) => Ok(Box::new(BufferSource(b.clone()))),
                None => Err(Error::message("simulated download failure")),
            }
        }

        async fn upload_media(&self, _kind: MediaKind, _path: &Path) -> Result<String> {
            Err(Error::message("upload not expected in media tests"))
        }
    }

    #[tokio::test]
    async fn fetch_downloads_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(FakeTransport::serving(b"png bytes"));
        let resolver =
            MediaResolver::new(dir.path(), transport.clone() as Arc<dyn FeishuTransport>);

        let r = resolver.fetch("img_test_key", "om_1", MediaKind::Image).await;

        let path = r.local_path.expect("download should resolve a path");
        assert_eq!(std::fs::read(&path).unwrap(), b"png bytes");
        assert_eq!(r.remote_key, "img_test_key");
        assert_eq!(transport.fetch_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn second_fetch_is_a_cache_hit() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(FakeTransport::serving(b"bytes"));
        let resolver =
            MediaResolver::new(dir.path(), transport.clone() as Arc<dyn FeishuTransport>);

        let first = resolver.fetch("img_key", "om_1", MediaKind::Image).await;
        let second = resolver.fetch("img_key", "om_2", MediaKind::Image).await;

        assert_eq!(first.local_path, second.local_path);
        assert_eq!(
            transport.fetch_calls.load(Ordering::SeqCst),
            1,
            "second fetch must not hit the network"
        );
    }

    #[tokio::test]
    async fn failed_download_degrades_to_no_path() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(FakeTransport::failing());
        let resolver = MediaResolver::new(dir.path(), transport);

        let r = resolver.fetch("img_key", "om_1", MediaKind::Image).await;

        assert!(r.local_path.is_none());
        assert_eq!(r.remote_key, "img_key");
    }

    #[test]
    fn cache_path_depends_on_key_and_kind_only() {
        let transport = Arc::new(FakeTransport::failing());
        let resolver = MediaResolver::new("/tmp/cache", transport);

        let p = resolver.cache_path("img_v3_abc", MediaKind::Image);
        assert!(p.ends_with("feishu/images/img_v3_abc.png"), "got {p:?}");

        let a = resolver.cache_path("file_x", MediaKind::Audio);
        assert!(a.ends_with("feishu/audio/file_x.ogg"), "got {a:?}");
    }

    #[test]
    fn cache_path_sanitizes_hostile_keys() {
        let transport = Arc::new(FakeTransport::failing());
        let resolver = MediaResolver::new("/tmp/cache", transport);

        let p = resolver.cache_path("../../etc/passwd", MediaKind::Other);
        assert!(p.starts_with("/tmp/cache/feishu/files"), "got {p:?}");
        let name = p.file_name().unwrap().to_string_lossy().into_owned();
        assert!(!name.contains('/'));
        assert_eq!(name, ".._.._etc_passwd.bin");
    }
}
