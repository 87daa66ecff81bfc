//! Boundary to the platform transport.
//!
//! The live connection to Feishu — HTTP client, tenant token exchange, the
//! long-lived event socket — is owned by the host process. This crate only
//! needs the four calls below, so the transport is injected as a trait
//! object and tests substitute recording fakes.

use std::{path::Path, sync::Arc};

use {async_trait::async_trait, aviary_common::types::MediaKind, tokio::io::AsyncWriteExt};

use crate::{config::FeishuAccountConfig, error::Result, target::AddressMode};

/// Platform calls made by this crate, one transport per started account.
#[async_trait]
pub trait FeishuTransport: Send + Sync {
    /// Create a message. `content` is the JSON-encoded body for `msg_type`
    /// ("text", "interactive", "image", "file"). Returns the platform
    /// message ID.
    async fn create_message(
        &self,
        mode: AddressMode,
        receive_id: &str,
        msg_type: &str,
        content: String,
    ) -> Result<String>;

    /// Patch an existing message's content in place. The message keeps its
    /// identity; only the rendered body changes.
    async fn update_message(&self, message_id: &str, content: String) -> Result<()>;

    /// Download a media resource referenced by a message.
    async fn fetch_media(
        &self,
        message_id: &str,
        key: &str,
        kind: MediaKind,
    ) -> Result<Box<dyn ByteSource>>;

    /// Upload a local file; returns the platform media key (`image_key` or
    /// `file_key` depending on `kind`).
    async fn upload_media(&self, kind: MediaKind, path: &Path) -> Result<String>;
}

/// Builds one transport per started account.
///
/// Injected into [`crate::plugin::FeishuPlugin`] at construction; `connect`
/// must reject malformed credentials rather than deferring the failure to
/// the first send.
pub trait TransportFactory: Send + Sync {
    fn connect(
        &self,
        account_id: &str,
        config: &FeishuAccountConfig,
    ) -> Result<Arc<dyn FeishuTransport>>;
}

/// Narrow byte-source capability.
///
/// The platform returns downloads in several shapes (buffer, stream, writer
/// wrapper); transports normalize all of them to "write yourself to this
/// path" so the media cache never branches on shape.
#[async_trait]
pub trait ByteSource: Send {
    /// Persist the bytes to `dest`, returning the byte count written.
    async fn write_to(self: Box<Self>, dest: &Path) -> std::io::Result<u64>;
}

/// An in-memory byte buffer.
pub struct BufferSource(pub Vec<u8>);

#[async_trait]
impl ByteSource for BufferSource {
    async fn write_to(self: Box<Self>, dest: &Path) -> std::io::Result<u64> {
        tokio::fs::write(dest, &self.0).await?;
        Ok(self.0.len() as u64)
    }
}

/// Any async reader, e.g. a streaming download body.
pub struct ReaderSource<R>(pub R);

#[async_trait]
impl<R> ByteSource for ReaderSource<R>
where
    R: tokio::io::AsyncRead + Send + Unpin + 'static,
{
    async fn write_to(self: Box<Self>, dest: &Path) -> std::io::Result<u64> {
        let mut reader = self.0;
        let mut file = tokio::fs::File::create(dest).await?;
        let written = tokio::io::copy(&mut reader, &mut file).await?;
        file.flush().await?;
        Ok(written)
    }
}
