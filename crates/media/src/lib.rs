//! Media pipeline: download, store, MIME detect, image resize, audio transcription, serve, TTL cleanup.

pub mod cleanup;
pub mod error;
pub mod image_ops;
pub mod mime;
pub mod server;
pub mod store;

pub use error::{Error, Result};
