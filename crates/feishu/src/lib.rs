//! Feishu (Lark) channel plugin for aviary.
//!
//! Outbound, host markdown is compiled into Feishu interactive cards —
//! including in-place updates for long-running status displays. Inbound,
//! the heterogeneous event payloads (plain text, rich-text "post" trees,
//! media messages, card actions) are normalized into canonical messages,
//! with referenced media resolved into a local cache.

pub mod card;
pub mod config;
pub mod error;
pub mod markdown;
pub mod media;
pub mod target;
pub mod transport;

pub use config::FeishuAccountConfig;
