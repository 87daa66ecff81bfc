//! Channel plugin system.
//!
//! Each messaging platform (Feishu, Telegram, Slack, ...) implements the
//! ChannelPlugin trait with sub-traits for inbound/outbound messaging,
//! streaming delivery, and health checks. The host gateway owns the
//! concrete [`ChannelEventSink`] that consumes normalized messages.

pub mod error;
pub mod plugin;
pub mod registry;

pub use {
    error::{Error, Result},
    plugin::{
        ChannelEvent, ChannelEventSink, ChannelHealthSnapshot, ChannelMessageMeta, ChannelOutbound,
        ChannelPlugin, ChannelReplyTarget, ChannelStatus, ChannelStreamOutbound, StreamEvent,
        StreamReceiver, StreamSender,
    },
    registry::ChannelRegistry,
};
