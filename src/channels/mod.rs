//! Delivery channels module
//!
//! This module contains the transport implementations behind the dispatch
//! engine:
//! - Webhook channel (signed HTTP POST)
//! - SMS/voice channel (Twilio REST API)
//!
//! Channels report per-destination outcomes as
//! [`DeliveryResult`](crate::types::DeliveryResult) values; an error from a
//! channel method means the channel itself is unusable, never that one
//! destination failed.

use crate::error::Result;
use async_trait::async_trait;

pub mod sms;
pub mod webhook;

pub use sms::SmsChannel;
pub use webhook::WebhookChannel;

/// Trait that all delivery channels implement
#[async_trait]
pub trait DispatchChannel: Send + Sync + Clone {
    /// Check if the channel is ready to dispatch
    async fn health_check(&self) -> Result<bool>;

    /// Get channel-specific delivery information
    fn channel_info(&self) -> ChannelInfo;
}

/// Information about a delivery channel
#[derive(Debug, Clone)]
pub struct ChannelInfo {
    pub name: String,
    pub description: String,
    pub enabled: bool,
    pub batch_size: usize,
    pub batch_delay_ms: u64,
    pub supports_retry: bool,
}
