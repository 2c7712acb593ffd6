//! Configuration module for the dispatch engine
//!
//! This module provides configuration structures and defaults for the
//! delivery channels and retry behavior. Provider credentials and endpoints
//! are always carried here and injected into the channels, never read
//! ambiently at call time, so tests can point the engine at fake backends.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure for the dispatch engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Webhook channel configuration
    pub webhook: WebhookConfig,

    /// SMS/voice channel configuration
    pub sms: SmsConfig,

    /// Retry configuration shared by all channels
    pub retry: RetryConfig,
}

/// Webhook channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub enabled: bool,
    pub timeout_seconds: u64,
    pub verify_ssl: bool,
    pub user_agent: String,
    /// Serialized payloads above this many bytes fail locally, unsent.
    pub max_payload_size: usize,
    /// Destinations dispatched concurrently per chunk.
    pub batch_size: usize,
    /// Pause between chunks. Rate discipline, not a performance knob.
    pub batch_delay_ms: u64,
}

/// SMS/voice channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsConfig {
    pub enabled: bool,
    pub provider: SmsProvider,
    pub twilio: Option<TwilioConfig>,
    pub timeout_seconds: u64,
    pub batch_size: usize,
    pub batch_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmsProvider {
    Twilio,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_phone: String,
    /// Provider API root, overridable so tests can inject a mock server.
    pub api_base_url: String,
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_seconds: 30,
            verify_ssl: true,
            user_agent: "Alert24-Webhook/1.0".to_string(),
            max_payload_size: 1024 * 1024, // 1MB
            batch_size: 10,
            batch_delay_ms: 100,
        }
    }
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            enabled: false, // Disabled by default due to cost
            provider: SmsProvider::Twilio,
            twilio: Some(TwilioConfig::default()),
            timeout_seconds: 30,
            batch_size: 50,
            batch_delay_ms: 1000,
        }
    }
}

impl Default for TwilioConfig {
    fn default() -> Self {
        Self {
            account_sid: std::env::var("TWILIO_ACCOUNT_SID").unwrap_or_default(),
            auth_token: std::env::var("TWILIO_AUTH_TOKEN").unwrap_or_default(),
            from_phone: std::env::var("TWILIO_FROM_PHONE").unwrap_or_default(),
            api_base_url: std::env::var("TWILIO_API_BASE_URL")
                .unwrap_or_else(|_| "https://api.twilio.com".to_string()),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

impl DispatchConfig {
    /// Load configuration from environment variables and config file
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let mut cfg = config::Config::builder();

        // Start with default configuration
        cfg = cfg.add_source(config::Config::try_from(&DispatchConfig::default())?);

        // Add environment variables with prefix
        cfg = cfg.add_source(
            config::Environment::with_prefix("ALERT24")
                .separator("__")
                .try_parsing(true),
        );

        // Add config file if it exists
        if let Ok(config_file) = std::env::var("ALERT24_CONFIG_FILE") {
            cfg = cfg.add_source(config::File::with_name(&config_file).required(false));
        }

        cfg.build()?.try_deserialize()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.webhook.enabled {
            if self.webhook.timeout_seconds == 0 {
                return Err("Webhook timeout must be greater than 0".to_string());
            }
            if self.webhook.max_payload_size == 0 {
                return Err("Webhook max payload size must be greater than 0".to_string());
            }
            if self.webhook.batch_size == 0 {
                return Err("Webhook batch size must be greater than 0".to_string());
            }
        }

        if self.sms.enabled {
            match self.sms.provider {
                SmsProvider::Twilio => {
                    if let Some(ref twilio) = self.sms.twilio {
                        if twilio.account_sid.is_empty() || twilio.auth_token.is_empty() {
                            return Err(
                                "Twilio credentials are required when SMS is enabled".to_string()
                            );
                        }
                        if twilio.from_phone.is_empty() {
                            return Err(
                                "Twilio from phone is required when SMS is enabled".to_string()
                            );
                        }
                    } else {
                        return Err(
                            "Twilio configuration is required when SMS provider is Twilio"
                                .to_string(),
                        );
                    }
                }
            }
            if self.sms.batch_size == 0 {
                return Err("SMS batch size must be greater than 0".to_string());
            }
        }

        if self.retry.max_attempts == 0 {
            return Err("Max retry attempts must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Check if a channel is enabled
    pub fn is_channel_enabled(&self, channel: &str) -> bool {
        match channel {
            "webhook" => self.webhook.enabled,
            "sms" | "voice" => self.sms.enabled,
            _ => false,
        }
    }
}

impl WebhookConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

impl SmsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}
