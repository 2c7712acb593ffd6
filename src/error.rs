//! Error handling for the dispatch engine
//!
//! This module defines all error types that can occur while dispatching
//! notifications and provides utilities for error classification and
//! conversion. Per-destination delivery failures are reported as
//! [`DeliveryResult`](crate::types::DeliveryResult) values rather than
//! errors; `DispatchError` covers construction, configuration, and
//! policy-level failures.

use thiserror::Error;

/// Result type alias for dispatch operations
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Main error type for the dispatch engine
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Webhook channel errors
    #[error("Webhook error: {message}")]
    Webhook { message: String },

    /// SMS/voice channel errors
    #[error("SMS error: {message}")]
    Sms { message: String },

    /// Payload template processing errors
    #[error("Template error: {message}")]
    Template { message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Validation errors
    #[error("Validation error: {field}: {message}")]
    Validation { field: String, message: String },

    /// Timeout errors
    #[error("Operation timed out: {operation}")]
    Timeout { operation: String },

    /// Network/connection errors
    #[error("Network error: {message}")]
    Network { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// External provider errors
    #[error("External service error: {service}: {message}")]
    ExternalService { service: String, message: String },

    /// Dispatch requested through a channel that is disabled in config
    #[error("Channel disabled: {channel}")]
    ChannelDisabled { channel: String },

    /// Internal engine errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DispatchError {
    /// Get the error code for API responses and log fields
    pub fn error_code(&self) -> &'static str {
        match self {
            DispatchError::Webhook { .. } => "WEBHOOK_ERROR",
            DispatchError::Sms { .. } => "SMS_ERROR",
            DispatchError::Template { .. } => "TEMPLATE_ERROR",
            DispatchError::Config { .. } => "CONFIG_ERROR",
            DispatchError::Validation { .. } => "VALIDATION_ERROR",
            DispatchError::Timeout { .. } => "TIMEOUT",
            DispatchError::Network { .. } => "NETWORK_ERROR",
            DispatchError::Serialization { .. } => "SERIALIZATION_ERROR",
            DispatchError::ExternalService { .. } => "EXTERNAL_SERVICE_ERROR",
            DispatchError::ChannelDisabled { .. } => "CHANNEL_DISABLED",
            DispatchError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            DispatchError::Webhook { .. } => true,
            DispatchError::Sms { .. } => true,
            DispatchError::Template { .. } => false,
            DispatchError::Config { .. } => false,
            DispatchError::Validation { .. } => false,
            DispatchError::Timeout { .. } => true,
            DispatchError::Network { .. } => true,
            DispatchError::Serialization { .. } => false,
            DispatchError::ExternalService { .. } => true,
            DispatchError::ChannelDisabled { .. } => false,
            DispatchError::Internal { .. } => true,
        }
    }
}

// Conversion implementations for external error types

impl From<reqwest::Error> for DispatchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DispatchError::Timeout {
                operation: "HTTP request".to_string(),
            }
        } else if err.is_connect() {
            DispatchError::Network {
                message: err.to_string(),
            }
        } else {
            DispatchError::ExternalService {
                service: "HTTP".to_string(),
                message: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        DispatchError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for DispatchError {
    fn from(err: config::ConfigError) -> Self {
        DispatchError::Config {
            message: err.to_string(),
        }
    }
}

// Utility functions for creating specific error types

impl DispatchError {
    /// Create a webhook error
    pub fn webhook<S: Into<String>>(message: S) -> Self {
        Self::Webhook {
            message: message.into(),
        }
    }

    /// Create an SMS error
    pub fn sms<S: Into<String>>(message: S) -> Self {
        Self::Sms {
            message: message.into(),
        }
    }

    /// Create a template error
    pub fn template<S: Into<String>>(message: S) -> Self {
        Self::Template {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation<S1: Into<String>, S2: Into<String>>(field: S1, message: S2) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Create a network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization<S: Into<String>>(message: S) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create an external service error
    pub fn external_service<S1: Into<String>, S2: Into<String>>(service: S1, message: S2) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Create a channel disabled error
    pub fn channel_disabled<S: Into<String>>(channel: S) -> Self {
        Self::ChannelDisabled {
            channel: channel.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}
