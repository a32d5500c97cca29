//! Error types for the AI service layer.

use ff_protocol::ProviderId;
use thiserror::Error;

use crate::credentials::KeyStoreError;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, AiError>;

/// Errors surfaced by the credential store, registry, selection store and dispatcher
#[derive(Debug, Error)]
pub enum AiError {
    /// A model was selected, or a request dispatched, for a provider without an API key
    #[error("API key not configured for {provider}")]
    ProviderNotConfigured {
        /// Provider lacking a credential
        provider: ProviderId,
    },

    /// Generation attempted before any model was selected
    #[error("no AI model selected")]
    NoModelSelected,

    /// Model id not present in the registry
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// Request rejected before dispatch
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Provider returned a non-success status or an unusable body
    #[error("{}", upstream_message(*status, message))]
    Upstream {
        /// HTTP status, when the failure came with one
        status: Option<u16>,
        /// Sanitized description
        message: String,
    },

    /// Transport-level HTTP failure
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Configuration could not be loaded or is invalid
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Filesystem failure while persisting state
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Key store operation failed
    #[error("key store error: {0}")]
    KeyStore(#[from] KeyStoreError),
}

fn upstream_message(status: Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("upstream error ({code}): {message}"),
        None => format!("upstream error: {message}"),
    }
}

impl AiError {
    /// Build an upstream error without a status code
    pub(crate) fn upstream(message: impl Into<String>) -> Self {
        AiError::Upstream {
            status: None,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_not_configured_names_provider() {
        let err = AiError::ProviderNotConfigured {
            provider: ProviderId::Google,
        };
        assert_eq!(err.to_string(), "API key not configured for google");
    }

    #[test]
    fn upstream_display_includes_status() {
        let err = AiError::Upstream {
            status: Some(429),
            message: "rate limited".to_string(),
        };
        assert_eq!(err.to_string(), "upstream error (429): rate limited");
        assert_eq!(
            AiError::upstream("empty body").to_string(),
            "upstream error: empty body"
        );
    }
}
