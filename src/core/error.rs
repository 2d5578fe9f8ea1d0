use thiserror::Error;

use crate::core::session::SessionId;

/// Prefix of the assistant turn committed in place of a reply when a send fails.
pub const ERROR_MARKER_PREFIX: &str = "⚠️ API error: ";

#[derive(Error, Debug)]
pub enum AuroraError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Cancelled")]
    Cancelled,

    #[error("Missing API key: {0}")]
    MissingApiKey(String),
}

impl ProviderError {
    /// Text shown to the user for this failure.
    pub fn detail(&self) -> String {
        match self {
            ProviderError::Connection(msg) => msg.clone(),
            ProviderError::Api { status, body } => {
                if body.trim().is_empty() {
                    format!("HTTP {status}")
                } else {
                    body.clone()
                }
            }
            ProviderError::Cancelled => "cancelled".into(),
            ProviderError::MissingApiKey(hint) => hint.clone(),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        ProviderError::Connection(e.to_string())
    }
}

/// Content of the assistant turn recorded when a send fails.
pub fn error_marker(error: &ProviderError) -> String {
    format!("{ERROR_MARKER_PREFIX}{}", error.detail())
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Message is empty")]
    EmptyMessage,

    #[error("Network context error: {0}")]
    Runtime(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file error: {0}")]
    File(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
