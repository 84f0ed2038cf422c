//! Error types for chatdesk services

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChatdeskError>;

#[derive(Error, Debug)]
pub enum ChatdeskError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Authorization error: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChatdeskError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::MalformedPayload(_) => 400,
            Self::Forbidden(_) => 403,
            Self::Conflict(_) => 409,
            _ => 500,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Network(_) => "NETWORK_ERROR",
            Self::Provider(_) => "PROVIDER_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::MalformedPayload(_) => "MALFORMED_PAYLOAD",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Conflict(_) => "CONFLICT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<std::io::Error> for ChatdeskError {
    fn from(err: std::io::Error) -> Self {
        ChatdeskError::Network(err.to_string())
    }
}
