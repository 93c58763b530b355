//! Error types for the ticker
//!
//! [`TickerError`] is what the publisher loop and the binary deal in. Transport
//! and configuration layers keep their own enums and convert into it.

use thiserror::Error;

/// Main error type for ticker operations
#[derive(Debug, Error)]
pub enum TickerError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] Box<dyn std::error::Error + Send + Sync>),

    #[error("Connection to broker lost before sequence {sequence}: {reason}")]
    ConnectionLost { reason: String, sequence: u64 },

    #[error("Sequence number space exhausted")]
    SequenceExhausted,

    #[error("Invalid message: {message}")]
    InvalidMessage { message: String },
}

impl TickerError {
    /// Create connection lost error
    pub fn connection_lost<S: Into<String>>(reason: S, sequence: u64) -> Self {
        Self::ConnectionLost {
            reason: reason.into(),
            sequence,
        }
    }

    /// Create invalid message error
    pub fn invalid_message<S: Into<String>>(message: S) -> Self {
        Self::InvalidMessage {
            message: message.into(),
        }
    }

    /// Wrap any transport error
    pub fn transport<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport(Box::new(error))
    }

    /// Whether this error ends the process rather than a single tick
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TickerError::ConnectionLost { .. } | TickerError::SequenceExhausted
        )
    }
}

impl From<crate::protocol::ValidationError> for TickerError {
    fn from(error: crate::protocol::ValidationError) -> Self {
        Self::invalid_message(error.to_string())
    }
}

impl From<crate::protocol::TemplateError> for TickerError {
    fn from(error: crate::protocol::TemplateError) -> Self {
        Self::invalid_message(error.to_string())
    }
}

/// Result type for ticker operations
pub type TickerResult<T> = Result<T, TickerError>;
