//! Publish topic and client identifier validation
//!
//! MQTT publish topics are used verbatim: no leading slash is added and
//! separators are not collapsed, because `testing12345/c` and `/testing12345/c`
//! are distinct topics on a broker.

use thiserror::Error;

/// Maximum encoded length of an MQTT topic name
pub const MAX_TOPIC_LEN: usize = 65_535;

/// Validate a topic name for PUBLISH
///
/// Wildcards are only legal in subscription filters, never in a publish topic.
pub fn validate_publish_topic(topic: &str) -> Result<(), ValidationError> {
    if topic.is_empty() {
        return Err(ValidationError::EmptyTopic);
    }

    if topic.len() > MAX_TOPIC_LEN {
        return Err(ValidationError::TopicTooLong(topic.len()));
    }

    for ch in topic.chars() {
        match ch {
            '+' | '#' => return Err(ValidationError::WildcardInTopic(ch)),
            '\0' => return Err(ValidationError::NulInTopic),
            _ => {}
        }
    }

    Ok(())
}

pub fn validate_client_id_prefix(prefix: &str) -> Result<(), ValidationError> {
    if prefix.is_empty() {
        return Err(ValidationError::EmptyClientIdPrefix);
    }

    for ch in prefix.chars() {
        if !ch.is_ascii_alphanumeric() && ch != '.' && ch != '_' && ch != '-' {
            return Err(ValidationError::InvalidClientIdChar(ch));
        }
    }

    Ok(())
}

/// Topic and identifier validation errors
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Topic cannot be empty")]
    EmptyTopic,
    #[error("Topic is {0} bytes, maximum is 65535")]
    TopicTooLong(usize),
    #[error("Topic contains wildcard '{0}', which is not allowed when publishing")]
    WildcardInTopic(char),
    #[error("Topic contains a NUL character")]
    NulInTopic,
    #[error("Client ID prefix cannot be empty")]
    EmptyClientIdPrefix,
    #[error("Client ID prefix contains invalid character: '{0}'")]
    InvalidClientIdChar(char),
}
