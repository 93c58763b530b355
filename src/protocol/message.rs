//! Outbound message model
//!
//! One [`OutboundMessage`] is created per tick, handed to the transport and
//! dropped after the send attempt.

use super::topics::{validate_publish_topic, ValidationError};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Placeholder replaced by the decimal sequence number
pub const SEQUENCE_PLACEHOLDER: &str = "{sequence}";

/// MQTT delivery guarantee for published messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryQos {
    /// QoS 0
    #[default]
    AtMostOnce,
    /// QoS 1
    AtLeastOnce,
    /// QoS 2
    ExactlyOnce,
}

impl DeliveryQos {
    pub fn level(self) -> u8 {
        match self {
            DeliveryQos::AtMostOnce => 0,
            DeliveryQos::AtLeastOnce => 1,
            DeliveryQos::ExactlyOnce => 2,
        }
    }
}

/// A single message ready to be published
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: Bytes,
    /// Monotonic per-process sequence number, starting at 0
    pub sequence: u64,
    pub qos: DeliveryQos,
    pub retain: bool,
    pub created_at: DateTime<Utc>,
}

impl OutboundMessage {
    /// Payload as text, replacing invalid UTF-8 sequences
    pub fn payload_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Payload template containing a `{sequence}` placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadTemplate(String);

impl PayloadTemplate {
    pub fn parse(template: &str) -> Result<Self, TemplateError> {
        if !template.contains(SEQUENCE_PLACEHOLDER) {
            return Err(TemplateError::MissingPlaceholder(template.to_string()));
        }
        Ok(Self(template.to_string()))
    }

    pub fn render(&self, sequence: u64) -> String {
        self.0.replace(SEQUENCE_PLACEHOLDER, &sequence.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PayloadTemplate {
    fn default() -> Self {
        Self(format!("hi {SEQUENCE_PLACEHOLDER}"))
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TemplateError {
    #[error("Payload template '{0}' must contain the {{sequence}} placeholder")]
    MissingPlaceholder(String),
}

/// Builds the message for a given sequence number
///
/// Topic, template and delivery attributes are fixed for the lifetime of the
/// factory, so only the sequence number varies between ticks.
#[derive(Debug, Clone)]
pub struct MessageFactory {
    topic: String,
    template: PayloadTemplate,
    qos: DeliveryQos,
    retain: bool,
}

impl MessageFactory {
    pub fn new(
        topic: impl Into<String>,
        template: PayloadTemplate,
        qos: DeliveryQos,
        retain: bool,
    ) -> Result<Self, ValidationError> {
        let topic = topic.into();
        validate_publish_topic(&topic)?;
        Ok(Self {
            topic,
            template,
            qos,
            retain,
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn build(&self, sequence: u64) -> OutboundMessage {
        OutboundMessage {
            topic: self.topic.clone(),
            payload: Bytes::from(self.template.render(sequence)),
            sequence,
            qos: self.qos,
            retain: self.retain,
            created_at: Utc::now(),
        }
    }
}
