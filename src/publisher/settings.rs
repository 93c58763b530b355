use crate::config::PublisherSection;
use crate::protocol::DeliveryQos;
use std::time::Duration;

/// Runtime inputs of the publisher loop
///
/// Topic and template are kept raw and validated by `PublisherLoop::new`.
#[derive(Debug, Clone, PartialEq)]
pub struct PublisherSettings {
    pub topic: String,
    pub payload_template: String,
    pub interval: Duration,
    pub qos: DeliveryQos,
    pub retain: bool,
    pub echo: bool,
    pub max_messages: Option<u64>,
}

impl From<&PublisherSection> for PublisherSettings {
    fn from(section: &PublisherSection) -> Self {
        Self {
            topic: section.topic.clone(),
            payload_template: section.payload_template.clone(),
            interval: section.interval(),
            qos: section.qos,
            retain: section.retain,
            echo: section.echo,
            max_messages: section.max_messages,
        }
    }
}

impl Default for PublisherSettings {
    fn default() -> Self {
        Self::from(&PublisherSection::default())
    }
}
