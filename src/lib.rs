//! MQTT Ticker
//!
//! Publishes a numbered heartbeat message to an MQTT topic on a fixed period.
//!
//! # Overview
//!
//! - [`protocol`] - outbound message model and topic validation
//! - [`transport`] - transport abstraction and the `rumqttc` client
//! - [`publisher`] - the periodic publisher loop
//! - [`config`] - TOML configuration with CLI/env overrides
//! - [`observability`] - structured logging and publish counters
//!
//! # Quick Start
//!
//! ```rust
//! use mqtt_ticker::protocol::{DeliveryQos, MessageFactory, PayloadTemplate};
//!
//! let factory = MessageFactory::new(
//!     "testing12345/c",
//!     PayloadTemplate::default(),
//!     DeliveryQos::AtMostOnce,
//!     false,
//! )
//! .unwrap();
//!
//! let message = factory.build(0);
//! assert_eq!(message.payload_text(), "hi 0");
//! ```

pub mod config;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod publisher;
pub mod testing;
pub mod transport;

pub use config::{ConfigError, ConfigOverrides, TickerConfig};
pub use error::{TickerError, TickerResult};
pub use protocol::*;
pub use publisher::{PublisherExit, PublisherLoop, PublisherSettings, TickState};
pub use transport::mqtt::MqttClient;
pub use transport::Transport;
