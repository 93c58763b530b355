//! MQTT client implementation
//!
//! This module separates pure functions from I/O operations.
//!
//! # Architecture
//!
//! - [`connection`] - Pure connection state management and configuration
//! - [`event_router`] - Pure routing of event-loop events
//! - [`health_monitor`] - Pure health monitoring and reconnection logic
//! - [`client`] - Impure I/O operations and coordination
//!
//! # Usage
//!
//! ```rust,no_run
//! use mqtt_ticker::config::MqttSection;
//! use mqtt_ticker::protocol::{DeliveryQos, MessageFactory, PayloadTemplate};
//! use mqtt_ticker::transport::mqtt::MqttClient;
//!
//! # tokio_test::block_on(async {
//! let config = MqttSection {
//!     broker_url: "mqtt://localhost:1883".to_string(),
//!     ..Default::default()
//! };
//!
//! let mut client = MqttClient::new(config)?;
//! client.connect().await?;
//!
//! let factory = MessageFactory::new(
//!     "testing12345/c",
//!     PayloadTemplate::default(),
//!     DeliveryQos::AtMostOnce,
//!     false,
//! )?;
//! client.publish_message(&factory.build(0)).await?;
//! client.disconnect().await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod event_router;
pub mod health_monitor;

pub use client::MqttClient;
pub use connection::{
    build_client_id, configure_mqtt_options, parse_broker_url, BrokerAddress, ConnectionState,
    MqttError, ReconnectConfig,
};
pub use event_router::{EventRoute, EventRouter};
pub use health_monitor::{ConnectionEvent, HealthMonitor, ReconnectionDecision};
