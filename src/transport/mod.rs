//! Transport layer for publishing ticks
//!
//! This module provides the transport abstraction and its MQTT implementation.

use crate::protocol::OutboundMessage;

pub mod mqtt;

/// Transport trait for outbound messages
///
/// This trait provides an abstraction over the broker connection so the
/// publisher loop can be driven by a mock in tests.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Connect to the broker and wait for the session to be acknowledged
    async fn connect(&mut self) -> Result<(), Self::Error>;

    /// Disconnect from the broker
    async fn disconnect(&mut self) -> Result<(), Self::Error>;

    /// Hand a message to the transport without waiting for delivery
    async fn publish(&self, message: &OutboundMessage) -> Result<(), Self::Error>;

    /// Check if transport is currently connected
    fn is_connected(&self) -> bool;

    /// Get current connection state
    fn connection_state(&self) -> Option<crate::transport::mqtt::ConnectionState>;

    /// Check if the connection is permanently disconnected
    fn is_permanently_disconnected(&self) -> bool;
}
