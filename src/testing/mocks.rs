//! Mock implementations for testing
//!
//! [`MockTransport`] records every publish together with the (tokio) instant
//! it happened at, so paused-clock tests can assert on spacing.

use crate::protocol::OutboundMessage;
use crate::transport::mqtt::{ConnectionState, MqttError};
use crate::transport::Transport;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// A message the mock accepted, with the instant it was handed over
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub at: Instant,
    pub message: OutboundMessage,
}

/// Mock transport for testing
///
/// Clones share all state, so a test can keep a handle while the publisher
/// loop owns the other.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    pub published_messages: Arc<Mutex<Vec<PublishedMessage>>>,
    publish_attempts: Arc<AtomicU64>,
    state: Arc<std::sync::Mutex<Option<ConnectionState>>>,
    fail_connect: bool,
    fail_all_publishes: bool,
    failing_sequences: Arc<HashSet<u64>>,
    disconnect_after: Option<u64>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport that is already connected
    pub fn connected() -> Self {
        let transport = Self::default();
        transport.set_state(ConnectionState::Connected);
        transport
    }

    /// Every publish fails while the connection stays up
    pub fn with_failure() -> Self {
        Self {
            fail_all_publishes: true,
            ..Self::connected()
        }
    }

    /// `connect` fails and leaves the transport permanently disconnected
    pub fn with_connect_failure() -> Self {
        Self {
            fail_connect: true,
            ..Self::default()
        }
    }

    /// Publishes of these sequence numbers fail
    pub fn with_failing_sequences(mut self, sequences: impl IntoIterator<Item = u64>) -> Self {
        self.failing_sequences = Arc::new(sequences.into_iter().collect());
        self
    }

    /// After `count` publish attempts the broker goes away for good
    pub fn with_disconnect_after(mut self, count: u64) -> Self {
        self.disconnect_after = Some(count);
        self
    }

    pub fn set_state(&self, state: ConnectionState) {
        if let Ok(mut current) = self.state.lock() {
            *current = Some(state);
        }
    }

    /// Simulate the supervisor giving up on the broker
    pub fn drop_connection(&self, reason: &str) {
        self.set_state(ConnectionState::PermanentlyDisconnected(reason.to_string()));
    }

    pub fn publish_attempts(&self) -> u64 {
        self.publish_attempts.load(Ordering::SeqCst)
    }

    pub async fn get_published_messages(&self) -> Vec<PublishedMessage> {
        self.published_messages.lock().await.clone()
    }

    pub async fn get_published_payloads(&self) -> Vec<String> {
        self.published_messages
            .lock()
            .await
            .iter()
            .map(|p| p.message.payload_text().into_owned())
            .collect()
    }

    pub async fn clear_history(&self) {
        self.published_messages.lock().await.clear();
    }

    fn current_state(&self) -> Option<ConnectionState> {
        self.state.lock().ok().and_then(|state| state.clone())
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Error = MqttError;

    async fn connect(&mut self) -> Result<(), Self::Error> {
        if self.fail_connect {
            self.drop_connection("Mock connection failure");
            return Err(MqttError::ConnectionFailedStr(
                "Mock connection failure".to_string(),
            ));
        }
        self.set_state(ConnectionState::Connected);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        if self.is_connected() {
            self.set_state(ConnectionState::Disconnected(
                "Client disconnected".to_string(),
            ));
        }
        Ok(())
    }

    async fn publish(&self, message: &OutboundMessage) -> Result<(), Self::Error> {
        let attempts = self.publish_attempts.fetch_add(1, Ordering::SeqCst) + 1;

        let state = self.current_state();
        if state != Some(ConnectionState::Connected) {
            return Err(MqttError::NotConnected {
                state: state.unwrap_or(ConnectionState::Connecting),
            });
        }

        let result = if self.fail_all_publishes || self.failing_sequences.contains(&message.sequence)
        {
            Err(MqttError::PublishFailed("Mock publish failure".into()))
        } else {
            self.published_messages.lock().await.push(PublishedMessage {
                at: Instant::now(),
                message: message.clone(),
            });
            Ok(())
        };

        if self.disconnect_after == Some(attempts) {
            self.drop_connection("Mock broker went away");
        }

        result
    }

    fn is_connected(&self) -> bool {
        self.current_state() == Some(ConnectionState::Connected)
    }

    fn connection_state(&self) -> Option<ConnectionState> {
        self.current_state()
    }

    fn is_permanently_disconnected(&self) -> bool {
        matches!(
            self.current_state(),
            Some(ConnectionState::PermanentlyDisconnected(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{DeliveryQos, MessageFactory, PayloadTemplate};

    fn factory() -> MessageFactory {
        MessageFactory::new(
            "testing12345/c",
            PayloadTemplate::default(),
            DeliveryQos::AtMostOnce,
            false,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_mock_records_publishes() {
        let mut transport = MockTransport::new();
        assert!(transport.connection_state().is_none());

        transport.connect().await.unwrap();
        transport.publish(&factory().build(0)).await.unwrap();
        transport.publish(&factory().build(1)).await.unwrap();

        assert_eq!(
            transport.get_published_payloads().await,
            vec!["hi 0".to_string(), "hi 1".to_string()]
        );
        assert_eq!(transport.publish_attempts(), 2);
    }

    #[tokio::test]
    async fn test_mock_refuses_publish_before_connect() {
        let transport = MockTransport::new();
        let result = transport.publish(&factory().build(0)).await;
        assert!(matches!(result, Err(MqttError::NotConnected { .. })));
    }

    #[tokio::test]
    async fn test_mock_failing_sequences() {
        let transport = MockTransport::connected().with_failing_sequences([1]);

        assert!(transport.publish(&factory().build(0)).await.is_ok());
        assert!(transport.publish(&factory().build(1)).await.is_err());
        assert!(transport.publish(&factory().build(2)).await.is_ok());
        assert_eq!(transport.get_published_messages().await.len(), 2);
    }

    #[tokio::test]
    async fn test_mock_disconnect_after() {
        let transport = MockTransport::connected().with_disconnect_after(2);

        transport.publish(&factory().build(0)).await.unwrap();
        assert!(!transport.is_permanently_disconnected());
        transport.publish(&factory().build(1)).await.unwrap();
        assert!(transport.is_permanently_disconnected());
    }

    #[tokio::test]
    async fn test_mock_connect_failure() {
        let mut transport = MockTransport::with_connect_failure();
        assert!(transport.connect().await.is_err());
        assert!(transport.is_permanently_disconnected());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let transport = MockTransport::connected();
        let handle = transport.clone();

        handle.drop_connection("gone");
        assert!(transport.is_permanently_disconnected());
    }
}
