//! Impure I/O operations for MQTT client
//!
//! This module handles network communication, async coordination and the
//! integration with the rumqttc client. The rumqttc event loop is owned by a
//! supervisor task; the client only talks to it through watch channels.

use super::connection::{
    configure_mqtt_options, to_mqtt_qos, ConnectionState, MqttError, ReconnectConfig,
};
use super::event_router::{EventRoute, EventRouter};
use super::health_monitor::{ConnectionEvent, HealthMonitor, ReconnectionDecision};
use crate::config::{redact_url, MqttSection};
use crate::mqtt_span;
use crate::protocol::OutboundMessage;
use crate::transport::Transport;
use async_trait::async_trait;
use rumqttc::v5::{AsyncClient, EventLoop};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

/// Capacity of the request channel between `AsyncClient` and the event loop
const REQUEST_CHANNEL_CAPACITY: usize = 10;

/// How long `disconnect` waits for the supervisor to flush DISCONNECT
const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// MQTT publishing client
pub struct MqttClient {
    config: MqttSection,
    client: AsyncClient,
    /// Taken by `connect`; the mutex only keeps the client `Sync`
    event_loop: Mutex<Option<EventLoop>>,
    reconnect_config: ReconnectConfig,
    event_loop_handle: Option<JoinHandle<()>>,
    state_rx: Option<watch::Receiver<ConnectionState>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    connect_time: Option<Instant>,
}

impl MqttClient {
    pub fn new(config: MqttSection) -> Result<Self, MqttError> {
        let mqtt_options = configure_mqtt_options(&config)?;
        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CHANNEL_CAPACITY);

        Ok(MqttClient {
            config,
            client,
            event_loop: Mutex::new(Some(event_loop)),
            reconnect_config: ReconnectConfig::default(),
            event_loop_handle: None,
            state_rx: None,
            shutdown_tx: None,
            connect_time: None,
        })
    }

    /// Replace the failure policy used once connected
    pub fn with_reconnect_config(mut self, reconnect_config: ReconnectConfig) -> Self {
        self.reconnect_config = reconnect_config;
        self
    }

    pub fn reconnect_config(&self) -> &ReconnectConfig {
        &self.reconnect_config
    }

    /// Create connection state and shutdown channels
    #[allow(clippy::type_complexity)]
    fn setup_connection_channels() -> (
        (
            watch::Sender<ConnectionState>,
            watch::Receiver<ConnectionState>,
        ),
        (watch::Sender<bool>, watch::Receiver<bool>),
    ) {
        let state_channels = watch::channel(ConnectionState::Connecting);
        let shutdown_channels = watch::channel(false);
        (state_channels, shutdown_channels)
    }

    /// Wait for connection confirmation (ConnAck) with timeout
    ///
    /// Transient `Disconnected`/`Reconnecting` states are waited through, so
    /// with a retry policy the deadline is what bounds the wait.
    async fn wait_for_connection_confirmation(
        mut state_rx: watch::Receiver<ConnectionState>,
        timeout: Duration,
    ) -> Result<(), MqttError> {
        let timeout_result = tokio::time::timeout(timeout, async {
            loop {
                let outcome = match &*state_rx.borrow_and_update() {
                    ConnectionState::Connected => Some(Ok(())),
                    ConnectionState::PermanentlyDisconnected(reason) => {
                        Some(Err(MqttError::ConnectionFailedStr(reason.clone())))
                    }
                    _ => None,
                };
                if let Some(outcome) = outcome {
                    return outcome;
                }

                if state_rx.changed().await.is_err() {
                    return Err(MqttError::ConnectionFailedStr(
                        "State channel closed".to_string(),
                    ));
                }
            }
        })
        .await;

        match timeout_result {
            Ok(result) => result,
            Err(_) => Err(MqttError::ConnectionFailedStr(
                "ConnAck timeout - no connection confirmation received".to_string(),
            )),
        }
    }

    /// Connect to the broker and wait for CONNACK
    pub async fn connect(&mut self) -> Result<(), MqttError> {
        let event_loop = self
            .event_loop
            .get_mut()
            .map_err(|_| {
                MqttError::ConnectionFailedStr("Event loop lock poisoned".to_string())
            })?
            .take()
            .ok_or_else(|| {
                MqttError::ConnectionFailedStr("Event loop already started".to_string())
            })?;

        let ((state_tx, state_rx), (shutdown_tx, shutdown_rx)) =
            Self::setup_connection_channels();
        self.state_rx = Some(state_rx.clone());
        self.shutdown_tx = Some(shutdown_tx);

        info!(
            broker = %redact_url(&self.config.broker_url),
            policy = ?self.reconnect_config.policy,
            "Connecting to MQTT broker"
        );

        let supervisor = EventLoopSupervisor {
            event_loop,
            state_tx,
            shutdown_rx,
            reconnect_config: self.reconnect_config.clone(),
            reconnect_attempts: 0,
        };
        self.event_loop_handle = Some(tokio::spawn(supervisor.run()));

        let connection_timeout = HealthMonitor::calculate_connection_timeout(
            self.config.connect_timeout(),
            &self.reconnect_config,
        );
        Self::wait_for_connection_confirmation(state_rx, connection_timeout)
            .instrument(mqtt_span!(operation = "connect"))
            .await?;

        self.connect_time = Some(Instant::now());
        Ok(())
    }

    fn signal_shutdown(&self) {
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(true);
        }
    }

    /// Send DISCONNECT and stop the supervisor
    ///
    /// Best effort: a session that is already gone is not an error.
    pub async fn disconnect(&mut self) -> Result<(), MqttError> {
        let was_connected = self.is_connected();

        if was_connected {
            if let Err(e) = self.client.disconnect().await {
                warn!(error = %e, "Failed to send DISCONNECT, stopping event loop anyway");
                self.signal_shutdown();
            }
        } else {
            self.signal_shutdown();
        }

        if let Some(mut handle) = self.event_loop_handle.take() {
            match tokio::time::timeout(GRACEFUL_SHUTDOWN_TIMEOUT, &mut handle).await {
                Ok(Ok(())) => {
                    debug!("Event loop supervisor shut down gracefully");
                }
                Ok(Err(e)) if !e.is_cancelled() => {
                    warn!(error = %e, "Event loop supervisor ended with error");
                }
                Ok(Err(_)) => {}
                Err(_) => {
                    warn!("Event loop supervisor didn't shut down gracefully, forcing abort");
                    self.signal_shutdown();
                    handle.abort();
                }
            }
        }

        self.signal_shutdown();
        info!("MQTT client disconnected");
        Ok(())
    }

    /// Get current connection state
    /// Returns None if connection hasn't been attempted yet
    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.state_rx.as_ref().map(|rx| rx.borrow().clone())
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.connection_state(), Some(ConnectionState::Connected))
    }

    pub fn is_permanently_disconnected(&self) -> bool {
        matches!(
            self.connection_state(),
            Some(ConnectionState::PermanentlyDisconnected(_))
        )
    }

    /// Time since the first successful CONNACK
    pub fn uptime(&self) -> Option<Duration> {
        self.connect_time.map(|t| t.elapsed())
    }

    /// Check connection state before operations
    fn check_connection_state(&self) -> Result<(), MqttError> {
        let state_rx = self.state_rx.as_ref().ok_or_else(|| {
            MqttError::ConnectionFailedStr("Client not connected: connect() was never called".to_string())
        })?;

        let current_state = state_rx.borrow().clone();
        if !HealthMonitor::can_publish(&current_state) {
            return Err(MqttError::NotConnected {
                state: current_state,
            });
        }

        Ok(())
    }

    /// Enqueue a PUBLISH for the message
    ///
    /// Returns once the request is handed to the event loop; broker
    /// acknowledgements are not awaited.
    pub async fn publish_message(&self, message: &OutboundMessage) -> Result<(), MqttError> {
        self.check_connection_state()?;

        self.client
            .publish(
                message.topic.clone(),
                to_mqtt_qos(message.qos),
                message.retain,
                message.payload.clone(),
            )
            .await
            .map_err(|e| MqttError::PublishFailed(Box::new(e)))?;

        debug!(
            topic = %message.topic,
            sequence = message.sequence,
            qos = message.qos.level(),
            retain = message.retain,
            "Enqueued PUBLISH"
        );
        Ok(())
    }
}

/// Owns the rumqttc event loop and turns its events into connection states
struct EventLoopSupervisor {
    event_loop: EventLoop,
    state_tx: watch::Sender<ConnectionState>,
    shutdown_rx: watch::Receiver<bool>,
    reconnect_config: ReconnectConfig,
    reconnect_attempts: u32,
}

impl EventLoopSupervisor {
    async fn run(mut self) {
        debug!("Starting MQTT event loop supervisor");

        loop {
            tokio::select! {
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        debug!("Shutdown signal received, stopping event loop supervisor");
                        break;
                    }
                }

                event_result = self.event_loop.poll() => {
                    let keep_running = match event_result {
                        Ok(event) => {
                            let route = EventRouter::route_mqtt_event(&event);
                            self.process_event_route(route).await
                        }
                        Err(e) => {
                            self.handle_connection_loss(ConnectionEvent::NetworkError(e.to_string()))
                                .await
                        }
                    };
                    if !keep_running {
                        break;
                    }
                }
            }
        }

        debug!("MQTT event loop supervisor stopped");
    }

    /// Returns true to continue loop, false to break
    async fn process_event_route(&mut self, route: EventRoute) -> bool {
        match route {
            EventRoute::ConnectionAcknowledged => {
                self.transition(ConnectionEvent::ConnAckReceived);
                self.reconnect_attempts = 0;
                true
            }
            EventRoute::DisconnectedByBroker => {
                self.handle_connection_loss(ConnectionEvent::DisconnectedByBroker)
                    .await
            }
            EventRoute::ClientDisconnected => {
                self.transition(ConnectionEvent::ClientDisconnected);
                false
            }
            EventRoute::PublishAcknowledged { packet_id } => {
                debug!(target: "mqtt_transport", packet_id, "Publish acknowledged");
                true
            }
            EventRoute::InfrastructureEvent(event_str) => {
                debug!(target: "mqtt_transport", "MQTT event: {}", event_str);
                true
            }
            EventRoute::OutgoingEvent => true,
        }
    }

    fn transition(&self, event: ConnectionEvent) {
        let current = self.state_tx.borrow().clone();
        let next = HealthMonitor::determine_next_state(&current, event);
        HealthMonitor::log_state_transition(&current, &next);
        self.state_tx.send_replace(next);
    }

    fn last_disconnect_reason(&self) -> String {
        match &*self.state_tx.borrow() {
            ConnectionState::Disconnected(reason) => reason.clone(),
            other => format!("{other:?}"),
        }
    }

    /// Apply the failure policy after the session went away
    /// Returns true to keep polling (which makes rumqttc reconnect)
    async fn handle_connection_loss(&mut self, event: ConnectionEvent) -> bool {
        self.transition(event);

        let decision = HealthMonitor::should_attempt_reconnection(
            self.reconnect_attempts,
            &self.reconnect_config,
            *self.shutdown_rx.borrow(),
        );

        match decision {
            ReconnectionDecision::Proceed { attempt, delay_ms } => {
                self.reconnect_attempts = attempt;
                self.transition(ConnectionEvent::ReconnectionStarted(attempt));

                let max_display = self
                    .reconnect_config
                    .max_attempts
                    .map_or("∞".to_string(), |max| max.to_string());
                info!(
                    "Attempting reconnection {}/{} after {}ms delay",
                    attempt, max_display, delay_ms
                );

                interruptible_sleep(self.shutdown_rx.clone(), delay_ms).await
            }
            ReconnectionDecision::AbortShutdownRequested => {
                info!("Shutdown signal received, stopping reconnection");
                false
            }
            ReconnectionDecision::AbortPolicyTerminate => {
                let reason = self.last_disconnect_reason();
                self.transition(ConnectionEvent::PermanentFailure(reason));
                false
            }
            ReconnectionDecision::AbortMaxAttemptsExceeded => {
                let reason = format!(
                    "Max reconnection attempts ({}) exceeded: {}",
                    self.reconnect_attempts,
                    self.last_disconnect_reason()
                );
                self.transition(ConnectionEvent::PermanentFailure(reason));
                false
            }
        }
    }
}

/// Perform interruptible sleep with shutdown monitoring
/// Returns true if sleep completed, false if shutdown requested
async fn interruptible_sleep(mut shutdown_rx: watch::Receiver<bool>, delay_ms: u64) -> bool {
    tokio::select! {
        changed = shutdown_rx.changed() => {
            if changed.is_err() || *shutdown_rx.borrow() {
                info!("Shutdown signal received during reconnection delay, stopping");
                return false;
            }
            true
        }
        _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {
            true
        }
    }
}

#[async_trait]
impl Transport for MqttClient {
    type Error = MqttError;

    async fn connect(&mut self) -> Result<(), Self::Error> {
        MqttClient::connect(self).await
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        MqttClient::disconnect(self).await
    }

    async fn publish(&self, message: &OutboundMessage) -> Result<(), Self::Error> {
        self.publish_message(message).await
    }

    fn is_connected(&self) -> bool {
        MqttClient::is_connected(self)
    }

    fn connection_state(&self) -> Option<ConnectionState> {
        MqttClient::connection_state(self)
    }

    fn is_permanently_disconnected(&self) -> bool {
        MqttClient::is_permanently_disconnected(self)
    }
}

impl Drop for MqttClient {
    fn drop(&mut self) {
        self.signal_shutdown();

        if let Some(handle) = self.event_loop_handle.take() {
            handle.abort();
        }
    }
}
