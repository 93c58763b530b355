//! Pure health monitoring and reconnection logic for MQTT client
//!
//! This module contains pure functions for reconnection decision making
//! and connection state tracking.

use super::connection::{ConnectionState, ReconnectConfig};
use crate::config::FailurePolicy;
use std::time::Duration;
use tracing::{error, info, warn};

/// Pure health monitoring and reconnection decision logic
pub struct HealthMonitor;

impl HealthMonitor {
    /// Determine if reconnection should be attempted (pure function)
    pub fn should_attempt_reconnection(
        current_attempts: u32,
        config: &ReconnectConfig,
        shutdown_requested: bool,
    ) -> ReconnectionDecision {
        if shutdown_requested {
            return ReconnectionDecision::AbortShutdownRequested;
        }

        if config.policy == FailurePolicy::Terminate {
            return ReconnectionDecision::AbortPolicyTerminate;
        }

        if let Some(max_attempts) = config.max_attempts {
            if current_attempts >= max_attempts {
                return ReconnectionDecision::AbortMaxAttemptsExceeded;
            }
        }

        let attempt = current_attempts.saturating_add(1);
        ReconnectionDecision::Proceed {
            attempt,
            delay_ms: config.calculate_backoff_delay(attempt),
        }
    }

    /// How long `connect` waits for the first CONNACK (pure function)
    ///
    /// With bounded retries the whole backoff budget is added on top of the
    /// base timeout; unlimited retries wait for the base timeout only.
    pub fn calculate_connection_timeout(base: Duration, config: &ReconnectConfig) -> Duration {
        match config.calculate_max_total_time() {
            Some(total_backoff_ms) => base + Duration::from_millis(total_backoff_ms),
            None => base,
        }
    }

    /// Determine next state after connection event (pure function)
    pub fn determine_next_state(
        _current_state: &ConnectionState,
        event: ConnectionEvent,
    ) -> ConnectionState {
        match event {
            ConnectionEvent::ConnAckReceived => ConnectionState::Connected,
            ConnectionEvent::DisconnectedByBroker => {
                ConnectionState::Disconnected("Broker disconnected".to_string())
            }
            ConnectionEvent::NetworkError(error) => ConnectionState::Disconnected(error),
            ConnectionEvent::ClientDisconnected => {
                ConnectionState::Disconnected("Client disconnected".to_string())
            }
            ConnectionEvent::ReconnectionStarted(attempt) => ConnectionState::Reconnecting(attempt),
            ConnectionEvent::PermanentFailure(reason) => {
                ConnectionState::PermanentlyDisconnected(reason)
            }
        }
    }

    /// Check if connection state allows publishing (pure function)
    pub fn can_publish(state: &ConnectionState) -> bool {
        matches!(state, ConnectionState::Connected)
    }

    /// Log connection state transition
    pub fn log_state_transition(from: &ConnectionState, to: &ConnectionState) {
        match (from, to) {
            (ConnectionState::Connecting, ConnectionState::Connected) => {
                info!("MQTT connection established");
            }
            (ConnectionState::Reconnecting(attempt), ConnectionState::Connected) => {
                info!(attempt = *attempt, "MQTT reconnection successful");
            }
            (_, ConnectionState::Disconnected(reason)) => {
                warn!(reason = %reason, "MQTT connection lost");
            }
            (_, ConnectionState::Reconnecting(attempt)) => {
                info!(attempt = *attempt, "Starting MQTT reconnection attempt");
            }
            (_, ConnectionState::PermanentlyDisconnected(reason)) => {
                error!(reason = %reason, "MQTT connection permanently failed");
            }
            _ => {
                info!("MQTT connection state: {:?} -> {:?}", from, to);
            }
        }
    }
}

/// Decision result for reconnection attempts
#[derive(Debug, PartialEq)]
pub enum ReconnectionDecision {
    /// Proceed with reconnection attempt
    Proceed { attempt: u32, delay_ms: u64 },
    /// Abort reconnection - shutdown requested
    AbortShutdownRequested,
    /// Abort reconnection - the failure policy does not reconnect
    AbortPolicyTerminate,
    /// Abort reconnection - max attempts exceeded
    AbortMaxAttemptsExceeded,
}

/// Connection events that trigger state transitions
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// ConnAck received from broker
    ConnAckReceived,
    /// Broker initiated disconnect
    DisconnectedByBroker,
    /// Network or protocol error
    NetworkError(String),
    /// Our own DISCONNECT went out
    ClientDisconnected,
    /// Reconnection attempt started
    ReconnectionStarted(u32),
    /// Permanent failure - no more retries
    PermanentFailure(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retry_config(max_attempts: Option<u32>) -> ReconnectConfig {
        ReconnectConfig {
            policy: FailurePolicy::Retry,
            max_attempts,
            backoff_pattern: vec![25, 50, 100, 250],
            sustained_delay: 250,
        }
    }

    #[test]
    fn test_terminate_policy_never_reconnects() {
        let config = ReconnectConfig::default();
        assert_eq!(
            HealthMonitor::should_attempt_reconnection(0, &config, false),
            ReconnectionDecision::AbortPolicyTerminate
        );
    }

    #[test]
    fn test_shutdown_takes_priority() {
        let config = retry_config(None);
        assert_eq!(
            HealthMonitor::should_attempt_reconnection(0, &config, true),
            ReconnectionDecision::AbortShutdownRequested
        );
        assert_eq!(
            HealthMonitor::should_attempt_reconnection(0, &ReconnectConfig::default(), true),
            ReconnectionDecision::AbortShutdownRequested
        );
    }

    #[test]
    fn test_retry_follows_backoff_pattern() {
        let config = retry_config(None);

        assert_eq!(
            HealthMonitor::should_attempt_reconnection(0, &config, false),
            ReconnectionDecision::Proceed {
                attempt: 1,
                delay_ms: 25
            }
        );
        assert_eq!(
            HealthMonitor::should_attempt_reconnection(2, &config, false),
            ReconnectionDecision::Proceed {
                attempt: 3,
                delay_ms: 100
            }
        );
        assert_eq!(
            HealthMonitor::should_attempt_reconnection(5, &config, false),
            ReconnectionDecision::Proceed {
                attempt: 6,
                delay_ms: 250
            }
        );
    }

    #[test]
    fn test_retry_stops_at_max_attempts() {
        let config = retry_config(Some(5));
        assert!(matches!(
            HealthMonitor::should_attempt_reconnection(4, &config, false),
            ReconnectionDecision::Proceed { attempt: 5, .. }
        ));
        assert_eq!(
            HealthMonitor::should_attempt_reconnection(5, &config, false),
            ReconnectionDecision::AbortMaxAttemptsExceeded
        );
    }

    #[test]
    fn test_calculate_connection_timeout() {
        let base = Duration::from_secs(10);

        assert_eq!(
            HealthMonitor::calculate_connection_timeout(base, &ReconnectConfig::default()),
            base
        );
        assert_eq!(
            HealthMonitor::calculate_connection_timeout(base, &retry_config(None)),
            base
        );
        assert_eq!(
            HealthMonitor::calculate_connection_timeout(base, &retry_config(Some(4))),
            base + Duration::from_millis(25 + 50 + 100 + 250)
        );
    }

    #[test]
    fn test_determine_next_state() {
        let next = HealthMonitor::determine_next_state(
            &ConnectionState::Connecting,
            ConnectionEvent::ConnAckReceived,
        );
        assert_eq!(next, ConnectionState::Connected);

        let next = HealthMonitor::determine_next_state(
            &ConnectionState::Connected,
            ConnectionEvent::DisconnectedByBroker,
        );
        assert_eq!(
            next,
            ConnectionState::Disconnected("Broker disconnected".to_string())
        );

        let next = HealthMonitor::determine_next_state(
            &ConnectionState::Connected,
            ConnectionEvent::NetworkError("connection reset".to_string()),
        );
        assert_eq!(
            next,
            ConnectionState::Disconnected("connection reset".to_string())
        );

        let next = HealthMonitor::determine_next_state(
            &ConnectionState::Connected,
            ConnectionEvent::ClientDisconnected,
        );
        assert_eq!(
            next,
            ConnectionState::Disconnected("Client disconnected".to_string())
        );

        let next = HealthMonitor::determine_next_state(
            &ConnectionState::Disconnected("x".to_string()),
            ConnectionEvent::ReconnectionStarted(2),
        );
        assert_eq!(next, ConnectionState::Reconnecting(2));

        let next = HealthMonitor::determine_next_state(
            &ConnectionState::Disconnected("x".to_string()),
            ConnectionEvent::PermanentFailure("policy".to_string()),
        );
        assert_eq!(
            next,
            ConnectionState::PermanentlyDisconnected("policy".to_string())
        );
    }

    #[test]
    fn test_can_publish() {
        assert!(HealthMonitor::can_publish(&ConnectionState::Connected));
        assert!(!HealthMonitor::can_publish(&ConnectionState::Connecting));
        assert!(!HealthMonitor::can_publish(&ConnectionState::Disconnected(
            "test".to_string()
        )));
        assert!(!HealthMonitor::can_publish(&ConnectionState::Reconnecting(
            1
        )));
        assert!(!HealthMonitor::can_publish(
            &ConnectionState::PermanentlyDisconnected("test".to_string())
        ));
    }
}
