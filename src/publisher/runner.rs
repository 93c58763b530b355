use super::settings::PublisherSettings;
use crate::error::{TickerError, TickerResult};
use crate::observability::PublisherMetrics;
use crate::protocol::{MessageFactory, OutboundMessage, PayloadTemplate};
use crate::tick_span;
use crate::transport::mqtt::ConnectionState;
use crate::transport::Transport;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn, Instrument};

/// Per-tick state, threaded through [`PublisherLoop::tick`] by value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickState {
    pub next_sequence: u64,
}

/// How a run ended when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublisherExit {
    /// Shutdown was signalled
    Cancelled { ticks: u64 },
    /// `max_messages` ticks were run
    Completed { ticks: u64 },
}

pub struct PublisherLoop<T: Transport> {
    transport: T,
    factory: MessageFactory,
    settings: PublisherSettings,
    metrics: Arc<PublisherMetrics>,
}

impl<T: Transport> PublisherLoop<T> {
    pub fn new(transport: T, settings: PublisherSettings) -> TickerResult<Self> {
        if settings.interval.is_zero() {
            return Err(TickerError::invalid_message(
                "Publish interval must be greater than zero",
            ));
        }
        let template = PayloadTemplate::parse(&settings.payload_template)?;
        let factory = MessageFactory::new(
            settings.topic.clone(),
            template,
            settings.qos,
            settings.retain,
        )?;

        Ok(Self {
            transport,
            factory,
            settings,
            metrics: Arc::new(PublisherMetrics::new()),
        })
    }

    pub fn settings(&self) -> &PublisherSettings {
        &self.settings
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn metrics(&self) -> Arc<PublisherMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Give the transport back for an orderly disconnect
    pub fn into_transport(self) -> T {
        self.transport
    }

    fn connection_lost_reason(&self) -> String {
        match self.transport.connection_state() {
            Some(ConnectionState::PermanentlyDisconnected(reason)) => reason,
            Some(other) => format!("{other:?}"),
            None => "connection never established".to_string(),
        }
    }

    fn echo(&self, message: &OutboundMessage) {
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{}", message.payload_text()) {
            debug!(error = %e, "Failed to echo payload to stdout");
        }
    }

    /// Run a single tick and return the state for the next one
    pub async fn tick(&self, state: TickState) -> TickerResult<TickState> {
        let sequence = state.next_sequence;

        if self.transport.is_permanently_disconnected() {
            return Err(TickerError::connection_lost(
                self.connection_lost_reason(),
                sequence,
            ));
        }

        let message = self.factory.build(sequence);
        self.metrics.tick_started(sequence);

        if self.settings.echo {
            self.echo(&message);
        }

        let started = Instant::now();
        match self.transport.publish(&message).await {
            Ok(()) => {
                self.metrics.message_published(started.elapsed());
                debug!(sequence, topic = %message.topic, "Published message");
            }
            Err(e) => {
                self.metrics.publish_failed();
                warn!(
                    sequence,
                    topic = %message.topic,
                    error = %e,
                    "Publish failed, dropping message"
                );
            }
        }

        let next_sequence = sequence
            .checked_add(1)
            .ok_or(TickerError::SequenceExhausted)?;
        Ok(TickState { next_sequence })
    }

    /// Tick until shutdown, `max_messages`, or a terminal error
    ///
    /// The first tick fires immediately. A dropped shutdown sender means the
    /// run can no longer be cancelled, not that it should stop.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> TickerResult<PublisherExit> {
        let mut interval = tokio::time::interval(self.settings.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut state = TickState::default();
        let mut ticks: u64 = 0;
        let mut shutdown_open = true;

        info!(
            topic = %self.factory.topic(),
            interval_ms = self.settings.interval.as_millis() as u64,
            max_messages = ?self.settings.max_messages,
            "Publisher loop started"
        );

        loop {
            if *shutdown.borrow() {
                info!(ticks, "Shutdown requested, stopping publisher loop");
                return Ok(PublisherExit::Cancelled { ticks });
            }

            if self.settings.max_messages.is_some_and(|max| ticks >= max) {
                info!(ticks, "Message limit reached, stopping publisher loop");
                return Ok(PublisherExit::Completed { ticks });
            }

            tokio::select! {
                biased;

                changed = shutdown.changed(), if shutdown_open => {
                    if changed.is_err() {
                        debug!("Shutdown sender dropped, loop can no longer be cancelled");
                        shutdown_open = false;
                    }
                }

                _ = interval.tick() => {
                    let span = tick_span!(sequence = state.next_sequence);
                    state = self.tick(state).instrument(span).await?;
                    ticks += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use crate::transport::mqtt::ConnectionState;

    fn quiet_settings() -> PublisherSettings {
        PublisherSettings {
            echo: false,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_tick_publishes_and_advances() {
        let transport = MockTransport::connected();
        let publisher = PublisherLoop::new(transport.clone(), quiet_settings()).unwrap();

        let state = publisher.tick(TickState::default()).await.unwrap();
        assert_eq!(state, TickState { next_sequence: 1 });

        let state = publisher.tick(state).await.unwrap();
        assert_eq!(state.next_sequence, 2);

        assert_eq!(
            transport.get_published_payloads().await,
            vec!["hi 0".to_string(), "hi 1".to_string()]
        );
        let published = transport.get_published_messages().await;
        assert!(published
            .iter()
            .all(|p| p.message.topic == "testing12345/c"));
    }

    #[tokio::test]
    async fn test_tick_advances_on_publish_failure() {
        let transport = MockTransport::with_failure();
        let publisher = PublisherLoop::new(transport.clone(), quiet_settings()).unwrap();

        let state = publisher
            .tick(TickState { next_sequence: 5 })
            .await
            .unwrap();
        assert_eq!(state.next_sequence, 6);
        assert_eq!(transport.publish_attempts(), 1);
        assert!(transport.get_published_messages().await.is_empty());

        let metrics = publisher.metrics();
        assert_eq!(metrics.publish_failures(), 1);
        assert_eq!(metrics.messages_published(), 0);
    }

    #[tokio::test]
    async fn test_tick_stops_on_permanent_disconnect() {
        let transport = MockTransport::connected();
        transport.drop_connection("broker closed socket");
        let publisher = PublisherLoop::new(transport.clone(), quiet_settings()).unwrap();

        let err = publisher
            .tick(TickState { next_sequence: 3 })
            .await
            .unwrap_err();
        match err {
            TickerError::ConnectionLost { reason, sequence } => {
                assert_eq!(reason, "broker closed socket");
                assert_eq!(sequence, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(transport.publish_attempts(), 0);
    }

    #[tokio::test]
    async fn test_tick_while_reconnecting_drops_message() {
        let transport = MockTransport::connected();
        transport.set_state(ConnectionState::Reconnecting(1));
        let publisher = PublisherLoop::new(transport.clone(), quiet_settings()).unwrap();

        let state = publisher.tick(TickState::default()).await.unwrap();
        assert_eq!(state.next_sequence, 1);
        assert_eq!(publisher.metrics().publish_failures(), 1);
    }

    #[tokio::test]
    async fn test_sequence_exhaustion() {
        let transport = MockTransport::connected();
        let publisher = PublisherLoop::new(transport.clone(), quiet_settings()).unwrap();

        let result = publisher
            .tick(TickState {
                next_sequence: u64::MAX,
            })
            .await;
        assert!(matches!(result, Err(TickerError::SequenceExhausted)));
        assert_eq!(
            transport.get_published_payloads().await,
            vec![format!("hi {}", u64::MAX)]
        );
    }

    #[test]
    fn test_new_rejects_wildcard_topic() {
        let settings = PublisherSettings {
            topic: "testing/+".to_string(),
            ..quiet_settings()
        };
        let result = PublisherLoop::new(MockTransport::new(), settings);
        assert!(matches!(result, Err(TickerError::InvalidMessage { .. })));
    }

    #[test]
    fn test_new_rejects_zero_interval() {
        let settings = PublisherSettings {
            interval: std::time::Duration::ZERO,
            ..quiet_settings()
        };
        let result = PublisherLoop::new(MockTransport::connected(), settings);
        assert!(matches!(result, Err(TickerError::InvalidMessage { .. })));
    }

    #[test]
    fn test_new_rejects_template_without_placeholder() {
        let settings = PublisherSettings {
            payload_template: "hi".to_string(),
            ..quiet_settings()
        };
        let result = PublisherLoop::new(MockTransport::new(), settings);
        assert!(matches!(result, Err(TickerError::InvalidMessage { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_with_zero_limit_completes_immediately() {
        let transport = MockTransport::connected();
        let settings = PublisherSettings {
            max_messages: Some(0),
            ..quiet_settings()
        };
        let mut publisher = PublisherLoop::new(transport.clone(), settings).unwrap();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let exit = publisher.run(shutdown_rx).await.unwrap();
        assert_eq!(exit, PublisherExit::Completed { ticks: 0 });
        assert_eq!(transport.publish_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_survives_dropped_shutdown_sender() {
        let transport = MockTransport::connected();
        let settings = PublisherSettings {
            max_messages: Some(2),
            ..quiet_settings()
        };
        let mut publisher = PublisherLoop::new(transport.clone(), settings).unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        drop(shutdown_tx);

        let exit = publisher.run(shutdown_rx).await.unwrap();
        assert_eq!(exit, PublisherExit::Completed { ticks: 2 });
    }
}
