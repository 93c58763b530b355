//! Pure routing of rumqttc event-loop events
//!
//! The supervisor task only needs to know a handful of things about each event:
//! did the session come up, did it go away, or is it noise.

use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::Event;
use rumqttc::Outgoing;

/// Pure routing decisions based on MQTT events
pub struct EventRouter;

impl EventRouter {
    /// Route MQTT event to appropriate handler (pure routing decision)
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(_) => EventRoute::ConnectionAcknowledged,
                Packet::Disconnect(_) => EventRoute::DisconnectedByBroker,
                Packet::PubAck(ack) => EventRoute::PublishAcknowledged { packet_id: ack.pkid },
                Packet::PubComp(comp) => EventRoute::PublishAcknowledged {
                    packet_id: comp.pkid,
                },
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(Outgoing::Disconnect) => EventRoute::ClientDisconnected,
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }
}

/// Routing decisions for MQTT events
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// Connection acknowledged - ready to publish
    ConnectionAcknowledged,
    /// Broker sent DISCONNECT
    DisconnectedByBroker,
    /// Our DISCONNECT was written to the socket
    ClientDisconnected,
    /// QoS 1/2 delivery finished for a packet id
    PublishAcknowledged { packet_id: u16 },
    /// Infrastructure event (PingResp, etc.)
    InfrastructureEvent(String),
    /// Outgoing event (handled automatically)
    OutgoingEvent,
}
