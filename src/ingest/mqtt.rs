/// MQTT subscription to the Ripple sensor topics
///
/// Connects to the broker, subscribes to `ripple-water`,
/// `ripple-temperature` and `ripple-solar`, and forwards every publish into
/// the pipeline channel stamped with its local receipt time. Payloads are not
/// inspected here.
///
/// Reconnection is left to `rumqttc`: after a connection error the event loop
/// is polled again, which dials the broker anew. Subscriptions are re-issued
/// on every ConnAck because sessions are clean.

use std::sync::mpsc::Sender;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use log::{debug, error, info, warn};
use rumqttc::{Client, Event, MqttOptions, Packet, QoS, Transport};

use crate::config::{BrokerConfig, ConfigError};
use crate::model::Topic;
use crate::pipeline::PipelineEvent;

/// Capacity of the request channel between `Client` and the event loop.
const REQUEST_CAPACITY: usize = 16;

/// Pause after a connection error before polling again.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

// ============================================================================
// Options
// ============================================================================

pub fn mqtt_options(config: &BrokerConfig) -> Result<MqttOptions, ConfigError> {
    let address = config.address()?;
    let mut options = MqttOptions::new(config.client_id.clone(), address.host, address.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));
    options.set_clean_session(true);

    if let Some(username) = &config.username {
        options.set_credentials(username.clone(), config.password.clone().unwrap_or_default());
    }
    if address.tls {
        options.set_transport(Transport::tls_with_default_config());
    }
    Ok(options)
}

/// Channels this service listens on.
pub fn subscribed_channels() -> Vec<&'static str> {
    Topic::ALL.iter().map(|t| t.channel()).collect()
}

fn subscribe_all(client: &Client) {
    for channel in subscribed_channels() {
        match client.try_subscribe(channel, QoS::AtMostOnce) {
            Ok(()) => info!(target: "mqtt", "Subscribed to {}", channel),
            Err(e) => error!(target: "mqtt", "Subscribe to {} failed: {}", channel, e),
        }
    }
}

// ============================================================================
// Event loop
// ============================================================================

/// Runs the subscription until the pipeline stops receiving.
pub fn run_subscription(config: &BrokerConfig, tx: Sender<PipelineEvent>) -> Result<(), ConfigError> {
    let options = mqtt_options(config)?;
    let (client, mut connection) = Client::new(options, REQUEST_CAPACITY);

    for notification in connection.iter() {
        match notification {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!(target: "mqtt", "Connected to MQTT broker");
                subscribe_all(&client);
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                debug!(
                    target: "mqtt",
                    "Message received at {} ({} bytes)",
                    publish.topic,
                    publish.payload.len()
                );
                let event = PipelineEvent::Message {
                    channel: publish.topic,
                    payload: publish.payload.to_vec(),
                    received_at: Utc::now(),
                };
                if tx.send(event).is_err() {
                    info!(target: "mqtt", "Pipeline closed, disconnecting");
                    let _ = client.try_disconnect();
                    return Ok(());
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(target: "mqtt", "MQTT connection error: {}", e);
                thread::sleep(RECONNECT_DELAY);
            }
        }
    }
    Ok(())
}
