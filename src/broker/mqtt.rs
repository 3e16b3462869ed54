//! MQTT Broker Source
//!
//! Subscribes to the configured wildcard topic and forwards matching
//! publishes into the broker feed channel. Connection loss is handled
//! by `rumqttc`'s reconnect-on-poll; the forwarder logs the error,
//! backs off briefly, and resumes. Messages published during the gap
//! are not replayed (at-most-once over disconnections).

use crate::broker::{feed, topic_matches, BrokerFeed, InboundMessage};
use crate::config::BrokerConfig;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Connect to the broker, subscribe, and spawn the forwarder task.
/// Returns the feed the pipeline consumes plus the task handle.
pub async fn spawn_mqtt_source(
    config: &BrokerConfig,
) -> Result<(BrokerFeed, JoinHandle<()>), rumqttc::ClientError> {
    let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
    options.set_keep_alive(Duration::from_secs(30));
    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        options.set_credentials(username, password);
    }

    let (client, mut event_loop) = AsyncClient::new(options, 64);
    client
        .subscribe(&config.topic_pattern, QoS::AtLeastOnce)
        .await?;
    info!(
        host = %config.host,
        port = config.port,
        pattern = %config.topic_pattern,
        "subscribed to broker"
    );

    let (publisher, broker_feed) = feed(1024);
    let pattern = config.topic_pattern.clone();
    let task = tokio::spawn(async move {
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    // The broker filters by subscription, but a shared
                    // session can deliver topics outside the pattern
                    if !topic_matches(&pattern, &publish.topic) {
                        continue;
                    }
                    let message = InboundMessage::new(publish.topic, publish.payload);
                    if publisher.publish(message).await.is_err() {
                        // Pipeline side is gone: nothing left to feed
                        info!("broker feed closed, stopping MQTT source");
                        break;
                    }
                }
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    // Subscriptions do not survive a reconnect
                    info!("broker connection established, subscribing");
                    if let Err(e) = client.subscribe(&pattern, QoS::AtLeastOnce).await {
                        error!(error = %e, "re-subscribe failed");
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "broker connection error, retrying");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
        warn!("MQTT source task exited");
    });

    Ok((broker_feed, task))
}
