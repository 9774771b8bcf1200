//! MQTT publisher for egress messages
//!
//! Publishes node output to MQTT topics for downstream consumers:
//! - status topic - one status line per second (QoS 0, not retained)

use crate::infra::config::Config;
use crate::io::egress_channel::EgressMessage;
use crate::io::mqtt::mqtt_options;
use rumqttc::{AsyncClient, Event, Packet, QoS};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// MQTT publisher actor
///
/// Receives messages from the egress channel and publishes to MQTT topics.
pub struct MqttPublisher {
    client: AsyncClient,
    rx: mpsc::Receiver<EgressMessage>,
    status_topic: String,
}

impl MqttPublisher {
    /// Create a new MQTT publisher
    ///
    /// Connects to the broker at the configured MQTT host/port.
    pub fn new(config: &Config, rx: mpsc::Receiver<EgressMessage>) -> Self {
        let client_id = format!("{}-status-{}", config.mqtt_client_id(), std::process::id());
        let mut mqttoptions = mqtt_options(config, client_id);
        mqttoptions.set_clean_session(true);

        let (client, eventloop) = AsyncClient::new(mqttoptions, 100);

        // Spawn the eventloop handler
        tokio::spawn(async move {
            let mut eventloop = eventloop;
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("mqtt_egress_connected");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "mqtt_egress_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Self { client, rx, status_topic: config.status_topic().to_string() }
    }

    /// Run the publisher loop
    ///
    /// Processes messages from the channel and publishes to MQTT.
    /// Runs until shutdown signal is received or every sender is gone.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(status = %self.status_topic, "mqtt_egress_started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("mqtt_egress_shutdown");
                        while let Ok(msg) = self.rx.try_recv() {
                            self.publish_message(msg).await;
                        }
                        let _ = self.client.disconnect().await;
                        return;
                    }
                }
                msg = self.rx.recv() => {
                    match msg {
                        Some(msg) => self.publish_message(msg).await,
                        None => {
                            info!("mqtt_egress_channel_closed");
                            let _ = self.client.disconnect().await;
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn publish_message(&self, msg: EgressMessage) {
        match msg {
            EgressMessage::Status(text) => {
                // QoS 0: a lost status line is superseded by the next one
                if let Err(e) = self
                    .client
                    .publish(&self.status_topic, QoS::AtMostOnce, false, text.into_bytes())
                    .await
                {
                    debug!(error = %e, "mqtt_egress_status_failed");
                }
            }
        }
    }
}
