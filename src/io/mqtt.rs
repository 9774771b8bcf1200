//! MQTT client for receiving detection batches
//!
//! Payloads are forwarded undecoded to the node task; decoding happens on the
//! node so that parse failures are handled next to the state they protect.

use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use bytes::Bytes;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Connection options shared by the ingress and egress clients
///
/// The packet limit applies both ways. rumqttc's own default of 10 KiB would
/// silently cut off large detection batches.
pub fn mqtt_options(config: &Config, client_id: impl Into<String>) -> MqttOptions {
    let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
    mqttoptions.set_keep_alive(Duration::from_secs(30));
    mqttoptions.set_max_packet_size(config.mqtt_max_packet_size(), config.mqtt_max_packet_size());

    // Set credentials if configured
    if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
        mqttoptions.set_credentials(username, password);
    }
    mqttoptions
}

/// Start the MQTT client and send raw detection payloads to the channel
///
/// Payloads are sent via try_send to avoid blocking the MQTT eventloop while
/// the node is busy with a gesture. Dropped payloads are counted in metrics
/// and logged (rate-limited).
pub async fn start_mqtt_client(
    config: &Config,
    payload_tx: mpsc::Sender<Bytes>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mqttoptions = mqtt_options(config, config.mqtt_client_id());
    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);
    let topic = config.detections_topic().to_string();

    info!(topic = %topic, host = %config.mqtt_host(), port = %config.mqtt_port(), "MQTT client starting");

    // Rate-limit drop warnings to 1 per second
    let mut last_drop_warn = Instant::now() - Duration::from_secs(2);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("mqtt_shutdown");
                    let _ = client.disconnect().await;
                    return Ok(());
                }
            }
            result = eventloop.poll() => {
                match result {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        debug!(topic = %publish.topic, bytes = %publish.payload.len(), "detections_received");
                        metrics.record_message_received();

                        match payload_tx.try_send(publish.payload) {
                            Ok(()) => {}
                            Err(TrySendError::Full(_)) => {
                                metrics.record_message_dropped();
                                if last_drop_warn.elapsed() > Duration::from_secs(1) {
                                    warn!("detections_dropped: node queue full");
                                    last_drop_warn = Instant::now();
                                }
                            }
                            Err(TrySendError::Closed(_)) => {
                                warn!("Detection channel closed");
                                let _ = client.disconnect().await;
                                return Ok(());
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        // Clean sessions drop subscriptions, so every ConnAck subscribes
                        info!(topic = %topic, "MQTT connected, subscribing");
                        if let Err(e) = client.try_subscribe(&topic, QoS::AtMostOnce) {
                            warn!(error = %e, "mqtt_subscribe_failed");
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "MQTT error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_lift_packet_limit() {
        let options = mqtt_options(&Config::default(), "hello-test");

        assert_eq!(options.max_packet_size(), crate::infra::config::DEFAULT_MAX_PACKET_SIZE);
        assert!(options.max_packet_size() > 10 * 1024);
        assert_eq!(options.keep_alive(), Duration::from_secs(30));
    }

    #[test]
    fn test_options_follow_configured_packet_limit() {
        let config = Config::from_toml_str(
            "[mqtt]\nmax_packet_size = 262144\nusername = \"robot\"\npassword = \"pw\"\n",
            "inline".to_string(),
        )
        .unwrap();

        let options = mqtt_options(&config, "hello-test");

        assert_eq!(options.max_packet_size(), 262_144);
        assert_eq!(options.client_id(), "hello-test");
        assert!(options.credentials().is_some());
    }
}
