//! Embedded MQTT broker using rumqttd
//!
//! Lets the node run standalone on a robot without a broker on the network.
//! Sized for a handful of local clients: the detector, this node and a
//! monitoring tool or two.

use crate::infra::config::Config as AppConfig;
use rumqttd::{Broker, Config, ConnectionSettings, RouterConfig, ServerSettings};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

/// `max_payload_size` caps every packet a client may send, so it follows the
/// clients' `[mqtt] max_packet_size`.
fn broker_config(listen: SocketAddr, max_payload_size: usize) -> Config {
    let router = RouterConfig {
        max_segment_size: 16 * 1024 * 1024,
        max_segment_count: 4,
        max_connections: 32,
        max_outgoing_packet_count: 200,
        initialized_filters: None,
        ..Default::default()
    };

    let mut servers = HashMap::new();
    servers.insert(
        "v4".to_string(),
        ServerSettings {
            name: "v4".to_string(),
            listen,
            tls: None,
            next_connection_delay_ms: 1,
            connections: ConnectionSettings {
                connection_timeout_ms: 5000,
                max_payload_size,
                max_inflight_count: 100,
                auth: None,
                dynamic_filters: false,
                external_auth: None,
            },
        },
    );

    Config {
        id: 0,
        router,
        v4: Some(servers),
        v5: None,
        ws: None,
        prometheus: None,
        metrics: None,
        bridge: None,
        console: None,
        cluster: None,
    }
}

/// Start the embedded broker on its own thread
///
/// Returns an error when the bind address is invalid or the thread cannot be
/// spawned. A broker that fails after startup only logs.
pub fn start_embedded_broker(app_config: &AppConfig) -> anyhow::Result<()> {
    let addr_str = format!("{}:{}", app_config.broker_bind_address(), app_config.broker_port());
    let listen: SocketAddr = addr_str
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid broker bind address {}: {}", addr_str, e))?;

    let config = broker_config(listen, app_config.mqtt_max_packet_size());
    thread::Builder::new().name("mqtt-broker".to_string()).spawn(move || {
        let mut broker = Broker::new(config);
        // start() blocks for the lifetime of the broker
        if let Err(e) = broker.start() {
            warn!(error = %e, "broker_start_failed");
        }
    })?;

    // Let the listener bind before local clients connect
    thread::sleep(Duration::from_millis(100));
    info!(listen = %listen, "broker_started");
    Ok(())
}
