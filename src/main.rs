//! Hello robot node
//!
//! Listens for perception detections on the bus and has the humanoid offer a
//! handshake while a person is in view. Publishes a one-line status every
//! second.
//!
//! Module structure:
//! - `domain/` - Detection payloads, gesture vocabulary, node state
//! - `io/` - External interfaces (MQTT ingress/egress, SDK bridge, Prometheus)
//! - `services/` - Node loop, gesture controller, SDK client seam
//! - `infra/` - Infrastructure (Config, Identity, Metrics, Broker)

use clap::Parser;
use hello_robot::domain::NodeState;
use hello_robot::infra::config::{resolve_network_interface, NETWORK_INTERFACE_ENV};
use hello_robot::infra::identity::{deployment_version, hostname};
use hello_robot::infra::{Config, LogFormat, Metrics, RobotBackend};
use hello_robot::io::{create_egress_channel, HttpLocoClient, MqttPublisher};
use hello_robot::services::{GestureController, HelloNode, LocoClient, SimLocoClient};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Hello robot - handshake on person detection
#[derive(Parser, Debug)]
#[command(name = "hello-robot", version, about)]
struct Args {
    /// Network interface for the motion SDK transport
    /// (falls back to $ROBOT_NETWORK_INTERFACE, then eth0)
    network_interface: Option<String>,

    /// Path to TOML configuration file (falls back to $CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,
}

/// Detection payloads buffered while a gesture settles
const PAYLOAD_QUEUE: usize = 64;
/// Status lines buffered for the publisher
const STATUS_QUEUE: usize = 16;

fn init_logging(format: LogFormat) {
    // Default: INFO, use RUST_LOG=debug for per-message visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn build_client(config: &Config) -> anyhow::Result<Arc<dyn LocoClient>> {
    Ok(match config.robot_backend() {
        RobotBackend::Sim => Arc::new(SimLocoClient::new()),
        RobotBackend::Http => Arc::new(HttpLocoClient::new(config)?),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config_path = Config::resolve_config_path(args.config.as_deref());
    // Report load failures once logging is up
    let (config, load_error) = match Config::from_file(&config_path) {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };
    init_logging(config.log_format());
    if let Some(e) = load_error {
        warn!(path = %config_path, error = %format!("{:#}", e), "config_load_failed_using_defaults");
    }

    info!(git_hash = %env!("GIT_HASH"), "hello-robot starting");

    let env_interface = std::env::var(NETWORK_INTERFACE_ENV).ok();
    let network_interface =
        resolve_network_interface(args.network_interface.as_deref(), env_interface.as_deref());

    info!(
        config_file = %config.config_file(),
        mqtt_host = %config.mqtt_host(),
        mqtt_port = %config.mqtt_port(),
        mqtt_max_packet_size = %config.mqtt_max_packet_size(),
        detections_topic = %config.detections_topic(),
        status_topic = %config.status_topic(),
        robot_backend = ?config.robot_backend(),
        network_interface = %network_interface,
        settle_ms = %config.gesture_settle_ms(),
        idle_wave = %config.idle_wave(),
        prometheus_port = %config.prometheus_port(),
        "config_loaded"
    );

    if config.broker_enabled() {
        hello_robot::infra::broker::start_embedded_broker(&config)?;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());

    let client = build_client(&config)?;
    let gesture = GestureController::new(client, &config, metrics.clone());

    let state = NodeState::new(hostname(), deployment_version(&config.version_file_path()));
    let robot_name = state.hostname.clone();

    // Status egress
    let (status_tx, status_rx) = create_egress_channel(STATUS_QUEUE, metrics.clone());
    let publisher = MqttPublisher::new(&config, status_rx);
    let publisher_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        publisher.run(publisher_shutdown).await;
    });

    let mut node = HelloNode::new(&config, state, gesture, status_tx, metrics.clone());
    if let Err(e) = node.bring_up(config.robot_domain_id(), &network_interface).await {
        error!(error = %e, "robot_bring_up_failed");
        let _ = shutdown_tx.send(true);
        return Err(e);
    }

    // Detection ingress (bounded; drops are counted while a gesture settles)
    let (payload_tx, payload_rx) = mpsc::channel(PAYLOAD_QUEUE);
    let mqtt_config = config.clone();
    let mqtt_metrics = metrics.clone();
    let mqtt_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) = hello_robot::io::mqtt::start_mqtt_client(
            &mqtt_config,
            payload_tx,
            mqtt_metrics,
            mqtt_shutdown,
        )
        .await
        {
            error!(error = %e, "MQTT client error");
        }
    });

    // Start Prometheus metrics HTTP server (if port > 0)
    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let prom_metrics = metrics.clone();
        let prom_shutdown = shutdown_rx.clone();
        let prom_robot = robot_name.clone();
        tokio::spawn(async move {
            if let Err(e) = hello_robot::io::prometheus::start_metrics_server(
                prometheus_port,
                prom_metrics,
                prom_robot,
                prom_shutdown,
            )
            .await
            {
                error!(error = %e, "Prometheus metrics server error");
            }
        });
    } else {
        // The scrape endpoint owns report() when enabled
        let metrics_clone = metrics.clone();
        let metrics_interval = config.metrics_interval_secs().max(1);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
            interval.tick().await;
            loop {
                interval.tick().await;
                metrics_clone.report().log();
            }
        });
    }

    // Handle shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx;
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    node.run(payload_rx, shutdown_rx).await;

    // Give the publisher a moment to flush and disconnect
    tokio::time::sleep(Duration::from_millis(100)).await;
    info!(robot = %robot_name, "hello-robot shutdown complete");
    Ok(())
}
