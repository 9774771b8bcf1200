//! The hello node: detection listener, gesture policy and status reporter
//!
//! One `HelloNode` owns the `NodeState` and processes everything serially on
//! a single task:
//! - detection payloads from the bus (decode, update presence, gesture)
//! - a fixed 1 s status tick (status line, stale-stream check, idle wave)
//!
//! A gesture blocks the loop for its settle delay. Payloads that arrive
//! meanwhile wait in the channel; when the loop comes back only the newest one
//! is handled and the older ones are counted as superseded, so the node always
//! acts on the last observed state.

mod handlers;

use crate::domain::types::{NodeState, RobotMode};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::EgressSender;
use crate::services::gesture::GestureController;
use crate::services::loco::SDK_OK;
use anyhow::{anyhow, bail};
use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, MissedTickBehavior};
use tracing::{debug, error, info};

/// Status reporting period
pub const STATUS_INTERVAL: Duration = Duration::from_secs(1);

pub struct HelloNode {
    /// Presence, timestamps and identity
    pub(crate) state: NodeState,
    /// Handshake and wave commands
    pub(crate) gesture: GestureController,
    /// Status line egress
    pub(crate) status_tx: EgressSender,
    pub(crate) metrics: Arc<Metrics>,
    /// Silence after which the detection stream counts as stale
    pub(crate) detection_timeout: Duration,
    /// Wave while nobody is detected
    pub(crate) idle_wave: bool,
    /// Whether the current silence has already been reported
    pub(crate) stale_reported: bool,
    pub(crate) started_at: Instant,
}

impl HelloNode {
    pub fn new(
        config: &Config,
        state: NodeState,
        gesture: GestureController,
        status_tx: EgressSender,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            state,
            gesture,
            status_tx,
            metrics,
            detection_timeout: config.detection_timeout(),
            idle_wave: config.idle_wave(),
            stale_reported: false,
            started_at: Instant::now(),
        }
    }

    pub fn state(&self) -> &NodeState {
        &self.state
    }

    /// Bring the robot up: SDK transport on `network_interface`, then prepare mode.
    ///
    /// A transport that cannot be initialized is fatal. A rejected mode change
    /// is logged and startup continues.
    pub async fn bring_up(&self, domain_id: u32, network_interface: &str) -> anyhow::Result<()> {
        let client = self.gesture.client();
        info!(
            interface = %network_interface,
            domain_id = %domain_id,
            backend = %client.backend_name(),
            "robot_client_initializing"
        );

        let code = client
            .init_channel(domain_id, network_interface)
            .await
            .map_err(|e| anyhow!("failed to initialize sdk channel on {}: {}", network_interface, e))?;
        if code != SDK_OK {
            bail!("sdk channel initialization on {} returned {}", network_interface, code);
        }

        match client.change_mode(RobotMode::Prepare).await {
            Ok(SDK_OK) => info!(mode = %RobotMode::Prepare.as_str(), "robot_mode_set"),
            Ok(code) => error!(code = %code, "robot_prepare_mode_rejected"),
            Err(e) => error!(error = %e, "robot_prepare_mode_failed"),
        }

        Ok(())
    }

    /// Run the node until shutdown or until the payload channel closes
    pub async fn run(
        &mut self,
        mut payload_rx: mpsc::Receiver<Bytes>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let first_tick = tokio::time::Instant::now() + STATUS_INTERVAL;
        let mut status_interval = interval_at(first_tick, STATUS_INTERVAL);
        status_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            hostname = %self.state.hostname,
            version = %self.state.deployment_version,
            idle_wave = %self.idle_wave,
            "hello_node_started"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("node_shutdown");
                        break;
                    }
                }
                payload = payload_rx.recv() => {
                    match payload {
                        Some(raw) => {
                            let latest = self.take_latest(raw, &mut payload_rx);
                            self.on_message(&latest).await;
                        }
                        None => {
                            info!("detection_channel_closed");
                            break;
                        }
                    }
                }
                _ = status_interval.tick() => {
                    self.on_status_tick().await;
                }
            }
        }
    }

    /// Skip past everything already queued behind `first`
    pub(crate) fn take_latest(
        &self,
        first: Bytes,
        payload_rx: &mut mpsc::Receiver<Bytes>,
    ) -> Bytes {
        let mut latest = first;
        let mut skipped = 0u64;
        while let Ok(next) = payload_rx.try_recv() {
            latest = next;
            skipped += 1;
        }
        if skipped > 0 {
            self.metrics.record_messages_superseded(skipped);
            debug!(skipped = %skipped, "detections_superseded");
        }
        latest
    }
}
