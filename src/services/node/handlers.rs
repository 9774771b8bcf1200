//! Callback handlers for the HelloNode
//!
//! Each handler runs to completion before the next message or tick is taken.

use super::HelloNode;
use crate::domain::types::parse_detections;
use crate::services::gesture::WaveOutcome;
use std::time::Instant;
use tracing::{debug, error, info, warn};

impl HelloNode {
    /// Handle one detections payload.
    ///
    /// Level-triggered: every decoded batch re-asserts the gesture, open when
    /// a person is present and close otherwise. An undecodable payload leaves
    /// the state untouched and issues no gesture.
    pub async fn on_message(&mut self, raw: &[u8]) {
        let batch = match parse_detections(raw) {
            Ok(batch) => batch,
            Err(e) => {
                self.metrics.record_parse_error();
                error!(error = %e, bytes = %raw.len(), "detection_parse_failed");
                return;
            }
        };

        let person_found = batch.person_found();
        let was_detected = self.state.person_detected;
        self.state.person_detected = person_found;
        self.state.last_detection_time = Some(Instant::now());
        self.metrics.record_batch(person_found);

        if self.stale_reported {
            info!("detections_resumed");
            self.stale_reported = false;
        }

        if person_found != was_detected {
            info!(person_detected = %person_found, "presence_changed");
        }
        debug!(detections = %batch.len(), person_found = %person_found, "detections_processed");

        let result = if person_found {
            self.gesture.trigger().await
        } else {
            self.gesture.cancel().await
        };

        if let Err(e) = result {
            error!(gesture = %e.gesture(), error = %e, "gesture_failed");
        }
    }

    /// Handle the periodic status tick
    pub async fn on_status_tick(&mut self) {
        self.on_status_tick_at(Instant::now()).await;
    }

    pub(crate) async fn on_status_tick_at(&mut self, now: Instant) {
        let line = self.state.status_line();
        if self.status_tx.send_status(line) {
            debug!(person_detected = %self.state.person_detected, "status_queued");
        } else {
            debug!("status_dropped");
        }

        self.check_detection_timeout(now);

        if self.idle_wave && !self.state.person_detected {
            self.idle_wave(now).await;
        }
    }

    /// Report once when the detection stream has gone quiet
    fn check_detection_timeout(&mut self, now: Instant) {
        if self.stale_reported {
            return;
        }

        let silence = self
            .state
            .detection_silence(now)
            .unwrap_or_else(|| now.saturating_duration_since(self.started_at));

        if silence >= self.detection_timeout {
            warn!(
                silence_ms = %silence.as_millis(),
                timeout_ms = %self.detection_timeout.as_millis(),
                ever_received = %self.state.last_detection_time.is_some(),
                "detections_stale"
            );
            self.stale_reported = true;
        }
    }

    async fn idle_wave(&mut self, now: Instant) {
        match self.gesture.wave(&mut self.state, now).await {
            Ok(WaveOutcome::Waved) => {
                info!("idle_wave");
                if let Err(e) = self.gesture.cancel_wave().await {
                    error!(gesture = %e.gesture(), error = %e, "gesture_failed");
                }
            }
            Ok(WaveOutcome::CoolingDown { .. }) => {}
            Err(e) => {
                error!(gesture = %e.gesture(), error = %e, "gesture_failed");
            }
        }
    }
}
