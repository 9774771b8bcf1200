//! Hand gestures via the locomotion SDK
//!
//! Every gesture is a single SDK call followed by a blocking settle delay.
//! There is no retry and no rollback: a rejected or failed call is returned
//! to the caller, which logs it and moves on.

use crate::domain::types::{GestureKind, NodeState};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::services::loco::{LocoClient, SdkError, SDK_OK};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum GestureError {
    #[error("{gesture} rejected by sdk with code {code}")]
    Rejected { gesture: GestureKind, code: i32 },
    #[error("{gesture} failed: {source}")]
    Sdk {
        gesture: GestureKind,
        #[source]
        source: SdkError,
    },
}

impl GestureError {
    pub fn gesture(&self) -> GestureKind {
        match self {
            GestureError::Rejected { gesture, .. } | GestureError::Sdk { gesture, .. } => *gesture,
        }
    }
}

/// Result of a wave request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveOutcome {
    Waved,
    /// Skipped, the previous wave is too recent
    CoolingDown { remaining: Duration },
}

pub struct GestureController {
    client: Arc<dyn LocoClient>,
    settle: Duration,
    wave_cooldown: Duration,
    metrics: Arc<Metrics>,
}

impl GestureController {
    pub fn new(client: Arc<dyn LocoClient>, config: &Config, metrics: Arc<Metrics>) -> Self {
        Self {
            client,
            settle: Duration::from_millis(config.gesture_settle_ms()),
            wave_cooldown: config.wave_cooldown(),
            metrics,
        }
    }

    pub fn client(&self) -> &Arc<dyn LocoClient> {
        &self.client
    }

    /// Open the hand for a handshake
    pub async fn trigger(&self) -> Result<(), GestureError> {
        self.perform(GestureKind::Handshake).await
    }

    /// Close the handshake hand
    pub async fn cancel(&self) -> Result<(), GestureError> {
        self.perform(GestureKind::CancelHandshake).await
    }

    /// Wave, unless the previous wave is within the cooldown.
    ///
    /// `last_wave_time` is stamped before the call so a failing SDK is not
    /// retried on every tick.
    pub async fn wave(
        &self,
        state: &mut NodeState,
        now: Instant,
    ) -> Result<WaveOutcome, GestureError> {
        if let Some(remaining) = state.wave_cooldown_remaining(now, self.wave_cooldown) {
            debug!(remaining_ms = %remaining.as_millis(), "wave_cooling_down");
            return Ok(WaveOutcome::CoolingDown { remaining });
        }

        state.last_wave_time = Some(now);
        self.perform(GestureKind::Wave).await?;
        Ok(WaveOutcome::Waved)
    }

    /// Close the waving hand
    pub async fn cancel_wave(&self) -> Result<(), GestureError> {
        self.perform(GestureKind::CancelWave).await
    }

    async fn perform(&self, gesture: GestureKind) -> Result<(), GestureError> {
        let action = gesture.hand_action();
        let start = Instant::now();

        let result = match gesture {
            GestureKind::Handshake | GestureKind::CancelHandshake => {
                self.client.handshake(action).await
            }
            GestureKind::Wave | GestureKind::CancelWave => self.client.wave_hand(action).await,
        };

        let latency_us = start.elapsed().as_micros() as u64;
        self.metrics.record_gesture(gesture);
        self.metrics.record_sdk_latency(latency_us);

        let code = match result {
            Ok(code) => code,
            Err(source) => {
                self.metrics.record_sdk_failure();
                return Err(GestureError::Sdk { gesture, source });
            }
        };

        // The arm needs time to move; nothing else runs meanwhile
        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }

        if code != SDK_OK {
            self.metrics.record_sdk_failure();
            return Err(GestureError::Rejected { gesture, code });
        }

        debug!(
            gesture = %gesture,
            action = %action.as_str(),
            latency_us = %latency_us,
            backend = %self.client.backend_name(),
            "gesture_sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::HandAction;
    use crate::services::loco::{SdkCall, SimLocoClient};

    fn controller(sim: Arc<SimLocoClient>, config: Config) -> (GestureController, Arc<Metrics>) {
        let metrics = Arc::new(Metrics::new());
        (GestureController::new(sim, &config, metrics.clone()), metrics)
    }

    fn fast_config() -> Config {
        Config::default().with_gesture_settle_ms(0)
    }

    #[tokio::test]
    async fn test_trigger_and_cancel_map_to_handshake() {
        let sim = Arc::new(SimLocoClient::new());
        let (gesture, metrics) = controller(sim.clone(), fast_config());

        gesture.trigger().await.unwrap();
        gesture.cancel().await.unwrap();

        assert_eq!(
            sim.calls(),
            vec![SdkCall::Handshake(HandAction::Open), SdkCall::Handshake(HandAction::Close)]
        );
        assert_eq!(metrics.gesture_commands(GestureKind::Handshake), 1);
        assert_eq!(metrics.gesture_commands(GestureKind::CancelHandshake), 1);
        assert_eq!(metrics.sdk_failures(), 0);
    }

    #[tokio::test]
    async fn test_non_zero_code_is_rejected_without_retry() {
        let sim = Arc::new(SimLocoClient::new());
        sim.set_hand_code(7);
        let (gesture, metrics) = controller(sim.clone(), fast_config());

        let err = gesture.trigger().await.unwrap_err();
        assert!(matches!(err, GestureError::Rejected { gesture: GestureKind::Handshake, code: 7 }));
        assert_eq!(sim.calls().len(), 1);
        assert_eq!(metrics.sdk_failures(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_is_reported() {
        let sim = Arc::new(SimLocoClient::new());
        sim.set_offline(true);
        let (gesture, _metrics) = controller(sim.clone(), fast_config());

        let err = gesture.cancel().await.unwrap_err();
        assert_eq!(err.gesture(), GestureKind::CancelHandshake);
        assert!(matches!(err, GestureError::Sdk { .. }));
    }

    #[tokio::test]
    async fn test_settle_delay_blocks_caller() {
        let sim = Arc::new(SimLocoClient::new());
        let (gesture, _metrics) = controller(sim, Config::default().with_gesture_settle_ms(50));

        let start = Instant::now();
        gesture.trigger().await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_wave_respects_cooldown() {
        let sim = Arc::new(SimLocoClient::new());
        let (gesture, _metrics) = controller(sim.clone(), fast_config());
        let mut state = NodeState::new("bot", "1.0");
        let start = Instant::now();

        assert_eq!(gesture.wave(&mut state, start).await.unwrap(), WaveOutcome::Waved);
        assert_eq!(state.last_wave_time, Some(start));

        let outcome = gesture.wave(&mut state, start + Duration::from_secs(1)).await.unwrap();
        assert_eq!(outcome, WaveOutcome::CoolingDown { remaining: Duration::from_secs(4) });

        let later = start + Duration::from_secs(5);
        assert_eq!(gesture.wave(&mut state, later).await.unwrap(), WaveOutcome::Waved);
        assert_eq!(state.last_wave_time, Some(later));

        assert_eq!(
            sim.calls(),
            vec![SdkCall::WaveHand(HandAction::Open), SdkCall::WaveHand(HandAction::Open)]
        );
    }

    #[tokio::test]
    async fn test_failed_wave_still_starts_cooldown() {
        let sim = Arc::new(SimLocoClient::new());
        sim.set_hand_code(1);
        let (gesture, _metrics) = controller(sim.clone(), fast_config());
        let mut state = NodeState::new("bot", "1.0");
        let now = Instant::now();

        assert!(gesture.wave(&mut state, now).await.is_err());
        assert_eq!(state.last_wave_time, Some(now));
        assert!(matches!(
            gesture.wave(&mut state, now).await,
            Ok(WaveOutcome::CoolingDown { .. })
        ));
    }

    #[test]
    fn test_infinite_cooldown_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"[gesture]\nwave_cooldown_secs = inf\n").unwrap();

        let config = Config::load_from_path(&file.path().display().to_string());
        let sim = Arc::new(SimLocoClient::new());
        let (gesture, _metrics) = controller(sim, config.with_gesture_settle_ms(0));

        assert_eq!(gesture.wave_cooldown, Duration::from_secs(5));
    }
}
