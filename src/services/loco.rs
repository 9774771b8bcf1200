//! Locomotion SDK interface
//!
//! The robot vendor SDK is consumed through four operations, each answering
//! with an integer result code where 0 means success. `LocoClient` is the seam
//! between the node and whichever transport reaches the SDK:
//! - `SimLocoClient` - in-process simulator used for dry runs and tests
//! - `HttpLocoClient` (in `io::sdk_bridge`) - JSON bridge service on the robot

use crate::domain::types::{HandAction, RobotMode};
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

/// Result code the SDK returns on success
pub const SDK_OK: i32 = 0;

/// Failure to get an answer from the SDK at all.
///
/// A non-zero result code is not an `SdkError`; it is a valid answer.
#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    #[error("sdk transport error: {0}")]
    Transport(String),
    #[error("sdk bridge returned status {status}")]
    Status { status: u16 },
    #[error("invalid sdk response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait LocoClient: Send + Sync {
    /// Initialize the SDK transport on a network interface
    async fn init_channel(&self, domain_id: u32, network_interface: &str) -> Result<i32, SdkError>;

    /// Request an operating mode transition
    async fn change_mode(&self, mode: RobotMode) -> Result<i32, SdkError>;

    /// Handshake arm action
    async fn handshake(&self, action: HandAction) -> Result<i32, SdkError>;

    /// Wave-hand arm action
    async fn wave_hand(&self, action: HandAction) -> Result<i32, SdkError>;

    /// Short label for logs
    fn backend_name(&self) -> &'static str;
}

/// A call received by the simulator
#[derive(Debug, Clone, PartialEq)]
pub enum SdkCall {
    InitChannel { domain_id: u32, network_interface: String },
    ChangeMode(RobotMode),
    Handshake(HandAction),
    WaveHand(HandAction),
}

#[derive(Debug, Clone, Copy)]
struct SimScript {
    init_code: i32,
    mode_code: i32,
    hand_code: i32,
    offline: bool,
}

/// In-process SDK stand-in.
///
/// Records every call and answers with scripted result codes (all 0 by default).
pub struct SimLocoClient {
    calls: Mutex<Vec<SdkCall>>,
    script: Mutex<SimScript>,
}

impl SimLocoClient {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            script: Mutex::new(SimScript {
                init_code: SDK_OK,
                mode_code: SDK_OK,
                hand_code: SDK_OK,
                offline: false,
            }),
        }
    }

    /// Result code for `init_channel`
    pub fn set_init_code(&self, code: i32) {
        self.script.lock().init_code = code;
    }

    /// Result code for `change_mode`
    pub fn set_mode_code(&self, code: i32) {
        self.script.lock().mode_code = code;
    }

    /// Result code for `handshake` and `wave_hand`
    pub fn set_hand_code(&self, code: i32) {
        self.script.lock().hand_code = code;
    }

    /// When offline every call fails with a transport error (calls are still recorded)
    pub fn set_offline(&self, offline: bool) {
        self.script.lock().offline = offline;
    }

    /// Snapshot of recorded calls
    pub fn calls(&self) -> Vec<SdkCall> {
        self.calls.lock().clone()
    }

    /// Drain recorded calls
    pub fn take_calls(&self) -> Vec<SdkCall> {
        std::mem::take(&mut *self.calls.lock())
    }

    fn answer(&self, call: SdkCall) -> Result<i32, SdkError> {
        let script = *self.script.lock();
        let code = match call {
            SdkCall::InitChannel { .. } => script.init_code,
            SdkCall::ChangeMode(_) => script.mode_code,
            SdkCall::Handshake(_) | SdkCall::WaveHand(_) => script.hand_code,
        };
        debug!(call = ?call, code = %code, offline = %script.offline, "sim_sdk_call");
        self.calls.lock().push(call);

        if script.offline {
            return Err(SdkError::Transport("simulator offline".to_string()));
        }
        Ok(code)
    }
}

impl Default for SimLocoClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocoClient for SimLocoClient {
    async fn init_channel(&self, domain_id: u32, network_interface: &str) -> Result<i32, SdkError> {
        self.answer(SdkCall::InitChannel {
            domain_id,
            network_interface: network_interface.to_string(),
        })
    }

    async fn change_mode(&self, mode: RobotMode) -> Result<i32, SdkError> {
        self.answer(SdkCall::ChangeMode(mode))
    }

    async fn handshake(&self, action: HandAction) -> Result<i32, SdkError> {
        self.answer(SdkCall::Handshake(action))
    }

    async fn wave_hand(&self, action: HandAction) -> Result<i32, SdkError> {
        self.answer(SdkCall::WaveHand(action))
    }

    fn backend_name(&self) -> &'static str {
        "sim"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sim_records_calls_in_order() {
        let sim = SimLocoClient::new();

        assert_eq!(sim.init_channel(0, "eth0").await.unwrap(), SDK_OK);
        assert_eq!(sim.change_mode(RobotMode::Prepare).await.unwrap(), SDK_OK);
        assert_eq!(sim.handshake(HandAction::Open).await.unwrap(), SDK_OK);

        assert_eq!(
            sim.take_calls(),
            vec![
                SdkCall::InitChannel { domain_id: 0, network_interface: "eth0".to_string() },
                SdkCall::ChangeMode(RobotMode::Prepare),
                SdkCall::Handshake(HandAction::Open),
            ]
        );
        assert!(sim.calls().is_empty());
    }

    #[tokio::test]
    async fn test_sim_scripted_codes() {
        let sim = SimLocoClient::new();
        sim.set_mode_code(3);
        sim.set_hand_code(-1);

        assert_eq!(sim.change_mode(RobotMode::Prepare).await.unwrap(), 3);
        assert_eq!(sim.wave_hand(HandAction::Close).await.unwrap(), -1);
        assert_eq!(sim.init_channel(1, "wlan0").await.unwrap(), SDK_OK);
    }

    #[tokio::test]
    async fn test_sim_offline() {
        let sim = SimLocoClient::new();
        sim.set_offline(true);

        assert!(matches!(sim.handshake(HandAction::Open).await, Err(SdkError::Transport(_))));
        assert_eq!(sim.calls().len(), 1);
    }
}
