//! Typed channel for MQTT egress messages
//!
//! Provides a non-blocking way to hand outbound messages to the MQTT publisher.
//! Uses a bounded mpsc channel to prevent unbounded memory growth.

use crate::infra::metrics::Metrics;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Messages that can be sent to the MQTT publisher
#[derive(Debug, Clone, PartialEq)]
pub enum EgressMessage {
    /// Periodic status line for the status topic
    Status(String),
}

#[derive(Clone)]
pub struct EgressSender {
    tx: mpsc::Sender<EgressMessage>,
    metrics: Arc<Metrics>,
}

impl EgressSender {
    /// Create a new sender from an mpsc sender
    pub fn new(tx: mpsc::Sender<EgressMessage>, metrics: Arc<Metrics>) -> Self {
        Self { tx, metrics }
    }

    /// Queue a status line for publishing.
    ///
    /// Never blocks. Returns false if the line was dropped (queue full or
    /// publisher gone); the drop is counted, not retried.
    pub fn send_status(&self, text: String) -> bool {
        match self.tx.try_send(EgressMessage::Status(text)) {
            Ok(()) => {
                self.metrics.record_status_queued();
                true
            }
            Err(_) => {
                self.metrics.record_status_dropped();
                false
            }
        }
    }
}

/// Create a new egress channel pair
///
/// Returns (sender, receiver) where sender can be cloned and shared.
/// Buffer size determines how many messages can be queued.
pub fn create_egress_channel(
    buffer_size: usize,
    metrics: Arc<Metrics>,
) -> (EgressSender, mpsc::Receiver<EgressMessage>) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (EgressSender::new(tx, metrics), rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_status() {
        let metrics = Arc::new(Metrics::new());
        let (sender, mut rx) = create_egress_channel(4, metrics.clone());

        assert!(sender.send_status("hello".to_string()));
        assert_eq!(rx.try_recv().unwrap(), EgressMessage::Status("hello".to_string()));
        assert_eq!(metrics.status_queued(), 1);
    }

    #[test]
    fn test_full_channel_drops() {
        let metrics = Arc::new(Metrics::new());
        let (sender, _rx) = create_egress_channel(1, metrics.clone());

        assert!(sender.send_status("first".to_string()));
        assert!(!sender.send_status("second".to_string()));

        let summary = metrics.report();
        assert_eq!(summary.status_queued, 1);
        assert_eq!(summary.status_dropped, 1);
    }
}
