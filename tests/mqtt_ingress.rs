//! Detection ingress through the embedded broker

use hello_robot::domain::parse_detections;
use hello_robot::infra::broker::start_embedded_broker;
use hello_robot::infra::{Config, Metrics};
use hello_robot::io::mqtt::{mqtt_options, start_mqtt_client};
use rumqttc::{AsyncClient, QoS};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

const TEST_CONFIG: &str = r#"
[mqtt]
host = "127.0.0.1"
port = 18931
client_id = "hello_ingress_test"

[broker]
enabled = true
bind_address = "127.0.0.1"
port = 18931
"#;

#[tokio::test]
async fn test_batch_over_ten_kib_reaches_the_node() {
    let config = Config::from_toml_str(TEST_CONFIG, "inline".to_string()).unwrap();
    start_embedded_broker(&config).unwrap();

    let metrics = Arc::new(Metrics::new());
    let (payload_tx, mut payload_rx) = mpsc::channel(8);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ingress_config = config.clone();
    let ingress_metrics = metrics.clone();
    let ingress = tokio::spawn(async move {
        start_mqtt_client(&ingress_config, payload_tx, ingress_metrics, shutdown_rx).await
    });

    // Detector side, with the same packet limit as the node
    let (detector, mut eventloop) = AsyncClient::new(mqtt_options(&config, "detector-test"), 10);
    tokio::spawn(async move {
        loop {
            if eventloop.poll().await.is_err() {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    });

    let mut detections: Vec<serde_json::Value> = (0..400)
        .map(|i| json!({"class_id": 56, "confidence": 0.61, "bbox": [i, i, i + 40, i + 80]}))
        .collect();
    detections.push(json!({"class_id": 0, "confidence": 0.93}));
    let payload = serde_json::to_vec(&detections).unwrap();
    assert!(payload.len() > 10 * 1024);

    // QoS 0 publishes before the node has subscribed are lost, so keep sending
    let received = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            detector
                .publish(config.detections_topic(), QoS::AtMostOnce, false, payload.clone())
                .await
                .unwrap();
            if let Ok(Some(raw)) =
                tokio::time::timeout(Duration::from_millis(200), payload_rx.recv()).await
            {
                return raw;
            }
        }
    })
    .await
    .expect("large batch delivered");

    assert_eq!(received.len(), payload.len());
    let batch = parse_detections(&received).unwrap();
    assert_eq!(batch.len(), 401);
    assert!(batch.person_found());
    assert_eq!(metrics.messages_dropped(), 0);

    shutdown_tx.send(true).unwrap();
    ingress.await.unwrap().unwrap();
}
