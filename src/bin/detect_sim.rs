//! Detection simulator - publishes synthetic detection batches
//!
//! Stands in for the perception node so the hello node can be exercised
//! without a camera. Also subscribes to the status topic and prints what the
//! node reports.
//!
//! Usage:
//!   cargo run --bin detect-sim -- --pattern alternate --rate-hz 2

use clap::{Parser, ValueEnum};
use hello_robot::infra::config::DEFAULT_MAX_PACKET_SIZE;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
enum Pattern {
    /// Always a confident person
    Person,
    /// Empty batches
    Empty,
    /// Only non-person classes
    Other,
    /// A person below the confidence threshold
    Unsure,
    /// Person for `--period` batches, then nobody for as many
    Alternate,
    /// Payloads that do not decode
    Malformed,
}

#[derive(Parser, Debug)]
#[command(name = "detect-sim")]
#[command(about = "Publish synthetic detection batches for local testing")]
struct Args {
    /// MQTT broker host
    #[arg(long, default_value = "localhost")]
    mqtt_host: String,

    /// MQTT broker port
    #[arg(long, default_value = "1883")]
    mqtt_port: u16,

    /// Detections topic
    #[arg(long, default_value = "detections")]
    topic: String,

    /// Status topic to echo (empty to disable)
    #[arg(long, default_value = "status")]
    status_topic: String,

    #[arg(long, value_enum, default_value = "alternate")]
    pattern: Pattern,

    /// Batches per second
    #[arg(long, default_value = "2.0")]
    rate_hz: f64,

    /// Batches per phase for the alternate pattern
    #[arg(long, default_value = "6")]
    period: u64,

    /// Stop after this many batches (0 = run until Ctrl+C)
    #[arg(long, default_value = "0")]
    count: u64,
}

fn batch_for(pattern: Pattern, seq: u64, period: u64) -> Vec<u8> {
    let detections: Value = match pattern {
        Pattern::Person => json!([{"class_id": 0, "confidence": 0.92}]),
        Pattern::Empty => json!([]),
        Pattern::Other => json!([
            {"class_id": 56, "confidence": 0.81},
            {"class_id": 2, "confidence": 0.67}
        ]),
        Pattern::Unsure => json!([{"class_id": 0, "confidence": 0.42}]),
        Pattern::Alternate => {
            if (seq / period.max(1)) % 2 == 0 {
                json!([{"class_id": 0, "confidence": 0.88}, {"class_id": 56, "confidence": 0.7}])
            } else {
                json!([{"class_id": 56, "confidence": 0.7}])
            }
        }
        Pattern::Malformed => return b"[{\"class_id\": 0, \"confidence\": ".to_vec(),
    };
    detections.to_string().into_bytes()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let client_id = format!("detect-sim-{}", std::process::id());
    let mut mqtt_options = MqttOptions::new(client_id, &args.mqtt_host, args.mqtt_port);
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    mqtt_options.set_max_packet_size(DEFAULT_MAX_PACKET_SIZE, DEFAULT_MAX_PACKET_SIZE);

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 100);
    if !args.status_topic.is_empty() {
        client.subscribe(&args.status_topic, QoS::AtMostOnce).await?;
    }

    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    println!("connected");
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    println!("< {}", String::from_utf8_lossy(&publish.payload));
                }
                Ok(_) => {}
                Err(e) => {
                    eprintln!("MQTT error: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    });

    let period = Duration::from_secs_f64(1.0 / args.rate_hz.max(0.01));
    let mut interval = tokio::time::interval(period);
    let mut seq = 0u64;

    println!(
        "publishing {:?} to {} at {:.1} Hz on {}:{}",
        args.pattern, args.topic, args.rate_hz, args.mqtt_host, args.mqtt_port
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = interval.tick() => {
                let payload = batch_for(args.pattern, seq, args.period);
                println!("> {}", String::from_utf8_lossy(&payload));
                client.publish(&args.topic, QoS::AtMostOnce, false, payload).await?;
                seq += 1;
                if args.count > 0 && seq >= args.count {
                    break;
                }
            }
        }
    }

    // Let the last publish leave the eventloop
    tokio::time::sleep(Duration::from_millis(200)).await;
    client.disconnect().await?;
    println!("published {} batches", seq);
    Ok(())
}
