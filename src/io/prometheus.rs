//! Prometheus metrics HTTP endpoint
//!
//! Exposes node metrics in Prometheus text format at /metrics and a liveness
//! check at /health. Uses hyper for the HTTP server.

use crate::domain::types::GestureKind;
use crate::infra::metrics::{Metrics, MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge) with robot label
fn write_metric(
    output: &mut String,
    name: &str,
    help: &str,
    typ: MetricType,
    robot: &str,
    val: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{robot=\"{robot}\"}} {val}");
}

/// Write a histogram metric with buckets, sum, and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    robot: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    bounds: &[u64; 10],
    avg: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in bounds.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{robot=\"{robot}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{robot=\"{robot}\",le=\"+Inf\"}} {cumulative}");

    let count: u64 = buckets.iter().sum();
    let sum = avg * count;
    let _ = writeln!(output, "{name}_sum{{robot=\"{robot}\"}} {sum}");
    let _ = writeln!(output, "{name}_count{{robot=\"{robot}\"}} {count}");
}

/// Format metrics in Prometheus text exposition format
fn format_prometheus_metrics(metrics: &Metrics, robot: &str) -> String {
    let summary = metrics.report();
    let mut output = String::with_capacity(4096);

    write_detection_metrics(&mut output, robot, &summary);
    write_gesture_metrics(&mut output, robot, &summary);
    write_status_metrics(&mut output, robot, &summary);

    output
}

fn write_detection_metrics(output: &mut String, robot: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "hello_detection_messages_total",
        "Detection messages received from the bus",
        MetricType::Counter,
        robot,
        summary.messages_total,
    );
    write_metric(
        output,
        "hello_detection_messages_dropped_total",
        "Detection messages dropped due to a full node queue",
        MetricType::Counter,
        robot,
        summary.messages_dropped,
    );
    write_metric(
        output,
        "hello_detection_messages_superseded_total",
        "Queued detection messages skipped for a newer one",
        MetricType::Counter,
        robot,
        summary.messages_superseded,
    );
    write_metric(
        output,
        "hello_detection_parse_errors_total",
        "Detection payloads that failed to decode",
        MetricType::Counter,
        robot,
        summary.parse_errors,
    );
    write_metric(
        output,
        "hello_person_batches_total",
        "Detection batches containing a person",
        MetricType::Counter,
        robot,
        summary.person_batches,
    );
    write_metric(
        output,
        "hello_person_detected",
        "Current presence flag (0=absent, 1=detected)",
        MetricType::Gauge,
        robot,
        summary.person_detected as u64,
    );
}

fn write_gesture_metrics(output: &mut String, robot: &str, summary: &MetricsSummary) {
    let name = "hello_gesture_commands_total";
    let _ = writeln!(output, "# HELP {name} Gesture commands issued to the robot");
    let _ = writeln!(output, "# TYPE {name} counter");
    for kind in GestureKind::ALL {
        let _ = writeln!(
            output,
            "{name}{{robot=\"{robot}\",gesture=\"{}\"}} {}",
            kind.as_str(),
            summary.gestures(kind)
        );
    }

    write_metric(
        output,
        "hello_sdk_failures_total",
        "SDK calls rejected or failed in transport",
        MetricType::Counter,
        robot,
        summary.sdk_failures,
    );
    write_histogram(
        output,
        "hello_sdk_latency_us",
        "SDK call latency in microseconds",
        robot,
        &summary.sdk_latency_buckets,
        &METRICS_BUCKET_BOUNDS,
        summary.sdk_latency_avg_us,
    );
    write_metric(
        output,
        "hello_sdk_latency_p99_us",
        "99th percentile SDK call latency",
        MetricType::Gauge,
        robot,
        summary.sdk_latency_p99_us,
    );
    write_metric(
        output,
        "hello_sdk_latency_max_us",
        "Maximum SDK call latency",
        MetricType::Gauge,
        robot,
        summary.sdk_latency_max_us,
    );
}

fn write_status_metrics(output: &mut String, robot: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "hello_status_queued_total",
        "Status lines queued for the publisher",
        MetricType::Counter,
        robot,
        summary.status_queued,
    );
    write_metric(
        output,
        "hello_status_dropped_total",
        "Status lines dropped due to a full egress queue",
        MetricType::Counter,
        robot,
        summary.status_dropped,
    );
}

fn text_response(status: StatusCode, content_type: &str, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    if let Ok(value) = content_type.parse() {
        response.headers_mut().insert(hyper::header::CONTENT_TYPE, value);
    }
    response
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    robot: Arc<String>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => text_response(
            StatusCode::OK,
            "text/plain; version=0.0.4; charset=utf-8",
            format_prometheus_metrics(&metrics, &robot),
        ),
        (&Method::GET, "/health") => text_response(StatusCode::OK, "text/plain", "ok".into()),
        _ => text_response(StatusCode::NOT_FOUND, "text/plain", "Not Found".to_string()),
    };
    Ok(response)
}

/// Start the Prometheus metrics HTTP server
pub async fn start_metrics_server(
    port: u16,
    metrics: Arc<Metrics>,
    robot: String,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    let robot = Arc::new(robot);

    info!(port = %port, robot = %robot, "prometheus_metrics_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let metrics = metrics.clone();
                        let robot = robot.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let metrics = metrics.clone();
                                let robot = robot.clone();
                                async move { handle_request(req, metrics, robot).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "prometheus_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "prometheus_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("prometheus_metrics_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}
