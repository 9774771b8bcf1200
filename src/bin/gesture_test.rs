//! Gesture investigation tool
//!
//! Sends single SDK commands to the robot and prints the result code and
//! round-trip latency. Useful for checking the bridge and the arm before
//! running the full node.
//!
//! Usage:
//!   cargo run --bin gesture-test -- --backend http handshake --repeat 3

use clap::{Parser, Subcommand, ValueEnum};
use hello_robot::domain::{HandAction, RobotMode};
use hello_robot::infra::config::{resolve_network_interface, NETWORK_INTERFACE_ENV};
use hello_robot::infra::{Config, RobotBackend};
use hello_robot::io::HttpLocoClient;
use hello_robot::services::loco::{SdkError, SDK_OK};
use hello_robot::services::{LocoClient, SimLocoClient};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
enum Backend {
    Sim,
    Http,
}

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
enum Mode {
    Damping,
    Prepare,
    Walking,
}

impl From<Mode> for RobotMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Damping => RobotMode::Damping,
            Mode::Prepare => RobotMode::Prepare,
            Mode::Walking => RobotMode::Walking,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open then close the handshake hand
    Handshake,
    /// Close the handshake hand only
    Cancel,
    /// Open then close the waving hand
    Wave,
    /// Request an operating mode
    Mode {
        #[arg(value_enum)]
        mode: Mode,
    },
}

#[derive(Parser, Debug)]
#[command(name = "gesture-test", about = "Robot gesture investigation tool")]
struct Args {
    /// Config file path (for bridge url, timeout and domain id)
    #[arg(short, long)]
    config: Option<String>,

    /// Override the configured backend
    #[arg(long, value_enum)]
    backend: Option<Backend>,

    /// Network interface for the SDK transport
    #[arg(long)]
    interface: Option<String>,

    /// Number of times to run the command
    #[arg(long, default_value = "1")]
    repeat: u32,

    /// Pause between open and close, and between repeats (ms)
    #[arg(long, default_value = "500")]
    hold_ms: u64,

    #[command(subcommand)]
    command: Command,
}

async fn timed<F>(label: &str, call: F) -> bool
where
    F: std::future::Future<Output = Result<i32, SdkError>>,
{
    let start = Instant::now();
    let result = call.await;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    match result {
        Ok(SDK_OK) => {
            println!("  {:<18} ok        {:>8.1} ms", label, elapsed_ms);
            true
        }
        Ok(code) => {
            println!("  {:<18} code {:<4} {:>8.1} ms", label, code, elapsed_ms);
            false
        }
        Err(e) => {
            println!("  {:<18} error     {:>8.1} ms  {}", label, elapsed_ms, e);
            false
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = Config::load_from_path(&Config::resolve_config_path(args.config.as_deref()));
    let backend = match args.backend {
        Some(Backend::Sim) => RobotBackend::Sim,
        Some(Backend::Http) => RobotBackend::Http,
        None => config.robot_backend(),
    };

    let client: Arc<dyn LocoClient> = match backend {
        RobotBackend::Sim => Arc::new(SimLocoClient::new()),
        RobotBackend::Http => {
            let client = HttpLocoClient::new(&config)?;
            println!("bridge: {}", client.base_url());
            Arc::new(client)
        }
    };

    let env_interface = std::env::var(NETWORK_INTERFACE_ENV).ok();
    let interface = resolve_network_interface(args.interface.as_deref(), env_interface.as_deref());
    let hold = Duration::from_millis(args.hold_ms);

    println!("backend: {}  interface: {}", client.backend_name(), interface);
    if !timed("init_channel", client.init_channel(config.robot_domain_id(), &interface)).await {
        return Err("sdk channel initialization failed".into());
    }

    let mut failures = 0u32;
    for round in 1..=args.repeat.max(1) {
        println!("round {}", round);
        let ok = match &args.command {
            Command::Handshake => {
                let opened = timed("handshake open", client.handshake(HandAction::Open)).await;
                tokio::time::sleep(hold).await;
                let closed = timed("handshake close", client.handshake(HandAction::Close)).await;
                opened && closed
            }
            Command::Cancel => timed("handshake close", client.handshake(HandAction::Close)).await,
            Command::Wave => {
                let opened = timed("wave open", client.wave_hand(HandAction::Open)).await;
                tokio::time::sleep(hold).await;
                let closed = timed("wave close", client.wave_hand(HandAction::Close)).await;
                opened && closed
            }
            Command::Mode { mode } => {
                let mode = RobotMode::from(*mode);
                timed(mode.as_str(), client.change_mode(mode)).await
            }
        };
        if !ok {
            failures += 1;
        }
        tokio::time::sleep(hold).await;
    }

    println!("{} of {} rounds failed", failures, args.repeat.max(1));
    Ok(())
}
