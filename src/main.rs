mod config;
mod geo;
mod sender;
mod server;

use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::config::{Config, ConfigError};
use crate::geo::Coordinate;
use crate::sender::{device_identity, ReqwestFetcher, Resolver, Sample, Tracking};

#[derive(Parser)]
#[command(name = "waylink")]
#[command(about = "Live location filtering and relay")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay server
    Serve {
        #[arg(long)]
        config: Option<String>,
        /// Seed the advertised public endpoint
        #[arg(long)]
        advertise: Option<String>,
    },
    /// Run the sender pipeline, reading NDJSON samples from stdin
    Track {
        #[arg(long)]
        config: Option<String>,
    },
    /// Resolve the current relay endpoint and print it
    Resolve {
        #[arg(long)]
        config: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, advertise } => serve(config.as_deref(), advertise).await,
        Commands::Track { config } => track(config.as_deref()).await,
        Commands::Resolve { config } => resolve(config.as_deref()).await,
    }
}

fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    match path {
        Some(p) => Config::from_file(p),
        None => Ok(Config::default()),
    }
}

async fn serve(config_path: Option<&str>, advertise: Option<String>) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match server::run_server(config, advertise).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Server error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn track(config_path: Option<&str>) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let device_id = device_identity(&config.sender);
    println!("Tracking as {}", device_id);

    let samples = stdin_samples();
    let mut tracking = Tracking::new();
    if let Err(e) = tracking.start(config, device_id, samples).await {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = tracking.wait() => {}
    }
    tracking.stop().await;

    let status = tracking.status();
    println!(
        "Session: {:.2} km over {} points, avg {:.1} km/h, {} sends ({} heartbeats)",
        status.session_distance_m / 1000.0,
        status.session_points,
        status.session_avg_speed_ms * 3.6,
        status.sent,
        status.heartbeats,
    );
    ExitCode::SUCCESS
}

async fn resolve(config_path: Option<&str>) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let resolver = Resolver::new(config.discovery, ReqwestFetcher::default());
    match resolver.resolve().await {
        Ok(url) => {
            println!("{}", url);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// One sensor reading per line: `{"lat": .., "lon": .., "ts"?: ..,
/// "accuracy"?: .., "speed"?: ..}`. Timestamps default to receipt time.
#[derive(Debug, Deserialize)]
struct RawSample {
    lat: f64,
    lon: f64,
    #[serde(default)]
    ts: Option<i64>,
    #[serde(default)]
    accuracy: Option<f64>,
    #[serde(default)]
    speed: Option<f64>,
}

fn stdin_samples() -> mpsc::Receiver<Sample> {
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let raw: RawSample = match serde_json::from_str(line) {
                Ok(r) => r,
                Err(e) => {
                    log::warn!("skipping malformed sample: {}", e);
                    continue;
                }
            };
            let sample = Sample {
                coord: Coordinate::new(raw.lat, raw.lon),
                ts_ms: raw
                    .ts
                    .unwrap_or_else(|| chrono::Utc::now().timestamp_millis()),
                accuracy_m: raw.accuracy,
                speed_ms: raw.speed,
            };
            if tx.send(sample).await.is_err() {
                break;
            }
        }
    });
    rx
}
