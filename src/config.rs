use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub sender: SenderConfig,
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Shared secret for privileged observers. Unset means the admin
    /// surface is closed.
    #[serde(default)]
    pub admin_token: Option<String>,
}

impl Default for WebConfig {
    fn default() -> Self {
        WebConfig {
            bind: default_bind(),
            admin_token: None,
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:9878".to_string()
}

/// Server-side anti-spam/glitch thresholds.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_ingest_min_move")]
    pub min_move_meters: f64,
    #[serde(default = "default_ingest_min_interval")]
    pub min_interval_seconds: f64,
    #[serde(default = "default_max_jump_speed")]
    pub max_jump_speed_ms: f64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            min_move_meters: default_ingest_min_move(),
            min_interval_seconds: default_ingest_min_interval(),
            max_jump_speed_ms: default_max_jump_speed(),
        }
    }
}

fn default_ingest_min_move() -> f64 {
    5.0
}
fn default_ingest_min_interval() -> f64 {
    1.0
}
fn default_max_jump_speed() -> f64 {
    200.0
}

/// Sender-side movement confirmation thresholds. The historical sender
/// builds disagree on some of these, so none are hardcoded.
#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    #[serde(default = "default_min_move")]
    pub min_move_meters: f64,
    #[serde(default = "default_stale_seconds")]
    pub stale_seconds: f64,
    #[serde(default = "default_min_speed")]
    pub min_speed_ms: f64,
    #[serde(default = "default_max_accuracy")]
    pub max_accuracy_m: f64,
    #[serde(default = "default_confirmations")]
    pub confirmations: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig {
            min_move_meters: default_min_move(),
            stale_seconds: default_stale_seconds(),
            min_speed_ms: default_min_speed(),
            max_accuracy_m: default_max_accuracy(),
            confirmations: default_confirmations(),
        }
    }
}

fn default_min_move() -> f64 {
    7.0
}
fn default_stale_seconds() -> f64 {
    15.0
}
fn default_min_speed() -> f64 {
    0.6
}
fn default_max_accuracy() -> f64 {
    20.0
}
fn default_confirmations() -> u32 {
    2
}

/// Recording-session thresholds, more permissive than the detector's:
/// undercounting distance is worse than occasional noise inflation here.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_distance")]
    pub distance_threshold_m: f64,
    #[serde(default = "default_session_accuracy")]
    pub max_accuracy_m: f64,
    #[serde(default = "default_stopped_speed")]
    pub stopped_speed_ms: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            distance_threshold_m: default_session_distance(),
            max_accuracy_m: default_session_accuracy(),
            stopped_speed_ms: default_stopped_speed(),
        }
    }
}

fn default_session_distance() -> f64 {
    2.0
}
fn default_session_accuracy() -> f64 {
    30.0
}
fn default_stopped_speed() -> f64 {
    0.3
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    /// Ordered from most to least robust; the first usable answer wins.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default = "default_cache_file")]
    pub cache_file: PathBuf,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_seconds: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        DiscoveryConfig {
            providers: Vec::new(),
            cache_file: default_cache_file(),
            request_timeout_seconds: default_request_timeout(),
            attempts: default_attempts(),
            retry_delay_seconds: default_retry_delay(),
            poll_interval_seconds: default_poll_interval(),
        }
    }
}

fn default_cache_file() -> PathBuf {
    PathBuf::from(".waylink-cache.json")
}
fn default_request_timeout() -> u64 {
    5
}
fn default_attempts() -> u32 {
    3
}
fn default_retry_delay() -> u64 {
    3
}
fn default_poll_interval() -> u64 {
    15
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub format: ProviderFormat,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderFormat {
    /// A JSON document with a `server` field.
    #[default]
    JsonServerField,
    /// The body is the URL itself.
    PlainUrl,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublishConfig {
    #[serde(default)]
    pub gist_id: Option<String>,
    #[serde(default)]
    pub gist_token: Option<String>,
    /// Local JSON mirror of the advertised endpoint, for LAN discovery.
    #[serde(default)]
    pub mirror_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SenderConfig {
    /// Fixed device identity. When unset one is generated and persisted.
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default = "default_id_file")]
    pub id_file: PathBuf,
    #[serde(default = "default_post_timeout")]
    pub post_timeout_seconds: u64,
    #[serde(default = "default_heartbeat_check")]
    pub heartbeat_check_seconds: u64,
}

impl Default for SenderConfig {
    fn default() -> Self {
        SenderConfig {
            device_id: None,
            device_name: None,
            id_file: default_id_file(),
            post_timeout_seconds: default_post_timeout(),
            heartbeat_check_seconds: default_heartbeat_check(),
        }
    }
}

fn default_id_file() -> PathBuf {
    PathBuf::from(".waylink-id")
}
fn default_post_timeout() -> u64 {
    8
}
fn default_heartbeat_check() -> u64 {
    3
}
