use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

pub mod defaults;
pub mod duration_serde;

use defaults::*;
use duration_serde::{duration, parse_default};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub transcoder: TranscoderConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Origins allowed to call the control plane; `"*"` echoes any origin back.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

/// How the transcoder is invoked and where it writes artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscoderConfig {
    #[serde(default = "default_ffmpeg_command")]
    pub ffmpeg_command: String,
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,
    /// Window after spawn during which a non-zero exit is reported as a launch failure
    #[serde(default = "default_startup_grace", with = "duration")]
    pub startup_grace: Duration,
    /// Time between SIGTERM and SIGKILL
    #[serde(default = "default_termination_grace", with = "duration")]
    pub termination_grace: Duration,
    #[serde(default = "default_rtsp_transport")]
    pub rtsp_transport: String,
    #[serde(default = "default_transcoder_log_level")]
    pub log_level: String,
    #[serde(default = "default_hls_segment_seconds")]
    pub hls_segment_seconds: u32,
    #[serde(default = "default_hls_list_size")]
    pub hls_list_size: u32,
    /// RTMP base URL; when set, sessions with targets also push `<relay_base>/<device_id>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay_base: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default = "default_metrics_push_interval", with = "duration")]
    pub metrics_push_interval: Duration,
    #[serde(default = "default_idle_timeout", with = "duration")]
    pub idle_timeout: Duration,
    #[serde(default = "default_reaper_interval", with = "duration")]
    pub reaper_interval: Duration,
    #[serde(default = "default_stderr_tail_lines")]
    pub stderr_tail_lines: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_pair_code_ttl", with = "duration")]
    pub pair_code_ttl: Duration,
    #[serde(default = "default_token_ttl", with = "duration")]
    pub token_ttl: Duration,
}

/// Outbound bridge API. Without `api_url` every collaborator call is skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(default = "default_bridge_connect_timeout", with = "duration")]
    pub connect_timeout: Duration,
    #[serde(default = "default_bridge_request_timeout", with = "duration")]
    pub request_timeout: Duration,
    #[serde(default = "default_bridge_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_bridge_retry_backoff", with = "duration")]
    pub retry_backoff: Duration,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_allowed_origins() -> Vec<String> {
    vec![DEFAULT_ALLOWED_ORIGIN.to_string()]
}

fn default_ffmpeg_command() -> String {
    DEFAULT_FFMPEG_COMMAND.to_string()
}

fn default_output_root() -> PathBuf {
    std::env::temp_dir().join(DEFAULT_OUTPUT_DIR_NAME)
}

fn default_startup_grace() -> Duration {
    parse_default(DEFAULT_STARTUP_GRACE)
}

fn default_termination_grace() -> Duration {
    parse_default(DEFAULT_TERMINATION_GRACE)
}

fn default_rtsp_transport() -> String {
    DEFAULT_RTSP_TRANSPORT.to_string()
}

fn default_transcoder_log_level() -> String {
    DEFAULT_TRANSCODER_LOG_LEVEL.to_string()
}

fn default_hls_segment_seconds() -> u32 {
    DEFAULT_HLS_SEGMENT_SECONDS
}

fn default_hls_list_size() -> u32 {
    DEFAULT_HLS_LIST_SIZE
}

fn default_metrics_push_interval() -> Duration {
    parse_default(DEFAULT_METRICS_PUSH_INTERVAL)
}

fn default_idle_timeout() -> Duration {
    parse_default(DEFAULT_IDLE_TIMEOUT)
}

fn default_reaper_interval() -> Duration {
    parse_default(DEFAULT_REAPER_INTERVAL)
}

fn default_stderr_tail_lines() -> usize {
    DEFAULT_STDERR_TAIL_LINES
}

fn default_pair_code_ttl() -> Duration {
    parse_default(DEFAULT_PAIR_CODE_TTL)
}

fn default_token_ttl() -> Duration {
    parse_default(DEFAULT_TOKEN_TTL)
}

fn default_bridge_connect_timeout() -> Duration {
    parse_default(DEFAULT_BRIDGE_CONNECT_TIMEOUT)
}

fn default_bridge_request_timeout() -> Duration {
    parse_default(DEFAULT_BRIDGE_REQUEST_TIMEOUT)
}

fn default_bridge_max_retries() -> u32 {
    DEFAULT_BRIDGE_MAX_RETRIES
}

fn default_bridge_retry_backoff() -> Duration {
    parse_default(DEFAULT_BRIDGE_RETRY_BACKOFF)
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors: CorsConfig::default(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_command: default_ffmpeg_command(),
            output_root: default_output_root(),
            startup_grace: default_startup_grace(),
            termination_grace: default_termination_grace(),
            rtsp_transport: default_rtsp_transport(),
            log_level: default_transcoder_log_level(),
            hls_segment_seconds: default_hls_segment_seconds(),
            hls_list_size: default_hls_list_size(),
            relay_base: None,
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            metrics_push_interval: default_metrics_push_interval(),
            idle_timeout: default_idle_timeout(),
            reaper_interval: default_reaper_interval(),
            stderr_tail_lines: default_stderr_tail_lines(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            pair_code_ttl: default_pair_code_ttl(),
            token_ttl: default_token_ttl(),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            connect_timeout: default_bridge_connect_timeout(),
            request_timeout: default_bridge_request_timeout(),
            max_retries: default_bridge_max_retries(),
            retry_backoff: default_bridge_retry_backoff(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());
        Self::load_from_file(&config_file)
    }

    pub fn load_from_file(config_file: &str) -> Result<Self> {
        if std::path::Path::new(config_file).exists() {
            let contents = std::fs::read_to_string(config_file)?;
            Ok(toml::from_str(&contents)?)
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::write(config_file, contents)?;
            info!("Created default config file: {}", config_file);
            Ok(default_config)
        }
    }
}
