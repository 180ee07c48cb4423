/// Configuration default values
///
/// Every tunable the service reads from `config.toml` falls back to one of
/// these constants.
// Web server defaults
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_ALLOWED_ORIGIN: &str = "http://localhost:5173";

// Transcoder defaults
pub const DEFAULT_FFMPEG_COMMAND: &str = "ffmpeg";
pub const DEFAULT_OUTPUT_DIR_NAME: &str = "camera-bridge";
pub const DEFAULT_STARTUP_GRACE: &str = "1500ms";
pub const DEFAULT_TERMINATION_GRACE: &str = "5s";
pub const DEFAULT_RTSP_TRANSPORT: &str = "tcp";
pub const DEFAULT_TRANSCODER_LOG_LEVEL: &str = "warning";
pub const DEFAULT_HLS_SEGMENT_SECONDS: u32 = 2;
pub const DEFAULT_HLS_LIST_SIZE: u32 = 5;
pub const PLAYLIST_FILE_NAME: &str = "playlist.m3u8";

// Supervisor defaults
pub const DEFAULT_METRICS_PUSH_INTERVAL: &str = "2500ms";
pub const DEFAULT_IDLE_TIMEOUT: &str = "120s";
pub const DEFAULT_REAPER_INTERVAL: &str = "10s";
pub const DEFAULT_STDERR_TAIL_LINES: usize = 20;

// Auth defaults
pub const DEFAULT_PAIR_CODE_TTL: &str = "300s";
pub const DEFAULT_TOKEN_TTL: &str = "600s";
pub const PAIR_CODE_LENGTH: usize = 6;

// Bridge API (collaborator) defaults
pub const DEFAULT_BRIDGE_CONNECT_TIMEOUT: &str = "5s";
pub const DEFAULT_BRIDGE_REQUEST_TIMEOUT: &str = "10s";
pub const DEFAULT_BRIDGE_MAX_RETRIES: u32 = 2;
pub const DEFAULT_BRIDGE_RETRY_BACKOFF: &str = "250ms";
