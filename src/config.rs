//! Server configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Working directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root under which per-conversion files are created
    pub work_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("tube2mp3-downloads"),
        }
    }
}

/// HTTP client settings for resolving and downloading audio
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// TCP connect timeout in seconds
    pub connect_timeout_secs: u64,

    /// Maximum idle time between received chunks, in seconds
    pub read_timeout_secs: u64,

    /// Size of each ranged request in bytes
    pub chunk_size_bytes: u64,

    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            read_timeout_secs: 30,
            chunk_size_bytes: 10 * 1024 * 1024,
            user_agent: "com.google.android.youtube/19.09.37 (Linux; U; Android 11) gzip"
                .to_string(),
        }
    }
}

impl DownloadConfig {
    /// Build the shared HTTP client
    pub fn build_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(&self.user_agent)
            .connect_timeout(std::time::Duration::from_secs(self.connect_timeout_secs))
            .read_timeout(std::time::Duration::from_secs(self.read_timeout_secs))
            .build()
    }
}

/// YouTube endpoints and client identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YouTubeConfig {
    /// Player endpoint used to list stream formats
    pub player_endpoint: String,

    /// Client name reported to the player endpoint
    pub client_name: String,

    /// Client version reported to the player endpoint
    pub client_version: String,

    /// Android SDK level reported with the client identity
    pub android_sdk_version: u32,

    /// Data API endpoint for video metadata
    pub data_api_endpoint: String,

    /// Data API key; metadata lookup is disabled without one
    pub api_key: Option<String>,
}

impl Default for YouTubeConfig {
    fn default() -> Self {
        Self {
            player_endpoint: "https://www.youtube.com/youtubei/v1/player?prettyPrint=false"
                .to_string(),
            client_name: "ANDROID".to_string(),
            client_version: "19.09.37".to_string(),
            android_sdk_version: 30,
            data_api_endpoint: "https://www.googleapis.com/youtube/v3/videos".to_string(),
            api_key: None,
        }
    }
}

/// Log output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Output format (pretty, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Enable CORS
    pub cors_enabled: bool,

    pub storage: StorageConfig,

    pub download: DownloadConfig,

    pub youtube: YouTubeConfig,

    pub logging: LoggingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            cors_enabled: true,
            storage: StorageConfig::default(),
            download: DownloadConfig::default(),
            youtube: YouTubeConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Fill unset secrets from the environment
    pub fn apply_env(&mut self) {
        if self.youtube.api_key.is_none() {
            self.youtube.api_key = std::env::var("YOUTUBE_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty());
        }
    }
}
