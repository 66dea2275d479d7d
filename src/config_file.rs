//! Configuration file support
//!
//! Loads server configuration from TOML files. Every section except
//! `[server]` is optional; absent keys fall back to the defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::{DownloadConfig, LoggingConfig, ServerConfig, StorageConfig, YouTubeConfig};

/// Configuration file format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Server settings
    pub server: ServerSettings,
    /// Working directory settings
    pub storage: Option<StorageSettings>,
    /// Download client settings
    pub download: Option<DownloadSettings>,
    /// YouTube settings
    pub youtube: Option<YouTubeSettings>,
    /// Logging settings
    pub logging: Option<LoggingSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Enable CORS
    pub cors_enabled: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Working directory root
    pub work_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadSettings {
    pub connect_timeout_secs: Option<u64>,
    pub read_timeout_secs: Option<u64>,
    pub chunk_size_bytes: Option<u64>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YouTubeSettings {
    pub player_endpoint: Option<String>,
    pub client_name: Option<String>,
    pub client_version: Option<String>,
    pub android_sdk_version: Option<u32>,
    pub data_api_endpoint: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: Option<String>,
}

impl ConfigFile {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: ConfigFile = toml::from_str(&content)?;
        Ok(config)
    }

    /// Generate default configuration file
    pub fn default_config() -> Self {
        let defaults = ServerConfig::default();
        Self {
            server: ServerSettings {
                host: defaults.host,
                port: defaults.port,
                cors_enabled: Some(defaults.cors_enabled),
            },
            storage: Some(StorageSettings {
                work_dir: Some(defaults.storage.work_dir),
            }),
            download: Some(DownloadSettings {
                connect_timeout_secs: Some(defaults.download.connect_timeout_secs),
                read_timeout_secs: Some(defaults.download.read_timeout_secs),
                chunk_size_bytes: Some(defaults.download.chunk_size_bytes),
                user_agent: Some(defaults.download.user_agent),
            }),
            youtube: Some(YouTubeSettings {
                player_endpoint: Some(defaults.youtube.player_endpoint),
                client_name: Some(defaults.youtube.client_name),
                client_version: Some(defaults.youtube.client_version),
                android_sdk_version: Some(defaults.youtube.android_sdk_version),
                data_api_endpoint: Some(defaults.youtube.data_api_endpoint),
                api_key: None,
            }),
            logging: Some(LoggingSettings {
                level: defaults.logging.level,
                format: Some(defaults.logging.format),
            }),
        }
    }

    /// Convert to ServerConfig
    pub fn into_server_config(self) -> ServerConfig {
        let storage_default = StorageConfig::default();
        let download_default = DownloadConfig::default();
        let youtube_default = YouTubeConfig::default();
        let logging_default = LoggingConfig::default();

        let storage = match self.storage {
            Some(s) => StorageConfig {
                work_dir: s.work_dir.unwrap_or(storage_default.work_dir),
            },
            None => storage_default,
        };

        let download = match self.download {
            Some(d) => DownloadConfig {
                connect_timeout_secs: d
                    .connect_timeout_secs
                    .unwrap_or(download_default.connect_timeout_secs),
                read_timeout_secs: d
                    .read_timeout_secs
                    .unwrap_or(download_default.read_timeout_secs),
                chunk_size_bytes: d
                    .chunk_size_bytes
                    .unwrap_or(download_default.chunk_size_bytes),
                user_agent: d.user_agent.unwrap_or(download_default.user_agent),
            },
            None => download_default,
        };

        let youtube = match self.youtube {
            Some(y) => YouTubeConfig {
                player_endpoint: y.player_endpoint.unwrap_or(youtube_default.player_endpoint),
                client_name: y.client_name.unwrap_or(youtube_default.client_name),
                client_version: y.client_version.unwrap_or(youtube_default.client_version),
                android_sdk_version: y
                    .android_sdk_version
                    .unwrap_or(youtube_default.android_sdk_version),
                data_api_endpoint: y
                    .data_api_endpoint
                    .unwrap_or(youtube_default.data_api_endpoint),
                api_key: y.api_key.filter(|k| !k.trim().is_empty()),
            },
            None => youtube_default,
        };

        let logging = match self.logging {
            Some(l) => LoggingConfig {
                level: l.level,
                format: l.format.unwrap_or(logging_default.format),
            },
            None => logging_default,
        };

        ServerConfig {
            host: self.server.host,
            port: self.server.port,
            cors_enabled: self.server.cors_enabled.unwrap_or(true),
            storage,
            download,
            youtube,
            logging,
        }
    }
}
