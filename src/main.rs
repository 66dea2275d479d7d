//! tube2mp3 server
//!
//! HTTP front end for the download-and-transcode pipeline.

use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tube2mp3::config::{LoggingConfig, ServerConfig};
use tube2mp3::config_file::ConfigFile;
use tube2mp3::http::create_router;
use tube2mp3::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
const APP_NAME: &str = "tube2mp3";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    if config_path == "--print-config" {
        println!("{}", default_config_toml()?);
        return Ok(());
    }
    let (mut config, load_error) = load_config(&config_path);
    config.apply_env();

    init_logging(&config.logging);
    tracing::info!("{} v{} starting", APP_NAME, VERSION);
    if let Some(e) = load_error {
        tracing::warn!("Failed to load config file {}: {}. Using defaults.", config_path, e);
    }

    tube2mp3::ffmpeg::init()?;
    if !tube2mp3::ffmpeg::mp3_encoder_available() {
        tracing::warn!("This FFmpeg build has no MP3 encoder; conversions will fail");
    }

    tracing::info!(
        work_dir = %config.storage.work_dir.display(),
        metadata = config.youtube.api_key.is_some(),
        "Configuration loaded"
    );

    let addr: SocketAddr = config.socket_addr().parse()?;
    let state = Arc::new(AppState::new(config)?);
    let app = create_router(state);

    tracing::info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Read the config file if present. Logging is not up yet, so a load error
/// is returned for the caller to report.
fn load_config(path: &str) -> (ServerConfig, Option<String>) {
    if !std::path::Path::new(path).exists() {
        return (ServerConfig::default(), None);
    }
    match ConfigFile::from_file(path) {
        Ok(cf) => (cf.into_server_config(), None),
        Err(e) => (ServerConfig::default(), Some(e.to_string())),
    }
}

/// Default settings rendered as a starting `config.toml`
fn default_config_toml() -> Result<String, toml::ser::Error> {
    toml::to_string_pretty(&ConfigFile::default_config())
}

/// Initialize logging with tracing. `RUST_LOG` overrides the configured level.
fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("tube2mp3={},tower_http={}", logging.level, logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
