//! Application state shared by the HTTP handlers

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::metadata::{MetadataLookup, NoMetadata, YouTubeMetadata};
use crate::pipeline::Pipeline;
use crate::source::YouTubeSource;
use crate::storage::StorageManager;
use crate::transcode::FfmpegEngine;

pub struct AppState {
    pub config: ServerConfig,
    pub pipeline: Pipeline,
    pub metadata: Arc<dyn MetadataLookup>,
}

impl AppState {
    /// Wire the production collaborators from `config`.
    pub fn new(config: ServerConfig) -> Result<Self, reqwest::Error> {
        let client = config.download.build_client()?;

        let source = YouTubeSource::new(
            client.clone(),
            config.youtube.clone(),
            config.download.chunk_size_bytes,
        );
        let pipeline = Pipeline::new(
            Arc::new(source),
            Arc::new(FfmpegEngine::new()),
            StorageManager::new(config.storage.work_dir.clone()),
        );

        let metadata: Arc<dyn MetadataLookup> = match &config.youtube.api_key {
            Some(key) => Arc::new(YouTubeMetadata::new(
                client,
                config.youtube.data_api_endpoint.clone(),
                key.clone(),
            )),
            None => {
                tracing::warn!("No YouTube API key configured; video titles will not be looked up");
                Arc::new(NoMetadata)
            }
        };

        Ok(Self::with_parts(config, pipeline, metadata))
    }

    pub fn with_parts(config: ServerConfig, pipeline: Pipeline, metadata: Arc<dyn MetadataLookup>) -> Self {
        Self {
            config,
            pipeline,
            metadata,
        }
    }
}
