//! Video metadata lookup
//!
//! Metadata is only used to name the downloaded file and to answer `/v1/info`;
//! a conversion never depends on it.

pub mod youtube;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;

pub use youtube::{parse_iso8601_duration, YouTubeMetadata};

/// Descriptive information about a video
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoInfo {
    pub video_id: String,
    pub title: String,
    pub description: String,
    pub thumbnail_url: Option<String>,
    pub channel_title: String,
    pub published_at: Option<DateTime<Utc>>,
    /// Length in seconds
    pub duration: Option<u64>,
    pub tags: Vec<String>,
    pub categories: Vec<String>,
}

#[async_trait]
pub trait MetadataLookup: Send + Sync {
    /// `Ok(None)` when the video does not exist or lookup is disabled.
    async fn lookup(&self, video_id: &str) -> Result<Option<VideoInfo>>;

    /// Whether `Ok(None)` from [`lookup`](Self::lookup) means the video does
    /// not exist.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Lookup used when no API key is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMetadata;

#[async_trait]
impl MetadataLookup for NoMetadata {
    async fn lookup(&self, _video_id: &str) -> Result<Option<VideoInfo>> {
        Ok(None)
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Title to show for a video, falling back to a generic one
pub fn display_title(info: Option<&VideoInfo>, video_id: &str) -> String {
    info.map(|i| i.title.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("YouTube Video {}", video_id))
}

/// Header-safe file name: every character outside `[A-Za-z0-9._-]` becomes
/// `_`, then `.mp3` is appended.
pub fn download_filename(title: &str) -> String {
    let stem: String = title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}.mp3", stem)
}
