//! YouTube Data API v3 metadata client

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

use super::{MetadataLookup, VideoInfo};
use crate::error::{ConversionError, Result};

static DURATION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^P(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+(?:\.\d+)?)S)?)?$")
        .expect("duration pattern compiles")
});

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    id: String,
    snippet: Snippet,
    content_details: Option<ContentDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    channel_title: String,
    thumbnails: Option<Thumbnails>,
    #[serde(default)]
    tags: Vec<String>,
    category_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Thumbnails {
    high: Option<Thumbnail>,
    default: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ContentDetails {
    duration: Option<String>,
}

impl From<VideoItem> for VideoInfo {
    fn from(item: VideoItem) -> Self {
        let snippet = item.snippet;
        let thumbnail_url = snippet
            .thumbnails
            .and_then(|t| t.high.or(t.default))
            .map(|t| t.url);
        VideoInfo {
            video_id: item.id,
            title: snippet.title,
            description: snippet.description,
            thumbnail_url,
            channel_title: snippet.channel_title,
            published_at: snippet.published_at,
            duration: item
                .content_details
                .and_then(|d| d.duration)
                .and_then(|d| parse_iso8601_duration(&d)),
            tags: snippet.tags,
            categories: snippet.category_id.into_iter().collect(),
        }
    }
}

/// Metadata from `videos?part=snippet,contentDetails`
pub struct YouTubeMetadata {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl YouTubeMetadata {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl MetadataLookup for YouTubeMetadata {
    async fn lookup(&self, video_id: &str) -> Result<Option<VideoInfo>> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("part", "snippet,contentDetails"),
                ("id", video_id),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                ConversionError::SourceUnavailable(format!("metadata lookup for {} failed: {}", video_id, e))
            })?;

        let list: VideoListResponse = response.json().await.map_err(|e| {
            ConversionError::SourceUnavailable(format!("unreadable metadata for {}: {}", video_id, e))
        })?;

        let info = list.items.into_iter().next().map(VideoInfo::from);
        if info.is_none() {
            tracing::debug!(video_id, "No metadata found");
        }
        Ok(info)
    }
}

/// Seconds in an ISO-8601 duration such as `PT1H2M3S` or `P1DT2S`.
/// Fractional seconds are truncated.
pub fn parse_iso8601_duration(value: &str) -> Option<u64> {
    let caps = DURATION_REGEX.captures(value.trim())?;
    let part = |i: usize| -> Option<u64> {
        match caps.get(i) {
            Some(m) => m.as_str().split('.').next()?.parse().ok(),
            None => Some(0),
        }
    };
    let days = part(1)?;
    let hours = part(2)?;
    let minutes = part(3)?;
    let seconds = part(4)?;
    Some(((days * 24 + hours) * 60 + minutes) * 60 + seconds)
}
