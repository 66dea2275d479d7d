//! YouTube audio source
//!
//! Queries the player endpoint for the adaptive formats of a video and keeps
//! the audio-only ones that carry a direct URL. Downloads are issued as a
//! lazy series of `Range` requests so large files are not throttled.

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::RANGE;
use serde::Deserialize;
use serde_json::json;

use super::{AudioSource, ByteStream, StreamVariant};
use crate::config::YouTubeConfig;
use crate::error::{ConversionError, Result};

/// Player response, reduced to the fields we read
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerResponse {
    playability_status: Option<PlayabilityStatus>,
    streaming_data: Option<StreamingData>,
}

#[derive(Debug, Deserialize)]
struct PlayabilityStatus {
    status: String,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamingData {
    #[serde(default)]
    adaptive_formats: Vec<RawFormat>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFormat {
    itag: u32,
    url: Option<String>,
    mime_type: String,
    #[serde(default)]
    bitrate: u64,
    content_length: Option<String>,
    audio_quality: Option<String>,
}

/// Resolver backed by the YouTube player endpoint
pub struct YouTubeSource {
    client: reqwest::Client,
    config: YouTubeConfig,
    chunk_size: u64,
}

impl YouTubeSource {
    pub fn new(client: reqwest::Client, config: YouTubeConfig, chunk_size: u64) -> Self {
        Self {
            client,
            config,
            chunk_size: chunk_size.max(1),
        }
    }

    async fn fetch_player(&self, source_id: &str) -> Result<PlayerResponse> {
        let body = json!({
            "videoId": source_id,
            "context": {
                "client": {
                    "clientName": self.config.client_name,
                    "clientVersion": self.config.client_version,
                    "androidSdkVersion": self.config.android_sdk_version,
                    "hl": "en",
                    "gl": "US",
                }
            },
            "contentCheckOk": true,
            "racyCheckOk": true,
        });

        let response = self
            .client
            .post(&self.config.player_endpoint)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                ConversionError::SourceUnavailable(format!(
                    "player lookup for {} failed: {}",
                    source_id, e
                ))
            })?;

        response.json::<PlayerResponse>().await.map_err(|e| {
            ConversionError::SourceUnavailable(format!(
                "unreadable player response for {}: {}",
                source_id, e
            ))
        })
    }
}

#[async_trait]
impl AudioSource for YouTubeSource {
    async fn audio_variants(&self, source_id: &str) -> Result<Vec<StreamVariant>> {
        let player = self.fetch_player(source_id).await?;

        if let Some(status) = &player.playability_status {
            if status.status != "OK" {
                return Err(ConversionError::SourceUnavailable(format!(
                    "{} is not playable ({}): {}",
                    source_id,
                    status.status,
                    status.reason.as_deref().unwrap_or("no reason given")
                )));
            }
        }

        let formats = player
            .streaming_data
            .map(|s| s.adaptive_formats)
            .ok_or_else(|| {
                ConversionError::SourceUnavailable(format!("{} has no streaming data", source_id))
            })?;

        Ok(audio_variants_from(formats))
    }

    fn open(&self, variant: &StreamVariant) -> ByteStream {
        let client = self.client.clone();
        let url = variant.locator.clone();

        match variant.content_length {
            Some(length) => {
                let ranges = chunk_ranges(length, self.chunk_size);
                futures::stream::iter(ranges)
                    .then(move |(start, end)| {
                        let request = client
                            .get(&url)
                            .header(RANGE, format!("bytes={}-{}", start, end));
                        async move {
                            request
                                .send()
                                .await
                                .and_then(|r| r.error_for_status())
                                .map(|r| r.bytes_stream())
                        }
                    })
                    .try_flatten()
                    .map_err(std::io::Error::other)
                    .boxed()
            }
            None => futures::stream::once(async move {
                client
                    .get(&url)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map(|r| r.bytes_stream())
            })
            .try_flatten()
            .map_err(std::io::Error::other)
            .boxed(),
        }
    }
}

fn audio_variants_from(formats: Vec<RawFormat>) -> Vec<StreamVariant> {
    formats
        .into_iter()
        .filter(|f| f.mime_type.starts_with("audio/"))
        .filter_map(|f| {
            let Some(url) = f.url else {
                tracing::debug!(itag = f.itag, "Skipping ciphered audio format");
                return None;
            };
            Some(StreamVariant {
                variant_id: f.itag,
                quality_score: audio_quality_score(f.audio_quality.as_deref()),
                bitrate: f.bitrate,
                media_extension: extension_for_mime(&f.mime_type),
                content_length: f.content_length.and_then(|l| l.parse().ok()),
                mime_type: f.mime_type,
                locator: url,
            })
        })
        .collect()
}

/// Rank of the platform's `audioQuality` label
pub fn audio_quality_score(label: Option<&str>) -> u32 {
    match label {
        Some("AUDIO_QUALITY_ULTRALOW") => 1,
        Some("AUDIO_QUALITY_LOW") => 2,
        Some("AUDIO_QUALITY_MEDIUM") => 3,
        Some("AUDIO_QUALITY_HIGH") => 4,
        _ => 0,
    }
}

/// File extension for an `audio/<subtype>; codecs=...` mime type
pub fn extension_for_mime(mime: &str) -> String {
    let subtype = mime
        .split(';')
        .next()
        .and_then(|essence| essence.trim().split('/').nth(1))
        .unwrap_or("bin");
    match subtype {
        "mp4" => "m4a".to_string(),
        other => other.to_string(),
    }
}

/// Inclusive byte ranges covering `length` bytes in `chunk` sized pieces
pub fn chunk_ranges(length: u64, chunk: u64) -> Vec<(u64, u64)> {
    let chunk = chunk.max(1);
    let mut ranges = Vec::new();
    let mut start = 0;
    while start < length {
        let end = (start + chunk).min(length) - 1;
        ranges.push((start, end));
        start = end + 1;
    }
    ranges
}
