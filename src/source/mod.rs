//! Audio source resolution
//!
//! An [`AudioSource`] lists the audio-only variants of a remote asset and
//! opens a lazy byte stream for one of them. [`resolve`] picks the best
//! variant with a deterministic total order and returns a handle that has
//! not transferred any bytes yet.

pub mod youtube;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::cmp::{Ordering, Reverse};
use std::fmt;

use crate::error::{ConversionError, Result};

pub use youtube::YouTubeSource;

/// Finite, single-use sequence of audio bytes
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// One audio-only rendition offered by the remote platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamVariant {
    /// Platform identifier of the rendition (e.g. an itag)
    pub variant_id: u32,
    /// Platform-defined quality rank; higher is better
    pub quality_score: u32,
    /// Advertised average bitrate in bits per second
    pub bitrate: u64,
    pub mime_type: String,
    /// File extension for the downloaded container
    pub media_extension: String,
    pub content_length: Option<u64>,
    /// Where the bytes live
    pub locator: String,
}

impl StreamVariant {
    /// Total order used to pick a variant: quality, then bitrate, then the
    /// lowest variant id.
    fn rank_cmp(&self, other: &Self) -> Ordering {
        (self.quality_score, self.bitrate, Reverse(self.variant_id)).cmp(&(
            other.quality_score,
            other.bitrate,
            Reverse(other.variant_id),
        ))
    }
}

/// Selected variant plus its not-yet-consumed byte source
pub struct AudioStreamHandle {
    pub quality_score: u32,
    pub media_extension: String,
    pub content_length: Option<u64>,
    pub variant_id: u32,
    pub bytes: ByteStream,
}

impl fmt::Debug for AudioStreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioStreamHandle")
            .field("quality_score", &self.quality_score)
            .field("media_extension", &self.media_extension)
            .field("content_length", &self.content_length)
            .field("variant_id", &self.variant_id)
            .finish_non_exhaustive()
    }
}

/// Remote platform that hosts the audio
#[async_trait]
pub trait AudioSource: Send + Sync {
    /// All audio-only variants of `source_id`, in provider order.
    ///
    /// Fails with `SourceUnavailable` when the asset cannot be located.
    async fn audio_variants(&self, source_id: &str) -> Result<Vec<StreamVariant>>;

    /// Lazy byte stream for `variant`. No request is made until polled.
    fn open(&self, variant: &StreamVariant) -> ByteStream;
}

/// Pick the best variant, or `None` when the list is empty.
pub fn select_best(variants: &[StreamVariant]) -> Option<&StreamVariant> {
    variants.iter().max_by(|a, b| a.rank_cmp(b))
}

/// Resolve `source_id` to a handle on its best audio-only stream.
pub async fn resolve(source: &dyn AudioSource, source_id: &str) -> Result<AudioStreamHandle> {
    let variants = source.audio_variants(source_id).await?;
    let best = select_best(&variants).ok_or_else(|| {
        ConversionError::SourceUnavailable(format!("no audio-only stream for {}", source_id))
    })?;

    tracing::debug!(
        source_id,
        candidates = variants.len(),
        variant_id = best.variant_id,
        quality_score = best.quality_score,
        bitrate = best.bitrate,
        mime = %best.mime_type,
        "Selected audio variant"
    );

    Ok(AudioStreamHandle {
        quality_score: best.quality_score,
        media_extension: best.media_extension.clone(),
        content_length: best.content_length,
        variant_id: best.variant_id,
        bytes: source.open(best),
    })
}
