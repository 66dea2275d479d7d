//! In-memory collaborators for pipeline and router tests
//!
//! No network and no FFmpeg codec: the source serves canned bytes and the
//! engine writes a recognisable fake MP3.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::Poll;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::error::{ConversionError, EngineError, Result};
use crate::metadata::{MetadataLookup, NoMetadata, VideoInfo};
use crate::pipeline::Pipeline;
use crate::policy::EncodingParameters;
use crate::source::{AudioSource, ByteStream, StreamVariant};
use crate::state::AppState;
use crate::storage::StorageManager;
use crate::transcode::EncodingEngine;

enum SourceMode {
    Audio(Vec<u8>),
    FailAfter(Vec<u8>),
    StallAfter(Vec<u8>),
    PanicAfter(Vec<u8>),
    NoVariants,
    Missing,
}

/// Serves one `audio/mp4` variant from memory
pub struct FakeSource {
    mode: SourceMode,
    opened: AtomicUsize,
}

impl FakeSource {
    fn new(mode: SourceMode) -> Self {
        Self {
            mode,
            opened: AtomicUsize::new(0),
        }
    }

    pub fn with_audio(bytes: Vec<u8>) -> Self {
        Self::new(SourceMode::Audio(bytes))
    }

    /// Sends `bytes`, then a connection reset
    pub fn failing_after(bytes: Vec<u8>) -> Self {
        Self::new(SourceMode::FailAfter(bytes))
    }

    /// Sends `bytes`, then never yields again
    pub fn stalling_after(bytes: Vec<u8>) -> Self {
        Self::new(SourceMode::StallAfter(bytes))
    }

    /// Sends `bytes`, then panics inside the stream
    pub fn panicking_after(bytes: Vec<u8>) -> Self {
        Self::new(SourceMode::PanicAfter(bytes))
    }

    /// Video exists but has only video-only formats
    pub fn without_audio() -> Self {
        Self::new(SourceMode::NoVariants)
    }

    /// Video does not exist
    pub fn missing() -> Self {
        Self::new(SourceMode::Missing)
    }

    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    fn payload(&self) -> &[u8] {
        match &self.mode {
            SourceMode::Audio(b)
            | SourceMode::FailAfter(b)
            | SourceMode::StallAfter(b)
            | SourceMode::PanicAfter(b) => b,
            _ => &[],
        }
    }
}

#[async_trait]
impl AudioSource for FakeSource {
    async fn audio_variants(&self, source_id: &str) -> Result<Vec<StreamVariant>> {
        match self.mode {
            SourceMode::Missing => Err(ConversionError::SourceUnavailable(format!(
                "{} does not exist",
                source_id
            ))),
            SourceMode::NoVariants => Ok(vec![]),
            _ => {
                let content_length = match self.mode {
                    SourceMode::Audio(ref b) => Some(b.len() as u64),
                    _ => None,
                };
                Ok(vec![
                    StreamVariant {
                        variant_id: 139,
                        quality_score: 2,
                        bitrate: 48_000,
                        mime_type: "audio/mp4; codecs=\"mp4a.40.5\"".into(),
                        media_extension: "m4a".into(),
                        content_length,
                        locator: "mem://139".into(),
                    },
                    StreamVariant {
                        variant_id: 140,
                        quality_score: 3,
                        bitrate: 128_000,
                        mime_type: "audio/mp4; codecs=\"mp4a.40.2\"".into(),
                        media_extension: "m4a".into(),
                        content_length,
                        locator: "mem://140".into(),
                    },
                ])
            }
        }
    }

    fn open(&self, _variant: &StreamVariant) -> ByteStream {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let payload = Bytes::copy_from_slice(self.payload());
        let halves = vec![
            Ok(payload.slice(..payload.len() / 2)),
            Ok(payload.slice(payload.len() / 2..)),
        ];
        match self.mode {
            SourceMode::FailAfter(_) => futures::stream::iter(halves)
                .chain(futures::stream::once(async {
                    Err(std::io::Error::new(
                        std::io::ErrorKind::ConnectionReset,
                        "connection reset by peer",
                    ))
                }))
                .boxed(),
            SourceMode::StallAfter(_) => futures::stream::iter(halves)
                .chain(futures::stream::pending())
                .boxed(),
            SourceMode::PanicAfter(_) => futures::stream::iter(halves)
                .chain(futures::stream::poll_fn(
                    |_| -> Poll<Option<std::io::Result<Bytes>>> {
                        panic!("source stream crashed mid-transfer")
                    },
                ))
                .boxed(),
            _ => futures::stream::iter(halves).boxed(),
        }
    }
}

enum EngineMode {
    Succeed,
    FailWithPartial(&'static str),
    WaitForCancel,
}

/// Writes `MP3_MAGIC` followed by the source bytes
pub struct FakeEngine {
    mode: EngineMode,
    last_params: Mutex<Option<EncodingParameters>>,
    calls: AtomicUsize,
}

impl FakeEngine {
    pub const MP3_MAGIC: &'static [u8] = b"ID3\x04\x00";

    fn new(mode: EngineMode) -> Self {
        Self {
            mode,
            last_params: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(EngineMode::Succeed)
    }

    /// Writes some output, then reports `message`
    pub fn failing(message: &'static str) -> Self {
        Self::new(EngineMode::FailWithPartial(message))
    }

    /// Blocks until cancelled
    pub fn waiting_for_cancel() -> Self {
        Self::new(EngineMode::WaitForCancel)
    }

    pub fn last_bit_rate(&self) -> Option<u64> {
        self.last_params
            .lock()
            .ok()
            .and_then(|p| p.as_ref().map(|p| p.bit_rate_bps))
    }

    pub fn last_params(&self) -> Option<EncodingParameters> {
        self.last_params.lock().ok().and_then(|p| p.clone())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EncodingEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    fn encode(
        &self,
        source: &Path,
        target: &Path,
        params: &EncodingParameters,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_params.lock() {
            *last = Some(params.clone());
        }

        let input = std::fs::read(source)?;
        let mut output = Self::MP3_MAGIC.to_vec();

        match self.mode {
            EngineMode::Succeed => {
                output.extend_from_slice(&input);
                std::fs::write(target, output)?;
                Ok(())
            }
            EngineMode::FailWithPartial(message) => {
                std::fs::write(target, output)?;
                Err(EngineError::Io(std::io::Error::other(message)))
            }
            EngineMode::WaitForCancel => {
                std::fs::write(target, output)?;
                for _ in 0..1000 {
                    if cancel.is_cancelled() {
                        return Err(EngineError::Cancelled);
                    }
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(EngineError::Io(std::io::Error::other("never cancelled")))
            }
        }
    }
}

/// Metadata that answers with `info` after `delay`
pub struct FakeMetadata {
    info: Option<VideoInfo>,
    delay: Duration,
}

impl FakeMetadata {
    pub fn found(title: &str) -> Self {
        Self {
            info: Some(VideoInfo {
                video_id: "abc12345678".into(),
                title: title.into(),
                description: String::new(),
                thumbnail_url: None,
                channel_title: "Channel".into(),
                published_at: None,
                duration: Some(212),
                tags: vec![],
                categories: vec![],
            }),
            delay: Duration::ZERO,
        }
    }

    /// Enabled lookup that finds nothing
    pub fn not_found() -> Self {
        Self {
            info: None,
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl MetadataLookup for FakeMetadata {
    async fn lookup(&self, _video_id: &str) -> Result<Option<VideoInfo>> {
        tokio::time::sleep(self.delay).await;
        Ok(self.info.clone())
    }
}

pub fn pipeline_in(dir: &Path, source: Arc<FakeSource>, engine: Arc<FakeEngine>) -> Pipeline {
    Pipeline::new(source, engine, StorageManager::new(dir))
}

/// State whose source has no audio and whose metadata lookup is disabled
pub fn test_state(dir: &Path, config: ServerConfig) -> Arc<AppState> {
    test_state_with(
        dir,
        config,
        Arc::new(FakeSource::without_audio()),
        Arc::new(FakeEngine::succeeding()),
    )
}

pub fn test_state_with(
    dir: &Path,
    config: ServerConfig,
    source: Arc<FakeSource>,
    engine: Arc<FakeEngine>,
) -> Arc<AppState> {
    test_state_with_metadata(dir, config, source, engine, Arc::new(NoMetadata))
}

pub fn test_state_with_metadata(
    dir: &Path,
    config: ServerConfig,
    source: Arc<FakeSource>,
    engine: Arc<FakeEngine>,
    metadata: Arc<dyn MetadataLookup>,
) -> Arc<AppState> {
    Arc::new(AppState::with_parts(
        config,
        pipeline_in(dir, source, engine),
        metadata,
    ))
}
