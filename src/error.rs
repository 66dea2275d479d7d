use serde::Serialize;
use thiserror::Error;

/// Classified failure of a single conversion.
///
/// Every stage failure is converted into one of these at the pipeline
/// boundary; nothing else escapes [`crate::pipeline::Pipeline::convert`].
#[derive(Error, Debug)]
pub enum ConversionError {
    /// Bad bitrate or identifier, rejected before any work starts
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The remote asset is missing or exposes no audio-only stream
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// Network or stream error while transferring the audio bytes
    #[error("Download failed: {0}")]
    DownloadFailed(String),

    /// The encoding engine reported an error
    #[error("Encode failed: {0}")]
    EncodeFailed(String),

    /// Working paths could not be allocated or written
    #[error("Storage failure: {0}")]
    StorageFailed(String),

    /// The caller cancelled the conversion
    #[error("Conversion cancelled")]
    Cancelled,
}

/// Serialisable failure classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    InvalidInput,
    SourceUnavailable,
    DownloadFailed,
    EncodeFailed,
    StorageFailed,
    Cancelled,
}

impl ConversionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ConversionError::InvalidInput(_) => FailureKind::InvalidInput,
            ConversionError::SourceUnavailable(_) => FailureKind::SourceUnavailable,
            ConversionError::DownloadFailed(_) => FailureKind::DownloadFailed,
            ConversionError::EncodeFailed(_) => FailureKind::EncodeFailed,
            ConversionError::StorageFailed(_) => FailureKind::StorageFailed,
            ConversionError::Cancelled => FailureKind::Cancelled,
        }
    }

    /// Whether the failure is an operational fault of this server rather
    /// than a problem with the request or the remote asset.
    pub fn is_server_fault(&self) -> bool {
        matches!(
            self,
            ConversionError::EncodeFailed(_) | ConversionError::StorageFailed(_)
        )
    }
}

/// Errors raised by an [`crate::transcode::EncodingEngine`]
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("FFmpeg error: {0}")]
    Ffmpeg(#[from] FfmpegError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encoding cancelled")]
    Cancelled,
}

/// FFmpeg-specific errors
#[derive(Error, Debug)]
pub enum FfmpegError {
    #[error("FFmpeg initialization failed: {0}")]
    InitFailed(String),

    #[error("Failed to open input file: {0}")]
    OpenInput(String),

    #[error("No audio stream in input: {0}")]
    NoAudioStream(String),

    #[error("Failed to create decoder: {0}")]
    DecoderCreate(String),

    #[error("Failed to decode packet: {0}")]
    DecodePacket(String),

    #[error("Failed to find encoder: {0}")]
    EncoderNotFound(String),

    #[error("Failed to create encoder: {0}")]
    EncoderCreate(String),

    #[error("Failed to encode frame: {0}")]
    EncodeFrame(String),

    #[error("Failed to create resampler: {0}")]
    ResamplerCreate(String),

    #[error("Resampling error: {0}")]
    Resample(String),

    #[error("Failed to create muxer: {0}")]
    MuxerCreate(String),

    #[error("Failed to write header: {0}")]
    WriteHeader(String),

    #[error("Failed to write packet: {0}")]
    WritePacket(String),

    #[error("Failed to write trailer: {0}")]
    WriteTrailer(String),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ConversionError>;
