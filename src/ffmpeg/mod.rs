//! FFmpeg library initialisation

pub use ffmpeg_next as ffmpeg;

use crate::error::FfmpegError;

/// Initialize FFmpeg. Call once at startup, before any conversion.
///
/// The library log level is lowered to warnings so demuxer and encoder
/// chatter does not flood stderr on every request.
pub fn init() -> Result<(), FfmpegError> {
    ffmpeg::init().map_err(|e| FfmpegError::InitFailed(format!("ffmpeg::init() failed: {}", e)))?;
    ffmpeg::util::log::set_level(ffmpeg::util::log::Level::Warning);

    tracing::info!(mp3_encoder = mp3_encoder_available(), "FFmpeg initialized");
    Ok(())
}

/// Whether this FFmpeg build can encode MP3
pub fn mp3_encoder_available() -> bool {
    crate::transcode::encoder::find_mp3_encoder(crate::policy::MP3_CODEC).is_some()
}
