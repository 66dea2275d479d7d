//! Audio decoder
//!
//! Wraps an FFmpeg `AVCodecContext` to decode the downloaded container's
//! audio packets (AAC, Opus, Vorbis, ...) into raw PCM frames.

use crate::error::FfmpegError;
use ffmpeg_next as ffmpeg;

pub struct AudioDecoder {
    decoder: ffmpeg::decoder::Audio,
    stream_index: usize,
}

impl AudioDecoder {
    /// Open a decoder from the stream's own codec parameters.
    pub fn open(stream: &ffmpeg::format::stream::Stream) -> Result<Self, FfmpegError> {
        let stream_index = stream.index();
        let context =
            ffmpeg::codec::Context::from_parameters(stream.parameters()).map_err(|e| {
                FfmpegError::DecoderCreate(format!(
                    "codec context for stream {}: {}",
                    stream_index, e
                ))
            })?;

        let decoder = context.decoder().audio().map_err(|e| {
            FfmpegError::DecoderCreate(format!("audio decoder for stream {}: {}", stream_index, e))
        })?;

        Ok(Self {
            decoder,
            stream_index,
        })
    }

    /// Send a compressed packet. `AVERROR_INVALIDDATA` is skipped: Opus
    /// pre-roll packets produce it and the stream stays decodable.
    pub fn send_packet(&mut self, packet: &ffmpeg::codec::packet::Packet) -> Result<(), FfmpegError> {
        match self.decoder.send_packet(packet) {
            Ok(()) => Ok(()),
            Err(ffmpeg::Error::InvalidData) => {
                tracing::debug!(
                    stream_index = self.stream_index,
                    "Skipping undecodable packet"
                );
                Ok(())
            }
            Err(e) => Err(FfmpegError::DecodePacket(format!(
                "send_packet on stream {}: {}",
                self.stream_index, e
            ))),
        }
    }

    pub fn send_eof(&mut self) -> Result<(), FfmpegError> {
        match self.decoder.send_eof() {
            Ok(()) => Ok(()),
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => Ok(()),
            Err(ffmpeg::Error::Eof) => Ok(()),
            Err(e) => Err(FfmpegError::DecodePacket(format!(
                "send_eof on stream {}: {}",
                self.stream_index, e
            ))),
        }
    }

    /// One decoded frame, or `None` when the decoder needs more input.
    pub fn receive_frame(&mut self) -> Result<Option<ffmpeg::util::frame::Audio>, FfmpegError> {
        let mut frame = ffmpeg::util::frame::Audio::empty();
        match self.decoder.receive_frame(&mut frame) {
            Ok(()) => Ok(Some(frame)),
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => Ok(None),
            Err(ffmpeg::Error::Eof) => Ok(None),
            Err(e) => Err(FfmpegError::DecodePacket(format!(
                "receive_frame on stream {}: {}",
                self.stream_index, e
            ))),
        }
    }

    pub fn stream_index(&self) -> usize {
        self.stream_index
    }
}
