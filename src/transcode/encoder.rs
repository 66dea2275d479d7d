//! MP3 encoder
//!
//! Wraps an FFmpeg `AVCodecContext` that turns planar float PCM into MP3
//! packets at the configured bitrate.

use crate::error::FfmpegError;
use crate::policy::EncodingParameters;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::codec;

use super::resampler::{layout_for_channels, ENCODER_SAMPLE_FORMAT};

/// Samples per channel in one MPEG-1 Layer III frame
pub const MP3_FRAME_SIZE: usize = 1152;

pub struct Mp3Encoder {
    encoder: ffmpeg::encoder::Audio,
    frame_size: usize,
    time_base: ffmpeg::Rational,
    pts: i64,
}

/// Look up the encoder named by the parameters, falling back to whatever
/// MP3 encoder the FFmpeg build registers.
pub fn find_mp3_encoder(codec_name: &str) -> Option<codec::Codec> {
    codec::encoder::find_by_name(codec_name).or_else(|| codec::encoder::find(codec::Id::MP3))
}

impl Mp3Encoder {
    pub fn open(params: &EncodingParameters) -> Result<Self, FfmpegError> {
        let codec = find_mp3_encoder(params.codec_name).ok_or_else(|| {
            FfmpegError::EncoderNotFound(format!(
                "{} is not available in this FFmpeg build",
                params.codec_name
            ))
        })?;

        let rate = params.sample_rate_hz as i32;
        let time_base = ffmpeg::Rational::new(1, rate);

        let mut context = codec::Context::new_with_codec(codec);
        context.set_time_base(time_base);

        let mut audio = context.encoder().audio().map_err(|e| {
            FfmpegError::EncoderCreate(format!("audio encoder handle: {}", e))
        })?;
        audio.set_rate(rate);
        audio.set_format(ENCODER_SAMPLE_FORMAT);
        audio.set_channel_layout(layout_for_channels(params.channel_count));
        audio.set_bit_rate(params.bit_rate_bps as usize);

        let encoder = audio.open_as(codec).map_err(|e| {
            FfmpegError::EncoderCreate(format!(
                "open {} at {} bps: {}",
                params.codec_name, params.bit_rate_bps, e
            ))
        })?;

        let frame_size = match encoder.frame_size() as usize {
            0 => MP3_FRAME_SIZE,
            n => n,
        };

        Ok(Self {
            encoder,
            frame_size,
            time_base,
            pts: 0,
        })
    }

    pub fn send_frame(&mut self, frame: &ffmpeg::util::frame::Audio) -> Result<(), FfmpegError> {
        self.encoder
            .send_frame(frame)
            .map_err(|e| FfmpegError::EncodeFrame(format!("send_frame: {}", e)))
    }

    pub fn send_eof(&mut self) -> Result<(), FfmpegError> {
        match self.encoder.send_eof() {
            Ok(()) | Err(ffmpeg::Error::Eof) => Ok(()),
            Err(e) => Err(FfmpegError::EncodeFrame(format!("send_eof: {}", e))),
        }
    }

    /// One encoded packet, or `None` when the encoder needs more input.
    pub fn receive_packet(&mut self) -> Result<Option<ffmpeg::codec::packet::Packet>, FfmpegError> {
        let mut packet = ffmpeg::codec::packet::Packet::empty();
        match self.encoder.receive_packet(&mut packet) {
            Ok(()) => {
                if packet.pts().is_none() {
                    packet.set_pts(Some(self.pts));
                    packet.set_dts(Some(self.pts));
                }
                self.pts += self.frame_size as i64;
                Ok(Some(packet))
            }
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => Ok(None),
            Err(ffmpeg::Error::Eof) => Ok(None),
            Err(e) => Err(FfmpegError::EncodeFrame(format!("receive_packet: {}", e))),
        }
    }

    /// Samples per channel expected in each input frame
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn time_base(&self) -> ffmpeg::Rational {
        self.time_base
    }

    /// Codec parameters for the output stream
    pub fn codec_parameters(&self) -> ffmpeg::codec::Parameters {
        ffmpeg::codec::Parameters::from(&self.encoder)
    }
}
