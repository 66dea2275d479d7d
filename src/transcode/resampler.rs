//! Audio resampler
//!
//! Converts decoded PCM frames to planar float at the requested output
//! rate and channel count, which is what the MP3 encoder consumes.

use crate::error::FfmpegError;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::software::resampling;
use ffmpeg_next::util::channel_layout::ChannelLayout;
use ffmpeg_next::util::format::sample::Sample;

/// Sample format fed to the encoder
pub const ENCODER_SAMPLE_FORMAT: Sample = Sample::F32(ffmpeg::util::format::sample::Type::Planar);

/// Channel layout for an output channel count
pub fn layout_for_channels(channels: u16) -> ChannelLayout {
    if channels == 1 {
        ChannelLayout::MONO
    } else {
        ChannelLayout::STEREO
    }
}

/// Wraps FFmpeg's `SwrContext`
pub struct AudioResampler {
    context: resampling::Context,
}

impl AudioResampler {
    /// Build a resampler from the format of the first decoded frame.
    pub fn new(
        src_frame: &ffmpeg::util::frame::Audio,
        target_rate: u32,
        target_channels: u16,
    ) -> Result<Self, FfmpegError> {
        // Some demuxers leave the layout unset; derive it from the count
        let src_layout = if src_frame.channel_layout().bits() == 0 {
            layout_for_channels(src_frame.channels())
        } else {
            src_frame.channel_layout()
        };

        let context = resampling::Context::get(
            src_frame.format(),
            src_layout,
            src_frame.rate(),
            ENCODER_SAMPLE_FORMAT,
            layout_for_channels(target_channels),
            target_rate,
        )
        .map_err(|e| {
            FfmpegError::ResamplerCreate(format!(
                "{:?} {} Hz {} ch -> {} Hz {} ch: {}",
                src_frame.format(),
                src_frame.rate(),
                src_frame.channels(),
                target_rate,
                target_channels,
                e
            ))
        })?;

        Ok(Self { context })
    }

    /// Convert one frame. Returns `None` while the resampler is still
    /// buffering.
    pub fn convert(
        &mut self,
        frame: &ffmpeg::util::frame::Audio,
    ) -> Result<Option<ffmpeg::util::frame::Audio>, FfmpegError> {
        // swr_convert_frame allocates the output buffer itself
        let mut out = ffmpeg::util::frame::Audio::empty();
        self.context
            .run(frame, &mut out)
            .map_err(|e| FfmpegError::Resample(e.to_string()))?;

        Ok((out.samples() > 0).then_some(out))
    }

    /// Drain delayed samples. A passthrough context has nothing buffered and
    /// reports an error here, which is not a failure.
    pub fn flush(&mut self) -> Option<ffmpeg::util::frame::Audio> {
        let mut out = ffmpeg::util::frame::Audio::empty();
        if let Err(e) = self.context.flush(&mut out) {
            tracing::debug!("Resampler flush returned nothing: {}", e);
            return None;
        }
        (out.samples() > 0).then_some(out)
    }
}
