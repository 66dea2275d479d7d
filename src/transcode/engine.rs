//! In-process FFmpeg encoding engine
//!
//! demux -> decode -> resample (FLTP) -> re-frame -> MP3 encode -> mp3 mux,
//! one file in, one file out. Cancellation is polled between packets.

use std::path::Path;

use ffmpeg_next as ffmpeg;
use tokio_util::sync::CancellationToken;

use super::decoder::AudioDecoder;
use super::encoder::Mp3Encoder;
use super::planes::SampleFifo;
use super::resampler::{layout_for_channels, AudioResampler};
use super::EncodingEngine;
use crate::error::{EngineError, FfmpegError};
use crate::policy::EncodingParameters;

/// Output container short name
const OUTPUT_FORMAT: &str = "mp3";

#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegEngine;

impl FfmpegEngine {
    pub fn new() -> Self {
        Self
    }
}

impl EncodingEngine for FfmpegEngine {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn encode(
        &self,
        source: &Path,
        target: &Path,
        params: &EncodingParameters,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        transcode_file(source, target, params, cancel)
    }
}

/// Muxer plus the bookkeeping needed to write encoder packets into it
struct Mp3Writer {
    output: ffmpeg::format::context::Output,
    encoder_time_base: ffmpeg::Rational,
    stream_time_base: ffmpeg::Rational,
    packets: u64,
}

impl Mp3Writer {
    fn create(target: &Path, encoder: &Mp3Encoder) -> Result<Self, FfmpegError> {
        let mut output = ffmpeg::format::output_as(&target, OUTPUT_FORMAT).map_err(|e| {
            FfmpegError::MuxerCreate(format!("{}: {}", target.display(), e))
        })?;

        {
            let mut stream = output
                .add_stream(ffmpeg::encoder::find(ffmpeg::codec::Id::None))
                .map_err(|e| FfmpegError::MuxerCreate(format!("add_stream: {}", e)))?;
            stream.set_parameters(encoder.codec_parameters());
            stream.set_time_base(encoder.time_base());
        }

        output
            .write_header()
            .map_err(|e| FfmpegError::WriteHeader(e.to_string()))?;

        // The muxer may pick its own stream time base in write_header
        let stream_time_base = output
            .stream(0)
            .map(|s| s.time_base())
            .ok_or_else(|| FfmpegError::MuxerCreate("output stream missing after header".into()))?;

        Ok(Self {
            output,
            encoder_time_base: encoder.time_base(),
            stream_time_base,
            packets: 0,
        })
    }

    fn write(&mut self, mut packet: ffmpeg::codec::packet::Packet) -> Result<(), FfmpegError> {
        packet.set_stream(0);
        packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
        packet
            .write_interleaved(&mut self.output)
            .map_err(|e| FfmpegError::WritePacket(format!("packet {}: {}", self.packets, e)))?;
        self.packets += 1;
        Ok(())
    }

    fn drain(&mut self, encoder: &mut Mp3Encoder) -> Result<(), FfmpegError> {
        while let Some(packet) = encoder.receive_packet()? {
            self.write(packet)?;
        }
        Ok(())
    }

    fn finish(mut self) -> Result<u64, FfmpegError> {
        self.output
            .write_trailer()
            .map_err(|e| FfmpegError::WriteTrailer(e.to_string()))?;
        Ok(self.packets)
    }
}

/// Feeds decoded frames through resampler, FIFO and encoder
struct FrameSink {
    resampler: Option<AudioResampler>,
    fifo: SampleFifo,
    encoder: Mp3Encoder,
    writer: Mp3Writer,
    rate: u32,
    channels: u16,
    next_pts: i64,
}

impl FrameSink {
    fn push(&mut self, frame: &ffmpeg::util::frame::Audio) -> Result<(), FfmpegError> {
        if self.resampler.is_none() {
            tracing::debug!(
                sample_rate = frame.rate(),
                channels = frame.channels(),
                format = ?frame.format(),
                "Creating resampler from first decoded frame"
            );
            self.resampler = Some(AudioResampler::new(frame, self.rate, self.channels)?);
        }

        let resampled = match self.resampler.as_mut() {
            Some(r) => r.convert(frame)?,
            None => None,
        };
        if let Some(resampled) = resampled {
            self.queue(&resampled)?;
        }
        self.encode_ready(false)
    }

    fn queue(&mut self, frame: &ffmpeg::util::frame::Audio) -> Result<(), FfmpegError> {
        if self.fifo.push_frame(frame) {
            Ok(())
        } else {
            Err(FfmpegError::Resample(format!(
                "unreadable planar frame ({} samples, {:?})",
                frame.samples(),
                frame.format()
            )))
        }
    }

    fn encode_ready(&mut self, drain: bool) -> Result<(), FfmpegError> {
        let layout = layout_for_channels(self.channels);
        while let Some(frame) = self.fifo.pop_frame(drain, self.rate, layout, self.next_pts) {
            self.next_pts += frame.samples() as i64;
            self.encoder.send_frame(&frame)?;
            self.writer.drain(&mut self.encoder)?;
        }
        Ok(())
    }

    fn finish(mut self) -> Result<u64, FfmpegError> {
        if let Some(tail) = self.resampler.as_mut().and_then(|r| r.flush()) {
            self.queue(&tail)?;
        }
        self.encode_ready(true)?;
        self.encoder.send_eof()?;
        self.writer.drain(&mut self.encoder)?;
        self.writer.finish()
    }
}

fn transcode_file(
    source: &Path,
    target: &Path,
    params: &EncodingParameters,
    cancel: &CancellationToken,
) -> Result<(), EngineError> {
    let mut input = ffmpeg::format::input(&source)
        .map_err(|e| FfmpegError::OpenInput(format!("{}: {}", source.display(), e)))?;

    let stream = input
        .streams()
        .best(ffmpeg::media::Type::Audio)
        .ok_or_else(|| FfmpegError::NoAudioStream(source.display().to_string()))?;
    let stream_index = stream.index();
    let mut decoder = AudioDecoder::open(&stream)?;
    drop(stream);

    let encoder = Mp3Encoder::open(params)?;
    let writer = Mp3Writer::create(target, &encoder)?;
    let mut sink = FrameSink {
        resampler: None,
        fifo: SampleFifo::new(params.channel_count as usize, encoder.frame_size()),
        encoder,
        writer,
        rate: params.sample_rate_hz,
        channels: params.channel_count,
        next_pts: 0,
    };

    tracing::debug!(
        source = %source.display(),
        target = %target.display(),
        stream_index,
        bit_rate = params.bit_rate_bps,
        "Starting MP3 encode"
    );

    for (stream, packet) in input.packets() {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        if stream.index() != stream_index {
            continue;
        }
        decoder.send_packet(&packet)?;
        while let Some(frame) = decoder.receive_frame()? {
            sink.push(&frame)?;
        }
    }

    decoder.send_eof()?;
    while let Some(frame) = decoder.receive_frame()? {
        sink.push(&frame)?;
    }

    let packets = sink.finish()?;
    tracing::debug!(target = %target.display(), packets, "MP3 encode finished");

    if packets == 0 {
        return Err(FfmpegError::NoAudioStream(format!(
            "{} produced no audio",
            source.display()
        ))
        .into());
    }
    Ok(())
}
