//! tube2mp3
//!
//! Downloads the audio track of a hosted video and transcodes it to MP3 at a
//! caller-chosen bitrate, with guaranteed cleanup of every working file.

pub mod config;
pub mod config_file;
pub mod download;
pub mod error;
pub mod ffmpeg;
pub mod http;
pub mod identifier;
pub mod metadata;
pub mod pipeline;
pub mod policy;
pub mod source;
pub mod state;
pub mod storage;
pub mod transcode;

#[cfg(test)]
mod integration;

pub use error::{ConversionError, FailureKind, Result};
pub use pipeline::{ConversionResult, ConvertedAudio, Pipeline, PipelineState};
pub use policy::{Bitrate, ConversionRequest, EncodingParameters};
