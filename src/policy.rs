//! Bitrate and output format policy
//!
//! Maps a requested bitrate to the fixed MP3 encoding parameters. Pure, no
//! state; safe to call at the HTTP boundary and again inside the pipeline.

use serde::Serialize;
use std::fmt;

use crate::error::{ConversionError, Result};

/// Codec name handed to the encoding engine
pub const MP3_CODEC: &str = "libmp3lame";
/// Output channel count
pub const OUTPUT_CHANNELS: u16 = 2;
/// Output sample rate in Hz
pub const OUTPUT_SAMPLE_RATE: u32 = 44100;
/// Bitrate used when the caller does not choose one
pub const DEFAULT_BITRATE: &str = "128";

/// Accepted output bitrates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Bitrate {
    Kbps64,
    Kbps128,
    Kbps192,
    Kbps256,
    Kbps320,
}

impl Bitrate {
    pub const ALL: [Bitrate; 5] = [
        Bitrate::Kbps64,
        Bitrate::Kbps128,
        Bitrate::Kbps192,
        Bitrate::Kbps256,
        Bitrate::Kbps320,
    ];

    pub fn kbps(self) -> u32 {
        match self {
            Bitrate::Kbps64 => 64,
            Bitrate::Kbps128 => 128,
            Bitrate::Kbps192 => 192,
            Bitrate::Kbps256 => 256,
            Bitrate::Kbps320 => 320,
        }
    }

    pub fn from_kbps(kbps: u32) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|b| b.kbps() == kbps)
            .ok_or_else(|| invalid_bitrate(&kbps.to_string()))
    }

    /// Parse a request parameter. Only the exact decimal spellings of the
    /// accepted values pass; whitespace, signs and leading zeros do not.
    pub fn parse(value: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|b| b.kbps().to_string() == value)
            .ok_or_else(|| invalid_bitrate(value))
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kbps())
    }
}

impl Serialize for Bitrate {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

fn invalid_bitrate(value: &str) -> ConversionError {
    ConversionError::InvalidInput(format!(
        "bitrate must be one of 64, 128, 192, 256 or 320 (got {:?})",
        value
    ))
}

/// Parameters handed to the encoding engine. Derived from the request and
/// never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingParameters {
    pub codec_name: &'static str,
    pub bit_rate_bps: u64,
    pub channel_count: u16,
    pub sample_rate_hz: u32,
}

impl EncodingParameters {
    pub fn for_bitrate(bitrate: Bitrate) -> Self {
        Self {
            codec_name: MP3_CODEC,
            bit_rate_bps: bitrate.kbps() as u64 * 1000,
            channel_count: OUTPUT_CHANNELS,
            sample_rate_hz: OUTPUT_SAMPLE_RATE,
        }
    }
}

/// A validated conversion request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    source_id: String,
    bitrate: Bitrate,
}

impl ConversionRequest {
    /// Validate the raw request parameters.
    pub fn new(source_id: impl Into<String>, bitrate: &str) -> Result<Self> {
        let source_id = source_id.into();
        if source_id.trim().is_empty() {
            return Err(ConversionError::InvalidInput(
                "source identifier is empty".to_string(),
            ));
        }
        Ok(Self {
            source_id,
            bitrate: Bitrate::parse(bitrate)?,
        })
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn bitrate(&self) -> Bitrate {
        self.bitrate
    }

    pub fn encoding_parameters(&self) -> EncodingParameters {
        EncodingParameters::for_bitrate(self.bitrate)
    }
}
