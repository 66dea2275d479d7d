//! Encode stage
//!
//! Hands a fully downloaded source file to an [`EncodingEngine`] and checks
//! that a non-empty Final artifact came out. The engine is a black box; the
//! production one is [`FfmpegEngine`], which runs FFmpeg in-process on the
//! blocking thread pool.

pub mod decoder;
pub mod encoder;
pub mod engine;
pub mod planes;
pub mod resampler;

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{ConversionError, EngineError, Result};
use crate::policy::EncodingParameters;
use crate::storage::ArtifactGuard;

pub use engine::FfmpegEngine;

/// Transcodes one file into another.
///
/// Implementations are synchronous; the stage runs them under
/// `spawn_blocking`. They should poll `cancel` where they can and return
/// [`EngineError::Cancelled`] when it fires.
pub trait EncodingEngine: Send + Sync {
    fn name(&self) -> &str;

    fn encode(
        &self,
        source: &Path,
        target: &Path,
        params: &EncodingParameters,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), EngineError>;
}

/// Run `engine` from `source` into `target`. Returns the size of the Final
/// artifact. Does not delete the source.
///
/// If this future is dropped the engine is cancelled, and both files stay
/// alive until the blocking task has returned.
pub async fn encode(
    engine: Arc<dyn EncodingEngine>,
    source: &ArtifactGuard,
    params: EncodingParameters,
    target: &ArtifactGuard,
    cancel: &CancellationToken,
) -> Result<u64> {
    let target_path = target.path().to_path_buf();
    let engine_name = engine.name().to_string();

    tracing::debug!(
        engine = %engine_name,
        source = %source.path().display(),
        target = %target_path.display(),
        bit_rate = params.bit_rate_bps,
        "Encoding"
    );

    let engine_cancel = cancel.child_token();
    let _cancel_engine_on_drop = engine_cancel.clone().drop_guard();
    let task = {
        let source = source.clone();
        let target = target.clone();
        tokio::task::spawn_blocking(move || {
            engine.encode(source.path(), target.path(), &params, &engine_cancel)
        })
    };

    match task.await {
        Ok(Ok(())) => {}
        Ok(Err(EngineError::Cancelled)) => return Err(ConversionError::Cancelled),
        Ok(Err(e)) => {
            tracing::warn!(engine = %engine_name, "Encoding engine failed: {}", e);
            return Err(ConversionError::EncodeFailed(e.to_string()));
        }
        Err(e) => {
            return Err(ConversionError::EncodeFailed(format!(
                "{} engine task aborted: {}",
                engine_name, e
            )))
        }
    }

    let size = tokio::fs::metadata(&target_path)
        .await
        .map(|m| m.len())
        .map_err(|e| {
            ConversionError::EncodeFailed(format!(
                "{} reported success but {} is unreadable: {}",
                engine_name,
                target_path.display(),
                e
            ))
        })?;

    if size == 0 {
        return Err(ConversionError::EncodeFailed(format!(
            "{} produced an empty file",
            engine_name
        )));
    }

    tracing::info!(path = %target_path.display(), bytes = size, "Encoding complete");
    Ok(size)
}
