//! Download stage
//!
//! Streams the selected audio variant into the Temporary artifact. The
//! caller awaits completion; the file is only handed on once every byte has
//! been written and flushed. Any error deletes the partial file.

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::error::{ConversionError, Result};
use crate::source::AudioStreamHandle;
use crate::storage::ArtifactGuard;

/// Observable download progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEvent {
    /// Advisory progress; only sent when the total size is known
    Progress { percent: u8, bytes: u64 },
    Completed { bytes: u64 },
    Failed { message: String },
}

/// Optional sink for [`DownloadEvent`]s
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    tx: Option<UnboundedSender<DownloadEvent>>,
}

impl ProgressReporter {
    pub fn new(tx: UnboundedSender<DownloadEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    fn emit(&self, event: DownloadEvent) {
        if let Some(tx) = &self.tx {
            // Receiver may be gone; progress is advisory
            let _ = tx.send(event);
        }
    }
}

/// Transfer `handle` into `dest`. Returns the number of bytes written.
pub async fn download(
    handle: AudioStreamHandle,
    dest: &ArtifactGuard,
    reporter: &ProgressReporter,
    cancel: &CancellationToken,
) -> Result<u64> {
    match transfer(handle, dest, reporter, cancel).await {
        Ok(bytes) => {
            tracing::info!(path = %dest.path().display(), bytes, "Audio download complete");
            reporter.emit(DownloadEvent::Completed { bytes });
            Ok(bytes)
        }
        Err(e) => {
            tracing::warn!(path = %dest.path().display(), "Audio download failed: {}", e);
            reporter.emit(DownloadEvent::Failed {
                message: e.to_string(),
            });
            dest.release();
            Err(e)
        }
    }
}

async fn transfer(
    handle: AudioStreamHandle,
    dest: &ArtifactGuard,
    reporter: &ProgressReporter,
    cancel: &CancellationToken,
) -> Result<u64> {
    let AudioStreamHandle {
        mut bytes,
        content_length,
        ..
    } = handle;

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(dest.path())
        .await
        .map_err(|e| {
            ConversionError::StorageFailed(format!(
                "cannot open {} for writing: {}",
                dest.path().display(),
                e
            ))
        })?;

    let mut written: u64 = 0;
    let mut last_percent: Option<u8> = None;

    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(path = %dest.path().display(), written, "Download cancelled");
                return Err(ConversionError::Cancelled);
            }
            next = bytes.next() => next,
        };

        let Some(chunk) = chunk else {
            break;
        };
        let chunk = chunk.map_err(|e| {
            ConversionError::DownloadFailed(format!("stream error after {} bytes: {}", written, e))
        })?;

        file.write_all(&chunk).await.map_err(|e| {
            ConversionError::DownloadFailed(format!(
                "write to {} failed: {}",
                dest.path().display(),
                e
            ))
        })?;
        written += chunk.len() as u64;

        if let Some(percent) = progress_percent(written, content_length) {
            if last_percent != Some(percent) {
                last_percent = Some(percent);
                tracing::debug!(percent, written, "Download progress");
                reporter.emit(DownloadEvent::Progress {
                    percent,
                    bytes: written,
                });
            }
        }
    }

    file.flush().await.map_err(|e| {
        ConversionError::DownloadFailed(format!("flush of {} failed: {}", dest.path().display(), e))
    })?;
    file.sync_all().await.map_err(|e| {
        ConversionError::DownloadFailed(format!("sync of {} failed: {}", dest.path().display(), e))
    })?;

    if written == 0 {
        return Err(ConversionError::DownloadFailed(
            "remote stream was empty".to_string(),
        ));
    }

    if let Some(expected) = content_length {
        if written != expected {
            return Err(ConversionError::DownloadFailed(format!(
                "expected {} bytes, received {}",
                expected, written
            )));
        }
    }

    Ok(written)
}

/// Whole-number percentage of `total`, capped at 100
pub fn progress_percent(written: u64, total: Option<u64>) -> Option<u8> {
    match total {
        Some(total) if total > 0 => Some(((written.min(total) * 100) / total) as u8),
        _ => None,
    }
}
