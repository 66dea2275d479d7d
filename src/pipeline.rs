//! Conversion pipeline
//!
//! Sequences validate -> resolve -> download -> encode -> clean for a single
//! request. Every stage failure is classified as a [`ConversionError`]; the
//! Cleaning step runs exactly once on every exit path, releasing the
//! Temporary artifact always and the Final artifact unless the run
//! succeeded. Instances share no mutable state, so any number of
//! conversions can run concurrently.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::download::{self, ProgressReporter};
use crate::error::ConversionError;
use crate::policy::{Bitrate, ConversionRequest, EncodingParameters};
use crate::source::{self, AudioSource};
use crate::storage::{ArtifactGuard, ArtifactKind, StorageManager, WorkingArtifact};
use crate::transcode::{self, EncodingEngine};

/// Pipeline progress, in order. No state is entered twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineState {
    Idle,
    Validating,
    Resolving,
    Downloading,
    Encoding,
    Cleaning,
    Done,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::Validating => "validating",
            PipelineState::Resolving => "resolving",
            PipelineState::Downloading => "downloading",
            PipelineState::Encoding => "encoding",
            PipelineState::Cleaning => "cleaning",
            PipelineState::Done => "done",
        };
        f.write_str(name)
    }
}

/// Successful conversion. The caller owns `artifact` and must delete it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedAudio {
    pub artifact: WorkingArtifact,
    pub source_id: String,
    pub bitrate: Bitrate,
    pub size_bytes: u64,
}

pub type ConversionResult = Result<ConvertedAudio, ConversionError>;

/// Shared, cloneable pipeline configuration
#[derive(Clone)]
pub struct Pipeline {
    source: Arc<dyn AudioSource>,
    engine: Arc<dyn EncodingEngine>,
    storage: StorageManager,
    reporter: ProgressReporter,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("engine", &self.engine.name())
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}

/// Tracks the current state and enforces forward-only transitions
struct Run<'a> {
    state: PipelineState,
    source_id: &'a str,
}

impl<'a> Run<'a> {
    fn advance(&mut self, next: PipelineState) {
        debug_assert!(next > self.state, "{} -> {}", self.state, next);
        tracing::debug!(source_id = self.source_id, from = %self.state, to = %next, "Pipeline transition");
        self.state = next;
    }
}

/// Artifacts held by a run until Cleaning
#[derive(Default)]
struct Held {
    temporary: Option<ArtifactGuard>,
    final_artifact: Option<ArtifactGuard>,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn AudioSource>,
        engine: Arc<dyn EncodingEngine>,
        storage: StorageManager,
    ) -> Self {
        Self {
            source,
            engine,
            storage,
            reporter: ProgressReporter::default(),
        }
    }

    /// Deliver download events of every run to `reporter`.
    pub fn with_progress(mut self, reporter: ProgressReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn storage(&self) -> &StorageManager {
        &self.storage
    }

    /// Run one conversion to completion. Dropping the returned future, or
    /// cancelling `cancel`, still releases every artifact.
    pub async fn convert(&self, request: ConversionRequest, cancel: CancellationToken) -> ConversionResult {
        let source_id = request.source_id().to_string();
        let bitrate = request.bitrate();
        let mut run = Run {
            state: PipelineState::Idle,
            source_id: &source_id,
        };
        let mut held = Held::default();

        tracing::info!(source_id = %source_id, %bitrate, "Conversion started");

        let outcome = self.stages(&request, &mut run, &mut held, &cancel).await;

        run.advance(PipelineState::Cleaning);
        let result = match outcome {
            Ok(size_bytes) => {
                if let Some(temp) = held.temporary.take() {
                    temp.release();
                }
                match held.final_artifact.take() {
                    Some(final_artifact) => Ok(ConvertedAudio {
                        artifact: final_artifact.retain(),
                        source_id: source_id.clone(),
                        bitrate,
                        size_bytes,
                    }),
                    None => Err(ConversionError::StorageFailed(
                        "final artifact missing after encode".to_string(),
                    )),
                }
            }
            Err(e) => {
                if let Some(temp) = held.temporary.take() {
                    temp.release();
                }
                if let Some(final_artifact) = held.final_artifact.take() {
                    final_artifact.release();
                }
                Err(e)
            }
        };
        run.advance(PipelineState::Done);

        match &result {
            Ok(done) => tracing::info!(
                source_id = %source_id,
                %bitrate,
                path = %done.artifact.path.display(),
                bytes = done.size_bytes,
                "Conversion finished"
            ),
            Err(e) => tracing::warn!(
                source_id = %source_id,
                %bitrate,
                kind = ?e.kind(),
                "Conversion failed: {}",
                e
            ),
        }
        result
    }

    async fn stages(
        &self,
        request: &ConversionRequest,
        run: &mut Run<'_>,
        held: &mut Held,
        cancel: &CancellationToken,
    ) -> Result<u64, ConversionError> {
        run.advance(PipelineState::Validating);
        let bitrate = Bitrate::from_kbps(request.bitrate().kbps())?;
        let params = EncodingParameters::for_bitrate(bitrate);
        check_cancelled(cancel)?;

        run.advance(PipelineState::Resolving);
        let handle = tokio::select! {
            _ = cancel.cancelled() => return Err(ConversionError::Cancelled),
            resolved = source::resolve(self.source.as_ref(), request.source_id()) => resolved?,
        };

        run.advance(PipelineState::Downloading);
        let workspace = self.storage.workspace(request.source_id());
        let temporary = held
            .temporary
            .insert(workspace.allocate(ArtifactKind::Temporary, &handle.media_extension)?);
        download::download(handle, temporary, &self.reporter, cancel).await?;
        let temporary = temporary.clone();
        check_cancelled(cancel)?;

        run.advance(PipelineState::Encoding);
        let final_artifact = held
            .final_artifact
            .insert(workspace.allocate(ArtifactKind::Final, crate::storage::FINAL_EXTENSION)?);
        transcode::encode(self.engine.clone(), &temporary, params, final_artifact, cancel).await
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), ConversionError> {
    if cancel.is_cancelled() {
        Err(ConversionError::Cancelled)
    } else {
        Ok(())
    }
}
