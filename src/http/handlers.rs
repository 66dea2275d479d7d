//! HTTP request handlers

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

use crate::error::{ConversionError, FailureKind};
use crate::identifier::{extract_video_id, watch_url};
use crate::metadata::{display_title, download_filename, VideoInfo};
use crate::pipeline::ConvertedAudio;
use crate::policy::{Bitrate, ConversionRequest, DEFAULT_BITRATE};
use crate::state::AppState;
use crate::storage::{StorageManager, WorkingArtifact};

/// HTTP error type
#[derive(Debug)]
pub enum HttpError {
    NotFound(String),
    Conversion(ConversionError),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    success: bool,
    error_kind: Option<FailureKind>,
    error_message: String,
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            HttpError::NotFound(msg) => (StatusCode::NOT_FOUND, None, msg),
            HttpError::Conversion(err) => (status_for(&err), Some(err.kind()), err.to_string()),
        };

        let body = ErrorBody {
            success: false,
            error_kind: kind,
            error_message: message,
        };
        (status, Json(body)).into_response()
    }
}

impl From<ConversionError> for HttpError {
    fn from(err: ConversionError) -> Self {
        HttpError::Conversion(err)
    }
}

/// Client-facing status for a failure kind
pub fn status_for(err: &ConversionError) -> StatusCode {
    match err {
        ConversionError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        ConversionError::SourceUnavailable(_) => StatusCode::NOT_FOUND,
        ConversionError::DownloadFailed(_) => StatusCode::BAD_GATEWAY,
        ConversionError::EncodeFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        ConversionError::StorageFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
        ConversionError::Cancelled => StatusCode::REQUEST_TIMEOUT,
    }
}

fn default_bitrate() -> String {
    DEFAULT_BITRATE.to_string()
}

#[derive(Debug, Deserialize)]
pub struct ConvertParams {
    pub url: String,
    #[serde(default = "default_bitrate")]
    pub bitrate: String,
}

#[derive(Debug, Deserialize)]
pub struct InfoParams {
    pub url: String,
}

/// Validate the query and build the conversion request
fn parse_request(params: &ConvertParams) -> Result<ConversionRequest, ConversionError> {
    let video_id = extract_video_id(&params.url).ok_or_else(|| {
        ConversionError::InvalidInput(format!("not a recognised video URL: {}", params.url))
    })?;
    ConversionRequest::new(video_id, &params.bitrate)
}

/// Metadata is never required; lookup failures degrade to no metadata.
async fn lookup_metadata(state: &AppState, video_id: &str) -> Option<VideoInfo> {
    match state.metadata.lookup(video_id).await {
        Ok(info) => info,
        Err(e) => {
            tracing::warn!(video_id, "Metadata lookup failed: {}", e);
            None
        }
    }
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "OK"
}

/// Version endpoint
pub async fn version_check() -> &'static str {
    concat!("tube2mp3 v", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadOptions {
    pub success: bool,
    pub video_id: String,
    pub title: String,
    pub selected_bitrate: Bitrate,
    /// Relative link that performs the conversion
    pub direct_download: String,
}

/// Direct download link for a request, with the query percent-encoded
pub fn direct_download_link(video_id: &str, bitrate: Bitrate) -> String {
    let bitrate = bitrate.to_string();
    let encoded = reqwest::Url::parse_with_params(
        "http://localhost/v1/direct-download",
        [("url", watch_url(video_id).as_str()), ("bitrate", bitrate.as_str())],
    );
    match encoded {
        Ok(url) => format!("{}?{}", url.path(), url.query().unwrap_or_default()),
        Err(_) => format!("/v1/direct-download?bitrate={}", bitrate),
    }
}

/// GET /v1/download?url=&bitrate=
pub async fn download_options(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ConvertParams>,
) -> Result<Json<DownloadOptions>, HttpError> {
    let request = parse_request(&params)?;
    tracing::info!(source_id = request.source_id(), bitrate = %request.bitrate(), "Download options requested");

    let info = match state.metadata.lookup(request.source_id()).await {
        Ok(None) if state.metadata.is_enabled() => {
            return Err(HttpError::NotFound(format!(
                "video {} does not exist",
                request.source_id()
            )))
        }
        Ok(info) => info,
        Err(e) => {
            tracing::warn!(video_id = request.source_id(), "Metadata lookup failed: {}", e);
            None
        }
    };

    Ok(Json(DownloadOptions {
        success: true,
        video_id: request.source_id().to_string(),
        title: display_title(info.as_ref(), request.source_id()),
        selected_bitrate: request.bitrate(),
        direct_download: direct_download_link(request.source_id(), request.bitrate()),
    }))
}

/// GET /v1/direct-download?url=&bitrate=
pub async fn direct_download(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ConvertParams>,
) -> Result<Response, HttpError> {
    let request = parse_request(&params)?;
    let video_id = request.source_id().to_string();
    tracing::info!(source_id = %video_id, bitrate = %request.bitrate(), "Direct download requested");

    // Ownership of the Final artifact passes to `ServedArtifact` as soon as
    // the conversion returns, so a disconnect during the lookup deletes it.
    let storage = state.pipeline.storage().clone();
    let (info, served) = {
        // A dropped request future cancels the conversion
        let cancel = CancellationToken::new();
        let _cancel_on_drop = cancel.clone().drop_guard();
        let conversion = async {
            state
                .pipeline
                .convert(request, cancel.clone())
                .await
                .map(|converted| ServedArtifact::new(storage, converted))
        };
        tokio::join!(lookup_metadata(&state, &video_id), conversion)
    };
    let served = served?;

    let filename = download_filename(&display_title(info.as_ref(), &video_id));
    serve_artifact(served, &filename).await
}

/// GET /v1/info?url=
pub async fn video_info(
    State(state): State<Arc<AppState>>,
    Query(params): Query<InfoParams>,
) -> Result<Json<VideoInfo>, HttpError> {
    let video_id = extract_video_id(&params.url).ok_or_else(|| {
        ConversionError::InvalidInput(format!("not a recognised video URL: {}", params.url))
    })?;

    match state.metadata.lookup(&video_id).await? {
        Some(info) => Ok(Json(info)),
        None => Err(HttpError::NotFound(format!("no metadata for {}", video_id))),
    }
}

/// Stream the Final artifact, deleting it once the body is dropped
async fn serve_artifact(served: ServedArtifact, filename: &str) -> Result<Response, HttpError> {
    let file = tokio::fs::File::open(&served.artifact.path).await.map_err(|e| {
        ConversionError::StorageFailed(format!(
            "cannot open {}: {}",
            served.artifact.path.display(),
            e
        ))
    })?;

    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename))
        .map_err(|e| ConversionError::InvalidInput(format!("bad file name {:?}: {}", filename, e)))?;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("audio/mpeg"));
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(served.size_bytes));

    let body = Body::from_stream(ArtifactStream {
        inner: ReaderStream::new(file),
        _served: served,
    });
    Ok((StatusCode::OK, headers, body).into_response())
}

/// A Final artifact handed to the HTTP layer; released on drop
struct ServedArtifact {
    artifact: WorkingArtifact,
    size_bytes: u64,
    storage: StorageManager,
}

impl ServedArtifact {
    fn new(storage: StorageManager, converted: ConvertedAudio) -> Self {
        Self {
            artifact: converted.artifact,
            size_bytes: converted.size_bytes,
            storage,
        }
    }
}

impl Drop for ServedArtifact {
    fn drop(&mut self) {
        self.storage.release(&self.artifact);
    }
}

struct ArtifactStream {
    inner: ReaderStream<tokio::fs::File>,
    _served: ServedArtifact,
}

impl Stream for ArtifactStream {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
