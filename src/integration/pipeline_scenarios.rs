//! End-to-end pipeline scenarios against in-memory collaborators

use proptest::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::fakes::{pipeline_in, FakeEngine, FakeSource};
use crate::download::{DownloadEvent, ProgressReporter};
use crate::error::{ConversionError, FailureKind};
use crate::pipeline::Pipeline;
use crate::policy::{ConversionRequest, OUTPUT_CHANNELS, OUTPUT_SAMPLE_RATE};
use crate::storage::ArtifactKind;

const SOURCE_ID: &str = "abc12345678";

fn files_in(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
        Err(_) => vec![],
    }
}

fn request(bitrate: &str) -> ConversionRequest {
    ConversionRequest::new(SOURCE_ID, bitrate).unwrap()
}

#[tokio::test]
async fn test_successful_conversion_leaves_only_final_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(FakeSource::with_audio(b"m4a audio payload".to_vec()));
    let engine = Arc::new(FakeEngine::succeeding());
    let pipeline = pipeline_in(dir.path(), source.clone(), engine.clone());

    let done = pipeline
        .convert(request("128"), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(done.source_id, SOURCE_ID);
    assert_eq!(done.artifact.kind, ArtifactKind::Final);
    assert!(done.artifact.path.to_string_lossy().ends_with(".mp3"));
    assert!(done.size_bytes > 0);

    let contents = std::fs::read(&done.artifact.path).unwrap();
    assert!(contents.starts_with(FakeEngine::MP3_MAGIC));
    assert!(contents.ends_with(b"m4a audio payload"));

    let params = engine.last_params().unwrap();
    assert_eq!(params.bit_rate_bps, 128_000);
    assert_eq!(params.channel_count, OUTPUT_CHANNELS);
    assert_eq!(params.sample_rate_hz, OUTPUT_SAMPLE_RATE);

    assert_eq!(files_in(dir.path()), vec![done.artifact.path.clone()]);
    assert_eq!(source.open_count(), 1);
}

#[tokio::test]
async fn test_no_audio_stream_is_source_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(FakeSource::without_audio());
    let engine = Arc::new(FakeEngine::succeeding());
    let pipeline = pipeline_in(dir.path(), source.clone(), engine.clone());

    let err = pipeline
        .convert(request("128"), CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::SourceUnavailable);
    assert!(files_in(dir.path()).is_empty());
    assert_eq!(source.open_count(), 0);
    assert_eq!(engine.calls(), 0);
}

#[tokio::test]
async fn test_missing_video_is_source_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_in(
        dir.path(),
        Arc::new(FakeSource::missing()),
        Arc::new(FakeEngine::succeeding()),
    );

    let err = pipeline
        .convert(request("64"), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ConversionError::SourceUnavailable(_)));
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn test_download_failure_removes_partial_file() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(FakeEngine::succeeding());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let pipeline = pipeline_in(
        dir.path(),
        Arc::new(FakeSource::failing_after(b"partial bytes".to_vec())),
        engine.clone(),
    )
    .with_progress(ProgressReporter::new(tx));

    let err = pipeline
        .convert(request("192"), CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::DownloadFailed);
    assert!(files_in(dir.path()).is_empty());
    assert_eq!(engine.calls(), 0);

    let mut saw_failure = false;
    while let Ok(event) = rx.try_recv() {
        saw_failure |= matches!(event, DownloadEvent::Failed { .. });
    }
    assert!(saw_failure);
}

#[tokio::test]
async fn test_encode_failure_removes_both_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_in(
        dir.path(),
        Arc::new(FakeSource::with_audio(b"m4a audio payload".to_vec())),
        Arc::new(FakeEngine::failing("Invalid data found when processing input")),
    );

    let err = pipeline
        .convert(request("256"), CancellationToken::new())
        .await
        .unwrap_err();

    match &err {
        ConversionError::EncodeFailed(msg) => {
            assert!(msg.contains("Invalid data found when processing input"))
        }
        other => panic!("expected EncodeFailed, got {:?}", other),
    }
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn test_cancellation_during_encode_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(FakeEngine::waiting_for_cancel());
    let pipeline = pipeline_in(
        dir.path(),
        Arc::new(FakeSource::with_audio(b"m4a audio payload".to_vec())),
        engine.clone(),
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let watcher = tokio::spawn({
        let engine = engine.clone();
        async move {
            while engine.calls() == 0 {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
            trigger.cancel();
        }
    });

    let err = pipeline.convert(request("128"), cancel).await.unwrap_err();
    watcher.await.unwrap();

    assert_eq!(err.kind(), FailureKind::Cancelled);
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(FakeSource::with_audio(b"m4a audio payload".to_vec()));
    let pipeline = pipeline_in(dir.path(), source.clone(), Arc::new(FakeEngine::succeeding()));

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = pipeline.convert(request("128"), cancel).await.unwrap_err();

    assert!(matches!(err, ConversionError::Cancelled));
    assert_eq!(source.open_count(), 0);
    assert!(files_in(dir.path()).is_empty());
}

/// The engine may still be unwinding on the blocking pool after the
/// conversion future is dropped.
async fn wait_until_empty(dir: &Path) -> Vec<PathBuf> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let left = files_in(dir);
        if left.is_empty() || tokio::time::Instant::now() >= deadline {
            return left;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_dropped_during_download_removes_partial_file() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(FakeSource::stalling_after(b"first bytes".to_vec()));
    let engine = Arc::new(FakeEngine::succeeding());
    let pipeline = pipeline_in(dir.path(), source.clone(), engine.clone());

    let elapsed = tokio::time::timeout(
        Duration::from_millis(100),
        pipeline.convert(request("128"), CancellationToken::new()),
    )
    .await;

    assert!(elapsed.is_err());
    assert_eq!(source.open_count(), 1);
    assert_eq!(engine.calls(), 0);
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dropped_during_encode_stops_engine_and_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(FakeEngine::waiting_for_cancel());
    let pipeline = pipeline_in(
        dir.path(),
        Arc::new(FakeSource::with_audio(b"m4a audio payload".to_vec())),
        engine.clone(),
    );

    tokio::select! {
        _ = pipeline.convert(request("128"), CancellationToken::new()) => {
            panic!("conversion finished while the engine should be blocked")
        }
        _ = async {
            while engine.calls() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        } => {}
    }

    assert_eq!(wait_until_empty(dir.path()).await, Vec::<PathBuf>::new());
}

#[tokio::test]
async fn test_panic_in_source_stream_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_in(
        dir.path(),
        Arc::new(FakeSource::panicking_after(b"first bytes".to_vec())),
        Arc::new(FakeEngine::succeeding()),
    );

    let joined = tokio::spawn(async move {
        pipeline.convert(request("128"), CancellationToken::new()).await
    })
    .await;

    assert!(joined.unwrap_err().is_panic());
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn test_unwritable_work_dir_is_storage_failure() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"file").unwrap();

    let pipeline = Pipeline::new(
        Arc::new(FakeSource::with_audio(b"m4a audio payload".to_vec())),
        Arc::new(FakeEngine::succeeding()),
        crate::storage::StorageManager::new(blocker.join("work")),
    );

    let err = pipeline
        .convert(request("128"), CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::StorageFailed);
    assert!(err.is_server_fault());
}

async fn convert_concurrently(count: usize) -> (tempfile::TempDir, Vec<PathBuf>) {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_in(
        dir.path(),
        Arc::new(FakeSource::with_audio(b"m4a audio payload".to_vec())),
        Arc::new(FakeEngine::succeeding()),
    );

    let tasks: Vec<_> = (0..count)
        .map(|_| {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.convert(request("128"), CancellationToken::new()).await })
        })
        .collect();

    let mut paths = Vec::new();
    for task in tasks {
        paths.push(task.await.unwrap().unwrap().artifact.path);
    }
    (dir, paths)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_conversions_of_same_source() {
    let (dir, paths) = convert_concurrently(16).await;

    let unique: HashSet<_> = paths.iter().collect();
    assert_eq!(unique.len(), paths.len());

    let on_disk: HashSet<_> = files_in(dir.path()).into_iter().collect();
    assert_eq!(on_disk, paths.iter().cloned().collect());
    for path in &paths {
        assert!(std::fs::read(path).unwrap().ends_with(b"m4a audio payload"));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn prop_parallel_requests_never_collide(count in 2usize..12) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();
        let (_dir, paths) = runtime.block_on(convert_concurrently(count));
        let unique: HashSet<_> = paths.iter().collect();
        prop_assert_eq!(unique.len(), count);
    }
}
