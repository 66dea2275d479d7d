//! Transient storage for conversions
//!
//! Every conversion gets a [`Workspace`] keyed by the source identifier and a
//! fresh UUID token. Paths are reserved with `create_new`, so two conversions
//! of the same source can never share a file. Artifacts are handed out as
//! [`ArtifactGuard`]s which release the file on drop unless retained.

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ConversionError, Result};

/// Extension of the final encoded file
pub const FINAL_EXTENSION: &str = "mp3";

/// Lifecycle class of a working file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Downloaded source audio; always removed when the pipeline ends
    Temporary,
    /// Encoded output; removed only if the pipeline fails
    Final,
}

/// A file created and owned by the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingArtifact {
    pub path: PathBuf,
    pub kind: ArtifactKind,
}

/// Owns the working directory root
#[derive(Debug, Clone)]
pub struct StorageManager {
    root: Arc<PathBuf>,
}

impl StorageManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Arc::new(root.into()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Open a workspace for one conversion of `source_id`.
    pub fn workspace(&self, source_id: &str) -> Workspace {
        Workspace {
            storage: self.clone(),
            stem: format!("{}_{}", sanitize_component(source_id), Uuid::new_v4()),
        }
    }

    /// Best-effort delete. Missing files are fine; other failures are logged
    /// and swallowed so they never mask the pipeline result.
    pub fn release(&self, artifact: &WorkingArtifact) {
        match std::fs::remove_file(&artifact.path) {
            Ok(()) => {
                tracing::debug!(path = %artifact.path.display(), kind = ?artifact.kind, "Released artifact");
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::trace!(path = %artifact.path.display(), "Artifact already gone");
            }
            Err(e) => {
                tracing::warn!(
                    path = %artifact.path.display(),
                    kind = ?artifact.kind,
                    "Failed to release artifact: {}",
                    e
                );
            }
        }
    }
}

/// Per-conversion path namespace: `<root>/<source>_<uuid>[_temp].<ext>`
#[derive(Debug)]
pub struct Workspace {
    storage: StorageManager,
    stem: String,
}

impl Workspace {
    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// Reserve a fresh file for `kind`. The Temporary file takes the remote
    /// stream's extension; the Final file is always `.mp3`.
    pub fn allocate(&self, kind: ArtifactKind, extension: &str) -> Result<ArtifactGuard> {
        let root = self.storage.root();
        std::fs::create_dir_all(root).map_err(|e| {
            ConversionError::StorageFailed(format!(
                "cannot create working directory {}: {}",
                root.display(),
                e
            ))
        })?;

        let file_name = match kind {
            ArtifactKind::Temporary => format!("{}_temp.{}", self.stem, sanitize_component(extension)),
            ArtifactKind::Final => format!("{}.{}", self.stem, FINAL_EXTENSION),
        };
        let path = root.join(file_name);

        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                ConversionError::StorageFailed(format!(
                    "cannot reserve {}: {}",
                    path.display(),
                    e
                ))
            })?;

        tracing::debug!(path = %path.display(), ?kind, "Allocated artifact");

        Ok(ArtifactGuard {
            inner: Arc::new(GuardInner {
                artifact: WorkingArtifact { path, kind },
                storage: self.storage.clone(),
                released: AtomicBool::new(false),
                retained: AtomicBool::new(false),
            }),
        })
    }
}

/// Scoped handle to a working artifact.
///
/// Clones share one file; the file is released when the last clone drops,
/// unless [`ArtifactGuard::retain`] was called first.
#[derive(Debug, Clone)]
pub struct ArtifactGuard {
    inner: Arc<GuardInner>,
}

#[derive(Debug)]
struct GuardInner {
    artifact: WorkingArtifact,
    storage: StorageManager,
    released: AtomicBool,
    retained: AtomicBool,
}

impl ArtifactGuard {
    pub fn path(&self) -> &Path {
        &self.inner.artifact.path
    }

    pub fn kind(&self) -> ArtifactKind {
        self.inner.artifact.kind
    }

    pub fn artifact(&self) -> &WorkingArtifact {
        &self.inner.artifact
    }

    /// Delete the file now. Idempotent.
    pub fn release(&self) {
        self.inner.release();
    }

    /// Hand the file over to the caller; it will no longer be deleted.
    pub fn retain(self) -> WorkingArtifact {
        self.inner.retained.store(true, Ordering::SeqCst);
        self.inner.artifact.clone()
    }
}

impl GuardInner {
    fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.storage.release(&self.artifact);
        }
    }
}

impl Drop for GuardInner {
    fn drop(&mut self) {
        if !self.retained.load(Ordering::SeqCst) {
            self.release();
        }
    }
}

/// Keep path components to a safe character set
fn sanitize_component(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn count_files(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[test]
    fn test_allocate_names_by_source_and_kind() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path());
        let ws = storage.workspace("abc12345678");

        let temp = ws.allocate(ArtifactKind::Temporary, "m4a").unwrap();
        let fin = ws.allocate(ArtifactKind::Final, "ignored").unwrap();

        let temp_name = temp.path().file_name().unwrap().to_string_lossy().to_string();
        let final_name = fin.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(temp_name.starts_with("abc12345678_"));
        assert!(temp_name.ends_with("_temp.m4a"));
        assert!(final_name.ends_with(".mp3"));
        assert_eq!(format!("{}.mp3", ws.stem()), final_name);
        assert!(temp.path().exists());
        assert!(fin.path().exists());
    }

    #[test]
    fn test_allocate_creates_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested").join("work");
        let storage = StorageManager::new(&root);
        let guard = storage
            .workspace("id")
            .allocate(ArtifactKind::Temporary, "webm")
            .unwrap();
        assert!(guard.path().starts_with(&root));
    }

    #[test]
    fn test_allocate_fails_on_unwritable_root() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let storage = StorageManager::new(blocker.join("sub"));
        let err = storage
            .workspace("id")
            .allocate(ArtifactKind::Final, "mp3")
            .unwrap_err();
        assert!(matches!(err, ConversionError::StorageFailed(_)));
    }

    #[test]
    fn test_release_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path());
        let guard = storage
            .workspace("id")
            .allocate(ArtifactKind::Temporary, "m4a")
            .unwrap();
        let artifact = guard.artifact().clone();

        guard.release();
        guard.release();
        storage.release(&artifact);
        storage.release(&WorkingArtifact {
            path: dir.path().join("never-existed.mp3"),
            kind: ArtifactKind::Final,
        });

        assert!(!artifact.path.exists());
        assert_eq!(count_files(dir.path()), 0);
    }

    #[test]
    fn test_drop_releases_unless_retained() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path());
        let ws = storage.workspace("id");

        let dropped = ws.allocate(ArtifactKind::Temporary, "m4a").unwrap();
        let dropped_path = dropped.path().to_path_buf();
        drop(dropped);
        assert!(!dropped_path.exists());

        let kept = ws.allocate(ArtifactKind::Final, "mp3").unwrap();
        let artifact = kept.retain();
        assert!(artifact.path.exists());
        assert_eq!(artifact.kind, ArtifactKind::Final);
    }

    #[test]
    fn test_shared_guard_releases_after_last_clone() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path());
        let guard = storage
            .workspace("id")
            .allocate(ArtifactKind::Final, "mp3")
            .unwrap();
        let path = guard.path().to_path_buf();
        let shared = guard.clone();

        drop(guard);
        assert!(path.exists());
        drop(shared);
        assert!(!path.exists());
    }

    #[test]
    fn test_same_source_never_collides() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path());

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let storage = storage.clone();
                std::thread::spawn(move || {
                    let ws = storage.workspace("abc12345678");
                    let guard = ws.allocate(ArtifactKind::Final, "mp3").unwrap();
                    guard.retain().path
                })
            })
            .collect();

        let paths: HashSet<PathBuf> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(paths.len(), 32);
        assert_eq!(count_files(dir.path()), 32);
    }

    #[test]
    fn test_sanitize_component() {
        assert_eq!(sanitize_component("abc_12-3"), "abc_12-3");
        assert_eq!(sanitize_component("../etc"), "___etc");
        assert_eq!(sanitize_component(""), "_");
    }
}
