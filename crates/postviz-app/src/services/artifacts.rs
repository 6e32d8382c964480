//! Artifact storage abstractions.
//!
//! The pipeline needs exactly two capabilities from durable object storage:
//! upload bytes under a namespaced path and receive a public URL back, and
//! delete a previously returned URL. Upload paths embed a timestamp so a
//! retried generation never overwrites an in-flight upload of the same kind;
//! the metadata record, not the store, decides which URL is authoritative.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::constants::ARTIFACT_NAMESPACE;
use crate::pipeline::kinds::ArtifactKind;

/// Errors emitted by artifact storage operations.
#[derive(Debug, Error)]
pub enum ArtifactStoreError {
    #[error("invalid artifact path `{0}`")]
    InvalidPath(String),
    #[error("url `{0}` does not belong to this store")]
    ForeignUrl(String),
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ArtifactStoreError {
    fn from(e: std::io::Error) -> Self {
        ArtifactStoreError::Io(e.to_string())
    }
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub url: String,
    pub size_bytes: u64,
}

/// Trait abstracting over artifact storage backends.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `bytes` under `path` and return the durable public URL.
    async fn upload(
        &self,
        bytes: &[u8],
        mime_type: &str,
        path: &str,
    ) -> Result<StoredArtifact, ArtifactStoreError>;

    /// Delete the object behind a URL previously returned by `upload`.
    /// Returns Ok(true) if deleted, Ok(false) if it did not exist.
    async fn delete(&self, url: &str) -> Result<bool, ArtifactStoreError>;
}

/// Build the canonical upload path for one artifact.
pub fn artifact_path(slug: &str, kind: ArtifactKind, uploaded_at_ms: i64, mime_type: &str) -> String {
    debug_assert!(!slug.is_empty());
    format!(
        "{ARTIFACT_NAMESPACE}/{slug}/{}-{uploaded_at_ms}.{}",
        kind.slug(),
        extension_for(mime_type)
    )
}

/// Map a MIME type onto a file extension, defaulting to `bin`.
pub fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        _ => "bin",
    }
}

fn validate_relative_path(path: &str) -> Result<&Path, ArtifactStoreError> {
    let candidate = Path::new(path);
    let valid = !path.is_empty()
        && !path.starts_with('/')
        && !path.contains('\\')
        && candidate
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
    if !valid {
        return Err(ArtifactStoreError::InvalidPath(path.to_string()));
    }
    Ok(candidate)
}

/// Filesystem artifact store.
///
/// Objects live under `root`, addressed by their upload path, and are served
/// by an external static host rooted at `public_base_url`. Writes go through
/// a temp file and an atomic rename.
#[derive(Debug, Clone, bon::Builder)]
pub struct FsArtifactStore {
    root: PathBuf,
    #[builder(into)]
    public_base_url: String,
}

impl FsArtifactStore {
    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.public_base_url.trim_end_matches('/'), path)
    }

    fn path_for_url<'a>(&self, url: &'a str) -> Result<&'a str, ArtifactStoreError> {
        let base = self.public_base_url.trim_end_matches('/');
        url.strip_prefix(base)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| ArtifactStoreError::ForeignUrl(url.to_string()))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn upload(
        &self,
        bytes: &[u8],
        mime_type: &str,
        path: &str,
    ) -> Result<StoredArtifact, ArtifactStoreError> {
        debug_assert!(!mime_type.is_empty());
        let relative = validate_relative_path(path)?;
        let target = self.root.join(relative);

        let parent = target
            .parent()
            .ok_or_else(|| ArtifactStoreError::InvalidPath(path.to_string()))?;
        fs::create_dir_all(parent)
            .await
            .map_err(|e| ArtifactStoreError::Io(format!("create parent dir: {e}")))?;

        let temp = target.with_extension("tmp");
        let mut file = fs::File::create(&temp)
            .await
            .map_err(|e| ArtifactStoreError::Io(format!("create temp file: {e}")))?;
        file.write_all(bytes)
            .await
            .map_err(|e| ArtifactStoreError::Io(format!("write artifact: {e}")))?;
        file.flush()
            .await
            .map_err(|e| ArtifactStoreError::Io(format!("flush artifact: {e}")))?;
        drop(file);

        fs::rename(&temp, &target)
            .await
            .map_err(|e| ArtifactStoreError::Io(format!("finalize artifact: {e}")))?;

        debug!(path, size = bytes.len(), "artifact stored");
        Ok(StoredArtifact {
            url: self.url_for(path),
            size_bytes: bytes.len() as u64,
        })
    }

    async fn delete(&self, url: &str) -> Result<bool, ArtifactStoreError> {
        let relative = self.path_for_url(url)?;
        let target = self.root.join(validate_relative_path(relative)?);

        match fs::remove_file(&target).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ArtifactStoreError::Io(format!("delete artifact: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(temp: &TempDir) -> FsArtifactStore {
        FsArtifactStore::builder()
            .root(temp.path().to_path_buf())
            .public_base_url("https://assets.example.com")
            .build()
    }

    #[test]
    fn paths_embed_namespace_kind_and_timestamp() {
        let path = artifact_path("intro-post", ArtifactKind::SummaryCard, 1_700_000, "image/png");
        assert_eq!(path, "visualizations/intro-post/summary-card-1700000.png");

        let jpg = artifact_path("p", ArtifactKind::Diagram, 7, "image/jpeg");
        assert!(jpg.ends_with("diagram-7.jpg"));

        let unknown = artifact_path("p", ArtifactKind::Infographic, 7, "application/x-thing");
        assert!(unknown.ends_with(".bin"));
    }

    #[test]
    fn traversal_and_absolute_paths_are_rejected() {
        assert!(validate_relative_path("a/../b").is_err());
        assert!(validate_relative_path("/etc/passwd").is_err());
        assert!(validate_relative_path("").is_err());
        assert!(validate_relative_path("ok/nested/file.png").is_ok());
    }

    #[tokio::test]
    async fn upload_then_delete_round_trips() {
        let temp = TempDir::new().expect("temp dir");
        let store = store(&temp);

        let stored = store
            .upload(b"png-bytes", "image/png", "visualizations/post/infographic-1.png")
            .await
            .expect("upload succeeds");
        assert_eq!(
            stored.url,
            "https://assets.example.com/visualizations/post/infographic-1.png"
        );
        assert_eq!(stored.size_bytes, 9);
        assert!(
            temp.path()
                .join("visualizations/post/infographic-1.png")
                .exists()
        );

        let deleted = store.delete(&stored.url).await.expect("delete succeeds");
        assert!(deleted);
        let deleted_again = store.delete(&stored.url).await.expect("idempotent");
        assert!(!deleted_again);
    }

    #[tokio::test]
    async fn foreign_urls_are_rejected_on_delete() {
        let temp = TempDir::new().expect("temp dir");
        let store = store(&temp);

        let err = store
            .delete("https://elsewhere.example.com/x.png")
            .await
            .expect_err("must fail");
        assert!(matches!(err, ArtifactStoreError::ForeignUrl(_)));
    }
}
