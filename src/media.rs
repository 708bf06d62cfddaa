//! Media lifecycle: binary uploads referenced by filename from user and post
//! records.
//!
//! Writing a file and pointing a record at it are two separate effects. The
//! [`StagedUpload`] handle makes the sequence explicit: stage the new file,
//! persist the record, then either `commit` (drop the file being replaced) or
//! `rollback` (drop the file just written).

use bytes::Bytes;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Avatars above this size are rejected.
pub const AVATAR_MAX_BYTES: usize = 500_000;
/// Post thumbnails above this size are rejected.
pub const THUMBNAIL_MAX_BYTES: usize = 2_000_000;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("File is too large ({actual} bytes, limit {limit} bytes)")]
    TooLarge { limit: usize, actual: usize },

    #[error("Invalid file name: {0}")]
    InvalidName(String),

    #[error("Upload failed: {0}")]
    Upload(#[source] io::Error),

    #[error("Delete failed: {0}")]
    Delete(#[source] io::Error),
}

/// A file received from a client, fully buffered.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub bytes: Bytes,
}

impl UploadedFile {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Owns the uploads directory.
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the uploads directory if it does not exist yet.
    pub async fn ensure_root(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    pub fn path_of(&self, filename: &str) -> Result<PathBuf, MediaError> {
        validate_stored_name(filename)?;
        Ok(self.root.join(filename))
    }

    /// Validate and write `file` under a freshly generated name.
    pub async fn store(&self, file: &UploadedFile, max_bytes: usize) -> Result<String, MediaError> {
        check_size(file, max_bytes)?;

        let filename = unique_filename(&file.file_name)?;
        write_new(&self.root, &filename, &file.bytes)
            .await
            .map_err(MediaError::Upload)?;

        tracing::debug!(%filename, size = file.size(), "stored upload");
        Ok(filename)
    }

    /// Store `file` and, once that succeeded, remove `old`.
    ///
    /// Failing to remove the old file is logged and does not fail the call:
    /// the new file is already written and is what the caller will reference.
    pub async fn replace(
        &self,
        old: Option<&str>,
        file: &UploadedFile,
        max_bytes: usize,
    ) -> Result<String, MediaError> {
        let staged = self.stage(file, max_bytes, old).await?;
        let filename = staged.filename().to_string();
        staged.commit().await;
        Ok(filename)
    }

    /// Remove a stored file. A file that is already gone counts as removed.
    pub async fn discard(&self, filename: &str) -> Result<(), MediaError> {
        let path = self.path_of(filename)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(%filename, "discarded upload");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(%filename, "upload already missing on discard");
                Ok(())
            }
            Err(e) => Err(MediaError::Delete(e)),
        }
    }

    /// Write the new file and return a handle that settles what happens to
    /// it, and to the file it replaces, once the record write is known.
    pub async fn stage(
        &self,
        file: &UploadedFile,
        max_bytes: usize,
        replaces: Option<&str>,
    ) -> Result<StagedUpload<'_>, MediaError> {
        let filename = self.store(file, max_bytes).await?;
        Ok(StagedUpload {
            media: self,
            filename,
            replaces: replaces.map(str::to_string),
        })
    }
}

/// A written upload whose record has not been persisted yet.
#[must_use = "a staged upload must be committed or rolled back"]
#[derive(Debug)]
pub struct StagedUpload<'a> {
    media: &'a MediaStore,
    filename: String,
    replaces: Option<String>,
}

impl StagedUpload<'_> {
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// The record now points at the new file; remove the one it replaced.
    pub async fn commit(self) {
        if let Some(old) = self.replaces {
            if let Err(e) = self.media.discard(&old).await {
                tracing::warn!(filename = %old, error = %e, "could not remove replaced upload");
            }
        }
    }

    /// The record write failed; remove the file written for it.
    pub async fn rollback(self) {
        if let Err(e) = self.media.discard(&self.filename).await {
            tracing::warn!(filename = %self.filename, error = %e, "could not roll back upload");
        }
    }
}

/// Write to a temporary sibling, then rename into place. A failed write never
/// leaves a partial file under `filename`.
async fn write_new(dir: &Path, filename: &str, data: &[u8]) -> io::Result<()> {
    let temp_path = dir.join(format!(".{filename}.tmp"));
    let result = match tokio::fs::write(&temp_path, data).await {
        Ok(()) => tokio::fs::rename(&temp_path, dir.join(filename)).await,
        Err(e) => Err(e),
    };

    if result.is_err() {
        match tokio::fs::remove_file(&temp_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %temp_path.display(), error = %e, "could not remove partial upload");
            }
        }
    }
    result
}

fn check_size(file: &UploadedFile, max_bytes: usize) -> Result<(), MediaError> {
    if file.size() > max_bytes {
        return Err(MediaError::TooLarge {
            limit: max_bytes,
            actual: file.size(),
        });
    }
    Ok(())
}

/// `<base><uuid>.<ext>` where base is everything before the first dot and ext
/// everything after the last one. Names without a dot get no extension.
pub fn unique_filename(original: &str) -> Result<String, MediaError> {
    // Clients may send full paths; only the final component is meaningful.
    let name = original
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();
    if name.is_empty() || name == "." || name == ".." {
        return Err(MediaError::InvalidName(original.to_string()));
    }

    let token = uuid::Uuid::new_v4();
    let filename = match (name.split_once('.'), name.rsplit_once('.')) {
        (Some((base, _)), Some((_, ext))) if !ext.is_empty() => format!("{base}{token}.{ext}"),
        (Some((base, _)), _) => format!("{base}{token}"),
        _ => format!("{name}{token}"),
    };
    Ok(filename)
}

fn validate_stored_name(filename: &str) -> Result<(), MediaError> {
    let mut components = Path::new(filename).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !filename.contains('\\') => Ok(()),
        _ => Err(MediaError::InvalidName(filename.to_string())),
    }
}
