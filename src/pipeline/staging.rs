//! Scoped temporary storage for an upload.
//!
//! A [`StagedUpload`] exists only once its file has been created, and its
//! file is deleted when the value is dropped. Holding one for the duration
//! of a run therefore guarantees removal on every exit path: success, an
//! early `?` return, or a panic unwinding through the pipeline.

use crate::error::FlashcardError;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// An upload written to a uniquely named temporary file.
#[derive(Debug)]
pub struct StagedUpload {
    file: NamedTempFile,
    len: u64,
}

impl StagedUpload {
    /// Create a temporary file (in `dir`, or the OS temp dir) and write
    /// `bytes` to it.
    pub fn write(bytes: &[u8], dir: Option<&Path>) -> Result<Self, FlashcardError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("flashcards-upload-");

        let target = dir
            .map(Path::to_path_buf)
            .unwrap_or_else(std::env::temp_dir);
        let mut file = builder
            .tempfile_in(&target)
            .map_err(|source| FlashcardError::Io {
                path: target.clone(),
                source,
            })?;

        // From here on `file` owns the path; any error below drops it and
        // removes the file.
        file.write_all(bytes)
            .and_then(|_| file.flush())
            .map_err(|source| FlashcardError::Io {
                path: file.path().to_path_buf(),
                source,
            })?;

        debug!("Staged {} bytes at {}", bytes.len(), file.path().display());
        Ok(Self {
            file,
            len: bytes.len() as u64,
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Delete the file now, logging (not returning) a failure.
    ///
    /// Dropping the value has the same effect silently; this variant exists
    /// so a successful run can report a removal problem.
    pub fn remove(self) {
        let path: PathBuf = self.file.path().to_path_buf();
        match self.file.close() {
            Ok(()) => debug!("Removed staged upload {}", path.display()),
            Err(e) => warn!("Failed to remove staged upload {}: {}", path.display(), e),
        }
    }
}
