//! # Temporary Audio Uploads
//!
//! An uploaded clip is streamed to disk under the upload directory and lives there
//! for exactly one request. [`TempUpload`] owns that file:
//! - [`TempUpload::cleanup`] deletes it, checks existence first, and is idempotent
//! - dropping an upload that was never cleaned up deletes it too, so a cancelled
//!   request (client disconnect) does not leak files
//!
//! ## Accepted files:
//! MIME `audio/mp3` or `audio/mpeg`, or any MIME with a `.mp3` file name,
//! up to `upload.max_file_size_bytes`.

use crate::config::UploadConfig;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

const ACCEPTED_MIME_TYPES: [&str; 2] = ["audio/mp3", "audio/mpeg"];

/// Where uploads go and what is accepted.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub dir: PathBuf,
    pub max_file_size_bytes: usize,
}

impl UploadPolicy {
    pub fn from_config(config: &UploadConfig) -> Self {
        Self {
            dir: PathBuf::from(&config.dir),
            max_file_size_bytes: config.max_file_size_bytes,
        }
    }

    /// MP3 by MIME type, or by `.mp3` extension when the client sent a generic type.
    pub fn accepts(&self, content_type: Option<&str>, file_name: &str) -> bool {
        let mime_ok = content_type
            .map(|mime| ACCEPTED_MIME_TYPES.contains(&mime.to_ascii_lowercase().as_str()))
            .unwrap_or(false);

        let extension_ok = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("mp3"));

        mime_ok || extension_ok
    }

    /// Make sure the upload directory exists.
    pub async fn ensure_dir(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    /// Reserve a fresh path for `original_name`: `<epoch-millis>-<random>-<name>`.
    pub fn temp_path(&self, original_name: &str) -> PathBuf {
        let millis = chrono::Utc::now().timestamp_millis();
        let nonce = Uuid::new_v4().simple().to_string();
        let file_name = format!("{}-{}-{}", millis, &nonce[..8], sanitize_file_name(original_name));
        self.dir.join(file_name)
    }
}

/// Keep only the final path component and replace anything unusual with `_`.
pub fn sanitize_file_name(original_name: &str) -> String {
    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();

    if cleaned.trim_matches('.').is_empty() {
        "audio.mp3".to_string()
    } else {
        cleaned
    }
}

/// A request-scoped file on disk, deleted exactly once.
#[derive(Debug)]
pub struct TempUpload {
    path: PathBuf,
    original_name: String,
    size_bytes: usize,
    removed: bool,
}

impl TempUpload {
    /// Take ownership of a file that has been (or is about to be) written at `path`.
    pub fn new(path: PathBuf, original_name: impl Into<String>) -> Self {
        Self {
            path,
            original_name: original_name.into(),
            size_bytes: 0,
            removed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    pub fn set_size_bytes(&mut self, size_bytes: usize) {
        self.size_bytes = size_bytes;
    }

    /// Read the whole clip into memory.
    pub async fn read(&self) -> io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }

    /// Delete the file if it is still there.
    ///
    /// Calling this again, or after someone else removed the file, is a no-op.
    pub async fn cleanup(&mut self) -> io::Result<()> {
        if self.removed {
            return Ok(());
        }

        if tokio::fs::try_exists(&self.path).await? {
            match tokio::fs::remove_file(&self.path).await {
                Ok(()) => {}
                // Lost a race with another remover; same outcome
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
            debug!(path = %self.path.display(), "Temporary upload removed");
        }

        self.removed = true;
        Ok(())
    }
}

// Drop can't await, so a request dropped mid-flight falls back to a blocking delete.
impl Drop for TempUpload {
    fn drop(&mut self) {
        if self.removed {
            return;
        }

        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Temporary upload removed on drop"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove temporary upload"),
        }
        self.removed = true;
    }
}
