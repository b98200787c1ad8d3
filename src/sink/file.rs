//! File-backed message sink.
//!
//! Each message becomes one file in the uploads directory:
//!
//! ```text
//! uploads/1760000000000_3f2a9c1e_output.txt   text message
//! uploads/1760000000123_b81d04aa_output.png   binary, sniffed as PNG
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::error::Result;
use crate::session::{Message, MessageKind};

use super::MessageSink;
use super::sniff::detect_extension;

// ============================================================================
// Constants
// ============================================================================

/// Default uploads directory, relative to the working directory.
pub const DEFAULT_UPLOADS_DIR: &str = "uploads";

/// Base name shared by every written file.
const FILE_STEM: &str = "output";

// ============================================================================
// FileSink
// ============================================================================

/// Writes messages to `<dir>/<unix-millis>_<id>_output.<ext>`.
///
/// The directory is created on first write. Text messages are written as
/// UTF-8 (invalid sequences replaced) with a `.txt` extension; binary
/// messages keep their bytes and get an extension from
/// [`detect_extension`].
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    /// Creates a sink writing into `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Target directory.
    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `message` and returns the created path.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] if the directory or file cannot be written.
    pub async fn save(&self, message: &Message) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let (extension, contents) = match message.kind {
            MessageKind::Text => ("txt", message.text_lossy().into_bytes()),
            MessageKind::Binary => {
                let bytes = message.bytes();
                (detect_extension(&bytes), bytes)
            }
        };

        let path = self.dir.join(file_name(extension));
        tokio::fs::write(&path, &contents).await?;

        info!(
            path = %path.display(),
            kind = %message.kind,
            len = contents.len(),
            partial = message.partial,
            "File saved"
        );
        Ok(path)
    }
}

impl Default for FileSink {
    fn default() -> Self {
        Self::new(DEFAULT_UPLOADS_DIR)
    }
}

#[async_trait]
impl MessageSink for FileSink {
    async fn persist(&self, message: &Message) -> Result<()> {
        self.save(message).await.map(drop)
    }
}

/// Builds a unique file name for the given extension.
fn file_name(extension: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    let id = Uuid::new_v4().simple().to_string();
    format!("{millis}_{}_{FILE_STEM}.{extension}", &id[..8])
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_text_message_written_as_txt() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path().join("uploads"));

        let message = Message::new(MessageKind::Text, vec![b"AB".to_vec(), b"CD".to_vec()]);
        let path = sink.save(&message).await.unwrap();

        assert_eq!(path.extension().unwrap(), "txt");
        assert!(path.starts_with(dir.path().join("uploads")));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"ABCD");
    }

    #[tokio::test]
    async fn test_binary_message_extension_sniffed() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path());

        let png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 1, 2, 3];
        let message = Message::new(MessageKind::Binary, vec![png[..4].to_vec(), png[4..].to_vec()]);
        let path = sink.save(&message).await.unwrap();

        assert_eq!(path.extension().unwrap(), "png");
        assert_eq!(tokio::fs::read(&path).await.unwrap(), png);
    }

    #[tokio::test]
    async fn test_file_names_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path());
        let message = Message::single(MessageKind::Binary, vec![0]);

        let first = sink.save(&message).await.unwrap();
        let second = sink.save(&message).await.unwrap();
        assert_ne!(first, second);
        assert!(first.file_name().unwrap().to_string_lossy().ends_with("_output.bin"));
    }

    #[tokio::test]
    async fn test_unwritable_dir_reports_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        tokio::fs::write(&blocker, b"x").await.unwrap();

        let sink = FileSink::new(blocker.join("nested"));
        let err = sink
            .persist(&Message::single(MessageKind::Text, b"x".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::Error::Io(_)));
    }
}
