//! Buffered byte source with per-read deadlines.
//!
//! The transport delivers bytes in arbitrary chunks. [`FrameReader`] keeps
//! everything received so far in an owned buffer, so a read that times out
//! or is cancelled never loses data: the next read resumes from the same
//! cursor.
//!
//! # Suspension Points
//!
//! | Method | Blocks until | Deadline |
//! |--------|--------------|----------|
//! | [`FrameReader::wait_readable`] | at least one byte is buffered | none |
//! | [`FrameReader::read_exact`] | exactly `n` bytes are buffered | `read_timeout` |

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;
use tracing::trace;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default per-read deadline (5s).
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(5000);

/// Capacity reserved before each socket read.
const READ_CHUNK: usize = 8 * 1024;

// ============================================================================
// FrameReader
// ============================================================================

/// Buffered reader that hands out exact-length chunks.
///
/// Owned by a single connection; never shared.
#[derive(Debug)]
pub struct FrameReader<R> {
    /// Underlying transport.
    inner: R,
    /// Bytes received but not yet consumed.
    buffer: Vec<u8>,
    /// Deadline applied to each [`FrameReader::read_exact`] call.
    read_timeout: Duration,
}

impl<R> FrameReader<R> {
    /// Creates a reader with an empty buffer.
    #[must_use]
    pub fn new(inner: R, read_timeout: Duration) -> Self {
        Self::with_buffered(inner, Vec::new(), read_timeout)
    }

    /// Creates a reader whose buffer is seeded with already-received bytes.
    ///
    /// Used after the handshake, when the client may have pipelined its
    /// first frame behind the upgrade request.
    #[must_use]
    pub fn with_buffered(inner: R, buffered: Vec<u8>, read_timeout: Duration) -> Self {
        Self {
            inner,
            buffer: buffered,
            read_timeout,
        }
    }

    /// Number of bytes buffered and not yet consumed.
    #[inline]
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Suspends until at least one byte is buffered.
    ///
    /// No deadline applies: an idle connection may wait here indefinitely
    /// (the liveness monitor bounds idleness). Cancel safe.
    ///
    /// # Errors
    ///
    /// - [`Error::StreamEnded`] if the peer closed the stream
    /// - [`Error::Io`] on transport failure
    pub async fn wait_readable(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            self.fill().await?;
        }
        Ok(())
    }

    /// Reads exactly `len` bytes.
    ///
    /// # Errors
    ///
    /// - [`Error::ReadTimeout`] if `len` bytes are not available in time
    /// - [`Error::StreamEnded`] if the peer closed the stream first
    /// - [`Error::Io`] on transport failure
    pub async fn read_exact(&mut self, len: usize) -> Result<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }

        if self.buffer.len() < len {
            let deadline = self.read_timeout;
            timeout(deadline, async {
                while self.buffer.len() < len {
                    self.fill().await?;
                }
                Ok::<_, Error>(())
            })
            .await
            .map_err(|_| Error::read_timeout(deadline.as_millis() as u64))??;
        }

        Ok(self.buffer.drain(..len).collect())
    }

    /// Reads exactly `N` bytes into an array.
    ///
    /// # Errors
    ///
    /// Same as [`FrameReader::read_exact`].
    pub async fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.read_exact(N).await?;
        let mut out = [0u8; N];
        out.copy_from_slice(&bytes);
        Ok(out)
    }

    /// Reads one chunk from the transport into the buffer.
    async fn fill(&mut self) -> Result<usize> {
        self.buffer.reserve(READ_CHUNK);
        let read = self.inner.read_buf(&mut self.buffer).await?;
        if read == 0 {
            return Err(Error::StreamEnded);
        }
        trace!(read, buffered = self.buffer.len(), "Read chunk");
        Ok(read)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_read_exact_across_chunks() {
        let mock = Builder::new()
            .read(&[1, 2])
            .read(&[3])
            .read(&[4, 5, 6])
            .build();
        let mut reader = FrameReader::new(mock, DEFAULT_READ_TIMEOUT);

        assert_eq!(reader.read_exact(4).await.unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(reader.buffered(), 2);
        assert_eq!(reader.read_exact(2).await.unwrap(), vec![5, 6]);
        assert_eq!(reader.buffered(), 0);
    }

    #[tokio::test]
    async fn test_read_zero_bytes_does_not_touch_transport() {
        let mock = Builder::new().build();
        let mut reader = FrameReader::new(mock, DEFAULT_READ_TIMEOUT);
        assert!(reader.read_exact(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stream_ended() {
        let mut reader = FrameReader::new(&[0xAAu8][..], DEFAULT_READ_TIMEOUT);
        let err = reader.read_exact(2).await.unwrap_err();
        assert!(matches!(err, Error::StreamEnded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_timeout_keeps_buffered_bytes() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut reader = FrameReader::new(server, Duration::from_millis(50));

        tokio::io::AsyncWriteExt::write_all(&mut client, &[7, 8])
            .await
            .unwrap();

        let err = reader.read_exact(3).await.unwrap_err();
        assert!(matches!(err, Error::ReadTimeout { timeout_ms: 50 }));
        assert_eq!(reader.buffered(), 2);

        tokio::io::AsyncWriteExt::write_all(&mut client, &[9])
            .await
            .unwrap();
        assert_eq!(reader.read_exact(3).await.unwrap(), vec![7, 8, 9]);
    }

    #[tokio::test]
    async fn test_seeded_buffer_is_read_first() {
        let mock = Builder::new().read(&[3]).build();
        let mut reader = FrameReader::with_buffered(mock, vec![1, 2], DEFAULT_READ_TIMEOUT);

        reader.wait_readable().await.unwrap();
        assert_eq!(reader.read_array::<3>().await.unwrap(), [1, 2, 3]);
    }
}
