// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Transfer session: the destination handle plus the offset it implies.
//!
//! There is no checkpoint file. On resume the offset is recovered by seeking
//! to the end of the destination, so whatever survived a crash is exactly
//! where the next run picks up.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use super::error::DownloadError;
use super::types::{ByteRange, ProbeResult, TransferTarget};

/// Exclusive writer state for one `download` call.
#[derive(Debug)]
pub struct TransferSession {
    file: File,
    path: PathBuf,
    /// Bytes present in the destination
    pub offset: u64,
    /// Total resource length, zero until probed
    pub total_length: u64,
    /// Current chunk size; shrinks to the remainder near the end
    pub chunk_size: u64,
    /// Whether the server honors range requests
    pub supports_ranges: bool,
}

impl TransferSession {
    /// Open the destination for `target`.
    ///
    /// With resume the file is opened without truncation and the offset is
    /// its current length; otherwise it is created or truncated to zero.
    pub async fn open(target: &TransferTarget, chunk_size: u64) -> Result<Self, DownloadError> {
        let path = target.destination.clone();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::file_io(parent, e))?;
        }

        let (file, offset) = if target.resume {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)
                .await
                .map_err(|e| DownloadError::file_io(&path, e))?;
            let offset = file
                .seek(SeekFrom::End(0))
                .await
                .map_err(|e| DownloadError::file_io(&path, e))?;
            (file, offset)
        } else {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&path)
                .await
                .map_err(|e| DownloadError::file_io(&path, e))?;
            (file, 0)
        };

        Ok(Self {
            file,
            path,
            offset,
            total_length: 0,
            chunk_size: chunk_size.max(1),
            supports_ranges: false,
        })
    }

    /// Destination path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record what the probe learned.
    pub fn apply_probe(&mut self, probe: &ProbeResult) {
        self.total_length = probe.total_length;
        self.supports_ranges = probe.supports_ranges;
    }

    /// Bytes still missing.
    pub fn remaining(&self) -> u64 {
        self.total_length.saturating_sub(self.offset)
    }

    /// The next range to request, or `None` once the offset reaches the total.
    ///
    /// The last request is open-ended, so a start never passes the total and
    /// the range never asks beyond it.
    pub fn next_range(&mut self) -> Option<ByteRange> {
        let remaining = self.remaining();
        if remaining == 0 {
            return None;
        }
        self.chunk_size = self.chunk_size.min(remaining);
        if self.chunk_size >= remaining {
            Some(ByteRange::open(self.offset))
        } else {
            Some(ByteRange::bounded(self.offset, self.offset + self.chunk_size))
        }
    }

    /// Append bytes, never writing past `total_length`. Returns the number of
    /// bytes written.
    pub async fn append(&mut self, bytes: &[u8]) -> Result<u64, DownloadError> {
        let room = usize::try_from(self.remaining()).unwrap_or(usize::MAX);
        let take = bytes.len().min(room);
        if take < bytes.len() {
            tracing::debug!(
                "Dropping {} bytes past the advertised length",
                bytes.len() - take
            );
        }
        self.write_raw(&bytes[..take]).await
    }

    /// Append bytes with no upper bound (whole-body transfers).
    pub async fn append_unbounded(&mut self, bytes: &[u8]) -> Result<u64, DownloadError> {
        self.write_raw(bytes).await
    }

    async fn write_raw(&mut self, bytes: &[u8]) -> Result<u64, DownloadError> {
        if bytes.is_empty() {
            return Ok(0);
        }
        self.file
            .write_all(bytes)
            .await
            .map_err(|e| DownloadError::file_io(&self.path, e))?;
        self.offset += bytes.len() as u64;
        Ok(bytes.len() as u64)
    }

    /// Push buffered writes to the OS so the on-disk length matches `offset`.
    pub async fn flush(&mut self) -> Result<(), DownloadError> {
        self.file
            .flush()
            .await
            .map_err(|e| DownloadError::file_io(&self.path, e))
    }

    /// Discard everything written so far.
    pub async fn reset(&mut self) -> Result<(), DownloadError> {
        self.file
            .set_len(0)
            .await
            .map_err(|e| DownloadError::file_io(&self.path, e))?;
        self.file
            .seek(SeekFrom::Start(0))
            .await
            .map_err(|e| DownloadError::file_io(&self.path, e))?;
        self.offset = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_fresh_truncates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("video.mp4");
        std::fs::write(&path, b"stale bytes").unwrap();

        let session = TransferSession::open(&TransferTarget::new("http://x/v", &path), 4)
            .await
            .unwrap();
        assert_eq!(session.offset, 0);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_open_resume_recovers_offset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("video.mp4");
        std::fs::write(&path, b"0123456").unwrap();

        let target = TransferTarget::new("http://x/v", &path).with_resume(true);
        let mut session = TransferSession::open(&target, 4).await.unwrap();
        assert_eq!(session.offset, 7);

        session.total_length = 10;
        session.append(b"789").await.unwrap();
        session.flush().await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"0123456789");
    }

    #[tokio::test]
    async fn test_open_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/deeper/video.mp4");
        let session = TransferSession::open(&TransferTarget::new("http://x/v", &path), 4)
            .await
            .unwrap();
        assert_eq!(session.path(), path.as_path());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_next_range_shrinks_and_opens_last_chunk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("v");
        let mut session = TransferSession::open(&TransferTarget::new("http://x/v", &path), 4)
            .await
            .unwrap();
        session.total_length = 10;

        assert_eq!(session.next_range(), Some(ByteRange::bounded(0, 4)));
        session.append(b"abcd").await.unwrap();
        assert_eq!(session.next_range(), Some(ByteRange::bounded(4, 8)));
        session.append(b"efgh").await.unwrap();
        assert_eq!(session.next_range(), Some(ByteRange::open(8)));
        assert_eq!(session.chunk_size, 2);
        session.append(b"ij").await.unwrap();
        assert_eq!(session.next_range(), None);
    }

    #[tokio::test]
    async fn test_append_caps_at_total() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("v");
        let mut session = TransferSession::open(&TransferTarget::new("http://x/v", &path), 4)
            .await
            .unwrap();
        session.total_length = 3;

        let written = session.append(b"abcdef").await.unwrap();
        session.flush().await.unwrap();
        assert_eq!(written, 3);
        assert_eq!(session.offset, 3);
        assert_eq!(std::fs::read(&path).unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_reset_discards_partial_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("v");
        std::fs::write(&path, b"partial").unwrap();

        let target = TransferTarget::new("http://x/v", &path).with_resume(true);
        let mut session = TransferSession::open(&target, 4).await.unwrap();
        session.reset().await.unwrap();
        session.append_unbounded(b"full").await.unwrap();
        session.flush().await.unwrap();

        assert_eq!(session.offset, 4);
        assert_eq!(std::fs::read(&path).unwrap(), b"full");
    }
}
