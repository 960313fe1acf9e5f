// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for the download engine.

use std::io;
use std::path::{Path, PathBuf};

use reqwest::StatusCode;
use thiserror::Error;

use super::types::ByteRange;

/// Fatal download failures. Transient chunk statuses never surface here
/// individually; only retry exhaustion does.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// HEAD probe failed or returned unusable headers
    #[error("probe failed: {0}")]
    Probe(String),

    /// A range request exhausted its attempts
    #[error("chunk {range} failed after {attempts} attempts: {status}")]
    ChunkTransfer {
        range: ByteRange,
        attempts: u32,
        status: StatusCode,
    },

    /// The request could not be sent or the body stream broke
    #[error("connection error: {0}")]
    Connection(String),

    /// Opening, seeking, writing or flushing the destination failed
    #[error("file I/O error on {}: {source}", .path.display())]
    FileIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl DownloadError {
    pub(crate) fn file_io(path: &Path, source: io::Error) -> Self {
        DownloadError::FileIo {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Short label for the failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            DownloadError::Probe(_) => "ProbeError",
            DownloadError::ChunkTransfer { .. } => "ChunkTransferError",
            DownloadError::Connection(_) => "ConnectionError",
            DownloadError::FileIo { .. } => "FileIOError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_transfer_message_carries_status() {
        let err = DownloadError::ChunkTransfer {
            range: ByteRange::bounded(0, 10),
            attempts: 10,
            status: StatusCode::SERVICE_UNAVAILABLE,
        };
        assert_eq!(
            err.to_string(),
            "chunk [0,10) failed after 10 attempts: 503 Service Unavailable"
        );
        assert_eq!(err.kind(), "ChunkTransferError");
    }

    #[test]
    fn test_file_io_message_names_path() {
        let err = DownloadError::file_io(
            Path::new("out/video.mp4"),
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.to_string(), "file I/O error on out/video.mp4: denied");
        assert_eq!(err.kind(), "FileIOError");
    }
}
