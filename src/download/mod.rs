// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Resumable chunked download engine
//!
//! This module moves the bytes of one remote resource into one local file:
//! - Probes size and range support with a HEAD request
//! - Fetches sequential byte ranges, retrying each chunk a bounded number of times
//! - Resumes from whatever the destination file already holds
//! - Reports throughput from a separate task that only stats the file
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐
//! │ DownloadManager │────▶│ probe (HEAD)    │
//! │                 │     └─────────────────┘
//! │                 │     ┌─────────────────┐      ┌──────────────────┐
//! │                 │────▶│ ChunkedFetcher  │─────▶│ destination file │
//! └────────┬────────┘     └─────────────────┘      └────────▲─────────┘
//!          │ spawn                                          │ metadata()
//!          ▼                                                │
//! ┌─────────────────┐                                       │
//! │ProgressReporter │───────────────────────────────────────┘
//! │ (tokio task)    │
//! └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use tubegrab::download::{DownloadConfig, DownloadManager, ReqwestTransport, TransferTarget};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let manager = DownloadManager::new(ReqwestTransport::new()?, DownloadConfig::default());
//!
//! let target = TransferTarget::new("https://example.com/video.mp4", "video.mp4").with_resume(true);
//! let report = manager.download(&target).await?;
//! println!("{} bytes in {:?}", report.bytes_transferred, report.elapsed);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod fetcher;
pub mod manager;
pub mod probe;
pub mod reporter;
pub mod session;
pub mod transport;
pub mod types;

pub use error::DownloadError;
pub use fetcher::ChunkedFetcher;
pub use manager::DownloadManager;
pub use probe::probe;
pub use reporter::{ProgressReporter, ReporterHandle};
pub use session::TransferSession;
pub use transport::{
    BodyResponse, BodyStream, HeadResponse, HttpTransport, ReqwestTransport, TransportSettings, DEFAULT_USER_AGENT,
};
pub use types::{
    null_sink, stdout_sink, ByteRange, DownloadConfig, DownloadOptions, DownloadReport, LineSink, ProbeOutcome,
    ProbeResult, ProgressSample, RetryPolicy, TransferMode, TransferPhase, TransferTarget,
};
