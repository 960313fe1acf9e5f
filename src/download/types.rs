// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Download types for the resumable transfer engine.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::utils::{abbr, format_duration};

/// Default preferred chunk size: 4 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 4 * 1024 * 1024;

/// Default number of attempts per chunk before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Default fixed delay between attempts on the same chunk.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Default interval between progress samples.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Where a transfer comes from and where it lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTarget {
    /// Directly fetchable resource URL
    pub url: String,
    /// Local destination file
    pub destination: PathBuf,
    /// Continue from the destination's current length instead of truncating
    pub resume: bool,
}

impl TransferTarget {
    /// Create a target that starts from scratch.
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
            resume: false,
        }
    }

    /// Toggle resume.
    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }
}

/// Options the CLI hands to the download pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadOptions {
    /// Resume a failed or cancelled download
    pub resume: bool,
    /// Rename the output file using the video title
    pub rename: bool,
    /// Extract audio with ffmpeg after the download
    pub extract_audio: bool,
}

/// Fixed-delay bounded retry policy for a single chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per chunk, including the first one
    pub max_attempts: u32,
    /// Delay between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Receives human-readable output lines (progress, retries, summary).
pub type LineSink = Arc<dyn Fn(&str) + Send + Sync>;

/// A sink that prints each line to standard output.
pub fn stdout_sink() -> LineSink {
    Arc::new(|line: &str| println!("{}", line))
}

/// A sink that drops everything (quiet mode).
pub fn null_sink() -> LineSink {
    Arc::new(|_: &str| {})
}

/// Tuning knobs for one `DownloadManager`.
#[derive(Clone)]
pub struct DownloadConfig {
    /// Preferred range size per request
    pub chunk_size: u64,
    /// Per-chunk retry policy
    pub retry: RetryPolicy,
    /// Progress sampling interval
    pub progress_interval: Duration,
    /// Rewrite the progress line in place (interactive terminals only)
    pub rewrite_progress: bool,
    /// Where progress and summary lines go
    pub sink: LineSink,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            retry: RetryPolicy::default(),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            rewrite_progress: false,
            sink: stdout_sink(),
        }
    }
}

impl fmt::Debug for DownloadConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadConfig")
            .field("chunk_size", &self.chunk_size)
            .field("retry", &self.retry)
            .field("progress_interval", &self.progress_interval)
            .field("rewrite_progress", &self.rewrite_progress)
            .finish_non_exhaustive()
    }
}

/// A byte span requested from the server. `end` is exclusive; `None` means
/// "to the end of the resource".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl ByteRange {
    /// Bounded span `[start, end)`.
    pub fn bounded(start: u64, end: u64) -> Self {
        Self { start, end: Some(end) }
    }

    /// Open-ended span `[start, -)`.
    pub fn open(start: u64) -> Self {
        Self { start, end: None }
    }

    /// Number of bytes requested, if bounded.
    pub fn len(&self) -> Option<u64> {
        self.end.map(|end| end.saturating_sub(self.start))
    }

    /// `Range` header value. HTTP ranges are inclusive on both ends.
    pub fn header_value(&self) -> String {
        match self.end {
            Some(end) => format!("bytes={}-{}", self.start, end.saturating_sub(1)),
            None => format!("bytes={}-", self.start),
        }
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "[{},{})", self.start, end),
            None => write!(f, "[{},-)", self.start),
        }
    }
}

/// What the probe learned about the remote resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    /// Total size from Content-Length
    pub total_length: u64,
    /// Server advertised `Accept-Ranges: bytes`
    pub supports_ranges: bool,
}

/// Result of probing against the local resume offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The local file already holds every byte
    AlreadyComplete { total_length: u64 },
    /// There is work to do
    Ready(ProbeResult),
}

/// State of one transfer session. Every transition is one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    Idle,
    Opened,
    Probed,
    RangedTransfer,
    WholeBodyTransfer,
    Completed,
    Failed,
}

/// How the bytes were moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// Nothing transferred (already complete)
    None,
    /// Sequential range requests
    Ranged,
    /// Single un-ranged GET
    WholeBody,
}

/// One progress tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSample {
    /// Time since the reporter started, truncated to whole seconds
    pub elapsed: Duration,
    /// Bytes present in the destination
    pub transferred: u64,
    /// Bytes gained since the previous tick
    pub rate: u64,
}

impl ProgressSample {
    /// Percent complete, truncated.
    pub fn percent(&self, total: u64) -> u64 {
        crate::utils::percent(self.transferred, total)
    }

    /// Render the status line.
    pub fn line(&self, total: u64) -> String {
        format!(
            "{}\t {}/{}\t {}%\t {}/s",
            format_duration(self.elapsed),
            abbr(self.transferred),
            abbr(total),
            self.percent(total),
            abbr(self.rate)
        )
    }
}

/// Summary of a finished `download` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    /// Where the bytes are
    pub path: PathBuf,
    /// Transfer path taken
    pub mode: TransferMode,
    /// Total resource length
    pub total_length: u64,
    /// Bytes transferred by this invocation
    pub bytes_transferred: u64,
    /// Wall time spent transferring
    pub elapsed: Duration,
}

impl DownloadReport {
    /// True when nothing needed downloading.
    pub fn already_complete(&self) -> bool {
        self.mode == TransferMode::None
    }

    /// Elapsed time with sub-second precision dropped once past a second.
    pub fn display_duration(&self) -> Duration {
        if self.elapsed > Duration::from_secs(1) {
            Duration::from_secs(self.elapsed.as_secs())
        } else {
            self.elapsed
        }
    }

    /// Average bytes per second. Under one second the raw byte count is
    /// reported to avoid dividing by a fraction.
    pub fn average_speed(&self) -> u64 {
        let secs = self.elapsed.as_secs();
        if self.elapsed > Duration::from_secs(1) && secs > 0 {
            self.bytes_transferred / secs
        } else {
            self.bytes_transferred
        }
    }

    /// Summary lines printed after a transfer.
    pub fn summary_lines(&self) -> [String; 2] {
        [
            format!("Download duration: {}", format_duration(self.display_duration())),
            format!("Average speed: {}/s", abbr(self.average_speed())),
        ]
    }

    /// File name for display.
    pub fn file_name(&self) -> &Path {
        self.path.file_name().map(Path::new).unwrap_or(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_header_bounded_is_inclusive() {
        let range = ByteRange::bounded(0, 1_000_000);
        assert_eq!(range.header_value(), "bytes=0-999999");
        assert_eq!(range.len(), Some(1_000_000));
        assert_eq!(range.to_string(), "[0,1000000)");
    }

    #[test]
    fn test_range_header_open() {
        let range = ByteRange::open(3_000_000);
        assert_eq!(range.header_value(), "bytes=3000000-");
        assert_eq!(range.len(), None);
        assert_eq!(range.to_string(), "[3000000,-)");
    }

    #[test]
    fn test_progress_line_format() {
        let sample = ProgressSample {
            elapsed: Duration::from_secs(3),
            transferred: 512_000,
            rate: 2048,
        };
        assert_eq!(sample.percent(1_024_000), 50);
        assert_eq!(sample.line(1_024_000), "3s\t 500.0KB/1000.0KB\t 50%\t 2.0KB/s");
    }

    #[test]
    fn test_report_speed_under_one_second_is_raw_bytes() {
        let report = DownloadReport {
            path: PathBuf::from("a.mp4"),
            mode: TransferMode::Ranged,
            total_length: 900,
            bytes_transferred: 900,
            elapsed: Duration::from_millis(250),
        };
        assert_eq!(report.average_speed(), 900);
        assert_eq!(report.display_duration(), Duration::from_millis(250));
    }

    #[test]
    fn test_report_speed_uses_whole_seconds() {
        let report = DownloadReport {
            path: PathBuf::from("dir/a.mp4"),
            mode: TransferMode::Ranged,
            total_length: 10 * 1024 * 1024,
            bytes_transferred: 10 * 1024 * 1024,
            elapsed: Duration::from_millis(2_700),
        };
        assert_eq!(report.display_duration(), Duration::from_secs(2));
        assert_eq!(report.average_speed(), 5 * 1024 * 1024);
        assert_eq!(
            report.summary_lines(),
            ["Download duration: 2s".to_string(), "Average speed: 5.0MB/s".to_string()]
        );
        assert_eq!(report.file_name(), Path::new("a.mp4"));
    }

    #[test]
    fn test_retry_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 10);
        assert_eq!(policy.delay, Duration::from_secs(1));
    }
}
