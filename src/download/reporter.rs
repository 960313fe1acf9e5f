// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Progress reporter: a side-channel observer of the destination file.
//!
//! The reporter is handed only the destination path. Each tick it stats the
//! file, so it never shares memory with the writer and never touches the
//! writer's cursor. Its reading can lag the writer by one interval.

use std::path::PathBuf;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::types::{LineSink, ProgressSample};

/// Cursor up one line, clear it, carriage return.
const REWRITE_PREFIX: &str = "\x1b[A\x1b[2K\r";

/// Periodic length sampler for one transfer.
pub struct ProgressReporter {
    path: PathBuf,
    total: u64,
    start_offset: u64,
    interval: Duration,
    rewrite: bool,
    sink: LineSink,
}

impl ProgressReporter {
    /// `start_offset` is the length the file had when the transfer began, so
    /// the first rate reading only counts new bytes.
    pub fn new(path: impl Into<PathBuf>, total: u64, start_offset: u64, interval: Duration, sink: LineSink) -> Self {
        Self {
            path: path.into(),
            total,
            start_offset,
            interval: interval.max(Duration::from_millis(1)),
            rewrite: false,
            sink,
        }
    }

    /// Rewrite the previous line in place instead of appending.
    pub fn rewrite_lines(mut self, rewrite: bool) -> Self {
        self.rewrite = rewrite;
        self
    }

    /// Run on its own task. The task is aborted when the handle drops.
    pub fn spawn(self) -> ReporterHandle {
        ReporterHandle {
            handle: tokio::spawn(self.run()),
        }
    }

    /// Sample until the file reaches the total or becomes unreadable.
    pub async fn run(self) {
        let start = Instant::now();
        let mut ticker = tokio::time::interval_at(start + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut tail = self.start_offset;
        let mut emitted = false;

        loop {
            ticker.tick().await;

            let transferred = match tokio::fs::metadata(&self.path).await {
                Ok(meta) => meta.len(),
                Err(e) => {
                    tracing::debug!("Progress reporter stopping, {} unreadable: {}", self.path.display(), e);
                    return;
                }
            };

            let sample = ProgressSample {
                elapsed: Duration::from_secs(start.elapsed().as_secs()),
                transferred,
                rate: transferred.saturating_sub(tail),
            };

            let prefix = if self.rewrite && emitted { REWRITE_PREFIX } else { "" };
            (self.sink)(&format!("{}{}", prefix, sample.line(self.total)));
            emitted = true;

            tail = transferred;
            if tail >= self.total {
                break;
            }
        }
    }
}

/// Owner of a running reporter task.
#[derive(Debug)]
pub struct ReporterHandle {
    handle: JoinHandle<()>,
}

impl ReporterHandle {
    /// Stop reporting now.
    pub fn stop(self) {
        self.handle.abort();
    }

    /// True once the reporter ended on its own or was stopped.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ReporterHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn capture() -> (LineSink, Arc<Mutex<Vec<String>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink_lines = lines.clone();
        let sink: LineSink = Arc::new(move |line: &str| sink_lines.lock().unwrap().push(line.to_string()));
        (sink, lines)
    }

    #[tokio::test]
    async fn test_reporter_stops_at_total() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("v");
        std::fs::write(&path, vec![0u8; 2048]).unwrap();

        let (sink, lines) = capture();
        ProgressReporter::new(&path, 2048, 0, Duration::from_millis(5), sink)
            .run()
            .await;

        let lines = lines.lock().unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0], "0s\t 2.0KB/2.0KB\t 100%\t 2.0KB/s");
    }

    #[tokio::test]
    async fn test_reporter_line_below_one_kilobyte() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("v");
        std::fs::write(&path, vec![0u8; 1000]).unwrap();

        let (sink, lines) = capture();
        ProgressReporter::new(&path, 1000, 0, Duration::from_millis(5), sink)
            .run()
            .await;

        let lines = lines.lock().unwrap();
        assert_eq!(lines.as_slice(), ["0s\t 1000/1000\t 100%\t 1000/s"]);
    }

    #[tokio::test]
    async fn test_reporter_rate_excludes_resumed_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("v");
        std::fs::write(&path, vec![0u8; 4096]).unwrap();

        let (sink, lines) = capture();
        ProgressReporter::new(&path, 4096, 3072, Duration::from_millis(5), sink)
            .run()
            .await;

        let lines = lines.lock().unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("\t 1024/s"), "got {}", lines[0]);
    }

    #[tokio::test]
    async fn test_reporter_exits_silently_when_file_missing() {
        let dir = TempDir::new().unwrap();
        let (sink, lines) = capture();
        ProgressReporter::new(dir.path().join("gone"), 100, 0, Duration::from_millis(5), sink)
            .run()
            .await;
        assert!(lines.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reporter_keeps_sampling_and_rewrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("v");
        std::fs::write(&path, vec![0u8; 10]).unwrap();

        let (sink, lines) = capture();
        let handle = ProgressReporter::new(&path, 100, 0, Duration::from_millis(5), sink)
            .rewrite_lines(true)
            .spawn();

        tokio::time::sleep(Duration::from_millis(40)).await;
        std::fs::write(&path, vec![0u8; 100]).unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(handle.is_finished());
        let lines = lines.lock().unwrap();
        assert!(lines.len() >= 2);
        assert!(!lines[0].starts_with(REWRITE_PREFIX));
        assert!(lines[1].starts_with(REWRITE_PREFIX));
        assert!(lines.last().unwrap().contains("100%"));
    }
}
