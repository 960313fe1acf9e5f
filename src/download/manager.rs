// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Download manager: the entry point of the transfer engine.

use std::time::Instant;

use futures_util::StreamExt;

use super::error::DownloadError;
use super::fetcher::ChunkedFetcher;
use super::probe::probe;
use super::reporter::ProgressReporter;
use super::session::TransferSession;
use super::transport::HttpTransport;
use super::types::{
    ByteRange, DownloadConfig, DownloadReport, ProbeOutcome, TransferMode, TransferPhase, TransferTarget,
};
use crate::utils::abbr;

/// One-way phase tracker. Every transition is logged.
#[derive(Debug)]
struct PhaseTracker<'a> {
    url: &'a str,
    phase: TransferPhase,
}

impl<'a> PhaseTracker<'a> {
    fn new(url: &'a str) -> Self {
        Self {
            url,
            phase: TransferPhase::Idle,
        }
    }

    fn advance(&mut self, next: TransferPhase) {
        tracing::debug!(url = self.url, "transfer phase {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }

    /// Record a failure and hand the error back.
    fn fail(&mut self, err: DownloadError) -> DownloadError {
        tracing::debug!(url = self.url, kind = err.kind(), "transfer failed in {:?}: {}", self.phase, err);
        self.advance(TransferPhase::Failed);
        err
    }
}

/// Resumable single-connection downloader.
///
/// A manager holds a transport and tuning; each [`download`](Self::download)
/// call owns its own session, so one manager can serve many transfers in
/// sequence.
pub struct DownloadManager<T: HttpTransport> {
    transport: T,
    config: DownloadConfig,
}

impl<T: HttpTransport> DownloadManager<T> {
    pub fn new(transport: T, config: DownloadConfig) -> Self {
        Self { transport, config }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Transfer `target.url` into `target.destination`.
    ///
    /// Partial output is never deleted on failure; a later call with
    /// `resume` set continues from it.
    pub async fn download(&self, target: &TransferTarget) -> Result<DownloadReport, DownloadError> {
        let mut phase = PhaseTracker::new(&target.url);
        let sink = &self.config.sink;

        let mut session = TransferSession::open(target, self.config.chunk_size)
            .await
            .map_err(|e| phase.fail(e))?;
        phase.advance(TransferPhase::Opened);

        if target.resume {
            sink(&format!("Resuming from offset {} ({})", session.offset, abbr(session.offset)));
        }

        let result = match probe(&self.transport, &target.url, session.offset).await {
            Ok(ProbeOutcome::Ready(result)) => result,
            Ok(ProbeOutcome::AlreadyComplete { total_length }) => {
                sink("Video file is already downloaded.");
                phase.advance(TransferPhase::Completed);
                return Ok(DownloadReport {
                    path: session.path().to_path_buf(),
                    mode: TransferMode::None,
                    total_length,
                    bytes_transferred: 0,
                    elapsed: std::time::Duration::ZERO,
                });
            }
            Err(e) => return Err(phase.fail(e)),
        };
        session.apply_probe(&result);
        phase.advance(TransferPhase::Probed);

        tracing::info!(
            "Downloading {} ({}) to {}",
            target.url,
            abbr(result.total_length),
            session.path().display()
        );

        let started = Instant::now();
        let (mode, transferred) = if result.supports_ranges {
            phase.advance(TransferPhase::RangedTransfer);
            let transferred = self.ranged(&target.url, &mut session).await.map_err(|e| phase.fail(e))?;
            (TransferMode::Ranged, transferred)
        } else {
            phase.advance(TransferPhase::WholeBodyTransfer);
            if session.offset > 0 {
                tracing::warn!("Server does not support ranges, restarting {} from zero", session.path().display());
            }
            let transferred = self.whole_body(&target.url, &mut session).await.map_err(|e| phase.fail(e))?;
            (TransferMode::WholeBody, transferred)
        };

        let report = DownloadReport {
            path: session.path().to_path_buf(),
            mode,
            total_length: result.total_length,
            bytes_transferred: transferred,
            elapsed: started.elapsed(),
        };
        for line in report.summary_lines() {
            sink(&line);
        }
        phase.advance(TransferPhase::Completed);

        Ok(report)
    }

    async fn ranged(&self, url: &str, session: &mut TransferSession) -> Result<u64, DownloadError> {
        // Dropping the handle aborts the task, including on early return.
        let _reporter = (session.total_length > 0).then(|| {
            ProgressReporter::new(
                session.path(),
                session.total_length,
                session.offset,
                self.config.progress_interval,
                self.config.sink.clone(),
            )
            .rewrite_lines(self.config.rewrite_progress)
            .spawn()
        });

        ChunkedFetcher::new(&self.transport, self.config.retry, self.config.sink.clone())
            .run(url, session)
            .await
    }

    async fn whole_body(&self, url: &str, session: &mut TransferSession) -> Result<u64, DownloadError> {
        session.reset().await?;

        let response = self.transport.get(url, None).await?;
        if !response.status.is_success() {
            return Err(DownloadError::ChunkTransfer {
                range: ByteRange::open(0),
                attempts: 1,
                status: response.status,
            });
        }

        let mut body = response.body;
        while let Some(chunk) = body.next().await {
            session.append_unbounded(&chunk?).await?;
        }
        session.flush().await?;

        if session.offset != session.total_length {
            tracing::warn!(
                "Received {} bytes but Content-Length was {}",
                session.offset,
                session.total_length
            );
        }

        Ok(session.offset)
    }
}
