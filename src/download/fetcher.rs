// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Chunked fetcher: the sequential range-request loop.
//!
//! One request is in flight at a time. Each chunk expects `206 Partial
//! Content`; anything else is retried on the same range with a fixed delay
//! until the attempt ceiling. Transport errors are not retried.

use futures_util::StreamExt;
use reqwest::StatusCode;

use super::error::DownloadError;
use super::session::TransferSession;
use super::transport::HttpTransport;
use super::types::{ByteRange, LineSink, RetryPolicy};
use crate::utils::format_duration;

/// Result of a single attempt on a chunk. Fatal causes travel as `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    /// Bytes received and written
    Complete(u64),
    /// A status was received but it was not usable
    Retryable(StatusCode),
}

/// Attempt bookkeeping for one chunk.
#[derive(Debug)]
struct RetryState {
    max_attempts: u32,
    attempts: u32,
    last_status: Option<StatusCode>,
}

impl RetryState {
    fn new(policy: &RetryPolicy) -> Self {
        Self {
            max_attempts: policy.max_attempts.max(1),
            attempts: 0,
            last_status: None,
        }
    }

    fn begin(&mut self) {
        self.attempts += 1;
    }

    fn fail(&mut self, status: StatusCode) {
        self.last_status = Some(status);
    }

    fn exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

/// Drives a [`TransferSession`] to completion using range requests.
pub struct ChunkedFetcher<'a, T: HttpTransport> {
    transport: &'a T,
    retry: RetryPolicy,
    sink: LineSink,
}

impl<'a, T: HttpTransport> ChunkedFetcher<'a, T> {
    pub fn new(transport: &'a T, retry: RetryPolicy, sink: LineSink) -> Self {
        Self {
            transport,
            retry,
            sink,
        }
    }

    /// Fetch everything between the session offset and its total length.
    ///
    /// Returns the number of bytes appended by this call.
    pub async fn run(&self, url: &str, session: &mut TransferSession) -> Result<u64, DownloadError> {
        let initial = session.offset;

        while let Some(range) = session.next_range() {
            let received = self.fetch_chunk(url, range, session).await?;
            tracing::debug!(
                %range,
                received,
                offset = session.offset,
                total = session.total_length,
                "chunk written"
            );
        }

        Ok(session.offset - initial)
    }

    async fn fetch_chunk(
        &self,
        url: &str,
        range: ByteRange,
        session: &mut TransferSession,
    ) -> Result<u64, DownloadError> {
        let mut state = RetryState::new(&self.retry);

        loop {
            state.begin();
            match self.attempt(url, range, session).await? {
                Attempt::Complete(received) => return Ok(received),
                Attempt::Retryable(status) => {
                    state.fail(status);
                    if state.exhausted() {
                        tracing::warn!("Giving up on chunk {} after {} attempts", range, state.attempts);
                        return Err(DownloadError::ChunkTransfer {
                            range,
                            attempts: state.attempts,
                            status: state.last_status.unwrap_or(status),
                        });
                    }
                    (self.sink)(&format!(
                        "Chunk {} returned {}, retrying in {} ({}/{})",
                        range,
                        status,
                        format_duration(self.retry.delay),
                        state.attempts + 1,
                        state.max_attempts
                    ));
                    tokio::time::sleep(self.retry.delay).await;
                }
            }
        }
    }

    async fn attempt(
        &self,
        url: &str,
        range: ByteRange,
        session: &mut TransferSession,
    ) -> Result<Attempt, DownloadError> {
        let response = self.transport.get(url, Some(range)).await?;
        if response.status != StatusCode::PARTIAL_CONTENT {
            return Ok(Attempt::Retryable(response.status));
        }

        let mut body = response.body;
        let mut received = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            received += session.append(&chunk).await?;
            if session.remaining() == 0 {
                break;
            }
        }
        session.flush().await?;

        // An empty 206 would never advance the offset.
        if received == 0 {
            return Ok(Attempt::Retryable(response.status));
        }

        Ok(Attempt::Complete(received))
    }
}
