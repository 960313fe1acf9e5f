// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Range prober: learns total size and range support before any body bytes move.

use super::error::DownloadError;
use super::transport::{HeadResponse, HttpTransport};
use super::types::{ProbeOutcome, ProbeResult};

/// Probe `url` with a HEAD request and compare against the local `offset`.
///
/// Returns [`ProbeOutcome::AlreadyComplete`] when the local file already holds
/// at least the advertised length.
pub async fn probe<T: HttpTransport>(
    transport: &T,
    url: &str,
    offset: u64,
) -> Result<ProbeOutcome, DownloadError> {
    let head = transport
        .head(url)
        .await
        .map_err(|e| DownloadError::Probe(format!("HEAD request failed: {}", e)))?;

    let result = interpret(&head)?;
    tracing::debug!(
        total = result.total_length,
        ranges = result.supports_ranges,
        offset,
        "probe complete"
    );

    if result.total_length <= offset {
        if result.total_length < offset {
            tracing::warn!(
                "Local file ({} bytes) is larger than the remote resource ({} bytes)",
                offset,
                result.total_length
            );
        }
        return Ok(ProbeOutcome::AlreadyComplete {
            total_length: result.total_length,
        });
    }

    Ok(ProbeOutcome::Ready(result))
}

/// Validate a HEAD response and extract length and range capability.
pub fn interpret(head: &HeadResponse) -> Result<ProbeResult, DownloadError> {
    if head.status.is_client_error() || head.status.is_server_error() {
        return Err(DownloadError::Probe(format!("HEAD request returned {}", head.status)));
    }

    let raw = head
        .content_length
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| DownloadError::Probe("Content-Length header is missing".to_string()))?;

    let total_length = raw
        .parse::<u64>()
        .map_err(|e| DownloadError::Probe(format!("invalid Content-Length {:?}: {}", raw, e)))?;

    let supports_ranges = head
        .accept_ranges
        .as_deref()
        .map(|v| v.split(',').any(|unit| unit.trim().eq_ignore_ascii_case("bytes")))
        .unwrap_or(false);

    Ok(ProbeResult {
        total_length,
        supports_ranges,
    })
}
