// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! HTTP transport seam for the download engine.
//!
//! The engine never talks to `reqwest` directly. Everything network-facing goes
//! through [`HttpTransport`], so the chunk loop can be exercised against a
//! scripted in-memory server in tests.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, RANGE};
use reqwest::StatusCode;

use super::error::DownloadError;
use super::types::ByteRange;

/// Default user agent sent with every request.
pub const DEFAULT_USER_AGENT: &str = concat!("tubegrab/", env!("CARGO_PKG_VERSION"));

/// Default timeout for establishing a connection (in seconds).
const CONNECT_TIMEOUT_SECS: u64 = 15;

/// A boxed, sendable stream.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

/// Response body as a stream of byte chunks.
pub type BodyStream = BoxStream<'static, Result<Bytes, DownloadError>>;

/// Headers of interest from a HEAD request, kept raw so the prober decides
/// what counts as valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadResponse {
    pub status: StatusCode,
    pub content_length: Option<String>,
    pub accept_ranges: Option<String>,
}

/// Status plus streaming body of a GET.
pub struct BodyResponse {
    pub status: StatusCode,
    pub body: BodyStream,
}

impl std::fmt::Debug for BodyResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BodyResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Asynchronous HTTP abstraction used by the prober and fetcher.
///
/// Any `Err` returned here is treated as connection-level: the request never
/// produced a status. A received-but-unexpected status is an `Ok` response.
pub trait HttpTransport: Send + Sync {
    /// Metadata-only request.
    fn head(&self, url: &str) -> impl Future<Output = Result<HeadResponse, DownloadError>> + Send;

    /// GET, optionally restricted to a byte range.
    fn get(
        &self,
        url: &str,
        range: Option<ByteRange>,
    ) -> impl Future<Output = Result<BodyResponse, DownloadError>> + Send;
}

/// Settings for the production transport.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub user_agent: String,
    pub connect_timeout: Duration,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
        }
    }
}

/// Production transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport with default settings.
    pub fn new() -> Result<Self, DownloadError> {
        Self::with_settings(&TransportSettings::default())
    }

    /// Create a transport with explicit settings.
    pub fn with_settings(settings: &TransportSettings) -> Result<Self, DownloadError> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|e| DownloadError::Connection(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// The underlying client, shared with the metadata fetcher.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

fn connection_error(url: &str, e: reqwest::Error) -> DownloadError {
    if e.is_connect() {
        DownloadError::Connection(format!("cannot connect to {}: {}", host_of(url), e))
    } else if e.is_timeout() {
        DownloadError::Connection(format!("request to {} timed out", host_of(url)))
    } else {
        DownloadError::Connection(e.to_string())
    }
}

fn host_of(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "remote host".to_string())
}

fn header_string(headers: &reqwest::header::HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
}

impl HttpTransport for ReqwestTransport {
    async fn head(&self, url: &str) -> Result<HeadResponse, DownloadError> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| connection_error(url, e))?;

        let headers = response.headers();
        Ok(HeadResponse {
            status: response.status(),
            content_length: header_string(headers, CONTENT_LENGTH),
            accept_ranges: header_string(headers, ACCEPT_RANGES),
        })
    }

    async fn get(&self, url: &str, range: Option<ByteRange>) -> Result<BodyResponse, DownloadError> {
        let mut request = self.client.get(url);
        if let Some(range) = range {
            request = request.header(RANGE, range.header_value());
        }

        let response = request.send().await.map_err(|e| connection_error(url, e))?;
        let status = response.status();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| DownloadError::Connection(format!("body stream interrupted: {}", e))));

        Ok(BodyResponse {
            status,
            body: Box::pin(body),
        })
    }
}
