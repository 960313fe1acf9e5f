// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Metadata fetcher.

use super::{extract_id, parse_meta, MetadataError, Video};

/// Metadata endpoint; the video id is appended.
pub const META_URL: &str = "https://www.youtube.com/get_video_info?&video_id=";

/// Fetches and parses video metadata.
#[derive(Debug, Clone)]
pub struct VideoClient {
    client: reqwest::Client,
    base_url: String,
}

impl VideoClient {
    /// Use an existing client so connection settings match the download transport.
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: META_URL.to_string(),
        }
    }

    /// Point at a different metadata endpoint (the id is appended verbatim).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn meta_url(&self, video_id: &str) -> String {
        format!("{}{}", self.base_url, video_id)
    }

    /// Resolve `input` (id or watch URL) and fetch its metadata.
    pub async fn fetch(&self, input: &str) -> Result<Video, MetadataError> {
        let video_id = extract_id(input)?;
        let url = self.meta_url(&video_id);
        tracing::debug!("Fetching metadata from {}", url);

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                MetadataError::Request("metadata request timed out".to_string())
            } else {
                MetadataError::Request(e.to_string())
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| MetadataError::Request(format!("failed to read response: {}", e)))?;

        // Error pages still carry an errorcode payload, so parse before
        // judging the status.
        match parse_meta(&video_id, &body) {
            Ok(video) if status.is_success() => Ok(video),
            Ok(_) => Err(MetadataError::Request(format!("metadata endpoint returned {}", status))),
            Err(e) => Err(e),
        }
    }
}
