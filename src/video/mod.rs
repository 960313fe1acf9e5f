// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Video metadata: descriptors, id extraction and payload parsing.
//!
//! The metadata endpoint answers with a URL-encoded key-value payload. The
//! interesting parts are a nested `player_response` JSON document and a
//! comma-separated `url_encoded_fmt_stream_map` whose items are themselves
//! URL-encoded.
//!
//! # Example
//!
//! ```no_run
//! use tubegrab::video::{VideoClient, extract_id};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let id = extract_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ")?;
//! let video = VideoClient::new(reqwest::Client::new()).fetch(&id).await?;
//! println!("{} ({} formats)", video.title, video.formats.len());
//! # Ok(())
//! # }
//! ```

pub mod client;

pub use client::{VideoClient, META_URL};

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

/// Container names recognised in a format's type string, in priority order.
pub const EXTENSIONS: [&str; 5] = ["3gp", "mp4", "flv", "webm", "avi"];

/// Extension used when none of [`EXTENSIONS`] matches.
const FALLBACK_EXTENSION: &str = "avi";

static BARE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("video id regex is valid"));

/// Metadata retrieval failures.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("no video ID detectable in {0:?}")]
    InvalidId(String),

    #[error("metadata request failed: {0}")]
    Request(String),

    #[error("video unavailable: {0}")]
    Unavailable(String),

    #[error("malformed metadata: {0}")]
    Malformed(String),
}

/// One downloadable encoding of a video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    /// Format tag
    pub itag: u32,
    /// Container/codec descriptor, e.g. `video/mp4; codecs="avc1.42001E"`
    pub video_type: String,
    pub quality: String,
    pub url: String,
}

impl Format {
    /// First known container name in the type string.
    pub fn extension(&self) -> &'static str {
        EXTENSIONS
            .iter()
            .copied()
            .find(|ext| self.video_type.contains(ext))
            .unwrap_or(FALLBACK_EXTENSION)
    }
}

/// A video descriptor with its available formats.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Video {
    pub id: String,
    pub title: String,
    pub author: String,
    pub keywords: Vec<String>,
    pub thumbnail_url: String,
    pub view_count: u64,
    pub avg_rating: f32,
    pub length_seconds: u64,
    pub formats: Vec<Format>,
}

impl Video {
    pub fn format(&self, index: usize) -> Option<&Format> {
        self.formats.get(index)
    }

    /// File extension for the format at `index`.
    pub fn extension(&self, index: usize) -> &'static str {
        self.format(index).map(Format::extension).unwrap_or(FALLBACK_EXTENSION)
    }

    /// Position of the format carrying `itag`.
    pub fn index_by_itag(&self, itag: u32) -> Option<usize> {
        self.formats.iter().position(|f| f.itag == itag)
    }

    /// `<id>.<ext>` for the format at `index`.
    pub fn default_filename(&self, index: usize) -> String {
        format!("{}.{}", self.id, self.extension(index))
    }
}

/// Pull the video id out of a watch URL, a short link, or a bare id.
pub fn extract_id(input: &str) -> Result<String, MetadataError> {
    let input = input.trim();
    if BARE_ID.is_match(input) {
        return Ok(input.to_string());
    }

    let candidate = if input.contains("://") {
        input.to_string()
    } else {
        format!("https://{}", input)
    };
    let url = reqwest::Url::parse(&candidate).map_err(|_| MetadataError::InvalidId(input.to_string()))?;

    if let Some((_, id)) = url.query_pairs().find(|(k, _)| k == "v") {
        if !id.is_empty() {
            return Ok(id.into_owned());
        }
    }

    if url.host_str() == Some("youtu.be") {
        if let Some(id) = url.path_segments().and_then(|mut s| s.next()).filter(|s| BARE_ID.is_match(s)) {
            return Ok(id.to_string());
        }
    }

    Err(MetadataError::InvalidId(input.to_string()))
}

/// Decode a URL-encoded payload into a map. The first occurrence of a key wins.
fn decode_query(payload: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for (key, value) in form_pairs(payload) {
        map.entry(key).or_insert(value);
    }
    map
}

fn form_pairs(payload: &str) -> Vec<(String, String)> {
    match reqwest::Url::parse(&format!("http://localhost/?{}", payload)) {
        Ok(url) => url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect(),
        Err(_) => Vec::new(),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PlayerResponse {
    video_details: VideoDetails,
    streaming_data: StreamingData,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct VideoDetails {
    title: String,
    author: String,
    keywords: Vec<String>,
    thumbnail: Thumbnails,
    average_rating: f64,
    view_count: String,
    length_seconds: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Thumbnails {
    thumbnails: Vec<Thumbnail>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Thumbnail {
    url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StreamingData {
    formats: Vec<StreamFormat>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StreamFormat {
    itag: u32,
    url: String,
    mime_type: String,
    quality: String,
    quality_label: String,
}

/// Parse a metadata payload for `video_id`.
pub fn parse_meta(video_id: &str, payload: &str) -> Result<Video, MetadataError> {
    let query = decode_query(payload.trim());
    let get = |key: &str| query.get(key).map(String::as_str).unwrap_or("");

    if !get("errorcode").is_empty() || get("status") == "fail" {
        let reason = get("reason");
        return Err(MetadataError::Unavailable(if reason.is_empty() {
            "no reason given".to_string()
        } else {
            reason.to_string()
        }));
    }

    let player: PlayerResponse = match get("player_response") {
        "" => PlayerResponse::default(),
        raw => serde_json::from_str(raw)
            .map_err(|e| MetadataError::Malformed(format!("player_response: {}", e)))?,
    };
    let details = player.video_details;

    let mut formats: Vec<Format> = get("url_encoded_fmt_stream_map")
        .split(',')
        .filter(|item| !item.is_empty())
        .filter_map(|item| {
            let fields = decode_query(item);
            let field = |key: &str| fields.get(key).cloned().unwrap_or_default();
            let url = field("url");
            if url.is_empty() {
                tracing::debug!("Skipping stream map entry without url");
                return None;
            }
            Some(Format {
                itag: field("itag").parse().unwrap_or(0),
                video_type: field("type"),
                quality: field("quality"),
                url,
            })
        })
        .collect();

    if formats.is_empty() {
        formats = player
            .streaming_data
            .formats
            .into_iter()
            .filter(|f| !f.url.is_empty())
            .map(|f| Format {
                itag: f.itag,
                video_type: f.mime_type,
                quality: if f.quality_label.is_empty() { f.quality } else { f.quality_label },
                url: f.url,
            })
            .collect();
    }

    Ok(Video {
        id: video_id.to_string(),
        title: details.title,
        author: details.author,
        keywords: details.keywords,
        thumbnail_url: details
            .thumbnail
            .thumbnails
            .into_iter()
            .next()
            .map(|t| t.url)
            .unwrap_or_default(),
        view_count: details.view_count.parse().unwrap_or(0),
        avg_rating: details.average_rating as f32,
        length_seconds: details.length_seconds.parse().unwrap_or(0),
        formats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(pairs: &[(&str, &str)]) -> String {
        let mut url = reqwest::Url::parse("http://localhost/").unwrap();
        url.query_pairs_mut().extend_pairs(pairs);
        url.query().unwrap_or("").to_string()
    }

    fn player_json() -> String {
        serde_json::json!({
            "videoDetails": {
                "title": "Big Buck Bunny",
                "author": "Blender",
                "keywords": ["open", "movie"],
                "thumbnail": {"thumbnails": [{"url": "https://i.example/1.jpg"}, {"url": "https://i.example/2.jpg"}]},
                "averageRating": 4.5,
                "viewCount": "1234",
                "lengthSeconds": "596"
            },
            "streamingData": {
                "formats": [
                    {"itag": 18, "url": "https://cdn.example/18", "mimeType": "video/mp4; codecs=\"avc1\"", "quality": "medium", "qualityLabel": "360p"},
                    {"itag": 99, "mimeType": "video/webm"}
                ]
            }
        })
        .to_string()
    }

    #[test]
    fn test_extract_id_variants() {
        assert_eq!(extract_id("dQw4w9WgXcQ").unwrap(), "dQw4w9WgXcQ");
        assert_eq!(
            extract_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=10").unwrap(),
            "dQw4w9WgXcQ"
        );
        assert_eq!(extract_id("youtube.com/watch?feature=x&v=abc123").unwrap(), "abc123");
        assert_eq!(extract_id("https://youtu.be/abc-_123").unwrap(), "abc-_123");
    }

    #[test]
    fn test_extract_id_rejects_url_without_id() {
        assert!(matches!(
            extract_id("https://www.youtube.com/watch?list=abc"),
            Err(MetadataError::InvalidId(_))
        ));
        assert!(matches!(extract_id("not an id at all"), Err(MetadataError::InvalidId(_))));
    }

    #[test]
    fn test_parse_meta_stream_map() {
        let stream_map = [
            encode(&[("itag", "22"), ("type", "video/mp4; codecs=\"avc1\""), ("quality", "hd720"), ("url", "https://cdn.example/22")]),
            encode(&[("itag", "43"), ("type", "video/webm"), ("quality", "medium"), ("url", "https://cdn.example/43")]),
            encode(&[("itag", "5"), ("type", "video/x-flv")]),
        ]
        .join(",");
        let payload = encode(&[
            ("status", "ok"),
            ("player_response", player_json().as_str()),
            ("url_encoded_fmt_stream_map", &stream_map),
        ]);

        let video = parse_meta("bbb", &payload).unwrap();
        assert_eq!(video.id, "bbb");
        assert_eq!(video.title, "Big Buck Bunny");
        assert_eq!(video.author, "Blender");
        assert_eq!(video.keywords, vec!["open", "movie"]);
        assert_eq!(video.thumbnail_url, "https://i.example/1.jpg");
        assert_eq!(video.view_count, 1234);
        assert_eq!(video.length_seconds, 596);
        assert!((video.avg_rating - 4.5).abs() < f32::EPSILON);

        assert_eq!(video.formats.len(), 2);
        assert_eq!(video.formats[0].itag, 22);
        assert_eq!(video.formats[0].quality, "hd720");
        assert_eq!(video.formats[1].url, "https://cdn.example/43");
    }

    #[test]
    fn test_parse_meta_falls_back_to_streaming_data() {
        let payload = encode(&[("player_response", player_json().as_str())]);
        let video = parse_meta("bbb", &payload).unwrap();
        assert_eq!(video.formats.len(), 1);
        assert_eq!(video.formats[0].itag, 18);
        assert_eq!(video.formats[0].quality, "360p");
        assert_eq!(video.extension(0), "mp4");
    }

    #[test]
    fn test_parse_meta_error_payloads() {
        let payload = encode(&[("status", "fail"), ("errorcode", "150"), ("reason", "Video unavailable")]);
        match parse_meta("x", &payload) {
            Err(MetadataError::Unavailable(reason)) => assert_eq!(reason, "Video unavailable"),
            other => panic!("unexpected {:?}", other),
        }

        let payload = encode(&[("status", "fail")]);
        assert!(matches!(parse_meta("x", &payload), Err(MetadataError::Unavailable(_))));

        let payload = encode(&[("player_response", "{not json")]);
        assert!(matches!(parse_meta("x", &payload), Err(MetadataError::Malformed(_))));
    }

    #[test]
    fn test_extension_inference() {
        let video = Video {
            id: "abc".to_string(),
            formats: vec![
                Format { itag: 17, video_type: "video/3gpp".into(), quality: "small".into(), url: "u".into() },
                Format { itag: 43, video_type: "video/webm; codecs=vp8".into(), quality: "medium".into(), url: "u".into() },
                Format { itag: 1, video_type: "video/quicktime".into(), quality: "x".into(), url: "u".into() },
            ],
            ..Default::default()
        };
        assert_eq!(video.extension(0), "3gp");
        assert_eq!(video.extension(1), "webm");
        assert_eq!(video.extension(2), "avi");
        assert_eq!(video.extension(9), "avi");
        assert_eq!(video.default_filename(1), "abc.webm");
    }

    #[test]
    fn test_index_by_itag() {
        let video = Video {
            formats: vec![
                Format { itag: 22, video_type: String::new(), quality: String::new(), url: String::new() },
                Format { itag: 18, video_type: String::new(), quality: String::new(), url: String::new() },
            ],
            ..Default::default()
        };
        assert_eq!(video.index_by_itag(18), Some(1));
        assert_eq!(video.index_by_itag(37), None);
    }
}
