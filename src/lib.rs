// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! tubegrab - resumable video downloader library
//!
//! Fetch a video's metadata, pick a format, and pull its bytes down over a
//! single connection that survives interruptions. The output file itself is
//! the checkpoint: run again with resume and the transfer continues from
//! wherever the file ends.
//!
//! # Core Modules
//!
//! - [`download`] - Range probing, chunked fetching, progress reporting
//! - [`video`] - Video metadata fetching and parsing
//! - [`postprocess`] - Title rename and audio extraction
//! - [`config`] - Persisted user defaults
//! - [`error`] - Terminal error reports
//! - [`utils`] - Size, percent and duration formatting

pub mod config;
pub mod download;
pub mod error;
pub mod postprocess;
pub mod utils;
pub mod video;

// Re-export the engine entry points
pub use download::{
    DownloadConfig, DownloadError, DownloadManager, DownloadOptions, DownloadReport, HttpTransport,
    ReqwestTransport, TransferTarget,
};

pub use video::{extract_id, parse_meta, Format, MetadataError, Video, VideoClient};

pub use postprocess::{extract_audio, rename_by_title, PostProcessError};

pub use config::{load_config, save_config, Config};

pub use error::{format_error, ErrorBuilder};

pub use utils::{abbr, format_duration, percent};
